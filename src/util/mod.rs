//! Utility types used throughout the crate.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - [`Path`] - Location paths
//! - [`BBox3d`] and glam re-exports

mod error;
mod math;
mod path;

pub use error::*;
pub use math::*;
pub use path::*;
