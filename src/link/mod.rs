//! Link overlay: splicing scene stores into each other at mount points.
//!
//! - [`LinkDescriptor`] / [`LINK_ATTRIBUTE`] - the stored link
//! - [`LinkScene`] - the overlay location
//! - [`LinkCache`] / [`StoreResolver`] - how linked stores are found and kept open

mod cache;
mod descriptor;
mod scene;

pub use cache::{FileResolver, LinkCache, StoreResolver};
pub use descriptor::{LinkDescriptor, LINK_ATTRIBUTE};
pub use scene::LinkScene;
