//! Core layer - sampling, payload values and shared scene types.
//!
//! This module provides:
//! - [`sample_interval`] / [`read_sampled`] - the sampling accessor
//! - [`TimeSamples`] - time-ordered sample streams
//! - [`Data`] - typed payload values
//! - [`Transform`] - decomposed transforms
//! - [`TagFilter`], [`PathSet`], [`HashType`] - query types
//! - [`SceneConfig`] - store configuration

mod sample;
mod time_samples;
mod data;
mod transform;
mod tags;
mod path_set;
mod hash;
mod config;

pub use sample::{sample_interval, read_sampled, Interpolate, SampleInterval, DEFAULT_SNAP_EPSILON};
pub use time_samples::{check_sample_time, TimeSamples};
pub use data::Data;
pub use transform::{Transform, XformOp, XformOpType};
pub use tags::{normalize_tags, TagFilter};
pub use path_set::PathSet;
pub use hash::{HashType, MurmurHash};
pub use config::SceneConfig;
