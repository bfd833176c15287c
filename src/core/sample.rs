//! Sampling accessor shared by every location backend.
//!
//! Backends expose raw per-sample accessors (`num_x_samples`, `x_sample_time`,
//! `read_x_at_sample`). The functions here turn those into "value at time"
//! queries: locate the bracketing samples, snap to an exact sample when the
//! requested time is within the snap epsilon, and interpolate otherwise.

use crate::util::{BBox3d, Chrono, Error, Path, Result};

/// Default snap threshold for [`sample_interval`].
pub const DEFAULT_SNAP_EPSILON: f64 = 1e-4;

/// Bracketing samples for a time query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleInterval {
    /// Index of the greatest sample time <= the query.
    pub floor: usize,
    /// Index of the least sample time >= the query.
    pub ceil: usize,
    /// Interpolation factor (0.0 = floor, 1.0 = ceil).
    pub factor: f64,
}

impl SampleInterval {
    /// Exact sample (no interpolation needed).
    pub fn exact(index: usize) -> Self {
        Self {
            floor: index,
            ceil: index,
            factor: 0.0,
        }
    }

    /// Interpolation between two samples.
    pub fn lerp(floor: usize, ceil: usize, factor: f64) -> Self {
        Self {
            floor,
            ceil,
            factor: factor.clamp(0.0, 1.0),
        }
    }

    /// Check if this is an exact sample (no interpolation).
    pub fn is_exact(&self) -> bool {
        self.floor == self.ceil || self.factor == 0.0
    }
}

/// Locate the samples bracketing `time` in a strictly increasing time list.
///
/// Times within `epsilon` of a stored sample snap to it. Queries outside the
/// sampled range clamp to the first or last sample. No samples yields index 0.
pub fn sample_interval(times: &[Chrono], time: Chrono, epsilon: f64) -> SampleInterval {
    // Number of samples at or before `time`.
    let upper = times.partition_point(|&t| t <= time);
    if upper == 0 {
        return SampleInterval::exact(0);
    }

    let floor = upper - 1;
    let floor_time = times[floor];
    if (time - floor_time).abs() < epsilon || floor + 1 == times.len() {
        return SampleInterval::exact(floor);
    }

    let ceil = floor + 1;
    let ceil_time = times[ceil];
    if (ceil_time - time).abs() < epsilon {
        return SampleInterval::exact(ceil);
    }

    SampleInterval::lerp(floor, ceil, (time - floor_time) / (ceil_time - floor_time))
}

/// Values that can be blended between two samples.
pub trait Interpolate: Sized {
    /// Blend `a` towards `b` by `t`.
    ///
    /// Returns `Ok(None)` for types that do not interpolate; the caller then
    /// falls back to the nearer sample. Shape mismatches are reported as
    /// [`Error::SampleMismatch`].
    fn interpolate(a: &Self, b: &Self, t: f64) -> Result<Option<Self>>;
}

impl Interpolate for f64 {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Result<Option<Self>> {
        Ok(Some(a + (b - a) * t))
    }
}

impl Interpolate for BBox3d {
    fn interpolate(a: &Self, b: &Self, t: f64) -> Result<Option<Self>> {
        Ok(Some(a.lerp(b, t)))
    }
}

/// Read a value at a time given its bracketing interval.
///
/// An exact interval returns the sample verbatim. Otherwise both samples are
/// read and interpolated; sample-shape errors are reported against `path` and
/// `property`.
pub fn read_sampled<T, F>(interval: SampleInterval, path: &Path, property: &str, read: F) -> Result<T>
where
    T: Interpolate,
    F: Fn(usize) -> Result<T>,
{
    if interval.is_exact() {
        return read(interval.floor);
    }

    let a = read(interval.floor)?;
    let b = read(interval.ceil)?;
    match T::interpolate(&a, &b, interval.factor) {
        Ok(Some(v)) => Ok(v),
        Ok(None) => Ok(if interval.factor >= 0.5 { b } else { a }),
        Err(Error::SampleMismatch(reason)) => Err(Error::interpolation(path, property, reason)),
        Err(e) => Err(e),
    }
}
