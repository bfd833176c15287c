//! Time sample streams: `(time, value)` pairs with strictly increasing times.

use crate::core::{read_sampled, sample_interval, Interpolate, SampleInterval};
use crate::util::{Chrono, Error, Path, Result};

/// Reject a sample time that is not finite or not after `previous`.
pub fn check_sample_time(path: &Path, property: &str, time: Chrono, previous: Option<Chrono>) -> Result<()> {
    if !time.is_finite() {
        return Err(Error::NonFiniteTime {
            path: path.clone(),
            property: property.to_string(),
            time,
        });
    }
    match previous {
        // Stored times are finite, so this comparison is total.
        Some(previous) if time <= previous => Err(Error::TimeOrder {
            path: path.clone(),
            property: property.to_string(),
            time,
            previous,
        }),
        _ => Ok(()),
    }
}

/// An append-only stream of samples for one property.
#[derive(Clone, Debug)]
pub struct TimeSamples<T> {
    times: Vec<Chrono>,
    values: Vec<T>,
}

impl<T> Default for TimeSamples<T> {
    fn default() -> Self {
        Self {
            times: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T> TimeSamples<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parallel vectors. Times must already be strictly increasing.
    pub fn from_parts(times: Vec<Chrono>, values: Vec<T>) -> Result<Self> {
        if times.len() != values.len() {
            return Err(Error::SampleMismatch(format!(
                "{} sample times for {} values",
                times.len(),
                values.len()
            )));
        }
        if times.iter().any(|t| !t.is_finite()) || times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(Error::SampleMismatch("sample times are not increasing".into()));
        }
        Ok(Self { times, values })
    }

    /// Append a sample; `time` must be after the last stored sample.
    pub fn push(&mut self, path: &Path, property: &str, time: Chrono, value: T) -> Result<()> {
        check_sample_time(path, property, time, self.times.last().copied())?;
        self.times.push(time);
        self.values.push(value);
        Ok(())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    #[inline]
    pub fn times(&self) -> &[Chrono] {
        &self.times
    }

    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Time of sample `index`.
    pub fn time(&self, index: usize) -> Option<Chrono> {
        self.times.get(index).copied()
    }

    /// Value of sample `index`.
    pub fn get(&self, index: usize) -> Option<&T> {
        self.values.get(index)
    }

    /// Bracketing interval for `time`.
    pub fn interval(&self, time: Chrono, epsilon: f64) -> SampleInterval {
        sample_interval(&self.times, time, epsilon)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Chrono, &T)> + '_ {
        self.times.iter().copied().zip(self.values.iter())
    }
}

impl<T: Interpolate + Clone> TimeSamples<T> {
    /// Value at `time`, interpolated between bracketing samples.
    pub fn sample(&self, path: &Path, property: &str, time: Chrono, epsilon: f64) -> Result<T> {
        if self.is_empty() {
            return Err(Error::NoSample {
                path: path.clone(),
                property: property.to_string(),
                index: 0,
                count: 0,
            });
        }
        read_sampled(self.interval(time, epsilon), path, property, |i| Ok(self.values[i].clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DEFAULT_SNAP_EPSILON;

    #[test]
    fn test_push_rejects_out_of_order() {
        let p = Path::parse("/a");
        let mut s = TimeSamples::new();
        s.push(&p, "object", 1.0, 1.0).unwrap();
        let err = s.push(&p, "object", 0.5, 2.0).unwrap_err();
        assert!(matches!(err, Error::TimeOrder { time, previous, .. } if time == 0.5 && previous == 1.0));
        // Equal times are also rejected.
        assert!(s.push(&p, "object", 1.0, 2.0).is_err());
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn test_push_rejects_non_finite() {
        let p = Path::parse("/a");
        let mut s = TimeSamples::new();
        assert!(matches!(s.push(&p, "object", f64::NAN, 1.0), Err(Error::NonFiniteTime { .. })));
        s.push(&p, "object", 1.0, 1.0).unwrap();
        assert!(matches!(s.push(&p, "object", f64::NAN, 2.0), Err(Error::NonFiniteTime { .. })));
        assert!(s.push(&p, "object", f64::INFINITY, 2.0).is_err());
        assert!(matches!(s.push(&p, "object", 0.5, 2.0), Err(Error::TimeOrder { .. })));
        assert_eq!(s.times(), &[1.0]);
        assert!(TimeSamples::from_parts(vec![0.0, f64::NAN], vec![1, 2]).is_err());
    }

    #[test]
    fn test_sample_interpolates() {
        let p = Path::root();
        let mut s = TimeSamples::new();
        s.push(&p, "x", 0.0, 0.0).unwrap();
        s.push(&p, "x", 1.0, 10.0).unwrap();
        assert_eq!(s.sample(&p, "x", 0.25, DEFAULT_SNAP_EPSILON).unwrap(), 2.5);
        assert_eq!(s.sample(&p, "x", 5.0, DEFAULT_SNAP_EPSILON).unwrap(), 10.0);
        assert!(TimeSamples::<f64>::new().sample(&p, "x", 0.0, DEFAULT_SNAP_EPSILON).is_err());
    }

    #[test]
    fn test_from_parts_validates() {
        assert!(TimeSamples::from_parts(vec![0.0, 1.0], vec![1]).is_err());
        assert!(TimeSamples::from_parts(vec![1.0, 0.0], vec![1, 2]).is_err());
        assert_eq!(TimeSamples::from_parts(vec![0.0, 1.0], vec![1, 2]).unwrap().len(), 2);
    }
}
