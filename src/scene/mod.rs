//! Scene locations.
//!
//! Every backend ([`FileSceneStore`], [`LinkScene`](crate::link::LinkScene),
//! [`MemoryScene`]) implements the [`Location`] trait. Callers open a store at
//! its root and reach other locations by traversal, holding them as
//! [`LocationHandle`]s.
//!
//! Sampled properties (bound, transform, attributes, object) follow the same
//! pattern: backends provide `num_*_samples`, `*_sample_time` and
//! `read_*_at_sample`, and the trait supplies the time-based `read_*`
//! through the shared sampling accessor.

mod file;
mod memory;

pub use file::FileSceneStore;
pub use memory::MemoryScene;

use std::sync::Arc;

use rayon::prelude::*;

use crate::core::{read_sampled, Data, HashType, MurmurHash, PathSet, SampleInterval, TagFilter, Transform};
use crate::util::{BBox3d, Chrono, DMat4, Error, Path, Result};

/// Shared handle to a location of any backend.
pub type LocationHandle = Arc<dyn Location>;

/// What [`Location::child`] does when the child does not exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MissingBehaviour {
    /// Return `Ok(None)`.
    #[default]
    NullIfMissing,
    /// Return [`Error::ChildNotFound`].
    ThrowIfMissing,
    /// Create the child (write-mode stores only).
    CreateIfMissing,
}

/// A node of a hierarchical time-sampled scene.
pub trait Location: Send + Sync {
    /// File the location was read from or is written to.
    fn file_name(&self) -> &str;

    /// Name of the location; `"/"` at the root.
    fn name(&self) -> &str {
        self.path().name()
    }

    fn path(&self) -> &Path;

    // ---- bound ----

    fn has_bound(&self) -> bool;
    fn num_bound_samples(&self) -> usize;
    fn bound_sample_time(&self, index: usize) -> Result<Chrono>;
    fn bound_sample_interval(&self, time: Chrono) -> SampleInterval;
    fn read_bound_at_sample(&self, index: usize) -> Result<BBox3d>;

    fn read_bound(&self, time: Chrono) -> Result<BBox3d> {
        check_sampled(self.path(), "bound", self.num_bound_samples())?;
        read_sampled(self.bound_sample_interval(time), self.path(), "bound", |i| {
            self.read_bound_at_sample(i)
        })
    }

    fn write_bound(&self, bound: &BBox3d, time: Chrono) -> Result<()>;

    // ---- transform ----

    fn has_transform(&self) -> bool;
    fn num_transform_samples(&self) -> usize;
    fn transform_sample_time(&self, index: usize) -> Result<Chrono>;
    fn transform_sample_interval(&self, time: Chrono) -> SampleInterval;
    fn read_transform_at_sample(&self, index: usize) -> Result<Transform>;

    fn read_transform(&self, time: Chrono) -> Result<Transform> {
        check_sampled(self.path(), "transform", self.num_transform_samples())?;
        read_sampled(self.transform_sample_interval(time), self.path(), "transform", |i| {
            self.read_transform_at_sample(i)
        })
    }

    /// Transform at `time` composed into a matrix; identity without samples.
    fn read_transform_as_matrix(&self, time: Chrono) -> Result<DMat4> {
        if !self.has_transform() {
            return Ok(DMat4::IDENTITY);
        }
        self.read_transform(time)?.matrix()
    }

    fn write_transform(&self, transform: &Transform, time: Chrono) -> Result<()>;

    // ---- attributes ----

    fn has_attribute(&self, name: &str) -> bool;
    fn attribute_names(&self) -> Vec<String>;
    fn num_attribute_samples(&self, name: &str) -> usize;
    fn attribute_sample_time(&self, name: &str, index: usize) -> Result<Chrono>;
    fn attribute_sample_interval(&self, name: &str, time: Chrono) -> SampleInterval;
    fn read_attribute_at_sample(&self, name: &str, index: usize) -> Result<Data>;

    fn read_attribute(&self, name: &str, time: Chrono) -> Result<Data> {
        if !self.has_attribute(name) {
            return Err(Error::AttributeNotFound {
                path: self.path().clone(),
                name: name.to_string(),
            });
        }
        read_sampled(self.attribute_sample_interval(name, time), self.path(), name, |i| {
            self.read_attribute_at_sample(name, i)
        })
    }

    fn write_attribute(&self, name: &str, value: &Data, time: Chrono) -> Result<()>;

    // ---- object ----

    fn has_object(&self) -> bool;
    fn num_object_samples(&self) -> usize;
    fn object_sample_time(&self, index: usize) -> Result<Chrono>;
    fn object_sample_interval(&self, time: Chrono) -> SampleInterval;
    fn read_object_at_sample(&self, index: usize) -> Result<Data>;

    fn read_object(&self, time: Chrono) -> Result<Data> {
        check_sampled(self.path(), "object", self.num_object_samples())?;
        read_sampled(self.object_sample_interval(time), self.path(), "object", |i| {
            self.read_object_at_sample(i)
        })
    }

    fn write_object(&self, object: &Data, time: Chrono) -> Result<()>;

    // ---- hierarchy ----

    /// Child names in stored order.
    fn child_names(&self) -> Result<Vec<String>>;

    /// Probe for a child; never fails.
    fn has_child(&self, name: &str) -> bool {
        self.child_names().map(|names| names.iter().any(|n| n == name)).unwrap_or(false)
    }

    fn child(&self, name: &str, missing: MissingBehaviour) -> Result<Option<LocationHandle>>;

    /// Create a new child; fails if the name exists.
    fn create_child(&self, name: &str) -> Result<LocationHandle>;

    // ---- tags ----

    /// Tags selected by `filter`, sorted and without duplicates.
    fn read_tags(&self, filter: TagFilter) -> Result<Vec<String>>;

    /// Declare local tags.
    fn write_tags(&self, tags: &[String]) -> Result<()>;

    fn has_tag(&self, name: &str, filter: TagFilter) -> Result<bool> {
        Ok(self.read_tags(filter)?.iter().any(|t| t == name))
    }

    // ---- sets ----

    /// Set `name` at this location, with paths relative to it. With
    /// `include_descendants`, same-named sets below are merged in.
    fn read_set(&self, name: &str, include_descendants: bool) -> Result<PathSet>;

    /// Store a set local to this location; replaces an earlier set of the same name.
    fn write_set(&self, name: &str, set: &PathSet) -> Result<()>;

    fn set_names(&self, include_descendants: bool) -> Result<Vec<String>>;

    // ---- lifecycle ----

    /// Finalize a write-mode location now instead of on release.
    fn finish(&self) -> Result<()>;

    // ---- hashing ----

    /// Mix the content hash of one aspect at `time` into `h`.
    ///
    /// The default reads values and hashes them; backends with cheaper
    /// identities override it.
    fn hash(&self, kind: &HashType, time: Chrono, h: &mut MurmurHash) -> Result<()> {
        kind.seed(h);
        match kind {
            HashType::Bound => {
                if self.has_bound() {
                    hash_bound(&self.read_bound(time)?, h);
                }
            }
            HashType::Transform => {
                if self.has_transform() {
                    self.read_transform(time)?.hash(h);
                }
            }
            HashType::Attribute(name) => {
                if self.has_attribute(name) {
                    self.read_attribute(name, time)?.hash(h);
                }
            }
            HashType::Object => {
                if self.has_object() {
                    self.read_object(time)?.hash(h);
                }
            }
            HashType::ChildNames => {
                for name in self.child_names()? {
                    h.append_str(&name);
                }
            }
            HashType::Hierarchy => hash_hierarchy(self, time, h, false)?,
        }
        Ok(())
    }
}

fn check_sampled(path: &Path, property: &str, count: usize) -> Result<()> {
    if count == 0 {
        return Err(Error::NoSample {
            path: path.clone(),
            property: property.to_string(),
            index: 0,
            count: 0,
        });
    }
    Ok(())
}

pub(crate) fn hash_bound(b: &BBox3d, h: &mut MurmurHash) {
    h.append_f64_slice(&[b.min.x, b.min.y, b.min.z, b.max.x, b.max.y, b.max.z]);
}

/// Hash a location's own content and, recursively, its children.
///
/// Children are hashed independently and combined in stored order, so the
/// result does not depend on `parallel`.
pub fn hash_hierarchy<L>(location: &L, time: Chrono, h: &mut MurmurHash, parallel: bool) -> Result<()>
where
    L: Location + ?Sized,
{
    let mut kinds = vec![HashType::Transform, HashType::Object, HashType::Bound];
    kinds.extend(location.attribute_names().into_iter().map(HashType::Attribute));
    kinds.push(HashType::ChildNames);
    for kind in &kinds {
        location.hash(kind, time, h)?;
    }

    let names = location.child_names()?;
    let hash_child = |name: &String| -> Result<MurmurHash> {
        let child = expect_child(location, name)?;
        let mut sub = MurmurHash::new();
        child.hash(&HashType::Hierarchy, time, &mut sub)?;
        Ok(sub)
    };
    let child_hashes: Vec<MurmurHash> = if parallel {
        names.par_iter().map(hash_child).collect::<Result<_>>()?
    } else {
        names.iter().map(hash_child).collect::<Result<_>>()?
    };
    for sub in &child_hashes {
        h.append_hash(sub);
    }
    Ok(())
}

fn expect_child<L: Location + ?Sized>(location: &L, name: &str) -> Result<LocationHandle> {
    location
        .child(name, MissingBehaviour::ThrowIfMissing)?
        .ok_or_else(|| Error::ChildNotFound {
            path: location.path().clone(),
            name: name.to_string(),
        })
}

/// Union of a location's local set with same-named sets of all descendants,
/// each prefixed by its path relative to `location`.
pub fn union_descendant_sets<L>(location: &L, name: &str, local: PathSet) -> Result<PathSet>
where
    L: Location + ?Sized,
{
    let mut result = local;
    for child_name in location.child_names()? {
        let child = expect_child(location, &child_name)?;
        let below = child.read_set(name, true)?;
        result.add_prefixed(&below, &Path::from_names([child_name]));
    }
    Ok(result)
}

/// Names of sets at a location and all its descendants, sorted.
pub fn descendant_set_names<L>(location: &L, local: Vec<String>) -> Result<Vec<String>>
where
    L: Location + ?Sized,
{
    let mut names = local;
    for child_name in location.child_names()? {
        let child = expect_child(location, &child_name)?;
        names.extend(child.set_names(true)?);
    }
    names.sort();
    names.dedup();
    Ok(names)
}

/// Walk `relative` from `start`.
///
/// `NullIfMissing` yields `Ok(None)` at the first missing segment;
/// `CreateIfMissing` creates the missing locations.
pub fn descend(start: &LocationHandle, relative: &Path, missing: MissingBehaviour) -> Result<Option<LocationHandle>> {
    let mut current = start.clone();
    for name in relative.names() {
        match current.child(name, missing)? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Compose a bound stream transformed by a transform stream.
///
/// Samples are produced at the union of both streams' times. Empty without a
/// bound.
pub fn transformed_bound_samples<L>(location: &L, epsilon: f64) -> Result<Vec<(Chrono, BBox3d)>>
where
    L: Location + ?Sized,
{
    let nb = location.num_bound_samples();
    if nb == 0 {
        return Ok(Vec::new());
    }
    let nt = location.num_transform_samples();
    let mut times = Vec::with_capacity(nb + nt);
    for i in 0..nb {
        times.push(location.bound_sample_time(i)?);
    }
    for i in 0..nt {
        times.push(location.transform_sample_time(i)?);
    }
    let times = merge_times(times, epsilon);

    times
        .into_iter()
        .map(|t| {
            let bound = location.read_bound(t)?;
            let matrix = location.read_transform_as_matrix(t)?;
            Ok((t, bound.transformed(&matrix)))
        })
        .collect()
}

/// Sort times and drop near-duplicates.
pub(crate) fn merge_times(mut times: Vec<Chrono>, epsilon: f64) -> Vec<Chrono> {
    times.sort_by(|a, b| a.total_cmp(b));
    times.dedup_by(|b, a| (*b - *a).abs() < epsilon);
    times
}
