//! In-memory scene.
//!
//! Readable and writable at once, with no finalization step and no bound
//! propagation. Used to build fixtures for overlays and by tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::{descendant_set_names, union_descendant_sets, Location, LocationHandle, MissingBehaviour};
use crate::core::{
    normalize_tags, Data, PathSet, SampleInterval, SceneConfig, TagFilter, TimeSamples, Transform,
};
use crate::util::{BBox3d, Chrono, Error, Path, Result};

#[derive(Default)]
struct MemNode {
    bound: TimeSamples<BBox3d>,
    transform: TimeSamples<Transform>,
    attributes: BTreeMap<String, TimeSamples<Data>>,
    object: TimeSamples<Data>,
    children: Vec<Arc<MemoryScene>>,
    tags: Vec<String>,
    sets: BTreeMap<String, PathSet>,
}

/// Location held entirely in memory.
pub struct MemoryScene {
    file_name: String,
    path: Path,
    snap_epsilon: f64,
    me: Weak<MemoryScene>,
    parent: Option<Weak<MemoryScene>>,
    node: RwLock<MemNode>,
}

fn sample_at<T: Clone>(samples: &TimeSamples<T>, path: &Path, property: &str, index: usize) -> Result<T> {
    samples.get(index).cloned().ok_or_else(|| Error::NoSample {
        path: path.clone(),
        property: property.to_string(),
        index,
        count: samples.len(),
    })
}

fn time_at<T>(samples: &TimeSamples<T>, path: &Path, property: &str, index: usize) -> Result<Chrono> {
    samples.time(index).ok_or_else(|| Error::NoSample {
        path: path.clone(),
        property: property.to_string(),
        index,
        count: samples.len(),
    })
}

impl MemoryScene {
    /// New empty root. `file_name` is reported by [`Location::file_name`].
    pub fn new(file_name: impl Into<String>) -> Arc<Self> {
        Self::with_config(file_name, &SceneConfig::default())
    }

    /// New empty root sampling with `config.snap_epsilon`.
    pub fn with_config(file_name: impl Into<String>, config: &SceneConfig) -> Arc<Self> {
        Self::build(file_name.into(), Path::root(), config.snap_epsilon, None)
    }

    fn build(file_name: String, path: Path, snap_epsilon: f64, parent: Option<Weak<MemoryScene>>) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            file_name,
            path,
            snap_epsilon,
            me: me.clone(),
            parent,
            node: RwLock::new(MemNode::default()),
        })
    }

    fn find_child(&self, name: &str) -> Option<Arc<MemoryScene>> {
        self.node.read().children.iter().find(|c| c.name() == name).cloned()
    }

    fn descendant_tags(&self, out: &mut Vec<String>) {
        for child in &self.node.read().children {
            out.extend(child.node.read().tags.iter().cloned());
            child.descendant_tags(out);
        }
    }
}

impl Location for MemoryScene {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn has_bound(&self) -> bool {
        !self.node.read().bound.is_empty()
    }

    fn num_bound_samples(&self) -> usize {
        self.node.read().bound.len()
    }

    fn bound_sample_time(&self, index: usize) -> Result<Chrono> {
        time_at(&self.node.read().bound, &self.path, "bound", index)
    }

    fn bound_sample_interval(&self, time: Chrono) -> SampleInterval {
        self.node.read().bound.interval(time, self.snap_epsilon)
    }

    fn read_bound_at_sample(&self, index: usize) -> Result<BBox3d> {
        sample_at(&self.node.read().bound, &self.path, "bound", index)
    }

    fn write_bound(&self, bound: &BBox3d, time: Chrono) -> Result<()> {
        self.node.write().bound.push(&self.path, "bound", time, *bound)
    }

    fn has_transform(&self) -> bool {
        !self.node.read().transform.is_empty()
    }

    fn num_transform_samples(&self) -> usize {
        self.node.read().transform.len()
    }

    fn transform_sample_time(&self, index: usize) -> Result<Chrono> {
        time_at(&self.node.read().transform, &self.path, "transform", index)
    }

    fn transform_sample_interval(&self, time: Chrono) -> SampleInterval {
        self.node.read().transform.interval(time, self.snap_epsilon)
    }

    fn read_transform_at_sample(&self, index: usize) -> Result<Transform> {
        sample_at(&self.node.read().transform, &self.path, "transform", index)
    }

    fn write_transform(&self, transform: &Transform, time: Chrono) -> Result<()> {
        self.node.write().transform.push(&self.path, "transform", time, transform.clone())
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.node.read().attributes.contains_key(name)
    }

    fn attribute_names(&self) -> Vec<String> {
        self.node.read().attributes.keys().cloned().collect()
    }

    fn num_attribute_samples(&self, name: &str) -> usize {
        self.node.read().attributes.get(name).map_or(0, |s| s.len())
    }

    fn attribute_sample_time(&self, name: &str, index: usize) -> Result<Chrono> {
        let node = self.node.read();
        let samples = node.attributes.get(name).ok_or_else(|| Error::AttributeNotFound {
            path: self.path.clone(),
            name: name.to_string(),
        })?;
        time_at(samples, &self.path, name, index)
    }

    fn attribute_sample_interval(&self, name: &str, time: Chrono) -> SampleInterval {
        self.node
            .read()
            .attributes
            .get(name)
            .map_or(SampleInterval::exact(0), |s| s.interval(time, self.snap_epsilon))
    }

    fn read_attribute_at_sample(&self, name: &str, index: usize) -> Result<Data> {
        let node = self.node.read();
        let samples = node.attributes.get(name).ok_or_else(|| Error::AttributeNotFound {
            path: self.path.clone(),
            name: name.to_string(),
        })?;
        sample_at(samples, &self.path, name, index)
    }

    fn write_attribute(&self, name: &str, value: &Data, time: Chrono) -> Result<()> {
        let mut node = self.node.write();
        if let Some(samples) = node.attributes.get_mut(name) {
            return samples.push(&self.path, name, time, value.clone());
        }
        let mut samples = TimeSamples::new();
        samples.push(&self.path, name, time, value.clone())?;
        node.attributes.insert(name.to_string(), samples);
        Ok(())
    }

    fn has_object(&self) -> bool {
        !self.node.read().object.is_empty()
    }

    fn num_object_samples(&self) -> usize {
        self.node.read().object.len()
    }

    fn object_sample_time(&self, index: usize) -> Result<Chrono> {
        time_at(&self.node.read().object, &self.path, "object", index)
    }

    fn object_sample_interval(&self, time: Chrono) -> SampleInterval {
        self.node.read().object.interval(time, self.snap_epsilon)
    }

    fn read_object_at_sample(&self, index: usize) -> Result<Data> {
        sample_at(&self.node.read().object, &self.path, "object", index)
    }

    fn write_object(&self, object: &Data, time: Chrono) -> Result<()> {
        self.node.write().object.push(&self.path, "object", time, object.clone())
    }

    fn child_names(&self) -> Result<Vec<String>> {
        Ok(self.node.read().children.iter().map(|c| c.name().to_string()).collect())
    }

    fn child(&self, name: &str, missing: MissingBehaviour) -> Result<Option<LocationHandle>> {
        if let Some(child) = self.find_child(name) {
            return Ok(Some(child));
        }
        match missing {
            MissingBehaviour::NullIfMissing => Ok(None),
            MissingBehaviour::ThrowIfMissing => Err(Error::ChildNotFound {
                path: self.path.clone(),
                name: name.to_string(),
            }),
            MissingBehaviour::CreateIfMissing => self.create_child(name).map(Some),
        }
    }

    fn create_child(&self, name: &str) -> Result<LocationHandle> {
        let mut node = self.node.write();
        if node.children.iter().any(|c| c.name() == name) {
            return Err(Error::ChildExists {
                path: self.path.clone(),
                name: name.to_string(),
            });
        }
        let child = Self::build(
            self.file_name.clone(),
            self.path.child(name),
            self.snap_epsilon,
            Some(self.me.clone()),
        );
        node.children.push(child.clone());
        Ok(child)
    }

    fn read_tags(&self, filter: TagFilter) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        if filter.contains(TagFilter::LOCAL) {
            tags.extend(self.node.read().tags.iter().cloned());
        }
        if filter.contains(TagFilter::DESCENDANT) {
            self.descendant_tags(&mut tags);
        }
        if filter.contains(TagFilter::ANCESTOR) {
            let mut parent = self.parent.as_ref().and_then(Weak::upgrade);
            while let Some(p) = parent {
                tags.extend(p.node.read().tags.iter().cloned());
                parent = p.parent.as_ref().and_then(Weak::upgrade);
            }
        }
        normalize_tags(&mut tags);
        Ok(tags)
    }

    fn write_tags(&self, tags: &[String]) -> Result<()> {
        let mut node = self.node.write();
        node.tags.extend(tags.iter().cloned());
        normalize_tags(&mut node.tags);
        Ok(())
    }

    fn read_set(&self, name: &str, include_descendants: bool) -> Result<PathSet> {
        let local = self.node.read().sets.get(name).cloned().unwrap_or_default();
        if include_descendants {
            union_descendant_sets(self, name, local)
        } else {
            Ok(local)
        }
    }

    fn write_set(&self, name: &str, set: &PathSet) -> Result<()> {
        self.node.write().sets.insert(name.to_string(), set.clone());
        Ok(())
    }

    fn set_names(&self, include_descendants: bool) -> Result<Vec<String>> {
        let local: Vec<String> = self.node.read().sets.keys().cloned().collect();
        if include_descendants {
            descendant_set_names(self, local)
        } else {
            Ok(local)
        }
    }

    fn finish(&self) -> Result<()> {
        Ok(())
    }
}
