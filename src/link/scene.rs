//! The link overlay.
//!
//! A [`LinkScene`] wraps a main scene and presents linked stores spliced in at
//! link boundaries. Each overlay location is in one of three states:
//! - in the main scene: everything reads from the main location;
//! - at a link boundary (carries [`LINK_ATTRIBUTE`]): transform, attributes
//!   and local tags come from the main scene, while bound, object, children
//!   and sets come from the linked root, at remapped times;
//! - inside a linked scene: everything reads from the linked location, at
//!   remapped times.
//!
//! Linked stores are resolved on first use and cached per overlay. Child
//! overlay locations are memoized per parent in read mode.

use std::collections::HashMap;
use std::path::Path as FsPath;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{FileResolver, LinkCache, LinkDescriptor, StoreResolver, LINK_ATTRIBUTE};
use crate::core::{
    check_sample_time, Data, HashType, MurmurHash, PathSet, SampleInterval, SceneConfig, TagFilter, Transform,
};
use crate::scene::{
    descend, descendant_set_names, hash_hierarchy, union_descendant_sets, FileSceneStore, Location, LocationHandle,
    MissingBehaviour,
};
use crate::util::{BBox3d, Chrono, Error, Path, Result};

/// Maps overlay time to time in a linked store.
struct Remap {
    /// Location carrying the link attribute.
    boundary: LocationHandle,
    /// Whether the descriptor carries remap times.
    animated: bool,
    /// Remap of an enclosing link, applied first.
    outer: Option<Arc<Remap>>,
}

impl Remap {
    fn apply(&self, time: Chrono) -> Result<Chrono> {
        let time = match &self.outer {
            Some(outer) => outer.apply(time)?,
            None => time,
        };
        if !self.animated {
            return Ok(time);
        }
        let data = self.boundary.read_attribute(LINK_ATTRIBUTE, time)?;
        Ok(LinkDescriptor::from_data(self.boundary.path(), &data)?.time.unwrap_or(time))
    }
}

fn map_time(remap: &Option<Arc<Remap>>, time: Chrono) -> Result<Chrono> {
    match remap {
        Some(r) => r.apply(time),
        None => Ok(time),
    }
}

/// A resolved link: the linked root and the remap to reach it.
struct Resolved {
    target: LocationHandle,
    remap: Arc<Remap>,
}

struct Overlay {
    file_name: String,
    cache: LinkCache,
    resolver: Arc<dyn StoreResolver>,
    writable: bool,
}

/// Overlay location splicing linked stores into a main scene.
pub struct LinkScene {
    shared: Arc<Overlay>,
    /// Main-scene location, or the linked location inside a link.
    location: LocationHandle,
    path: Path,
    /// Overlay time to `location` time; `None` in the main scene.
    remap: Option<Arc<Remap>>,
    /// Ancestor tags from above the linked store `location` belongs to.
    inherited_tags: Option<Vec<String>>,
    /// Lazily resolved link, present at link boundaries.
    link: Option<Mutex<Option<Arc<Resolved>>>>,
    children: Mutex<HashMap<String, Arc<LinkScene>>>,
}

impl LinkScene {
    /// Open a scene file for reading through the overlay.
    pub fn open(path: impl AsRef<FsPath>) -> Result<Arc<Self>> {
        Self::open_with(path, SceneConfig::default())
    }

    /// Open for reading with custom configuration; linked files use the same.
    pub fn open_with(path: impl AsRef<FsPath>, config: SceneConfig) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let main = FileSceneStore::open_with_config(path, config.clone())?;
        let resolver = FileResolver::new(config, path.parent().map(FsPath::to_path_buf));
        Ok(Self::reader(main, Arc::new(resolver)))
    }

    /// Create a scene file for writing through the overlay.
    pub fn create(path: impl AsRef<FsPath>) -> Result<Arc<Self>> {
        Self::create_with(path, SceneConfig::default())
    }

    pub fn create_with(path: impl AsRef<FsPath>, config: SceneConfig) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let main = FileSceneStore::create_with_config(path, config.clone())?;
        let resolver = FileResolver::new(config, path.parent().map(FsPath::to_path_buf));
        Ok(Self::writer(main, Arc::new(resolver)))
    }

    /// Overlay for reading an already opened main scene.
    pub fn reader(main: LocationHandle, resolver: Arc<dyn StoreResolver>) -> Arc<Self> {
        Self::wrap_root(main, resolver, false)
    }

    /// Overlay for writing into an already created main scene.
    pub fn writer(main: LocationHandle, resolver: Arc<dyn StoreResolver>) -> Arc<Self> {
        Self::wrap_root(main, resolver, true)
    }

    fn wrap_root(main: LocationHandle, resolver: Arc<dyn StoreResolver>, writable: bool) -> Arc<Self> {
        let shared = Arc::new(Overlay {
            file_name: main.file_name().to_string(),
            cache: LinkCache::new(),
            resolver,
            writable,
        });
        let path = main.path().clone();
        Arc::new(Self::wrap(shared, main, path, None, None))
    }

    fn wrap(
        shared: Arc<Overlay>,
        location: LocationHandle,
        path: Path,
        remap: Option<Arc<Remap>>,
        inherited_tags: Option<Vec<String>>,
    ) -> Self {
        let link = (!shared.writable && location.has_attribute(LINK_ATTRIBUTE)).then(|| Mutex::new(None));
        Self {
            shared,
            location,
            path,
            remap,
            inherited_tags,
            link,
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Linked stores opened so far by this overlay.
    pub fn link_cache(&self) -> &LinkCache {
        &self.shared.cache
    }

    /// Whether this location sources its content from a linked store.
    pub fn is_link_boundary(&self) -> bool {
        self.link.is_some()
    }

    /// Whether this location lives inside a linked store.
    pub fn is_linked(&self) -> bool {
        self.remap.is_some()
    }

    /// Link descriptor at `time`, if the location carries one.
    pub fn read_link(&self, time: Chrono) -> Result<Option<LinkDescriptor>> {
        if !self.location.has_attribute(LINK_ATTRIBUTE) {
            return Ok(None);
        }
        let data = self.location.read_attribute(LINK_ATTRIBUTE, map_time(&self.remap, time)?)?;
        LinkDescriptor::from_data(&self.path, &data).map(Some)
    }

    /// Location at an absolute overlay path.
    pub fn scene(self: &Arc<Self>, path: &Path, missing: MissingBehaviour) -> Result<Option<LocationHandle>> {
        let relative = path
            .strip_prefix(&self.path)
            .ok_or_else(|| Error::ChildNotFound {
                path: self.path.clone(),
                name: path.to_string(),
            })?;
        let start: LocationHandle = self.clone();
        descend(&start, &relative, missing)
    }

    /// Overlay child, typed so link operations stay reachable.
    pub fn child_scene(&self, name: &str, missing: MissingBehaviour) -> Result<Option<Arc<LinkScene>>> {
        if missing == MissingBehaviour::CreateIfMissing {
            self.check_write(true)?;
        }
        self.wrap_child(name, missing)
    }

    /// Create a child in the main scene and return its overlay location.
    pub fn create_scene(&self, name: &str) -> Result<Arc<LinkScene>> {
        self.check_write(true)?;
        let child = self.location.create_child(name)?;
        Ok(Arc::new(Self::wrap(self.shared.clone(), child, self.path.child(name), None, None)))
    }

    /// Write a link descriptor sample, turning this location into a link
    /// boundary.
    ///
    /// The first sample also copies the linked root's tags onto this location
    /// so its ancestors report them, and records the linked root's bound as
    /// this location's bound.
    pub fn write_link(&self, link: &LinkDescriptor, time: Chrono) -> Result<()> {
        if !self.shared.writable {
            return Err(Error::WrongMode {
                op: "write_link",
                mode: "read",
                path: self.path.clone(),
            });
        }
        if !self.location.child_names()?.is_empty() || self.location.has_object() {
            return Err(Error::CompositedWrite(self.path.clone()));
        }

        let first = !self.location.has_attribute(LINK_ATTRIBUTE);
        let target = self.open_target(link)?;
        let bounds = Self::link_bounds(target.as_ref(), link, time, first)?;

        // Nothing is written unless every sample lands in order.
        let previous = match self.location.num_attribute_samples(LINK_ATTRIBUTE) {
            0 => None,
            n => Some(self.location.attribute_sample_time(LINK_ATTRIBUTE, n - 1)?),
        };
        check_sample_time(&self.path, LINK_ATTRIBUTE, time, previous)?;
        let mut previous = match self.location.num_bound_samples() {
            0 => None,
            n => Some(self.location.bound_sample_time(n - 1)?),
        };
        for (t, _) in &bounds {
            check_sample_time(&self.path, "bound", *t, previous)?;
            previous = Some(*t);
        }

        self.location.write_attribute(LINK_ATTRIBUTE, &link.to_data(), time)?;
        debug!(path = %self.path, file = %link.file_name, root = %link.root, time, "wrote link");
        if first {
            let tags = target.read_tags(TagFilter::LOCAL | TagFilter::DESCENDANT)?;
            if !tags.is_empty() {
                self.location.write_tags(&tags)?;
            }
        }
        for (t, bound) in &bounds {
            self.location.write_bound(bound, *t)?;
        }
        Ok(())
    }

    /// Bound samples a link write records at this location.
    fn link_bounds(
        target: &dyn Location,
        link: &LinkDescriptor,
        time: Chrono,
        first: bool,
    ) -> Result<Vec<(Chrono, BBox3d)>> {
        if !target.has_bound() {
            return Ok(Vec::new());
        }
        match link.time {
            Some(linked_time) => Ok(vec![(time, target.read_bound(linked_time)?)]),
            // A pass-through link mirrors every bound sample, once.
            None if first => (0..target.num_bound_samples())
                .map(|i| Ok((target.bound_sample_time(i)?, target.read_bound_at_sample(i)?)))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    fn open_target(&self, link: &LinkDescriptor) -> Result<LocationHandle> {
        let root = self.shared.cache.get_or_open(&link.file_name, self.shared.resolver.as_ref())?;
        descend(&root, &link.root, MissingBehaviour::NullIfMissing)?.ok_or_else(|| Error::LinkRootNotFound {
            file: link.file_name.clone().into(),
            root: link.root.clone(),
        })
    }

    /// The linked root at a boundary, resolving it on first use.
    fn resolved(&self) -> Result<Option<Arc<Resolved>>> {
        let Some(slot) = &self.link else {
            return Ok(None);
        };
        let mut slot = slot.lock();
        if let Some(resolved) = slot.as_ref() {
            return Ok(Some(resolved.clone()));
        }

        let data = self.location.read_attribute_at_sample(LINK_ATTRIBUTE, 0)?;
        let link = LinkDescriptor::from_data(&self.path, &data)?;
        let target = self.open_target(&link)?;
        debug!(path = %self.path, file = %link.file_name, root = %link.root, "resolved link");

        let resolved = Arc::new(Resolved {
            target,
            remap: Arc::new(Remap {
                boundary: self.location.clone(),
                animated: self.location.num_attribute_samples(LINK_ATTRIBUTE) > 1 || link.time.is_some(),
                outer: self.remap.clone(),
            }),
        });
        *slot = Some(resolved.clone());
        Ok(Some(resolved))
    }

    /// Where bound, object and children come from, with its time remap.
    fn content(&self) -> Result<(LocationHandle, Option<Arc<Remap>>)> {
        match self.resolved()? {
            Some(r) => Ok((r.target.clone(), Some(r.remap.clone()))),
            None => Ok((self.location.clone(), self.remap.clone())),
        }
    }

    /// [`content`](Self::content) for probes, which must not fail.
    fn probe_content(&self) -> Option<(LocationHandle, Option<Arc<Remap>>)> {
        match self.content() {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(path = %self.path, "link target unavailable: {}", e);
                None
            }
        }
    }

    fn probe_time(&self, remap: &Option<Arc<Remap>>, time: Chrono) -> Chrono {
        map_time(remap, time).unwrap_or_else(|e| {
            warn!(path = %self.path, time, "time remap failed: {}", e);
            time
        })
    }

    fn check_write(&self, delegated: bool) -> Result<()> {
        if self.remap.is_some() {
            return Err(Error::CompositedWrite(self.path.clone()));
        }
        if delegated && (self.link.is_some() || (self.shared.writable && self.location.has_attribute(LINK_ATTRIBUTE))) {
            return Err(Error::CompositedWrite(self.path.clone()));
        }
        Ok(())
    }

    fn wrap_child(&self, name: &str, missing: MissingBehaviour) -> Result<Option<Arc<LinkScene>>> {
        if self.shared.writable {
            return Ok(self.location.child(name, missing)?.map(|child| {
                Arc::new(Self::wrap(self.shared.clone(), child, self.path.child(name), None, None))
            }));
        }
        if missing == MissingBehaviour::CreateIfMissing {
            return Err(Error::CreateInReadMode {
                path: self.path.clone(),
                name: name.to_string(),
            });
        }

        let mut children = self.children.lock();
        if let Some(child) = children.get(name) {
            return Ok(Some(child.clone()));
        }

        let (source, remap) = self.content()?;
        let Some(location) = source.child(name, missing)? else {
            return Ok(None);
        };
        let inherited_tags = if remap.is_some() {
            Some(self.read_tags(TagFilter::LOCAL | TagFilter::ANCESTOR)?)
        } else {
            None
        };
        let child = Arc::new(Self::wrap(
            self.shared.clone(),
            location,
            self.path.child(name),
            remap,
            inherited_tags,
        ));
        children.insert(name.to_string(), child.clone());
        Ok(Some(child))
    }
}

impl Location for LinkScene {
    fn file_name(&self) -> &str {
        &self.shared.file_name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn has_bound(&self) -> bool {
        self.probe_content().is_some_and(|(l, _)| l.has_bound())
    }

    fn num_bound_samples(&self) -> usize {
        self.probe_content().map_or(0, |(l, _)| l.num_bound_samples())
    }

    fn bound_sample_time(&self, index: usize) -> Result<Chrono> {
        self.content()?.0.bound_sample_time(index)
    }

    fn bound_sample_interval(&self, time: Chrono) -> SampleInterval {
        match self.probe_content() {
            Some((l, remap)) => l.bound_sample_interval(self.probe_time(&remap, time)),
            None => SampleInterval::exact(0),
        }
    }

    fn read_bound_at_sample(&self, index: usize) -> Result<BBox3d> {
        self.content()?.0.read_bound_at_sample(index)
    }

    fn read_bound(&self, time: Chrono) -> Result<BBox3d> {
        let (l, remap) = self.content()?;
        l.read_bound(map_time(&remap, time)?)
    }

    fn write_bound(&self, bound: &BBox3d, time: Chrono) -> Result<()> {
        self.check_write(true)?;
        self.location.write_bound(bound, time)
    }

    fn has_transform(&self) -> bool {
        self.location.has_transform()
    }

    fn num_transform_samples(&self) -> usize {
        self.location.num_transform_samples()
    }

    fn transform_sample_time(&self, index: usize) -> Result<Chrono> {
        self.location.transform_sample_time(index)
    }

    fn transform_sample_interval(&self, time: Chrono) -> SampleInterval {
        self.location.transform_sample_interval(self.probe_time(&self.remap, time))
    }

    fn read_transform_at_sample(&self, index: usize) -> Result<Transform> {
        self.location.read_transform_at_sample(index)
    }

    fn read_transform(&self, time: Chrono) -> Result<Transform> {
        self.location.read_transform(map_time(&self.remap, time)?)
    }

    fn write_transform(&self, transform: &Transform, time: Chrono) -> Result<()> {
        self.check_write(false)?;
        self.location.write_transform(transform, time)
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.location.has_attribute(name)
    }

    fn attribute_names(&self) -> Vec<String> {
        self.location.attribute_names()
    }

    fn num_attribute_samples(&self, name: &str) -> usize {
        self.location.num_attribute_samples(name)
    }

    fn attribute_sample_time(&self, name: &str, index: usize) -> Result<Chrono> {
        self.location.attribute_sample_time(name, index)
    }

    fn attribute_sample_interval(&self, name: &str, time: Chrono) -> SampleInterval {
        self.location.attribute_sample_interval(name, self.probe_time(&self.remap, time))
    }

    fn read_attribute_at_sample(&self, name: &str, index: usize) -> Result<Data> {
        self.location.read_attribute_at_sample(name, index)
    }

    fn read_attribute(&self, name: &str, time: Chrono) -> Result<Data> {
        self.location.read_attribute(name, map_time(&self.remap, time)?)
    }

    fn write_attribute(&self, name: &str, value: &Data, time: Chrono) -> Result<()> {
        self.check_write(false)?;
        if name == LINK_ATTRIBUTE {
            return self.write_link(&LinkDescriptor::from_data(&self.path, value)?, time);
        }
        self.location.write_attribute(name, value, time)
    }

    fn has_object(&self) -> bool {
        self.probe_content().is_some_and(|(l, _)| l.has_object())
    }

    fn num_object_samples(&self) -> usize {
        self.probe_content().map_or(0, |(l, _)| l.num_object_samples())
    }

    fn object_sample_time(&self, index: usize) -> Result<Chrono> {
        self.content()?.0.object_sample_time(index)
    }

    fn object_sample_interval(&self, time: Chrono) -> SampleInterval {
        match self.probe_content() {
            Some((l, remap)) => l.object_sample_interval(self.probe_time(&remap, time)),
            None => SampleInterval::exact(0),
        }
    }

    fn read_object_at_sample(&self, index: usize) -> Result<Data> {
        self.content()?.0.read_object_at_sample(index)
    }

    fn read_object(&self, time: Chrono) -> Result<Data> {
        let (l, remap) = self.content()?;
        l.read_object(map_time(&remap, time)?)
    }

    fn write_object(&self, object: &Data, time: Chrono) -> Result<()> {
        self.check_write(true)?;
        self.location.write_object(object, time)
    }

    fn child_names(&self) -> Result<Vec<String>> {
        match self.probe_content() {
            Some((l, _)) => l.child_names(),
            None => Ok(Vec::new()),
        }
    }

    fn has_child(&self, name: &str) -> bool {
        self.probe_content().is_some_and(|(l, _)| l.has_child(name))
    }

    fn child(&self, name: &str, missing: MissingBehaviour) -> Result<Option<LocationHandle>> {
        Ok(self.child_scene(name, missing)?.map(|c| c as LocationHandle))
    }

    fn create_child(&self, name: &str) -> Result<LocationHandle> {
        Ok(self.create_scene(name)? as LocationHandle)
    }

    fn read_tags(&self, filter: TagFilter) -> Result<Vec<String>> {
        let mut tags = Vec::new();
        let resolved = if filter.intersects(TagFilter::LOCAL | TagFilter::DESCENDANT) {
            self.resolved()?
        } else {
            None
        };

        if filter.contains(TagFilter::LOCAL) {
            tags.extend(self.location.read_tags(TagFilter::LOCAL)?);
            if let Some(r) = &resolved {
                tags.extend(r.target.read_tags(TagFilter::LOCAL)?);
            }
        }
        if filter.contains(TagFilter::DESCENDANT) {
            match &resolved {
                // The linked root sits below the boundary.
                Some(r) => tags.extend(r.target.read_tags(TagFilter::LOCAL | TagFilter::DESCENDANT)?),
                None => tags.extend(self.location.read_tags(TagFilter::DESCENDANT)?),
            }
        }
        if filter.contains(TagFilter::ANCESTOR) {
            match &self.inherited_tags {
                Some(inherited) => tags.extend(inherited.iter().cloned()),
                None => tags.extend(self.location.read_tags(TagFilter::ANCESTOR)?),
            }
        }
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    fn write_tags(&self, tags: &[String]) -> Result<()> {
        self.check_write(false)?;
        self.location.write_tags(tags)
    }

    fn read_set(&self, name: &str, include_descendants: bool) -> Result<PathSet> {
        let mut local = self.location.read_set(name, false)?;
        if let Some(r) = self.resolved()? {
            local.add_prefixed(&r.target.read_set(name, false)?, &Path::root());
        }
        if include_descendants {
            union_descendant_sets(self, name, local)
        } else {
            Ok(local)
        }
    }

    fn write_set(&self, name: &str, set: &PathSet) -> Result<()> {
        self.check_write(true)?;
        self.location.write_set(name, set)
    }

    fn set_names(&self, include_descendants: bool) -> Result<Vec<String>> {
        let mut local = self.location.set_names(false)?;
        if let Some(r) = self.resolved()? {
            local.extend(r.target.set_names(false)?);
        }
        if include_descendants {
            descendant_set_names(self, local)
        } else {
            local.sort();
            local.dedup();
            Ok(local)
        }
    }

    fn finish(&self) -> Result<()> {
        self.location.finish()
    }

    fn hash(&self, kind: &HashType, time: Chrono, h: &mut MurmurHash) -> Result<()> {
        match kind {
            HashType::Hierarchy => {
                kind.seed(h);
                hash_hierarchy(self, time, h, !self.shared.writable)
            }
            HashType::Bound | HashType::Object | HashType::ChildNames => {
                let (l, remap) = self.content()?;
                l.hash(kind, map_time(&remap, time)?, h)
            }
            HashType::Transform | HashType::Attribute(_) => {
                self.location.hash(kind, map_time(&self.remap, time)?, h)
            }
        }
    }
}
