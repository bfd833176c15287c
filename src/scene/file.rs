//! File-backed scene store.
//!
//! Container layout:
//! ```text
//! /sampleTimes/<n>          shared sample time tables (f64 arrays)
//! /root                     root location
//! <location>/bound          property directory: `times` table index + one leaf per sample
//! <location>/transform
//! <location>/object
//! <location>/attributes/<name>
//! <location>/tags           local tags
//! <location>/descendantTags tags declared anywhere below
//! <location>/sets/<name>    paths relative to the location
//! <location>/children/<name>
//! ```
//!
//! Write-mode locations finalize when their handle is released (or on
//! [`Location::finish`]). Every child holds its parent alive, so children
//! always finalize first and hand their transformed bounds and tags to the
//! parent before the parent computes its own.

use std::collections::{BTreeMap, HashMap};
use std::path::Path as FsPath;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, error, trace};

use super::{descend, descendant_set_names, hash_hierarchy, merge_times, union_descendant_sets};
use super::{Location, LocationHandle, MissingBehaviour};
use crate::container::{ContainerReader, ContainerWriter, Directory, EntryKind, WriteDirectory};
use crate::core::{
    check_sample_time, normalize_tags, sample_interval, Data, HashType, MurmurHash, PathSet, SampleInterval,
    SceneConfig, TagFilter, TimeSamples, Transform,
};
use crate::util::{BBox3d, Chrono, Error, Path, Result};

const SAMPLE_TIMES: &str = "sampleTimes";
const ROOT: &str = "root";
const BOUND: &str = "bound";
const TRANSFORM: &str = "transform";
const OBJECT: &str = "object";
const ATTRIBUTES: &str = "attributes";
const TIMES: &str = "times";
const TAGS: &str = "tags";
const DESCENDANT_TAGS: &str = "descendantTags";
const SETS: &str = "sets";
const CHILDREN: &str = "children";

#[derive(Clone, Copy)]
enum Prop<'a> {
    Bound,
    Transform,
    Object,
    Attribute(&'a str),
}

impl Prop<'_> {
    fn name(&self) -> &str {
        match self {
            Prop::Bound => BOUND,
            Prop::Transform => TRANSFORM,
            Prop::Object => OBJECT,
            Prop::Attribute(name) => name,
        }
    }
}

// ============================================================================
// Read side
// ============================================================================

/// A stored property: its directory and sample times.
struct Property {
    dir: Directory,
    times: Arc<Vec<f64>>,
}

impl Property {
    fn load(tables: &[Arc<Vec<f64>>], parent: &Directory, name: &str) -> Result<Option<Self>> {
        let Some(dir) = parent.subdirectory(name)? else {
            return Ok(None);
        };
        let index = dir.read_u64(TIMES)? as usize;
        let times = tables
            .get(index)
            .cloned()
            .ok_or_else(|| Error::invalid(format!("property '{}' uses missing time table {}", name, index)))?;
        Ok(Some(Self { dir, times }))
    }
}

struct ReadNode {
    tables: Arc<Vec<Arc<Vec<f64>>>>,
    bound: Option<Property>,
    transform: Option<Property>,
    object: Option<Property>,
    attributes: BTreeMap<String, Property>,
    children: Option<Directory>,
    child_names: Vec<String>,
    tags: Vec<String>,
    descendant_tags: Vec<String>,
    sets: Option<Directory>,
}

impl ReadNode {
    fn load(tables: Arc<Vec<Arc<Vec<f64>>>>, dir: &Directory) -> Result<Self> {
        let bound = Property::load(&tables, dir, BOUND)?;
        let transform = Property::load(&tables, dir, TRANSFORM)?;
        let object = Property::load(&tables, dir, OBJECT)?;

        let mut attributes = BTreeMap::new();
        if let Some(attr_dir) = dir.subdirectory(ATTRIBUTES)? {
            for name in attr_dir.entry_names(Some(EntryKind::Directory)) {
                if let Some(p) = Property::load(&tables, &attr_dir, &name)? {
                    attributes.insert(name, p);
                }
            }
        }

        let children = dir.subdirectory(CHILDREN)?;
        let child_names = children
            .as_ref()
            .map(|c| c.entry_names(Some(EntryKind::Directory)))
            .unwrap_or_default();

        let read_tags = |name: &str| -> Result<Vec<String>> {
            if dir.has_entry(name) {
                dir.read_string_array(name)
            } else {
                Ok(Vec::new())
            }
        };
        let tags = read_tags(TAGS)?;
        let descendant_tags = read_tags(DESCENDANT_TAGS)?;
        let sets = dir.subdirectory(SETS)?;

        Ok(Self {
            tables,
            bound,
            transform,
            object,
            attributes,
            children,
            child_names,
            tags,
            descendant_tags,
            sets,
        })
    }

    fn property(&self, prop: Prop) -> Option<&Property> {
        match prop {
            Prop::Bound => self.bound.as_ref(),
            Prop::Transform => self.transform.as_ref(),
            Prop::Object => self.object.as_ref(),
            Prop::Attribute(name) => self.attributes.get(name),
        }
    }
}

// ============================================================================
// Write side
// ============================================================================

/// Deduplicated sample time tables of a store being written.
#[derive(Default)]
struct TimeTables {
    tables: Vec<Vec<f64>>,
    index: HashMap<Vec<u64>, u64>,
}

impl TimeTables {
    fn register(&mut self, times: &[f64]) -> u64 {
        let key: Vec<u64> = times.iter().map(|t| t.to_bits()).collect();
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.tables.len() as u64;
        self.tables.push(times.to_vec());
        self.index.insert(key, i);
        i
    }
}

struct WriteArchive {
    writer: ContainerWriter,
    tables: Mutex<TimeTables>,
}

impl WriteArchive {
    fn write_times(&self, dir: &WriteDirectory, times: &[f64]) -> Result<()> {
        let index = self.tables.lock().register(times);
        dir.write_u64(TIMES, index)
    }

    /// Write the time tables and freeze the file.
    fn close(&self) -> Result<()> {
        let tables = std::mem::take(&mut *self.tables.lock());
        let dir = self.writer.root().subdirectory(SAMPLE_TIMES)?;
        for (i, times) in tables.tables.iter().enumerate() {
            dir.write_f64_array(&i.to_string(), times)?;
        }
        self.writer.close()?;
        debug!(tables = tables.tables.len(), "closed scene store");
        Ok(())
    }
}

/// A property whose samples are written to the file as they arrive.
struct WriteProperty {
    dir: WriteDirectory,
    times: Vec<Chrono>,
}

impl WriteProperty {
    fn new(dir: WriteDirectory) -> Self {
        Self { dir, times: Vec::new() }
    }

    fn push(&mut self, path: &Path, property: &str, time: Chrono, bytes: &[u8]) -> Result<()> {
        check_sample_time(path, property, time, self.times.last().copied())?;
        self.dir.write(&self.times.len().to_string(), bytes)?;
        self.times.push(time);
        Ok(())
    }
}

struct ChildSlot {
    name: String,
    handle: Weak<FileSceneStore>,
    finalized: bool,
}

struct WriteNode {
    archive: Arc<WriteArchive>,
    dir: WriteDirectory,
    /// Explicitly written bound.
    bound: TimeSamples<BBox3d>,
    transform: TimeSamples<Transform>,
    object: Option<WriteProperty>,
    object_bounds: TimeSamples<BBox3d>,
    attributes: BTreeMap<String, WriteProperty>,
    children_dir: Option<WriteDirectory>,
    children: Vec<ChildSlot>,
    /// Transformed bounds handed up by finalized children.
    child_bounds: Vec<TimeSamples<BBox3d>>,
    tags: Vec<String>,
    descendant_tags: Vec<String>,
    sets: BTreeMap<String, PathSet>,
    finalized: bool,
}

impl WriteNode {
    fn new(archive: Arc<WriteArchive>, dir: WriteDirectory) -> Self {
        Self {
            archive,
            dir,
            bound: TimeSamples::new(),
            transform: TimeSamples::new(),
            object: None,
            object_bounds: TimeSamples::new(),
            attributes: BTreeMap::new(),
            children_dir: None,
            children: Vec::new(),
            child_bounds: Vec::new(),
            tags: Vec::new(),
            descendant_tags: Vec::new(),
            sets: BTreeMap::new(),
            finalized: false,
        }
    }

    fn times(&self, prop: Prop) -> &[f64] {
        match prop {
            Prop::Bound => self.bound.times(),
            Prop::Transform => self.transform.times(),
            Prop::Object => self.object.as_ref().map_or(&[][..], |p| p.times.as_slice()),
            Prop::Attribute(name) => self.attributes.get(name).map_or(&[][..], |p| p.times.as_slice()),
        }
    }

    /// Union of the object bound and every child contribution, sampled at
    /// every time any of them was sampled.
    fn propagated_bound(&self, path: &Path, epsilon: f64) -> Result<TimeSamples<BBox3d>> {
        let mut times = self.object_bounds.times().to_vec();
        for child in &self.child_bounds {
            times.extend_from_slice(child.times());
        }
        let times = merge_times(times, epsilon);

        let mut values = Vec::with_capacity(times.len());
        for &t in &times {
            let mut b = BBox3d::EMPTY;
            if !self.object_bounds.is_empty() {
                b.expand_by_box(&self.object_bounds.sample(path, BOUND, t, epsilon)?);
            }
            for child in &self.child_bounds {
                b.expand_by_box(&child.sample(path, BOUND, t, epsilon)?);
            }
            values.push(b);
        }
        TimeSamples::from_parts(times, values)
    }

    /// The bound in the parent's space, sampled at bound and transform times.
    fn transformed_bound(bound: &TimeSamples<BBox3d>, transform: &TimeSamples<Transform>, path: &Path, epsilon: f64) -> Result<TimeSamples<BBox3d>> {
        if bound.is_empty() {
            return Ok(TimeSamples::new());
        }
        let mut times = bound.times().to_vec();
        times.extend_from_slice(transform.times());
        let times = merge_times(times, epsilon);

        let mut values = Vec::with_capacity(times.len());
        for &t in &times {
            let b = bound.sample(path, BOUND, t, epsilon)?;
            let b = if transform.is_empty() {
                b
            } else {
                b.transformed(&transform.sample(path, TRANSFORM, t, epsilon)?.matrix()?)
            };
            values.push(b);
        }
        TimeSamples::from_parts(times, values)
    }

    fn write_bound(&self, bound: &TimeSamples<BBox3d>) -> Result<()> {
        if bound.is_empty() {
            return Ok(());
        }
        let dir = self.dir.subdirectory(BOUND)?;
        for (i, (_, b)) in bound.iter().enumerate() {
            dir.write(&i.to_string(), bytemuck::bytes_of(b))?;
        }
        self.archive.write_times(&dir, bound.times())
    }

    fn write_transform(&self) -> Result<()> {
        if self.transform.is_empty() {
            return Ok(());
        }
        let dir = self.dir.subdirectory(TRANSFORM)?;
        for (i, (_, t)) in self.transform.iter().enumerate() {
            let mut bytes = Vec::new();
            t.encode(&mut bytes);
            dir.write(&i.to_string(), &bytes)?;
        }
        self.archive.write_times(&dir, self.transform.times())
    }
}

// ============================================================================
// FileSceneStore
// ============================================================================

enum State {
    Read(ReadNode),
    Write(Mutex<WriteNode>),
}

/// A location of a scene stored in a single file.
///
/// A store is opened either for reading ([`open`](Self::open)) or for writing
/// ([`create`](Self::create)), never both.
pub struct FileSceneStore {
    file_name: String,
    path: Path,
    me: Weak<FileSceneStore>,
    parent: Option<Arc<FileSceneStore>>,
    config: Arc<SceneConfig>,
    state: State,
}

impl FileSceneStore {
    /// Open a store for reading.
    pub fn open(path: impl AsRef<FsPath>) -> Result<Arc<Self>> {
        Self::open_with_config(path, SceneConfig::default())
    }

    /// Open a store for reading with custom configuration.
    pub fn open_with_config(path: impl AsRef<FsPath>, config: SceneConfig) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let reader = ContainerReader::open(path, config.use_mmap)?;
        let root = reader.root();

        let mut tables = Vec::new();
        if let Some(dir) = root.subdirectory(SAMPLE_TIMES)? {
            let count = dir.entry_names(Some(EntryKind::Leaf)).len();
            for i in 0..count {
                tables.push(Arc::new(dir.read_f64_array(&i.to_string())?));
            }
        }

        let dir = root
            .subdirectory(ROOT)?
            .ok_or_else(|| Error::invalid("missing root location"))?;
        let node = ReadNode::load(Arc::new(tables), &dir)?;
        let file_name = path.to_string_lossy().to_string();
        debug!(file = %file_name, size = reader.size(), "opened scene store");

        Ok(Self::build(file_name, Path::root(), None, Arc::new(config), State::Read(node)))
    }

    /// Create a store for writing, truncating any existing file.
    pub fn create(path: impl AsRef<FsPath>) -> Result<Arc<Self>> {
        Self::create_with_config(path, SceneConfig::default())
    }

    /// Create a store for writing with custom configuration.
    pub fn create_with_config(path: impl AsRef<FsPath>, config: SceneConfig) -> Result<Arc<Self>> {
        let path = path.as_ref();
        let writer = ContainerWriter::create(path, &config)?;
        let dir = writer.root().subdirectory(ROOT)?;
        let archive = Arc::new(WriteArchive {
            writer,
            tables: Mutex::new(TimeTables::default()),
        });
        let file_name = path.to_string_lossy().to_string();
        debug!(file = %file_name, "created scene store");

        let node = WriteNode::new(archive, dir);
        Ok(Self::build(file_name, Path::root(), None, Arc::new(config), State::Write(Mutex::new(node))))
    }

    fn build(
        file_name: String,
        path: Path,
        parent: Option<Arc<FileSceneStore>>,
        config: Arc<SceneConfig>,
        state: State,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            file_name,
            path,
            me: me.clone(),
            parent,
            config,
            state,
        })
    }

    /// Whether the store was opened for writing.
    pub fn is_writable(&self) -> bool {
        matches!(self.state, State::Write(_))
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Location at an absolute path of this store.
    pub fn scene(&self, path: &Path, missing: MissingBehaviour) -> Result<Option<LocationHandle>> {
        let mut top = self.me.upgrade().ok_or_else(|| Error::Finalized(self.path.clone()))?;
        while let Some(parent) = top.parent.clone() {
            top = parent;
        }
        let root: LocationHandle = top;
        descend(&root, path, missing)
    }

    /// Shared sample time tables (read mode).
    pub fn sample_time_tables(&self) -> Result<Vec<Vec<f64>>> {
        let node = self.read_node("sample_time_tables")?;
        Ok(node.tables.iter().map(|t| t.as_ref().clone()).collect())
    }

    fn epsilon(&self) -> f64 {
        self.config.snap_epsilon
    }

    fn read_node(&self, op: &'static str) -> Result<&ReadNode> {
        match &self.state {
            State::Read(node) => Ok(node),
            State::Write(_) => Err(Error::WrongMode {
                op,
                mode: "write",
                path: self.path.clone(),
            }),
        }
    }

    fn write_node(&self, op: &'static str) -> Result<MutexGuard<'_, WriteNode>> {
        match &self.state {
            State::Write(node) => {
                let node = node.lock();
                if node.finalized {
                    return Err(Error::Finalized(self.path.clone()));
                }
                Ok(node)
            }
            State::Read(_) => Err(Error::WrongMode {
                op,
                mode: "read",
                path: self.path.clone(),
            }),
        }
    }

    fn with_times<R>(&self, prop: Prop, f: impl FnOnce(&[f64]) -> R) -> R {
        match &self.state {
            State::Read(node) => f(node.property(prop).map_or(&[][..], |p| p.times.as_slice())),
            State::Write(node) => f(node.lock().times(prop)),
        }
    }

    fn num_samples(&self, prop: Prop) -> usize {
        self.with_times(prop, |t| t.len())
    }

    fn sample_time(&self, prop: Prop, index: usize) -> Result<Chrono> {
        self.with_times(prop, |t| t.get(index).copied().ok_or(t.len()))
            .map_err(|count| Error::NoSample {
                path: self.path.clone(),
                property: prop.name().to_string(),
                index,
                count,
            })
    }

    fn interval(&self, prop: Prop, time: Chrono) -> SampleInterval {
        let epsilon = self.epsilon();
        self.with_times(prop, |t| sample_interval(t, time, epsilon))
    }

    fn sample_bytes(&self, prop: Prop, index: usize, op: &'static str) -> Result<Vec<u8>> {
        let node = self.read_node(op)?;
        let property = node.property(prop).ok_or_else(|| match prop {
            Prop::Attribute(name) => Error::AttributeNotFound {
                path: self.path.clone(),
                name: name.to_string(),
            },
            _ => Error::NoSample {
                path: self.path.clone(),
                property: prop.name().to_string(),
                index,
                count: 0,
            },
        })?;
        if index >= property.times.len() {
            return Err(Error::NoSample {
                path: self.path.clone(),
                property: prop.name().to_string(),
                index,
                count: property.times.len(),
            });
        }
        property.dir.read(&index.to_string())
    }

    fn create_write_child(&self, name: &str) -> Result<Arc<FileSceneStore>> {
        if name.is_empty() || name.contains('/') {
            return Err(Error::invalid(format!("invalid location name '{}'", name)));
        }
        let mut node = self.write_node("create_child")?;
        if node.children.iter().any(|c| c.name == name) {
            return Err(Error::ChildExists {
                path: self.path.clone(),
                name: name.to_string(),
            });
        }
        let children_dir = match node.children_dir.clone() {
            Some(dir) => dir,
            None => {
                let dir = node.dir.subdirectory(CHILDREN)?;
                node.children_dir = Some(dir.clone());
                dir
            }
        };
        let dir = children_dir.subdirectory(name)?;
        let parent = self.me.upgrade().ok_or_else(|| Error::Finalized(self.path.clone()))?;
        let state = State::Write(Mutex::new(WriteNode::new(node.archive.clone(), dir)));
        let child = Self::build(
            self.file_name.clone(),
            self.path.child(name),
            Some(parent),
            self.config.clone(),
            state,
        );
        node.children.push(ChildSlot {
            name: name.to_string(),
            handle: Arc::downgrade(&child),
            finalized: false,
        });
        Ok(child)
    }

    fn read_child(&self, name: &str) -> Result<Option<Arc<FileSceneStore>>> {
        let node = self.read_node("child")?;
        let Some(children) = &node.children else {
            return Ok(None);
        };
        let Some(dir) = children.subdirectory(name)? else {
            return Ok(None);
        };
        let child_node = ReadNode::load(node.tables.clone(), &dir)?;
        let parent = self.me.upgrade().ok_or_else(|| Error::invalid("location released"))?;
        Ok(Some(Self::build(
            self.file_name.clone(),
            self.path.child(name),
            Some(parent),
            self.config.clone(),
            State::Read(child_node),
        )))
    }

    /// Write the location's accumulated state and hand its bound and tags
    /// to the parent. Runs at most once.
    fn finalize(&self) -> Result<()> {
        let State::Write(node) = &self.state else {
            return Ok(());
        };
        let mut node = node.lock();
        if node.finalized {
            return Ok(());
        }
        if let Some(open) = node.children.iter().find(|c| !c.finalized && c.handle.strong_count() > 0) {
            return Err(Error::ChildOpen {
                path: self.path.clone(),
                child: open.name.clone(),
            });
        }
        node.finalized = true;

        let epsilon = self.epsilon();
        let bound = if node.bound.is_empty() {
            node.propagated_bound(&self.path, epsilon)?
        } else {
            node.bound.clone()
        };
        node.write_bound(&bound)?;
        node.write_transform()?;
        if let Some(object) = &node.object {
            node.archive.write_times(&object.dir, &object.times)?;
        }
        for attribute in node.attributes.values() {
            node.archive.write_times(&attribute.dir, &attribute.times)?;
        }

        if !node.tags.is_empty() {
            node.dir.write_string_array(TAGS, &node.tags)?;
        }
        normalize_tags(&mut node.descendant_tags);
        if !node.descendant_tags.is_empty() {
            node.dir.write_string_array(DESCENDANT_TAGS, &node.descendant_tags)?;
        }
        if !node.sets.is_empty() {
            let dir = node.dir.subdirectory(SETS)?;
            for (name, set) in &node.sets {
                dir.write_data(name, &set.to_data())?;
            }
        }

        debug!(
            path = %self.path,
            bound_samples = bound.len(),
            children = node.children.len(),
            "finalized location"
        );

        let contribution = WriteNode::transformed_bound(&bound, &node.transform, &self.path, epsilon)?;
        let mut tags_up = node.tags.clone();
        tags_up.extend(node.descendant_tags.iter().cloned());
        let archive = node.archive.clone();
        drop(node);

        match &self.parent {
            Some(parent) => parent.accept_child(self.name(), contribution, tags_up),
            None => archive.close(),
        }
    }

    fn accept_child(&self, name: &str, bound: TimeSamples<BBox3d>, tags: Vec<String>) -> Result<()> {
        let State::Write(node) = &self.state else {
            return Ok(());
        };
        let mut node = node.lock();
        if node.finalized {
            return Err(Error::Finalized(self.path.clone()));
        }
        if let Some(slot) = node.children.iter_mut().find(|c| c.name == name) {
            slot.finalized = true;
        }
        if node.bound.is_empty() && !bound.is_empty() {
            node.child_bounds.push(bound);
        }
        node.descendant_tags.extend(tags);
        Ok(())
    }

    fn fast_hash(&self, prop: Prop, time: Chrono, h: &mut MurmurHash) {
        h.append_str(&self.file_name);
        h.append_str(&self.path.to_string());
        let epsilon = self.epsilon();
        self.with_times(prop, |times| {
            if times.is_empty() {
                return;
            }
            let interval = sample_interval(times, time, epsilon);
            h.append_f64(times[interval.floor]);
            h.append_f64(times[interval.ceil]);
            h.append_f64(interval.factor);
        });
    }
}

impl Drop for FileSceneStore {
    fn drop(&mut self) {
        if !self.is_writable() {
            return;
        }
        if let Err(e) = self.finalize() {
            error!(path = %self.path, file = %self.file_name, "failed to finalize location: {}", e);
        }
    }
}

fn decode_bound(bytes: &[u8]) -> Result<BBox3d> {
    bytemuck::try_pod_read_unaligned(bytes).map_err(|e| Error::invalid(format!("bad bound sample: {:?}", e)))
}

impl Location for FileSceneStore {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn has_bound(&self) -> bool {
        self.num_samples(Prop::Bound) > 0
    }

    fn num_bound_samples(&self) -> usize {
        self.num_samples(Prop::Bound)
    }

    fn bound_sample_time(&self, index: usize) -> Result<Chrono> {
        self.sample_time(Prop::Bound, index)
    }

    fn bound_sample_interval(&self, time: Chrono) -> SampleInterval {
        self.interval(Prop::Bound, time)
    }

    fn read_bound_at_sample(&self, index: usize) -> Result<BBox3d> {
        decode_bound(&self.sample_bytes(Prop::Bound, index, "read_bound")?)
    }

    fn write_bound(&self, bound: &BBox3d, time: Chrono) -> Result<()> {
        trace!(path = %self.path, time, "write bound");
        self.write_node("write_bound")?.bound.push(&self.path, BOUND, time, *bound)
    }

    fn has_transform(&self) -> bool {
        self.num_samples(Prop::Transform) > 0
    }

    fn num_transform_samples(&self) -> usize {
        self.num_samples(Prop::Transform)
    }

    fn transform_sample_time(&self, index: usize) -> Result<Chrono> {
        self.sample_time(Prop::Transform, index)
    }

    fn transform_sample_interval(&self, time: Chrono) -> SampleInterval {
        self.interval(Prop::Transform, time)
    }

    fn read_transform_at_sample(&self, index: usize) -> Result<Transform> {
        Transform::decode(&self.sample_bytes(Prop::Transform, index, "read_transform")?)
    }

    fn write_transform(&self, transform: &Transform, time: Chrono) -> Result<()> {
        trace!(path = %self.path, time, "write transform");
        self.write_node("write_transform")?
            .transform
            .push(&self.path, TRANSFORM, time, transform.clone())
    }

    fn has_attribute(&self, name: &str) -> bool {
        self.num_samples(Prop::Attribute(name)) > 0
    }

    fn attribute_names(&self) -> Vec<String> {
        match &self.state {
            State::Read(node) => node.attributes.keys().cloned().collect(),
            State::Write(node) => node.lock().attributes.keys().cloned().collect(),
        }
    }

    fn num_attribute_samples(&self, name: &str) -> usize {
        self.num_samples(Prop::Attribute(name))
    }

    fn attribute_sample_time(&self, name: &str, index: usize) -> Result<Chrono> {
        self.sample_time(Prop::Attribute(name), index)
    }

    fn attribute_sample_interval(&self, name: &str, time: Chrono) -> SampleInterval {
        self.interval(Prop::Attribute(name), time)
    }

    fn read_attribute_at_sample(&self, name: &str, index: usize) -> Result<Data> {
        Data::decode(&self.sample_bytes(Prop::Attribute(name), index, "read_attribute")?)
    }

    fn write_attribute(&self, name: &str, value: &Data, time: Chrono) -> Result<()> {
        trace!(path = %self.path, attribute = name, time, "write attribute");
        let mut node = self.write_node("write_attribute")?;
        let previous = node.attributes.get(name).and_then(|p| p.times.last().copied());
        check_sample_time(&self.path, name, time, previous)?;
        if !node.attributes.contains_key(name) {
            let dir = node.dir.subdirectory(ATTRIBUTES)?.subdirectory(name)?;
            node.attributes.insert(name.to_string(), WriteProperty::new(dir));
        }
        let mut bytes = Vec::new();
        value.encode(&mut bytes);
        match node.attributes.get_mut(name) {
            Some(property) => property.push(&self.path, name, time, &bytes),
            None => Err(Error::AttributeNotFound {
                path: self.path.clone(),
                name: name.to_string(),
            }),
        }
    }

    fn has_object(&self) -> bool {
        self.num_samples(Prop::Object) > 0
    }

    fn num_object_samples(&self) -> usize {
        self.num_samples(Prop::Object)
    }

    fn object_sample_time(&self, index: usize) -> Result<Chrono> {
        self.sample_time(Prop::Object, index)
    }

    fn object_sample_interval(&self, time: Chrono) -> SampleInterval {
        self.interval(Prop::Object, time)
    }

    fn read_object_at_sample(&self, index: usize) -> Result<Data> {
        Data::decode(&self.sample_bytes(Prop::Object, index, "read_object")?)
    }

    fn write_object(&self, object: &Data, time: Chrono) -> Result<()> {
        trace!(path = %self.path, time, kind = object.type_name(), "write object");
        let mut node = self.write_node("write_object")?;
        let node = &mut *node;
        let previous = node.object.as_ref().and_then(|p| p.times.last().copied());
        check_sample_time(&self.path, OBJECT, time, previous)?;
        if node.object.is_none() {
            node.object = Some(WriteProperty::new(node.dir.subdirectory(OBJECT)?));
        }
        let mut bytes = Vec::new();
        object.encode(&mut bytes);
        if let Some(property) = node.object.as_mut() {
            property.push(&self.path, OBJECT, time, &bytes)?;
        }
        if let Some(b) = object.bound() {
            node.object_bounds.push(&self.path, OBJECT, time, b)?;
        }
        Ok(())
    }

    fn child_names(&self) -> Result<Vec<String>> {
        match &self.state {
            State::Read(node) => Ok(node.child_names.clone()),
            State::Write(node) => Ok(node.lock().children.iter().map(|c| c.name.clone()).collect()),
        }
    }

    fn has_child(&self, name: &str) -> bool {
        match &self.state {
            State::Read(node) => node.child_names.iter().any(|n| n == name),
            State::Write(node) => node.lock().children.iter().any(|c| c.name == name),
        }
    }

    fn child(&self, name: &str, missing: MissingBehaviour) -> Result<Option<LocationHandle>> {
        let found: Option<LocationHandle> = match &self.state {
            State::Read(_) => {
                if missing == MissingBehaviour::CreateIfMissing {
                    return Err(Error::CreateInReadMode {
                        path: self.path.clone(),
                        name: name.to_string(),
                    });
                }
                self.read_child(name)?.map(|c| c as LocationHandle)
            }
            State::Write(node) => {
                let node = node.lock();
                match node.children.iter().find(|c| c.name == name) {
                    Some(slot) => match slot.handle.upgrade() {
                        Some(handle) if !slot.finalized => Some(handle as LocationHandle),
                        _ => return Err(Error::Finalized(self.path.child(name))),
                    },
                    None => None,
                }
            }
        };

        match (found, missing) {
            (Some(child), _) => Ok(Some(child)),
            (None, MissingBehaviour::NullIfMissing) => Ok(None),
            (None, MissingBehaviour::ThrowIfMissing) => Err(Error::ChildNotFound {
                path: self.path.clone(),
                name: name.to_string(),
            }),
            (None, MissingBehaviour::CreateIfMissing) => {
                let child: LocationHandle = self.create_write_child(name)?;
                Ok(Some(child))
            }
        }
    }

    fn create_child(&self, name: &str) -> Result<LocationHandle> {
        let child: LocationHandle = self.create_write_child(name)?;
        Ok(child)
    }

    fn read_tags(&self, filter: TagFilter) -> Result<Vec<String>> {
        let node = self.read_node("read_tags")?;
        let mut tags = Vec::new();
        if filter.contains(TagFilter::LOCAL) {
            tags.extend(node.tags.iter().cloned());
        }
        if filter.contains(TagFilter::DESCENDANT) {
            tags.extend(node.descendant_tags.iter().cloned());
        }
        if filter.contains(TagFilter::ANCESTOR) {
            let mut parent = self.parent.clone();
            while let Some(p) = parent {
                tags.extend(p.read_node("read_tags")?.tags.iter().cloned());
                parent = p.parent.clone();
            }
        }
        normalize_tags(&mut tags);
        Ok(tags)
    }

    fn write_tags(&self, tags: &[String]) -> Result<()> {
        let mut node = self.write_node("write_tags")?;
        node.tags.extend(tags.iter().cloned());
        normalize_tags(&mut node.tags);
        Ok(())
    }

    fn read_set(&self, name: &str, include_descendants: bool) -> Result<PathSet> {
        let node = self.read_node("read_set")?;
        let local = match &node.sets {
            Some(dir) if dir.has_entry(name) => PathSet::from_data(&dir.read_data(name)?)?,
            _ => PathSet::new(),
        };
        if include_descendants {
            union_descendant_sets(self, name, local)
        } else {
            Ok(local)
        }
    }

    fn write_set(&self, name: &str, set: &PathSet) -> Result<()> {
        self.write_node("write_set")?.sets.insert(name.to_string(), set.clone());
        Ok(())
    }

    fn set_names(&self, include_descendants: bool) -> Result<Vec<String>> {
        let node = self.read_node("set_names")?;
        let local = node
            .sets
            .as_ref()
            .map(|d| d.entry_names(Some(EntryKind::Leaf)))
            .unwrap_or_default();
        if include_descendants {
            descendant_set_names(self, local)
        } else {
            Ok(local)
        }
    }

    fn finish(&self) -> Result<()> {
        match &self.state {
            State::Write(_) => self.finalize(),
            State::Read(_) => Err(Error::WrongMode {
                op: "finish",
                mode: "read",
                path: self.path.clone(),
            }),
        }
    }

    /// Hashes identify content by file, location and sample bracket, so no
    /// sample is read.
    fn hash(&self, kind: &HashType, time: Chrono, h: &mut MurmurHash) -> Result<()> {
        self.read_node("hash")?;
        kind.seed(h);
        match kind {
            HashType::Bound => self.fast_hash(Prop::Bound, time, h),
            HashType::Transform => self.fast_hash(Prop::Transform, time, h),
            HashType::Object => self.fast_hash(Prop::Object, time, h),
            HashType::Attribute(name) => self.fast_hash(Prop::Attribute(name), time, h),
            HashType::ChildNames => {
                h.append_str(&self.file_name);
                h.append_str(&self.path.to_string());
                for name in self.child_names()? {
                    h.append_str(&name);
                }
            }
            HashType::Hierarchy => hash_hierarchy(self, time, h, true)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::XformOp;
    use crate::util::DVec3;
    use tempfile::NamedTempFile;

    fn unit_box() -> BBox3d {
        BBox3d::new(DVec3::ZERO, DVec3::ONE)
    }

    #[test]
    fn test_time_tables_deduplicate() {
        let mut tables = TimeTables::default();
        assert_eq!(tables.register(&[0.0, 1.0]), 0);
        assert_eq!(tables.register(&[0.0, 2.0]), 1);
        assert_eq!(tables.register(&[0.0, 1.0]), 0);
        assert_eq!(tables.tables.len(), 2);
    }

    #[test]
    fn test_shared_time_tables_on_disk() -> Result<()> {
        let file = NamedTempFile::new()?;
        {
            let root = FileSceneStore::create(file.path())?;
            let a = root.create_child("a")?;
            for t in [0.0, 1.0, 2.0] {
                a.write_object(&Data::Float(t), t)?;
                a.write_transform(&Transform::from_translation(DVec3::X * t), t)?;
                a.write_attribute("weight", &Data::Float(t), t)?;
            }
        }
        let root = FileSceneStore::open(file.path())?;
        assert_eq!(root.sample_time_tables()?, vec![vec![0.0, 1.0, 2.0]]);
        Ok(())
    }

    #[test]
    fn test_modes_are_exclusive() -> Result<()> {
        let file = NamedTempFile::new()?;
        {
            let root = FileSceneStore::create(file.path())?;
            assert!(root.is_writable());
            root.write_bound(&unit_box(), 0.0)?;
            assert!(matches!(root.read_bound(0.0), Err(Error::WrongMode { .. })));
            assert!(matches!(root.read_tags(TagFilter::LOCAL), Err(Error::WrongMode { .. })));
        }
        let root = FileSceneStore::open(file.path())?;
        assert!(matches!(root.write_bound(&unit_box(), 1.0), Err(Error::WrongMode { .. })));
        assert!(matches!(root.create_child("x"), Err(Error::WrongMode { .. })));
        assert!(matches!(
            root.child("x", MissingBehaviour::CreateIfMissing),
            Err(Error::CreateInReadMode { .. })
        ));
        assert!(matches!(root.finish(), Err(Error::WrongMode { .. })));
        Ok(())
    }

    #[test]
    fn test_finalized_child_cannot_reopen() -> Result<()> {
        let file = NamedTempFile::new()?;
        let root = FileSceneStore::create(file.path())?;
        let a = root.create_child("a")?;
        let b = a.create_child("b")?;
        assert!(matches!(a.finish(), Err(Error::ChildOpen { .. })));

        // The same live handle comes back while it is open.
        let again = a.child("b", MissingBehaviour::ThrowIfMissing)?.expect("b");
        assert!(Arc::ptr_eq(&b, &again));
        drop(again);
        drop(b);

        assert!(matches!(a.child("b", MissingBehaviour::NullIfMissing), Err(Error::Finalized(_))));
        assert!(matches!(a.create_child("b"), Err(Error::ChildExists { .. })));
        a.finish()?;
        assert!(matches!(a.write_object(&Data::Int(1), 0.0), Err(Error::Finalized(_))));
        Ok(())
    }

    #[test]
    fn test_explicit_bound_is_trusted() -> Result<()> {
        let file = NamedTempFile::new()?;
        let small = BBox3d::new(DVec3::ZERO, DVec3::splat(0.5));
        {
            let root = FileSceneStore::create(file.path())?;
            root.write_bound(&small, 0.0)?;
            let a = root.create_child("a")?;
            a.write_transform(&Transform::identity().with(XformOp::translate(10.0, 0.0, 0.0)), 0.0)?;
            a.write_object(&Data::Box3d(unit_box()), 0.0)?;
        }
        let root = FileSceneStore::open(file.path())?;
        assert_eq!(root.read_bound(0.0)?, small);
        let a = root.child("a", MissingBehaviour::ThrowIfMissing)?.expect("a");
        assert_eq!(a.read_bound(0.0)?, unit_box());
        Ok(())
    }

    #[test]
    fn test_fast_hash_tracks_sample_bracket() -> Result<()> {
        let file = NamedTempFile::new()?;
        {
            let root = FileSceneStore::create(file.path())?;
            let a = root.create_child("a")?;
            a.write_object(&Data::Float(0.0), 0.0)?;
            a.write_object(&Data::Float(1.0), 1.0)?;
            let b = root.create_child("b")?;
            b.write_object(&Data::Float(0.0), 0.0)?;
        }
        let root = FileSceneStore::open(file.path())?;
        let a = root.child("a", MissingBehaviour::ThrowIfMissing)?.expect("a");
        let b = root.child("b", MissingBehaviour::ThrowIfMissing)?.expect("b");
        let hash = |l: &LocationHandle, kind: HashType, t: f64| -> Result<MurmurHash> {
            let mut h = MurmurHash::new();
            l.hash(&kind, t, &mut h)?;
            Ok(h)
        };
        assert_eq!(hash(&a, HashType::Object, 0.25)?, hash(&a, HashType::Object, 0.25)?);
        assert_ne!(hash(&a, HashType::Object, 0.25)?, hash(&a, HashType::Object, 0.5)?);
        assert_ne!(hash(&a, HashType::Object, 0.0)?, hash(&b, HashType::Object, 0.0)?);
        assert_ne!(hash(&a, HashType::Object, 0.0)?, hash(&a, HashType::Transform, 0.0)?);
        // Single-sample streams hash the same at any time.
        assert_eq!(hash(&b, HashType::Object, 0.0)?, hash(&b, HashType::Object, 7.0)?);

        let root: LocationHandle = root;
        assert_ne!(hash(&root, HashType::Hierarchy, 0.0)?, hash(&root, HashType::Hierarchy, 0.5)?);
        Ok(())
    }

    #[test]
    fn test_scene_lookup_by_path() -> Result<()> {
        let file = NamedTempFile::new()?;
        {
            let root = FileSceneStore::create(file.path())?;
            root.create_child("a")?.create_child("b")?.write_tags(&["deep".to_string()])?;
        }
        let root = FileSceneStore::open(file.path())?;
        let b = root.scene(&Path::parse("/a/b"), MissingBehaviour::ThrowIfMissing)?.expect("b");
        assert_eq!(b.read_tags(TagFilter::LOCAL)?, vec!["deep"]);
        assert!(root.scene(&Path::parse("/a/x"), MissingBehaviour::NullIfMissing)?.is_none());
        assert!(root.has_child("a"));
        assert!(!root.has_child("b"));
        Ok(())
    }
}
