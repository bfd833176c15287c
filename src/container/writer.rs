//! Container writer.
//!
//! Leaf payloads go to the file as soon as they are written. Directories are
//! kept in memory and written bottom-up when the container is closed, after
//! which the root position is patched into the header and the file is frozen.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path as FsPath;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use parking_lot::Mutex;

use super::compression::compress;
use super::format::*;
use super::EntryKind;
use crate::core::{Data, SceneConfig};
use crate::util::{Error, Result};

/// Output stream for writing container data.
pub struct OStream {
    writer: BufWriter<File>,
    pos: u64,
}

impl OStream {
    /// Create a new output stream for the given file path.
    pub fn create(path: impl AsRef<FsPath>) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            writer: BufWriter::with_capacity(1024 * 1024, file),
            pos: 0,
        })
    }

    /// Get the current write position.
    #[inline]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Write bytes and advance position.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.pos += data.len() as u64;
        Ok(())
    }

    /// Write a u64 value (little-endian).
    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.writer.write_u64::<LittleEndian>(value)?;
        self.pos += 8;
        Ok(())
    }

    /// Write a u16 value (little-endian).
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.writer.write_u16::<LittleEndian>(value)?;
        self.pos += 2;
        Ok(())
    }

    /// Write a u8 value.
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.writer.write_u8(value)?;
        self.pos += 1;
        Ok(())
    }

    /// Seek to a position and return the current position.
    pub fn seek(&mut self, pos: u64) -> Result<u64> {
        self.writer.flush()?;
        let new_pos = self.writer.seek(SeekFrom::Start(pos))?;
        self.pos = new_pos;
        Ok(new_pos)
    }

    /// Seek to end and return the position.
    pub fn seek_end(&mut self) -> Result<u64> {
        self.writer.flush()?;
        let new_pos = self.writer.seek(SeekFrom::End(0))?;
        self.pos = new_pos;
        Ok(new_pos)
    }

    /// Flush the buffer to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Write a data block and return its flagged offset.
    fn write_data_block(&mut self, data: &[u8]) -> Result<u64> {
        let pos = self.pos;
        self.write_u64(data.len() as u64)?;
        self.write_bytes(data)?;
        Ok(make_data_offset(pos))
    }
}

enum Target {
    Leaf(u64),
    Directory(Arc<Mutex<DirNode>>),
}

struct WriteEntry {
    name: String,
    flags: u8,
    target: Target,
}

#[derive(Default)]
struct DirNode {
    entries: Vec<WriteEntry>,
    index: HashMap<String, usize>,
}

impl DirNode {
    fn insert(&mut self, entry: WriteEntry) {
        self.index.insert(entry.name.clone(), self.entries.len());
        self.entries.push(entry);
    }
}

struct Shared {
    stream: Mutex<Option<OStream>>,
    compression_level: i32,
    compression_threshold: usize,
}

impl Shared {
    fn with_stream<T>(&self, f: impl FnOnce(&mut OStream) -> Result<T>) -> Result<T> {
        let mut guard = self.stream.lock();
        let stream = guard.as_mut().ok_or_else(|| Error::invalid("container already closed"))?;
        f(stream)
    }
}

/// Container opened for writing.
pub struct ContainerWriter {
    shared: Arc<Shared>,
    root: WriteDirectory,
}

impl ContainerWriter {
    /// Create a container file, truncating any existing file.
    pub fn create(path: impl AsRef<FsPath>, config: &SceneConfig) -> Result<Self> {
        let mut stream = OStream::create(path)?;

        // Header with placeholder root position; frozen on close.
        stream.write_bytes(MAGIC)?;
        stream.write_u8(NOT_FROZEN_FLAG)?;
        stream.write_u16(CURRENT_VERSION)?;
        stream.write_u64(0)?;

        let shared = Arc::new(Shared {
            stream: Mutex::new(Some(stream)),
            compression_level: config.compression_level,
            compression_threshold: config.compression_threshold,
        });
        let root = WriteDirectory {
            shared: shared.clone(),
            node: Arc::new(Mutex::new(DirNode::default())),
        };
        Ok(Self { shared, root })
    }

    /// Root directory.
    #[inline]
    pub fn root(&self) -> &WriteDirectory {
        &self.root
    }

    /// Whether [`close`](Self::close) has completed.
    pub fn is_closed(&self) -> bool {
        self.shared.stream.lock().is_none()
    }

    /// Write every directory, patch the header and freeze the file.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.shared.stream.lock();
        let Some(mut stream) = guard.take() else {
            return Ok(());
        };

        let root_offset = write_directory(&mut stream, &self.root.node)?;

        stream.seek(ROOT_POS_OFFSET as u64)?;
        stream.write_u64(extract_offset(root_offset))?;
        stream.seek(FROZEN_OFFSET as u64)?;
        stream.write_u8(FROZEN_FLAG)?;
        stream.flush()?;
        Ok(())
    }
}

fn write_directory(stream: &mut OStream, node: &Mutex<DirNode>) -> Result<u64> {
    let node = node.lock();

    let mut offsets = Vec::with_capacity(node.entries.len() + 1);
    let mut index = Vec::new();
    offsets.push(0);
    for entry in &node.entries {
        let (kind, offset) = match &entry.target {
            Target::Leaf(offset) => (KIND_LEAF, *offset),
            Target::Directory(child) => (KIND_DIRECTORY, write_directory(stream, child)?),
        };
        index.write_u32::<LittleEndian>(entry.name.len() as u32)?;
        index.extend_from_slice(entry.name.as_bytes());
        index.push(kind);
        index.push(entry.flags);
        offsets.push(offset);
    }
    offsets[0] = stream.write_data_block(&index)?;

    let pos = stream.pos();
    stream.write_u64(offsets.len() as u64)?;
    for offset in offsets {
        stream.write_u64(offset)?;
    }
    Ok(make_group_offset(pos))
}

/// A directory under construction. Cheap to clone; clones share the node.
#[derive(Clone)]
pub struct WriteDirectory {
    shared: Arc<Shared>,
    node: Arc<Mutex<DirNode>>,
}

impl WriteDirectory {
    pub fn has_entry(&self, name: &str) -> bool {
        self.node.lock().index.contains_key(name)
    }

    /// Entry names in creation order.
    pub fn entry_names(&self, kind: Option<EntryKind>) -> Vec<String> {
        self.node
            .lock()
            .entries
            .iter()
            .filter(|e| {
                let k = match e.target {
                    Target::Leaf(_) => EntryKind::Leaf,
                    Target::Directory(_) => EntryKind::Directory,
                };
                kind.map_or(true, |want| want == k)
            })
            .map(|e| e.name.clone())
            .collect()
    }

    /// Get or create a subdirectory.
    pub fn subdirectory(&self, name: &str) -> Result<WriteDirectory> {
        let mut node = self.node.lock();
        if let Some(&i) = node.index.get(name) {
            return match &node.entries[i].target {
                Target::Directory(child) => Ok(WriteDirectory {
                    shared: self.shared.clone(),
                    node: child.clone(),
                }),
                Target::Leaf(_) => Err(Error::invalid(format!("'{}' is not a directory", name))),
            };
        }
        let child = Arc::new(Mutex::new(DirNode::default()));
        node.insert(WriteEntry {
            name: name.to_string(),
            flags: 0,
            target: Target::Directory(child.clone()),
        });
        Ok(WriteDirectory {
            shared: self.shared.clone(),
            node: child,
        })
    }

    /// Write a leaf. Each name can be written once.
    pub fn write(&self, name: &str, data: &[u8]) -> Result<()> {
        if self.has_entry(name) {
            return Err(Error::invalid(format!("entry '{}' written twice", name)));
        }

        let compressed = if data.len() >= self.shared.compression_threshold {
            compress(data, self.shared.compression_level)?
        } else {
            None
        };
        let (bytes, flags) = match &compressed {
            Some(c) => (c.as_slice(), FLAG_COMPRESSED),
            None => (data, 0),
        };
        let offset = self.shared.with_stream(|s| s.write_data_block(bytes))?;

        self.node.lock().insert(WriteEntry {
            name: name.to_string(),
            flags,
            target: Target::Leaf(offset),
        });
        Ok(())
    }

    pub fn write_u64(&self, name: &str, value: u64) -> Result<()> {
        self.write(name, &value.to_le_bytes())
    }

    pub fn write_f64_array(&self, name: &str, values: &[f64]) -> Result<()> {
        let mut bytes = Vec::with_capacity(values.len() * 8);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        self.write(name, &bytes)
    }

    pub fn write_string_array(&self, name: &str, values: &[String]) -> Result<()> {
        self.write_data(name, &Data::StringArray(values.to_vec()))
    }

    /// Write an encoded [`Data`] value.
    pub fn write_data(&self, name: &str, data: &Data) -> Result<()> {
        let mut bytes = Vec::new();
        data.encode(&mut bytes);
        self.write(name, &bytes)
    }
}
