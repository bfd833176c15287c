//! Container reader.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path as FsPath;
use std::sync::Arc;

use memmap2::Mmap;
use parking_lot::Mutex;

use super::compression::decompress;
use super::format::*;
use super::EntryKind;
use crate::core::Data;
use crate::util::{Error, Result};

/// Input streams for reading container data.
/// Supports both memory-mapped and buffered I/O modes.
pub struct IStreams {
    inner: StreamsInner,
    version: u16,
    frozen: bool,
    size: u64,
}

enum StreamsInner {
    /// Memory-mapped file (preferred for large files)
    Mmap(Mmap),
    /// Buffered file access (fallback)
    File(Mutex<File>),
}

impl IStreams {
    /// Open a file with optional memory mapping.
    pub fn open(path: &FsPath, use_mmap: bool) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;

        let size = file.metadata()?.len();
        if size < HEADER_SIZE as u64 {
            return Err(Error::UnexpectedEof(size));
        }

        let inner = if use_mmap {
            // Safety: the file is opened read-only; stores are never rewritten in place.
            let mmap = unsafe { Mmap::map(&file) }?;
            StreamsInner::Mmap(mmap)
        } else {
            StreamsInner::File(Mutex::new(file))
        };

        let mut streams = Self { inner, version: 0, frozen: false, size };
        let header = streams.read_bytes(0, HEADER_SIZE)?;
        let (version, frozen) = Self::parse_header(&header)?;
        streams.version = version;
        streams.frozen = frozen;
        Ok(streams)
    }

    /// Parse and validate the header.
    fn parse_header(data: &[u8]) -> Result<(u16, bool)> {
        if data.len() < HEADER_SIZE {
            return Err(Error::UnexpectedEof(data.len() as u64));
        }
        if &data[0..5] != MAGIC {
            return Err(Error::InvalidMagic);
        }
        let frozen = data[FROZEN_OFFSET] == FROZEN_FLAG;
        let version = u16::from_le_bytes([data[VERSION_OFFSET], data[VERSION_OFFSET + 1]]);
        Ok((version, frozen))
    }

    /// Check if the file was completely written.
    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.version
    }

    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read bytes at a specific position.
    pub fn read_bytes(&self, pos: u64, len: usize) -> Result<Vec<u8>> {
        let end = pos.checked_add(len as u64).ok_or(Error::UnexpectedEof(pos))?;
        if end > self.size {
            return Err(Error::UnexpectedEof(end));
        }

        match &self.inner {
            StreamsInner::Mmap(mmap) => Ok(mmap[pos as usize..end as usize].to_vec()),
            StreamsInner::File(file) => {
                let mut f = file.lock();
                f.seek(SeekFrom::Start(pos))?;
                let mut buf = vec![0u8; len];
                f.read_exact(&mut buf)?;
                Ok(buf)
            }
        }
    }

    /// Read a u64 value at the given position.
    pub fn read_u64(&self, pos: u64) -> Result<u64> {
        let bytes = self.read_bytes(pos, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }
}

/// One named entry of a directory.
#[derive(Clone, Debug)]
struct EntryInfo {
    name: String,
    kind: EntryKind,
    compressed: bool,
    /// Raw child offset (with group/data flag).
    offset: u64,
}

struct DirIndex {
    entries: Vec<EntryInfo>,
    by_name: HashMap<String, usize>,
}

/// Container opened for reading.
pub struct ContainerReader {
    streams: Arc<IStreams>,
    root: Directory,
}

impl ContainerReader {
    /// Open a container file.
    pub fn open(path: impl AsRef<FsPath>, use_mmap: bool) -> Result<Self> {
        let streams = Arc::new(IStreams::open(path.as_ref(), use_mmap)?);
        if !streams.is_frozen() {
            return Err(Error::invalid("file was not completely written"));
        }
        let root_pos = streams.read_u64(ROOT_POS_OFFSET as u64)?;
        let root = Directory::load(streams.clone(), root_pos)?;
        Ok(Self { streams, root })
    }

    /// Root directory.
    #[inline]
    pub fn root(&self) -> &Directory {
        &self.root
    }

    #[inline]
    pub fn version(&self) -> u16 {
        self.streams.version()
    }

    /// File size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.streams.size()
    }
}

/// A directory in the container hierarchy.
///
/// Cheap to clone; the entry index is shared.
#[derive(Clone)]
pub struct Directory {
    streams: Arc<IStreams>,
    index: Arc<DirIndex>,
}

impl Directory {
    fn load(streams: Arc<IStreams>, pos: u64) -> Result<Self> {
        let num_children = streams.read_u64(pos)?;
        if num_children == 0 {
            return Err(Error::invalid(format!("directory at {} has no index", pos)));
        }
        let first = pos.checked_add(8).ok_or(Error::UnexpectedEof(pos))?;
        let remaining = streams.size().saturating_sub(first) / 8;
        if num_children > remaining {
            return Err(Error::UnexpectedEof(pos));
        }

        let mut offsets = Vec::with_capacity(num_children as usize);
        for i in 0..num_children {
            offsets.push(streams.read_u64(first + i * 8)?);
        }

        let index_bytes = read_data_block(&streams, offsets[0])?;
        let entries = parse_index(&index_bytes, &offsets[1..])?;
        let by_name = entries.iter().enumerate().map(|(i, e)| (e.name.clone(), i)).collect();

        Ok(Self {
            streams,
            index: Arc::new(DirIndex { entries, by_name }),
        })
    }

    fn entry(&self, name: &str) -> Option<&EntryInfo> {
        self.index.by_name.get(name).map(|&i| &self.index.entries[i])
    }

    /// Entry names in stored order, optionally filtered by kind.
    pub fn entry_names(&self, kind: Option<EntryKind>) -> Vec<String> {
        self.index
            .entries
            .iter()
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn has_entry(&self, name: &str) -> bool {
        self.index.by_name.contains_key(name)
    }

    /// Kind of an entry, if present.
    pub fn entry_kind(&self, name: &str) -> Option<EntryKind> {
        self.entry(name).map(|e| e.kind)
    }

    /// Open a subdirectory; `None` if missing.
    pub fn subdirectory(&self, name: &str) -> Result<Option<Directory>> {
        match self.entry(name) {
            None => Ok(None),
            Some(e) if e.kind != EntryKind::Directory => Err(Error::invalid(format!("'{}' is not a directory", name))),
            Some(e) => Ok(Some(Directory::load(self.streams.clone(), extract_offset(e.offset))?)),
        }
    }

    /// Leaf bytes; `None` if missing.
    pub fn read_optional(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let Some(e) = self.entry(name) else { return Ok(None) };
        if e.kind != EntryKind::Leaf {
            return Err(Error::invalid(format!("'{}' is not a leaf", name)));
        }
        let raw = read_data_block(&self.streams, e.offset)?;
        if e.compressed {
            Ok(Some(decompress(&raw)?))
        } else {
            Ok(Some(raw))
        }
    }

    /// Leaf bytes.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.read_optional(name)?
            .ok_or_else(|| Error::invalid(format!("missing entry '{}'", name)))
    }

    pub fn read_u64(&self, name: &str) -> Result<u64> {
        let bytes = self.read(name)?;
        let arr: [u8; 8] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::invalid(format!("'{}' is not a u64 scalar", name)))?;
        Ok(u64::from_le_bytes(arr))
    }

    pub fn read_f64_array(&self, name: &str) -> Result<Vec<f64>> {
        let bytes = self.read(name)?;
        if bytes.len() % 8 != 0 {
            return Err(Error::invalid(format!("'{}' is not an f64 array", name)));
        }
        // Copy per element: the stored bytes carry no alignment guarantee.
        Ok(bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect())
    }

    /// Number of f64 elements in an array leaf, without decoding it.
    pub fn f64_array_len(&self, name: &str) -> Result<usize> {
        let e = self
            .entry(name)
            .ok_or_else(|| Error::invalid(format!("missing entry '{}'", name)))?;
        if e.compressed {
            return Ok(self.read_f64_array(name)?.len());
        }
        let pos = extract_offset(e.offset);
        let size = if pos == 0 { 0 } else { self.streams.read_u64(pos)? };
        Ok(size as usize / 8)
    }

    pub fn read_string_array(&self, name: &str) -> Result<Vec<String>> {
        let data = self.read_data(name)?;
        match data {
            Data::StringArray(v) => Ok(v),
            other => Err(Error::UnsupportedType { expected: "StringArray", actual: other.type_name() }),
        }
    }

    /// Decode a leaf written with `write_data`.
    pub fn read_data(&self, name: &str) -> Result<Data> {
        Data::decode(&self.read(name)?)
    }
}

fn read_data_block(streams: &IStreams, offset: u64) -> Result<Vec<u8>> {
    if !is_data_offset(offset) {
        return Err(Error::invalid("expected data block, found group"));
    }
    let pos = extract_offset(offset);
    if pos == 0 {
        return Ok(Vec::new());
    }
    let size = streams.read_u64(pos)?;
    if size > streams.size() {
        return Err(Error::UnexpectedEof(size));
    }
    let start = pos.checked_add(8).ok_or(Error::UnexpectedEof(pos))?;
    streams.read_bytes(start, size as usize)
}

fn parse_index(mut data: &[u8], offsets: &[u64]) -> Result<Vec<EntryInfo>> {
    use byteorder::{LittleEndian, ReadBytesExt};

    let eof = |_| Error::invalid("truncated directory index");
    let mut entries = Vec::with_capacity(offsets.len());
    for &offset in offsets {
        let len = data.read_u32::<LittleEndian>().map_err(eof)? as usize;
        if len > data.len() {
            return Err(Error::invalid("truncated directory index"));
        }
        let (name, rest) = data.split_at(len);
        data = rest;
        let name = String::from_utf8(name.to_vec()).map_err(|e| Error::invalid(e.to_string()))?;
        let kind = match data.read_u8().map_err(eof)? {
            KIND_DIRECTORY => EntryKind::Directory,
            KIND_LEAF => EntryKind::Leaf,
            k => return Err(Error::invalid(format!("unknown entry kind {}", k))),
        };
        let flags = data.read_u8().map_err(eof)?;
        if (kind == EntryKind::Directory) != is_group_offset(offset) {
            return Err(Error::invalid(format!("entry '{}' kind does not match its block", name)));
        }
        entries.push(EntryInfo {
            name,
            kind,
            compressed: flags & FLAG_COMPRESSED != 0,
            offset,
        });
    }
    if !data.is_empty() {
        return Err(Error::invalid("directory index has trailing bytes"));
    }
    Ok(entries)
}
