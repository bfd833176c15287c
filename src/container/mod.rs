//! Keyed hierarchical container backing file stores.
//!
//! A container is a tree of named directories and leaves stored in a single
//! file. Binary layout:
//! - 16-byte header: magic, frozen flag, version, root directory position
//! - directory: `u64` child count followed by child offsets (MSB set = data block)
//! - data block: `u64` size followed by the payload
//!
//! Child 0 of every directory is an index block naming the remaining children
//! and recording whether each leaf is compressed.

pub mod format;
pub mod compression;
mod reader;
mod writer;

pub use reader::{ContainerReader, Directory, IStreams};
pub use writer::{ContainerWriter, OStream, WriteDirectory};

/// Kind of a directory entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    Leaf,
}
