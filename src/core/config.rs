//! Store configuration.

use crate::core::DEFAULT_SNAP_EPSILON;

/// Tunables shared by stores and overlays.
#[derive(Clone, Debug)]
pub struct SceneConfig {
    /// Times within this distance of a stored sample read that sample exactly.
    pub snap_epsilon: f64,
    /// Read files through a memory map instead of buffered I/O.
    pub use_mmap: bool,
    /// Deflate level for stored leaves (-1 = off, 1..=9).
    pub compression_level: i32,
    /// Leaves smaller than this are never compressed.
    pub compression_threshold: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            snap_epsilon: DEFAULT_SNAP_EPSILON,
            use_mmap: true,
            compression_level: -1,
            compression_threshold: 4096,
        }
    }
}

impl SceneConfig {
    pub fn with_snap_epsilon(mut self, epsilon: f64) -> Self {
        self.snap_epsilon = epsilon;
        self
    }

    pub fn with_mmap(mut self, use_mmap: bool) -> Self {
        self.use_mmap = use_mmap;
        self
    }

    /// Set compression level (-1 = no compression, 1-9 = compression level).
    pub fn with_compression(mut self, level: i32) -> Self {
        self.compression_level = level.clamp(-1, 9);
        self
    }
}
