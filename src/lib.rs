//! # Scenecache
//!
//! Hierarchical, time-sampled scene storage with bound propagation and
//! linked scenes.
//!
//! A scene is a tree of named locations. Each location carries sampled
//! bounds, transforms, attributes and an optional object, plus tags and
//! named path sets. Stores are opened either for reading or for writing;
//! write-mode locations finalize bottom-up and push their bounds and tags to
//! their parents.
//!
//! ## Modules
//!
//! - [`util`] - Basic types (paths, bounds, errors)
//! - [`core`] - Sampling, payload values, tags, hashes, configuration
//! - [`container`] - Low-level binary container
//! - [`scene`] - The [`Location`](scene::Location) trait and its backends
//! - [`link`] - Overlay splicing linked stores into a scene
//!
//! ## Example
//!
//! ```ignore
//! use scenecache::prelude::*;
//!
//! let scene = LinkScene::open("shot.scc")?;
//! for name in scene.child_names()? {
//!     println!("{}", name);
//! }
//! ```

pub mod util;
pub mod core;
pub mod container;
pub mod scene;
pub mod link;

// Re-export commonly used types
pub use util::{Error, ErrorKind, Path, Result};
pub use scene::{FileSceneStore, Location, LocationHandle, MissingBehaviour};
pub use link::LinkScene;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::util::{BBox3d, Chrono, Error, ErrorKind, Path, Result};
    pub use crate::core::{Data, HashType, MurmurHash, PathSet, SceneConfig, TagFilter, Transform, XformOp};
    pub use crate::scene::{FileSceneStore, Location, LocationHandle, MemoryScene, MissingBehaviour};
    pub use crate::link::{LinkDescriptor, LinkScene};
}
