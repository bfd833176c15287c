//! Scene paths: ordered sequences of location names.

use smallvec::SmallVec;
use std::fmt;

/// Name of the root location.
pub const ROOT_NAME: &str = "/";

/// Path to a location; the empty sequence addresses the root.
///
/// Most scene paths are shallow, so the names live inline.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    names: SmallVec<[String; 4]>,
}

impl Path {
    /// The root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from name segments.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a `/`-separated string. Empty segments are ignored, so `""`,
    /// `"/"` and `"//"` all denote the root.
    pub fn parse(s: &str) -> Self {
        Self::from_names(s.split('/').filter(|s| !s.is_empty()))
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.names.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name segments.
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Last segment, or `"/"` for the root.
    pub fn name(&self) -> &str {
        self.names.last().map(String::as_str).unwrap_or(ROOT_NAME)
    }

    /// Path of the parent location; `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            names: self.names[..self.names.len() - 1].iter().cloned().collect(),
        })
    }

    /// Path of a child location.
    pub fn child(&self, name: &str) -> Path {
        let mut p = self.clone();
        p.names.push(name.to_string());
        p
    }

    /// Concatenate a relative path.
    pub fn join(&self, other: &Path) -> Path {
        let mut p = self.clone();
        p.names.extend(other.names.iter().cloned());
        p
    }

    /// Check whether `prefix` is an ancestor of (or equal to) this path.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.names.len() >= prefix.names.len() && self.names[..prefix.names.len()] == prefix.names[..]
    }

    /// Strip `prefix`, returning the remainder.
    pub fn strip_prefix(&self, prefix: &Path) -> Option<Path> {
        if !self.starts_with(prefix) {
            return None;
        }
        Some(Self::from_names(self.names[prefix.names.len()..].iter().cloned()))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.names.is_empty() {
            return f.write_str(ROOT_NAME);
        }
        for name in &self.names {
            write!(f, "/{}", name)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({})", self)
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_display() {
        assert!(Path::parse("/").is_root());
        assert!(Path::parse("").is_root());
        assert_eq!(Path::root().to_string(), "/");

        let p = Path::parse("/robot//linkPoint/");
        assert_eq!(p.names(), &["robot".to_string(), "linkPoint".to_string()]);
        assert_eq!(p.to_string(), "/robot/linkPoint");
        assert_eq!(p.name(), "linkPoint");
    }

    #[test]
    fn test_parent_join_prefix() {
        let mount = Path::parse("/robot/linkPoint");
        let inner = Path::parse("/leg");
        let merged = mount.join(&inner);
        assert_eq!(merged.to_string(), "/robot/linkPoint/leg");
        assert_eq!(merged.parent(), Some(mount.clone()));
        assert!(merged.starts_with(&mount));
        assert_eq!(merged.strip_prefix(&mount), Some(inner));
        assert!(Path::root().parent().is_none());
        assert_eq!(Path::root().child("a"), Path::parse("/a"));
    }
}
