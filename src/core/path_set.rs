//! Sets: named collections of paths.

use std::collections::BTreeSet;

use murmur3::MurmurHash;

use crate::core::Data;
use crate::util::{Error, Path, Result};

/// An ordered collection of paths.
///
/// Paths stored in a set are relative to the location the set is written at;
/// the empty path denotes that location itself.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathSet {
    paths: BTreeSet<Path>,
}

impl PathSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a path; returns `false` if it was already present.
    pub fn add(&mut self, path: Path) -> bool {
        self.paths.insert(path)
    }

    /// Add every path of `other` below `prefix`.
    pub fn add_prefixed(&mut self, other: &PathSet, prefix: &Path) {
        for p in &other.paths {
            self.paths.insert(prefix.join(p));
        }
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        self.paths.remove(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> + '_ {
        self.paths.iter()
    }

    /// Paths rendered as `/a/b` strings.
    pub fn to_strings(&self) -> Vec<String> {
        self.paths.iter().map(ToString::to_string).collect()
    }

    pub fn hash(&self, h: &mut MurmurHash) {
        h.append_u64(self.paths.len() as u64);
        for p in &self.paths {
            h.append_str(&p.to_string());
        }
    }

    /// Stored form: a string array of paths.
    pub fn to_data(&self) -> Data {
        Data::StringArray(self.to_strings())
    }

    pub fn from_data(data: &Data) -> Result<Self> {
        let strings = data.as_string_array().ok_or(Error::UnsupportedType {
            expected: "StringArray",
            actual: data.type_name(),
        })?;
        Ok(strings.iter().map(|s| Path::parse(s)).collect())
    }
}

impl FromIterator<Path> for PathSet {
    fn from_iter<I: IntoIterator<Item = Path>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_prefixed() {
        let local: PathSet = [Path::root(), Path::parse("/x")].into_iter().collect();
        let mut out = PathSet::new();
        out.add_prefixed(&local, &Path::parse("/b/c"));
        assert!(out.contains(&Path::parse("/b/c")));
        assert!(out.contains(&Path::parse("/b/c/x")));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_data_roundtrip() {
        let s: PathSet = [Path::parse("/a"), Path::parse("/b/c")].into_iter().collect();
        assert_eq!(PathSet::from_data(&s.to_data()).unwrap(), s);
        assert!(PathSet::from_data(&Data::Int(1)).is_err());
    }
}
