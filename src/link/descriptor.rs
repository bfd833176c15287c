//! Link descriptors stored as a reserved attribute.

use std::collections::BTreeMap;

use crate::core::Data;
use crate::util::{Chrono, Error, Path, Result};

/// Attribute holding a location's link descriptor.
pub const LINK_ATTRIBUTE: &str = "sceneInterface:link";

const FILE_NAME: &str = "fileName";
const ROOT: &str = "root";
const TIME: &str = "time";

/// Where a link boundary sources its content from.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkDescriptor {
    /// Target store; relative names resolve against the main file's directory.
    pub file_name: String,
    /// Location inside the target mounted at the boundary.
    pub root: Path,
    /// Time in the target store. `None` passes the overlay time through.
    pub time: Option<Chrono>,
}

impl LinkDescriptor {
    pub fn new(file_name: impl Into<String>, root: Path) -> Self {
        Self {
            file_name: file_name.into(),
            root,
            time: None,
        }
    }

    /// Remap the overlay time of this sample to `time` in the target.
    pub fn with_time(mut self, time: Chrono) -> Self {
        self.time = Some(time);
        self
    }

    /// Attribute value: a compound of `fileName`, `root` and optional `time`.
    pub fn to_data(&self) -> Data {
        let mut members = BTreeMap::new();
        members.insert(FILE_NAME.to_string(), Data::String(self.file_name.clone()));
        members.insert(ROOT.to_string(), Data::StringArray(self.root.names().to_vec()));
        if let Some(t) = self.time {
            members.insert(TIME.to_string(), Data::Float(t));
        }
        Data::Compound(members)
    }

    /// Parse an attribute value read at `path`.
    pub fn from_data(path: &Path, data: &Data) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedLink {
            path: path.clone(),
            reason: reason.to_string(),
        };
        let members = data
            .as_compound()
            .ok_or_else(|| malformed(&format!("expected Compound, got {}", data.type_name())))?;
        let file_name = members
            .get(FILE_NAME)
            .and_then(Data::as_str)
            .ok_or_else(|| malformed("missing fileName string"))?;
        let root = members
            .get(ROOT)
            .and_then(Data::as_string_array)
            .ok_or_else(|| malformed("missing root name list"))?;
        let time = match members.get(TIME) {
            None => None,
            Some(t) => Some(t.as_float().ok_or_else(|| malformed("time is not a number"))?),
        };
        Ok(Self {
            file_name: file_name.to_string(),
            root: Path::from_names(root.iter().cloned()),
            time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_data() {
        let d = LinkDescriptor::new("b.scc", Path::parse("/body")).with_time(2.5);
        let back = LinkDescriptor::from_data(&Path::root(), &d.to_data()).unwrap();
        assert_eq!(back, d);

        let plain = LinkDescriptor::new("b.scc", Path::root());
        assert_eq!(LinkDescriptor::from_data(&Path::root(), &plain.to_data()).unwrap().time, None);
    }

    #[test]
    fn test_malformed_descriptor() {
        let at = Path::parse("/robot");
        let err = LinkDescriptor::from_data(&at, &Data::Float(1.0)).unwrap_err();
        assert!(matches!(err, Error::MalformedLink { ref path, .. } if *path == at));

        let mut m = BTreeMap::new();
        m.insert(FILE_NAME.to_string(), Data::String("x".into()));
        assert!(LinkDescriptor::from_data(&at, &Data::Compound(m.clone())).is_err());

        m.insert(ROOT.to_string(), Data::StringArray(vec![]));
        m.insert(TIME.to_string(), Data::String("soon".into()));
        assert!(LinkDescriptor::from_data(&at, &Data::Compound(m)).is_err());
    }
}
