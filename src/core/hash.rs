//! Content hash keys.

pub use murmur3::MurmurHash;

/// Which aspect of a location a content hash covers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum HashType {
    Bound,
    Transform,
    Attribute(String),
    Object,
    ChildNames,
    /// Everything at and below the location.
    Hierarchy,
}

impl HashType {
    /// Stable name mixed into every hash so different kinds never collide.
    pub fn name(&self) -> &str {
        match self {
            Self::Bound => "bound",
            Self::Transform => "transform",
            Self::Attribute(_) => "attribute",
            Self::Object => "object",
            Self::ChildNames => "childNames",
            Self::Hierarchy => "hierarchy",
        }
    }

    /// Seed a digest with the kind (and attribute name).
    pub fn seed(&self, h: &mut MurmurHash) {
        h.append_str(self.name());
        if let Self::Attribute(name) = self {
            h.append_str(name);
        }
    }
}
