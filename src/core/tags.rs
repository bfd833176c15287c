//! Tag filters.

bitflags::bitflags! {
    /// Which tags a tag query considers.
    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    pub struct TagFilter : u8 {
        /// Tags declared at the location itself.
        const LOCAL      = 0b0000_0001;
        /// Tags declared at any descendant.
        const DESCENDANT = 0b0000_0010;
        /// Tags declared at any ancestor.
        const ANCESTOR   = 0b0000_0100;
        const EVERY      = Self::LOCAL.bits() | Self::DESCENDANT.bits() | Self::ANCESTOR.bits();
    }
}

impl Default for TagFilter {
    fn default() -> Self {
        Self::LOCAL
    }
}

/// Sort and deduplicate a tag list in place.
pub fn normalize_tags(tags: &mut Vec<String>) {
    tags.sort();
    tags.dedup();
}
