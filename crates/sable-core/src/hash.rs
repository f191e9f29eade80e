//! Two-part file fingerprints.
//!
//! Every tracked file carries a [`FileHash`]: a *definitions* hash covering the
//! declarations other files can see, and a *usages* hash covering method
//! bodies. An edit whose definitions hash is unchanged can be re-typechecked
//! locally; anything else rebuilds from a cloned symbol table.

/// Computed hash values occupy the low 62-bit space; the two sentinels carry
/// the top bit so they can never collide with a computed hash.
pub const HASH_VALUE_MASK: u64 = (1 << 62) - 1;

/// Hash of a file's externally visible declarations: class names, ancestor
/// lists, method names with arities, signatures, visibility and static-ness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefinitionsHash {
    pub hierarchy_hash: u64,
}

impl DefinitionsHash {
    /// Freshly allocated, never filled in.
    pub const NOT_COMPUTED: u64 = 1 << 63;
    /// Parsing failed; the file has a syntax error.
    pub const INVALID: u64 = (1 << 63) | 1;

    pub fn not_computed() -> Self {
        Self {
            hierarchy_hash: Self::NOT_COMPUTED,
        }
    }

    pub fn invalid() -> Self {
        Self {
            hierarchy_hash: Self::INVALID,
        }
    }

    pub fn is_invalid(self) -> bool {
        self.hierarchy_hash == Self::INVALID
    }

    pub fn is_computed(self) -> bool {
        self.hierarchy_hash != Self::NOT_COMPUTED
    }
}

/// Content hash of the expressions inside method bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsagesHash {
    pub hash: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHash {
    pub definitions: DefinitionsHash,
    pub usages: UsagesHash,
}

impl FileHash {
    pub fn not_computed() -> Self {
        Self {
            definitions: DefinitionsHash::not_computed(),
            usages: UsagesHash { hash: 0 },
        }
    }
}

impl Default for FileHash {
    fn default() -> Self {
        Self::not_computed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_are_outside_the_computed_range() {
        assert_eq!(DefinitionsHash::NOT_COMPUTED & HASH_VALUE_MASK, 0);
        assert_eq!(DefinitionsHash::INVALID & HASH_VALUE_MASK, 1);
        assert_ne!(DefinitionsHash::NOT_COMPUTED, DefinitionsHash::INVALID);

        for value in [0u64, 1, HASH_VALUE_MASK] {
            assert_ne!(value, DefinitionsHash::NOT_COMPUTED);
            assert_ne!(value, DefinitionsHash::INVALID);
        }
    }

    #[test]
    fn fresh_hash_is_not_computed() {
        let hash = FileHash::default();
        assert!(!hash.definitions.is_computed());
        assert!(!hash.definitions.is_invalid());
    }
}
