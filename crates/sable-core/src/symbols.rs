//! Symbol-table entries.

use crate::{FileId, NameId, SymbolId};

/// Visibility of a method, as declared by the surrounding modifier send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Visibility {
    Public,
    Private,
    Protected,
    PrivateClassMethod,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Private => "private",
            Visibility::Protected => "protected",
            Visibility::PrivateClassMethod => "private_class_method",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Class,
    Method,
}

/// Where a symbol was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolLoc {
    pub file: FileId,
    pub line: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: NameId,
    pub kind: SymbolKind,
    /// Enclosing class for methods; the root symbol for top-level classes.
    pub owner: SymbolId,
    pub loc: Option<SymbolLoc>,
    pub visibility: Visibility,
    /// True for class methods (`def self.x` or members of a singleton-class
    /// block after flattening).
    pub is_self_method: bool,
    pub arity: u8,
    /// Raw text of the attached signature annotation, if any.
    pub sig: Option<String>,
    /// Ancestor names, for classes.
    pub ancestors: Vec<NameId>,
}
