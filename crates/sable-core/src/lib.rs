//! Shared, dependency-minimized core types used across sable.

pub mod diagnostics;
pub mod epochs;
pub mod file;
pub mod global_state;
pub mod hash;
pub mod id;
pub mod name;
pub mod symbols;

pub use diagnostics::{Diagnostic, Severity};
pub use epochs::{Epoch, EpochState};
pub use file::{FileContent, StrictLevel};
pub use global_state::{GlobalState, MethodProps, UnfreezeFileTable};
pub use hash::{DefinitionsHash, FileHash, UsagesHash, HASH_VALUE_MASK};
pub use id::*;
pub use name::{Name, NameInterner};
pub use symbols::{Symbol, SymbolKind, SymbolLoc, Visibility};
