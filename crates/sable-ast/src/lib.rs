//! AST for the scripting language sable typechecks.
//!
//! Nodes form a tagged sum type; passes are plain recursive walks over that
//! sum. Trees are fully owned, so `Clone` is a deep copy.

pub mod ast;
pub mod flatten;

pub use ast::{ClassDef, ClassName, Expr, Lit, Loc, MethodDef, Send};
pub use flatten::flatten;
