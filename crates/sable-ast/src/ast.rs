//! AST node definitions.

use std::fmt;

/// 0-based line a node starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Loc {
    pub line: u32,
}

impl Loc {
    pub const fn new(line: u32) -> Self {
        Self { line }
    }
}

/// Method-visibility modifiers recognized as sends wrapping a method
/// definition.
pub const VISIBILITY_MODIFIERS: &[&str] =
    &["private", "protected", "public", "private_class_method"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A hole left behind when a node is moved elsewhere.
    EmptyTree,
    /// An ordered sequence of statements.
    Seq(Vec<Expr>),
    ClassDef(ClassDef),
    MethodDef(MethodDef),
    Send(Send),
    /// An opaque body statement. The typechecker's inference stage consumes
    /// these; the server core only hashes them.
    Lit(Lit),
}

impl Expr {
    pub fn is_empty_tree(&self) -> bool {
        matches!(self, Expr::EmptyTree)
    }

    pub fn loc(&self) -> Loc {
        match self {
            Expr::EmptyTree => Loc::default(),
            Expr::Seq(stats) => stats.first().map(Expr::loc).unwrap_or_default(),
            Expr::ClassDef(c) => c.loc,
            Expr::MethodDef(m) => m.loc,
            Expr::Send(s) => s.loc,
            Expr::Lit(l) => l.loc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassName {
    Ident(String),
    /// `class << self`: members belong to the class object itself.
    Singleton,
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassName::Ident(name) => f.write_str(name),
            ClassName::Singleton => f.write_str("<<self>>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub name: ClassName,
    pub ancestors: Vec<String>,
    pub body: Vec<Expr>,
    pub loc: Loc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Expr>,
    /// True for `def self.x` (and for methods restamped by the flattener).
    pub is_self: bool,
    pub loc: Loc,
}

/// A bare method call statement. `sig { ... }` annotations and visibility
/// modifiers wrapping a method definition are both represented as sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Send {
    pub fun: String,
    pub args: Vec<Expr>,
    pub loc: Loc,
}

impl Send {
    pub fn is_sig(&self) -> bool {
        self.fun == "sig"
    }

    /// True when this send is a visibility modifier applied directly to a
    /// method definition, e.g. `private def f; end`.
    ///
    /// The check is purely syntactic: a user who redefines `private` and
    /// applies it to a method will still match here.
    pub fn is_method_modifier(&self) -> bool {
        VISIBILITY_MODIFIERS.contains(&self.fun.as_str())
            && self.args.len() == 1
            && matches!(self.args[0], Expr::MethodDef(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lit {
    pub text: String,
    pub loc: Loc,
}
