//! Source file contents as tracked by the server.

use std::fmt;
use std::sync::Arc;

/// How strictly a file opts into typechecking.
///
/// Decided from a leading `# typed:` sigil comment; files without a sigil
/// default to [`StrictLevel::False`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StrictLevel {
    Ignore,
    False,
    True,
    Strict,
}

impl StrictLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            StrictLevel::Ignore => "ignore",
            StrictLevel::False => "false",
            StrictLevel::True => "true",
            StrictLevel::Strict => "strict",
        }
    }
}

impl fmt::Display for StrictLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable snapshot of one file's contents.
///
/// Two `FileContent`s with the same path but different text are distinct
/// values; the server always replaces the whole snapshot rather than editing
/// in place (text synchronization is full-document).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    path: String,
    source: Arc<str>,
    strict: StrictLevel,
}

impl FileContent {
    pub fn new(path: impl Into<String>, source: impl Into<Arc<str>>, strict: StrictLevel) -> Self {
        Self {
            path: path.into(),
            source: source.into(),
            strict,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn strict(&self) -> StrictLevel {
        self.strict
    }
}
