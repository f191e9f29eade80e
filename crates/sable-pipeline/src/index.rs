//! Per-file indexing: parse, flatten, collect diagnostics.

use sable_ast::{flatten, Expr};
use sable_core::{Diagnostic, FileContent, FileId};
use sable_parse::Parser;

/// One file's indexed form: the flattened tree plus any parse diagnostics.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub file: FileId,
    pub tree: Expr,
    pub diagnostics: Vec<Diagnostic>,
}

/// Indexes one file. Parse failures produce an empty tree and a diagnostic;
/// the file still participates in every downstream stage.
pub fn index_file(file: FileId, content: &FileContent, parser: &dyn Parser) -> ParsedFile {
    match parser.parse(content.source()) {
        Ok(tree) => ParsedFile {
            file,
            tree: flatten(tree),
            diagnostics: Vec::new(),
        },
        Err(err) => ParsedFile {
            file,
            tree: Expr::EmptyTree,
            diagnostics: vec![Diagnostic::error(err.line, err.message)],
        },
    }
}
