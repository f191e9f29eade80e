//! The sable language server.
//!
//! Implements LSP 3.13 over stdio. The main loop keeps an always-current,
//! typechecked view of the workspace under a stream of editor edits and
//! answers interactive queries against it, without ever blocking the editor
//! on a long recomputation: edits whose externally visible declarations are
//! unchanged are rechecked in place (the fast path), anything else rebuilds
//! from a cloned symbol table on a cancelable background job (the slow path).

pub mod codec;
pub mod commit;
pub mod config;
pub mod fast_path;
pub mod messages;
pub mod metrics;
pub mod output;
pub mod preprocessor;
pub mod queries;
pub mod server;
pub mod text;
pub mod typechecker;
pub mod updates;

pub use config::ServerConfig;
pub use output::{CapturedOutput, Output, WriterOutput};
pub use server::LspLoop;
