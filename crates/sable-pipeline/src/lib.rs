//! The file-level pipeline: parse, flatten, fingerprint, resolve.
//!
//! Everything here is a pure function of its inputs plus a worker pool for
//! fanning file-level work out over threads. The LSP layer decides *what* to
//! run; this crate decides *how* a single file is processed.

pub mod fingerprint;
pub mod index;
pub mod resolve;
pub mod workers;

pub use fingerprint::compute_file_hash;
pub use index::{index_file, ParsedFile};
pub use resolve::resolve_trees;
pub use workers::WorkerPool;
