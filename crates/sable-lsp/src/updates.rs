//! Committed edit batches.

use std::sync::Arc;

use sable_core::{Epoch, FileContent, FileHash, GlobalState};
use sable_pipeline::ParsedFile;

/// A self-contained, committed edit batch.
///
/// `updated_files`, `updated_file_hashes` and `updated_file_indexes` are
/// parallel arrays: equal length, same order.
#[derive(Debug, Default)]
pub struct FileUpdates {
    pub epoch: Epoch,
    /// Number of original editor edits folded into this batch (>= 1 for any
    /// real edit).
    pub edit_count: u32,
    pub updated_files: Vec<Arc<FileContent>>,
    pub updated_file_hashes: Vec<FileHash>,
    pub updated_file_indexes: Vec<ParsedFile>,
    pub has_new_files: bool,
    pub can_take_fast_path: bool,
    /// Present only on the slow path: an owned clone of the main thread's
    /// state to typecheck against.
    pub updated_gs: Option<GlobalState>,
}

impl FileUpdates {
    pub fn debug_check_parallel_arrays(&self) {
        debug_assert_eq!(self.updated_files.len(), self.updated_file_hashes.len());
        debug_assert_eq!(self.updated_files.len(), self.updated_file_indexes.len());
    }

    /// Copy for the slow-path record. Trees are deep-copied because the
    /// in-flight job may mutate its copy while this one is retained for
    /// re-merging; the cloned state is never retained.
    pub fn clone_for_record(&self) -> FileUpdates {
        FileUpdates {
            epoch: self.epoch,
            edit_count: self.edit_count,
            updated_files: self.updated_files.clone(),
            updated_file_hashes: self.updated_file_hashes.clone(),
            updated_file_indexes: self.updated_file_indexes.clone(),
            has_new_files: self.has_new_files,
            can_take_fast_path: self.can_take_fast_path,
            updated_gs: None,
        }
    }
}
