//! The fast-path/slow-path decision.

use std::collections::HashMap;

use sable_core::{FileHash, FileId, GlobalState};

use crate::config::ServerConfig;
use crate::metrics;
use crate::updates::FileUpdates;

fn find_hash<'a>(
    id: FileId,
    global_state_hashes: &'a [FileHash],
    overriding: &'a HashMap<FileId, FileHash>,
) -> &'a FileHash {
    overriding
        .get(&id)
        .unwrap_or_else(|| &global_state_hashes[id.index()])
}

/// Decides whether `updates` can be typechecked incrementally.
///
/// Checked in order, first hit wins: the config switch, new files anywhere in
/// the batch, then per file a syntax error or a changed definitions hash.
/// `overriding` carries the hashes an older, still-in-flight update evicted,
/// so a merged batch compares against the state the editor actually saw last
/// commit (the hashes currently in `global_state_hashes` already reflect the
/// newer edit).
pub fn can_take_fast_path(
    gs: &GlobalState,
    config: &ServerConfig,
    global_state_hashes: &[FileHash],
    updates: &FileUpdates,
    overriding: &HashMap<FileId, FileHash>,
) -> bool {
    if config.disable_fast_path {
        tracing::debug!(
            target = "sable.lsp",
            "taking slow path because the fast path is disabled"
        );
        metrics::global().increment("lsp.slow_path_reason", "fast_path_disabled");
        return false;
    }
    if updates.has_new_files {
        tracing::debug!(
            target = "sable.lsp",
            "taking slow path because the update has a new file"
        );
        metrics::global().increment("lsp.slow_path_reason", "new_file");
        return false;
    }

    debug_assert_eq!(updates.updated_files.len(), updates.updated_file_hashes.len());
    tracing::debug!(
        target = "sable.lsp",
        files = updates.updated_files.len(),
        "checking fast path availability"
    );
    for (file, new_hash) in updates
        .updated_files
        .iter()
        .zip(&updates.updated_file_hashes)
    {
        let Some(fref) = gs.find_file_by_path(file.path()) else {
            tracing::debug!(
                target = "sable.lsp",
                path = file.path(),
                "taking slow path because the file is new"
            );
            metrics::global().increment("lsp.slow_path_reason", "new_file");
            return false;
        };
        let old_hash = find_hash(fref, global_state_hashes, overriding);
        debug_assert!(old_hash.definitions.is_computed());
        if new_hash.definitions.is_invalid() {
            tracing::debug!(
                target = "sable.lsp",
                path = file.path(),
                "taking slow path because the file has a syntax error"
            );
            metrics::global().increment("lsp.slow_path_reason", "syntax_error");
            return false;
        }
        if new_hash.definitions.hierarchy_hash != old_hash.definitions.hierarchy_hash {
            tracing::debug!(
                target = "sable.lsp",
                path = file.path(),
                "taking slow path because the file changed definitions"
            );
            metrics::global().increment("lsp.slow_path_reason", "changed_definition");
            return false;
        }
    }

    tracing::debug!(target = "sable.lsp", "taking fast path");
    true
}
