//! Committing canonical edits to the main thread's state.
//!
//! `commit_edit` is the only writer of `initial_gs` and
//! `global_state_hashes`: it fingerprints the batch in parallel, decides fast
//! vs slow, swaps the new contents into the file table, re-indexes, and, when
//! a slow path is already in flight, builds a merged update and tries to
//! cancel the running job in its favor.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sable_core::{FileContent, FileHash, FileId, UnfreezeFileTable};
use sable_pipeline::ParsedFile;

use crate::fast_path::can_take_fast_path;
use crate::messages::WorkspaceEditParams;
use crate::server::LspLoop;
use crate::updates::FileUpdates;

impl LspLoop {
    /// Applies one canonical edit to `initial_gs` and returns the committed
    /// batch, ready to hand to the typechecker.
    pub(crate) fn commit_edit(&mut self, edit: WorkspaceEditParams) -> FileUpdates {
        let mut update = FileUpdates {
            epoch: edit.epoch,
            edit_count: edit.merge_count + 1,
            updated_file_hashes: self
                .workers
                .compute_file_hashes(&edit.updates, &*self.parser),
            updated_files: edit.updates,
            ..FileUpdates::default()
        };
        update.can_take_fast_path = can_take_fast_path(
            &self.initial_gs,
            &self.config,
            &self.global_state_hashes,
            &update,
            &HashMap::new(),
        );

        // Swap the new contents into the file table, remembering what each
        // file's committed hash was before this batch overwrote it.
        let mut frefs: Vec<FileId> = Vec::with_capacity(update.updated_files.len());
        let mut evicted: HashMap<FileId, FileHash> = HashMap::new();
        let mut has_new_files = false;
        {
            let mut table = UnfreezeFileTable::new(&mut self.initial_gs);
            for (i, file) in update.updated_files.iter().enumerate() {
                let fref = match table.find_file_by_path(file.path()) {
                    Some(fref) => {
                        table.replace_file(fref, Arc::clone(file));
                        fref
                    }
                    None => {
                        has_new_files = true;
                        table.enter_file(Arc::clone(file))
                    }
                };
                if fref.index() >= self.global_state_hashes.len() {
                    self.global_state_hashes
                        .resize(fref.index() + 1, FileHash::not_computed());
                }
                evicted.insert(fref, self.global_state_hashes[fref.index()]);
                self.global_state_hashes[fref.index()] = update.updated_file_hashes[i];
                frefs.push(fref);
            }
        }
        update.has_new_files = has_new_files;

        // Index the batch. The pool returns trees sorted by file id; scatter
        // them back into edit order so the parallel arrays line up.
        let mut file_to_pos: HashMap<FileId, usize> = HashMap::with_capacity(frefs.len());
        for (i, fref) in frefs.iter().enumerate() {
            let previous = file_to_pos.insert(*fref, i);
            debug_assert!(previous.is_none(), "edit batches never repeat a file");
        }
        let jobs: Vec<(FileId, Arc<FileContent>)> = frefs
            .iter()
            .copied()
            .zip(update.updated_files.iter().cloned())
            .collect();
        let trees = self.workers.index_files(&jobs, &*self.parser);
        let mut slots: Vec<Option<ParsedFile>> = trees.iter().map(|_| None).collect();
        for parsed in trees {
            let pos = file_to_pos[&parsed.file];
            slots[pos] = Some(parsed);
        }
        update.updated_file_indexes = slots
            .into_iter()
            .map(|slot| slot.expect("indexer returns every submitted file"))
            .collect();
        update.debug_check_parallel_arrays();

        if let Some(running_epoch) = self.initial_gs.running_slow_path() {
            debug_assert_eq!(running_epoch, self.last_slow_path_update.epoch);
            // A cancelable slow path is in flight. Build the merged batch
            // first: cancelling is only worth it if old + new together take
            // the fast path, or if this update heads to the slow path anyway.
            let (merged, combined_evictions) = self.merge_updates(
                &self.last_slow_path_update,
                &self.last_slow_path_evicted_hashes,
                &update,
                &evicted,
            );
            if (merged.can_take_fast_path || !update.can_take_fast_path)
                && self.initial_gs.try_cancel_slow_path()
            {
                update = merged;
                evicted = combined_evictions;
            }
        }

        if !update.can_take_fast_path {
            update.updated_gs = Some(self.initial_gs.deep_copy());
            self.last_slow_path_update = update.clone_for_record();
            self.last_slow_path_evicted_hashes = evicted;
        }

        debug_assert!(update.epoch > self.initial_gs.committed_epoch());
        self.initial_gs.set_committed_epoch(update.epoch);
        update
    }

    /// Concatenates two batches, deduplicating by path with the newer batch
    /// winning. The fast-path verdict is recomputed against the hashes the
    /// *older* update evicted, since the last committed typecheck predates
    /// both batches.
    pub(crate) fn merge_updates(
        &self,
        older: &FileUpdates,
        older_evictions: &HashMap<FileId, FileHash>,
        newer: &FileUpdates,
        newer_evictions: &HashMap<FileId, FileHash>,
    ) -> (FileUpdates, HashMap<FileId, FileHash>) {
        older.debug_check_parallel_arrays();
        newer.debug_check_parallel_arrays();

        let mut merged = FileUpdates {
            epoch: newer.epoch,
            edit_count: older.edit_count + newer.edit_count,
            has_new_files: older.has_new_files || newer.has_new_files,
            ..FileUpdates::default()
        };

        let mut encountered: HashSet<&str> = HashSet::new();
        for (i, file) in newer.updated_files.iter().enumerate() {
            encountered.insert(file.path());
            merged.updated_files.push(Arc::clone(file));
            merged.updated_file_hashes.push(newer.updated_file_hashes[i]);
            // Deep-copy trees: the originals stay alive in their own batches.
            merged
                .updated_file_indexes
                .push(newer.updated_file_indexes[i].clone());
        }
        for (i, file) in older.updated_files.iter().enumerate() {
            if encountered.insert(file.path()) {
                merged.updated_files.push(Arc::clone(file));
                merged.updated_file_hashes.push(older.updated_file_hashes[i]);
                merged
                    .updated_file_indexes
                    .push(older.updated_file_indexes[i].clone());
            }
        }

        let mut combined = newer_evictions.clone();
        for (&id, &hash) in older_evictions {
            combined.insert(id, hash);
        }
        merged.can_take_fast_path = can_take_fast_path(
            &self.initial_gs,
            &self.config,
            &self.global_state_hashes,
            &merged,
            &combined,
        );
        (merged, combined)
    }
}
