//! A stateless worker pool for file-level parallel work.
//!
//! Workers communicate over bounded MPMC queues: one input queue of job
//! indexes, one output queue of `(index, result)` pairs. Threads are scoped
//! to each call, so jobs may borrow their inputs; workers never block except
//! on the queues.

use std::sync::Arc;

use crossbeam_channel::bounded;
use sable_core::{FileContent, FileHash, FileId};
use sable_parse::Parser;

use crate::fingerprint::compute_file_hash;
use crate::index::{index_file, ParsedFile};

#[derive(Debug, Clone)]
pub struct WorkerPool {
    threads: usize,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }

    /// Sizes the pool from the machine, leaving a core for the main thread.
    /// Containers can report the host CPU count, so cap the default.
    pub fn with_default_threads() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(available.saturating_sub(1).clamp(1, 16))
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Fingerprints `files` in parallel; results line up with the input order.
    pub fn compute_file_hashes(
        &self,
        files: &[Arc<FileContent>],
        parser: &dyn Parser,
    ) -> Vec<FileHash> {
        tracing::debug!(
            target = "sable.pipeline",
            files = files.len(),
            "computing state hashes"
        );
        let mut hashes = vec![FileHash::not_computed(); files.len()];
        for (i, hash) in self.fan_out(files.len(), |i| compute_file_hash(&files[i], parser)) {
            hashes[i] = hash;
        }
        hashes
    }

    /// Indexes `jobs` in parallel. The output is sorted by [`FileId`], not by
    /// input order; callers that need the original order must scatter the
    /// results back themselves.
    pub fn index_files(
        &self,
        jobs: &[(FileId, Arc<FileContent>)],
        parser: &dyn Parser,
    ) -> Vec<ParsedFile> {
        let mut indexed: Vec<ParsedFile> = self
            .fan_out(jobs.len(), |i| {
                let (file, content) = &jobs[i];
                index_file(*file, content, parser)
            })
            .into_iter()
            .map(|(_, parsed)| parsed)
            .collect();
        indexed.sort_by_key(|parsed| parsed.file);
        indexed
    }

    fn fan_out<T, F>(&self, count: usize, work: F) -> Vec<(usize, T)>
    where
        T: Send,
        F: Fn(usize) -> T + Sync,
    {
        if count == 0 {
            return Vec::new();
        }

        let (in_tx, in_rx) = bounded::<usize>(count);
        for i in 0..count {
            in_tx.send(i).expect("input queue sized to fit every job");
        }
        drop(in_tx);

        let (out_tx, out_rx) = bounded::<(usize, T)>(count);
        let threads = self.threads.min(count);
        std::thread::scope(|scope| {
            for _ in 0..threads {
                let in_rx = in_rx.clone();
                let out_tx = out_tx.clone();
                let work = &work;
                scope.spawn(move || {
                    while let Ok(i) = in_rx.recv() {
                        let result = work(i);
                        out_tx
                            .send((i, result))
                            .expect("output queue sized to fit every job");
                    }
                });
            }
            drop(out_tx);
            drop(in_rx);
            out_rx.iter().collect()
        })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::with_default_threads()
    }
}
