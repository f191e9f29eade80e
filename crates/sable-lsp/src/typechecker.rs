//! The typechecker thread and its coordinator.
//!
//! One dedicated thread owns the authoritative typechecked state; nothing
//! else may touch it. The main loop talks to it through the
//! [`TypecheckerCoordinator`]: `sync_run` blocks the caller until its job has
//! run (used for queries and fast-path edits), `async_run` returns
//! immediately (used only for slow-path typechecks, which must stay
//! cancelable from the main thread). Jobs execute strictly in submission
//! order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Sender};
use sable_core::{FileHash, FileId, GlobalState, UnfreezeFileTable};
use sable_pipeline::{resolve_trees, ParsedFile};
use serde_json::json;

use crate::metrics;
use crate::output::{notification, Output};
use crate::text::uri_from_path;
use crate::updates::FileUpdates;

/// Committed typecheck runs, split by path. Exposed for tests.
#[derive(Debug, Default)]
pub struct TypecheckCounters {
    fast: AtomicU32,
    slow: AtomicU32,
}

impl TypecheckCounters {
    pub fn fast(&self) -> u32 {
        self.fast.load(Ordering::SeqCst)
    }

    pub fn slow(&self) -> u32 {
        self.slow.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u32 {
        self.fast() + self.slow()
    }
}

/// Owner of the one authoritative typechecked snapshot.
pub struct LspTypechecker {
    output: Arc<dyn Output>,
    counters: Arc<TypecheckCounters>,
    gs: Option<GlobalState>,
    indexed: HashMap<FileId, ParsedFile>,
    state_hashes: Vec<FileHash>,
}

impl LspTypechecker {
    pub fn new(output: Arc<dyn Output>, counters: Arc<TypecheckCounters>) -> Self {
        Self {
            output,
            counters,
            gs: None,
            indexed: HashMap::new(),
            state_hashes: Vec::new(),
        }
    }

    /// Installs the initial workspace state. Not cancelable; runs once after
    /// the `initialized` notification.
    pub fn initialize(
        &mut self,
        mut gs: GlobalState,
        indexed: Vec<ParsedFile>,
        state_hashes: Vec<FileHash>,
    ) {
        let cancelled = resolve_trees(&mut gs, &indexed, &mut || false);
        debug_assert!(!cancelled);
        let files: Vec<FileId> = indexed.iter().map(|parsed| parsed.file).collect();
        self.indexed = indexed
            .into_iter()
            .map(|parsed| (parsed.file, parsed))
            .collect();
        self.state_hashes = state_hashes;
        self.gs = Some(gs);
        self.publish_diagnostics(&files);
    }

    pub fn is_initialized(&self) -> bool {
        self.gs.is_some()
    }

    /// The current typechecked state; only meaningful after initialization.
    pub fn state(&self) -> Option<&GlobalState> {
        self.gs.as_ref()
    }

    pub fn output(&self) -> &Arc<dyn Output> {
        &self.output
    }

    /// Typechecks one committed batch. Returns `true` if the run was
    /// cancelled before it could commit; in that case no counters are
    /// reported and the committed state is unchanged.
    pub fn typecheck(&mut self, updates: FileUpdates) -> bool {
        updates.debug_check_parallel_arrays();
        if updates.can_take_fast_path {
            self.typecheck_fast(updates);
            false
        } else {
            self.typecheck_slow(updates)
        }
    }

    /// Swaps new file bodies into the existing state. Not interruptible; the
    /// path selector has already guaranteed no definitions changed.
    fn typecheck_fast(&mut self, updates: FileUpdates) {
        let gs = self
            .gs
            .as_mut()
            .expect("fast path requires an initialized typechecker");
        tracing::debug!(
            target = "sable.lsp",
            epoch = %updates.epoch,
            files = updates.updated_files.len(),
            "fast path typecheck"
        );

        {
            let mut table = UnfreezeFileTable::new(gs);
            for file in &updates.updated_files {
                let fref = table
                    .find_file_by_path(file.path())
                    .expect("fast path never introduces files");
                table.replace_file(fref, file.clone());
            }
        }
        let cancelled = resolve_trees(gs, &updates.updated_file_indexes, &mut || false);
        debug_assert!(!cancelled);
        gs.set_committed_epoch(updates.epoch);

        let mut files = Vec::with_capacity(updates.updated_file_indexes.len());
        for (parsed, hash) in updates
            .updated_file_indexes
            .into_iter()
            .zip(updates.updated_file_hashes)
        {
            files.push(parsed.file);
            self.record_hash(parsed.file, hash);
            self.indexed.insert(parsed.file, parsed);
        }
        self.publish_diagnostics(&files);
        self.counters.fast.fetch_add(1, Ordering::SeqCst);
    }

    /// Full rebuild against the cloned state carried by `updates`,
    /// cooperatively checking for cancellation between files.
    fn typecheck_slow(&mut self, mut updates: FileUpdates) -> bool {
        let mut gs = updates
            .updated_gs
            .take()
            .expect("slow path carries a cloned global state");
        let epoch = updates.epoch;
        tracing::debug!(
            target = "sable.lsp",
            epoch = %epoch,
            files = updates.updated_files.len(),
            "slow path typecheck"
        );

        let mut indexed = self.indexed.clone();
        for parsed in updates.updated_file_indexes {
            indexed.insert(parsed.file, parsed);
        }
        let mut trees: Vec<ParsedFile> = indexed.values().cloned().collect();
        trees.sort_by_key(|parsed| parsed.file);

        let epochs = Arc::clone(gs.epochs());
        if resolve_trees(&mut gs, &trees, &mut || epochs.cancelled(epoch)) {
            tracing::debug!(target = "sable.lsp", epoch = %epoch, "slow path cancelled");
            return true;
        }
        // The commit itself races against a late cancel; exactly one wins.
        if !epochs.try_commit(epoch) {
            tracing::debug!(
                target = "sable.lsp",
                epoch = %epoch,
                "slow path cancelled at commit"
            );
            return true;
        }

        gs.set_committed_epoch(epoch);
        for (file, hash) in updates
            .updated_files
            .iter()
            .zip(&updates.updated_file_hashes)
        {
            if let Some(fref) = gs.find_file_by_path(file.path()) {
                self.record_hash(fref, *hash);
            }
        }
        let files: Vec<FileId> = trees.iter().map(|parsed| parsed.file).collect();
        self.indexed = indexed;
        self.gs = Some(gs);
        self.publish_diagnostics(&files);
        self.counters.slow.fetch_add(1, Ordering::SeqCst);
        false
    }

    fn record_hash(&mut self, file: FileId, hash: FileHash) {
        if file.index() >= self.state_hashes.len() {
            self.state_hashes
                .resize(file.index() + 1, FileHash::not_computed());
        }
        self.state_hashes[file.index()] = hash;
    }

    fn publish_diagnostics(&self, files: &[FileId]) {
        let Some(gs) = self.gs.as_ref() else {
            return;
        };
        for &file in files {
            let content = gs.file(file);
            let diagnostics: Vec<serde_json::Value> = gs
                .diagnostics(file)
                .iter()
                .map(|diag| {
                    let line_len = content
                        .source()
                        .lines()
                        .nth(diag.line as usize)
                        .map(|line| line.chars().count() as u32)
                        .unwrap_or(0);
                    json!({
                        "range": {
                            "start": {"line": diag.line, "character": 0},
                            "end": {"line": diag.line, "character": line_len},
                        },
                        "severity": diag.severity.to_wire(),
                        "source": "sable",
                        "message": diag.message,
                    })
                })
                .collect();
            self.output.write(notification(
                "textDocument/publishDiagnostics",
                json!({
                    "uri": uri_from_path(content.path()),
                    "diagnostics": diagnostics,
                }),
            ));
        }
    }
}

type Job = Box<dyn FnOnce(&mut LspTypechecker) + Send>;

enum CoordinatorMessage {
    Task(Job),
    Shutdown,
}

/// Serializes all access to the [`LspTypechecker`] on a dedicated thread.
pub struct TypecheckerCoordinator {
    tx: Sender<CoordinatorMessage>,
    handle: Option<JoinHandle<()>>,
}

impl TypecheckerCoordinator {
    pub fn new(mut typechecker: LspTypechecker) -> Self {
        let (tx, rx) = unbounded::<CoordinatorMessage>();
        let handle = std::thread::Builder::new()
            .name("sable-typechecker".to_owned())
            .spawn(move || {
                while let Ok(message) = rx.recv() {
                    match message {
                        CoordinatorMessage::Task(job) => job(&mut typechecker),
                        CoordinatorMessage::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn typechecker thread");
        Self {
            tx,
            handle: Some(handle),
        }
    }

    /// Runs `job` on the typechecker thread and blocks until it completes.
    /// A sync job submitted behind an in-flight async one waits its turn.
    pub fn sync_run(&self, job: impl FnOnce(&mut LspTypechecker) + Send + 'static) {
        let (done_tx, done_rx) = bounded::<()>(1);
        self.tx
            .send(CoordinatorMessage::Task(Box::new(move |typechecker| {
                job(typechecker);
                let _ = done_tx.send(());
            })))
            .expect("typechecker thread alive");
        done_rx.recv().expect("typechecker job completed");
    }

    /// Enqueues `job` and returns immediately.
    pub fn async_run(&self, job: impl FnOnce(&mut LspTypechecker) + Send + 'static) {
        self.tx
            .send(CoordinatorMessage::Task(Box::new(job)))
            .expect("typechecker thread alive");
    }

    pub fn shutdown(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.tx.send(CoordinatorMessage::Shutdown);
            let _ = handle.join();
        }
    }
}

impl Drop for TypecheckerCoordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Records per-edit counters after a committed typecheck. The merged-edit
/// count is the number of editor edits folded in beyond the first.
pub fn record_edit_counters(updates_edit_count: u32) {
    let merged = updates_edit_count.saturating_sub(1);
    metrics::global().increment("lsp.messages.processed", crate::messages::WORKSPACE_EDIT_METHOD);
    metrics::global().add("lsp.messages.processed", "sable/mergedEdits", u64::from(merged));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CapturedOutput;
    use std::time::Duration;

    fn coordinator() -> TypecheckerCoordinator {
        let output = Arc::new(CapturedOutput::new());
        let counters = Arc::new(TypecheckCounters::default());
        TypecheckerCoordinator::new(LspTypechecker::new(output, counters))
    }

    #[test]
    fn jobs_run_in_submission_order() {
        let coordinator = coordinator();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..4 {
            let log = Arc::clone(&log);
            coordinator.async_run(move |_| {
                std::thread::sleep(Duration::from_millis(5));
                log.lock().push(i);
            });
        }
        let log_for_sync = Arc::clone(&log);
        coordinator.sync_run(move |_| log_for_sync.lock().push(99));

        assert_eq!(*log.lock(), vec![0, 1, 2, 3, 99]);
    }

    #[test]
    fn sync_run_waits_for_earlier_async_jobs() {
        let coordinator = coordinator();
        let flag = Arc::new(AtomicU32::new(0));

        let flag_for_async = Arc::clone(&flag);
        coordinator.async_run(move |_| {
            std::thread::sleep(Duration::from_millis(20));
            flag_for_async.store(1, Ordering::SeqCst);
        });
        coordinator.sync_run(|_| {});
        assert_eq!(flag.load(Ordering::SeqCst), 1);
    }
}
