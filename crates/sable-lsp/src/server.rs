//! The main LSP loop.
//!
//! Drains the preprocessor queue and routes each canonical message: edits go
//! through the committer and then to the typechecker coordinator (blocking
//! for the fast path, cancelable-async for the slow path), queries become
//! `sync_run` jobs, lifecycle messages are answered inline.

use std::collections::HashMap;
use std::fs;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use sable_core::{FileContent, FileHash, FileId, GlobalState, UnfreezeFileTable};
use sable_parse::Parser;
use sable_pipeline::WorkerPool;
use serde::Deserialize;
use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::codec::read_json_message;
use crate::config::ServerConfig;
use crate::messages::{LspMessage, QueuedMessage, RequestId};
use crate::metrics;
use crate::output::{error_codes, error_response, notification, response, Output};
use crate::preprocessor::Preprocessor;
use crate::queries;
use crate::typechecker::{
    record_edit_counters, LspTypechecker, TypecheckCounters, TypecheckerCoordinator,
};
use crate::updates::FileUpdates;

pub struct LspLoop {
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) output: Arc<dyn Output>,
    pub(crate) parser: Arc<dyn Parser>,
    preprocessor: Arc<Preprocessor>,
    coordinator: TypecheckerCoordinator,
    pub(crate) workers: WorkerPool,
    counters: Arc<TypecheckCounters>,

    /// Kept current with every edit; never typechecked against directly. Slow
    /// paths clone it.
    pub(crate) initial_gs: GlobalState,
    /// Committed hashes for the files in `initial_gs`, indexed by file id.
    pub(crate) global_state_hashes: Vec<FileHash>,
    /// The last edit committed on the slow path, for cancelation merging.
    pub(crate) last_slow_path_update: FileUpdates,
    /// Hashes that edit evicted from `global_state_hashes`.
    pub(crate) last_slow_path_evicted_hashes: HashMap<FileId, FileHash>,

    last_metrics_flush: Instant,
    shutdown_requested: bool,
    exit_requested: bool,
}

impl LspLoop {
    pub fn new(config: ServerConfig, output: Arc<dyn Output>, parser: Arc<dyn Parser>) -> Self {
        let config = Arc::new(config);
        let counters = Arc::new(TypecheckCounters::default());
        let coordinator = TypecheckerCoordinator::new(LspTypechecker::new(
            Arc::clone(&output),
            Arc::clone(&counters),
        ));
        let workers = WorkerPool::new(config.worker_threads);
        Self {
            preprocessor: Arc::new(Preprocessor::new(Arc::clone(&config), Arc::clone(&output))),
            config,
            output,
            parser,
            coordinator,
            workers,
            counters,
            initial_gs: GlobalState::new(),
            global_state_hashes: Vec::new(),
            last_slow_path_update: FileUpdates::default(),
            last_slow_path_evicted_hashes: HashMap::new(),
            last_metrics_flush: Instant::now(),
            shutdown_requested: false,
            exit_requested: false,
        }
    }

    /// Committed typecheck run counters, split fast/slow. For tests.
    pub fn typecheck_counters(&self) -> &Arc<TypecheckCounters> {
        &self.counters
    }

    /// Runs the server against a message stream until `exit` or EOF.
    pub fn run(&mut self, reader: impl BufRead + Send + 'static) -> anyhow::Result<()> {
        let preprocessor = Arc::clone(&self.preprocessor);
        let output = Arc::clone(&self.output);
        std::thread::Builder::new()
            .name("sable-reader".to_owned())
            .spawn(move || {
                let mut reader = reader;
                loop {
                    match read_json_message(&mut reader) {
                        Ok(Some(raw)) => preprocessor.preprocess_and_enqueue(raw),
                        Ok(None) => break,
                        Err(err) if err.kind() == std::io::ErrorKind::InvalidData => {
                            // Unparseable body; there is no id to echo back.
                            tracing::warn!(target = "sable.lsp", "dropping message: {err}");
                            output.write(json!({
                                "jsonrpc": "2.0",
                                "id": Value::Null,
                                "error": {
                                    "code": error_codes::PARSE_ERROR,
                                    "message": "could not parse message",
                                },
                            }));
                        }
                        Err(err) => {
                            tracing::error!(target = "sable.lsp", "read failed: {err}");
                            break;
                        }
                    }
                }
                preprocessor.close();
            })?;

        while let Some(queued) = self.preprocessor.pop_blocking() {
            self.process_queued(queued);
            if self.exit_requested {
                break;
            }
        }
        self.coordinator.shutdown();
        Ok(())
    }

    /// Single-threaded dispatch of one raw message: preprocess, then drain
    /// everything that became ready. Used by tests and by `processRequest`
    /// style embedding.
    pub fn process_request(&mut self, raw: Value) {
        self.process_requests(vec![raw]);
    }

    pub fn process_requests(&mut self, raws: Vec<Value>) {
        for raw in raws {
            self.preprocessor.preprocess_and_enqueue(raw);
        }
        while let Some(queued) = self.preprocessor.try_pop() {
            self.process_queued(queued);
        }
    }

    fn process_queued(&mut self, queued: QueuedMessage) {
        match queued.msg {
            LspMessage::WorkspaceEdit(edit) => self.commit_and_dispatch(edit),
            LspMessage::Notification { method, params } => {
                self.process_notification(&method, params)
            }
            LspMessage::Request {
                id,
                method,
                params,
                canceled,
            } => self.process_request_message(id, &method, params, canceled),
        }
        self.maybe_flush_metrics();
    }

    fn commit_and_dispatch(&mut self, edit: crate::messages::WorkspaceEditParams) {
        let updates = self.commit_edit(edit);
        let edit_count = updates.edit_count;
        if updates.can_take_fast_path {
            // Fast path: blocking, not interruptible.
            self.coordinator.sync_run(move |typechecker| {
                if !typechecker.typecheck(updates) {
                    record_edit_counters(edit_count);
                }
            });
        } else {
            // Slow path: non-blocking so a later edit can cancel it. Mark the
            // epoch as cancelable before handing off the job.
            self.initial_gs.start_commit_epoch(updates.epoch);
            self.coordinator.async_run(move |typechecker| {
                if !typechecker.typecheck(updates) {
                    record_edit_counters(edit_count);
                }
            });
        }
    }

    fn process_notification(&mut self, method: &str, params: Value) {
        metrics::global().increment("lsp.messages.processed", method);
        match method {
            "initialized" => self.index_workspace(),
            "exit" => {
                self.exit_requested = true;
            }
            "sable/fence" => {
                // Echo the fence back once every prior message has been
                // typechecked (or cancelled).
                let output = Arc::clone(&self.output);
                self.coordinator.sync_run(move |_| {
                    output.write(notification("sable/fence", params));
                });
            }
            "sable/error" => {
                #[derive(Deserialize)]
                struct ErrorParams {
                    code: i64,
                    message: String,
                }
                if let Ok(params) = serde_json::from_value::<ErrorParams>(params) {
                    if params.code == error_codes::METHOD_NOT_FOUND {
                        tracing::debug!(target = "sable.lsp", "{}", params.message);
                    } else {
                        tracing::error!(target = "sable.lsp", "{}", params.message);
                    }
                }
            }
            _ => {
                tracing::debug!(target = "sable.lsp", method, "ignoring notification");
            }
        }
    }

    fn process_request_message(
        &mut self,
        id: RequestId,
        method: &str,
        params: Value,
        canceled: bool,
    ) {
        if canceled {
            metrics::global().increment("lsp.messages", "canceled");
            self.output.write(error_response(
                &id,
                error_codes::REQUEST_CANCELLED,
                "request was canceled",
            ));
            return;
        }
        if self.shutdown_requested {
            self.output.write(error_response(
                &id,
                error_codes::INVALID_REQUEST,
                "received a request after shutdown",
            ));
            return;
        }
        metrics::global().increment("lsp.messages.processed", method);

        match method {
            "initialize" => {
                let capabilities = self.capabilities();
                self.output.write(response(&id, capabilities));
            }
            "shutdown" => {
                self.shutdown_requested = true;
                self.output.write(response(&id, Value::Null));
            }
            "textDocument/definition" => self.dispatch_query(queries::handle_definition, id, params),
            "textDocument/typeDefinition" => {
                self.dispatch_query(queries::handle_type_definition, id, params)
            }
            "textDocument/hover" => self.dispatch_query(queries::handle_hover, id, params),
            "textDocument/completion" => self.dispatch_query(queries::handle_completion, id, params),
            "textDocument/references" => self.dispatch_query(queries::handle_references, id, params),
            "textDocument/documentHighlight" => {
                self.dispatch_query(queries::handle_document_highlight, id, params)
            }
            "textDocument/documentSymbol" => {
                self.dispatch_query(queries::handle_document_symbol, id, params)
            }
            "textDocument/signatureHelp" => {
                self.dispatch_query(queries::handle_signature_help, id, params)
            }
            "textDocument/codeAction" => self.dispatch_query(queries::handle_code_action, id, params),
            "workspace/symbol" => self.dispatch_query(queries::handle_workspace_symbol, id, params),
            "sable/readFile" => self.dispatch_query(queries::handle_read_file, id, params),
            "sable/error" => {
                #[derive(Deserialize)]
                struct ErrorParams {
                    code: i64,
                    message: String,
                }
                match serde_json::from_value::<ErrorParams>(params) {
                    Ok(params) => self
                        .output
                        .write(error_response(&id, params.code, &params.message)),
                    Err(_) => self.output.write(error_response(
                        &id,
                        error_codes::INVALID_PARAMS,
                        "invalid sable/error params",
                    )),
                }
            }
            _ => {
                self.output.write(error_response(
                    &id,
                    error_codes::METHOD_NOT_FOUND,
                    &format!("unknown request method: {method}"),
                ));
            }
        }
    }

    fn dispatch_query(
        &self,
        handler: fn(&LspTypechecker, RequestId, Value),
        id: RequestId,
        params: Value,
    ) {
        self.coordinator
            .sync_run(move |typechecker| handler(typechecker, id, params));
    }

    fn capabilities(&self) -> Value {
        let mut capabilities = json!({
            "textDocumentSync": 1,
            "definitionProvider": true,
            "typeDefinitionProvider": true,
            "workspaceSymbolProvider": true,
            "referencesProvider": true,
            "hoverProvider": true,
            "documentSymbolProvider": self.config.document_symbol_enabled,
            "documentHighlightProvider": self.config.document_highlight_enabled,
            "completionProvider": {"triggerCharacters": ["."]},
        });
        if self.config.signature_help_enabled {
            capabilities["signatureHelpProvider"] = json!({"triggerCharacters": ["(", ","]});
        }
        if self.config.quick_fix_enabled {
            capabilities["codeActionProvider"] = json!({"codeActionKinds": ["quickfix"]});
        }
        json!({"capabilities": capabilities})
    }

    /// Indexes the workspace from the file system and hands the initial state
    /// to the typechecker. Runs once, on `initialized`.
    fn index_workspace(&mut self) {
        let mut paths: Vec<PathBuf> = WalkDir::new(&self.config.workspace_root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| self.config.matches_extension(&path.to_string_lossy()))
            .collect();
        paths.sort();
        tracing::info!(
            target = "sable.lsp",
            files = paths.len(),
            root = %self.config.workspace_root.display(),
            "indexing workspace"
        );

        let mut jobs: Vec<(FileId, Arc<FileContent>)> = Vec::with_capacity(paths.len());
        {
            let mut table = UnfreezeFileTable::new(&mut self.initial_gs);
            for path in paths {
                let text = fs::read_to_string(&path).unwrap_or_default();
                let strict = sable_parse::strict_level_of(&text);
                let content = Arc::new(FileContent::new(
                    path.to_string_lossy().into_owned(),
                    text,
                    strict,
                ));
                let id = table.enter_file(Arc::clone(&content));
                jobs.push((id, content));
            }
        }

        let contents: Vec<Arc<FileContent>> = jobs.iter().map(|(_, c)| Arc::clone(c)).collect();
        self.global_state_hashes = self.workers.compute_file_hashes(&contents, &*self.parser);
        let indexed = self.workers.index_files(&jobs, &*self.parser);

        let gs = self.initial_gs.deep_copy();
        let hashes = self.global_state_hashes.clone();
        // Initialization isn't cancelable, so it blocks.
        self.coordinator
            .sync_run(move |typechecker| typechecker.initialize(gs, indexed, hashes));
    }

    fn maybe_flush_metrics(&mut self) {
        if self.last_metrics_flush.elapsed() >= metrics::FLUSH_INTERVAL {
            metrics::global().flush_to_log();
            self.last_metrics_flush = Instant::now();
        }
    }
}
