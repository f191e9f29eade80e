//! Canonicalizes the incoming message stream.
//!
//! The preprocessor turns raw protocol messages into a totally-ordered queue
//! of [`QueuedMessage`]s:
//!
//! - the initialization handshake is enforced here, so the main loop never
//!   sees a request that arrived too early;
//! - `textDocument/didOpen`, `didChange`, `didClose` and file-watch
//!   notifications are rewritten into the internal `sable/workspaceEdit`
//!   shape, and successive edits coalesce while older ones are still queued;
//! - `$/cancelRequest` marks the queued request as cancelled without removing
//!   it (a response must still go out);
//! - `__PAUSE__` / `__RESUME__` hold the queue for tests.
//!
//! The preprocessor owns the epoch counter: every canonical edit gets a fresh
//! epoch, and every queued message is tagged with the counter's value at
//! enqueue time.

use std::collections::VecDeque;
use std::fs;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use sable_core::{Epoch, FileContent};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ServerConfig;
use crate::messages::{LspMessage, QueuedMessage, RequestId, WorkspaceEditParams};
use crate::output::{error_response, error_codes, Output};
use crate::text::path_from_uri;

#[derive(Debug, Default)]
pub struct QueueState {
    pub pending: VecDeque<QueuedMessage>,
    pub paused: bool,
    closed: bool,
}

struct HandshakeState {
    next_epoch: u32,
    seen_initialize: bool,
}

pub struct Preprocessor {
    config: Arc<ServerConfig>,
    output: Arc<dyn Output>,
    handshake: Mutex<HandshakeState>,
    queue: Mutex<QueueState>,
    queue_ready: Condvar,
}

impl Preprocessor {
    pub fn new(config: Arc<ServerConfig>, output: Arc<dyn Output>) -> Self {
        Self {
            config,
            output,
            // Epoch 0 is reserved for the initial, from-disk state; the first
            // edit commits at epoch 1.
            handshake: Mutex::new(HandshakeState {
                next_epoch: 1,
                seen_initialize: false,
            }),
            queue: Mutex::new(QueueState::default()),
            queue_ready: Condvar::new(),
        }
    }

    pub fn preprocess_and_enqueue(&self, raw: Value) {
        let Some(method) = raw.get("method").and_then(Value::as_str) else {
            // A response from the client, or a malformed message with an id.
            if let Some(id) = raw.get("id").and_then(RequestId::from_json) {
                if raw.get("result").is_none() && raw.get("error").is_none() {
                    self.output.write(error_response(
                        &id,
                        error_codes::INVALID_REQUEST,
                        "message has no method",
                    ));
                }
            }
            return;
        };
        let method = method.to_owned();
        let id = raw.get("id").and_then(RequestId::from_json);
        let params = raw.get("params").cloned().unwrap_or(Value::Null);

        match method.as_str() {
            "__PAUSE__" => {
                let mut queue = self.queue.lock();
                assert!(!queue.paused, "queue already paused");
                queue.paused = true;
            }
            "__RESUME__" => {
                let mut queue = self.queue.lock();
                assert!(queue.paused, "queue not paused");
                queue.paused = false;
                self.queue_ready.notify_all();
            }
            "$/cancelRequest" => self.cancel_request(params),
            "textDocument/didOpen"
            | "textDocument/didChange"
            | "textDocument/didClose"
            | "sable/watchmanFileChange" => {
                if !self.handshake.lock().seen_initialize {
                    tracing::debug!(
                        target = "sable.lsp",
                        method,
                        "dropping edit before initialization"
                    );
                    return;
                }
                if let Some(file) = self.canonicalize_edit(&method, params) {
                    self.enqueue_edit(file);
                }
            }
            "initialize" => {
                let Some(id) = id else {
                    return;
                };
                let mut handshake = self.handshake.lock();
                if handshake.seen_initialize {
                    self.output.write(error_response(
                        &id,
                        error_codes::SERVER_NOT_INITIALIZED,
                        "server is already initialized",
                    ));
                    return;
                }
                handshake.seen_initialize = true;
                let epoch = Epoch::new(handshake.next_epoch);
                drop(handshake);
                self.enqueue(QueuedMessage {
                    epoch,
                    msg: LspMessage::Request {
                        id,
                        method,
                        params,
                        canceled: false,
                    },
                });
            }
            _ => {
                let handshake = self.handshake.lock();
                let initialized = handshake.seen_initialize;
                let epoch = Epoch::new(handshake.next_epoch);
                drop(handshake);
                match id {
                    Some(id) => {
                        // The first message processed must be `initialize`.
                        if !initialized {
                            self.output.write(error_response(
                                &id,
                                error_codes::SERVER_NOT_INITIALIZED,
                                "server not initialized",
                            ));
                            return;
                        }
                        self.enqueue(QueuedMessage {
                            epoch,
                            msg: LspMessage::Request {
                                id,
                                method,
                                params,
                                canceled: false,
                            },
                        });
                    }
                    None => {
                        if !initialized && method != "exit" {
                            tracing::debug!(
                                target = "sable.lsp",
                                method,
                                "dropping notification before initialization"
                            );
                            return;
                        }
                        self.enqueue(QueuedMessage {
                            epoch,
                            msg: LspMessage::Notification { method, params },
                        });
                    }
                }
            }
        }
    }

    /// Blocks until a message is available. Returns `None` once the stream is
    /// closed and the queue has drained.
    pub fn pop_blocking(&self) -> Option<QueuedMessage> {
        let mut queue = self.queue.lock();
        loop {
            if !queue.paused {
                if let Some(msg) = queue.pending.pop_front() {
                    return Some(msg);
                }
                if queue.closed {
                    return None;
                }
            }
            self.queue_ready.wait(&mut queue);
        }
    }

    /// Non-blocking pop for the single-threaded dispatch path.
    pub fn try_pop(&self) -> Option<QueuedMessage> {
        let mut queue = self.queue.lock();
        assert!(
            !queue.paused,
            "__PAUSE__ not supported in single-threaded mode"
        );
        queue.pending.pop_front()
    }

    /// Marks the input stream finished; `pop_blocking` returns `None` once
    /// the queue drains.
    pub fn close(&self) {
        let mut queue = self.queue.lock();
        queue.closed = true;
        queue.paused = false;
        self.queue_ready.notify_all();
    }

    fn enqueue(&self, msg: QueuedMessage) {
        let mut queue = self.queue.lock();
        queue.pending.push_back(msg);
        self.queue_ready.notify_all();
    }

    fn enqueue_edit(&self, file: Arc<FileContent>) {
        let epoch = {
            let mut handshake = self.handshake.lock();
            let epoch = Epoch::new(handshake.next_epoch);
            handshake.next_epoch += 1;
            epoch
        };
        let edit = WorkspaceEditParams {
            epoch,
            merge_count: 0,
            updates: vec![file],
        };

        let mut queue = self.queue.lock();
        let pending_edit = queue
            .pending
            .iter()
            .rposition(|queued| matches!(queued.msg, LspMessage::WorkspaceEdit(_)));
        match pending_edit {
            Some(i) => {
                let queued = &mut queue.pending[i];
                queued.epoch = epoch;
                if let LspMessage::WorkspaceEdit(pending) = &mut queued.msg {
                    pending.merge(edit);
                }
            }
            None => queue.pending.push_back(QueuedMessage {
                epoch,
                msg: LspMessage::WorkspaceEdit(edit),
            }),
        }
        self.queue_ready.notify_all();
    }

    fn cancel_request(&self, params: Value) {
        #[derive(Deserialize)]
        struct CancelParams {
            id: Value,
        }
        let Ok(params) = serde_json::from_value::<CancelParams>(params) else {
            return;
        };
        let Some(id) = RequestId::from_json(&params.id) else {
            return;
        };

        let mut queue = self.queue.lock();
        for queued in queue.pending.iter_mut() {
            if let LspMessage::Request {
                id: queued_id,
                canceled,
                ..
            } = &mut queued.msg
            {
                if *queued_id == id {
                    *canceled = true;
                    return;
                }
            }
        }
        drop(queue);
        // Already drained: the response (if any) went out long ago, so all we
        // can do is tell the client the cancel arrived too late.
        self.output.write(error_response(
            &id,
            error_codes::REQUEST_CANCELLED,
            "request already processed",
        ));
    }

    fn canonicalize_edit(&self, method: &str, params: Value) -> Option<Arc<FileContent>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct DocumentWithText {
            uri: String,
            text: String,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct DidOpenParams {
            text_document: DocumentWithText,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct DocumentId {
            uri: String,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ContentChange {
            text: String,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct DidChangeParams {
            text_document: DocumentId,
            content_changes: Vec<ContentChange>,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct DidCloseParams {
            text_document: DocumentId,
        }

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct WatchmanFileChangeParams {
            path: String,
        }

        let (path, text) = match method {
            "textDocument/didOpen" => {
                let params: DidOpenParams = serde_json::from_value(params).ok()?;
                (
                    path_from_uri(&params.text_document.uri)?,
                    params.text_document.text,
                )
            }
            "textDocument/didChange" => {
                let params: DidChangeParams = serde_json::from_value(params).ok()?;
                // Sync is full-document: the last change wins.
                let text = params.content_changes.into_iter().last()?.text;
                (path_from_uri(&params.text_document.uri)?, text)
            }
            "textDocument/didClose" => {
                // The editor no longer owns the buffer; fall back to disk.
                let params: DidCloseParams = serde_json::from_value(params).ok()?;
                let path = path_from_uri(&params.text_document.uri)?;
                let text = fs::read_to_string(&path).unwrap_or_default();
                (path, text)
            }
            "sable/watchmanFileChange" => {
                let params: WatchmanFileChangeParams = serde_json::from_value(params).ok()?;
                if !self.config.matches_extension(&params.path) {
                    return None;
                }
                let text = fs::read_to_string(&params.path).unwrap_or_default();
                (params.path, text)
            }
            _ => return None,
        };

        let strict = sable_parse::strict_level_of(&text);
        Some(Arc::new(FileContent::new(path, text, strict)))
    }

    #[cfg(test)]
    fn pending_snapshot(&self) -> Vec<QueuedMessage> {
        self.queue.lock().pending.iter().cloned().collect()
    }
}
