//! Transport-agnostic sink for outgoing JSON-RPC messages.
//!
//! The server writes framed messages to stdout in production and into a
//! captured buffer in tests. Handlers build responses with `serde_json`
//! values; the helpers here pin the JSON-RPC envelope shape in one place.

use std::io::Write;

use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::codec::write_json_message;
use crate::messages::RequestId;

/// JSON-RPC / LSP error codes used by this server.
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const SERVER_NOT_INITIALIZED: i64 = -32002;
    pub const REQUEST_CANCELLED: i64 = -32800;
}

pub trait Output: Send + Sync {
    fn write(&self, message: Value);
}

/// Frames messages onto an arbitrary writer (stdout in production).
pub struct WriterOutput {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl WriterOutput {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
        }
    }
}

impl Output for WriterOutput {
    fn write(&self, message: Value) {
        let mut writer = self.writer.lock();
        if let Err(err) = write_json_message(&mut *writer, &message) {
            tracing::error!(target = "sable.lsp", "failed to write message: {err}");
        }
    }
}

/// Captures messages in memory; used by the test harness.
#[derive(Default)]
pub struct CapturedOutput {
    messages: Mutex<Vec<Value>>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns and clears everything written so far.
    pub fn take(&self) -> Vec<Value> {
        std::mem::take(&mut self.messages.lock())
    }

    pub fn snapshot(&self) -> Vec<Value> {
        self.messages.lock().clone()
    }
}

impl Output for CapturedOutput {
    fn write(&self, message: Value) {
        self.messages.lock().push(message);
    }
}

pub fn response(id: &RequestId, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.to_json(),
        "result": result,
    })
}

pub fn error_response(id: &RequestId, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id.to_json(),
        "error": {
            "code": code,
            "message": message,
        },
    })
}

pub fn notification(method: &str, params: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
    })
}
