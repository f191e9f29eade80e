#![allow(dead_code)]

use std::fs;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sable_lsp::{CapturedOutput, LspLoop, ServerConfig};
use sable_parse::ScriptParser;
use serde_json::{json, Value};

/// Drives an in-process server over raw JSON messages and captures its
/// output. Slow-path typechecks still run on the real typechecker thread, so
/// assertions about them go through [`TestServer::fence`] or the polling
/// helpers.
pub struct TestServer {
    pub server: LspLoop,
    pub output: Arc<CapturedOutput>,
    workspace: tempfile::TempDir,
    next_id: i64,
}

impl TestServer {
    pub fn new(files: &[(&str, &str)]) -> TestServer {
        let workspace = tempfile::tempdir().expect("create workspace dir");
        for (name, text) in files {
            fs::write(workspace.path().join(name), text).expect("write workspace file");
        }
        let config = ServerConfig {
            workspace_root: workspace.path().to_path_buf(),
            worker_threads: 2,
            ..ServerConfig::default()
        };
        let output = Arc::new(CapturedOutput::new());
        let server = LspLoop::new(
            config,
            Arc::clone(&output) as Arc<dyn sable_lsp::Output>,
            Arc::new(ScriptParser::new()),
        );
        TestServer {
            server,
            output,
            workspace,
            next_id: 0,
        }
    }

    /// Runs the initialize handshake and the initial workspace index.
    pub fn initialized(files: &[(&str, &str)]) -> TestServer {
        let mut server = TestServer::new(files);
        let id = server.request("initialize", json!({}));
        server.response_for(id);
        server.notify("initialized", json!({}));
        server.output.take();
        server
    }

    pub fn uri(&self, name: &str) -> String {
        format!("file://{}", self.workspace.path().join(name).display())
    }

    pub fn disk_path(&self, name: &str) -> std::path::PathBuf {
        self.workspace.path().join(name)
    }

    pub fn request(&mut self, method: &str, params: Value) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        self.server.process_request(json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }));
        id
    }

    pub fn notify(&mut self, method: &str, params: Value) {
        self.server.process_request(json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }));
    }

    pub fn open_file(&mut self, name: &str, text: &str) {
        let uri = self.uri(name);
        self.notify(
            "textDocument/didOpen",
            json!({
                "textDocument": {"uri": uri, "languageId": "ruby", "version": 1, "text": text},
            }),
        );
    }

    pub fn change_file(&mut self, name: &str, text: &str) {
        let uri = self.uri(name);
        self.notify(
            "textDocument/didChange",
            json!({
                "textDocument": {"uri": uri, "version": 2},
                "contentChanges": [{"text": text}],
            }),
        );
    }

    /// Sends a fence and waits for its echo; everything submitted earlier has
    /// been typechecked (or cancelled) once this returns.
    pub fn fence(&mut self, tag: i64) {
        self.notify("sable/fence", json!({"tag": tag}));
        self.wait_for(|msg| {
            msg["method"] == "sable/fence" && msg["params"]["tag"] == tag
        });
    }

    /// Waits until a captured message matches, and returns it.
    pub fn wait_for(&self, predicate: impl Fn(&Value) -> bool) -> Value {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(found) = self.output.snapshot().into_iter().find(|m| predicate(m)) {
                return found;
            }
            assert!(
                Instant::now() < deadline,
                "timed out waiting for a message; saw: {:#?}",
                self.output.snapshot()
            );
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    pub fn response_for(&self, id: i64) -> Value {
        self.wait_for(|msg| msg.get("id").and_then(Value::as_i64) == Some(id))
    }

    pub fn fast_typechecks(&self) -> u32 {
        self.server.typecheck_counters().fast()
    }

    pub fn slow_typechecks(&self) -> u32 {
        self.server.typecheck_counters().slow()
    }
}
