use crate::support::TestServer;
use serde_json::Value;

const BODY_V1: &str = "class A\n  def f\n    1\n  end\nend\n";
const BODY_V2: &str = "class A\n  def f\n    2\n  end\nend\n";
const SIG_CHANGE: &str = "class A\n  def f(x)\n    x\n  end\nend\n";

#[test]
fn body_edit_runs_one_fast_typecheck() {
    let mut server = TestServer::initialized(&[("a.rb", BODY_V1)]);

    server.change_file("a.rb", BODY_V2);
    server.fence(1);

    assert_eq!(server.fast_typechecks(), 1);
    assert_eq!(server.slow_typechecks(), 0);

    // The server's view of the file tracks the edit.
    let uri = server.uri("a.rb");
    let id = server.request("sable/readFile", serde_json::json!({"uri": uri}));
    let response = server.response_for(id);
    assert_eq!(response["result"]["text"], BODY_V2);
}

#[test]
fn definition_change_runs_one_slow_typecheck() {
    let mut server = TestServer::initialized(&[("a.rb", BODY_V1)]);

    server.change_file("a.rb", SIG_CHANGE);
    server.fence(1);

    assert_eq!(server.fast_typechecks(), 0);
    assert_eq!(server.slow_typechecks(), 1);
}

#[test]
fn syntax_error_forces_the_slow_path_and_publishes_diagnostics() {
    let mut server = TestServer::initialized(&[("a.rb", BODY_V1)]);

    server.change_file("a.rb", "class A\n  def f(\n");
    server.fence(1);

    assert_eq!(server.slow_typechecks(), 1);
    let uri = server.uri("a.rb");
    let diagnostics = server.wait_for(|msg| {
        msg["method"] == "textDocument/publishDiagnostics"
            && msg["params"]["uri"] == uri.as_str()
            && !msg["params"]["diagnostics"].as_array().unwrap().is_empty()
    });
    let message = diagnostics["params"]["diagnostics"][0]["message"]
        .as_str()
        .unwrap();
    assert!(message.contains("unclosed bracket"), "{message}");
}

#[test]
fn opening_a_new_file_forces_the_slow_path() {
    let mut server = TestServer::initialized(&[("a.rb", BODY_V1)]);

    server.open_file("b.rb", "class B\n  def g\n    1\n  end\nend\n");
    server.fence(1);

    assert_eq!(server.slow_typechecks(), 1);
    assert_eq!(server.fast_typechecks(), 0);

    // The new file's symbols are queryable afterwards.
    let id = server.request(
        "workspace/symbol",
        serde_json::json!({"query": "B"}),
    );
    let response = server.response_for(id);
    let names: Vec<&str> = response["result"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert!(names.contains(&"B"), "{names:?}");
}

#[test]
fn fence_drains_the_pipeline_in_order() {
    let mut server = TestServer::initialized(&[("a.rb", BODY_V1)]);

    // One slow edit (async) followed by one fast edit (sync), then a fence:
    // the echo must come back only after both typechecks.
    server.change_file("a.rb", SIG_CHANGE);
    server.change_file(
        "a.rb",
        "class A\n  def f(x)\n    x + 1\n  end\nend\n",
    );
    server.fence(7);

    // The second edit leaves the first one's definitions intact, so it never
    // subsumes the running slow path: both typechecks commit.
    let total = server.fast_typechecks() + server.slow_typechecks();
    assert_eq!(total, 2);

    // The fence notification is ordered after every publishDiagnostics of
    // the committed typechecks.
    let messages = server.output.snapshot();
    let fence_pos = messages
        .iter()
        .position(|m| m["method"] == "sable/fence")
        .expect("fence echoed");
    let last_diag_pos = messages
        .iter()
        .rposition(|m| m["method"] == "textDocument/publishDiagnostics")
        .unwrap_or(0);
    assert!(fence_pos > last_diag_pos);
}

#[test]
fn watchman_file_changes_are_edits_too() {
    let mut server = TestServer::initialized(&[("a.rb", BODY_V1)]);

    std::fs::write(server.disk_path("a.rb"), BODY_V2).expect("rewrite file");
    let path = server.disk_path("a.rb").display().to_string();
    server.notify(
        "sable/watchmanFileChange",
        serde_json::json!({"path": path}),
    );
    server.fence(1);

    let uri = server.uri("a.rb");
    let id = server.request("sable/readFile", serde_json::json!({"uri": uri}));
    let response = server.response_for(id);
    assert_eq!(response["result"]["text"], BODY_V2);
}

#[test]
fn did_close_reverts_to_disk_contents() {
    let mut server = TestServer::initialized(&[("a.rb", BODY_V1)]);

    server.change_file("a.rb", BODY_V2);
    server.fence(1);

    // Closing the buffer falls back to what's on disk (still v1).
    let uri = server.uri("a.rb");
    server.notify(
        "textDocument/didClose",
        serde_json::json!({"textDocument": {"uri": uri}}),
    );
    server.fence(2);

    let id = server.request("sable/readFile", serde_json::json!({"uri": uri}));
    let response = server.response_for(id);
    assert_eq!(response["result"]["text"], BODY_V1);
}

#[test]
fn every_edit_publishes_diagnostics_for_the_touched_file() {
    let mut server = TestServer::initialized(&[("a.rb", BODY_V1)]);

    server.change_file("a.rb", BODY_V2);
    server.fence(1);

    let uri = server.uri("a.rb");
    let diagnostics = server.wait_for(|msg| {
        msg["method"] == "textDocument/publishDiagnostics" && msg["params"]["uri"] == uri.as_str()
    });
    assert_eq!(diagnostics["params"]["diagnostics"], Value::Array(vec![]));
}
