use crate::support::TestServer;
use serde_json::json;

#[test]
fn initialize_reports_capabilities() {
    let mut server = TestServer::new(&[]);
    let id = server.request("initialize", json!({}));
    let response = server.response_for(id);

    let caps = &response["result"]["capabilities"];
    assert_eq!(caps["textDocumentSync"], 1);
    assert_eq!(caps["definitionProvider"], true);
    assert_eq!(caps["typeDefinitionProvider"], true);
    assert_eq!(caps["workspaceSymbolProvider"], true);
    assert_eq!(caps["referencesProvider"], true);
    assert_eq!(caps["hoverProvider"], true);
    assert_eq!(caps["completionProvider"]["triggerCharacters"], json!(["."]));
    assert_eq!(
        caps["signatureHelpProvider"]["triggerCharacters"],
        json!(["(", ","])
    );
    assert_eq!(
        caps["codeActionProvider"]["codeActionKinds"],
        json!(["quickfix"])
    );
}

#[test]
fn requests_before_initialize_get_server_not_initialized() {
    let mut server = TestServer::new(&[]);
    let id = server.request("textDocument/hover", json!({}));
    let response = server.response_for(id);
    assert_eq!(response["error"]["code"], -32002);
}

#[test]
fn duplicate_initialize_is_rejected() {
    let mut server = TestServer::new(&[]);
    let first = server.request("initialize", json!({}));
    server.response_for(first);

    let second = server.request("initialize", json!({}));
    let response = server.response_for(second);
    assert_eq!(response["error"]["code"], -32002);
}

#[test]
fn unknown_request_methods_get_method_not_found() {
    let mut server = TestServer::initialized(&[]);
    let id = server.request("textDocument/rename", json!({}));
    let response = server.response_for(id);
    assert_eq!(response["error"]["code"], -32601);
}

#[test]
fn cancel_for_a_drained_request_gets_request_cancelled() {
    let mut server = TestServer::initialized(&[]);
    // Request id 999 was never queued; the cancel arrives too late.
    server.notify("$/cancelRequest", json!({"id": 999}));
    let response = server.wait_for(|msg| msg.get("id").and_then(serde_json::Value::as_i64) == Some(999));
    assert_eq!(response["error"]["code"], -32800);
}

#[test]
fn shutdown_then_requests_are_rejected() {
    let mut server = TestServer::initialized(&[]);
    let id = server.request("shutdown", json!(null));
    let response = server.response_for(id);
    assert!(response["result"].is_null());
    assert!(response.get("error").is_none());

    let id = server.request("textDocument/hover", json!({}));
    let response = server.response_for(id);
    assert_eq!(response["error"]["code"], -32600);
}

#[test]
fn sable_error_requests_echo_the_error_back() {
    let mut server = TestServer::initialized(&[]);
    let id = server.request(
        "sable/error",
        json!({"code": -32099, "message": "something broke"}),
    );
    let response = server.response_for(id);
    assert_eq!(response["error"]["code"], -32099);
    assert_eq!(response["error"]["message"], "something broke");
}

#[test]
fn notifications_before_initialize_are_dropped() {
    let mut server = TestServer::new(&[("a.rb", "class A; end")]);
    // This edit arrives before the handshake and must not be queued.
    server.change_file("a.rb", "class B; end");
    assert!(server.output.take().is_empty());

    let id = server.request("initialize", json!({}));
    server.response_for(id);
}
