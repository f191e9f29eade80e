use crate::support::TestServer;
use serde_json::json;

const MAIN: &str = "\
# typed: true
class A
  sig {returns(Integer)}
  def f
    1
  end
  def self.make(x)
    f(1)
  end
end
";

fn position_params(server: &TestServer, name: &str, line: u32, character: u32) -> serde_json::Value {
    json!({
        "textDocument": {"uri": server.uri(name)},
        "position": {"line": line, "character": character},
    })
}

#[test]
fn definition_finds_the_declaration() {
    let mut server = TestServer::initialized(&[("a.rb", MAIN)]);
    // On the `f` in `f(1)`.
    let id = server.request(
        "textDocument/definition",
        position_params(&server, "a.rb", 7, 4),
    );
    let response = server.response_for(id);
    let locations = response["result"].as_array().unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0]["uri"], server.uri("a.rb"));
    assert_eq!(locations[0]["range"]["start"]["line"], 3);
}

#[test]
fn type_definition_resolves_classes_only() {
    let mut server = TestServer::initialized(&[("a.rb", MAIN)]);
    let id = server.request(
        "textDocument/typeDefinition",
        position_params(&server, "a.rb", 1, 6),
    );
    let response = server.response_for(id);
    let locations = response["result"].as_array().unwrap();
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0]["range"]["start"]["line"], 1);
}

#[test]
fn hover_shows_the_method_summary() {
    let mut server = TestServer::initialized(&[("a.rb", MAIN)]);
    let id = server.request(
        "textDocument/hover",
        position_params(&server, "a.rb", 3, 6),
    );
    let response = server.response_for(id);
    let value = response["result"]["contents"]["value"].as_str().unwrap();
    assert!(value.contains("A#f"), "{value}");
    assert!(value.contains("sig {returns(Integer)}"), "{value}");
}

#[test]
fn hover_on_nothing_is_null() {
    let mut server = TestServer::initialized(&[("a.rb", MAIN)]);
    let id = server.request(
        "textDocument/hover",
        position_params(&server, "a.rb", 4, 0),
    );
    let response = server.response_for(id);
    assert!(response["result"].is_null());
}

#[test]
fn completion_offers_matching_symbols() {
    let mut server = TestServer::initialized(&[("a.rb", MAIN)]);
    // Prefix `ma` on the `make` definition line.
    let id = server.request(
        "textDocument/completion",
        position_params(&server, "a.rb", 6, 13),
    );
    let response = server.response_for(id);
    let items = response["result"]["items"].as_array().unwrap();
    let labels: Vec<&str> = items.iter().filter_map(|i| i["label"].as_str()).collect();
    assert!(labels.contains(&"make"), "{labels:?}");
}

#[test]
fn references_and_highlights_find_word_occurrences() {
    let mut server = TestServer::initialized(&[("a.rb", MAIN)]);
    let id = server.request(
        "textDocument/references",
        position_params(&server, "a.rb", 3, 6),
    );
    let response = server.response_for(id);
    let references = response["result"].as_array().unwrap();
    // The declaration and the call in `make`.
    assert_eq!(references.len(), 2);

    let id = server.request(
        "textDocument/documentHighlight",
        position_params(&server, "a.rb", 3, 6),
    );
    let response = server.response_for(id);
    assert_eq!(response["result"].as_array().unwrap().len(), 2);
}

#[test]
fn document_symbols_list_the_file_declarations() {
    let mut server = TestServer::initialized(&[("a.rb", MAIN)]);
    let id = server.request(
        "textDocument/documentSymbol",
        json!({"textDocument": {"uri": server.uri("a.rb")}}),
    );
    let response = server.response_for(id);
    let names: Vec<&str> = response["result"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|s| s["name"].as_str())
        .collect();
    assert!(names.contains(&"A"));
    assert!(names.contains(&"f"));
    assert!(names.contains(&"make"));
}

#[test]
fn workspace_symbols_filter_by_query() {
    let mut server = TestServer::initialized(&[
        ("a.rb", MAIN),
        ("b.rb", "class Builder\nend\n"),
    ]);
    let id = server.request("workspace/symbol", json!({"query": "build"}));
    let response = server.response_for(id);
    let symbols = response["result"].as_array().unwrap();
    assert_eq!(symbols.len(), 1);
    assert_eq!(symbols[0]["name"], "Builder");
    assert_eq!(symbols[0]["kind"], 5);
}

#[test]
fn signature_help_inside_a_call() {
    let mut server = TestServer::initialized(&[("a.rb", MAIN)]);
    // Inside `f(1)`.
    let id = server.request(
        "textDocument/signatureHelp",
        position_params(&server, "a.rb", 7, 6),
    );
    let response = server.response_for(id);
    let label = response["result"]["signatures"][0]["label"].as_str().unwrap();
    assert!(label.contains("f"), "{label}");
    assert_eq!(response["result"]["activeParameter"], 0);
}

#[test]
fn code_action_offers_a_quickfix_for_a_missing_end() {
    let mut server = TestServer::initialized(&[("broken.rb", "class A\n  def f\n")]);
    let id = server.request(
        "textDocument/codeAction",
        json!({
            "textDocument": {"uri": server.uri("broken.rb")},
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 0}},
            "context": {"diagnostics": []},
        }),
    );
    let response = server.response_for(id);
    let actions = response["result"].as_array().unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0]["kind"], "quickfix");
    assert_eq!(actions[0]["title"], "Insert missing `end`");
}

#[test]
fn read_file_returns_the_servers_view() {
    let mut server = TestServer::initialized(&[("a.rb", MAIN)]);
    let uri = server.uri("a.rb");
    let id = server.request("sable/readFile", json!({"uri": uri}));
    let response = server.response_for(id);
    assert_eq!(response["result"]["languageId"], "ruby");
    assert_eq!(response["result"]["text"], MAIN);

    let id = server.request("sable/readFile", json!({"uri": server.uri("missing.rb")}));
    let response = server.response_for(id);
    assert_eq!(response["error"]["code"], -32602);
}
