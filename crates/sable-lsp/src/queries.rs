//! Per-query handlers.
//!
//! Every handler runs on the typechecker thread (inside a `sync_run` job) and
//! answers from the authoritative typechecked snapshot. Handlers write their
//! own responses; the main loop only routes.

use lsp_types::{Position, Range};
use sable_core::{FileId, GlobalState, Symbol, SymbolId, SymbolKind};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::messages::RequestId;
use crate::output::{error_codes, error_response, response};
use crate::text::{path_from_uri, uri_from_path, word_at, word_occurrences, word_prefix};
use crate::typechecker::LspTypechecker;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentId {
    uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionParams {
    text_document: DocumentId,
    position: Position,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentParams {
    text_document: DocumentId,
}

#[derive(Debug, Deserialize)]
struct WorkspaceSymbolParams {
    query: String,
}

/// Returns the typechecked state, or answers `ServerNotInitialized` itself.
fn state_or_reply<'a>(tc: &'a LspTypechecker, id: &RequestId) -> Option<&'a GlobalState> {
    match tc.state() {
        Some(gs) => Some(gs),
        None => {
            tc.output().write(error_response(
                id,
                error_codes::SERVER_NOT_INITIALIZED,
                "server not initialized",
            ));
            None
        }
    }
}

struct ResolvedPosition {
    file: FileId,
    line: String,
    position: Position,
}

fn resolve_position(gs: &GlobalState, params: &PositionParams) -> Option<ResolvedPosition> {
    let path = path_from_uri(&params.text_document.uri)?;
    let file = gs.find_file_by_path(&path)?;
    let line = gs
        .file(file)
        .source()
        .lines()
        .nth(params.position.line as usize)
        .unwrap_or("")
        .to_owned();
    Some(ResolvedPosition {
        file,
        line,
        position: params.position,
    })
}

fn line_range(line: u32, start: u32, end: u32) -> Value {
    let range = Range::new(Position::new(line, start), Position::new(line, end));
    serde_json::to_value(range).expect("a range always serializes")
}

fn symbol_location(gs: &GlobalState, symbol: &Symbol) -> Option<Value> {
    let loc = symbol.loc?;
    let content = gs.file(loc.file);
    let name = gs.name_str(symbol.name);
    let line_text = content.source().lines().nth(loc.line as usize).unwrap_or("");
    let range = match word_occurrences(line_text, name).first() {
        Some(&start) => line_range(loc.line, start, start + name.chars().count() as u32),
        None => line_range(loc.line, 0, line_text.chars().count() as u32),
    };
    Some(json!({
        "uri": uri_from_path(content.path()),
        "range": range,
    }))
}

/// Finds the symbol a bare identifier most plausibly refers to: a declared
/// method by that name, else a class.
fn find_symbol_by_name<'a>(gs: &'a GlobalState, word: &str) -> Option<(SymbolId, &'a Symbol)> {
    let mut class_hit = None;
    for (id, symbol) in gs.symbols() {
        if gs.name_str(symbol.name) != word {
            continue;
        }
        match symbol.kind {
            SymbolKind::Method if symbol.loc.is_some() => return Some((id, symbol)),
            SymbolKind::Class if class_hit.is_none() => class_hit = Some((id, symbol)),
            _ => {}
        }
    }
    class_hit
}

fn describe_symbol(gs: &GlobalState, symbol: &Symbol) -> String {
    match symbol.kind {
        SymbolKind::Class => {
            let mut text = format!("class {}", gs.name_str(symbol.name));
            if !symbol.ancestors.is_empty() {
                let ancestors: Vec<&str> =
                    symbol.ancestors.iter().map(|a| gs.name_str(*a)).collect();
                text.push_str(&format!(" < {}", ancestors.join(", ")));
            }
            text
        }
        SymbolKind::Method => {
            let owner = gs.name_str(gs.symbol(symbol.owner).name);
            let separator = if symbol.is_self_method { "." } else { "#" };
            format!(
                "{owner}{separator}{} ({} {}, arity {})",
                gs.name_str(symbol.name),
                symbol.visibility.as_str(),
                if symbol.is_self_method {
                    "class method"
                } else {
                    "instance method"
                },
                symbol.arity,
            )
        }
    }
}

pub fn handle_definition(tc: &LspTypechecker, id: RequestId, params: Value) {
    let Some(gs) = state_or_reply(tc, &id) else {
        return;
    };
    let locations = position_params(&params)
        .and_then(|params| resolve_position(gs, &params))
        .and_then(|pos| word_at(&pos.line, pos.position.character))
        .and_then(|word| find_symbol_by_name(gs, &word))
        .and_then(|(_, symbol)| symbol_location(gs, symbol))
        .map(|loc| vec![loc])
        .unwrap_or_default();
    tc.output().write(response(&id, json!(locations)));
}

pub fn handle_type_definition(tc: &LspTypechecker, id: RequestId, params: Value) {
    let Some(gs) = state_or_reply(tc, &id) else {
        return;
    };
    let locations = position_params(&params)
        .and_then(|params| resolve_position(gs, &params))
        .and_then(|pos| word_at(&pos.line, pos.position.character))
        .and_then(|word| {
            let class = gs.find_class(&word)?;
            symbol_location(gs, gs.symbol(class))
        })
        .map(|loc| vec![loc])
        .unwrap_or_default();
    tc.output().write(response(&id, json!(locations)));
}

pub fn handle_hover(tc: &LspTypechecker, id: RequestId, params: Value) {
    let Some(gs) = state_or_reply(tc, &id) else {
        return;
    };
    let hover = position_params(&params)
        .and_then(|params| resolve_position(gs, &params))
        .and_then(|pos| word_at(&pos.line, pos.position.character))
        .and_then(|word| find_symbol_by_name(gs, &word))
        .map(|(_, symbol)| {
            let mut value = format!("```ruby\n{}\n```", describe_symbol(gs, symbol));
            if let Some(sig) = &symbol.sig {
                value.push_str(&format!("\n\nsig {sig}"));
            }
            json!({
                "contents": {"kind": "markdown", "value": value},
            })
        })
        .unwrap_or(Value::Null);
    tc.output().write(response(&id, hover));
}

pub fn handle_completion(tc: &LspTypechecker, id: RequestId, params: Value) {
    let Some(gs) = state_or_reply(tc, &id) else {
        return;
    };
    let Some(pos) = position_params(&params).and_then(|params| resolve_position(gs, &params))
    else {
        tc.output().write(response(
            &id,
            json!({"isIncomplete": false, "items": []}),
        ));
        return;
    };

    let prefix = word_prefix(&pos.line, pos.position.character);
    let mut items: Vec<(String, Value)> = Vec::new();
    for (_, symbol) in gs.symbols() {
        let name = gs.name_str(symbol.name);
        if !name.starts_with(prefix.as_str()) || symbol.loc.is_none() {
            continue;
        }
        let kind = match symbol.kind {
            SymbolKind::Method => 2,
            SymbolKind::Class => 7,
        };
        if items.iter().any(|(label, _)| label == name) {
            continue;
        }
        items.push((
            name.to_owned(),
            json!({
                "label": name,
                "kind": kind,
                "detail": describe_symbol(gs, symbol),
            }),
        ));
    }
    items.sort_by(|(a, _), (b, _)| a.cmp(b));
    let items: Vec<Value> = items.into_iter().map(|(_, item)| item).collect();
    tc.output().write(response(
        &id,
        json!({"isIncomplete": false, "items": items}),
    ));
}

pub fn handle_references(tc: &LspTypechecker, id: RequestId, params: Value) {
    let Some(gs) = state_or_reply(tc, &id) else {
        return;
    };
    let locations = position_params(&params)
        .and_then(|params| resolve_position(gs, &params))
        .and_then(|pos| word_at(&pos.line, pos.position.character))
        .map(|word| {
            let mut locations = Vec::new();
            for (_, content) in gs.files() {
                let uri = uri_from_path(content.path());
                for (line_no, line) in content.source().lines().enumerate() {
                    for start in word_occurrences(line, &word) {
                        locations.push(json!({
                            "uri": uri,
                            "range": line_range(
                                line_no as u32,
                                start,
                                start + word.chars().count() as u32,
                            ),
                        }));
                    }
                }
            }
            locations
        })
        .unwrap_or_default();
    tc.output().write(response(&id, json!(locations)));
}

pub fn handle_document_highlight(tc: &LspTypechecker, id: RequestId, params: Value) {
    let Some(gs) = state_or_reply(tc, &id) else {
        return;
    };
    let highlights = position_params(&params)
        .and_then(|params| resolve_position(gs, &params))
        .and_then(|pos| {
            let word = word_at(&pos.line, pos.position.character)?;
            let content = gs.file(pos.file);
            let mut highlights = Vec::new();
            for (line_no, line) in content.source().lines().enumerate() {
                for start in word_occurrences(line, &word) {
                    highlights.push(json!({
                        "range": line_range(
                            line_no as u32,
                            start,
                            start + word.chars().count() as u32,
                        ),
                        "kind": 1,
                    }));
                }
            }
            Some(highlights)
        })
        .unwrap_or_default();
    tc.output().write(response(&id, json!(highlights)));
}

pub fn handle_document_symbol(tc: &LspTypechecker, id: RequestId, params: Value) {
    let Some(gs) = state_or_reply(tc, &id) else {
        return;
    };
    let symbols = serde_json::from_value::<DocumentParams>(params)
        .ok()
        .and_then(|params| path_from_uri(&params.text_document.uri))
        .and_then(|path| gs.find_file_by_path(&path))
        .map(|file| symbol_information(gs, |symbol| symbol.loc.map(|l| l.file) == Some(file)))
        .unwrap_or_default();
    tc.output().write(response(&id, json!(symbols)));
}

pub fn handle_workspace_symbol(tc: &LspTypechecker, id: RequestId, params: Value) {
    let Some(gs) = state_or_reply(tc, &id) else {
        return;
    };
    let query = serde_json::from_value::<WorkspaceSymbolParams>(params)
        .map(|params| params.query.to_lowercase())
        .unwrap_or_default();
    let symbols = symbol_information(gs, |symbol| {
        symbol.loc.is_some() && gs.name_str(symbol.name).to_lowercase().contains(&query)
    });
    tc.output().write(response(&id, json!(symbols)));
}

fn symbol_information(gs: &GlobalState, mut keep: impl FnMut(&Symbol) -> bool) -> Vec<Value> {
    let mut out = Vec::new();
    for (_, symbol) in gs.symbols() {
        if !keep(symbol) {
            continue;
        }
        let Some(location) = symbol_location(gs, symbol) else {
            continue;
        };
        let kind = match symbol.kind {
            SymbolKind::Class => 5,
            SymbolKind::Method => 6,
        };
        out.push(json!({
            "name": gs.name_str(symbol.name),
            "kind": kind,
            "location": location,
            "containerName": gs.name_str(gs.symbol(symbol.owner).name),
        }));
    }
    out
}

pub fn handle_signature_help(tc: &LspTypechecker, id: RequestId, params: Value) {
    let Some(gs) = state_or_reply(tc, &id) else {
        return;
    };
    let help = position_params(&params)
        .and_then(|params| resolve_position(gs, &params))
        .and_then(|pos| {
            let upto: String = pos
                .line
                .chars()
                .take(pos.position.character as usize)
                .collect();
            let open = upto.rfind('(')?;
            let callee = word_at(&upto, open.saturating_sub(1) as u32)?;
            let (_, symbol) = find_symbol_by_name(gs, &callee)?;
            let active_parameter = upto[open..].matches(',').count();
            let label = match &symbol.sig {
                Some(sig) => format!("{callee} sig {sig}"),
                None => format!("{callee} (arity {})", symbol.arity),
            };
            Some(json!({
                "signatures": [{"label": label, "parameters": []}],
                "activeSignature": 0,
                "activeParameter": active_parameter,
            }))
        })
        .unwrap_or(Value::Null);
    tc.output().write(response(&id, help));
}

pub fn handle_code_action(tc: &LspTypechecker, id: RequestId, params: Value) {
    let Some(gs) = state_or_reply(tc, &id) else {
        return;
    };
    let actions = serde_json::from_value::<DocumentParams>(params)
        .ok()
        .and_then(|params| {
            let path = path_from_uri(&params.text_document.uri)?;
            let file = gs.find_file_by_path(&path)?;
            let missing_end = gs
                .diagnostics(file)
                .iter()
                .any(|diag| diag.message.contains("expected `end`"));
            if !missing_end {
                return Some(Vec::new());
            }
            let content = gs.file(file);
            let last_line = content.source().lines().count() as u32;
            let mut changes = serde_json::Map::new();
            changes.insert(
                uri_from_path(content.path()),
                json!([{
                    "range": line_range(last_line, 0, 0),
                    "newText": "end\n",
                }]),
            );
            Some(vec![json!({
                "title": "Insert missing `end`",
                "kind": "quickfix",
                "edit": {"changes": changes},
            })])
        })
        .unwrap_or_default();
    tc.output().write(response(&id, json!(actions)));
}

pub fn handle_read_file(tc: &LspTypechecker, id: RequestId, params: Value) {
    let Some(gs) = state_or_reply(tc, &id) else {
        return;
    };
    let Some((uri, file)) = serde_json::from_value::<DocumentId>(params)
        .ok()
        .and_then(|params| {
            let path = path_from_uri(&params.uri)?;
            gs.find_file_by_path(&path).map(|file| (params.uri, file))
        })
    else {
        tc.output().write(error_response(
            &id,
            error_codes::INVALID_PARAMS,
            "did not find file at the given uri",
        ));
        return;
    };
    tc.output().write(response(
        &id,
        json!({
            "uri": uri,
            "languageId": "ruby",
            "version": 0,
            "text": gs.file(file).source(),
        }),
    ));
}

fn position_params(params: &Value) -> Option<PositionParams> {
    serde_json::from_value(params.clone()).ok()
}
