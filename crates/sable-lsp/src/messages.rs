//! The server's internal message model.
//!
//! Raw JSON-RPC messages are canonicalized by the preprocessor into this
//! form before the main loop sees them. Editor text/file notifications all
//! collapse into one [`WorkspaceEditParams`] shape.

use std::sync::Arc;

use sable_core::{Epoch, FileContent};
use serde_json::Value;

/// Method name of the canonical internal edit notification.
pub const WORKSPACE_EDIT_METHOD: &str = "sable/workspaceEdit";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(RequestId::Number),
            Value::String(s) => Some(RequestId::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            RequestId::Number(n) => Value::from(*n),
            RequestId::String(s) => Value::from(s.clone()),
        }
    }
}

/// A canonicalized workspace edit: one or more coalesced editor edits.
#[derive(Debug, Clone)]
pub struct WorkspaceEditParams {
    /// Epoch assigned by the preprocessor; strictly increasing.
    pub epoch: Epoch,
    /// How many original editor edits were merged into this one beyond the
    /// first.
    pub merge_count: u32,
    pub updates: Vec<Arc<FileContent>>,
}

impl WorkspaceEditParams {
    /// Folds `newer` into `self`: union of touched files with the newer
    /// contents winning on path collision.
    pub fn merge(&mut self, newer: WorkspaceEditParams) {
        self.merge_count += newer.merge_count + 1;
        self.epoch = newer.epoch;
        for file in newer.updates {
            match self
                .updates
                .iter()
                .position(|existing| existing.path() == file.path())
            {
                Some(i) => self.updates[i] = file,
                None => self.updates.push(file),
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum LspMessage {
    Request {
        id: RequestId,
        method: String,
        params: Value,
        canceled: bool,
    },
    Notification {
        method: String,
        params: Value,
    },
    WorkspaceEdit(WorkspaceEditParams),
}

/// A queue entry; every message is tagged with the preprocessor's epoch
/// counter at the time it was enqueued.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub epoch: Epoch,
    pub msg: LspMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sable_core::StrictLevel;

    fn edit(epoch: u32, files: &[(&str, &str)]) -> WorkspaceEditParams {
        WorkspaceEditParams {
            epoch: Epoch::new(epoch),
            merge_count: 0,
            updates: files
                .iter()
                .map(|(path, text)| {
                    Arc::new(FileContent::new(*path, *text, StrictLevel::False))
                })
                .collect(),
        }
    }

    #[test]
    fn merging_unions_files_with_newer_winning() {
        let mut older = edit(1, &[("a.rb", "old a"), ("b.rb", "old b")]);
        let newer = edit(2, &[("a.rb", "new a"), ("c.rb", "new c")]);
        older.merge(newer);

        assert_eq!(older.epoch, Epoch::new(2));
        assert_eq!(older.merge_count, 1);
        let paths: Vec<&str> = older.updates.iter().map(|f| f.path()).collect();
        assert_eq!(paths, vec!["a.rb", "b.rb", "c.rb"]);
        assert_eq!(older.updates[0].source(), "new a");
        assert_eq!(older.updates[1].source(), "old b");
    }

    #[test]
    fn merge_counts_accumulate() {
        let mut older = edit(1, &[("a.rb", "1")]);
        older.merge(edit(2, &[("a.rb", "2")]));
        older.merge(edit(3, &[("a.rb", "3")]));
        assert_eq!(older.merge_count, 2);
        assert_eq!(older.updates.len(), 1);
        assert_eq!(older.updates[0].source(), "3");
    }
}
