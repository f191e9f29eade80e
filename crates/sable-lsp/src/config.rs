//! Server configuration.

use std::env;
use std::path::PathBuf;

/// Options controlling one server instance.
///
/// Capability toggles mirror what gets reported at `initialize`; the
/// fast-path switch exists so a workspace can force every edit onto the slow
/// path when debugging incrementality issues.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub workspace_root: PathBuf,
    /// File extensions indexed from the workspace.
    pub extensions: Vec<String>,
    pub disable_fast_path: bool,
    pub document_symbol_enabled: bool,
    pub document_highlight_enabled: bool,
    pub signature_help_enabled: bool,
    pub quick_fix_enabled: bool,
    /// Worker threads used for file-level parallel work.
    pub worker_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            workspace_root: PathBuf::from("."),
            extensions: vec!["rb".to_owned()],
            disable_fast_path: false,
            document_symbol_enabled: true,
            document_highlight_enabled: true,
            signature_help_enabled: true,
            quick_fix_enabled: true,
            worker_threads: available.saturating_sub(1).clamp(1, 16),
        }
    }
}

impl ServerConfig {
    /// Builds a config from CLI arguments. Unknown arguments are ignored for
    /// compatibility with editor launch templates.
    pub fn from_args(args: &[String]) -> Self {
        let mut config = Self::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--workspace" => {
                    if let Some(path) = iter.next() {
                        config.workspace_root = PathBuf::from(path);
                    }
                }
                "--disable-fast-path" => config.disable_fast_path = true,
                "--no-document-symbol" => config.document_symbol_enabled = false,
                "--no-document-highlight" => config.document_highlight_enabled = false,
                "--no-signature-help" => config.signature_help_enabled = false,
                "--no-quick-fix" => config.quick_fix_enabled = false,
                _ => {}
            }
        }
        if config.workspace_root == PathBuf::from(".") {
            if let Ok(cwd) = env::current_dir() {
                config.workspace_root = cwd;
            }
        }
        config
    }

    pub fn matches_extension(&self, path: &str) -> bool {
        self.extensions
            .iter()
            .any(|ext| path.ends_with(&format!(".{ext}")))
    }
}
