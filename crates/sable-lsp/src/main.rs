use std::env;
use std::io::BufReader;
use std::sync::Arc;

use sable_lsp::{LspLoop, ServerConfig, WriterOutput};
use sable_parse::ScriptParser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        eprintln!(
            "sable-lsp {version}\n\nUsage:\n  sable-lsp [--stdio] [--workspace <path>] [--disable-fast-path]\n",
            version = env!("CARGO_PKG_VERSION")
        );
        return Ok(());
    }

    // Logs go to stderr; stdout carries the protocol.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SABLE_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // `--stdio` is accepted for compatibility with editor launch templates;
    // stdio is the only transport.
    let config = ServerConfig::from_args(&args);
    tracing::info!(
        target = "sable.lsp",
        workspace = %config.workspace_root.display(),
        "starting sable-lsp {}",
        env!("CARGO_PKG_VERSION")
    );

    let output = Arc::new(WriterOutput::new(std::io::stdout()));
    let parser = Arc::new(ScriptParser::new());
    let mut server = LspLoop::new(config, output, parser);
    server.run(BufReader::new(std::io::stdin()))?;
    Ok(())
}
