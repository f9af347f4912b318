//! Recplay CLI

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use anyhow::Context;
use recplay::config::Config;
use recplay::network::ProxyServer;
use recplay::storage::RecordingReader;
use recplay::RecordingHandler;
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!("Recplay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!();
    eprintln!("Usage: recplay <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  serve [config.toml]       Run the record/playback proxy");
    eprintln!("  inspect <recording.json>  Show entry counts per method and URI");
    process::exit(1);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("recplay=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1) else { usage() };

    match command.as_str() {
        "serve" => serve(args.get(2).map(PathBuf::from)).await,
        "inspect" => {
            let Some(file) = args.get(2) else {
                eprintln!("Usage: recplay inspect <recording.json>");
                process::exit(1);
            };
            inspect(Path::new(file))
        }
        _ => {
            eprintln!("Unknown command: {command}");
            eprintln!("Run 'recplay' for usage information.");
            process::exit(1);
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match config_path {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    let handler = Arc::new(RecordingHandler::new(config).context("building recording handler")?);
    let server = ProxyServer::bind(handler).await.context("binding listener")?;
    server.run().await.context("serving")?;
    Ok(())
}

fn inspect(path: &Path) -> anyhow::Result<()> {
    let reader =
        RecordingReader::open(path).with_context(|| format!("reading {}", path.display()))?;
    let recording = reader.recording();

    let mut counts: BTreeMap<(&str, &str), usize> = BTreeMap::new();
    for entry in &recording.entries {
        *counts
            .entry((entry.request_method.as_str(), entry.request_uri.as_str()))
            .or_default() += 1;
    }

    println!("Recording: {}", path.display());
    println!("Entries:   {}", recording.entries.len());
    println!("Variables: {}", recording.variables.len());
    println!();
    for ((method, uri), count) in counts {
        println!("{count:>5}  {method:<7} {uri}");
    }
    Ok(())
}
