//! Standalone relay daemon.
//!
//! Runs the WebSocket relay without a debugger attached: viewers connect
//! to the configured port, and DOT payloads piped to stdin (one per line)
//! are broadcast to all of them. Useful for developing viewer pages and
//! for replaying captured graph dumps.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use dotbridge_core::{clean_evaluator_output, logging::init_subscriber};
use dotbridge_relay::{RelayConfig, RelayService, open_viewer};

#[derive(Parser, Debug)]
#[command(name = "dotbridge", about = "WebSocket broadcast relay for graph visualization", version)]
struct Cli {
    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 8001)]
    port: u16,

    /// Viewer page to open in the default browser on startup.
    #[arg(long, value_name = "FILE")]
    open: Option<PathBuf>,

    /// Log level filter (overridden by RUST_LOG).
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber(&cli.log_level);

    let config = RelayConfig {
        host: cli.host,
        port: cli.port,
        viewer_page: cli.open,
        ..RelayConfig::default()
    };
    let viewer_page = config.viewer_page.clone();

    let relay = RelayService::start(config).context("failed to start relay")?;
    info!(addr = %relay.local_addr(), "listening for viewers");

    if let Some(page) = viewer_page {
        open_viewer(&page);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                info!("interrupt received, shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    let Some(payload) = prepare_payload(&line) else {
                        continue;
                    };
                    if let Err(e) = relay.submit(payload) {
                        error!(error = %e, "broadcast rejected");
                        break;
                    }
                }
                Ok(None) => {
                    info!("stdin closed, shutting down");
                    break;
                }
                Err(e) => {
                    error!(error = %e, "stdin read failed");
                    break;
                }
            },
        }
    }

    // `stop` joins the relay thread; keep the async runtime responsive.
    tokio::task::spawn_blocking(move || relay.stop())
        .await
        .context("shutdown task panicked")?;
    Ok(())
}

/// Turn one stdin line into a broadcast payload.
///
/// Lines pasted from a debugger still carry the evaluator's string-literal
/// quoting; that comes off here, and a raw DOT line passes through
/// untouched. Lines that clean down to nothing are skipped.
fn prepare_payload(line: &str) -> Option<String> {
    let payload = clean_evaluator_output(line);
    if payload.is_empty() {
        None
    } else {
        Some(payload)
    }
}
