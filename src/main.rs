//! Ladder Arena Server
//!
//! Reads newline-delimited JSON requests on stdin and writes one JSON
//! response per line on stdout. Logs go to stderr.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ladder_arena::{LadderConfig, LadderRequest, LadderResponse, LadderService, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    info!("Ladder Arena v{}", VERSION);

    let config = LadderConfig::from_env().context("invalid ladder configuration")?;
    info!(
        "Executor: {:?} {:?}, timeout {:?}",
        config.executor_program, config.executor_args, config.contest_timeout
    );
    let service = LadderService::from_config(config).context("failed to start ladder service")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut interrupted = false;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                let response = match LadderRequest::from_json(&line) {
                    Ok(request) => service.handle(request).await,
                    Err(err) => {
                        warn!("Rejected request: {}", err);
                        LadderResponse::error(format!("invalid request: {}", err))
                    }
                };

                let mut out = response.to_json()?;
                out.push('\n');
                stdout.write_all(out.as_bytes()).await?;
                stdout.flush().await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                interrupted = true;
                break;
            }
        }
    }

    // End of input lets queued challengers finish; an interrupt only waits for the current run.
    if !interrupted {
        info!("Input closed, draining queue");
        service.wait_idle().await;
    }
    service.shutdown().await;
    Ok(())
}
