//! ceserver-probe: connects to a ceserver, reports what it sees and
//! optionally polls a pointer chain until interrupted.
//!
//! Usage: `ceserver-probe [config.toml]`

use anyhow::{anyhow, Context, Result};
use ceserver_client::config::{load_config, validate_config, Config, LoggingConfig, WatchConfig};
use ceserver_client::memory::{PointerChain, ProcessMemory};
use ceserver_client::process::{find_module_by_name, find_process_by_name, ProcessHandle};
use ceserver_client::protocol::session::Canceller;
use ceserver_client::{enumerate_processes, CeResult, MemoryValue, Session};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = load_config(config_path.as_deref()).context("loading configuration")?;
    validate_config(&config)?;
    init_logging(&config.logging);

    info!("Starting ceserver-probe v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Target: {}:{}",
        config.server.host, config.server.port
    );

    let options = config.connect_options();
    let (session, processes) = tokio::task::spawn_blocking(move || -> CeResult<_> {
        let mut session = Session::connect(options)?;
        let processes = enumerate_processes(&mut session)?;
        Ok((session, processes))
    })
    .await??;

    let report = json!({
        "server": session.server_version(),
        "processes": processes,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    match config.watch.clone() {
        Some(watch) => run_watch(session, &config, watch).await?,
        None => {
            tokio::task::spawn_blocking(move || drop(session)).await?;
        }
    }

    info!("ceserver-probe finished");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// A session plus the opened target, moved in and out of blocking tasks
struct Watcher {
    session: Session,
    process: Option<ProcessHandle>,
    chain: PointerChain,
    watch: WatchConfig,
}

impl Watcher {
    fn open(mut session: Session, watch: WatchConfig) -> Result<Self> {
        let pid = match (watch.pid, &watch.process_name) {
            (Some(pid), _) => pid,
            (None, Some(name)) => find_process_by_name(&mut session, name)?
                .ok_or_else(|| anyhow!("no process matching '{}'", name))?
                .pid,
            (None, None) => return Err(anyhow!("watch target not configured")),
        };

        let mut chain: PointerChain = watch.chain.parse()?;
        if let Some(module) = &watch.module {
            let entry = find_module_by_name(&mut session, pid, module)?
                .ok_or_else(|| anyhow!("module '{}' not loaded in {}", module, pid))?;
            chain = chain.rebased(entry.base_address);
        }

        let process = session
            .open_process(pid)?
            .ok_or_else(|| anyhow!("server could not open process {}", pid))?;
        info!(pid, chain = %chain, "watching");
        Ok(Watcher {
            session,
            process: Some(process),
            chain,
            watch,
        })
    }

    fn sample(&mut self) -> CeResult<Option<MemoryValue>> {
        let Some(process) = &self.process else {
            return Ok(None);
        };
        let mut memory = ProcessMemory::new(&mut self.session, process);
        self.chain
            .read_value(&mut memory, self.watch.final_offset, self.watch.value_type)
    }

    fn finish(mut self) {
        if let Some(process) = self.process.take() {
            if let Err(e) = self.session.close_handle(process) {
                warn!(error = %e, "failed to close watched process");
            }
        }
        self.session.disconnect();
    }
}

async fn run_watch(session: Session, config: &Config, watch: WatchConfig) -> Result<()> {
    let canceller: Canceller = session.canceller()?;
    let interval = Duration::from_millis(watch.interval_ms);
    let mut watcher = tokio::task::spawn_blocking(move || Watcher::open(session, watch)).await??;
    let mut ticker = tokio::time::interval(interval);

    info!(
        "Polling every {} ms from {}:{}. Press Ctrl+C to stop.",
        interval.as_millis(),
        config.server.host,
        config.server.port
    );

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                let sample = tokio::task::spawn_blocking(move || {
                    let value = watcher.sample();
                    (watcher, value)
                });
                let (returned, value) = tokio::select! {
                    joined = sample => joined?,
                    _ = tokio::signal::ctrl_c() => {
                        // unblock the pending read; the task then returns with an error
                        let _ = canceller.cancel();
                        info!("Interrupted during read");
                        return Ok(());
                    }
                };
                watcher = returned;
                match value {
                    Ok(Some(value)) => println!("{}", json!({ "value": value })),
                    Ok(None) => println!("{}", json!({ "value": null })),
                    Err(e) => {
                        error!(error = %e, "watch read failed");
                        break;
                    }
                }
            }
        }
    }

    tokio::task::spawn_blocking(move || watcher.finish()).await?;
    Ok(())
}
