use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use director::agent::SimulatedConnector;
use director::logging::{self, LogConfig};
use director::{load_config, Director, MemoryCatalog};

#[derive(Parser)]
#[command(name = "director")]
#[command(about = "Backup director job orchestration", long_about = None)]
struct Cli {
    /// Director configuration file (JSON or YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// Jobs to run at startup, by definition name
    #[arg(long = "run")]
    run: Vec<String>,

    /// Exit once the started jobs have finished
    #[arg(long)]
    once: bool,

    #[arg(long)]
    json_logs: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(LogConfig {
        json: cli.json_logs,
        verbose: cli.verbose,
    });

    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;

    // In-memory catalog and simulated agents: no remote daemons are contacted.
    let director = Director::new(
        config,
        Arc::new(MemoryCatalog::new()),
        Arc::new(SimulatedConnector::new()),
    )?;
    director.start().context("Failed to start director")?;

    for name in &cli.run {
        match director.run(name) {
            Ok(id) => log::info!("Started {} as JobId {}", name, id),
            Err(e) => log::error!("Cannot run {}: {}", name, e),
        }
    }

    if cli.once {
        while !director.wait_idle(Duration::from_secs(60)) {
            log::info!("{} job(s) still live", director.list().len());
        }
    } else {
        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        ctrlc::set_handler(move || {
            let _ = tx.try_send(());
        })
        .context("Failed to install signal handler")?;
        log::info!("Director running, press Ctrl-C to stop");
        let _ = rx.recv();
    }

    for summary in director.history() {
        println!("{}\n", summary);
    }
    director.shutdown();
    Ok(())
}
