mod cli;
mod config;
mod connectors;
mod dispatcher;
mod error;
mod job;
mod server;
mod status;
mod ui;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, RpArg};
use config::SestermConfig;
use connectors::ConnectorRegistry;
use dispatcher::Dispatcher;
use job::{JobStore, RelyingParty, convergence};

// The web client refreshed status twice a second; the CLI does the same.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = SestermConfig::load(Path::new(&cli.config))?;

    match cli.command {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind_addr = bind;
            }
            server::serve(config).await
        }
        Command::Terminate { usernames, rps } => run_terminate(config, usernames, rps).await,
        Command::Targets => {
            list_targets(&config);
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "sesterm=debug,tower_http=debug"
    } else {
        "sesterm=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();
}

/// One-shot mode: submit a job against the in-process engine and poll it
/// to convergence, rendering progress in the terminal.
async fn run_terminate(
    config: SestermConfig,
    usernames: Vec<String>,
    rps: Vec<RpArg>,
) -> Result<()> {
    let targets: Vec<RelyingParty> = if rps.is_empty() {
        RelyingParty::ALL.to_vec()
    } else {
        rps.into_iter().map(Into::into).collect()
    };

    let store = Arc::new(JobStore::new());
    let registry = Arc::new(ConnectorRegistry::from_config(&config));
    let dispatcher = Dispatcher::new(
        Arc::clone(&store),
        registry,
        Duration::from_secs(config.dispatcher.connector_timeout_secs),
    );

    let job_id = dispatcher.submit(usernames, targets).await?;
    let progress = ui::PollProgress::start(&job_id);

    let job = loop {
        let job = store.snapshot(&job_id).await?;
        progress.update(&job);
        if convergence::is_converged(&job) {
            break job;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    };

    progress.finish();
    ui::render_results(&job);
    Ok(())
}

fn list_targets(config: &SestermConfig) {
    let registry = ConnectorRegistry::from_config(config);
    for rp in RelyingParty::ALL {
        let status = if registry.is_implemented(rp) {
            "configured"
        } else {
            "not implemented"
        };
        println!("{:<8} {status}", rp.as_str());
    }
}
