mod cli;
mod ui;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use jobrelay::state_machine::JobStatus;
use jobrelay::{JobOrchestrator, RelayConfig};
use ui::RunProgress;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = RelayConfig::load(cli.config.as_deref())?;
    let orchestrator = Arc::new(JobOrchestrator::from_config(&config).await?);

    match cli.command {
        Command::Submit {
            target,
            target_type,
        } => {
            let progress = RunProgress::start(&format!("Submitting {target}"));
            let job = orchestrator.submit(target, target_type.into()).await?;
            progress.finish_job(&job);
        }
        Command::Chapters {
            episode_id,
            audio_url,
        } => {
            let progress = RunProgress::start(&format!("Requesting chapters for {episode_id}"));
            let request = orchestrator
                .request_chapters(&episode_id, &audio_url)
                .await?;
            progress.finish_chapters(&request);
        }
        Command::Run => {
            let progress = RunProgress::start("Running pipeline");
            let (tx, rx) = tokio::sync::oneshot::channel();
            orchestrator
                .refresh(move |summary| {
                    let _ = tx.send(summary);
                })
                .await?;
            progress.finish(rx.await?);
        }
        Command::Serve { interval_secs } => {
            let interval = match interval_secs {
                Some(secs) => std::time::Duration::from_secs(secs.max(1)),
                None => config.tick_interval(),
            };
            let handle = orchestrator.start(interval);
            tokio::signal::ctrl_c().await?;
            info!("interrupt received, stopping scheduler");
            orchestrator.stop();
            handle.await?;
        }
        Command::Status { status } => {
            let store = orchestrator.store();
            let jobs = match status {
                Some(status) => {
                    let status: JobStatus = status.into();
                    store.list_by_status(&[status]).await?
                }
                None => store.list_all().await?,
            };
            ui::print_jobs(&jobs);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
