use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use storefront_bulk::config;
use storefront_bulk::host::HttpHost;
use storefront_bulk::model::{ActionKind, JobStatus};
use storefront_bulk::services::JobQueue;

#[derive(Parser, Debug)]
#[command(about = "Show queued or started bulk jobs per action")]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    // Job listing does not depend on the action the client is bound to.
    let host = HttpHost::from_config(&cfg, ActionKind::Sync)?;
    let active = host.list_active_jobs(&JobStatus::ACTIVE).await?;

    for action in ActionKind::all() {
        let job_name = &cfg.actions.get(action).job_name;
        match active.iter().find(|j| &j.job_name == job_name) {
            Some(job) => println!("{:<10} {} ({})", action, job_name, job.status.as_str()),
            None => println!("{:<10} idle", action),
        }
    }
    Ok(())
}
