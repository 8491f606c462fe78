use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use storefront_bulk::channel::PollingProgress;
use storefront_bulk::config;
use storefront_bulk::console::ConsoleOperator;
use storefront_bulk::daterange::DateRange;
use storefront_bulk::host::HttpHost;
use storefront_bulk::mapper::Column;
use storefront_bulk::model::ActionKind;
use storefront_bulk::services::Services;
use storefront_bulk::{GridController, GridOptions, RunOutcome};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "List storefront products and run a bulk action on a selection"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Action family: sync, rename or reconcile
    #[arg(long, default_value = "sync")]
    action: ActionKind,

    /// Created-on lower bound, YYYY-MM-DD
    #[arg(long, default_value = "")]
    from: String,

    /// Created-on upper bound, YYYY-MM-DD
    #[arg(long, default_value = "")]
    to: String,

    /// Pages to skip forward before selecting
    #[arg(long, default_value_t = 0)]
    skip_pages: usize,

    /// Row indices to select, comma-separated
    #[arg(long, value_delimiter = ',')]
    rows: Vec<usize>,

    /// Select every visible row
    #[arg(long, conflicts_with = "rows")]
    all: bool,

    /// Answer every confirmation with yes
    #[arg(long)]
    yes: bool,
}

fn print_grid(grid: &GridController) {
    let view = grid.view();
    let columns = [Column::CreatedOn, Column::Id, Column::Name, Column::Skus, Column::Status, Column::RequiresMerge];
    let header: Vec<&str> = columns.iter().map(Column::title).collect();
    println!("  #  [{}] {}", if view.header_checked { "x" } else { " " }, header.join(" | "));
    for (index, row) in view.rows.iter().enumerate() {
        let cells: Vec<&str> = columns.iter().map(|c| row.row.field(*c)).collect();
        println!("{:>3}  [{}] {}", index, if row.checked { "x" } else { " " }, cells.join(" | "));
    }
    if view.rows.is_empty() {
        println!("No products in range");
    }
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
    let settings = cfg.actions.get(args.action).clone();

    let host = Arc::new(HttpHost::from_config(&cfg, args.action)?);
    let progress = PollingProgress::new(
        host.clone(),
        HashMap::from([(settings.channel.clone(), settings.job_name.clone())]),
        Duration::from_millis(cfg.app.poll_interval_ms),
    );
    let services = Services {
        data: host.clone(),
        merge_check: host.clone(),
        jobs: host.clone(),
        progress: Arc::new(progress),
        navigator: host,
        operator: Arc::new(ConsoleOperator::new(args.yes)),
    };

    let now = Local::now();
    let default_range = DateRange::lookback(now.with_timezone(now.offset()), cfg.app.lookback_years);
    let mut grid = GridController::new(
        args.action,
        settings,
        GridOptions::from(&cfg.app),
        services,
        default_range,
    );

    info!(action = %args.action, "loading products");
    if let Some(sub) = grid.init().await? {
        println!("A {} job is already running; following it", args.action);
        grid.follow_progress(sub).await?;
        println!("{}", grid.log().text());
        return Ok(());
    }

    if !args.from.is_empty() || !args.to.is_empty() {
        grid.search(&args.from, &args.to).await?;
    }
    for _ in 0..args.skip_pages {
        grid.next_page().await?;
    }
    print_grid(&grid);

    if args.all {
        grid.toggle_all(true);
    } else {
        for index in &args.rows {
            match grid.rows().get(*index).map(|r| r.id.clone()) {
                Some(id) => {
                    grid.observe_row_state(*index, &id, true);
                }
                None => warn!(index, "no such row"),
            }
        }
    }

    let bar = grid.view().action_bar;
    if !bar.visible {
        println!("Nothing selected");
        return Ok(());
    }
    println!("{}", bar.label);

    match grid.run_bulk().await? {
        RunOutcome::Finished { dispatch_id, count, merges, end } => {
            info!(%dispatch_id, count, merges, ?end, "bulk run ended");
            println!("{}", grid.log().text());
        }
        RunOutcome::Declined => println!("Cancelled"),
        RunOutcome::NothingSelected => println!("Nothing selected"),
    }
    Ok(())
}
