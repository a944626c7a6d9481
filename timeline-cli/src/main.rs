mod config;
mod transport;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;
use timeline::visualizer::timeline::markers::generate_markers;
use timeline::visualizer::timeline::{ViewportController, ViewportSettings};
use timeline::{
    DataSource, EventSource, FetchStatus, NoPointerCapture, PassSource, ScheduleSource,
    StaticCredential, TimedItem, TimelineHost, TimelineService, ViewRange,
};
use transport::ReqwestTransport;

const SETTLE_POLL: Duration = Duration::from_millis(50);

#[derive(Parser)]
#[command(name = "timeline-cli")]
#[command(about = "Drive the ground-station timeline engine from the terminal")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the gridline markers for a view range
    Markers {
        /// RFC3339 start, e.g. 2025-01-01T00:00:00Z
        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// Viewport width in pixels
        #[arg(long, default_value = "1200")]
        width: f64,
    },
    /// Fetch every source for a view range and print the resulting lanes
    Lanes {
        #[arg(long, short)]
        config: PathBuf,

        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// Overrides server.api_key from the config file
        #[arg(long)]
        api_key: Option<String>,

        #[arg(long, default_value = "1200")]
        width: f64,

        /// Give up if the sources have not settled after this many milliseconds
        #[arg(long, default_value = "15000")]
        timeout: u64,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    // Engine tasks are !Send and are spawned onto the local set.
    let local = tokio::task::LocalSet::new();
    if let Err(e) = local.run_until(run(cli.command)).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Markers { start, end, width } => print_markers(&start, &end, width),
        Commands::Lanes {
            config,
            start,
            end,
            api_key,
            width,
            timeout,
        } => print_lanes(config, &start, &end, api_key, width, timeout).await,
    }
}

fn print_markers(start: &str, end: &str, width: f64) -> Result<()> {
    let range = ViewRange::parse(start, end).context("Invalid view range")?;
    let mut controller = ViewportController::new(ViewportSettings::default(), range);
    controller.set_viewport_width(width);

    let view = controller.view_range();
    println!("View: {view}");
    for marker in generate_markers(view, &controller.mapper(), controller.settings().virtual_space) {
        let x = marker.position - controller.scroll_offset();
        println!(
            "{:>9.1}  {}  {:<6}  {}",
            x,
            if marker.major { "*" } else { " " },
            marker.label,
            marker.time
        );
    }
    Ok(())
}

async fn print_lanes(
    config_path: PathBuf,
    start: &str,
    end: &str,
    api_key: Option<String>,
    width: f64,
    timeout_ms: u64,
) -> Result<()> {
    let mut config = config::load_config(&config_path)?;
    if api_key.is_some() {
        config.server.api_key = api_key;
    }
    let range = ViewRange::parse(start, end).context("Invalid view range")?;

    let server = &config.server;
    let transport: Rc<dyn timeline::HttpTransport> =
        Rc::new(ReqwestTransport::new(&server.base_url, server.api_key.clone()));
    let mut sources: Vec<Rc<dyn DataSource>> = vec![
        Rc::new(ScheduleSource::new(Rc::clone(&transport), &server.schedules_path)),
        Rc::new(PassSource::new(Rc::clone(&transport), &server.predict_path)),
    ];
    if let Some(events_path) = &server.events_path {
        sources.push(Rc::new(EventSource::new(Rc::clone(&transport), events_path)));
    }

    let host = TimelineHost {
        credential: Rc::new(StaticCredential::new(server.api_key.is_some())),
        pointer_capture: Rc::new(RefCell::new(NoPointerCapture)),
        activation: Box::new(|_: &TimedItem| {}),
    };
    let controller = ViewportController::new(ViewportSettings::from(&config.viewport), range);
    let mut service = TimelineService::with_controller(&config, controller, sources, host);
    service.set_viewport_width(width);

    let settled = async {
        loop {
            tokio::time::sleep(SETTLE_POLL).await;
            let started = service
                .statuses()
                .iter()
                .all(|(_, status)| *status != FetchStatus::Idle);
            if started && service.is_settled() {
                break;
            }
        }
    };
    if tokio::time::timeout(Duration::from_millis(timeout_ms), settled)
        .await
        .is_err()
    {
        bail!("Sources did not settle within {timeout_ms}ms");
    }
    // Lets the lane task pick up the last item set.
    tokio::task::yield_now().await;

    println!("View: {}", service.view_range());
    for (source, status) in service.statuses() {
        match status {
            FetchStatus::Failed(message) => log::warn!("{} failed: {message}", source.as_str()),
            FetchStatus::Unauthenticated => log::warn!("{} needs an API key", source.as_str()),
            _ => {}
        }
    }

    let lanes = service.lanes();
    for lane in &lanes.lanes {
        println!();
        println!("{:?} {} ({} items)", lane.kind, lane.label, lane.items.len());
        for item in &lane.items {
            println!(
                "  {} .. {}  {}{}",
                item.start_time(),
                item.end_time(),
                item.label(),
                item.status().map(|status| format!(" [{status}]")).unwrap_or_default()
            );
        }
    }
    Ok(())
}
