//! lochist service - location collector and HTTP API.
//!
//! Run with: `cargo run -p lochist-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use axum::Router;
use chrono::Local;
use clap::{Parser, Subcommand, ValueEnum};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use lochist_core::{
    FileFlagStore, FlagStore, LocationProvider, MockProvider, REQUESTING_FLAG,
    SubscriptionController, update_channel,
};
use lochist_service::{AppState, Collector, Config, ProviderKind, api};
use lochist_store::{LocationQuery, Store, day_bounds};
use lochist_types::SubscriptionState;

/// Batches the delivery channel holds before providers wait.
const DELIVERY_BUFFER: usize = 64;

/// lochist service - location collector and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "lochist-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Print the locations recorded on a local calendar day.
    Day {
        /// The day, as YYYY-MM-DD.
        date: String,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
        format: OutputFormat,
    },

    /// Show record count and the persisted subscription state.
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lochist_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::Day { ref date, format }) => print_day(&config, date, format),
        Some(Command::Status) => print_status(&config),
        Some(Command::Run) | None => run_server(config).await,
    }
}

fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_else(|e| {
            warn!("Ignoring unreadable default config: {}", e);
            Config::default()
        }),
    };

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.path = db_path.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Parse `YYYY-MM-DD` into its numeric parts without range checks.
fn parse_date(date: &str) -> anyhow::Result<(i32, u32, u32)> {
    let mut parts = date.splitn(3, '-');
    let (Some(year), Some(month), Some(day)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("Invalid date '{}': expected YYYY-MM-DD", date);
    };
    let parse_err = || format!("Invalid date '{}': expected YYYY-MM-DD", date);
    Ok((
        year.parse().with_context(parse_err)?,
        month.parse().with_context(parse_err)?,
        day.parse().with_context(parse_err)?,
    ))
}

fn print_day(config: &Config, date: &str, format: OutputFormat) -> anyhow::Result<()> {
    let (year, month, day) = parse_date(date)?;
    let store = Store::open(&config.storage.path)?;

    match format {
        OutputFormat::Json => {
            let records = store.select_day(year, month, day)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Csv => {
            let (from, to) = day_bounds(&Local, year, month, day)?;
            print!("{}", store.export_csv(&LocationQuery::range(from, to))?);
        }
    }
    Ok(())
}

fn print_status(config: &Config) -> anyhow::Result<()> {
    let store = Store::open(&config.storage.path)?;
    let stats = store.stats()?;
    let flags = FileFlagStore::new(&config.subscription.flags_path);
    let state = SubscriptionState::from(flags.get_bool(REQUESTING_FLAG, false)?);

    println!("Database:     {}", config.storage.path.display());
    println!("Records:      {}", stats.count);
    if let (Some(oldest), Some(newest)) = (stats.oldest_millis, stats.newest_millis) {
        println!("Span:         {} .. {} (epoch ms)", oldest, newest);
    }
    println!("Subscription: {}", state);
    Ok(())
}

async fn run_server(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(Store::open(&config.storage.path)?);

    let provider: Arc<dyn LocationProvider> = {
        let mock = MockProvider::new(
            config.provider.origin_latitude,
            config.provider.origin_longitude,
        );
        info!(
            "Location provider: {:?} around {:?}",
            config.provider.kind,
            mock.origin()
        );
        match config.provider.kind {
            ProviderKind::Mock => Arc::new(mock),
            ProviderKind::None => Arc::new(mock.without_emitter()),
        }
    };
    let flags = Arc::new(FileFlagStore::new(&config.subscription.flags_path));
    let (sink, receiver) = update_channel(DELIVERY_BUFFER);
    let controller = SubscriptionController::new(provider, flags, sink.clone());

    let request = config.subscription.request();
    let addr: SocketAddr = config.server.bind.parse()?;
    let state = AppState::new(store, config, controller, sink);

    let collector = Collector::new(Arc::clone(&state), receiver);
    let collector_token = collector.cancellation_token();
    let collector_handle = collector.start();

    restore_subscription(&state, &request).await?;

    let app = Router::new()
        .merge(api::router())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
        )
        .with_state(Arc::clone(&state));

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    collector_token.cancel();
    collector_handle.await?;

    Ok(())
}

/// Re-subscribe after a restart if updates were on when the service stopped.
async fn restore_subscription(
    state: &AppState,
    request: &lochist_types::LocationRequest,
) -> anyhow::Result<()> {
    let mut controller = state.subscription.lock().await;
    if !controller.restore_on_init()?.is_active {
        return Ok(());
    }

    let availability = controller.check_availability(request).await;
    if availability.is_available() {
        controller.start(request).await?;
    } else {
        warn!(
            "Location updates were active but the provider reports {:?}; not resuming",
            availability
        );
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date("2024-05-01").unwrap(), (2024, 5, 1));
        assert_eq!(parse_date("2024-2-30").unwrap(), (2024, 2, 30));
        assert!(parse_date("2024/05/01").is_err());
        assert!(parse_date("2024-05").is_err());
        assert!(parse_date("2024-05-xx").is_err());
    }

    #[test]
    fn test_args_default_to_run() {
        let args = Args::try_parse_from(["lochist-service"]).unwrap();
        assert!(args.command.is_none());

        let args =
            Args::try_parse_from(["lochist-service", "day", "2024-05-01", "--format", "csv"])
                .unwrap();
        assert!(matches!(
            args.command,
            Some(Command::Day { ref date, format: OutputFormat::Csv }) if date == "2024-05-01"
        ));
    }
}
