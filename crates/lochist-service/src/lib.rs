//! Location ingestion collector and HTTP REST API for lochist.
//!
//! This crate provides a service that:
//! - Subscribes to a location provider and restores that subscription on restart
//! - Ingests delivered batches into the local history database
//! - Exposes a REST API for day histories and subscription control
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Subscription state, record count and ingest stats
//! - `GET /api/days/{year}/{month}/{day}` - One local day of history, newest first
//! - `GET /api/locations/latest` - Most recent fix
//! - `GET /api/subscription` - Subscription state and provider availability
//! - `POST /api/subscription/start` - Start updates (optional JSON overrides)
//! - `POST /api/subscription/stop` - Stop updates
//! - `POST /api/updates` - Ingest a JSON array of fixes directly
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/lochist/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! path = "~/.local/share/lochist/locations.db"
//!
//! [subscription]
//! interval_secs = 300
//! fastest_interval_secs = 60
//! priority = "balanced_power_accuracy"
//! flags_path = "~/.local/share/lochist/flags.toml"
//!
//! [provider]
//! kind = "mock"
//! origin_latitude = 35.0116
//! origin_longitude = 135.768
//! ```

pub mod api;
pub mod collector;
pub mod config;
pub mod ingest;
pub mod state;

pub use collector::Collector;
pub use config::{
    Config, ConfigError, ProviderConfig, ProviderKind, ServerConfig, StorageConfig,
    SubscriptionConfig,
};
pub use ingest::{IngestError, IngestOutcome, ingest};
pub use state::{AppState, IngestSnapshot, IngestStats};
