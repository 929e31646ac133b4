//! # Hoststream
//!
//! Live host metrics for dashboards. A single sampler reads CPU, memory,
//! disk, network and load figures from the local machine and pushes them to
//! every connected browser over Server-Sent Events.
//!
//! ## Modules
//!
//! - [`metrics`]: Sampling the host and turning network counters into rates
//! - [`stream`]: Broadcast hub, per-connection sessions and SSE framing
//! - [`scheduler`]: Sample and heartbeat timers feeding the hub
//! - [`api`]: HTTP server with Axum
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hoststream::api::{serve, AppState};
//! use hoststream::config::Config;
//! use hoststream::metrics::SysinfoSampler;
//! use hoststream::scheduler::Scheduler;
//! use hoststream::stream::Hub;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let cancel = CancellationToken::new();
//!
//!     let (hub, _hub_task) = Hub::spawn(config.stream.hub(), cancel.clone());
//!     let _scheduler = Scheduler::new(SysinfoSampler::new(), hub.clone(), config.stream.schedule())
//!         .start(cancel.clone());
//!
//!     serve(AppState::new(hub), &config.server, cancel).await?;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod metrics;
pub mod scheduler;
pub mod stream;

// Re-export top-level types for convenience
pub use api::{build_router, serve, ApiError, AppState};

pub use config::{Config, ConfigError, LoggingConfig, ServerConfig, StreamConfig};

pub use metrics::{DerivedMetrics, RateComputer, RawSample, SampleError, Sampler, SysinfoSampler};

pub use scheduler::{ScheduleConfig, Scheduler};

pub use stream::{Frame, Hub, HubConfig, HubError, HubHandle, Session};
