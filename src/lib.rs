//! healthpulse: file-health monitoring and repair-escalation engine.
//!
//! The engine discovers which tracked files are due for an integrity check,
//! executes bounded-concurrency checks against an external content
//! verification probe, applies a persistent two-phase retry state machine
//! that escalates repeatedly-failing files from verification into repair
//! (a re-fetch request to an external library manager), and exposes
//! single-file on-demand checks and in-flight cancellation to operators.
//!
//! The engine is assembled from explicit collaborators (a [`store::HealthStore`],
//! a [`probe::Prober`], a [`probe::Rescanner`] and a [`probe::Notifier`]), so
//! two engines with disjoint stores can run in one process:
//!
//! ```no_run
//! use std::sync::Arc;
//! use healthpulse::config::HealthConfig;
//! use healthpulse::database::SqliteHealthStore;
//! use healthpulse::worker::HealthWorker;
//! # use healthpulse::error::HealthPulseError;
//! # use healthpulse::probe::{Prober, Rescanner, Notifier, ProbeOutcome};
//! # use healthpulse::registry::InterruptToken;
//! # struct MyProber; impl Prober for MyProber { fn probe(&self, _: &str, _: &InterruptToken) -> Result<ProbeOutcome, HealthPulseError> { Ok(ProbeOutcome::Healthy) } }
//! # struct MyRescanner; impl Rescanner for MyRescanner { fn rescan(&self, _: &str) -> Result<(), HealthPulseError> { Ok(()) } }
//! # struct MyNotifier; impl Notifier for MyNotifier { fn notify(&self, _: &str, _: &ProbeOutcome) -> Result<(), HealthPulseError> { Ok(()) } }
//!
//! # async fn demo() -> Result<(), HealthPulseError> {
//! let config = HealthConfig::load(None)?;
//! let store = Arc::new(SqliteHealthStore::open(None, config.policy())?);
//! let worker = HealthWorker::new(
//!     store,
//!     Arc::new(MyProber),
//!     Arc::new(MyRescanner),
//!     Arc::new(MyNotifier),
//!     config,
//! );
//! worker.start(None)?;
//! worker.add_to_check("/media/movies/x.mkv", None)?;
//! # worker.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod checker;
pub mod config;
pub mod database;
pub mod error;
pub mod probe;
pub mod record;
pub mod registry;
pub mod schedule;
pub mod schema;
pub mod state_machine;
pub mod status;
pub mod store;
pub mod utils;
pub mod worker;

pub use config::{HealthConfig, HealthPolicy};
pub use database::SqliteHealthStore;
pub use error::HealthPulseError;
pub use probe::{Notifier, ProbeOutcome, Prober, Rescanner};
pub use record::FileHealthRecord;
pub use registry::InterruptToken;
pub use status::HealthStatus;
pub use store::HealthStore;
pub use worker::{HealthWorker, WorkerStats, WorkerStatus};
