//! Reelcast - timed media publishing across accounts
//!
//! This library provides the scheduling and execution engine: a durable job
//! queue, a polling scheduler, a per-account session manager guarded by
//! cross-process login locks, and an uploader with bounded retries. The
//! platform itself is reached through the [`platforms::PlatformClient`] trait.

pub mod config;
pub mod error;
pub mod factory;
pub mod lock;
pub mod logging;
pub mod media;
pub mod platforms;
pub mod scheduler;
pub mod scheduling;
pub mod session;
pub mod store;
pub mod types;
pub mod uploader;

// Re-export commonly used types
pub use config::Config;
pub use error::{ReelcastError, Result};
pub use factory::{BatchReport, BatchRequest, JobFactory};
pub use scheduler::{Scheduler, SchedulerSettings, TickReport};
pub use session::{DeviceFingerprint, SessionManager};
pub use store::JobStore;
pub use types::{Job, JobStatus, NewJob, PostType, StoredSecret};
pub use uploader::{UploadOutcome, UploadRequest, UploadSettings, Uploader};
