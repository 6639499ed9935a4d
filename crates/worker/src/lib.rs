//! Background workers for the talent pipeline.
//!
//! Handles async workflows:
//! - Enrichment (queue -> AI analysis -> scored record)
//! - ATS sync (cursor-based pull of jobs and candidates)
//! - Event correlation (abandoned applications -> retargeting)
//! - Retention (record expiry, audit-log purge)
//! - Notifications (retargeting delivery)

pub mod analyzer;
pub mod correlator;
pub mod enrichment;
pub mod notifications;
pub mod retention;
pub mod scheduler;
pub mod sync;

#[cfg(test)]
mod testing;

pub use analyzer::{AnalysisConfig, AnalysisError, Analyzer, HttpAnalyzer};
pub use correlator::{CorrelatorConfig, EventCorrelator, SweepReport};
pub use enrichment::{enqueue_candidate, EnrichmentWorker, EnrichmentWorkerConfig, Processed, QueueConfig};
pub use notifications::{ChannelNotifier, Notification, NotificationChannel, NotificationsConfig, Notifier};
pub use retention::{RetentionConfig, RetentionReport, RetentionWorker};
pub use scheduler::*;
pub use sync::{SyncConfig, SyncReport, SyncService};
