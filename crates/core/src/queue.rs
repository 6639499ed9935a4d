//! Enrichment queue entry and its state machine.
//!
//! `pending -> processing -> {done | pending (retry) | failed}`.
//! Store implementations own atomicity; the transitions themselves live
//! here so every backend applies identical rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ids::{CandidateId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Done,
    Failed,
}

impl QueueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Pending or processing: the candidate is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

/// Caller intent for `enqueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueMode {
    #[default]
    Normal,
    /// Revive a terminally failed entry.
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    Created,
    PriorityRaised,
    Unchanged,
    /// A finished entry went back to pending.
    Requeued,
    /// A failed entry was revived by an explicit reset.
    Reset,
    /// The entry is processing; it goes back to pending when the current run ends.
    RerunScheduled,
}

/// How a failed attempt should be treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Count the attempt and retry until the maximum is reached.
    Retry,
    /// Fail immediately, never retried automatically.
    Terminal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailOutcome {
    RetryScheduled { retry_count: u32, available_at: DateTime<Utc> },
    Failed { retry_count: u32 },
}

/// Exclusive claim handed to the worker that dequeued an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub id: Uuid,
    pub worker_id: String,
    pub acquired_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentQueueEntry {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub candidate_id: CandidateId,
    pub status: QueueStatus,
    /// Higher is sooner.
    pub priority: i32,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Error code of the last failure (e.g. `PRIV_001`).
    pub failure_code: Option<String>,
    pub lease: Option<Lease>,
    pub rerun_requested: bool,
    /// Retries are not dequeued before this instant.
    pub available_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrichmentQueueEntry {
    pub fn new(tenant_id: TenantId, candidate_id: CandidateId, priority: i32, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            candidate_id,
            status: QueueStatus::Pending,
            priority,
            retry_count: 0,
            last_error: None,
            failure_code: None,
            lease: None,
            rerun_requested: false,
            available_at: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `dequeueNext` may pick this entry at `now`.
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Pending && self.available_at <= now
    }

    /// Upsert semantics for a repeated enqueue of the same candidate.
    pub fn apply_enqueue(&mut self, priority: i32, mode: EnqueueMode, now: DateTime<Utc>) -> EnqueueOutcome {
        match self.status {
            QueueStatus::Pending | QueueStatus::Processing => {
                let mut outcome = EnqueueOutcome::Unchanged;
                if priority > self.priority {
                    self.priority = priority;
                    outcome = EnqueueOutcome::PriorityRaised;
                }
                if self.status == QueueStatus::Processing && !self.rerun_requested {
                    self.rerun_requested = true;
                    outcome = EnqueueOutcome::RerunScheduled;
                }
                if outcome != EnqueueOutcome::Unchanged {
                    self.updated_at = now;
                }
                outcome
            }
            QueueStatus::Done => {
                self.reset_to_pending(priority, now);
                EnqueueOutcome::Requeued
            }
            QueueStatus::Failed => match mode {
                EnqueueMode::Normal => EnqueueOutcome::Unchanged,
                EnqueueMode::Reset => {
                    self.reset_to_pending(priority, now);
                    EnqueueOutcome::Reset
                }
            },
        }
    }

    fn reset_to_pending(&mut self, priority: i32, now: DateTime<Utc>) {
        self.status = QueueStatus::Pending;
        self.priority = priority;
        self.retry_count = 0;
        self.last_error = None;
        self.failure_code = None;
        self.lease = None;
        self.rerun_requested = false;
        self.available_at = now;
        self.created_at = now;
        self.updated_at = now;
    }

    /// pending -> processing. Returns the lease the worker must present.
    pub fn begin_processing(&mut self, worker_id: &str, now: DateTime<Utc>) -> Result<Lease> {
        if !self.is_ready(now) {
            return Err(Error::InvalidTransition(format!(
                "entry {} is {:?}, cannot start processing",
                self.id, self.status
            )));
        }
        let lease = Lease {
            id: Uuid::new_v4(),
            worker_id: worker_id.to_string(),
            acquired_at: now,
        };
        self.status = QueueStatus::Processing;
        self.lease = Some(lease.clone());
        self.rerun_requested = false;
        self.updated_at = now;
        Ok(lease)
    }

    fn check_lease(&self, lease_id: Uuid) -> Result<()> {
        match &self.lease {
            Some(lease) if lease.id == lease_id && self.status == QueueStatus::Processing => Ok(()),
            _ => Err(Error::LeaseLost {
                entry_id: self.id.to_string(),
            }),
        }
    }

    /// processing -> done (or back to pending when a rerun was requested).
    pub fn complete(&mut self, lease_id: Uuid, now: DateTime<Utc>) -> Result<QueueStatus> {
        self.check_lease(lease_id)?;
        self.lease = None;
        self.last_error = None;
        self.failure_code = None;
        self.updated_at = now;
        if self.rerun_requested {
            self.rerun_requested = false;
            self.status = QueueStatus::Pending;
            self.available_at = now;
        } else {
            self.status = QueueStatus::Done;
        }
        Ok(self.status)
    }

    /// processing -> pending (retry) or failed.
    ///
    /// The entry turns terminal once `retry_count` reaches `max_retries`.
    pub fn fail(
        &mut self,
        lease_id: Uuid,
        error: &Error,
        disposition: FailureDisposition,
        max_retries: u32,
        retry_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<FailOutcome> {
        self.check_lease(lease_id)?;
        self.lease = None;
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(error.to_string());
        self.failure_code = Some(error.code().to_string());
        self.updated_at = now;

        if disposition == FailureDisposition::Terminal || self.retry_count >= max_retries {
            self.status = QueueStatus::Failed;
            self.rerun_requested = false;
            return Ok(FailOutcome::Failed {
                retry_count: self.retry_count,
            });
        }

        self.status = QueueStatus::Pending;
        self.available_at = retry_at;
        Ok(FailOutcome::RetryScheduled {
            retry_count: self.retry_count,
            available_at: retry_at,
        })
    }

    /// Whether a processing entry's lease is older than `cutoff`.
    pub fn is_stale(&self, cutoff: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Processing
            && self.lease.as_ref().map_or(true, |l| l.acquired_at < cutoff)
    }

    /// Stale processing -> pending. The abandoned attempt does not count as a retry.
    pub fn reclaim(&mut self, now: DateTime<Utc>) {
        self.status = QueueStatus::Pending;
        self.lease = None;
        self.available_at = now;
        self.updated_at = now;
    }
}

/// Counts by status for one tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub processing: usize,
    pub done: usize,
    pub failed: usize,
}

impl QueueStats {
    pub fn record(&mut self, status: QueueStatus) {
        match status {
            QueueStatus::Pending => self.pending += 1,
            QueueStatus::Processing => self.processing += 1,
            QueueStatus::Done => self.done += 1,
            QueueStatus::Failed => self.failed += 1,
        }
    }
}
