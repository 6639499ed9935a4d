//! Append-only event log types.
//!
//! Events are never mutated after append. The one exception is the
//! delivery annotation on derived events, which records the outcome of the
//! notification side effect and only ever moves forward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{Error, Result};
use crate::ids::{CandidateId, JobId, TenantId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    JobCreated,
    JobUpdated,
    CandidateCreated,
    CandidateUpdated,
    ApplyStarted,
    ApplyCompleted,
    RetargetTriggered,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JobCreated => "job_created",
            Self::JobUpdated => "job_updated",
            Self::CandidateCreated => "candidate_created",
            Self::CandidateUpdated => "candidate_updated",
            Self::ApplyStarted => "apply_started",
            Self::ApplyCompleted => "apply_completed",
            Self::RetargetTriggered => "retarget_triggered",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a retargeting notification can be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Per-kind event metadata.
///
/// | schema        | kinds                                   |
/// |---------------|-----------------------------------------|
/// | `job`         | `job_created`, `job_updated`            |
/// | `candidate`   | `candidate_created`, `candidate_updated`|
/// | `application` | `apply_started`, `apply_completed`      |
/// | `retarget`    | `retarget_triggered`                    |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum EventMetadata {
    Job {
        job_id: JobId,
        #[serde(default)]
        title: Option<String>,
    },
    Candidate {
        candidate_id: CandidateId,
        #[serde(default)]
        data_usage_consent: Option<bool>,
    },
    Application {
        job_id: JobId,
        #[serde(default)]
        candidate_id: Option<CandidateId>,
        #[serde(default)]
        contact: Option<Contact>,
    },
    Retarget {
        origin_event_id: Uuid,
        job_id: JobId,
        #[serde(default)]
        contact: Option<Contact>,
    },
}

impl EventMetadata {
    /// Whether this metadata schema belongs to `kind`.
    pub fn fits(&self, kind: EventKind) -> bool {
        matches!(
            (self, kind),
            (Self::Job { .. }, EventKind::JobCreated | EventKind::JobUpdated)
                | (
                    Self::Candidate { .. },
                    EventKind::CandidateCreated | EventKind::CandidateUpdated
                )
                | (
                    Self::Application { .. },
                    EventKind::ApplyStarted | EventKind::ApplyCompleted
                )
                | (Self::Retarget { .. }, EventKind::RetargetTriggered)
        )
    }

    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::Job { job_id, .. } | Self::Application { job_id, .. } | Self::Retarget { job_id, .. } => {
                Some(job_id)
            }
            Self::Candidate { .. } => None,
        }
    }

    pub fn contact(&self) -> Option<&Contact> {
        match self {
            Self::Application { contact, .. } | Self::Retarget { contact, .. } => contact.as_ref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    /// No contact metadata; nothing to send.
    Skipped,
}

/// Outcome of the notification side effect of a derived event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAnnotation {
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_attempt_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl DeliveryAnnotation {
    /// Terminal annotations are never overwritten.
    pub fn is_final(&self, max_attempts: u32) -> bool {
        match self.status {
            DeliveryStatus::Sent | DeliveryStatus::Skipped => true,
            DeliveryStatus::Failed => self.attempts >= max_attempts,
        }
    }

    /// Fold a delivery attempt into an existing annotation.
    pub fn record(previous: Option<&DeliveryAnnotation>, result: std::result::Result<(), String>, now: DateTime<Utc>) -> Self {
        let attempts = previous.map_or(0, |p| p.attempts) + 1;
        match result {
            Ok(()) => Self {
                status: DeliveryStatus::Sent,
                attempts,
                last_attempt_at: now,
                last_error: None,
            },
            Err(error) => Self {
                status: DeliveryStatus::Failed,
                attempts,
                last_attempt_at: now,
                last_error: Some(error),
            },
        }
    }

    pub fn skipped(now: DateTime<Utc>) -> Self {
        Self {
            status: DeliveryStatus::Skipped,
            attempts: 0,
            last_attempt_at: now,
            last_error: None,
        }
    }
}

/// An append-only event row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub tenant_id: TenantId,
    /// Candidate or job id the event is about.
    pub subject_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: EventMetadata,
    #[serde(default)]
    pub delivery: Option<DeliveryAnnotation>,
}

impl Event {
    pub fn new(
        kind: EventKind,
        tenant_id: TenantId,
        subject_id: impl Into<String>,
        session_id: Option<String>,
        timestamp: DateTime<Utc>,
        metadata: EventMetadata,
    ) -> Result<Self> {
        if !metadata.fits(kind) {
            return Err(Error::validation(format!(
                "metadata schema does not match event type {kind}"
            )));
        }
        if let Some(contact) = metadata.contact() {
            contact.validate()?;
        }
        Ok(Self {
            id: Uuid::new_v4(),
            kind,
            tenant_id,
            subject_id: subject_id.into(),
            session_id,
            timestamp,
            metadata,
            delivery: None,
        })
    }

    /// Derive the `retarget_triggered` event for an abandoned `apply_started`.
    pub fn retarget_for(origin: &Event, now: DateTime<Utc>) -> Result<Self> {
        let EventMetadata::Application { job_id, contact, .. } = &origin.metadata else {
            return Err(Error::InvalidTransition(format!(
                "event {} is {}, not an application event",
                origin.id, origin.kind
            )));
        };
        Self::new(
            EventKind::RetargetTriggered,
            origin.tenant_id.clone(),
            origin.subject_id.clone(),
            origin.session_id.clone(),
            now,
            EventMetadata::Retarget {
                origin_event_id: origin.id,
                job_id: job_id.clone(),
                contact: contact.clone(),
            },
        )
    }

    /// Id of the event this one was derived from.
    pub fn origin_event_id(&self) -> Option<Uuid> {
        match &self.metadata {
            EventMetadata::Retarget { origin_event_id, .. } => Some(*origin_event_id),
            _ => None,
        }
    }

    /// Whether `other` is the completion of this started application.
    pub fn is_completed_by(&self, other: &Event) -> bool {
        self.kind == EventKind::ApplyStarted
            && other.kind == EventKind::ApplyCompleted
            && other.tenant_id == self.tenant_id
            && other.timestamp > self.timestamp
            && other.session_id == self.session_id
            && other.metadata.job_id() == self.metadata.job_id()
    }
}
