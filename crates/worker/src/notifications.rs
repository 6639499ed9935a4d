//! Outbound notifications for retargeting.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use pipeline_core::{Error, Event, EventMetadata, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const SERVICE: &str = "notifications";

/// A message for the notification service. The wording lives there; this
/// side only picks the template and fills its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub destination: String,
    pub template: String,
    pub params: BTreeMap<String, String>,
}

impl Notification {
    /// The retargeting message for a derived event, if it carries contact metadata.
    pub fn retarget(event: &Event, template: &str) -> Option<Self> {
        let EventMetadata::Retarget {
            origin_event_id,
            job_id,
            contact: Some(contact),
        } = &event.metadata
        else {
            return None;
        };

        let mut params = BTreeMap::new();
        params.insert("tenantId".to_string(), event.tenant_id.to_string());
        params.insert("jobId".to_string(), job_id.to_string());
        params.insert("originEventId".to_string(), origin_event_id.to_string());
        if let Some(name) = &contact.name {
            params.insert("name".to_string(), name.clone());
        }
        Some(Self {
            destination: contact.email.clone(),
            template: template.to_string(),
            params,
        })
    }
}

/// Notification channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationChannel {
    /// Log only (default)
    Log,
    /// POST the notification as JSON
    Webhook { url: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub channels: Vec<NotificationChannel>,
    /// Per-delivery timeout (ms)
    pub timeout_ms: u64,
    /// Template name used for abandoned applications
    pub retarget_template: String,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            channels: vec![NotificationChannel::Log],
            timeout_ms: 10_000,
            retarget_template: "application_reminder".to_string(),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// `Ok` once the service accepted the message.
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Fans a notification out to every configured channel.
pub struct ChannelNotifier {
    http: reqwest::Client,
    channels: Vec<NotificationChannel>,
    timeout: Duration,
}

impl ChannelNotifier {
    pub fn new(http: reqwest::Client, config: &NotificationsConfig) -> Self {
        Self {
            http,
            channels: config.channels.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    pub fn with_channel(mut self, channel: NotificationChannel) -> Self {
        self.channels.push(channel);
        self
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        for channel in &self.channels {
            match channel {
                NotificationChannel::Log => {
                    info!(
                        template = %notification.template,
                        params = ?notification.params,
                        "Notification"
                    );
                }
                NotificationChannel::Webhook { url } => {
                    let response = self
                        .http
                        .post(url)
                        .timeout(self.timeout)
                        .json(notification)
                        .send()
                        .await
                        .map_err(|e| Error::transient(SERVICE, e.to_string()))?;
                    let status = response.status();
                    if status.as_u16() == 429 || status.is_server_error() {
                        return Err(Error::transient(SERVICE, format!("{url} returned {status}")));
                    }
                    if !status.is_success() {
                        return Err(Error::permanent(
                            SERVICE,
                            format!("{url} rejected notification"),
                            Some(status.as_u16()),
                        ));
                    }
                    debug!(url = %url, "Notification delivered");
                }
            }
        }
        Ok(())
    }
}
