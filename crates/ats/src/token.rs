//! OAuth token lifecycle per tenant.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use pipeline_core::{AtsConnection, AuthErrorCode, Error, Result, Secret, TenantId, TokenSet};
use pipeline_store::TenantStore;
use serde::Deserialize;
use telemetry::Metrics;
use tracing::{debug, error, info};

use crate::config::AtsConfig;

/// The refresh-token grant.
///
/// Errors: `TransientExternal` when the token endpoint is unavailable,
/// `PermanentExternal` when it rejects the refresh token.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn refresh(&self, tenant: &TenantId, refresh_token: &Secret) -> Result<TokenSet>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Token exchange against the ATS OAuth endpoint.
pub struct HttpTokenExchange {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Secret,
}

impl HttpTokenExchange {
    pub fn new(http: reqwest::Client, config: &AtsConfig) -> Self {
        Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: Secret::new(config.client_secret.clone()),
        }
    }
}

#[async_trait]
impl TokenExchange for HttpTokenExchange {
    async fn refresh(&self, tenant: &TenantId, refresh_token: &Secret) -> Result<TokenSet> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose()),
            ])
            .send()
            .await
            .map_err(|e| Error::transient("ats_oauth", e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(Error::transient("ats_oauth", format!("token endpoint returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::permanent(
                "ats_oauth",
                format!("refresh rejected for tenant {tenant}: {body}"),
                Some(status.as_u16()),
            ));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::permanent("ats_oauth", format!("malformed token response: {e}"), None))?;
        Ok(TokenSet {
            access_token: Secret::new(body.access_token),
            // Providers that don't rotate refresh tokens omit it.
            refresh_token: body.refresh_token.map_or_else(|| refresh_token.clone(), Secret::new),
            expires_at: Utc::now() + Duration::seconds(body.expires_in),
        })
    }
}

/// Hands out valid access tokens, refreshing them at most once at a time per tenant.
pub struct TokenManager {
    tenants: Arc<dyn TenantStore>,
    exchange: Arc<dyn TokenExchange>,
    margin: Duration,
    metrics: Arc<Metrics>,
    flights: Mutex<HashMap<TenantId, Arc<tokio::sync::Mutex<()>>>>,
}

impl TokenManager {
    pub fn new(
        tenants: Arc<dyn TenantStore>,
        exchange: Arc<dyn TokenExchange>,
        margin: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            tenants,
            exchange,
            margin,
            metrics,
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// A token valid for at least the safety margin.
    pub async fn get_access_token(&self, tenant: &TenantId) -> Result<Secret> {
        let connection = self.load(tenant).await?;
        if !connection.tokens.expires_within(Utc::now(), self.margin) {
            return Ok(connection.tokens.access_token);
        }
        self.refresh(tenant, None).await
    }

    /// Replace a token the ATS rejected, unless another caller already did.
    pub async fn refresh_rejected(&self, tenant: &TenantId, rejected: &Secret) -> Result<Secret> {
        self.refresh(tenant, Some(rejected)).await
    }

    fn flight(&self, tenant: &TenantId) -> Arc<tokio::sync::Mutex<()>> {
        self.flights
            .lock()
            .entry(tenant.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    async fn load(&self, tenant: &TenantId) -> Result<AtsConnection> {
        let connection = self.tenants.get_connection(tenant).await?.ok_or_else(|| {
            Error::auth(
                AuthErrorCode::MissingCredentials,
                format!("tenant {tenant} has no ATS connection"),
            )
        })?;
        if !connection.status.is_connected() {
            return Err(Error::auth(
                AuthErrorCode::TenantDisconnected,
                format!("ATS connection for tenant {tenant} is broken; re-authorization required"),
            ));
        }
        Ok(connection)
    }

    async fn refresh(&self, tenant: &TenantId, rejected: Option<&Secret>) -> Result<Secret> {
        let flight = self.flight(tenant);
        let _guard = flight.lock().await;

        // Another caller may have refreshed while this one waited.
        let mut connection = self.load(tenant).await?;
        let now = Utc::now();
        let needed = match rejected {
            Some(rejected) => &connection.tokens.access_token == rejected,
            None => connection.tokens.expires_within(now, self.margin),
        };
        if !needed {
            debug!(tenant_id = %tenant, "Token already refreshed by a concurrent caller");
            return Ok(connection.tokens.access_token);
        }

        self.metrics.token_refreshes.inc();
        match self.exchange.refresh(tenant, &connection.tokens.refresh_token).await {
            Ok(tokens) => {
                let access = tokens.access_token.clone();
                connection.refresh(tokens, now);
                self.tenants.put_connection(connection).await?;
                info!(tenant_id = %tenant, "Refreshed ATS access token");
                Ok(access)
            }
            Err(e) if e.is_transient() => Err(e),
            Err(e) => {
                self.metrics.token_refresh_failures.inc();
                error!(tenant_id = %tenant, error = %e, "Token refresh rejected, disconnecting tenant");
                self.tenants.mark_connection_broken(tenant, &e.to_string(), now).await?;
                Err(Error::auth(
                    AuthErrorCode::TenantDisconnected,
                    format!("token refresh failed for tenant {tenant}"),
                ))
            }
        }
    }
}
