//! Tenants and their ATS connections.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pipeline_core::{AtsConnection, Error, Result, Tenant, TenantId};
use tracing::warn;

#[async_trait]
pub trait TenantStore: Send + Sync {
    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>>;

    async fn put_tenant(&self, tenant: Tenant) -> Result<()>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>>;

    async fn get_connection(&self, id: &TenantId) -> Result<Option<AtsConnection>>;

    async fn put_connection(&self, connection: AtsConnection) -> Result<()>;

    /// Flip the connection-status flag to broken.
    async fn mark_connection_broken(&self, id: &TenantId, reason: &str, now: DateTime<Utc>) -> Result<()>;

    /// Move the sync cursor forward. Never moves it backward.
    async fn advance_sync_cursor(&self, id: &TenantId, cursor: DateTime<Utc>) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryTenantStore {
    tenants: RwLock<HashMap<TenantId, Tenant>>,
    connections: RwLock<HashMap<TenantId, AtsConnection>>,
}

impl InMemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TenantStore for InMemoryTenantStore {
    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>> {
        Ok(self.tenants.read().get(id).cloned())
    }

    async fn put_tenant(&self, tenant: Tenant) -> Result<()> {
        self.tenants.write().insert(tenant.id.clone(), tenant);
        Ok(())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let mut tenants: Vec<_> = self.tenants.read().values().cloned().collect();
        tenants.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(tenants)
    }

    async fn get_connection(&self, id: &TenantId) -> Result<Option<AtsConnection>> {
        Ok(self.connections.read().get(id).cloned())
    }

    async fn put_connection(&self, connection: AtsConnection) -> Result<()> {
        self.connections
            .write()
            .insert(connection.tenant_id.clone(), connection);
        Ok(())
    }

    async fn mark_connection_broken(&self, id: &TenantId, reason: &str, now: DateTime<Utc>) -> Result<()> {
        let mut connections = self.connections.write();
        let connection = connections
            .get_mut(id)
            .ok_or_else(|| Error::not_found("ats_connection", id))?;
        connection.mark_broken(reason, now);
        warn!(tenant_id = %id, reason, "ATS connection marked broken");
        Ok(())
    }

    async fn advance_sync_cursor(&self, id: &TenantId, cursor: DateTime<Utc>) -> Result<()> {
        let mut connections = self.connections.write();
        let connection = connections
            .get_mut(id)
            .ok_or_else(|| Error::not_found("ats_connection", id))?;
        if connection.last_synced_at.map_or(true, |current| cursor > current) {
            connection.last_synced_at = Some(cursor);
        }
        Ok(())
    }
}
