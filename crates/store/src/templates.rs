//! Benchmark templates.
//!
//! A template version that has produced a completed score is frozen: the
//! only change accepted without a version bump is soft-deactivation.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pipeline_core::{BenchmarkTemplate, Error, Result, TemplateId, TenantId, GENERAL_TEMPLATE_ID};
use tracing::info;

#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Resolve `id` for `tenant`: the tenant's own template, then system
    /// templates, then templates other tenants share publicly.
    async fn get_template(&self, tenant: &TenantId, id: &TemplateId) -> Result<Option<BenchmarkTemplate>>;

    /// Validated create-or-update of a tenant template.
    async fn put_template(
        &self,
        tenant: &TenantId,
        template: BenchmarkTemplate,
        now: DateTime<Utc>,
    ) -> Result<BenchmarkTemplate>;

    /// Active templates owned by `tenant`.
    async fn active_templates(&self, tenant: &TenantId) -> Result<Vec<BenchmarkTemplate>>;

    /// Freeze the template version a completed score was computed with.
    async fn mark_referenced(&self, template: &BenchmarkTemplate) -> Result<()>;
}

type Key = (Option<TenantId>, TemplateId);

#[derive(Debug)]
pub struct InMemoryTemplateStore {
    templates: RwLock<HashMap<Key, BenchmarkTemplate>>,
    referenced: RwLock<HashSet<(Key, u32)>>,
}

impl Default for InMemoryTemplateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTemplateStore {
    /// A store seeded with the system templates.
    pub fn new() -> Self {
        let general = BenchmarkTemplate::general();
        let mut templates = HashMap::new();
        templates.insert((None, general.id.clone()), general);
        Self {
            templates: RwLock::new(templates),
            referenced: RwLock::new(HashSet::new()),
        }
    }
}

/// Whether `next` differs from `current` only in activation state.
fn only_activation_changed(current: &BenchmarkTemplate, next: &BenchmarkTemplate) -> bool {
    let mut normalized = next.clone();
    normalized.is_active = current.is_active;
    normalized.created_at = current.created_at;
    normalized.updated_at = current.updated_at;
    normalized == *current
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn get_template(&self, tenant: &TenantId, id: &TemplateId) -> Result<Option<BenchmarkTemplate>> {
        let templates = self.templates.read();
        if let Some(own) = templates.get(&(Some(tenant.clone()), id.clone())) {
            return Ok(Some(own.clone()));
        }
        if let Some(system) = templates.get(&(None, id.clone())) {
            return Ok(Some(system.clone()));
        }
        let mut shared: Vec<_> = templates
            .values()
            .filter(|t| &t.id == id && t.is_public)
            .collect();
        shared.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        Ok(shared.first().map(|t| (*t).clone()))
    }

    async fn put_template(
        &self,
        tenant: &TenantId,
        mut template: BenchmarkTemplate,
        now: DateTime<Utc>,
    ) -> Result<BenchmarkTemplate> {
        if template.id.as_str() == GENERAL_TEMPLATE_ID {
            return Err(Error::validation("the general template is not editable"));
        }
        if template.tenant_id.as_ref().is_some_and(|owner| owner != tenant) {
            return Err(Error::validation("template owner does not match tenant"));
        }
        template.tenant_id = Some(tenant.clone());
        template.validate_schema()?;

        let key = (Some(tenant.clone()), template.id.clone());
        let mut templates = self.templates.write();

        if let Some(current) = templates.get(&key) {
            if template.version < current.version {
                return Err(Error::validation(format!(
                    "template version {} is older than stored version {}",
                    template.version, current.version
                )));
            }
            let frozen = self.referenced.read().contains(&(key.clone(), current.version));
            if frozen && template.version == current.version && !only_activation_changed(current, &template) {
                return Err(Error::TemplateLocked {
                    template_id: template.id.to_string(),
                });
            }
            template.created_at = current.created_at;
        } else {
            template.created_at = now;
        }
        template.updated_at = now;

        info!(
            tenant_id = %tenant,
            template_id = %template.id,
            version = template.version,
            active = template.is_active,
            "Stored benchmark template"
        );
        templates.insert(key, template.clone());
        Ok(template)
    }

    async fn active_templates(&self, tenant: &TenantId) -> Result<Vec<BenchmarkTemplate>> {
        let mut active: Vec<_> = self
            .templates
            .read()
            .values()
            .filter(|t| t.tenant_id.as_ref() == Some(tenant) && t.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }

    async fn mark_referenced(&self, template: &BenchmarkTemplate) -> Result<()> {
        self.referenced.write().insert((
            (template.tenant_id.clone(), template.id.clone()),
            template.version,
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId::parse("t1").unwrap()
    }

    fn backend_template() -> BenchmarkTemplate {
        let mut template = BenchmarkTemplate::general();
        template.id = TemplateId::parse("backend").unwrap();
        template.name = "Backend".into();
        template.is_public = false;
        template
    }

    #[tokio::test]
    async fn test_general_template_is_always_resolvable() {
        let store = InMemoryTemplateStore::new();
        let general = TemplateId::parse(GENERAL_TEMPLATE_ID).unwrap();
        assert!(store.get_template(&tenant(), &general).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_referenced_template_needs_version_bump() {
        let store = InMemoryTemplateStore::new();
        let now = Utc::now();
        let stored = store.put_template(&tenant(), backend_template(), now).await.unwrap();
        store.mark_referenced(&stored).await.unwrap();

        let mut edited = stored.clone();
        edited.skill_weights[0].weight = 0.5;
        let err = store.put_template(&tenant(), edited.clone(), now).await.unwrap_err();
        assert!(matches!(err, Error::TemplateLocked { .. }));

        edited.version += 1;
        let bumped = store.put_template(&tenant(), edited, now).await.unwrap();
        assert_eq!(bumped.version, 2);
    }

    #[tokio::test]
    async fn test_referenced_template_can_be_deactivated() {
        let store = InMemoryTemplateStore::new();
        let now = Utc::now();
        let stored = store.put_template(&tenant(), backend_template(), now).await.unwrap();
        store.mark_referenced(&stored).await.unwrap();

        let mut deactivated = stored.clone();
        deactivated.is_active = false;
        store.put_template(&tenant(), deactivated, now).await.unwrap();

        assert!(store.active_templates(&tenant()).await.unwrap().is_empty());
        // Still resolvable for existing scores.
        assert!(store
            .get_template(&tenant(), &stored.id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_private_template_is_invisible_to_other_tenants() {
        let store = InMemoryTemplateStore::new();
        let stored = store
            .put_template(&tenant(), backend_template(), Utc::now())
            .await
            .unwrap();

        let other = TenantId::parse("t2").unwrap();
        assert!(store.get_template(&other, &stored.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_template_is_rejected_on_write() {
        let store = InMemoryTemplateStore::new();
        let mut template = backend_template();
        template.skill_weights[0].minimum_level = 9.0;
        assert!(store.put_template(&tenant(), template, Utc::now()).await.is_err());
    }
}
