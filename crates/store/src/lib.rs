//! Tenant-scoped persistence for the talent pipeline.
//!
//! Each concern is a trait so a transactional database backend can replace
//! the in-memory implementations without touching callers.

pub mod access;
pub mod candidates;
pub mod events;
pub mod health;
pub mod locks;
pub mod queue;
pub mod templates;
pub mod tenants;

use std::sync::Arc;

pub use access::*;
pub use candidates::*;
pub use events::*;
pub use locks::*;
pub use queue::*;
pub use templates::*;
pub use tenants::*;

/// Handles to every store, shared by the API and the workers.
#[derive(Clone)]
pub struct Stores {
    pub tenants: Arc<dyn TenantStore>,
    pub candidates: Arc<dyn CandidateStore>,
    pub queue: Arc<dyn QueueStore>,
    pub events: Arc<dyn EventStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub access_log: Arc<dyn AccessLog>,
    pub locks: Arc<dyn SweepLock>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            tenants: Arc::new(InMemoryTenantStore::new()),
            candidates: Arc::new(InMemoryCandidateStore::new()),
            queue: Arc::new(InMemoryQueueStore::new()),
            events: Arc::new(InMemoryEventStore::new()),
            templates: Arc::new(InMemoryTemplateStore::new()),
            access_log: Arc::new(InMemoryAccessLog::new()),
            locks: Arc::new(InMemorySweepLock::new()),
        }
    }
}
