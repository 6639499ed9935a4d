//! Store health checks.

use tracing::{debug, error};

use crate::Stores;

/// Round-trip a cheap read through the store.
pub async fn check_connection(stores: &Stores) -> bool {
    match stores.tenants.list_tenants().await {
        Ok(_) => {
            debug!("Store connection healthy");
            true
        }
        Err(e) => {
            error!("Store health check failed: {}", e);
            false
        }
    }
}
