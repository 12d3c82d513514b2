use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::store::Store;
use crate::types::{AuditLog, EntityType};

/// Appends an audit entry. Best effort: a failed write is logged and never
/// fails the request it trails.
pub(crate) fn record(
    store: &dyn Store,
    actor: &str,
    entity_type: EntityType,
    entity_id: &str,
    action: &str,
    changes: Value,
) {
    let entry = AuditLog {
        id: Uuid::new_v4().to_string(),
        entity_type,
        entity_id: entity_id.to_string(),
        action: action.to_string(),
        changes,
        user_id: actor.to_string(),
        timestamp: Utc::now(),
    };
    if let Err(e) = store.create_audit_log(&entry) {
        tracing::warn!("Failed to record audit entry: {e}");
    }
}
