//! Membership checks used by every group-scoped authorization decision.
//! Always a fresh query against the store, never cached.

use crate::error::Result;
use crate::store::Store;
use crate::types::Role;

pub fn is_member(store: &dyn Store, user_id: &str, group_id: &str) -> Result<bool> {
    Ok(store.get_group_member(user_id, group_id)?.is_some())
}

/// The user's role within the group, independent of their global role.
pub fn role_in(store: &dyn Store, user_id: &str, group_id: &str) -> Result<Option<Role>> {
    Ok(store.get_group_member(user_id, group_id)?.map(|m| m.role))
}
