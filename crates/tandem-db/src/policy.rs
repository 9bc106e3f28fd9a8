//! Group authority checks, shared by every group operation so the rules
//! cannot drift between handlers.

use crate::models::GroupRow;

/// Rename, re-describe, delete, and member-addition authority: admin only.
pub fn can_modify(actor_id: &str, group: &GroupRow) -> bool {
    group.admin_id == actor_id
}

/// Removal authority: the admin may remove anyone, a member may remove
/// themselves ("leave"). Whether the target is removable at all (the admin
/// never is) is a separate invariant checked by the operation.
pub fn can_remove_member(actor_id: &str, group: &GroupRow, target_id: &str) -> bool {
    can_modify(actor_id, group) || actor_id == target_id
}
