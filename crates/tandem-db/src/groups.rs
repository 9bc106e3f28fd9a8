//! Group CRUD and membership authority.
//!
//! Invariants: the admin is a member from creation onward and can never be
//! removed; membership changes are admin-gated except self-removal; invites
//! are restricted to the admin's friends.

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, params};

use crate::friends::{PROFILE_COLUMNS, query_friend_ids, read_profile};
use crate::models::{GroupRow, GroupWithMembers, ProfileRow};
use crate::policy;
use crate::{Database, StoreError, StoreResult};

const GROUP_COLUMNS: &str =
    "id, name, description, avatar, admin_id, channel_id, created_at, updated_at";

/// Partial group-detail update; `None` leaves the stored value untouched.
#[derive(Debug, Default)]
pub struct GroupUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
}

impl Database {
    /// Create a group with `admin_id` as admin and `{admin} ∪ member_ids`
    /// as members. Every supplied member must be a friend of the admin or
    /// the whole request is rejected — no partial group is created.
    pub fn create_group(
        &self,
        id: &str,
        admin_id: &str,
        name: &str,
        description: &str,
        avatar: &str,
        member_ids: &[String],
    ) -> StoreResult<GroupWithMembers> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::invalid("Group name is required"));
        }
        if member_ids.is_empty() {
            return Err(StoreError::invalid("At least one member is required"));
        }

        self.with_conn(|conn| {
            let friends = query_friend_ids(conn, admin_id)?;
            if member_ids.iter().any(|m| !friends.contains(m)) {
                return Err(StoreError::invalid("All members must be your friends"));
            }

            // Channel id in the chat provider is derived from the group id
            // and never reassigned.
            let channel_id = format!("group-{id}");

            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO groups (id, name, description, avatar, admin_id, channel_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, name, description.trim(), avatar, admin_id, channel_id],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                params![id, admin_id],
            )?;
            for member in member_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                    params![id, member],
                )?;
            }
            tx.commit()?;

            load_group_view(conn, id)?
                .ok_or_else(|| StoreError::Internal("group vanished after insert".into()))
        })
    }

    /// A group as seen by one of its members; 403 shape for everyone else.
    pub fn group_for_member(&self, group_id: &str, user_id: &str) -> StoreResult<GroupWithMembers> {
        self.with_conn(|conn| {
            let view = load_group_view(conn, group_id)?
                .ok_or_else(|| StoreError::not_found("Group not found"))?;
            if !view.members.iter().any(|m| m.id == user_id) {
                return Err(StoreError::forbidden("You are not a member of this group"));
            }
            Ok(view)
        })
    }

    /// All groups the user belongs to, most recently updated first.
    pub fn groups_for_user(&self, user_id: &str) -> StoreResult<Vec<GroupWithMembers>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM groups
                 WHERE id IN (SELECT group_id FROM group_members WHERE user_id = ?1)
                 ORDER BY updated_at DESC",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut views = Vec::with_capacity(ids.len());
            for id in ids {
                if let Some(view) = load_group_view(conn, &id)? {
                    views.push(view);
                }
            }
            Ok(views)
        })
    }

    /// Admin-only rename / description / avatar update.
    pub fn update_group(
        &self,
        group_id: &str,
        actor_id: &str,
        update: GroupUpdate,
    ) -> StoreResult<GroupWithMembers> {
        self.with_conn(|conn| {
            let group = query_group(conn, group_id)?
                .ok_or_else(|| StoreError::not_found("Group not found"))?;
            if !policy::can_modify(actor_id, &group) {
                return Err(StoreError::forbidden("Only the admin can update the group"));
            }

            let name = match update.name {
                Some(n) if !n.trim().is_empty() => n.trim().to_string(),
                _ => group.name,
            };
            let description = update
                .description
                .map(|d| d.trim().to_string())
                .unwrap_or(group.description);
            let avatar = match update.avatar {
                Some(a) if !a.is_empty() => a,
                _ => group.avatar,
            };

            conn.execute(
                "UPDATE groups SET name = ?2, description = ?3, avatar = ?4,
                        updated_at = datetime('now')
                 WHERE id = ?1",
                params![group_id, name, description, avatar],
            )?;

            load_group_view(conn, group_id)?
                .ok_or_else(|| StoreError::Internal("group vanished after update".into()))
        })
    }

    /// Admin-only member addition. Ids that are not friends of the admin or
    /// are already members are filtered out; an empty result after
    /// filtering is an error, so the caller learns nothing was added.
    /// Returns the refreshed group and how many members were added.
    pub fn add_members(
        &self,
        group_id: &str,
        actor_id: &str,
        member_ids: &[String],
    ) -> StoreResult<(GroupWithMembers, usize)> {
        if member_ids.is_empty() {
            return Err(StoreError::invalid("Member IDs are required"));
        }

        self.with_conn(|conn| {
            let group = query_group(conn, group_id)?
                .ok_or_else(|| StoreError::not_found("Group not found"))?;
            if !policy::can_modify(actor_id, &group) {
                return Err(StoreError::forbidden("Only the admin can add members"));
            }

            let friends = query_friend_ids(conn, actor_id)?;
            let current = query_member_ids(conn, group_id)?;
            let valid: Vec<&String> = member_ids
                .iter()
                .filter(|m| friends.contains(*m) && !current.contains(*m))
                .collect();

            if valid.is_empty() {
                return Err(StoreError::invalid("No valid members to add"));
            }

            let tx = conn.unchecked_transaction()?;
            for member in &valid {
                tx.execute(
                    "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                    params![group_id, member],
                )?;
            }
            tx.execute(
                "UPDATE groups SET updated_at = datetime('now') WHERE id = ?1",
                [group_id],
            )?;
            tx.commit()?;

            let view = load_group_view(conn, group_id)?
                .ok_or_else(|| StoreError::Internal("group vanished after update".into()))?;
            Ok((view, valid.len()))
        })
    }

    /// Remove a member. Authorized for the admin, or for the member
    /// removing themselves. The admin can never be removed. Returns the
    /// refreshed group and whether this was a self-removal.
    pub fn remove_member(
        &self,
        group_id: &str,
        actor_id: &str,
        member_id: &str,
    ) -> StoreResult<(GroupWithMembers, bool)> {
        self.with_conn(|conn| {
            let group = query_group(conn, group_id)?
                .ok_or_else(|| StoreError::not_found("Group not found"))?;

            if !policy::can_remove_member(actor_id, &group, member_id) {
                return Err(StoreError::forbidden("Not authorized to remove members"));
            }
            if member_id == group.admin_id {
                return Err(StoreError::invalid("Admin cannot be removed from the group"));
            }

            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params![group_id, member_id],
            )?;
            tx.execute(
                "UPDATE groups SET updated_at = datetime('now') WHERE id = ?1",
                [group_id],
            )?;
            tx.commit()?;

            let view = load_group_view(conn, group_id)?
                .ok_or_else(|| StoreError::Internal("group vanished after update".into()))?;
            Ok((view, actor_id == member_id))
        })
    }

    /// Admin-only deletion; members go with the group.
    pub fn delete_group(&self, group_id: &str, actor_id: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            let group = query_group(conn, group_id)?
                .ok_or_else(|| StoreError::not_found("Group not found"))?;
            if !policy::can_modify(actor_id, &group) {
                return Err(StoreError::forbidden("Only the admin can delete the group"));
            }

            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM group_members WHERE group_id = ?1", [group_id])?;
            tx.execute("DELETE FROM groups WHERE id = ?1", [group_id])?;
            tx.commit()?;
            Ok(())
        })
    }
}

fn query_group(conn: &Connection, id: &str) -> StoreResult<Option<GroupRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {GROUP_COLUMNS} FROM groups WHERE id = ?1"))?;
    let row = stmt
        .query_row([id], |row| {
            Ok(GroupRow {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                avatar: row.get(3)?,
                admin_id: row.get(4)?,
                channel_id: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })
        .optional()?;
    Ok(row)
}

fn query_member_ids(conn: &Connection, group_id: &str) -> StoreResult<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT user_id FROM group_members WHERE group_id = ?1")?;
    let ids = stmt
        .query_map([group_id], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(ids)
}

fn query_members(conn: &Connection, group_id: &str) -> StoreResult<Vec<ProfileRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PROFILE_COLUMNS} FROM users
         WHERE id IN (SELECT user_id FROM group_members WHERE group_id = ?1)
         ORDER BY full_name"
    ))?;
    let rows = stmt
        .query_map([group_id], read_profile)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn load_group_view(conn: &Connection, group_id: &str) -> StoreResult<Option<GroupWithMembers>> {
    let Some(group) = query_group(conn, group_id)? else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(&format!(
        "SELECT {PROFILE_COLUMNS} FROM users WHERE id = ?1"
    ))?;
    let admin = stmt
        .query_row([group.admin_id.as_str()], read_profile)
        .optional()?
        .ok_or_else(|| StoreError::Internal(format!("group {} admin missing", group.id)))?;

    let members = query_members(conn, group_id)?;
    Ok(Some(GroupWithMembers { group, admin, members }))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Alice is admin-to-be with friends Bob and Carol; Dave is a stranger.
    fn store() -> Database {
        let db = Database::open_in_memory().unwrap();
        for (id, email, name) in [
            ("u-alice", "alice@example.com", "Alice"),
            ("u-bob", "bob@example.com", "Bob"),
            ("u-carol", "carol@example.com", "Carol"),
            ("u-dave", "dave@example.com", "Dave"),
        ] {
            db.create_user(id, email, name, "hash", "").unwrap();
        }
        for (i, friend) in ["u-bob", "u-carol"].iter().enumerate() {
            let req = db
                .send_friend_request(&format!("fr-{i}"), "u-alice", friend)
                .unwrap();
            db.accept_friend_request(&req.id, friend).unwrap();
        }
        db
    }

    fn member_names(view: &GroupWithMembers) -> BTreeSet<&str> {
        view.members.iter().map(|m| m.id.as_str()).collect()
    }

    #[test]
    fn trip_scenario_members_and_admin() {
        let db = store();
        let view = db
            .create_group(
                "g-trip",
                "u-alice",
                "Trip",
                "",
                "",
                &["u-bob".into(), "u-carol".into()],
            )
            .unwrap();

        assert_eq!(view.group.admin_id, "u-alice");
        assert_eq!(
            member_names(&view),
            BTreeSet::from(["u-alice", "u-bob", "u-carol"])
        );
        assert_eq!(view.group.channel_id, "group-g-trip");
    }

    #[test]
    fn create_rejects_non_friend_without_partial_group() {
        let db = store();
        let err = db
            .create_group(
                "g-trip",
                "u-alice",
                "Trip",
                "",
                "",
                &["u-bob".into(), "u-dave".into()],
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        // Nothing persisted.
        let err = db.group_for_member("g-trip", "u-alice").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn create_rejects_empty_name_and_empty_members() {
        let db = store();
        let err = db
            .create_group("g-1", "u-alice", "   ", "", "", &["u-bob".into()])
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        let err = db.create_group("g-1", "u-alice", "Trip", "", "", &[]).unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn admin_is_member_at_every_observed_state() {
        let db = store();
        let view = db
            .create_group("g-1", "u-alice", "Trip", "", "", &["u-bob".into()])
            .unwrap();
        assert!(member_names(&view).contains("u-alice"));

        let (view, _) = db.add_members("g-1", "u-alice", &["u-carol".into()]).unwrap();
        assert!(member_names(&view).contains("u-alice"));

        let (view, _) = db.remove_member("g-1", "u-alice", "u-bob").unwrap();
        assert!(member_names(&view).contains("u-alice"));
    }

    #[test]
    fn admin_can_never_be_removed() {
        let db = store();
        db.create_group("g-1", "u-alice", "Trip", "", "", &["u-bob".into()]).unwrap();

        // Not even by themselves.
        let err = db.remove_member("g-1", "u-alice", "u-alice").unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        let view = db.group_for_member("g-1", "u-alice").unwrap();
        assert!(member_names(&view).contains("u-alice"));
    }

    #[test]
    fn add_members_filters_and_rejects_empty_result() {
        let db = store();
        db.create_group("g-1", "u-alice", "Trip", "", "", &["u-bob".into()]).unwrap();

        // Already a member and a stranger: nothing valid to add.
        let err = db
            .add_members("g-1", "u-alice", &["u-bob".into()])
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        let err = db
            .add_members("g-1", "u-alice", &["u-dave".into()])
            .unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));

        // Mixed list: only Carol lands, Bob stays single in the set.
        let (view, added) = db
            .add_members("g-1", "u-alice", &["u-bob".into(), "u-carol".into()])
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(view.members.len(), 3);
    }

    #[test]
    fn only_admin_adds_members() {
        let db = store();
        db.create_group("g-1", "u-alice", "Trip", "", "", &["u-bob".into()]).unwrap();
        let err = db
            .add_members("g-1", "u-bob", &["u-carol".into()])
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));
    }

    #[test]
    fn member_may_leave_but_not_evict_others() {
        let db = store();
        db.create_group("g-1", "u-alice", "Trip", "", "", &["u-bob".into(), "u-carol".into()])
            .unwrap();

        let err = db.remove_member("g-1", "u-bob", "u-carol").unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        let (view, self_removal) = db.remove_member("g-1", "u-bob", "u-bob").unwrap();
        assert!(self_removal);
        assert!(!member_names(&view).contains("u-bob"));
    }

    #[test]
    fn non_admin_delete_rejected_group_persists() {
        let db = store();
        db.create_group("g-1", "u-alice", "Trip", "", "", &["u-bob".into()]).unwrap();

        let err = db.delete_group("g-1", "u-bob").unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));
        assert_eq!(db.group_for_member("g-1", "u-bob").unwrap().members.len(), 2);

        db.delete_group("g-1", "u-alice").unwrap();
        let err = db.group_for_member("g-1", "u-alice").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn non_member_cannot_view_group() {
        let db = store();
        db.create_group("g-1", "u-alice", "Trip", "", "", &["u-bob".into()]).unwrap();
        let err = db.group_for_member("g-1", "u-dave").unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));
    }

    #[test]
    fn update_is_admin_gated_and_partial() {
        let db = store();
        db.create_group("g-1", "u-alice", "Trip", "desc", "pic", &["u-bob".into()]).unwrap();

        let err = db
            .update_group("g-1", "u-bob", GroupUpdate::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        let view = db
            .update_group(
                "g-1",
                "u-alice",
                GroupUpdate {
                    name: Some("Road Trip".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(view.group.name, "Road Trip");
        assert_eq!(view.group.description, "desc");
        assert_eq!(view.group.avatar, "pic");
    }

    #[test]
    fn my_groups_lists_memberships() {
        let db = store();
        db.create_group("g-1", "u-alice", "Trip", "", "", &["u-bob".into()]).unwrap();
        db.create_group("g-2", "u-alice", "Study", "", "", &["u-carol".into()]).unwrap();

        assert_eq!(db.groups_for_user("u-alice").unwrap().len(), 2);
        assert_eq!(db.groups_for_user("u-bob").unwrap().len(), 1);
        assert!(db.groups_for_user("u-dave").unwrap().is_empty());
    }
}
