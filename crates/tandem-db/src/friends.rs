//! Friend-request lifecycle and the symmetric friendship relation.
//!
//! States: `pending` -> `accepted`, accepted is terminal. Requests are
//! never deleted; an accepted request doubles as the recipient's
//! "new connection" notification record.

use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::{FriendRequestRow, ProfileRow};
use crate::users::query_user_by_id;
use crate::{Database, StoreError, StoreResult};

pub(crate) const PROFILE_COLUMNS: &str =
    "id, full_name, profile_pic, native_language, learning_language";

const REQUEST_COLUMNS: &str = "id, sender_id, recipient_id, status, created_at";

impl Database {
    /// The caller's friend set, as ids.
    pub fn friend_ids(&self, user_id: &str) -> StoreResult<BTreeSet<String>> {
        self.with_conn(|conn| query_friend_ids(conn, user_id))
    }

    /// The caller's friends as profile cards.
    pub fn friends_of(&self, user_id: &str) -> StoreResult<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROFILE_COLUMNS} FROM users
                 WHERE id IN (SELECT friend_id FROM friendships WHERE user_id = ?1)
                 ORDER BY full_name"
            ))?;
            let rows = stmt
                .query_map([user_id], read_profile)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Create a pending request from `sender_id` to `recipient_id`.
    ///
    /// Rejected when the sender targets themselves, the recipient does not
    /// exist, the two are already friends, or any request (pending or
    /// accepted) already exists between the pair in either direction.
    pub fn send_friend_request(
        &self,
        id: &str,
        sender_id: &str,
        recipient_id: &str,
    ) -> StoreResult<FriendRequestRow> {
        if sender_id == recipient_id {
            return Err(StoreError::invalid("Cannot send friend request to yourself"));
        }

        self.with_conn(|conn| {
            if query_user_by_id(conn, recipient_id)?.is_none() {
                return Err(StoreError::not_found("User not found"));
            }

            if are_friends(conn, sender_id, recipient_id)? {
                return Err(StoreError::invalid("User is already your friend"));
            }

            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM friend_requests
                     WHERE (sender_id = ?1 AND recipient_id = ?2)
                        OR (sender_id = ?2 AND recipient_id = ?1)",
                    params![sender_id, recipient_id],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Err(StoreError::conflict(
                    "Friend request already exists between you and this user",
                ));
            }

            conn.execute(
                "INSERT INTO friend_requests (id, sender_id, recipient_id, status)
                 VALUES (?1, ?2, ?3, 'pending')",
                params![id, sender_id, recipient_id],
            )?;

            query_request(conn, id)?
                .ok_or_else(|| StoreError::Internal("request vanished after insert".into()))
        })
    }

    /// Accept a pending request. Only the recipient may accept; on success
    /// both friendship orientations are inserted in one transaction, so
    /// symmetry holds at every commit point.
    pub fn accept_friend_request(
        &self,
        request_id: &str,
        acting_user_id: &str,
    ) -> StoreResult<FriendRequestRow> {
        self.with_conn(|conn| {
            let request = query_request(conn, request_id)?
                .ok_or_else(|| StoreError::not_found("Friend request not found"))?;

            if request.recipient_id != acting_user_id {
                return Err(StoreError::forbidden(
                    "You are not authorized to accept this friend request",
                ));
            }

            if request.status == "accepted" {
                return Err(StoreError::invalid("Friend request already accepted"));
            }

            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "UPDATE friend_requests SET status = 'accepted' WHERE id = ?1",
                [request_id],
            )?;
            // INSERT OR IGNORE: set semantics absorb a repeated accept.
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?1, ?2)",
                params![request.sender_id, request.recipient_id],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO friendships (user_id, friend_id) VALUES (?1, ?2)",
                params![request.recipient_id, request.sender_id],
            )?;
            tx.commit()?;

            query_request(conn, request_id)?
                .ok_or_else(|| StoreError::Internal("request vanished after update".into()))
        })
    }

    /// Pending requests addressed to `user_id`, sender profile attached.
    pub fn incoming_requests(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<(FriendRequestRow, ProfileRow)>> {
        self.list_requests(
            "r.recipient_id = ?1 AND r.status = 'pending'",
            "r.sender_id",
            user_id,
        )
    }

    /// Accepted requests addressed to `user_id` — the recipient-scoped
    /// "new connection" feed, recipient profile attached.
    pub fn accepted_requests(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<(FriendRequestRow, ProfileRow)>> {
        self.list_requests(
            "r.recipient_id = ?1 AND r.status = 'accepted'",
            "r.recipient_id",
            user_id,
        )
    }

    /// Pending requests sent by `user_id`, recipient profile attached.
    pub fn outgoing_requests(
        &self,
        user_id: &str,
    ) -> StoreResult<Vec<(FriendRequestRow, ProfileRow)>> {
        self.list_requests(
            "r.sender_id = ?1 AND r.status = 'pending'",
            "r.recipient_id",
            user_id,
        )
    }

    fn list_requests(
        &self,
        filter: &str,
        joined_user: &str,
        user_id: &str,
    ) -> StoreResult<Vec<(FriendRequestRow, ProfileRow)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT r.id, r.sender_id, r.recipient_id, r.status, r.created_at,
                        u.id, u.full_name, u.profile_pic, u.native_language, u.learning_language
                 FROM friend_requests r
                 JOIN users u ON u.id = {joined_user}
                 WHERE {filter}
                 ORDER BY r.created_at DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok((
                        FriendRequestRow {
                            id: row.get(0)?,
                            sender_id: row.get(1)?,
                            recipient_id: row.get(2)?,
                            status: row.get(3)?,
                            created_at: row.get(4)?,
                        },
                        ProfileRow {
                            id: row.get(5)?,
                            full_name: row.get(6)?,
                            profile_pic: row.get(7)?,
                            native_language: row.get(8)?,
                            learning_language: row.get(9)?,
                        },
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_friend_ids(conn: &Connection, user_id: &str) -> StoreResult<BTreeSet<String>> {
    let mut stmt = conn.prepare("SELECT friend_id FROM friendships WHERE user_id = ?1")?;
    let ids = stmt
        .query_map([user_id], |row| row.get::<_, String>(0))?
        .collect::<Result<BTreeSet<_>, _>>()?;
    Ok(ids)
}

pub(crate) fn are_friends(conn: &Connection, a: &str, b: &str) -> StoreResult<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM friendships WHERE user_id = ?1 AND friend_id = ?2",
            params![a, b],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn read_profile(row: &Row) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        id: row.get(0)?,
        full_name: row.get(1)?,
        profile_pic: row.get(2)?,
        native_language: row.get(3)?,
        learning_language: row.get(4)?,
    })
}

fn query_request(conn: &Connection, id: &str) -> StoreResult<Option<FriendRequestRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE id = ?1"
    ))?;
    let row = stmt
        .query_row([id], |row| {
            Ok(FriendRequestRow {
                id: row.get(0)?,
                sender_id: row.get(1)?,
                recipient_id: row.get(2)?,
                status: row.get(3)?,
                created_at: row.get(4)?,
            })
        })
        .optional()?;
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Database {
        let db = Database::open_in_memory().unwrap();
        for (id, email, name) in [
            ("u-alice", "alice@example.com", "Alice"),
            ("u-bob", "bob@example.com", "Bob"),
            ("u-carol", "carol@example.com", "Carol"),
        ] {
            db.create_user(id, email, name, "hash", "").unwrap();
        }
        db
    }

    #[test]
    fn accept_makes_friendship_symmetric() {
        let db = store();
        let req = db.send_friend_request("fr-1", "u-alice", "u-bob").unwrap();
        db.accept_friend_request(&req.id, "u-bob").unwrap();

        assert!(db.friend_ids("u-alice").unwrap().contains("u-bob"));
        assert!(db.friend_ids("u-bob").unwrap().contains("u-alice"));
    }

    #[test]
    fn friends_listing_reflects_acceptance_on_both_sides() {
        let db = store();
        let req = db.send_friend_request("fr-1", "u-alice", "u-bob").unwrap();
        db.accept_friend_request(&req.id, "u-bob").unwrap();

        let alices = db.friends_of("u-alice").unwrap();
        assert!(alices.iter().any(|p| p.id == "u-bob"));
        let bobs = db.friends_of("u-bob").unwrap();
        assert!(bobs.iter().any(|p| p.id == "u-alice"));
    }

    #[test]
    fn self_request_always_fails() {
        let db = store();
        let err = db.send_friend_request("fr-1", "u-alice", "u-alice").unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn reverse_request_rejected_while_pending() {
        let db = store();
        db.send_friend_request("fr-1", "u-alice", "u-bob").unwrap();
        let err = db.send_friend_request("fr-2", "u-bob", "u-alice").unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn duplicate_request_rejected_after_acceptance() {
        let db = store();
        let req = db.send_friend_request("fr-1", "u-alice", "u-bob").unwrap();
        db.accept_friend_request(&req.id, "u-bob").unwrap();

        let err = db.send_friend_request("fr-2", "u-alice", "u-bob").unwrap_err();
        // Already friends wins over the duplicate-request check.
        assert!(matches!(err, StoreError::Invalid(_)));
    }

    #[test]
    fn only_recipient_may_accept() {
        let db = store();
        let req = db.send_friend_request("fr-1", "u-alice", "u-bob").unwrap();

        let err = db.accept_friend_request(&req.id, "u-alice").unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));
        let err = db.accept_friend_request(&req.id, "u-carol").unwrap_err();
        assert!(matches!(err, StoreError::Forbidden(_)));

        // Still pending for Bob.
        let incoming = db.incoming_requests("u-bob").unwrap();
        assert_eq!(incoming.len(), 1);
    }

    #[test]
    fn unknown_request_is_not_found() {
        let db = store();
        let err = db.accept_friend_request("fr-missing", "u-bob").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn unknown_recipient_is_not_found() {
        let db = store();
        let err = db.send_friend_request("fr-1", "u-alice", "u-ghost").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn listings_are_scoped_and_populated() {
        let db = store();
        db.send_friend_request("fr-1", "u-alice", "u-bob").unwrap();
        let req2 = db.send_friend_request("fr-2", "u-carol", "u-bob").unwrap();
        db.accept_friend_request(&req2.id, "u-bob").unwrap();

        let incoming = db.incoming_requests("u-bob").unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].1.id, "u-alice"); // sender populated

        let accepted = db.accepted_requests("u-bob").unwrap();
        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].0.id, "fr-2");

        let outgoing = db.outgoing_requests("u-alice").unwrap();
        assert_eq!(outgoing.len(), 1);
        assert_eq!(outgoing[0].1.id, "u-bob"); // recipient populated

        // Accepted requests are retained, not deleted.
        assert!(db.outgoing_requests("u-carol").unwrap().is_empty());
    }

    #[test]
    fn repeated_accept_is_rejected_but_friendship_intact() {
        let db = store();
        let req = db.send_friend_request("fr-1", "u-alice", "u-bob").unwrap();
        db.accept_friend_request(&req.id, "u-bob").unwrap();

        let err = db.accept_friend_request(&req.id, "u-bob").unwrap_err();
        assert!(matches!(err, StoreError::Invalid(_)));
        assert!(db.friend_ids("u-alice").unwrap().contains("u-bob"));
        assert!(db.friend_ids("u-bob").unwrap().contains("u-alice"));
    }
}
