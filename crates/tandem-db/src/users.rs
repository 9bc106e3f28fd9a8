use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::models::UserRow;
use crate::{Database, StoreError, StoreResult};

const USER_COLUMNS: &str = "id, email, full_name, password, profile_pic, bio, \
     native_language, learning_language, location, is_onboarded, created_at";

/// Partial profile update; `None` leaves the stored value untouched.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub native_language: Option<String>,
    pub learning_language: Option<String>,
    pub location: Option<String>,
    pub profile_pic: Option<String>,
}

impl Database {
    pub fn create_user(
        &self,
        id: &str,
        email: &str,
        full_name: &str,
        password_hash: &str,
        profile_pic: &str,
    ) -> StoreResult<UserRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, full_name, password, profile_pic)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, email, full_name, password_hash, profile_pic],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::conflict("Email already in use")
                }
                other => other.into(),
            })?;

            query_user_by_id(conn, id)?
                .ok_or_else(|| StoreError::Internal("user vanished after insert".into()))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users WHERE email = ?1"
            ))?;
            Ok(stmt.query_row([email], read_user).optional()?)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> StoreResult<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// One-time profile completion. Also flips `is_onboarded`.
    pub fn complete_onboarding(
        &self,
        id: &str,
        full_name: &str,
        bio: &str,
        native_language: &str,
        learning_language: &str,
        location: &str,
    ) -> StoreResult<UserRow> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET full_name = ?2, bio = ?3, native_language = ?4,
                        learning_language = ?5, location = ?6, is_onboarded = 1
                 WHERE id = ?1",
                params![id, full_name, bio, native_language, learning_language, location],
            )?;
            if changed == 0 {
                return Err(StoreError::not_found("User not found"));
            }
            query_user_by_id(conn, id)?
                .ok_or_else(|| StoreError::Internal("user vanished after update".into()))
        })
    }

    pub fn update_profile(&self, id: &str, update: ProfileUpdate) -> StoreResult<UserRow> {
        self.with_conn(|conn| {
            let current = query_user_by_id(conn, id)?
                .ok_or_else(|| StoreError::not_found("User not found"))?;

            let full_name = update.full_name.unwrap_or(current.full_name);
            let bio = update.bio.unwrap_or(current.bio);
            let native_language = update.native_language.unwrap_or(current.native_language);
            let learning_language = update.learning_language.unwrap_or(current.learning_language);
            let location = update.location.unwrap_or(current.location);
            let profile_pic = update.profile_pic.unwrap_or(current.profile_pic);

            conn.execute(
                "UPDATE users SET full_name = ?2, bio = ?3, native_language = ?4,
                        learning_language = ?5, location = ?6, profile_pic = ?7
                 WHERE id = ?1",
                params![id, full_name, bio, native_language, learning_language, location, profile_pic],
            )?;

            query_user_by_id(conn, id)?
                .ok_or_else(|| StoreError::Internal("user vanished after update".into()))
        })
    }

    /// Language-partner recommendations: everyone who is onboarded and is
    /// neither the caller nor already a friend of the caller.
    pub fn recommended_users(&self, user_id: &str) -> StoreResult<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLUMNS} FROM users
                 WHERE id != ?1
                   AND is_onboarded = 1
                   AND id NOT IN (SELECT friend_id FROM friendships WHERE user_id = ?1)
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt
                .query_map([user_id], read_user)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_user_by_id(conn: &Connection, id: &str) -> StoreResult<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"))?;
    Ok(stmt.query_row([id], read_user).optional()?)
}

fn read_user(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        full_name: row.get(2)?,
        password: row.get(3)?,
        profile_pic: row.get(4)?,
        bio: row.get(5)?,
        native_language: row.get(6)?,
        learning_language: row.get(7)?,
        location: row.get(8)?,
        is_onboarded: row.get(9)?,
        created_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_users() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.create_user("u-alice", "alice@example.com", "Alice", "hash", "").unwrap();
        db.create_user("u-bob", "bob@example.com", "Bob", "hash", "").unwrap();
        db
    }

    #[test]
    fn duplicate_email_conflicts() {
        let db = store_with_users();
        let err = db
            .create_user("u-other", "alice@example.com", "Other", "hash", "")
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn onboarding_sets_flag_and_fields() {
        let db = store_with_users();
        let user = db
            .complete_onboarding("u-alice", "Alice A.", "hello", "English", "Spanish", "Lisbon")
            .unwrap();
        assert!(user.is_onboarded);
        assert_eq!(user.learning_language, "Spanish");
    }

    #[test]
    fn recommendations_exclude_self_friends_and_not_onboarded() {
        let db = store_with_users();
        db.create_user("u-carol", "carol@example.com", "Carol", "hash", "").unwrap();

        // Only Bob and Carol are onboarded; Alice befriends Bob.
        db.complete_onboarding("u-bob", "Bob", "", "French", "English", "").unwrap();
        db.complete_onboarding("u-carol", "Carol", "", "German", "English", "").unwrap();
        let req = db.send_friend_request("fr-1", "u-alice", "u-bob").unwrap();
        db.accept_friend_request(&req.id, "u-bob").unwrap();

        let recommended = db.recommended_users("u-alice").unwrap();
        let ids: Vec<&str> = recommended.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["u-carol"]);
    }

    #[test]
    fn partial_profile_update_keeps_other_fields() {
        let db = store_with_users();
        db.complete_onboarding("u-alice", "Alice", "bio", "English", "Spanish", "Lisbon").unwrap();

        let updated = db
            .update_profile(
                "u-alice",
                ProfileUpdate {
                    location: Some("Porto".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.location, "Porto");
        assert_eq!(updated.bio, "bio");
        assert_eq!(updated.native_language, "English");
    }
}
