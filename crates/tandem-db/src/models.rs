//! Database row types — these map directly to SQLite rows.
//! Distinct from the tandem-types API models to keep the DB layer
//! independent; conversions parse the TEXT ids and timestamps.

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use tandem_types::models::{FriendRequest, Group, Profile, RequestStatus, User};

#[derive(Debug)]
pub struct UserRow {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub password: String,
    pub profile_pic: String,
    pub bio: String,
    pub native_language: String,
    pub learning_language: String,
    pub location: String,
    pub is_onboarded: bool,
    pub created_at: String,
}

/// Card-sized projection used by friend lists, request listings, and
/// group member lists.
#[derive(Debug)]
pub struct ProfileRow {
    pub id: String,
    pub full_name: String,
    pub profile_pic: String,
    pub native_language: String,
    pub learning_language: String,
}

#[derive(Debug)]
pub struct FriendRequestRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub status: String,
    pub created_at: String,
}

#[derive(Debug)]
pub struct GroupRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub avatar: String,
    pub admin_id: String,
    pub channel_id: String,
    pub created_at: String,
    pub updated_at: String,
}

/// A group joined with its admin and member profiles — the shape every
/// group endpoint returns.
#[derive(Debug)]
pub struct GroupWithMembers {
    pub group: GroupRow,
    pub admin: ProfileRow,
    pub members: Vec<ProfileRow>,
}

pub(crate) fn parse_id(id: &str, context: &str) -> Uuid {
    id.parse().unwrap_or_else(|e| {
        warn!("Corrupt id '{}' on {}: {}", id, context, e);
        Uuid::default()
    })
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Accept RFC 3339 too, for rows written with explicit timestamps.
pub(crate) fn parse_timestamp(raw: &str, context: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt created_at '{}' on {}: {}", raw, context, e);
            DateTime::default()
        })
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: parse_id(&self.id, "user"),
            full_name: self.full_name,
            email: self.email,
            profile_pic: self.profile_pic,
            bio: self.bio,
            native_language: self.native_language,
            learning_language: self.learning_language,
            location: self.location,
            is_onboarded: self.is_onboarded,
            created_at: parse_timestamp(&self.created_at, "user"),
        }
    }
}

impl ProfileRow {
    pub fn into_profile(self) -> Profile {
        Profile {
            id: parse_id(&self.id, "profile"),
            full_name: self.full_name,
            profile_pic: self.profile_pic,
            native_language: self.native_language,
            learning_language: self.learning_language,
        }
    }
}

impl FriendRequestRow {
    pub fn into_request(self, user: Option<Profile>) -> FriendRequest {
        FriendRequest {
            id: parse_id(&self.id, "friend request"),
            sender: parse_id(&self.sender_id, "friend request sender"),
            recipient: parse_id(&self.recipient_id, "friend request recipient"),
            status: RequestStatus::parse(&self.status).unwrap_or_else(|| {
                warn!("Corrupt status '{}' on friend request {}", self.status, self.id);
                RequestStatus::Pending
            }),
            user,
            created_at: parse_timestamp(&self.created_at, "friend request"),
        }
    }
}

impl GroupWithMembers {
    pub fn into_group(self) -> Group {
        Group {
            id: parse_id(&self.group.id, "group"),
            name: self.group.name,
            description: self.group.description,
            avatar: self.group.avatar,
            admin: self.admin.into_profile(),
            members: self.members.into_iter().map(ProfileRow::into_profile).collect(),
            channel_id: self.group.channel_id,
            created_at: parse_timestamp(&self.group.created_at, "group"),
            updated_at: parse_timestamp(&self.group.updated_at, "group"),
        }
    }
}
