use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user's public profile. The password hash never leaves tandem-db,
/// so this is safe to serialize straight into API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub profile_pic: String,
    pub bio: String,
    pub native_language: String,
    pub learning_language: String,
    pub location: String,
    pub is_onboarded: bool,
    pub created_at: DateTime<Utc>,
}

/// The card-sized projection of a user embedded in friend lists,
/// request listings, and group member lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: Uuid,
    pub full_name: String,
    pub profile_pic: String,
    pub native_language: String,
    pub learning_language: String,
}

/// Friend-request lifecycle. Acceptance is terminal; there is no
/// rejected or cancelled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Accepted,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Accepted => "accepted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RequestStatus::Pending),
            "accepted" => Some(RequestStatus::Accepted),
            _ => None,
        }
    }
}

/// A friend request with one side populated: the sender for incoming
/// listings, the recipient for outgoing and accepted listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: Uuid,
    pub sender: Uuid,
    pub recipient: Uuid,
    pub status: RequestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<Profile>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub avatar: String,
    pub admin: Profile,
    pub members: Vec<Profile>,
    /// Channel identifier in the external chat provider, derived from
    /// the group id at creation and never reassigned.
    pub channel_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
