use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FriendRequest, Group, User};

// -- JWT Claims --

/// Session-token claims. Canonical definition lives here so tandem-api's
/// middleware and the auth handlers agree on one shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub user: User,
    pub token: String,
}

/// One-time profile completion. Every field is required; the handler
/// reports the missing ones by name.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OnboardingRequest {
    pub full_name: String,
    pub bio: String,
    pub native_language: String,
    pub learning_language: String,
    pub location: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub native_language: Option<String>,
    pub learning_language: Option<String>,
    pub location: Option<String>,
    pub profile_pic: Option<String>,
}

// -- Friend requests --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequestsResponse {
    pub incoming_requests: Vec<FriendRequest>,
    pub accepted_requests: Vec<FriendRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingRequestsResponse {
    pub outgoing_requests: Vec<FriendRequest>,
}

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateGroupRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddMembersRequest {
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct GroupResponse {
    pub success: bool,
    pub message: String,
    pub group: Group,
}

// -- Chat --

#[derive(Debug, Serialize)]
pub struct ChatTokenResponse {
    pub token: String,
}
