use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::error;
use uuid::Uuid;

use tandem_types::api::{FriendRequestsResponse, OutgoingRequestsResponse};
use tandem_types::models::{FriendRequest, Profile, User};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

/// Language-partner recommendations: onboarded users who are neither the
/// caller nor already their friends.
pub async fn recommended_users(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<User>>, ApiError> {
    let db = state.clone();
    let user_id = current.0.id.to_string();

    // Run blocking DB work off the async runtime
    let rows = tokio::task::spawn_blocking(move || db.db.recommended_users(&user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })??;

    Ok(Json(rows.into_iter().map(|r| r.into_user()).collect()))
}

pub async fn my_friends(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Profile>>, ApiError> {
    let rows = state.db.friends_of(&current.0.id.to_string())?;
    Ok(Json(rows.into_iter().map(|r| r.into_profile()).collect()))
}

pub async fn send_friend_request(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(recipient_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = Uuid::new_v4();
    let row = state.db.send_friend_request(
        &request_id.to_string(),
        &current.0.id.to_string(),
        &recipient_id.to_string(),
    )?;

    Ok(Json(serde_json::json!({
        "message": "Friend request sent",
        "friendRequest": row.into_request(None),
    })))
}

pub async fn accept_friend_request(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(request_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .accept_friend_request(&request_id.to_string(), &current.0.id.to_string())?;

    Ok(Json(serde_json::json!({ "message": "Friend request accepted" })))
}

/// Pending requests addressed to the caller plus their accepted feed —
/// the latter doubles as the "new connection" notification list.
pub async fn friend_requests(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<FriendRequestsResponse>, ApiError> {
    let db = state.clone();
    let user_id = current.0.id.to_string();

    let (incoming, accepted) = tokio::task::spawn_blocking(move || {
        let incoming = db.db.incoming_requests(&user_id)?;
        let accepted = db.db.accepted_requests(&user_id)?;
        Ok::<_, tandem_db::StoreError>((incoming, accepted))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.to_string())
    })??;

    Ok(Json(FriendRequestsResponse {
        incoming_requests: populate(incoming),
        accepted_requests: populate(accepted),
    }))
}

pub async fn outgoing_friend_requests(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<OutgoingRequestsResponse>, ApiError> {
    let rows = state.db.outgoing_requests(&current.0.id.to_string())?;
    Ok(Json(OutgoingRequestsResponse {
        outgoing_requests: populate(rows),
    }))
}

fn populate(
    rows: Vec<(tandem_db::models::FriendRequestRow, tandem_db::models::ProfileRow)>,
) -> Vec<FriendRequest> {
    rows.into_iter()
        .map(|(request, profile)| request.into_request(Some(profile.into_profile())))
        .collect()
}
