use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};
use uuid::Uuid;

use tandem_db::groups::GroupUpdate;
use tandem_stream::ChatUser;
use tandem_types::api::{AddMembersRequest, CreateGroupRequest, GroupResponse, UpdateGroupRequest};
use tandem_types::models::Group;

use crate::auth::AppState;
use crate::avatar::random_avatar;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

pub async fn create_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let group_id = Uuid::new_v4();
    let member_ids: Vec<String> = req.member_ids.iter().map(Uuid::to_string).collect();

    let group = state
        .db
        .create_group(
            &group_id.to_string(),
            &current.0.id.to_string(),
            &req.name,
            req.description.as_deref().unwrap_or(""),
            &random_avatar(),
            &member_ids,
        )?
        .into_group();

    sync_group_members(&state, &group).await;

    Ok((
        StatusCode::CREATED,
        Json(GroupResponse {
            success: true,
            message: "Group created successfully".to_string(),
            group,
        }),
    ))
}

pub async fn my_groups(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<Group>>, ApiError> {
    let db = state.clone();
    let user_id = current.0.id.to_string();

    // Run blocking DB work off the async runtime
    let views = tokio::task::spawn_blocking(move || db.db.groups_for_user(&user_id))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })??;

    Ok(Json(views.into_iter().map(|v| v.into_group()).collect()))
}

pub async fn get_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<Group>, ApiError> {
    let view = state
        .db
        .group_for_member(&group_id.to_string(), &current.0.id.to_string())?;
    Ok(Json(view.into_group()))
}

pub async fn update_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<UpdateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let group = state
        .db
        .update_group(
            &group_id.to_string(),
            &current.0.id.to_string(),
            GroupUpdate {
                name: req.name,
                description: req.description,
                avatar: req.avatar,
            },
        )?
        .into_group();

    sync_group_members(&state, &group).await;

    Ok(Json(GroupResponse {
        success: true,
        message: "Group updated successfully".to_string(),
        group,
    }))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .db
        .delete_group(&group_id.to_string(), &current.0.id.to_string())?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Group deleted successfully",
    })))
}

pub async fn add_members(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path(group_id): Path<Uuid>,
    Json(req): Json<AddMembersRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let member_ids: Vec<String> = req.member_ids.iter().map(Uuid::to_string).collect();

    let (view, added) = state.db.add_members(
        &group_id.to_string(),
        &current.0.id.to_string(),
        &member_ids,
    )?;
    let group = view.into_group();

    sync_group_members(&state, &group).await;

    Ok(Json(GroupResponse {
        success: true,
        message: format!("{added} member(s) added successfully"),
        group,
    }))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Path((group_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let (view, self_removal) = state.db.remove_member(
        &group_id.to_string(),
        &current.0.id.to_string(),
        &member_id.to_string(),
    )?;
    let group = view.into_group();

    sync_group_members(&state, &group).await;

    Ok(Json(GroupResponse {
        success: true,
        message: if self_removal {
            "You left the group".to_string()
        } else {
            "Member removed successfully".to_string()
        },
        group,
    }))
}

/// Push the members' display records to the chat provider after any
/// mutation that changed what the group's channel should show. Failures
/// are logged and never fail the parent operation.
async fn sync_group_members(state: &AppState, group: &Group) {
    for member in &group.members {
        let chat_user = ChatUser {
            id: member.id.to_string(),
            name: member.full_name.clone(),
            image: member.profile_pic.clone(),
        };
        if let Err(e) = state.chat.upsert_user(&chat_user).await {
            warn!(
                "Chat provider sync failed for {} in group {}: {}",
                chat_user.id, group.id, e
            );
        }
    }
}
