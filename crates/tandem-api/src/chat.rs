use axum::{Extension, Json, extract::State};

use tandem_types::api::ChatTokenResponse;

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

/// Identity token for the chat/video provider. Unlike the display syncs,
/// a failure here is fatal: without the token the client cannot open a
/// single chat or call.
pub async fn chat_token(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<ChatTokenResponse>, ApiError> {
    let token = state.chat.create_token(&current.0.id.to_string())?;
    Ok(Json(ChatTokenResponse { token }))
}
