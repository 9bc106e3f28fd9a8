use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use jsonwebtoken::{DecodingKey, Validation, decode};

use tandem_types::api::Claims;
use tandem_types::models::User;

use crate::auth::AppState;
use crate::error::ApiError;

/// The authenticated user, resolved from the token's subject on every
/// request. Inserted into request extensions by `require_auth`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Stateless auth gate: bearer credential from the `jwt` cookie or the
/// `Authorization` header (cookie wins), signature + expiry check, then
/// subject lookup. No session store.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get("jwt")
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            req.headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_string)
        })
        .ok_or_else(|| ApiError::unauthorized("Unauthorized: No token provided"))?;

    let token_data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::unauthorized("Unauthorized: Invalid token"))?;

    let user = state
        .db
        .get_user_by_id(&token_data.claims.sub.to_string())?
        .ok_or_else(|| ApiError::unauthorized("Unauthorized: User not found"))?
        .into_user();

    req.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(req).await)
}
