use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::warn;
use uuid::Uuid;

use tandem_db::users::ProfileUpdate;
use tandem_stream::{ChatProvider, ChatUser};
use tandem_types::api::{
    AuthResponse, Claims, LoginRequest, OnboardingRequest, SignupRequest, UpdateProfileRequest,
};
use tandem_types::models::User;

use crate::avatar::random_avatar;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: tandem_db::Database,
    pub chat: Arc<dyn ChatProvider>,
    pub jwt_secret: String,
    /// Drives cookie flags: secure + SameSite=None in production (the app
    /// and API live on different origins there), Lax in development.
    pub production: bool,
}

const SESSION_COOKIE: &str = "jwt";
const TOKEN_TTL_DAYS: i64 = 5;

pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.full_name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err(tandem_db::StoreError::invalid("All fields are required").into());
    }
    if req.password.len() < 6 {
        return Err(
            tandem_db::StoreError::invalid("Password must be at least 6 characters").into(),
        );
    }
    if !is_valid_email(&req.email) {
        return Err(tandem_db::StoreError::invalid("Invalid email format").into());
    }

    if state.db.get_user_by_email(req.email.trim())?.is_some() {
        return Err(tandem_db::StoreError::conflict("Email already in use").into());
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let password_hash = argon2
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?
        .to_string();

    let user_id = Uuid::new_v4();
    let profile_pic = random_avatar();

    let user = state
        .db
        .create_user(
            &user_id.to_string(),
            req.email.trim(),
            req.full_name.trim(),
            &password_hash,
            &profile_pic,
        )?
        .into_user();

    // Mirror the new identity into the chat provider; signup does not
    // fail if the provider is down.
    sync_chat_user(&state, &user).await;

    let token = create_token(&state.jwt_secret, user_id)
        .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))?;
    let jar = jar.add(session_cookie(token.clone(), state.production));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            success: true,
            user,
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err(tandem_db::StoreError::invalid("All fields are required").into());
    }

    let row = state
        .db
        .get_user_by_email(req.email.trim())?
        .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

    let parsed_hash = PasswordHash::new(&row.password)
        .map_err(|e| ApiError::Internal(format!("stored hash unreadable: {e}")))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::unauthorized("Invalid email or password"))?;

    let user = row.into_user();
    let token = create_token(&state.jwt_secret, user.id)
        .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))?;
    let jar = jar.add(session_cookie(token.clone(), state.production));

    Ok((
        jar,
        Json(AuthResponse {
            success: true,
            user,
            token,
        }),
    ))
}

/// The token is stateless, so logout just clears the cookie.
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/"));
    (
        jar,
        Json(serde_json::json!({ "success": true, "message": "Logout successful" })),
    )
}

pub async fn me(Extension(current): Extension<CurrentUser>) -> Json<User> {
    Json(current.0)
}

pub async fn onboarding(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<OnboardingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut missing = Vec::new();
    for (field, value) in [
        ("fullName", &req.full_name),
        ("bio", &req.bio),
        ("nativeLanguage", &req.native_language),
        ("learningLanguage", &req.learning_language),
        ("location", &req.location),
    ] {
        if value.trim().is_empty() {
            missing.push(field);
        }
    }
    if !missing.is_empty() {
        return Err(tandem_db::StoreError::invalid(format!(
            "All fields are required: {}",
            missing.join(", ")
        ))
        .into());
    }

    let user = state
        .db
        .complete_onboarding(
            &current.0.id.to_string(),
            req.full_name.trim(),
            req.bio.trim(),
            req.native_language.trim(),
            req.learning_language.trim(),
            req.location.trim(),
        )?
        .into_user();

    sync_chat_user(&state, &user).await;

    Ok(Json(serde_json::json!({ "success": true, "user": user })))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state
        .db
        .update_profile(
            &current.0.id.to_string(),
            ProfileUpdate {
                full_name: req.full_name,
                bio: req.bio,
                native_language: req.native_language,
                learning_language: req.learning_language,
                location: req.location,
                profile_pic: req.profile_pic,
            },
        )?
        .into_user();

    sync_chat_user(&state, &user).await;

    Ok(Json(serde_json::json!({ "success": true, "user": user })))
}

pub fn create_token(secret: &str, user_id: Uuid) -> jsonwebtoken::errors::Result<String> {
    let claims = Claims {
        sub: user_id,
        exp: (chrono::Utc::now() + chrono::Duration::days(TOKEN_TTL_DAYS)).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

fn session_cookie(token: String, production: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(production)
        .same_site(if production {
            SameSite::None
        } else {
            SameSite::Lax
        })
        .max_age(time::Duration::days(TOKEN_TTL_DAYS))
        .build()
}

/// Best-effort display sync into the chat provider; failures are logged
/// and never surfaced to the caller.
pub(crate) async fn sync_chat_user(state: &AppState, user: &User) {
    let chat_user = ChatUser {
        id: user.id.to_string(),
        name: user.full_name.clone(),
        image: user.profile_pic.clone(),
    };
    if let Err(e) = state.chat.upsert_user(&chat_user).await {
        warn!("Chat provider sync failed for {}: {}", chat_user.id, e);
    }
}

/// Mirrors the shape check the frontend applies: one '@', no whitespace,
/// and a dot with characters on both sides in the domain.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || local.chars().any(char::is_whitespace) {
        return false;
    }
    if domain.contains('@') || domain.chars().any(char::is_whitespace) {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((head, tail)) => !head.is_empty() && !tail.is_empty(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("alice@example.com"));
        assert!(is_valid_email("a.b+c@mail.example.org"));

        assert!(!is_valid_email("alice"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("alice@.com"));
        assert!(!is_valid_email("alice@com."));
        assert!(!is_valid_email("al ice@example.com"));
        assert!(!is_valid_email("alice@exa mple.com"));
        assert!(!is_valid_email("alice@ex@ample.com"));
    }

    #[test]
    fn session_token_round_trips() {
        let user_id = Uuid::new_v4();
        let token = create_token("test-secret", user_id).unwrap();

        let decoded = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"test-secret"),
            &Validation::default(),
        )
        .unwrap();
        assert_eq!(decoded.claims.sub, user_id);
    }

    #[test]
    fn session_token_rejects_wrong_secret() {
        let token = create_token("test-secret", Uuid::new_v4()).unwrap();
        let result = decode::<Claims>(
            &token,
            &DecodingKey::from_secret(b"other"),
            &Validation::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn cookie_flags_follow_environment() {
        let dev = session_cookie("tok".into(), false);
        assert_eq!(dev.http_only(), Some(true));
        assert_eq!(dev.secure(), Some(false));
        assert_eq!(dev.same_site(), Some(SameSite::Lax));

        let prod = session_cookie("tok".into(), true);
        assert_eq!(prod.secure(), Some(true));
        assert_eq!(prod.same_site(), Some(SameSite::None));
        assert_eq!(prod.path(), Some("/"));
    }

    #[test]
    fn password_hash_verifies_and_rejects() {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(b"hunter22", &salt)
            .unwrap()
            .to_string();

        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(
            Argon2::default()
                .verify_password(b"hunter22", &parsed)
                .is_ok()
        );
        assert!(
            Argon2::default()
                .verify_password(b"wrong", &parsed)
                .is_err()
        );
    }
}
