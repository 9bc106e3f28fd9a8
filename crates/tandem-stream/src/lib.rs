//! Client for the hosted chat/video provider.
//!
//! The provider owns message delivery, presence, and call transport; this
//! service only pushes display metadata into it (`upsert_user`) and mints
//! identity tokens for it (`create_token`). Callers decide the failure
//! policy: profile-sync paths log and continue, token issuance surfaces
//! the error.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://chat.stream-io-api.com";

/// Display record mirrored into the provider for every user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatUser {
    pub id: String,
    pub name: String,
    pub image: String,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("token signing failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected request: {status} {message}")]
    Api { status: u16, message: String },
}

/// Narrow contract against the provider. Injected as a trait object so
/// handlers never touch a process-wide client instance and tests can
/// substitute a recording double.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn upsert_user(&self, user: &ChatUser) -> Result<(), ProviderError>;

    /// Identity token the frontend hands to the provider SDK.
    fn create_token(&self, user_id: &str) -> Result<String, ProviderError>;
}

/// Provider user tokens carry only the user id; the provider checks the
/// HS256 signature against the shared API secret.
#[derive(Debug, Serialize, Deserialize)]
struct UserClaims {
    user_id: String,
}

/// Server-to-server calls authenticate with a `server: true` token.
#[derive(Debug, Serialize)]
struct ServerClaims {
    server: bool,
}

pub struct StreamChatClient {
    api_key: String,
    api_secret: String,
    base_url: String,
    http: reqwest::Client,
}

impl StreamChatClient {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, ProviderError> {
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            claims,
            &jsonwebtoken::EncodingKey::from_secret(self.api_secret.as_bytes()),
        )?;
        Ok(token)
    }
}

#[async_trait]
impl ChatProvider for StreamChatClient {
    async fn upsert_user(&self, user: &ChatUser) -> Result<(), ProviderError> {
        let server_token = self.sign(&ServerClaims { server: true })?;

        // Upsert payload is keyed by user id: {"users": {"<id>": {...}}}
        let mut users = serde_json::Map::new();
        users.insert(user.id.clone(), serde_json::json!(user));
        let body = serde_json::json!({ "users": users });

        let response = self
            .http
            .post(format!("{}/users", self.base_url))
            .query(&[("api_key", self.api_key.as_str())])
            .header("Authorization", server_token)
            .header("stream-auth-type", "jwt")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Upserted provider user {}", user.id);
        Ok(())
    }

    fn create_token(&self, user_id: &str) -> Result<String, ProviderError> {
        self.sign(&UserClaims {
            user_id: user_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};

    fn decode_unvalidated(token: &str, secret: &str) -> UserClaims {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        jsonwebtoken::decode::<UserClaims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .unwrap()
        .claims
    }

    #[test]
    fn user_token_carries_user_id() {
        let client = StreamChatClient::new("key", "secret");
        let token = client.create_token("u-42").unwrap();
        assert_eq!(decode_unvalidated(&token, "secret").user_id, "u-42");
    }

    #[test]
    fn user_token_rejects_wrong_secret() {
        let client = StreamChatClient::new("key", "secret");
        let token = client.create_token("u-42").unwrap();

        let mut validation = Validation::default();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        let result = jsonwebtoken::decode::<UserClaims>(
            &token,
            &DecodingKey::from_secret(b"other-secret"),
            &validation,
        );
        assert!(result.is_err());
    }

    #[test]
    fn upsert_body_is_keyed_by_user_id() {
        let user = ChatUser {
            id: "u-42".into(),
            name: "Alice".into(),
            image: "https://example.com/a.png".into(),
        };
        let mut users = serde_json::Map::new();
        users.insert(user.id.clone(), serde_json::json!(user));
        let body = serde_json::json!({ "users": users });
        assert_eq!(body["users"]["u-42"]["name"], "Alice");
    }
}
