use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use tandem_api::auth::{self, AppState, AppStateInner};
use tandem_api::middleware::require_auth;
use tandem_api::{chat, groups, users};
use tandem_stream::StreamChatClient;

struct Config {
    jwt_secret: String,
    db_path: String,
    host: String,
    port: u16,
    production: bool,
    stream_api_key: String,
    stream_api_secret: String,
}

impl Config {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            jwt_secret: std::env::var("TANDEM_JWT_SECRET")
                .unwrap_or_else(|_| "dev-secret-change-me".into()),
            db_path: std::env::var("TANDEM_DB_PATH").unwrap_or_else(|_| "tandem.db".into()),
            host: std::env::var("TANDEM_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("TANDEM_PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()
                .context("TANDEM_PORT must be a port number")?,
            production: std::env::var("TANDEM_ENV").as_deref() == Ok("production"),
            stream_api_key: std::env::var("STREAM_API_KEY")
                .context("STREAM_API_KEY and STREAM_API_SECRET must be set")?,
            stream_api_secret: std::env::var("STREAM_API_SECRET")
                .context("STREAM_API_KEY and STREAM_API_SECRET must be set")?,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tandem=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = tandem_db::Database::open(&PathBuf::from(&config.db_path))?;

    // Chat/video provider client, injected behind the ChatProvider trait
    let chat = Arc::new(StreamChatClient::new(
        config.stream_api_key.clone(),
        config.stream_api_secret.clone(),
    ));

    let state: AppState = Arc::new(AppStateInner {
        db,
        chat,
        jwt_secret: config.jwt_secret.clone(),
        production: config.production,
    });

    // Routes
    let public_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/onboarding", post(auth::onboarding))
        .route("/api/auth/profile", put(auth::update_profile))
        .route("/api/users", get(users::recommended_users))
        .route("/api/users/friends", get(users::my_friends))
        .route("/api/users/friend-request/{id}", post(users::send_friend_request))
        .route("/api/users/friend-request/{id}/accept", put(users::accept_friend_request))
        .route("/api/users/friend-requests", get(users::friend_requests))
        .route("/api/users/outgoing-friend-requests", get(users::outgoing_friend_requests))
        .route("/api/groups", post(groups::create_group).get(groups::my_groups))
        .route(
            "/api/groups/{id}",
            get(groups::get_group)
                .put(groups::update_group)
                .delete(groups::delete_group),
        )
        .route("/api/groups/{id}/members", post(groups::add_members))
        .route("/api/groups/{id}/members/{member_id}", delete(groups::remove_member))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Tandem server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
