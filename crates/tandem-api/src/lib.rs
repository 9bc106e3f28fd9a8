pub mod auth;
pub mod avatar;
pub mod chat;
pub mod error;
pub mod groups;
pub mod middleware;
pub mod users;
