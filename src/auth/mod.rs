use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod guard;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod reset;
pub mod session;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/signup", post(handlers::signup))
        .route("/users/login", post(handlers::login))
        .route("/users/logout", get(handlers::logout))
        .route("/users/session", get(handlers::session_status))
        .route("/users/forgot-password", post(handlers::forgot_password))
        .route("/users/reset-password/:token", patch(handlers::reset_password))
        .route("/users/update-my-password", patch(handlers::update_password))
}
