use axum::{
    middleware,
    routing::{delete, get, patch},
    Router,
};

use crate::auth::guard::require_roles;
use crate::state::AppState;
use crate::users::model::Role;

pub mod dto;
pub mod handlers;
pub mod model;
pub mod store;

pub fn router(state: AppState) -> Router<AppState> {
    let admin = Router::new()
        .route("/users", get(handlers::list_users))
        .route(
            "/users/:id",
            get(handlers::get_user)
                .patch(handlers::admin_update_user)
                .delete(handlers::admin_delete_user),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            require_roles(&[Role::Admin]),
        ));

    Router::new()
        .route("/users/me", get(handlers::get_me))
        .route("/users/update-me", patch(handlers::update_me))
        .route("/users/delete-me", delete(handlers::delete_me))
        .merge(admin)
}
