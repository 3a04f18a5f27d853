use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::{dto::PublicUser, guard::CurrentUser, handlers::is_valid_email},
    error::AppError,
    state::AppState,
    users::dto::{AdminUpdateUserRequest, UpdateMeRequest},
    users::model::AdminUserUpdate,
};

const NO_SUCH_USER: &str = "No user found with that ID";

#[instrument(skip_all)]
pub async fn get_me(CurrentUser(user): CurrentUser) -> Json<PublicUser> {
    Json(user.into())
}

#[instrument(skip(state, payload))]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(mut payload): Json<UpdateMeRequest>,
) -> Result<Json<PublicUser>, AppError> {
    if payload.password.is_some() || payload.password_confirm.is_some() {
        return Err(AppError::Validation(
            "This route is not for password updates. Please use /update-my-password.".into(),
        ));
    }

    if let Some(email) = payload.email.as_mut() {
        *email = email.trim().to_lowercase();
        if !is_valid_email(email) {
            return Err(AppError::Validation("Please provide a valid email".into()));
        }
    }
    if let Some(name) = payload.name.as_mut() {
        *name = name.trim().to_string();
        if name.is_empty() {
            return Err(AppError::Validation("Name cannot be empty".into()));
        }
    }

    let updated = state
        .store
        .update_profile(user.id, payload.name.as_deref(), payload.email.as_deref())
        .await?
        .ok_or_else(|| AppError::NotFound(NO_SUCH_USER.into()))?;

    info!(user_id = %updated.id, "profile updated");
    Ok(Json(updated.into()))
}

#[instrument(skip_all)]
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<StatusCode, AppError> {
    state.store.deactivate(user.id).await?;
    info!(user_id = %user.id, "account deactivated");
    Ok(StatusCode::NO_CONTENT)
}

// --- admin surface ---

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<Vec<PublicUser>>, AppError> {
    let users = state.store.list().await?;
    Ok(Json(users.into_iter().map(PublicUser::from).collect()))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicUser>, AppError> {
    let user = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(NO_SUCH_USER.into()))?;
    Ok(Json(user.into()))
}

#[instrument(skip(state, payload))]
pub async fn admin_update_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<AdminUpdateUserRequest>,
) -> Result<Json<PublicUser>, AppError> {
    if let Some(email) = payload.email.as_mut() {
        *email = email.trim().to_lowercase();
        if !is_valid_email(email) {
            return Err(AppError::Validation("Please provide a valid email".into()));
        }
    }

    let updated = state
        .store
        .admin_update(
            id,
            AdminUserUpdate {
                name: payload.name,
                email: payload.email,
                role: payload.role,
                active: payload.active,
            },
        )
        .await?
        .ok_or_else(|| AppError::NotFound(NO_SUCH_USER.into()))?;

    info!(user_id = %updated.id, "user updated by admin");
    Ok(Json(updated.into()))
}

/// Admin delete is a soft delete; records keep their unique email and name.
#[instrument(skip(state))]
pub async fn admin_delete_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let user = state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(NO_SUCH_USER.into()))?;

    state.store.deactivate(user.id).await?;
    warn!(user_id = %user.id, "user deactivated by admin");
    Ok(StatusCode::NO_CONTENT)
}
