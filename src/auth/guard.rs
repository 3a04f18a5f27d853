use std::future::Future;
use std::pin::Pin;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::warn;

use crate::auth::jwt::JwtKeys;
use crate::auth::session::SESSION_COOKIE;
use crate::error::AppError;
use crate::state::AppState;
use crate::users::model::{Role, User};

const NOT_LOGGED_IN: &str = "You are not logged in. Please log in to get access.";
const USER_GONE: &str = "The user belonging to this token no longer exists.";
const PASSWORD_CHANGED: &str = "Password was recently changed. Please log in again.";

/// The resolved caller identity. Declaring this extractor on a handler is
/// what marks the operation as requiring authentication.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Non-failing variant for surfaces that render differently for anonymous
/// callers: any failure along the chain degrades to `None`.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<User>);

/// Token from `Authorization: Bearer <t>`, falling back to the session
/// cookie.
fn token_from_parts(parts: &Parts) -> Option<String> {
    let bearer = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_owned);
    bearer.or_else(|| {
        CookieJar::from_headers(&parts.headers)
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_owned())
    })
}

/// Full guard chain: extract → verify → resolve → staleness check.
async fn resolve(parts: &Parts, state: &AppState) -> Result<User, AppError> {
    let token = token_from_parts(parts).ok_or(AppError::Authentication(NOT_LOGGED_IN))?;

    let keys = JwtKeys::from_ref(state);
    let claims = keys.verify(&token).map_err(|e| {
        warn!(error = %e, "session token rejected");
        AppError::Authentication(NOT_LOGGED_IN)
    })?;

    // The subject must still exist and be active; deactivated accounts keep
    // their cryptographically valid tokens but lose access.
    let user = state
        .store
        .find_by_id(claims.sub)
        .await?
        .ok_or(AppError::Authentication(USER_GONE))?;

    // The only path by which a valid, unexpired token becomes unusable.
    if user.changed_password_after(claims.iat as i64) {
        return Err(AppError::Authentication(PASSWORD_CHANGED));
    }

    Ok(user)
}

#[axum::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // A role layer upstream may already have resolved the caller.
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(CurrentUser(user.clone()));
        }
        resolve(parts, state).await.map(CurrentUser)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<User>() {
            return Ok(OptionalUser(Some(user.clone())));
        }
        Ok(OptionalUser(resolve(parts, state).await.ok()))
    }
}

type GuardFuture = Pin<Box<dyn Future<Output = Result<Response, AppError>> + Send>>;

/// Route layer enforcing a fixed role allow-list. Runs the full guard chain,
/// rejects with 403 when the resolved role is not listed, and caches the
/// user in request extensions so downstream extractors skip the lookup.
pub fn require_roles(
    allowed: &'static [Role],
) -> impl Fn(State<AppState>, Request, Next) -> GuardFuture + Clone + Send + 'static {
    move |State(state), req, next| {
        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            let user = resolve(&parts, &state).await?;
            if !allowed.contains(&user.role) {
                warn!(user_id = %user.id, role = %user.role, "role not permitted");
                return Err(AppError::Forbidden);
            }
            parts.extensions.insert(user);
            let req = Request::from_parts(parts, body);
            Ok(next.run(req).await)
        })
    }
}
