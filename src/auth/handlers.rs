use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use lazy_static::lazy_static;
use regex::Regex;
use time::{Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::{
        dto::{
            AuthResponse, ForgotPasswordRequest, LoginRequest, MessageResponse,
            ResetPasswordRequest, SessionStatus, SignupRequest, UpdatePasswordRequest,
        },
        guard::{CurrentUser, OptionalUser},
        jwt::JwtKeys,
        password::{hash_password_blocking, verify_password_blocking},
        reset, session,
    },
    error::AppError,
    state::AppState,
    users::model::{NewUser, User},
};

const INCORRECT_CREDENTIALS: &str = "Incorrect email or password";
const INVALID_RESET_TOKEN: &str = "Reset token is invalid or has expired";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_new_password(password: &str, confirm: &str) -> Result<(), AppError> {
    if password.len() < 8 {
        return Err(AppError::Validation(
            "Password must be at least 8 characters".into(),
        ));
    }
    if password != confirm {
        return Err(AppError::Validation("Passwords are not the same".into()));
    }
    Ok(())
}

/// Issue a fresh session for `user`: token in the body, same token in the
/// session cookie. Login, signup and a successful reset all end here.
fn issue_session(
    state: &AppState,
    jar: CookieJar,
    user: User,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.sign(user.id)?;
    let jar = jar.add(session::session_cookie(&token, &state.config));
    Ok((
        jar,
        Json(AuthResponse {
            token,
            user: user.into(),
        }),
    ))
}

#[instrument(skip(state, jar, payload))]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<SignupRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), AppError> {
    payload.email = payload.email.trim().to_lowercase();
    payload.name = payload.name.trim().to_string();

    if payload.name.is_empty() {
        return Err(AppError::Validation("Please tell us your name".into()));
    }
    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err(AppError::Validation("Please provide a valid email".into()));
    }
    check_new_password(&payload.password, &payload.password_confirm)?;

    // Ensure email is not taken; the unique constraint still backstops races.
    if let Some(_existing) = state.store.find_by_email(&payload.email).await? {
        warn!(email = %payload.email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let password_hash = hash_password_blocking(payload.password).await?;
    let user = state
        .store
        .create(NewUser {
            name: payload.name,
            email: payload.email,
            password_hash,
        })
        .await?;

    // Welcome mail is best-effort; the account exists either way.
    let welcome_url = format!("{}/me", state.config.public_url);
    if let Err(e) = state.mailer.send_welcome(&user, &welcome_url).await {
        warn!(error = %e, user_id = %user.id, "welcome email failed");
    }

    info!(user_id = %user.id, email = %user.email, "user signed up");
    let (jar, body) = issue_session(&state, jar, user)?;
    Ok((StatusCode::CREATED, jar, body))
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(mut payload): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    payload.email = payload.email.trim().to_lowercase();

    // Presence first, before any lookup, so a missing field never takes the
    // credential path.
    if payload.email.is_empty() || payload.password.is_empty() {
        return Err(AppError::Validation(
            "Please provide email and password".into(),
        ));
    }

    // One undifferentiated error for unknown email and wrong password.
    let Some(creds) = state
        .store
        .find_by_email_with_password(&payload.email)
        .await?
    else {
        warn!(email = %payload.email, "login unknown email");
        return Err(AppError::Authentication(INCORRECT_CREDENTIALS));
    };

    let ok = verify_password_blocking(payload.password, creds.password_hash.clone()).await;
    if !ok {
        warn!(user_id = %creds.user.id, "login invalid password");
        return Err(AppError::Authentication(INCORRECT_CREDENTIALS));
    }

    info!(user_id = %creds.user.id, email = %creds.user.email, "user logged in");
    issue_session(&state, jar, creds.user)
}

/// Anonymous-tolerant probe: bad, stale or missing credentials all read as
/// "not signed in" here, never as an error.
#[instrument(skip_all)]
pub async fn session_status(OptionalUser(user): OptionalUser) -> Json<SessionStatus> {
    Json(SessionStatus {
        authenticated: user.is_some(),
        user: user.map(Into::into),
    })
}

#[instrument(skip(jar))]
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    (
        jar.add(session::logout_cookie()),
        Json(MessageResponse {
            status: "success",
            message: "Logged out".into(),
        }),
    )
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    payload.email = payload.email.trim().to_lowercase();
    if payload.email.is_empty() {
        return Err(AppError::Validation(
            "Please provide your email address".into(),
        ));
    }

    // Unknown addresses get the same success-shaped answer as known ones so
    // this route cannot be used to probe for accounts.
    let sent = MessageResponse {
        status: "success",
        message: "If an account with that email exists, a reset token has been sent.".into(),
    };

    let Some(user) = state.store.find_by_email(&payload.email).await? else {
        info!("password reset requested for unknown email");
        return Ok(Json(sent));
    };

    // Persist the hash before the raw value leaves this process.
    let token = reset::generate();
    let expires_at = OffsetDateTime::now_utc() + reset::RESET_TOKEN_TTL;
    state
        .store
        .set_reset_token(user.id, &token.hash, expires_at)
        .await?;

    let reset_url = format!(
        "{}/api/v1/users/reset-password/{}",
        state.config.public_url, token.raw
    );
    if let Err(e) = state.mailer.send_password_reset(&user, &reset_url).await {
        error!(error = %e, user_id = %user.id, "password reset email failed");
        // Fail closed: no live reset window the user was never told about.
        state.store.clear_reset_token(user.id, &token.hash).await?;
        return Err(AppError::Delivery(
            "There was an error sending the email. Please try again later.".into(),
        ));
    }

    info!(user_id = %user.id, "password reset token issued");
    Ok(Json(sent))
}

#[instrument(skip(state, jar, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(token): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    check_new_password(&payload.password, &payload.password_confirm)?;

    let password_hash = hash_password_blocking(payload.password).await?;
    let now = OffsetDateTime::now_utc();
    // Back-dated a second so the session issued right below is not stale
    // against its own change.
    let changed_at = now - Duration::seconds(1);

    // Atomic compare-and-set in the store: wrong value, expired and
    // already-used all fall out as "no match" and share one error.
    let token_hash = reset::hash_token(&token);
    let Some(user) = state
        .store
        .consume_reset_token(&token_hash, &password_hash, changed_at, now)
        .await?
    else {
        warn!("reset token did not match any live record");
        return Err(AppError::Authentication(INVALID_RESET_TOKEN));
    };

    info!(user_id = %user.id, "password reset completed");
    issue_session(&state, jar, user)
}

#[instrument(skip(state, jar, payload))]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    check_new_password(&payload.password, &payload.password_confirm)?;

    let Some(creds) = state.store.find_by_id_with_password(user.id).await? else {
        return Err(AppError::Authentication(
            "The user belonging to this token no longer exists.",
        ));
    };

    let ok = verify_password_blocking(payload.password_current, creds.password_hash.clone()).await;
    if !ok {
        warn!(user_id = %user.id, "current password mismatch on update");
        return Err(AppError::Authentication("Your current password is wrong"));
    }

    let password_hash = hash_password_blocking(payload.password).await?;
    let changed_at = OffsetDateTime::now_utc() - Duration::seconds(1);
    state
        .store
        .update_password(user.id, &password_hash, changed_at)
        .await?;

    info!(user_id = %user.id, "password updated");
    issue_session(&state, jar, creds.user)
}
