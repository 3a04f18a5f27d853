use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::AppConfig;

/// Name of the session cookie; the same token also travels in the JSON body.
pub const SESSION_COOKIE: &str = "session";

/// Value written on logout. Logout only overwrites the delivered copy; it
/// does not invalidate tokens held elsewhere.
const LOGGED_OUT: &str = "logged-out";

/// Cookie carrying a freshly issued session token: `HttpOnly` always,
/// `Secure` only when deployed behind TLS in production.
pub fn session_cookie(token: &str, config: &AppConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token.to_owned()))
        .path("/")
        .http_only(true)
        .secure(config.is_production())
        .same_site(SameSite::Lax)
        .max_age(Duration::days(config.cookie_expires_in_days))
        .build()
}

/// Replacement cookie sent on logout: trivial value, near-immediate expiry.
pub fn logout_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, LOGGED_OUT))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(Duration::seconds(10))
        .build()
}
