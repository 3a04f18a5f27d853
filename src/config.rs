use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    /// Session-token lifetime in days.
    pub expires_in_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub environment: Environment,
    pub jwt: JwtConfig,
    /// Cookie lifetime in days; matches the token lifetime by default.
    pub cookie_expires_in_days: i64,
    /// Base URL used when building links for outbound email.
    pub public_url: String,
}

impl AppConfig {
    /// Secrets are required: a process without `JWT_SECRET` or `DATABASE_URL`
    /// must not come up at all.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            expires_in_days: std::env::var("JWT_EXPIRES_IN_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(90),
        };
        let cookie_expires_in_days = std::env::var("JWT_COOKIE_EXPIRES_IN_DAYS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(jwt.expires_in_days);
        let environment = match std::env::var("APP_ENV").as_deref() {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };
        let public_url =
            std::env::var("PUBLIC_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

        Ok(Self {
            database_url,
            environment,
            jwt,
            cookie_expires_in_days,
            public_url,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}
