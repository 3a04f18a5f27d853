use std::sync::Arc;

use anyhow::Context;

use crate::config::AppConfig;
use crate::email::{LogMailer, Mailer};
use crate::users::store::{PgUserStore, UserStore};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        // Run migrations if present
        if let Err(e) = sqlx::migrate!("./migrations").run(&db).await {
            tracing::warn!(error = %e, "migrations folder not found or migration failed; continuing");
        }

        Ok(Self {
            store: Arc::new(PgUserStore::new(db)),
            mailer: Arc::new(LogMailer),
            config,
        })
    }

    /// Assemble a state from explicit collaborators; tests use this with
    /// in-memory fakes.
    pub fn from_parts(
        store: Arc<dyn UserStore>,
        mailer: Arc<dyn Mailer>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            mailer,
            config,
        }
    }
}
