use async_trait::async_trait;
use tracing::info;

use crate::users::model::User;

/// Out-of-band delivery collaborator. Failures must surface to the caller as
/// errors; the reset flow in particular reacts to them by rolling back the
/// token it just persisted.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, user: &User, url: &str) -> anyhow::Result<()>;

    /// `reset_url` embeds the raw reset token; it must never appear anywhere
    /// except this call.
    async fn send_password_reset(&self, user: &User, reset_url: &str) -> anyhow::Result<()>;
}

/// Development mailer: writes structured log events instead of talking to an
/// SMTP relay. Real delivery is an operational concern outside this service.
#[derive(Clone, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_welcome(&self, user: &User, url: &str) -> anyhow::Result<()> {
        info!(email = %user.email, %url, "welcome email queued");
        Ok(())
    }

    async fn send_password_reset(&self, user: &User, reset_url: &str) -> anyhow::Result<()> {
        info!(email = %user.email, %reset_url, "password reset email queued");
        Ok(())
    }
}
