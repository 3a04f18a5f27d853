use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Row};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::model::{AdminUserUpdate, NewUser, UnknownRole, User, UserCredentials};

/// Store-level failures. Unique-constraint violations get their own variant
/// so handlers can answer 409 instead of 500.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("duplicate value for a unique field")]
    Duplicate,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

fn map_sqlx(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db) = e {
        if db.is_unique_violation() {
            return StoreError::Duplicate;
        }
    }
    StoreError::Database(e)
}

/// Persistence collaborator for user records.
///
/// Every default lookup excludes deactivated records; the password hash is
/// only returned by the explicit `*_with_password` variants. Reset-token
/// mutations are conditioned on the stored hash still matching at write time
/// (compare-and-set), so a token can never be consumed twice even under
/// concurrent requests.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_email_with_password(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    async fn find_by_id_with_password(
        &self,
        id: Uuid,
    ) -> Result<Option<UserCredentials>, StoreError>;

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError>;

    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, StoreError>;

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError>;

    /// Clears the reset fields only if `token_hash` still matches the stored
    /// value. Used to roll back after a failed delivery.
    async fn clear_reset_token(&self, id: Uuid, token_hash: &str) -> Result<(), StoreError>;

    /// Single-statement consume: writes the new password and clears both
    /// reset fields where the stored hash matches and has not expired.
    /// Returns `None` when nothing matched (wrong value, expired, or already
    /// used).
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        changed_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError>;

    async fn deactivate(&self, id: Uuid) -> Result<(), StoreError>;

    async fn list(&self) -> Result<Vec<User>, StoreError>;

    async fn admin_update(
        &self,
        id: Uuid,
        update: AdminUserUpdate,
    ) -> Result<Option<User>, StoreError>;
}

impl FromRow<'_, PgRow> for User {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        let role = role
            .parse()
            .map_err(|e: UnknownRole| sqlx::Error::ColumnDecode {
                index: "role".into(),
                source: Box::new(e),
            })?;
        Ok(User {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            role,
            password_changed_at: row.try_get("password_changed_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl FromRow<'_, PgRow> for UserCredentials {
    fn from_row(row: &PgRow) -> Result<Self, sqlx::Error> {
        Ok(UserCredentials {
            user: User::from_row(row)?,
            password_hash: row.try_get("password_hash")?,
        })
    }
}

const PUBLIC_COLUMNS: &str = "id, name, email, role, password_changed_at, created_at";
const CREDENTIAL_COLUMNS: &str =
    "id, name, email, role, password_changed_at, created_at, password_hash";

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {PUBLIC_COLUMNS} FROM users WHERE email = $1 AND active = TRUE"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email_with_password(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let creds = sqlx::query_as::<_, UserCredentials>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM users WHERE email = $1 AND active = TRUE"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(creds)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {PUBLIC_COLUMNS} FROM users WHERE id = $1 AND active = TRUE"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_id_with_password(
        &self,
        id: Uuid,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let creds = sqlx::query_as::<_, UserCredentials>(&format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM users WHERE id = $1 AND active = TRUE"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(creds)
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, role)
            VALUES ($1, $2, $3, 'standard')
            RETURNING {PUBLIC_COLUMNS}
            "#
        ))
        .bind(&new_user.name)
        .bind(&new_user.email)
        .bind(&new_user.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(map_sqlx)?;
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name), email = COALESCE($3, email)
            WHERE id = $1 AND active = TRUE
            RETURNING {PUBLIC_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx)?;
        Ok(user)
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $2, password_changed_at = $3
            WHERE id = $1 AND active = TRUE
            "#,
        )
        .bind(id)
        .bind(password_hash)
        .bind(changed_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_reset_token = $2, password_reset_expires = $3
            WHERE id = $1 AND active = TRUE
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn clear_reset_token(&self, id: Uuid, token_hash: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_reset_token = NULL, password_reset_expires = NULL
            WHERE id = $1 AND password_reset_token = $2
            "#,
        )
        .bind(id)
        .bind(token_hash)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        changed_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET password_hash = $2,
                password_changed_at = $3,
                password_reset_token = NULL,
                password_reset_expires = NULL
            WHERE password_reset_token = $1
              AND password_reset_expires > $4
              AND active = TRUE
            RETURNING {PUBLIC_COLUMNS}
            "#
        ))
        .bind(token_hash)
        .bind(new_password_hash)
        .bind(changed_at)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET active = FALSE WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {PUBLIC_COLUMNS} FROM users WHERE active = TRUE ORDER BY created_at"
        ))
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn admin_update(
        &self,
        id: Uuid,
        update: AdminUserUpdate,
    ) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                role = COALESCE($4, role),
                active = COALESCE($5, active)
            WHERE id = $1 AND active = TRUE
            RETURNING {PUBLIC_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(update.name)
        .bind(update.email)
        .bind(update.role.map(|r| r.as_str()))
        .bind(update.active)
        .fetch_optional(&self.db)
        .await
        .map_err(map_sqlx)?;
        Ok(user)
    }
}
