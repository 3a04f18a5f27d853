//! Shared test harness: the real router wired against in-memory fakes for
//! the store and mailer collaborators.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

use tourbase::app::build_app;
use tourbase::config::{AppConfig, Environment, JwtConfig};
use tourbase::email::Mailer;
use tourbase::state::AppState;
use tourbase::users::model::{AdminUserUpdate, NewUser, Role, User, UserCredentials};
use tourbase::users::store::{StoreError, UserStore};

pub const TEST_SECRET: &str = "test-secret";

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user: User,
    pub password_hash: String,
    pub reset_token: Option<(String, OffsetDateTime)>,
    pub active: bool,
}

/// In-memory `UserStore`. The single mutex makes every operation an atomic
/// read-modify-write, mirroring the per-record conditional updates of the
/// Postgres implementation.
#[derive(Default)]
pub struct MemoryUserStore {
    records: Mutex<HashMap<Uuid, StoredUser>>,
}

impl MemoryUserStore {
    fn taken(records: &HashMap<Uuid, StoredUser>, skip: Option<Uuid>, name: &str, email: &str) -> bool {
        records.values().any(|r| {
            Some(r.user.id) != skip && (r.user.email == email || r.user.name == name)
        })
    }

    pub fn record(&self, id: Uuid) -> Option<StoredUser> {
        self.records.lock().unwrap().get(&id).cloned()
    }

    pub fn set_role(&self, id: Uuid, role: Role) {
        let mut records = self.records.lock().unwrap();
        records.get_mut(&id).unwrap().user.role = role;
    }

    pub fn set_password_changed_at(&self, id: Uuid, changed_at: Option<OffsetDateTime>) {
        let mut records = self.records.lock().unwrap();
        records.get_mut(&id).unwrap().user.password_changed_at = changed_at;
    }

    pub fn expire_reset_token(&self, id: Uuid) {
        let mut records = self.records.lock().unwrap();
        let record = records.get_mut(&id).unwrap();
        if let Some((_, expires)) = record.reset_token.as_mut() {
            *expires = OffsetDateTime::now_utc() - time::Duration::minutes(1);
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .find(|r| r.active && r.user.email == email)
            .map(|r| r.user.clone()))
    }

    async fn find_by_email_with_password(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .find(|r| r.active && r.user.email == email)
            .map(|r| UserCredentials {
                user: r.user.clone(),
                password_hash: r.password_hash.clone(),
            }))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&id)
            .filter(|r| r.active)
            .map(|r| r.user.clone()))
    }

    async fn find_by_id_with_password(
        &self,
        id: Uuid,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let records = self.records.lock().unwrap();
        Ok(records.get(&id).filter(|r| r.active).map(|r| UserCredentials {
            user: r.user.clone(),
            password_hash: r.password_hash.clone(),
        }))
    }

    async fn create(&self, new_user: NewUser) -> Result<User, StoreError> {
        let mut records = self.records.lock().unwrap();
        if Self::taken(&records, None, &new_user.name, &new_user.email) {
            return Err(StoreError::Duplicate);
        }
        let user = User {
            id: Uuid::new_v4(),
            name: new_user.name,
            email: new_user.email,
            role: Role::Standard,
            password_changed_at: None,
            created_at: OffsetDateTime::now_utc(),
        };
        records.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash: new_user.password_hash,
                reset_token: None,
                active: true,
            },
        );
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        name: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, StoreError> {
        let mut records = self.records.lock().unwrap();
        let current = match records.get(&id) {
            Some(r) if r.active => r.user.clone(),
            _ => return Ok(None),
        };
        let name = name.unwrap_or(&current.name).to_string();
        let email = email.unwrap_or(&current.email).to_string();
        if Self::taken(&records, Some(id), &name, &email) {
            return Err(StoreError::Duplicate);
        }
        let record = records.get_mut(&id).unwrap();
        record.user.name = name;
        record.user.email = email;
        Ok(Some(record.user.clone()))
    }

    async fn update_password(
        &self,
        id: Uuid,
        password_hash: &str,
        changed_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&id).filter(|r| r.active) {
            record.password_hash = password_hash.to_string();
            record.user.password_changed_at = Some(changed_at);
        }
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&id).filter(|r| r.active) {
            record.reset_token = Some((token_hash.to_string(), expires_at));
        }
        Ok(())
    }

    async fn clear_reset_token(&self, id: Uuid, token_hash: &str) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&id) {
            if record
                .reset_token
                .as_ref()
                .is_some_and(|(stored, _)| stored == token_hash)
            {
                record.reset_token = None;
            }
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        changed_at: OffsetDateTime,
        now: OffsetDateTime,
    ) -> Result<Option<User>, StoreError> {
        let mut records = self.records.lock().unwrap();
        let matching = records.values_mut().find(|r| {
            r.active
                && r.reset_token
                    .as_ref()
                    .is_some_and(|(stored, expires)| stored == token_hash && *expires > now)
        });
        Ok(matching.map(|record| {
            record.password_hash = new_password_hash.to_string();
            record.user.password_changed_at = Some(changed_at);
            record.reset_token = None;
            record.user.clone()
        }))
    }

    async fn deactivate(&self, id: Uuid) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.get_mut(&id) {
            record.active = false;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<User>, StoreError> {
        let records = self.records.lock().unwrap();
        let mut users: Vec<User> = records
            .values()
            .filter(|r| r.active)
            .map(|r| r.user.clone())
            .collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn admin_update(
        &self,
        id: Uuid,
        update: AdminUserUpdate,
    ) -> Result<Option<User>, StoreError> {
        let mut records = self.records.lock().unwrap();
        let current = match records.get(&id) {
            Some(r) if r.active => r.user.clone(),
            _ => return Ok(None),
        };
        let name = update.name.unwrap_or(current.name);
        let email = update.email.unwrap_or(current.email);
        if Self::taken(&records, Some(id), &name, &email) {
            return Err(StoreError::Duplicate);
        }
        let record = records.get_mut(&id).unwrap();
        record.user.name = name;
        record.user.email = email;
        if let Some(role) = update.role {
            record.user.role = role;
        }
        if let Some(active) = update.active {
            record.active = active;
        }
        Ok(Some(record.user.clone()))
    }
}

/// Capturing mailer with switchable failure modes.
#[derive(Default)]
pub struct MockMailer {
    pub fail_welcome: AtomicBool,
    pub fail_reset: AtomicBool,
    pub welcome_urls: Mutex<Vec<String>>,
    pub reset_urls: Mutex<Vec<String>>,
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_welcome(&self, _user: &User, url: &str) -> anyhow::Result<()> {
        self.welcome_urls.lock().unwrap().push(url.to_string());
        if self.fail_welcome.load(Ordering::SeqCst) {
            anyhow::bail!("smtp relay is down");
        }
        Ok(())
    }

    async fn send_password_reset(&self, _user: &User, reset_url: &str) -> anyhow::Result<()> {
        self.reset_urls.lock().unwrap().push(reset_url.to_string());
        if self.fail_reset.load(Ordering::SeqCst) {
            anyhow::bail!("smtp relay is down");
        }
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryUserStore>,
    pub mailer: Arc<MockMailer>,
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".into(),
        environment: Environment::Development,
        jwt: JwtConfig {
            secret: TEST_SECRET.into(),
            expires_in_days: 90,
        },
        cookie_expires_in_days: 90,
        public_url: "http://localhost:8080".into(),
    }
}

pub fn test_app() -> TestApp {
    let store = Arc::new(MemoryUserStore::default());
    let mailer = Arc::new(MockMailer::default());
    let state = AppState::from_parts(
        store.clone(),
        mailer.clone(),
        Arc::new(test_config()),
    );
    TestApp {
        router: build_app(state),
        store,
        mailer,
    }
}

// --- request helpers ---

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.expect("infallible")
}

pub async fn send_json(
    router: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, Response<Body>) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = send(router, request).await;
    (response.status(), response)
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("json body")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body")
        .to_vec()
}

/// Sign up a user and hand back `(user_id, token)`.
pub async fn signup(router: &Router, name: &str, email: &str, password: &str) -> (Uuid, String) {
    let (status, response) = send_json(
        router,
        "POST",
        "/api/v1/users/signup",
        None,
        Some(serde_json::json!({
            "name": name,
            "email": email,
            "password": password,
            "password_confirm": password,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "signup should succeed");
    let json = body_json(response).await;
    let id = json["user"]["id"].as_str().unwrap().parse().unwrap();
    let token = json["token"].as_str().unwrap().to_string();
    (id, token)
}
