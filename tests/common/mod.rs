#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header::SET_COOKIE, redirect::Policy, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use uuid::Uuid;

use items_api::app::{router, AppState};
use items_api::backend::{AuthProvider, Backend, BackendError, Caller, DataStore, MemoryBackend};
use items_api::auth::TokenIssuer;
use items_api::config::{AppConfig, BackendKind};
use items_api::models::{Item, NewAccount, NewItem, Profile, ProfileUpdate, RowRange, Session, SessionUser};

pub const PASSWORD: &str = "password123";

pub struct TestServer {
    pub base_url: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Serve `state` on a free local port for the rest of the test
    pub async fn spawn(state: AppState) -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .with_context(|| format!("failed to bind port {}", port))?;

        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("test server crashed");
        });

        // Redirects stay visible so tests can assert on Location
        let client = reqwest::Client::builder().redirect(Policy::none()).build()?;
        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
            client,
        };
        server.wait_ready(Duration::from_secs(5)).await?;
        Ok(server)
    }

    /// Default stack: testing config over the in-memory backend
    pub async fn memory() -> Result<Self> {
        Self::spawn(memory_state(AppConfig::testing())?).await
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = self.client.get(self.url("/api/health")).send().await {
                if resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register through the JSON API and return the new session's JSON
    pub async fn register_and_login(&self, email: &str) -> Result<Value> {
        let res = self
            .client
            .post(self.url("/api/auth/signup"))
            .json(&json!({ "email": email, "password": PASSWORD, "confirmPassword": PASSWORD }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "signup failed: {}", res.status());

        let res = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::OK, "login failed: {}", res.status());

        let body: Value = res.json().await?;
        Ok(body["data"].clone())
    }

    /// Bearer token of a freshly registered user
    pub async fn token_for(&self, email: &str) -> Result<String> {
        let session = self.register_and_login(email).await?;
        session["access_token"]
            .as_str()
            .map(str::to_string)
            .context("session without access_token")
    }
}

pub fn memory_state(config: AppConfig) -> Result<AppState> {
    let backend = Backend::memory(&config)?;
    Ok(AppState::new(config, backend))
}

/// `Set-Cookie` headers of a response, as sent
pub fn set_cookies(res: &reqwest::Response) -> Vec<String> {
    res.headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// Value a `Set-Cookie` list assigns to `name`, if any
pub fn cookie_value(set_cookies: &[String], name: &str) -> Option<String> {
    set_cookies.iter().find_map(|header| {
        let pair = header.split(';').next()?;
        let (key, value) = pair.split_once('=')?;
        (key == name).then(|| value.to_string())
    })
}

/// `Cookie` request header carrying the cookies a response set
pub fn cookie_header(set_cookies: &[String]) -> String {
    set_cookies
        .iter()
        .filter_map(|header| header.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn location(res: &reqwest::Response) -> Option<String> {
    res.headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub fn test_user(email: &str) -> SessionUser {
    SessionUser {
        id: Uuid::new_v4(),
        email: email.to_string(),
        name: None,
    }
}

/// Auth provider that records sign-in attempts and accepts a single password
pub struct RecordingAuth {
    pub user: SessionUser,
    pub password: String,
    pub sign_ins: Mutex<Vec<(String, String)>>,
    issued: Mutex<Vec<String>>,
}

impl RecordingAuth {
    pub fn new(email: &str, password: &str) -> Self {
        Self {
            user: test_user(email),
            password: password.to_string(),
            sign_ins: Mutex::new(Vec::new()),
            issued: Mutex::new(Vec::new()),
        }
    }

    pub fn sign_ins(&self) -> Vec<(String, String)> {
        self.sign_ins.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthProvider for RecordingAuth {
    async fn get_user(&self, access_token: &str) -> Result<Option<SessionUser>, BackendError> {
        let known = self.issued.lock().unwrap().iter().any(|t| t == access_token);
        Ok(known.then(|| self.user.clone()))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        self.sign_ins
            .lock()
            .unwrap()
            .push((email.to_string(), password.to_string()));

        if email != self.user.email || password != self.password {
            return Err(BackendError::InvalidCredentials);
        }

        let access_token = format!("access-{}", Uuid::new_v4());
        self.issued.lock().unwrap().push(access_token.clone());
        Ok(Session {
            access_token,
            refresh_token: format!("refresh-{}", Uuid::new_v4()),
            expires_at: Utc::now().timestamp() + 3600,
            user: self.user.clone(),
        })
    }

    async fn sign_up(&self, _account: NewAccount) -> Result<SessionUser, BackendError> {
        Err(BackendError::AlreadyRegistered)
    }

    async fn refresh_session(&self, _refresh_token: &str) -> Result<Option<Session>, BackendError> {
        Ok(None)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        self.issued.lock().unwrap().retain(|t| t != access_token);
        Ok(())
    }
}

/// Data store that records requested windows and can be told to fail
#[derive(Default)]
pub struct RecordingStore {
    pub ranges: Mutex<Vec<RowRange>>,
    pub inserted: Mutex<Vec<NewItem>>,
    pub fail_with: Option<String>,
}

impl RecordingStore {
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), BackendError> {
        match &self.fail_with {
            Some(message) => Err(BackendError::Rejected(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DataStore for RecordingStore {
    async fn insert_item(&self, caller: &Caller, item: NewItem) -> Result<Item, BackendError> {
        self.check()?;
        self.inserted.lock().unwrap().push(item.clone());
        Ok(item.into_item(caller.user.id))
    }

    async fn select_items(&self, _caller: &Caller, range: RowRange) -> Result<Vec<Item>, BackendError> {
        self.ranges.lock().unwrap().push(range);
        self.check()?;
        Ok(Vec::new())
    }

    async fn select_profile(&self, _caller: &Caller) -> Result<Option<Profile>, BackendError> {
        self.check()?;
        Ok(None)
    }

    async fn upsert_profile(&self, caller: &Caller, update: ProfileUpdate) -> Result<Profile, BackendError> {
        self.check()?;
        Ok(update.into_profile(caller.user.id))
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

/// Real memory auth in front of a recording store
pub fn state_with_store(store: Arc<RecordingStore>) -> Result<AppState> {
    let config = AppConfig::testing();
    let auth = Arc::new(MemoryBackend::new(
        TokenIssuer::from_config(&config.security)?,
        config.security.bcrypt_cost,
    ));
    let backend = Backend::new(BackendKind::Memory, auth, store);
    Ok(AppState::new(config, backend))
}

/// Recording auth in front of the memory store
pub fn state_with_auth(auth: Arc<RecordingAuth>) -> Result<AppState> {
    let config = AppConfig::testing();
    let store = Arc::new(MemoryBackend::new(
        TokenIssuer::from_config(&config.security)?,
        config.security.bcrypt_cost,
    ));
    let backend = Backend::new(BackendKind::Memory, auth, store);
    Ok(AppState::new(config, backend))
}
