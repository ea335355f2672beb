//! Hosted backend-as-a-service client.
//!
//! Auth calls speak the GoTrue dialect under `/auth/v1`, row calls speak the
//! PostgREST dialect under `/rest/v1`. Row-level security is the service's
//! job: every row call carries the caller's access token.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use url::Url;

use super::{AuthProvider, BackendError, Caller, DataStore};
use crate::config::BackendConfig;
use crate::models::{Item, NewAccount, NewItem, Profile, ProfileUpdate, RowRange, Session, SessionUser};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

pub struct HostedBackend {
    client: Client,
    base_url: Url,
    anon_key: String,
}

#[derive(Debug, Deserialize)]
struct RemoteUser {
    id: uuid::Uuid,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    user_metadata: Value,
}

impl RemoteUser {
    fn into_session_user(self) -> SessionUser {
        let name = self
            .user_metadata
            .get("name")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        SessionUser {
            id: self.id,
            email: self.email.unwrap_or_default(),
            name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    expires_at: Option<i64>,
    user: RemoteUser,
}

impl TokenResponse {
    fn into_session(self) -> Session {
        let expires_at = self
            .expires_at
            .unwrap_or_else(|| Utc::now().timestamp() + self.expires_in.unwrap_or(3600));
        Session {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
            user: self.user.into_session_user(),
        }
    }
}

/// Sign-up answers with either a bare user or a session wrapping one
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session { user: RemoteUser },
    User(RemoteUser),
}

impl HostedBackend {
    pub fn new(mut base_url: Url, anon_key: impl Into<String>, timeout: Duration) -> Result<Self, BackendError> {
        // Relative joins replace the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            anon_key: anon_key.into(),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let raw = config
            .hosted_url
            .as_deref()
            .ok_or_else(|| BackendError::Unavailable("BAAS_URL is not set".to_string()))?;
        let base_url = Url::parse(raw).map_err(|e| BackendError::Unavailable(format!("invalid BAAS_URL: {}", e)))?;
        let anon_key = config.hosted_anon_key.clone().unwrap_or_default();

        Self::new(base_url, anon_key, Duration::from_secs(config.hosted_timeout_secs))
    }

    fn endpoint(&self, path: &str) -> Result<Url, BackendError> {
        self.base_url
            .join(path)
            .map_err(|e| BackendError::Unavailable(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Request with the project key and, if given, the caller's bearer token
    fn request(&self, method: reqwest::Method, path: &str, bearer: Option<&str>) -> Result<RequestBuilder, BackendError> {
        let builder = self
            .client
            .request(method, self.endpoint(path)?)
            .header("apikey", &self.anon_key)
            .bearer_auth(bearer.unwrap_or(&self.anon_key));
        Ok(builder)
    }

    fn rest(&self, method: reqwest::Method, path: &str, caller: &Caller) -> Result<RequestBuilder, BackendError> {
        self.request(method, path, Some(&caller.access_token))
    }
}

/// Best-effort extraction of the service's error text
async fn error_message(response: Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            ["message", "msg", "error_description", "error"]
                .iter()
                .find_map(|key| v.get(*key).and_then(|m| m.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else {
                body
            }
        })
}

async fn rejected(response: Response) -> BackendError {
    BackendError::Rejected(error_message(response).await)
}

#[async_trait]
impl AuthProvider for HostedBackend {
    async fn get_user(&self, access_token: &str) -> Result<Option<SessionUser>, BackendError> {
        let response = self
            .request(reqwest::Method::GET, "auth/v1/user", Some(access_token))?
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(Some(response.json::<RemoteUser>().await?.into_session_user())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(None),
            _ => Err(rejected(response).await),
        }
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let response = self
            .request(reqwest::Method::POST, "auth/v1/token?grant_type=password", None)?
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(response.json::<TokenResponse>().await?.into_session()),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(BackendError::InvalidCredentials),
            _ => Err(rejected(response).await),
        }
    }

    async fn sign_up(&self, account: NewAccount) -> Result<SessionUser, BackendError> {
        let response = self
            .request(reqwest::Method::POST, "auth/v1/signup", None)?
            .json(&json!({
                "email": account.email,
                "password": account.password,
                "data": { "name": account.name },
            }))
            .send()
            .await?;

        if response.status().is_success() {
            let user = match response.json::<SignUpResponse>().await? {
                SignUpResponse::Session { user } | SignUpResponse::User(user) => user,
            };
            return Ok(user.into_session_user());
        }

        let message = error_message(response).await;
        if message.to_lowercase().contains("already registered") {
            Err(BackendError::AlreadyRegistered)
        } else {
            Err(BackendError::Rejected(message))
        }
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Option<Session>, BackendError> {
        let response = self
            .request(reqwest::Method::POST, "auth/v1/token?grant_type=refresh_token", None)?
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(Some(response.json::<TokenResponse>().await?.into_session())),
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Ok(None),
            _ => Err(rejected(response).await),
        }
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        let response = self
            .request(reqwest::Method::POST, "auth/v1/logout", Some(access_token))?
            .send()
            .await?;

        match response.status() {
            // An already-dead session is as signed out as it gets
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(()),
            _ => Err(rejected(response).await),
        }
    }
}

#[async_trait]
impl DataStore for HostedBackend {
    async fn insert_item(&self, caller: &Caller, item: NewItem) -> Result<Item, BackendError> {
        let response = self
            .rest(reqwest::Method::POST, "rest/v1/items?select=*", caller)?
            .header("Prefer", "return=representation")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(&json!({
                "title": item.title,
                "description": item.description,
                "priority": item.priority,
                "user_id": caller.user.id,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(response.json::<Item>().await?)
    }

    async fn select_items(&self, caller: &Caller, range: RowRange) -> Result<Vec<Item>, BackendError> {
        let response = self
            .rest(reqwest::Method::GET, "rest/v1/items?select=*&order=created_at.asc", caller)?
            .header("Range-Unit", "items")
            .header(header::RANGE, range.header_value())
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(response.json::<Vec<Item>>().await?),
            // Offset past the last row
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(Vec::new()),
            _ => Err(rejected(response).await),
        }
    }

    async fn select_profile(&self, caller: &Caller) -> Result<Option<Profile>, BackendError> {
        let path = format!("rest/v1/profiles?select=*&id=eq.{}", caller.user.id);
        let response = self
            .rest(reqwest::Method::GET, &path, caller)?
            .header(header::ACCEPT, SINGLE_OBJECT)
            .send()
            .await?;

        match response.status() {
            s if s.is_success() => Ok(Some(response.json::<Profile>().await?)),
            // Singular response with zero rows
            StatusCode::NOT_ACCEPTABLE => Ok(None),
            _ => Err(rejected(response).await),
        }
    }

    async fn upsert_profile(&self, caller: &Caller, update: ProfileUpdate) -> Result<Profile, BackendError> {
        let response = self
            .rest(reqwest::Method::POST, "rest/v1/profiles?select=*", caller)?
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(&json!({
                "id": caller.user.id,
                "full_name": update.full_name,
                "avatar_url": update.avatar_url,
                "bio": update.bio,
                "updated_at": Utc::now(),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejected(response).await);
        }
        Ok(response.json::<Profile>().await?)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        let response = self.request(reqwest::Method::GET, "auth/v1/health", None)?.send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(BackendError::Unavailable(error_message(response).await))
        }
    }
}
