//! Collaborators that own authentication and persistence.
//!
//! Handlers only ever talk to [`AuthProvider`] and [`DataStore`]; which
//! implementation answers is a startup decision ([`Backend::connect`]).

pub mod hosted;
pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::auth::{TokenError, TokenIssuer};
use crate::config::{AppConfig, BackendKind};
use crate::models::{Item, NewAccount, NewItem, Profile, ProfileUpdate, RowRange, Session, SessionUser};

/// How long a rotated-out refresh token still counts as a lost race
/// instead of a dead session
pub const ROTATION_GRACE_SECS: i64 = 10;

pub use hosted::HostedBackend;
pub use memory::MemoryBackend;
pub use postgres::PostgresBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("User already registered")]
    AlreadyRegistered,

    /// The store refused the request; the message is the store's own
    #[error("{0}")]
    Rejected(String),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Hash(#[from] bcrypt::BcryptError),
}

/// An authenticated caller: who they are plus the token that proved it.
/// Stores that enforce row-level security server-side need the token.
#[derive(Debug, Clone)]
pub struct Caller {
    pub user: SessionUser,
    pub access_token: String,
}

impl Caller {
    pub fn new(user: SessionUser, access_token: impl Into<String>) -> Self {
        Self {
            user,
            access_token: access_token.into(),
        }
    }
}

impl From<Session> for Caller {
    fn from(session: Session) -> Self {
        Self {
            user: session.user,
            access_token: session.access_token,
        }
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Who holds `access_token`, if anyone
    async fn get_user(&self, access_token: &str) -> Result<Option<SessionUser>, BackendError>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;

    async fn sign_up(&self, account: NewAccount) -> Result<SessionUser, BackendError>;

    /// Exchange a refresh token for a new session; `None` if it is no longer valid
    async fn refresh_session(&self, refresh_token: &str) -> Result<Option<Session>, BackendError>;

    /// Whether `refresh_token` was spent by a refresh less than
    /// [`ROTATION_GRACE_SECS`] ago, rather than signed out or forged
    async fn recently_rotated(&self, _refresh_token: &str) -> Result<bool, BackendError> {
        Ok(false)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError>;
}

/// Row access on behalf of a caller. Every method only sees the caller's rows.
#[async_trait]
pub trait DataStore: Send + Sync {
    async fn insert_item(&self, caller: &Caller, item: NewItem) -> Result<Item, BackendError>;

    async fn select_items(&self, caller: &Caller, range: RowRange) -> Result<Vec<Item>, BackendError>;

    async fn select_profile(&self, caller: &Caller) -> Result<Option<Profile>, BackendError>;

    async fn upsert_profile(&self, caller: &Caller, update: ProfileUpdate) -> Result<Profile, BackendError>;

    async fn ping(&self) -> Result<(), BackendError>;
}

#[derive(Clone)]
pub struct Backend {
    pub kind: BackendKind,
    pub auth: Arc<dyn AuthProvider>,
    pub store: Arc<dyn DataStore>,
}

impl Backend {
    pub fn new(kind: BackendKind, auth: Arc<dyn AuthProvider>, store: Arc<dyn DataStore>) -> Self {
        Self { kind, auth, store }
    }

    /// One object answering both roles
    pub fn unified<B>(kind: BackendKind, backend: B) -> Self
    where
        B: AuthProvider + DataStore + 'static,
    {
        let shared = Arc::new(backend);
        Self {
            kind,
            auth: shared.clone(),
            store: shared,
        }
    }

    pub fn memory(config: &AppConfig) -> Result<Self, BackendError> {
        let issuer = TokenIssuer::from_config(&config.security)?;
        Ok(Self::unified(
            BackendKind::Memory,
            MemoryBackend::new(issuer, config.security.bcrypt_cost),
        ))
    }

    /// Build the backend selected by `config.backend.kind`
    pub async fn connect(config: &AppConfig) -> Result<Self, BackendError> {
        let backend = match config.backend.kind {
            BackendKind::Memory => Self::memory(config)?,
            BackendKind::Postgres => {
                let pg = PostgresBackend::connect(config).await?;
                Self::unified(BackendKind::Postgres, pg)
            }
            BackendKind::Hosted => {
                let hosted = HostedBackend::from_config(&config.backend)?;
                Self::unified(BackendKind::Hosted, hosted)
            }
        };

        info!("Using {} backend", backend.kind.as_str());
        Ok(backend)
    }
}
