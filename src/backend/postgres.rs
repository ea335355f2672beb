use std::time::Duration;

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use super::{AuthProvider, BackendError, Caller, DataStore, ROTATION_GRACE_SECS};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::{TokenIssuer, TokenKind};
use crate::config::AppConfig;
use crate::models::{Item, NewAccount, NewItem, Priority, Profile, ProfileUpdate, RowRange, Session, SessionUser};

/// Tables are created idempotently by `migrate`
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            UUID PRIMARY KEY,
        email         TEXT NOT NULL,
        name          TEXT,
        password_hash TEXT NOT NULL,
        created_at    TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS users_email_key ON users (lower(email))",
    r#"
    CREATE TABLE IF NOT EXISTS revoked_sessions (
        sid        UUID PRIMARY KEY,
        rotated    BOOLEAN NOT NULL DEFAULT false,
        revoked_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "ALTER TABLE revoked_sessions ADD COLUMN IF NOT EXISTS rotated BOOLEAN NOT NULL DEFAULT false",
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id          UUID PRIMARY KEY,
        user_id     UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        title       TEXT NOT NULL CHECK (char_length(title) BETWEEN 1 AND 100),
        description TEXT,
        priority    TEXT NOT NULL DEFAULT 'medium' CHECK (priority IN ('low', 'medium', 'high')),
        created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS items_user_created_idx ON items (user_id, created_at, id)",
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        id         UUID PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
        full_name  TEXT NOT NULL CHECK (char_length(full_name) BETWEEN 1 AND 100),
        avatar_url TEXT,
        bio        TEXT CHECK (bio IS NULL OR char_length(bio) <= 500),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

const UNIQUE_VIOLATION: &str = "23505";

/// Auth and data directly in PostgreSQL. Row-level security is applied by
/// scoping every statement to the caller's id.
pub struct PostgresBackend {
    pool: PgPool,
    issuer: TokenIssuer,
    bcrypt_cost: u32,
}

impl PostgresBackend {
    pub fn new(pool: PgPool, issuer: TokenIssuer, bcrypt_cost: u32) -> Self {
        Self {
            pool,
            issuer,
            bcrypt_cost,
        }
    }

    pub async fn connect(config: &AppConfig) -> Result<Self, BackendError> {
        let url = config
            .backend
            .database_url
            .as_deref()
            .ok_or_else(|| BackendError::Unavailable("DATABASE_URL is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.backend.max_connections)
            .acquire_timeout(Duration::from_secs(config.backend.connection_timeout))
            .connect(url)
            .await?;

        info!("Connected to PostgreSQL ({} max connections)", config.backend.max_connections);

        Ok(Self::new(
            pool,
            TokenIssuer::from_config(&config.security)?,
            config.security.bcrypt_cost,
        ))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn ensure_schema(&self) -> Result<(), BackendError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Database schema is up to date");
        Ok(())
    }

    async fn is_revoked(&self, sid: Uuid) -> Result<bool, BackendError> {
        let revoked: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM revoked_sessions WHERE sid = $1)")
            .bind(sid)
            .fetch_one(&self.pool)
            .await?;
        Ok(revoked)
    }

    /// Returns false if the session was already revoked. `rotated` marks a
    /// refresh rather than a sign-out.
    async fn revoke(&self, sid: Uuid, rotated: bool) -> Result<bool, BackendError> {
        let result = sqlx::query(
            "INSERT INTO revoked_sessions (sid, rotated) VALUES ($1, $2) ON CONFLICT (sid) DO NOTHING",
        )
        .bind(sid)
        .bind(rotated)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<SessionUser>, BackendError> {
        let row = sqlx::query("SELECT id, email, name FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }
}

fn user_from_row(row: &PgRow) -> Result<SessionUser, BackendError> {
    Ok(SessionUser {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, BackendError> {
    let priority: String = row.try_get("priority")?;
    Ok(Item {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        priority: priority.parse::<Priority>().map_err(BackendError::Rejected)?,
        created_at: row.try_get("created_at")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<Profile, BackendError> {
    Ok(Profile {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        avatar_url: row.try_get("avatar_url")?,
        bio: row.try_get("bio")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == UNIQUE_VIOLATION)
        .unwrap_or(false)
}

/// LIMIT/OFFSET are BIGINT on the wire
fn row_bound(name: &str, value: u64) -> Result<i64, BackendError> {
    i64::try_from(value).map_err(|_| BackendError::Rejected(format!("{} {} is out of range", name, value)))
}

/// Constraint violations carry a useful message; pass it through as-is
fn store_error(err: sqlx::Error) -> BackendError {
    match err.as_database_error() {
        Some(db) => BackendError::Rejected(db.message().to_string()),
        None => BackendError::Sqlx(err),
    }
}

#[async_trait]
impl AuthProvider for PostgresBackend {
    async fn get_user(&self, access_token: &str) -> Result<Option<SessionUser>, BackendError> {
        let Some(claims) = self.issuer.verify(access_token, TokenKind::Access) else {
            return Ok(None);
        };
        if self.is_revoked(claims.sid).await? {
            return Ok(None);
        }
        self.find_user(claims.sub).await
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let row = sqlx::query("SELECT id, email, name, password_hash FROM users WHERE lower(email) = lower($1)")
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Err(BackendError::InvalidCredentials);
        };
        let hash: String = row.try_get("password_hash")?;
        if !verify_password(password, &hash).await? {
            return Err(BackendError::InvalidCredentials);
        }

        let user = user_from_row(&row)?;
        Ok(self.issuer.issue(&user)?)
    }

    async fn sign_up(&self, account: NewAccount) -> Result<SessionUser, BackendError> {
        let password_hash = hash_password(&account.password, self.bcrypt_cost).await?;

        let row = sqlx::query(
            "INSERT INTO users (id, email, name, password_hash)
             VALUES ($1, $2, $3, $4)
             RETURNING id, email, name",
        )
        .bind(Uuid::new_v4())
        .bind(account.email.trim())
        .bind(&account.name)
        .bind(&password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                BackendError::AlreadyRegistered
            } else {
                BackendError::Sqlx(e)
            }
        })?;

        user_from_row(&row)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Option<Session>, BackendError> {
        let Some(claims) = self.issuer.verify(refresh_token, TokenKind::Refresh) else {
            return Ok(None);
        };
        // Revoking first makes each refresh token single-use
        if !self.revoke(claims.sid, true).await? {
            return Ok(None);
        }
        let Some(user) = self.find_user(claims.sub).await? else {
            return Ok(None);
        };
        Ok(Some(self.issuer.issue(&user)?))
    }

    async fn recently_rotated(&self, refresh_token: &str) -> Result<bool, BackendError> {
        let Some(claims) = self.issuer.verify(refresh_token, TokenKind::Refresh) else {
            return Ok(false);
        };
        let rotated: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                SELECT 1 FROM revoked_sessions
                WHERE sid = $1 AND rotated AND revoked_at > now() - make_interval(secs => $2)
            )",
        )
        .bind(claims.sid)
        .bind(ROTATION_GRACE_SECS as f64)
        .fetch_one(&self.pool)
        .await?;
        Ok(rotated)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        if let Some(sid) = self.issuer.session_id(access_token) {
            self.revoke(sid, false).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for PostgresBackend {
    async fn insert_item(&self, caller: &Caller, item: NewItem) -> Result<Item, BackendError> {
        let row = sqlx::query(
            "INSERT INTO items (id, user_id, title, description, priority)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING id, user_id, title, description, priority, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(caller.user.id)
        .bind(&item.title)
        .bind(&item.description)
        .bind(item.priority.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        item_from_row(&row)
    }

    async fn select_items(&self, caller: &Caller, range: RowRange) -> Result<Vec<Item>, BackendError> {
        let limit = row_bound("limit", range.len())?;
        let offset = row_bound("offset", range.offset())?;
        let rows = sqlx::query(
            "SELECT id, user_id, title, description, priority, created_at
             FROM items
             WHERE user_id = $1
             ORDER BY created_at, id
             LIMIT $2 OFFSET $3",
        )
        .bind(caller.user.id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.iter().map(item_from_row).collect()
    }

    async fn select_profile(&self, caller: &Caller) -> Result<Option<Profile>, BackendError> {
        let row = sqlx::query("SELECT id, full_name, avatar_url, bio, updated_at FROM profiles WHERE id = $1")
            .bind(caller.user.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;
        row.as_ref().map(profile_from_row).transpose()
    }

    async fn upsert_profile(&self, caller: &Caller, update: ProfileUpdate) -> Result<Profile, BackendError> {
        let row = sqlx::query(
            "INSERT INTO profiles (id, full_name, avatar_url, bio, updated_at)
             VALUES ($1, $2, $3, $4, now())
             ON CONFLICT (id) DO UPDATE
             SET full_name = EXCLUDED.full_name,
                 avatar_url = EXCLUDED.avatar_url,
                 bio = EXCLUDED.bio,
                 updated_at = now()
             RETURNING id, full_name, avatar_url, bio, updated_at",
        )
        .bind(caller.user.id)
        .bind(&update.full_name)
        .bind(&update.avatar_url)
        .bind(&update.bio)
        .fetch_one(&self.pool)
        .await
        .map_err(store_error)?;

        profile_from_row(&row)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
