use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuthProvider, BackendError, Caller, DataStore, ROTATION_GRACE_SECS};
use crate::auth::password::{hash_password, verify_password};
use crate::auth::{TokenIssuer, TokenKind};
use crate::models::{Item, NewAccount, NewItem, Profile, ProfileUpdate, RowRange, Session, SessionUser};

struct Account {
    user: SessionUser,
    password_hash: String,
}

struct Revocation {
    at: DateTime<Utc>,
    rotated: bool,
}

impl Revocation {
    fn now(rotated: bool) -> Self {
        Self { at: Utc::now(), rotated }
    }
}

#[derive(Default)]
struct MemoryState {
    /// Keyed by lowercased email
    accounts: HashMap<String, Account>,
    /// Insertion order is creation order
    items: Vec<Item>,
    profiles: HashMap<Uuid, Profile>,
    revoked_sessions: HashMap<Uuid, Revocation>,
}

/// In-process auth and data store. Nothing survives a restart.
pub struct MemoryBackend {
    issuer: TokenIssuer,
    bcrypt_cost: u32,
    state: RwLock<MemoryState>,
}

impl MemoryBackend {
    pub fn new(issuer: TokenIssuer, bcrypt_cost: u32) -> Self {
        Self {
            issuer,
            bcrypt_cost,
            state: RwLock::new(MemoryState::default()),
        }
    }

    async fn live_user(&self, user_id: Uuid, sid: Uuid) -> Option<SessionUser> {
        let state = self.state.read().await;
        if state.revoked_sessions.contains_key(&sid) {
            return None;
        }
        state
            .accounts
            .values()
            .find(|account| account.user.id == user_id)
            .map(|account| account.user.clone())
    }
}

#[async_trait]
impl AuthProvider for MemoryBackend {
    async fn get_user(&self, access_token: &str) -> Result<Option<SessionUser>, BackendError> {
        let Some(claims) = self.issuer.verify(access_token, TokenKind::Access) else {
            return Ok(None);
        };
        Ok(self.live_user(claims.sub, claims.sid).await)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError> {
        let (user, hash) = {
            let state = self.state.read().await;
            match state.accounts.get(&email.trim().to_lowercase()) {
                Some(account) => (account.user.clone(), account.password_hash.clone()),
                None => return Err(BackendError::InvalidCredentials),
            }
        };

        if !verify_password(password, &hash).await? {
            return Err(BackendError::InvalidCredentials);
        }

        Ok(self.issuer.issue(&user)?)
    }

    async fn sign_up(&self, account: NewAccount) -> Result<SessionUser, BackendError> {
        let key = account.email.trim().to_lowercase();
        if self.state.read().await.accounts.contains_key(&key) {
            return Err(BackendError::AlreadyRegistered);
        }

        let password_hash = hash_password(&account.password, self.bcrypt_cost).await?;
        let user = SessionUser {
            id: Uuid::new_v4(),
            email: account.email.trim().to_string(),
            name: account.name,
        };

        let mut state = self.state.write().await;
        // Checked again: another sign-up may have won while we were hashing
        if state.accounts.contains_key(&key) {
            return Err(BackendError::AlreadyRegistered);
        }
        state.accounts.insert(
            key,
            Account {
                user: user.clone(),
                password_hash,
            },
        );
        Ok(user)
    }

    async fn refresh_session(&self, refresh_token: &str) -> Result<Option<Session>, BackendError> {
        let Some(claims) = self.issuer.verify(refresh_token, TokenKind::Refresh) else {
            return Ok(None);
        };
        let Some(user) = self.live_user(claims.sub, claims.sid).await else {
            return Ok(None);
        };

        // Rotate: the old pair stops working
        self.state
            .write()
            .await
            .revoked_sessions
            .insert(claims.sid, Revocation::now(true));
        Ok(Some(self.issuer.issue(&user)?))
    }

    async fn recently_rotated(&self, refresh_token: &str) -> Result<bool, BackendError> {
        let Some(claims) = self.issuer.verify(refresh_token, TokenKind::Refresh) else {
            return Ok(false);
        };
        let cutoff = Utc::now() - Duration::seconds(ROTATION_GRACE_SECS);
        let state = self.state.read().await;
        Ok(state
            .revoked_sessions
            .get(&claims.sid)
            .map(|revocation| revocation.rotated && revocation.at > cutoff)
            .unwrap_or(false))
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), BackendError> {
        if let Some(sid) = self.issuer.session_id(access_token) {
            self.state
                .write()
                .await
                .revoked_sessions
                .insert(sid, Revocation::now(false));
        }
        Ok(())
    }
}

#[async_trait]
impl DataStore for MemoryBackend {
    async fn insert_item(&self, caller: &Caller, item: NewItem) -> Result<Item, BackendError> {
        let item = item.into_item(caller.user.id);
        self.state.write().await.items.push(item.clone());
        Ok(item)
    }

    async fn select_items(&self, caller: &Caller, range: RowRange) -> Result<Vec<Item>, BackendError> {
        let state = self.state.read().await;
        Ok(state
            .items
            .iter()
            .filter(|item| item.user_id == caller.user.id)
            .skip(usize::try_from(range.offset()).unwrap_or(usize::MAX))
            .take(usize::try_from(range.len()).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn select_profile(&self, caller: &Caller) -> Result<Option<Profile>, BackendError> {
        Ok(self.state.read().await.profiles.get(&caller.user.id).cloned())
    }

    async fn upsert_profile(&self, caller: &Caller, update: ProfileUpdate) -> Result<Profile, BackendError> {
        let profile = update.into_profile(caller.user.id);
        self.state
            .write()
            .await
            .profiles
            .insert(caller.user.id, profile.clone());
        Ok(profile)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
