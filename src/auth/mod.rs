pub mod password;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::SecurityConfig;
use crate::models::{Session, SessionUser};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Session id shared by the access/refresh pair; revoking it kills both
    pub sid: Uuid,
    pub kind: TokenKind,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    pub fn user(&self) -> SessionUser {
        SessionUser {
            id: self.sub,
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("JWT secret not configured")]
    MissingSecret,

    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Issues and verifies signed access/refresh token pairs
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_ttl: Duration::seconds(access_ttl_secs),
            refresh_ttl: Duration::seconds(refresh_ttl_secs),
        })
    }

    pub fn from_config(security: &SecurityConfig) -> Result<Self, TokenError> {
        Self::new(
            &security.jwt_secret,
            security.access_token_ttl_secs,
            security.refresh_token_ttl_secs,
        )
    }

    /// Start a new session for `user`
    pub fn issue(&self, user: &SessionUser) -> Result<Session, TokenError> {
        let sid = Uuid::new_v4();
        let now = Utc::now();
        let access_exp = (now + self.access_ttl).timestamp();

        let access_token = self.sign(user, sid, TokenKind::Access, now.timestamp(), access_exp)?;
        let refresh_token = self.sign(
            user,
            sid,
            TokenKind::Refresh,
            now.timestamp(),
            (now + self.refresh_ttl).timestamp(),
        )?;

        Ok(Session {
            access_token,
            refresh_token,
            expires_at: access_exp,
            user: user.clone(),
        })
    }

    fn sign(
        &self,
        user: &SessionUser,
        sid: Uuid,
        kind: TokenKind,
        iat: i64,
        exp: i64,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            sid,
            kind,
            exp,
            iat,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding_key)?)
    }

    /// Claims of a well-signed, unexpired token of the expected kind
    pub fn verify(&self, token: &str, kind: TokenKind) -> Option<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| tracing::debug!("Rejected {:?} token: {}", kind, e))
            .ok()?
            .claims;

        (claims.kind == kind).then_some(claims)
    }

    /// Session id of a token regardless of expiry, for revocation on sign-out
    pub fn session_id(&self, token: &str) -> Option<Uuid> {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        decode::<Claims>(token, &self.decoding_key, &validation)
            .ok()
            .map(|data| data.claims.sid)
    }
}
