//! Per-request session resolution and refresh.
//!
//! Runs in front of every route the matcher admits. The resolved caller is
//! stored in request extensions for the auth gates and handlers; refreshed or
//! dead sessions are reflected back to the browser as `Set-Cookie` headers.

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, warn};

use crate::app::AppState;
use crate::backend::{AuthProvider, Caller};
use crate::config::SecurityConfig;
use crate::models::Session;

pub const ACCESS_COOKIE: &str = "access-token";
pub const REFRESH_COOKIE: &str = "refresh-token";

/// Path prefixes (after the leading '/') that never touch the session
const EXCLUDED_PREFIXES: &[&str] = &["_next", "assets/", "api/health"];

/// Whether the session middleware applies to `path`. Static files (any path
/// with a dot) and the health check are skipped.
pub fn refreshes_session(path: &str) -> bool {
    let rest = path.strip_prefix('/').unwrap_or(path);
    if rest.contains('.') {
        return false;
    }
    !EXCLUDED_PREFIXES.iter().any(|prefix| rest.starts_with(prefix))
}

/// Value of cookie `name` from the request's `Cookie` headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn cookie(name: &str, value: &str, max_age: i64, security: &SecurityConfig) -> String {
    let secure = if security.secure_cookies { "; Secure" } else { "" };
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        name,
        value,
        max_age.max(0),
        secure
    )
}

/// `Set-Cookie` values that persist `session` in the browser
pub fn session_cookies(session: &Session, security: &SecurityConfig) -> [String; 2] {
    let access_age = session.expires_at - Utc::now().timestamp();
    [
        cookie(ACCESS_COOKIE, &session.access_token, access_age, security),
        cookie(REFRESH_COOKIE, &session.refresh_token, security.refresh_token_ttl_secs, security),
    ]
}

/// `Set-Cookie` values that delete the session cookies
pub fn clear_session_cookies(security: &SecurityConfig) -> [String; 2] {
    [
        cookie(ACCESS_COOKIE, "", 0, security),
        cookie(REFRESH_COOKIE, "", 0, security),
    ]
}

#[derive(Debug, Default)]
struct SessionTokens {
    access: Option<String>,
    refresh: Option<String>,
    from_cookies: bool,
}

impl SessionTokens {
    /// A Bearer header wins over the access cookie
    fn from_headers(headers: &HeaderMap) -> Self {
        let bearer = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let cookie_access = read_cookie(headers, ACCESS_COOKIE);
        let refresh = read_cookie(headers, REFRESH_COOKIE);
        let from_cookies = cookie_access.is_some() || refresh.is_some();

        Self {
            access: bearer.or(cookie_access),
            refresh,
            from_cookies,
        }
    }

    fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

enum Resolution {
    Anonymous,
    Authenticated(Caller),
    Refreshed(Session),
    /// Cookies were sent but no longer identify anyone
    Stale,
}

async fn resolve(auth: &dyn AuthProvider, tokens: &SessionTokens) -> Resolution {
    if let Some(token) = &tokens.access {
        match auth.get_user(token).await {
            Ok(Some(user)) => return Resolution::Authenticated(Caller::new(user, token.clone())),
            Ok(None) => debug!("Access token rejected"),
            Err(e) => {
                warn!("Session lookup failed: {}", e);
                return Resolution::Anonymous;
            }
        }
    }

    if let Some(refresh) = &tokens.refresh {
        match auth.refresh_session(refresh).await {
            Ok(Some(session)) => return Resolution::Refreshed(session),
            Ok(None) => {
                // A parallel request won the refresh; its cookies are already on the way
                if matches!(auth.recently_rotated(refresh).await, Ok(true)) {
                    debug!("Refresh token was rotated moments ago; keeping cookies");
                    return Resolution::Anonymous;
                }
                debug!("Refresh token rejected");
            }
            Err(e) => {
                warn!("Session refresh failed: {}", e);
                return Resolution::Anonymous;
            }
        }
    }

    if tokens.from_cookies {
        Resolution::Stale
    } else {
        Resolution::Anonymous
    }
}

/// Resolve the caller for this request, refreshing the session if needed
pub async fn update_session(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    if !refreshes_session(request.uri().path()) {
        return next.run(request).await;
    }

    let tokens = SessionTokens::from_headers(request.headers());
    if tokens.is_empty() {
        return next.run(request).await;
    }

    let security = &state.config.security;
    let cookies = match resolve(state.backend.auth.as_ref(), &tokens).await {
        Resolution::Anonymous => None,
        Resolution::Authenticated(caller) => {
            request.extensions_mut().insert(caller);
            None
        }
        Resolution::Refreshed(session) => {
            debug!("Refreshed session for {}", session.user.email);
            let cookies = session_cookies(&session, security);
            request.extensions_mut().insert(Caller::from(session));
            Some(cookies)
        }
        Resolution::Stale => Some(clear_session_cookies(security)),
    };

    let mut response = next.run(request).await;

    if let Some(cookies) = cookies {
        // Handlers that set the session themselves (sign-in, sign-out) have the last word
        let handler_owns_session = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.starts_with(ACCESS_COOKIE) || v.starts_with(REFRESH_COOKIE));

        if !handler_owns_session {
            for value in cookies {
                match HeaderValue::from_str(&value) {
                    Ok(value) => {
                        response.headers_mut().append(SET_COOKIE, value);
                    }
                    Err(e) => warn!("Dropping unencodable session cookie: {}", e),
                }
            }
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenIssuer;
    use crate::backend::MemoryBackend;
    use crate::config::AppConfig;
    use crate::models::{NewAccount, SessionUser};
    use uuid::Uuid;

    async fn signed_in(backend: &MemoryBackend) -> Session {
        backend
            .sign_up(NewAccount {
                email: "ada@example.com".to_string(),
                password: "password123".to_string(),
                name: None,
            })
            .await
            .unwrap();
        backend
            .sign_in_with_password("ada@example.com", "password123")
            .await
            .unwrap()
    }

    fn cookie_tokens(session: &Session) -> SessionTokens {
        SessionTokens {
            access: Some(session.access_token.clone()),
            refresh: Some(session.refresh_token.clone()),
            from_cookies: true,
        }
    }

    #[test]
    fn matcher_skips_assets_and_health() {
        assert!(refreshes_session("/"));
        assert!(refreshes_session("/dashboard"));
        assert!(refreshes_session("/api/items"));
        assert!(refreshes_session("/login"));

        assert!(!refreshes_session("/_next/static/chunk"));
        assert!(!refreshes_session("/favicon.ico"));
        assert!(!refreshes_session("/assets/app.css"));
        assert!(!refreshes_session("/api/health"));
        assert!(!refreshes_session("/api/healthz"));
    }

    #[test]
    fn reads_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; access-token=abc.def; refresh-token="));
        assert_eq!(read_cookie(&headers, ACCESS_COOKIE).as_deref(), Some("abc.def"));
        assert_eq!(read_cookie(&headers, REFRESH_COOKIE), None);
        assert_eq!(read_cookie(&headers, "missing"), None);
    }

    #[test]
    fn bearer_header_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        headers.insert(COOKIE, HeaderValue::from_static("access-token=from-cookie; refresh-token=r"));

        let tokens = SessionTokens::from_headers(&headers);
        assert_eq!(tokens.access.as_deref(), Some("from-header"));
        assert_eq!(tokens.refresh.as_deref(), Some("r"));
        assert!(tokens.from_cookies);
    }

    #[test]
    fn session_cookie_attributes() {
        let mut security = AppConfig::testing().security;
        let session = Session {
            access_token: "a.b.c".to_string(),
            refresh_token: "r.s.t".to_string(),
            expires_at: Utc::now().timestamp() + 600,
            user: SessionUser {
                id: Uuid::new_v4(),
                email: "a@example.com".to_string(),
                name: None,
            },
        };

        let [access, refresh] = session_cookies(&session, &security);
        assert!(access.starts_with("access-token=a.b.c; Path=/; HttpOnly; SameSite=Lax; Max-Age="));
        assert!(refresh.contains(&format!("Max-Age={}", security.refresh_token_ttl_secs)));
        assert!(!access.contains("Secure"));

        security.secure_cookies = true;
        let [cleared, _] = clear_session_cookies(&security);
        assert_eq!(cleared, "access-token=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0; Secure");
    }

    #[tokio::test]
    async fn losing_a_refresh_race_keeps_cookies() {
        let backend = MemoryBackend::new(TokenIssuer::new("test", 60, 600).unwrap(), 4);
        let session = signed_in(&backend).await;
        let tokens = cookie_tokens(&session);

        assert!(matches!(resolve(&backend, &tokens).await, Resolution::Authenticated(_)));
        backend.refresh_session(&session.refresh_token).await.unwrap().unwrap();
        assert!(matches!(resolve(&backend, &tokens).await, Resolution::Anonymous));
    }

    #[tokio::test]
    async fn signed_out_cookies_are_stale() {
        let backend = MemoryBackend::new(TokenIssuer::new("test", 60, 600).unwrap(), 4);
        let session = signed_in(&backend).await;

        backend.sign_out(&session.access_token).await.unwrap();
        assert!(matches!(resolve(&backend, &cookie_tokens(&session)).await, Resolution::Stale));
    }
}
