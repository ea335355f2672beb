use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderValue, Method,
    },
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::warn;

use crate::backend::Backend;
use crate::cache::PageCache;
use crate::config::{AppConfig, SecurityConfig};
use crate::error::ApiError;
use crate::handlers::{actions, auth, health, items, pages, profile};
use crate::middleware::{require_page_user, require_user, update_session};

/// Page routes, shared by the router, redirects and views
pub mod paths {
    pub const HOME: &str = "/";
    pub const LOGIN: &str = "/login";
    pub const SIGNUP: &str = "/signup";
    pub const LOGOUT: &str = "/logout";
    pub const DASHBOARD: &str = "/dashboard";
    pub const PROFILE: &str = "/profile";
    pub const ERROR: &str = "/error";
}

/// Everything a handler may need, cloned into every request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: Backend,
    pub pages: Arc<PageCache>,
}

impl AppState {
    pub fn new(config: AppConfig, backend: Backend) -> Self {
        Self {
            config: Arc::new(config),
            backend,
            pages: Arc::new(PageCache::new()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let config = state.config.clone();

    let mut app = Router::new()
        .merge(api_routes())
        .merge(public_api_routes())
        .merge(page_routes())
        .merge(public_page_routes())
        .fallback(not_found);

    if let Some(dir) = &config.server.static_dir {
        app = app.nest_service("/assets", ServeDir::new(dir));
    }

    app.layer(middleware::from_fn_with_state(state.clone(), update_session))
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes))
        .layer(cors_layer(&config.security))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON API behind the session gate
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/items", get(items::list).post(items::create))
        .route("/items", get(items::list).post(items::create))
        .route("/api/profile", get(profile::get).put(profile::put))
        .route("/api/auth/whoami", get(auth::whoami))
        .route("/api/auth/logout", post(auth::logout))
        .route_layer(middleware::from_fn(require_user))
}

fn public_api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/health", get(health::health))
}

/// Pages that need a signed-in visitor
fn page_routes() -> Router<AppState> {
    Router::new()
        .route(paths::DASHBOARD, get(pages::dashboard))
        .route(paths::PROFILE, get(pages::profile))
        .route_layer(middleware::from_fn(require_page_user))
}

fn public_page_routes() -> Router<AppState> {
    Router::new()
        .route(paths::HOME, get(pages::home))
        .route(paths::LOGIN, get(pages::login).post(actions::sign_in))
        .route(paths::SIGNUP, get(pages::signup).post(actions::sign_up))
        .route(paths::LOGOUT, post(actions::sign_out))
        .route(paths::ERROR, get(pages::error))
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if !security.enable_cors {
        return CorsLayer::new();
    }
    if security.cors_origins.is_empty() || security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE])
        .allow_credentials(true)
}

async fn not_found() -> ApiError {
    ApiError::not_found("Not found")
}
