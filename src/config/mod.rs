use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use thiserror::Error;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub api: ApiConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served under `/assets`, if any
    pub static_dir: Option<String>,
}

/// Which collaborator implementation answers auth and data calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    Memory,
    Postgres,
    Hosted,
}

impl BackendKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(BackendKind::Memory),
            "postgres" | "postgresql" | "pg" => Some(BackendKind::Postgres),
            "hosted" | "baas" | "supabase" => Some(BackendKind::Hosted),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Postgres => "postgres",
            BackendKind::Hosted => "hosted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
    /// Base URL of the hosted auth/rest service
    pub hosted_url: Option<String>,
    pub hosted_anon_key: Option<String>,
    pub hosted_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub max_request_size_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(skip_serializing)]
    pub jwt_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub bcrypt_cost: u32,
    pub secure_cookies: bool,
    pub enable_cors: bool,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("HOST") {
            self.server.host = v;
        }
        if let Some(port) = env::var("ITEMS_API_PORT")
            .ok()
            .or_else(|| env::var("PORT").ok())
            .and_then(|v| v.parse::<u16>().ok())
        {
            self.server.port = port;
        }
        if let Ok(v) = env::var("STATIC_DIR") {
            self.server.static_dir = Some(v).filter(|s| !s.is_empty());
        }

        // Backend overrides
        if let Ok(v) = env::var("BACKEND") {
            self.backend.kind = BackendKind::parse(&v).unwrap_or(self.backend.kind);
        }
        if let Ok(v) = env::var("DATABASE_URL") {
            self.backend.database_url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.backend.max_connections = v.parse().unwrap_or(self.backend.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.backend.connection_timeout = v.parse().unwrap_or(self.backend.connection_timeout);
        }
        if let Ok(v) = env::var("BAAS_URL") {
            self.backend.hosted_url = Some(v);
        }
        if let Ok(v) = env::var("BAAS_ANON_KEY") {
            self.backend.hosted_anon_key = Some(v);
        }
        if let Ok(v) = env::var("BAAS_TIMEOUT_SECS") {
            self.backend.hosted_timeout_secs = v.parse().unwrap_or(self.backend.hosted_timeout_secs);
        }

        // API overrides
        if let Ok(v) = env::var("API_DEFAULT_PAGE_SIZE") {
            self.api.default_page_size = v.parse().unwrap_or(self.api.default_page_size);
        }
        if let Ok(v) = env::var("API_MAX_PAGE_SIZE") {
            self.api.max_page_size = v.parse().unwrap_or(self.api.max_page_size);
        }
        if let Ok(v) = env::var("API_MAX_REQUEST_SIZE_BYTES") {
            self.api.max_request_size_bytes = v.parse().unwrap_or(self.api.max_request_size_bytes);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_ACCESS_TOKEN_TTL_SECS") {
            self.security.access_token_ttl_secs = v.parse().unwrap_or(self.security.access_token_ttl_secs);
        }
        if let Ok(v) = env::var("SECURITY_REFRESH_TOKEN_TTL_SECS") {
            self.security.refresh_token_ttl_secs = v.parse().unwrap_or(self.security.refresh_token_ttl_secs);
        }
        if let Ok(v) = env::var("SECURITY_BCRYPT_COST") {
            self.security.bcrypt_cost = v.parse().unwrap_or(self.security.bcrypt_cost);
        }
        if let Ok(v) = env::var("SECURITY_SECURE_COOKIES") {
            self.security.secure_cookies = v.parse().unwrap_or(self.security.secure_cookies);
        }
        if let Ok(v) = env::var("SECURITY_ENABLE_CORS") {
            self.security.enable_cors = v.parse().unwrap_or(self.security.enable_cors);
        }
        if let Ok(v) = env::var("SECURITY_CORS_ORIGINS") {
            self.security.cors_origins = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        self
    }

    /// Check that the selected backend has everything it needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.default_page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "API_DEFAULT_PAGE_SIZE",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.api.max_page_size < self.api.default_page_size {
            return Err(ConfigError::Invalid {
                field: "API_MAX_PAGE_SIZE",
                reason: format!("must be at least the default page size ({})", self.api.default_page_size),
            });
        }

        match self.backend.kind {
            BackendKind::Memory | BackendKind::Postgres => {
                if self.security.jwt_secret.is_empty() {
                    return Err(ConfigError::Missing("JWT_SECRET"));
                }
                if !(4..=31).contains(&self.security.bcrypt_cost) {
                    return Err(ConfigError::Invalid {
                        field: "SECURITY_BCRYPT_COST",
                        reason: format!("{} is outside 4..=31", self.security.bcrypt_cost),
                    });
                }
            }
            BackendKind::Hosted => {
                let raw = self
                    .backend
                    .hosted_url
                    .as_deref()
                    .ok_or(ConfigError::Missing("BAAS_URL"))?;
                url::Url::parse(raw).map_err(|e| ConfigError::Invalid {
                    field: "BAAS_URL",
                    reason: e.to_string(),
                })?;
                if self.backend.hosted_anon_key.as_deref().unwrap_or("").is_empty() {
                    return Err(ConfigError::Missing("BAAS_ANON_KEY"));
                }
            }
        }

        if self.backend.kind == BackendKind::Postgres && self.backend.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        Ok(())
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                static_dir: None,
            },
            backend: BackendConfig {
                kind: BackendKind::Memory,
                database_url: None,
                max_connections: 10,
                connection_timeout: 30,
                hosted_url: None,
                hosted_anon_key: None,
                hosted_timeout_secs: 30,
            },
            api: ApiConfig {
                default_page_size: 10,
                max_page_size: 1000,
                max_request_size_bytes: 1024 * 1024, // 1MB
            },
            security: SecurityConfig {
                jwt_secret: "development-only-secret".to_string(),
                access_token_ttl_secs: 60 * 60,
                refresh_token_ttl_secs: 60 * 60 * 24 * 7, // 1 week
                bcrypt_cost: 10,
                secure_cookies: false,
                enable_cors: true,
                cors_origins: vec![
                    "http://localhost:3000".to_string(),
                    "http://localhost:5173".to_string(),
                ],
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                static_dir: None,
            },
            backend: BackendConfig {
                kind: BackendKind::Postgres,
                database_url: None,
                max_connections: 20,
                connection_timeout: 10,
                hosted_url: None,
                hosted_anon_key: None,
                hosted_timeout_secs: 15,
            },
            api: ApiConfig {
                default_page_size: 10,
                max_page_size: 500,
                max_request_size_bytes: 512 * 1024,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                access_token_ttl_secs: 60 * 60,
                refresh_token_ttl_secs: 60 * 60 * 24,
                bcrypt_cost: 12,
                secure_cookies: true,
                enable_cors: true,
                cors_origins: vec!["https://staging.example.com".to_string()],
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                static_dir: None,
            },
            backend: BackendConfig {
                kind: BackendKind::Postgres,
                database_url: None,
                max_connections: 50,
                connection_timeout: 5,
                hosted_url: None,
                hosted_anon_key: None,
                hosted_timeout_secs: 10,
            },
            api: ApiConfig {
                default_page_size: 10,
                max_page_size: 100,
                max_request_size_bytes: 256 * 1024,
            },
            security: SecurityConfig {
                jwt_secret: String::new(),
                access_token_ttl_secs: 15 * 60,
                refresh_token_ttl_secs: 60 * 60 * 24,
                bcrypt_cost: 12,
                secure_cookies: true,
                enable_cors: true,
                cors_origins: vec!["https://app.example.com".to_string()],
            },
        }
    }

    /// Fast settings for test suites: memory backend, cheap hashing
    pub fn testing() -> Self {
        let mut config = Self::development();
        config.security.jwt_secret = "test-secret".to_string();
        config.security.bcrypt_cost = 4;
        config.api.max_page_size = 100;
        config
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

pub fn config() -> &'static AppConfig {
    &CONFIG
}
