//! # Configuration
//!
//! Environment-driven settings for the HTTP server. `.env` is honored.
//! Provider credentials are read by `atelier-pay` itself.

use atelier_core::{Currency, ShopError, ShopResult};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

const DEV_JWT_SECRET: &str = "atelier-dev-access-secret";
const DEV_JWT_REFRESH_SECRET: &str = "atelier-dev-refresh-secret";

/// Output format for the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    /// `LOG_FORMAT=json` selects JSON lines
    pub fn from_env() -> Self {
        match var("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, used for provider callbacks and upload URLs
    pub base_url: String,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Absent means the in-memory store
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub bcrypt_cost: u32,
    pub store_currency: Currency,
    /// Prefix of app deep links, e.g. `atelier://`
    pub app_deep_link_base: String,
    pub upload_dir: PathBuf,
    pub seed_file: Option<PathBuf>,
    pub admin_password: Option<String>,
    pub log_format: LogFormat,
    pub fcm: Option<FcmConfig>,
}

/// Firebase Cloud Messaging credentials
#[derive(Debug, Clone)]
pub struct FcmConfig {
    pub project_id: String,
    pub access_token: String,
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T: FromStr>(name: &str, default: T) -> ShopResult<T> {
    match var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ShopError::Configuration(format!("{name} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> ShopResult<Self> {
        dotenvy::dotenv().ok();

        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".to_string());
        let production = environment == "production";

        let jwt_secret = secret("JWT_SECRET", DEV_JWT_SECRET, production)?;
        let jwt_refresh_secret = secret("JWT_REFRESH_SECRET", DEV_JWT_REFRESH_SECRET, production)?;

        let store_currency = match var("STORE_CURRENCY") {
            Some(raw) => raw.parse().map_err(ShopError::Configuration)?,
            None => Currency::USD,
        };

        let fcm = match (var("FCM_PROJECT_ID"), var("FCM_ACCESS_TOKEN")) {
            (Some(project_id), Some(access_token)) => Some(FcmConfig {
                project_id,
                access_token,
            }),
            _ => None,
        };

        let port = parsed("PORT", 8080u16)?;
        Ok(Self {
            host: var("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
            base_url: var("BASE_URL").unwrap_or_else(|| format!("http://localhost:{port}")),
            environment,
            database_url: var("DATABASE_URL"),
            database_max_connections: parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            jwt_secret,
            jwt_refresh_secret,
            access_token_ttl_secs: parsed("ACCESS_TOKEN_TTL_SECS", 86_400)?,
            refresh_token_ttl_secs: parsed("REFRESH_TOKEN_TTL_SECS", 604_800)?,
            bcrypt_cost: parsed("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            store_currency,
            app_deep_link_base: var("APP_DEEP_LINK_BASE").unwrap_or_else(|| "atelier://".to_string()),
            upload_dir: var("UPLOAD_DIR").map_or_else(|| PathBuf::from("uploads"), PathBuf::from),
            seed_file: var("SEED_FILE").map(PathBuf::from),
            admin_password: var("ADMIN_PASSWORD"),
            log_format: LogFormat::from_env(),
            fcm,
        })
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> ShopResult<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ShopError::Configuration(format!("invalid HOST/PORT: {e}")))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Settings for tests and local tooling: in-memory store, fast hashing
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            base_url: "http://localhost:8080".to_string(),
            environment: "test".to_string(),
            database_url: None,
            database_max_connections: 1,
            jwt_secret: DEV_JWT_SECRET.to_string(),
            jwt_refresh_secret: DEV_JWT_REFRESH_SECRET.to_string(),
            access_token_ttl_secs: 3_600,
            refresh_token_ttl_secs: 7_200,
            bcrypt_cost: 4,
            store_currency: Currency::USD,
            app_deep_link_base: "atelier://".to_string(),
            upload_dir: std::env::temp_dir().join("atelier-test-uploads"),
            seed_file: None,
            admin_password: None,
            log_format: LogFormat::Pretty,
            fcm: None,
        }
    }
}

fn secret(name: &str, dev_default: &str, production: bool) -> ShopResult<String> {
    match var(name) {
        Some(value) => Ok(value),
        None if production => Err(ShopError::Configuration(format!("{name} is required in production"))),
        None => {
            warn!("{name} not set, using an insecure development secret");
            Ok(dev_default.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_addr() {
        let config = AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            ..AppConfig::for_tests()
        };

        let addr = config.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_invalid_host_is_configuration_error() {
        let config = AppConfig {
            host: "not a host".to_string(),
            ..AppConfig::for_tests()
        };
        assert!(matches!(config.socket_addr(), Err(ShopError::Configuration(_))));
    }

    #[test]
    fn test_production_requires_secrets() {
        assert!(secret("ATELIER_TEST_UNSET_SECRET", "dev", true).is_err());
        assert_eq!(secret("ATELIER_TEST_UNSET_SECRET", "dev", false).unwrap(), "dev");
    }
}
