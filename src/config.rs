use crate::models::{Principal, Role};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3030";
pub const CACHE_MAX_ENTRIES: usize = 1000;
pub const CACHE_DEFAULT_TTL_MS: u64 = 300_000; // 5 minutes
pub const ATTENDANCE_CACHE_TTL_MS: u64 = 120_000;
pub const DASHBOARD_CACHE_TTL_MS: u64 = 600_000;
pub const GEOFENCE_CACHE_TTL_MS: u64 = 300_000;
pub const RATE_LIMIT_REQUESTS: usize = 10; // requests per window
pub const RATE_LIMIT_WINDOW_MS: u64 = 60_000;
pub const PERFORMANCE_MAX_SAMPLES: usize = 100;
pub const SLOW_REQUEST_MS: u64 = 500;

pub const CONFIG_PATH_ENV: &str = "ATTENDANCE_CONFIG";
pub const ENVIRONMENT_ENV: &str = "APP_ENV";
pub const DEFAULT_CONFIG_FILE: &str = "attendance.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "test" => Ok(Environment::Test),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Environment::Development => f.write_str("development"),
            Environment::Test => f.write_str("test"),
            Environment::Production => f.write_str("production"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub max_entries: usize,
    pub default_ttl_ms: u64,
    pub attendance_ttl_ms: u64,
    pub dashboard_ttl_ms: u64,
    pub geofence_ttl_ms: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_entries: CACHE_MAX_ENTRIES,
            default_ttl_ms: CACHE_DEFAULT_TTL_MS,
            attendance_ttl_ms: ATTENDANCE_CACHE_TTL_MS,
            dashboard_ttl_ms: DASHBOARD_CACHE_TTL_MS,
            geofence_ttl_ms: GEOFENCE_CACHE_TTL_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimiterSettings {
    pub max_requests: usize,
    pub window_ms: u64,
}

impl LimiterSettings {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            max_requests: RATE_LIMIT_REQUESTS,
            window_ms: RATE_LIMIT_WINDOW_MS,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub check_in: LimiterSettings,
    pub check_out: LimiterSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceSettings {
    pub max_samples: usize,
    pub slow_request_ms: u64,
}

impl PerformanceSettings {
    pub fn slow_request_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_request_ms)
    }
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            max_samples: PERFORMANCE_MAX_SAMPLES,
            slow_request_ms: SLOW_REQUEST_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Bearer token -> principal.
    pub tokens: HashMap<String, Principal>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        let mut tokens = HashMap::new();
        tokens.insert(
            "example-token".to_string(),
            Principal::new("example-user", Role::Employee),
        );
        Self { tokens }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub environment: Environment,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub performance: PerformanceSettings,
    pub auth: AuthSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            environment: Environment::default(),
            cache: CacheSettings::default(),
            rate_limit: RateLimitSettings::default(),
            performance: PerformanceSettings::default(),
            auth: AuthSettings::default(),
        }
    }
}

impl Config {
    /// Loads `$ATTENDANCE_CONFIG`, then `./attendance.toml`, then defaults,
    /// and applies the `$APP_ENV` override.
    pub fn load() -> Self {
        let mut config = Self::load_file();

        if let Ok(value) = std::env::var(ENVIRONMENT_ENV) {
            match value.parse() {
                Ok(environment) => config.environment = environment,
                Err(e) => warn!(error = %e, "Ignoring {}", ENVIRONMENT_ENV),
            }
        }
        config
    }

    fn load_file() -> Self {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            match std::fs::read_to_string(&path) {
                Ok(content) => match Self::from_toml(&content) {
                    Ok(config) => {
                        info!(path = %path, "Loaded configuration from file");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %path, error = %e, "Failed to parse config file, using defaults");
                    }
                },
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to read config file, using defaults");
                }
            }
        }

        if let Ok(content) = std::fs::read_to_string(DEFAULT_CONFIG_FILE) {
            match Self::from_toml(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {}", DEFAULT_CONFIG_FILE);
                    return config;
                }
                Err(e) => warn!(error = %e, "Failed to parse {}", DEFAULT_CONFIG_FILE),
            }
        }

        info!("Using default configuration");
        Self::default()
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn default_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache.default_ttl_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache.max_entries, 1000);
        assert_eq!(config.cache.default_ttl_ms, 300_000);
        assert_eq!(config.cache.attendance_ttl_ms, 120_000);
        assert_eq!(config.cache.dashboard_ttl_ms, 600_000);
        assert_eq!(config.cache.geofence_ttl_ms, 300_000);
        assert_eq!(config.rate_limit.check_in.max_requests, 10);
        assert_eq!(config.rate_limit.check_out.window_ms, 60_000);
        assert_eq!(config.performance.max_samples, 100);
        assert_eq!(config.performance.slow_request_ms, 500);
        assert_eq!(config.environment, Environment::Development);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            environment = "production"

            [rate_limit.check_in]
            max_requests = 3

            [auth.tokens.admin-token]
            user_id = "admin-1"
            role = "admin"
            "#,
        )
        .unwrap();

        assert!(config.environment.is_production());
        assert_eq!(config.rate_limit.check_in.max_requests, 3);
        assert_eq!(config.rate_limit.check_in.window_ms, 60_000);
        assert_eq!(config.rate_limit.check_out.max_requests, 10);
        assert_eq!(config.auth.tokens["admin-token"].role, Role::Admin);
        assert_eq!(config.listen_addr, DEFAULT_LISTEN_ADDR);
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PROD".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("test".parse::<Environment>(), Ok(Environment::Test));
        assert!("staging".parse::<Environment>().is_err());
    }
}
