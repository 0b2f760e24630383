use crate::error::{LimiterError, Result};
use crate::rate_limit::types::ClassLimits;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Main limiter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Rate limits and ban duration
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Decision store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// What to do with a request when the store cannot answer
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Header carrying the access token
    #[serde(default = "default_token_header")]
    pub token_header: String,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Limits per identity class. Zero means "not configured" and fails validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Requests per second for address-identified clients
    #[serde(default)]
    pub address: u32,
    /// Requests per second for token-identified clients
    #[serde(default)]
    pub token: u32,
    /// Ban duration in seconds
    #[serde(default)]
    pub ban_duration_secs: u64,
}

/// Decision store (Redis) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL (`redis://host:port`) or bare `host:port`
    #[serde(default = "default_store_url")]
    pub url: String,
    /// Prefix for every counter and ban key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Run FLUSHALL on startup. Wipes the whole Redis server.
    #[serde(default)]
    pub flush_on_startup: bool,
    /// Per-call store timeout in milliseconds (0 disables)
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

/// Behaviour when the decision store fails
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Let the request through
    #[default]
    Open,
    /// Turn the request away with 503
    Closed,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Open => "open",
            FailurePolicy::Closed => "closed",
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = LimiterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(FailurePolicy::Open),
            "closed" => Ok(FailurePolicy::Closed),
            other => Err(LimiterError::Config(format!(
                "Invalid failure policy '{}': expected 'open' or 'closed'",
                other
            ))),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_token_header() -> String {
    "API_KEY".to_string()
}

fn default_store_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "ratelimit:".to_string()
}

fn default_store_timeout_ms() -> u64 {
    500
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            key_prefix: default_key_prefix(),
            flush_on_startup: false,
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Store URL in the form the Redis client expects
    pub fn redis_url(&self) -> String {
        if self.url.contains("://") {
            self.url.clone()
        } else {
            format!("redis://{}", self.url)
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

impl LimitsConfig {
    pub fn class_limits(&self) -> ClassLimits {
        ClassLimits {
            address: self.address,
            token: self.token,
        }
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_secs)
    }
}

impl LimiterConfig {
    /// Load configuration from an optional YAML file, overlay the process
    /// environment and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default_config(),
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LimiterError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| LimiterError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Overlay values from environment variables looked up through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("SERVER_PORT") {
            self.server.port = parse_env("SERVER_PORT", &port)?;
        }
        if let Some(addr) = lookup("REDIS_ADDR") {
            self.store.url = addr;
        }
        if let Some(limit) = lookup("RATE_LIMIT_IP") {
            self.limits.address = parse_env("RATE_LIMIT_IP", &limit)?;
        }
        if let Some(limit) = lookup("RATE_LIMIT_TOKEN") {
            self.limits.token = parse_env("RATE_LIMIT_TOKEN", &limit)?;
        }
        if let Some(secs) = lookup("BAN_DURATION") {
            self.limits.ban_duration_secs = parse_env("BAN_DURATION", &secs)?;
        }
        if let Some(policy) = lookup("RATE_LIMIT_FAILURE_POLICY") {
            self.failure_policy = policy.parse()?;
        }
        if let Some(header) = lookup("RATE_LIMIT_TOKEN_HEADER") {
            self.token_header = header;
        }
        if let Some(flush) = lookup("REDIS_FLUSH_ON_STARTUP") {
            self.store.flush_on_startup = parse_env("REDIS_FLUSH_ON_STARTUP", &flush)?;
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.limits.address == 0 {
            return Err(LimiterError::Config(
                "Address rate limit must be > 0 (limits.address / RATE_LIMIT_IP)".to_string(),
            ));
        }

        if self.limits.token == 0 {
            return Err(LimiterError::Config(
                "Token rate limit must be > 0 (limits.token / RATE_LIMIT_TOKEN)".to_string(),
            ));
        }

        if self.limits.ban_duration_secs == 0 {
            return Err(LimiterError::Config(
                "Ban duration must be > 0 (limits.ban_duration_secs / BAN_DURATION)".to_string(),
            ));
        }

        if self.store.url.trim().is_empty() {
            return Err(LimiterError::Config(
                "Store URL cannot be empty (store.url / REDIS_ADDR)".to_string(),
            ));
        }

        self.token_header_name()?;

        Ok(())
    }

    /// Parsed name of the header carrying the access token
    pub fn token_header_name(&self) -> Result<http::HeaderName> {
        http::HeaderName::from_bytes(self.token_header.trim().as_bytes()).map_err(|e| {
            LimiterError::Config(format!(
                "Invalid token header name '{}': {}",
                self.token_header, e
            ))
        })
    }

    /// Create a default configuration for testing
    pub fn default_config() -> Self {
        Self {
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
            store: StoreConfig::default(),
            failure_policy: FailurePolicy::default(),
            token_header: default_token_header(),
        }
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| LimiterError::Config(format!("Invalid value '{}' for {}: {}", value, name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090

limits:
  address: 5
  token: 10
  ban_duration_secs: 300

store:
  url: "redis://redis:6379"
  key_prefix: "edge:"

failure_policy: closed
"#;

        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.limits.class_limits().address, 5);
        assert_eq!(config.limits.class_limits().token, 10);
        assert_eq!(config.limits.ban_duration(), Duration::from_secs(300));
        assert_eq!(config.store.key_prefix, "edge:");
        assert_eq!(config.failure_policy, FailurePolicy::Closed);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let yaml = r#"
limits:
  address: 1
  token: 1
  ban_duration_secs: 1
"#;

        let config = LimiterConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.token_header, "API_KEY");
        assert_eq!(config.failure_policy, FailurePolicy::Open);
        assert!(!config.store.flush_on_startup);
        assert_eq!(config.store.timeout(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = LimiterConfig::default_config();
        config
            .apply_env(env(&[
                ("SERVER_PORT", "8081"),
                ("REDIS_ADDR", "redis:6379"),
                ("RATE_LIMIT_IP", "5"),
                ("RATE_LIMIT_TOKEN", "10"),
                ("BAN_DURATION", "300"),
                ("RATE_LIMIT_FAILURE_POLICY", "Closed"),
                ("REDIS_FLUSH_ON_STARTUP", "true"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 8081);
        assert_eq!(config.store.redis_url(), "redis://redis:6379");
        assert_eq!(config.limits.address, 5);
        assert_eq!(config.limits.token, 10);
        assert_eq!(config.limits.ban_duration_secs, 300);
        assert_eq!(config.failure_policy, FailurePolicy::Closed);
        assert!(config.store.flush_on_startup);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_env_value_fails() {
        let mut config = LimiterConfig::default_config();
        let err = config
            .apply_env(env(&[("RATE_LIMIT_IP", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("RATE_LIMIT_IP"));

        assert!(config
            .apply_env(env(&[("RATE_LIMIT_FAILURE_POLICY", "maybe")]))
            .is_err());
    }

    #[test]
    fn test_missing_limits_fail_validation() {
        let config = LimiterConfig::default_config();
        assert!(config.validate().is_err());

        let mut config = LimiterConfig::default_config();
        config.limits.address = 5;
        config.limits.token = 10;
        assert!(config.validate().is_err(), "ban duration is still zero");

        config.limits.ban_duration_secs = 60;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_token_header() {
        let mut config = LimiterConfig::default_config();
        config.limits = LimitsConfig {
            address: 1,
            token: 1,
            ban_duration_secs: 1,
        };
        config.token_header = "bad header".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_url_passthrough() {
        let store = StoreConfig {
            url: "rediss://secure:6380/2".to_string(),
            ..StoreConfig::default()
        };
        assert_eq!(store.redis_url(), "rediss://secure:6380/2");

        let store = StoreConfig {
            timeout_ms: 0,
            ..StoreConfig::default()
        };
        assert_eq!(store.timeout(), None);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "limits:\n  address: 3\n  token: 7\n  ban_duration_secs: 10\ntoken_header: X-API-Key"
        )
        .unwrap();

        let config = LimiterConfig::from_file(file.path()).unwrap();
        assert_eq!(config.limits.address, 3);
        assert_eq!(config.token_header, "X-API-Key");
        assert!(config.validate().is_ok());
    }
}
