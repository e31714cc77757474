use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub platform: PlatformConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    /// How long a download request waits on the chat session before giving up.
    pub bridge_timeout: Duration,
}

/// Telegram settings.
///
/// `app_id` and `app_hash` are the credentials of the self-hosted Bot API
/// server that `api_url` points at (it lifts the public server's download
/// size limit). The relay only validates them here; the Bot API server
/// consumes them, and every call this process makes goes through `api_url`
/// with `bot_token`.
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub app_id: i32,
    pub app_hash: String,
    pub bot_token: String,
    /// Private channel that holds the archived copies.
    pub archive_channel_id: i64,
    /// Bot API endpoint, overridable for a self-hosted Bot API server.
    pub api_url: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    /// Public base URL used when building download links for users.
    pub public_base_url: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
}

pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_BRIDGE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_host, self.port)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).map(|v| v.trim().to_string());
        let required = |key: &'static str| {
            get(key)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let app_id = parse("API_ID", &required("API_ID")?)?;
        let app_hash = required("API_HASH")?;
        let bot_token = required("BOT_TOKEN")?;
        let archive_channel_id = parse("CHANNEL_ID", &required("CHANNEL_ID")?)?;
        let public_base_url = required("SERVER_BASE_URL")?;

        let api_url = get("BOT_API_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let port = match get("PORT").filter(|v| !v.is_empty()) {
            Some(v) => parse("PORT", &v)?,
            None => DEFAULT_PORT,
        };

        let bind_host = get("BIND_HOST")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "0.0.0.0".to_string());

        let data_dir = get("DATA_DIR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "./data".to_string());

        let bridge_timeout_secs = match get("BRIDGE_TIMEOUT_SECS").filter(|v| !v.is_empty()) {
            Some(v) => parse("BRIDGE_TIMEOUT_SECS", &v)?,
            None => DEFAULT_BRIDGE_TIMEOUT_SECS,
        };

        let config = Config {
            platform: PlatformConfig {
                app_id,
                app_hash,
                bot_token,
                archive_channel_id,
                api_url: api_url.trim_end_matches('/').to_string(),
            },
            server: ServerConfig {
                bind_host,
                port,
                public_base_url: public_base_url.trim_end_matches('/').to_string(),
            },
            storage: StorageConfig { data_dir },
            bridge_timeout: Duration::from_secs(bridge_timeout_secs),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.server.public_base_url.starts_with("http://")
            && !self.server.public_base_url.starts_with("https://")
        {
            return Err(ConfigError::Invalid {
                key: "SERVER_BASE_URL",
                reason: "must start with http:// or https://".to_string(),
            });
        }

        if self.bridge_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                key: "BRIDGE_TIMEOUT_SECS",
                reason: "must be greater than 0".to_string(),
            });
        }

        if !self.platform.bot_token.contains(':') {
            return Err(ConfigError::Invalid {
                key: "BOT_TOKEN",
                reason: "expected the <bot id>:<secret> form".to_string(),
            });
        }

        // Channel ids on the Bot API are negative (-100...).
        if self.platform.archive_channel_id >= 0 {
            tracing::warn!(
                channel_id = self.platform.archive_channel_id,
                "CHANNEL_ID is not negative; archive forwarding will likely fail"
            );
        }

        Ok(())
    }
}

fn parse<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("API_ID", "12345"),
            ("API_HASH", "0123456789abcdef"),
            ("BOT_TOKEN", "100:secret"),
            ("CHANNEL_ID", "-1001234567890"),
            ("SERVER_BASE_URL", "https://files.example.com/"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config, ConfigError> {
        Config::from_lookup(|k| env.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn test_defaults_applied() {
        let config = load(&base_env()).unwrap();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.bind_address(), "0.0.0.0:10000");
        assert_eq!(config.server.public_base_url, "https://files.example.com");
        assert_eq!(config.platform.api_url, DEFAULT_API_URL);
        assert_eq!(config.storage.data_dir, "./data");
        assert_eq!(config.bridge_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_required_value() {
        for key in ["API_ID", "API_HASH", "BOT_TOKEN", "CHANNEL_ID", "SERVER_BASE_URL"] {
            let mut env = base_env();
            env.remove(key);
            match load(&env) {
                Err(ConfigError::Missing(missing)) => assert_eq!(missing, key),
                other => panic!("expected Missing({key}), got {other:?}"),
            }
        }
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let mut env = base_env();
        env.insert("BOT_TOKEN", "   ");
        assert!(matches!(load(&env), Err(ConfigError::Missing("BOT_TOKEN"))));
    }

    #[test]
    fn test_malformed_numbers_rejected() {
        let mut env = base_env();
        env.insert("CHANNEL_ID", "archive");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { key: "CHANNEL_ID", .. })
        ));

        let mut env = base_env();
        env.insert("PORT", "99999");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid { key: "PORT", .. })
        ));
    }

    #[test]
    fn test_base_url_must_be_http() {
        let mut env = base_env();
        env.insert("SERVER_BASE_URL", "files.example.com");
        assert!(matches!(
            load(&env),
            Err(ConfigError::Invalid {
                key: "SERVER_BASE_URL",
                ..
            })
        ));
    }

    #[test]
    fn test_overrides() {
        let mut env = base_env();
        env.insert("PORT", "8080");
        env.insert("BIND_HOST", "127.0.0.1");
        env.insert("BRIDGE_TIMEOUT_SECS", "5");
        env.insert("BOT_API_URL", "http://localhost:8081/");
        let config = load(&env).unwrap();
        assert_eq!(config.server.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.bridge_timeout, Duration::from_secs(5));
        assert_eq!(config.platform.api_url, "http://localhost:8081");
    }
}
