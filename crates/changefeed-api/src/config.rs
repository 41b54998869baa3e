//! Server configuration read from the environment.

use std::net::SocketAddr;

use changefeed_core::config::{CollectionSelection, PluginConfig, PluginOptions};

use crate::error::AppError;

/// Everything the server needs to start.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Changefeed plugin configuration.
    pub plugin: PluginConfig,
    /// Tokens accepted as authenticated credentials.
    pub api_tokens: Vec<String>,
}

impl AppConfig {
    /// Reads the configuration from process environment variables.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or a variable
    /// holds an invalid value.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name
    /// to its value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or a variable
    /// holds an invalid value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::Config("DATABASE_URL environment variable must be set".into()))?;
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse()
                .map_err(|e| AppError::Config(format!("PORT must be a valid u16: {e}")))?,
            None => 3000,
        };

        let options = PluginOptions {
            collections: lookup("EVENTS_COLLECTIONS").map(|raw| parse_collections(&raw)),
            retention_ms: parse_millis(&lookup, "EVENTS_RETENTION_MS")?,
            poll_interval_ms: parse_millis(&lookup, "EVENTS_POLL_INTERVAL_MS")?,
            sweep_interval_ms: parse_millis(&lookup, "EVENTS_SWEEP_INTERVAL_MS")?,
            disabled: lookup("EVENTS_DISABLED")
                .map(|raw| parse_flag("EVENTS_DISABLED", &raw))
                .transpose()?,
            admin: None,
        };

        let api_tokens = lookup("EVENTS_API_TOKENS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|token| !token.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            host,
            port,
            plugin: PluginConfig::from(options),
            api_tokens,
        })
    }

    /// The socket address to listen on.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }
}

fn parse_collections(raw: &str) -> CollectionSelection {
    if raw.trim() == "all" {
        return CollectionSelection::All;
    }
    CollectionSelection::Only(
        raw.split(',')
            .map(str::trim)
            .filter(|slug| !slug.is_empty())
            .map(str::to_owned)
            .collect(),
    )
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, AppError> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| AppError::Config(format!("{key} must be milliseconds: {e}")))
        })
        .transpose()
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, AppError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        other => Err(AppError::Config(format!("{key} must be a boolean, got {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use changefeed_core::config::CollectionSelection;

    use super::AppConfig;
    use crate::error::AppError;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/events")]).unwrap();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.plugin.collections, CollectionSelection::All);
        assert_eq!(config.plugin.retention(), Duration::from_secs(3600));
        assert!(!config.plugin.disabled);
        assert!(config.api_tokens.is_empty());
    }

    #[test]
    fn test_reads_plugin_settings_and_tokens() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/events"),
            ("EVENTS_COLLECTIONS", "posts, media"),
            ("EVENTS_RETENTION_MS", "60000"),
            ("EVENTS_POLL_INTERVAL_MS", "250"),
            ("EVENTS_DISABLED", "true"),
            ("EVENTS_API_TOKENS", "alpha, beta,"),
        ])
        .unwrap();

        assert_eq!(
            config.plugin.collections,
            CollectionSelection::Only(vec!["posts".into(), "media".into()])
        );
        assert_eq!(config.plugin.retention_ms, 60_000);
        assert_eq!(config.plugin.poll_interval_ms, 250);
        assert!(config.plugin.disabled);
        assert_eq!(config.api_tokens, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_missing_database_url_is_config_error() {
        assert!(matches!(load(&[]), Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_numbers_are_config_errors() {
        let bad_port = load(&[("DATABASE_URL", "postgres://x"), ("PORT", "http")]);
        let bad_retention = load(&[("DATABASE_URL", "postgres://x"), ("EVENTS_RETENTION_MS", "-1")]);
        let bad_flag = load(&[("DATABASE_URL", "postgres://x"), ("EVENTS_DISABLED", "maybe")]);

        assert!(matches!(bad_port, Err(AppError::Config(_))));
        assert!(matches!(bad_retention, Err(AppError::Config(_))));
        assert!(matches!(bad_flag, Err(AppError::Config(_))));
    }

    #[test]
    fn test_bind_addr_combines_host_and_port() {
        let config = load(&[
            ("DATABASE_URL", "postgres://x"),
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:8080");
    }
}
