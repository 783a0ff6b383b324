//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use doc_library_core::config::CoreConfig;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which backend gateway the service talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// A Supabase project (PostgREST, GoTrue and Storage over HTTP).
    Supabase { url: String, anon_key: String },
    /// Everything in process memory; nothing survives a restart.
    Memory,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub log_level: Level,
    pub backend: BackendKind,
    pub storage_bucket: String,
    pub preferences_path: PathBuf,
    pub cors_origin: String,
    /// Seeds the admin account when running on the in-memory backend.
    pub admin_password: Option<String>,
    pub core: CoreConfig,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server Settings ---
        let bind_address: SocketAddr =
            parse_or(&lookup, "BIND_ADDRESS", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin =
            lookup("CORS_ORIGIN").unwrap_or_else(|| "http://localhost:3000".to_string());
        let preferences_path = lookup("PREFERENCES_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./preferences.json"));

        // --- Backend Settings ---
        let backend_name = lookup("BACKEND").unwrap_or_else(|| "supabase".to_string());
        let backend = match backend_name.to_lowercase().as_str() {
            "supabase" => BackendKind::Supabase {
                url: required(&lookup, "SUPABASE_URL")?
                    .trim_end_matches('/')
                    .to_string(),
                anon_key: required(&lookup, "SUPABASE_ANON_KEY")?,
            },
            "memory" => BackendKind::Memory,
            other => {
                return Err(ConfigError::InvalidValue(
                    "BACKEND".to_string(),
                    format!("'{}' is not one of supabase, memory", other),
                ))
            }
        };
        let storage_bucket = lookup("STORAGE_BUCKET").unwrap_or_else(|| "documents".to_string());
        let admin_password = lookup("ADMIN_PASSWORD").filter(|p| !p.is_empty());

        // --- Core Settings ---
        let defaults = CoreConfig::default();
        let cache_ms: u64 =
            parse_or(&lookup, "CACHE_DURATION", defaults.cache_duration.as_millis() as u64)?;
        let core = CoreConfig {
            cache_duration: Duration::from_millis(cache_ms),
            max_file_size: parse_or(&lookup, "MAX_FILE_SIZE", defaults.max_file_size)?,
            small_file_threshold: parse_or(
                &lookup,
                "SMALL_FILE_THRESHOLD",
                defaults.small_file_threshold,
            )?,
            image_max_size: parse_or(&lookup, "IMAGE_MAX_SIZE", defaults.image_max_size)?,
            use_cache: parse_flag(&lookup, "USE_CACHE", defaults.use_cache)?,
            max_image_dimension: defaults.max_image_dimension,
            admin_email: lookup("ADMIN_EMAIL").unwrap_or(defaults.admin_email),
        };

        Ok(Self {
            bind_address,
            log_level,
            backend,
            storage_bucket,
            preferences_path,
            cors_origin,
            admin_password,
            core,
        })
    }
}

fn required<F>(lookup: &F, name: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).ok_or_else(|| ConfigError::MissingVar(name.to_string()))
}

fn parse_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, name: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name).map(|v| v.trim().to_lowercase()) {
        None => Ok(default),
        Some(v) if v == "true" || v == "1" || v == "yes" => Ok(true),
        Some(v) if v == "false" || v == "0" || v == "no" => Ok(false),
        Some(v) => Err(ConfigError::InvalidValue(
            name.to_string(),
            format!("'{}' is not a boolean", v),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn memory_backend_uses_defaults() {
        let config = Config::from_lookup(lookup_from(&[("BACKEND", "memory")])).unwrap();
        assert_eq!(config.backend, BackendKind::Memory);
        assert_eq!(config.admin_password, None);
        assert_eq!(config.bind_address.port(), 3000);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.storage_bucket, "documents");
        assert_eq!(config.core.cache_duration, Duration::from_millis(300_000));
        assert_eq!(config.core.max_file_size, 10_485_760);
        assert_eq!(config.core.small_file_threshold, 1_048_576);
        assert_eq!(config.core.image_max_size, 512_000);
        assert!(config.core.use_cache);
        assert_eq!(config.core.admin_email, "admin@code-mitra.com");
    }

    #[test]
    fn supabase_backend_requires_credentials() {
        match Config::from_lookup(lookup_from(&[("SUPABASE_URL", "https://x.supabase.co")])) {
            Err(ConfigError::MissingVar(name)) => assert_eq!(name, "SUPABASE_ANON_KEY"),
            other => panic!("expected MissingVar, got {:?}", other),
        }

        let config = Config::from_lookup(lookup_from(&[
            ("SUPABASE_URL", "https://x.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap();
        assert_eq!(
            config.backend,
            BackendKind::Supabase {
                url: "https://x.supabase.co".to_string(),
                anon_key: "anon".to_string(),
            }
        );
    }

    #[test]
    fn core_overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("BACKEND", "memory"),
            ("CACHE_DURATION", "1000"),
            ("MAX_FILE_SIZE", "2048"),
            ("SMALL_FILE_THRESHOLD", "512"),
            ("IMAGE_MAX_SIZE", "100"),
            ("USE_CACHE", "false"),
        ]))
        .unwrap();
        assert_eq!(config.core.cache_duration, Duration::from_secs(1));
        assert_eq!(config.core.max_file_size, 2048);
        assert_eq!(config.core.small_file_threshold, 512);
        assert_eq!(config.core.image_max_size, 100);
        assert!(!config.core.use_cache);
    }

    #[test]
    fn invalid_values_are_reported() {
        let result = Config::from_lookup(lookup_from(&[
            ("BACKEND", "memory"),
            ("MAX_FILE_SIZE", "ten"),
        ]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(name, _)) if name == "MAX_FILE_SIZE"));

        let result = Config::from_lookup(lookup_from(&[("BACKEND", "sqlite")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue(name, _)) if name == "BACKEND"));
    }
}
