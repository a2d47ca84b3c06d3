//! Server configuration.
//!
//! A flat string key/value store with dotted keys, seeded with defaults and
//! overridden from the environment:
//!
//! ```bash
//! export NIMBLE__HTTP__PORT=8080        # http.port
//! export NIMBLE__AZURE__ACCOUNT=acme    # azure.account
//! ```
//!
//! [`ServerConfig::from_map`] turns the map into typed settings.

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use nimble_axum::DEFAULT_BODY_LIMIT;
use nimble_blob::{LifecycleConfig, S3Config};
use nimble_queue::QueueConfig;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "NIMBLE__";

#[derive(Debug, Default, Clone)]
pub struct ConfigMap {
    values: HashMap<String, String>,
}

impl ConfigMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map holding every default
    pub fn with_defaults() -> Self {
        let mut map = Self::new();
        map.set("http.host", "0.0.0.0");
        map.set("http.port", "3030");
        map.set("http.max_body_bytes", DEFAULT_BODY_LIMIT.to_string());
        map.set("staging.root", "./temp_storage");
        map.set("metadata.url", "sqlite://nimble.db");
        map.set("azure.container", nimble_blob::remote::DEFAULT_CONTAINER);
        map.set("s3.region", "us-east-1");
        map.set("s3.path_style", "true");
        map.set("queue.workers", "4");
        map.set("queue.max_retries", "5");
        map.set("queue.retry_base_ms", "1000");
        map.set("queue.retry_max_ms", "60000");
        map.set("upload.lease_secs", "300");
        map.set("log.format", "pretty");
        map
    }

    /// Defaults overridden by `NIMBLE__*` environment variables
    pub fn from_env() -> Self {
        let mut map = Self::with_defaults();
        map.load_env(std::env::vars(), ENV_PREFIX);
        map
    }

    /// `PREFIX__SECTION__KEY=value` becomes `section.key = value`
    pub fn load_env<I>(&mut self, vars: I, prefix: &str)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                self.set(normalized, value);
            }
        }
    }

    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Value for `key`; blank values count as unset
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    /// Parse `key` into `T`, failing with the key name on bad input
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.get(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| anyhow!("invalid value {raw:?} for {key}: {e}"))
            })
            .transpose()
    }

    fn require<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.parse(key)?
            .ok_or_else(|| anyhow!("missing configuration value {key}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataBackend {
    Memory,
    Sqlite { url: String },
}

/// Azure settings as configured; credentials may still live in a file
#[derive(Debug, Clone, Default)]
pub struct AzureSettings {
    pub account: Option<String>,
    pub key: Option<String>,
    pub container: String,
    pub credentials_file: Option<PathBuf>,
}

impl AzureSettings {
    pub fn is_configured(&self) -> bool {
        self.credentials_file.is_some() || (self.account.is_some() && self.key.is_some())
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_body_bytes: usize,
    pub staging_root: PathBuf,
    pub metadata: MetadataBackend,
    pub azure: AzureSettings,
    pub s3: Option<S3Config>,
    /// Tags served by the in-memory remote store
    pub memory_backends: Vec<String>,
    pub queue: QueueConfig,
    pub lifecycle: LifecycleConfig,
    pub log_format: LogFormat,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_map(&ConfigMap::from_env())
    }

    pub fn from_map(map: &ConfigMap) -> Result<Self> {
        let metadata = match map.get("metadata.url") {
            None | Some("memory") => MetadataBackend::Memory,
            Some(url) => MetadataBackend::Sqlite {
                url: url.to_string(),
            },
        };

        let azure = AzureSettings {
            account: map.get_string("azure.account"),
            key: map.get_string("azure.key"),
            container: map
                .get_string("azure.container")
                .unwrap_or_else(|| nimble_blob::remote::DEFAULT_CONTAINER.to_string()),
            credentials_file: map.get("azure.credentials_file").map(PathBuf::from),
        };

        let s3 = match map.get_string("s3.bucket") {
            Some(bucket) => Some(S3Config {
                bucket,
                region: map.require("s3.region")?,
                access_key_id: map.require("s3.access_key").context("s3.bucket is set")?,
                secret_access_key: map.require("s3.secret_key").context("s3.bucket is set")?,
                endpoint_url: map.get_string("s3.endpoint"),
                force_path_style: map.parse("s3.path_style")?.unwrap_or(true),
            }),
            None => None,
        };

        let memory_backends = map
            .get("memory.backends")
            .map(|raw| {
                raw.split(',')
                    .map(|tag| tag.trim().to_lowercase())
                    .filter(|tag| !tag.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let retry_base: u64 = map.require("queue.retry_base_ms")?;
        let retry_max: u64 = map.require("queue.retry_max_ms")?;
        let queue = QueueConfig::default()
            .with_max_workers(map.require("queue.workers")?)
            .with_max_retries(map.require("queue.max_retries")?)
            .with_backoff(
                Duration::from_millis(retry_base),
                Duration::from_millis(retry_max.max(retry_base)),
            );

        let lifecycle = LifecycleConfig::new()
            .with_upload_lease(Duration::from_secs(map.require("upload.lease_secs")?));

        let log_format = match map.get("log.format") {
            Some(f) if f.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            host: map.require("http.host")?,
            port: map.require("http.port")?,
            max_body_bytes: map.require("http.max_body_bytes")?,
            staging_root: PathBuf::from(map.require::<String>("staging.root")?),
            metadata,
            azure,
            s3,
            memory_backends,
            queue,
            lifecycle,
            log_format,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> ConfigMap {
        let mut map = ConfigMap::with_defaults();
        map.load_env(
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())),
            ENV_PREFIX,
        );
        map
    }

    #[test]
    fn defaults_apply() {
        let config = ServerConfig::from_map(&ConfigMap::with_defaults()).unwrap();

        assert_eq!(config.addr(), "0.0.0.0:3030");
        assert_eq!(config.max_body_bytes, 64 * 1024 * 1024);
        assert_eq!(config.staging_root, PathBuf::from("./temp_storage"));
        assert_eq!(
            config.metadata,
            MetadataBackend::Sqlite {
                url: "sqlite://nimble.db".to_string()
            }
        );
        assert_eq!(config.azure.container, "container");
        assert!(!config.azure.is_configured());
        assert!(config.s3.is_none());
        assert_eq!(config.queue.max_workers, 4);
        assert_eq!(config.queue.max_retries, 5);
        assert_eq!(config.lifecycle.upload_lease, Duration::from_secs(300));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn env_overrides_defaults() {
        let map = env(&[
            ("NIMBLE__HTTP__PORT", "8080"),
            ("NIMBLE__METADATA__URL", "memory"),
            ("NIMBLE__MEMORY__BACKENDS", "Azure, local ,"),
            ("NIMBLE__LOG__FORMAT", "json"),
            ("OTHER__HTTP__PORT", "1"),
        ]);
        let config = ServerConfig::from_map(&map).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.metadata, MetadataBackend::Memory);
        assert_eq!(config.memory_backends, vec!["azure", "local"]);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn bad_numbers_name_the_key() {
        let map = env(&[("NIMBLE__HTTP__PORT", "eighty")]);

        let err = ServerConfig::from_map(&map).unwrap_err();
        assert!(err.to_string().contains("http.port"));
    }

    #[test]
    fn s3_needs_credentials_once_a_bucket_is_set() {
        let map = env(&[("NIMBLE__S3__BUCKET", "media")]);
        assert!(ServerConfig::from_map(&map).is_err());

        let map = env(&[
            ("NIMBLE__S3__BUCKET", "media"),
            ("NIMBLE__S3__ACCESS_KEY", "ak"),
            ("NIMBLE__S3__SECRET_KEY", "sk"),
            ("NIMBLE__S3__ENDPOINT", "http://localhost:9000"),
        ]);
        let s3 = ServerConfig::from_map(&map).unwrap().s3.unwrap();
        assert_eq!(s3.bucket, "media");
        assert_eq!(s3.endpoint_url.as_deref(), Some("http://localhost:9000"));
        assert!(s3.force_path_style);
    }

    #[test]
    fn azure_is_configured_by_key_or_file() {
        let map = env(&[
            ("NIMBLE__AZURE__ACCOUNT", "acme"),
            ("NIMBLE__AZURE__KEY", "c2VjcmV0"),
        ]);
        assert!(ServerConfig::from_map(&map).unwrap().azure.is_configured());

        let map = env(&[("NIMBLE__AZURE__CREDENTIALS_FILE", "credentials.json")]);
        assert!(ServerConfig::from_map(&map).unwrap().azure.is_configured());
    }
}
