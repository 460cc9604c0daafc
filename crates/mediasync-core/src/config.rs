//! Configuration module
//!
//! Settings are read from the environment (optionally seeded from a `.env` file):
//! bucket location and credentials, ACL policy, fallback origin, local media root,
//! lookup cache location, and background fetch tuning.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::acl::AclPolicy;
use crate::constants::{
    DEFAULT_STORE_CODE, FETCH_CONNECT_TIMEOUT_SECS, FETCH_TIMEOUT_SECS, LOOKUP_FALSE_TTL_SECS,
    USER_AGENT,
};
use crate::fallback::FallbackOrigin;

const FETCH_QUEUE_SIZE: usize = 1000;
const FETCH_WORKERS: usize = 4;

/// Bucket settings. Emptiness is checked by the adapter, which refuses to start
/// without a project, a key file, and a bucket name.
#[derive(Clone, Debug, Default)]
pub struct GcsConfig {
    pub project_id: Option<String>,
    pub key_file_path: Option<String>,
    pub bucket: Option<String>,
    pub prefix: Option<String>,
    pub acl_policy: AclPolicy,
}

/// Background fetch and fallback origin request settings.
#[derive(Clone, Debug)]
pub struct FetchConfig {
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub user_agent: String,
    pub queue_size: usize,
    pub max_workers: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(FETCH_CONNECT_TIMEOUT_SECS),
            timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            user_agent: USER_AGENT.to_string(),
            queue_size: FETCH_QUEUE_SIZE,
            max_workers: FETCH_WORKERS,
        }
    }
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub environment: String,
    pub root_dir: PathBuf,
    pub media_dir: PathBuf,
    pub cache_dir: PathBuf,
    /// Age after which a cached `false` lookup is ignored and the path resolved again.
    pub lookup_false_ttl: Duration,
    /// Whether media storage is mirrored to the bucket at all.
    pub remote_enabled: bool,
    pub default_store_code: String,
    pub gcs: GcsConfig,
    pub fallback: Option<FallbackOrigin>,
    pub fetch: FetchConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. `from_env` delegates here.
    pub fn from_vars<F>(var: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let environment = non_empty("ENVIRONMENT")
            .or_else(|| non_empty("APP_ENV"))
            .unwrap_or_else(|| "development".to_string());

        let root_dir = PathBuf::from(non_empty("MEDIASYNC_ROOT_DIR").unwrap_or_else(|| ".".to_string()));
        let media_dir = non_empty("MEDIASYNC_MEDIA_DIR")
            .map(|p| resolve_against(&root_dir, &p))
            .unwrap_or_else(|| root_dir.join("pub").join("media"));
        let cache_dir = non_empty("MEDIASYNC_CACHE_DIR")
            .map(|p| resolve_against(&root_dir, &p))
            .unwrap_or_else(|| root_dir.join("var").join("cache").join("mediasync"));

        let lookup_false_ttl = Duration::from_secs(
            non_empty("MEDIASYNC_LOOKUP_FALSE_TTL_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(LOOKUP_FALSE_TTL_SECS),
        );

        let remote_enabled = match non_empty("MEDIASYNC_MEDIA_STORAGE")
            .unwrap_or_else(|| "gcs".to_string())
            .to_lowercase()
            .as_str()
        {
            "gcs" => true,
            "file" | "local" => false,
            other => {
                return Err(anyhow::anyhow!(
                    "MEDIASYNC_MEDIA_STORAGE must be 'gcs' or 'file', got '{}'",
                    other
                ))
            }
        };

        let acl_policy = match non_empty("MEDIASYNC_GCS_ACL") {
            Some(raw) => raw.parse()?,
            None => AclPolicy::default(),
        };

        let gcs = GcsConfig {
            project_id: non_empty("MEDIASYNC_GCS_PROJECT_ID"),
            key_file_path: non_empty("MEDIASYNC_GCS_KEY_FILE_PATH"),
            bucket: non_empty("MEDIASYNC_GCS_BUCKET"),
            prefix: non_empty("MEDIASYNC_GCS_PREFIX"),
            acl_policy,
        };

        let fallback = match non_empty("MEDIASYNC_FALLBACK_URL") {
            Some(raw) => FallbackOrigin::parse(&raw)?,
            None => None,
        };

        let fetch = FetchConfig {
            connect_timeout: Duration::from_secs(
                non_empty("MEDIASYNC_FETCH_CONNECT_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(FETCH_CONNECT_TIMEOUT_SECS),
            ),
            timeout: Duration::from_secs(
                non_empty("MEDIASYNC_FETCH_TIMEOUT_SECS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(FETCH_TIMEOUT_SECS),
            ),
            user_agent: USER_AGENT.to_string(),
            queue_size: non_empty("MEDIASYNC_FETCH_QUEUE_SIZE")
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(FETCH_QUEUE_SIZE)
                .max(1),
            max_workers: non_empty("MEDIASYNC_FETCH_WORKERS")
                .and_then(|s| s.parse::<usize>().ok())
                .unwrap_or(FETCH_WORKERS),
        };

        Ok(Config {
            environment,
            root_dir,
            media_dir,
            cache_dir,
            lookup_false_ttl,
            remote_enabled,
            default_store_code: non_empty("MEDIASYNC_DEFAULT_STORE")
                .unwrap_or_else(|| DEFAULT_STORE_CODE.to_string()),
            gcs,
            fallback,
            fetch,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.fetch.max_workers == 0 {
            return Err(anyhow::anyhow!("MEDIASYNC_FETCH_WORKERS must be at least 1"));
        }

        if self.fetch.timeout.is_zero() || self.fetch.connect_timeout.is_zero() {
            return Err(anyhow::anyhow!("Fetch timeouts must be greater than zero"));
        }

        if self.fetch.connect_timeout > self.fetch.timeout {
            return Err(anyhow::anyhow!(
                "MEDIASYNC_FETCH_CONNECT_TIMEOUT_SECS must not exceed MEDIASYNC_FETCH_TIMEOUT_SECS"
            ));
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    /// Absolute path of the service account key file.
    ///
    /// Relative paths resolve against the root directory and must name an existing
    /// file; anything else resolves to `None`.
    pub fn key_file_absolute_path(&self) -> Option<PathBuf> {
        let raw = self.gcs.key_file_path.as_deref()?;
        let path = Path::new(raw);
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }

        let joined = self.root_dir.join(raw.trim_end_matches('/'));
        let real = joined.canonicalize().ok()?;
        real.is_file().then_some(real)
    }
}

fn resolve_against(root: &Path, raw: &str) -> PathBuf {
    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config, anyhow::Error> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert!(config.remote_enabled);
        assert_eq!(config.gcs.acl_policy, AclPolicy::PublicRead);
        assert_eq!(config.fetch.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.fetch.timeout, Duration::from_secs(30));
        assert_eq!(config.default_store_code, "default");
        assert_eq!(config.lookup_false_ttl, Duration::from_secs(300));
        assert_eq!(config.media_dir, PathBuf::from("./pub/media"));
        assert!(config.fallback.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        let config = config_from(&[("MEDIASYNC_GCS_BUCKET", "  "), ("MEDIASYNC_GCS_ACL", "")])
            .unwrap();
        assert!(config.gcs.bucket.is_none());
        assert_eq!(config.gcs.acl_policy, AclPolicy::PublicRead);
    }

    #[test]
    fn lookup_false_ttl_is_configurable() {
        let config = config_from(&[("MEDIASYNC_LOOKUP_FALSE_TTL_SECS", "0")]).unwrap();
        assert!(config.lookup_false_ttl.is_zero());
    }

    #[test]
    fn production_environment_is_detected() {
        assert!(config_from(&[("ENVIRONMENT", "Production")]).unwrap().is_production());
        assert!(config_from(&[("APP_ENV", "prod")]).unwrap().is_production());
        assert!(!config_from(&[]).unwrap().is_production());
    }

    #[test]
    fn invalid_acl_is_rejected() {
        assert!(config_from(&[("MEDIASYNC_GCS_ACL", "everyone")]).is_err());
    }

    #[test]
    fn file_storage_disables_remote() {
        let config = config_from(&[("MEDIASYNC_MEDIA_STORAGE", "file")]).unwrap();
        assert!(!config.remote_enabled);
    }

    #[test]
    fn connect_timeout_cannot_exceed_total() {
        let config = config_from(&[
            ("MEDIASYNC_FETCH_CONNECT_TIMEOUT_SECS", "40"),
            ("MEDIASYNC_FETCH_TIMEOUT_SECS", "30"),
        ])
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn relative_key_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("etc")).unwrap();
        std::fs::write(dir.path().join("etc/key.json"), b"{}").unwrap();
        let root = dir.path().to_string_lossy().to_string();

        let config = config_from(&[
            ("MEDIASYNC_ROOT_DIR", root.as_str()),
            ("MEDIASYNC_GCS_KEY_FILE_PATH", "etc/key.json"),
        ])
        .unwrap();
        let resolved = config.key_file_absolute_path().unwrap();
        assert!(resolved.ends_with("etc/key.json"));

        let missing = config_from(&[
            ("MEDIASYNC_ROOT_DIR", root.as_str()),
            ("MEDIASYNC_GCS_KEY_FILE_PATH", "etc/missing.json"),
        ])
        .unwrap();
        assert!(missing.key_file_absolute_path().is_none());
    }
}
