//! Fallback origin consulted when the bucket does not hold a requested object.

use std::collections::BTreeMap;

use crate::constants::DEFAULT_STORE_CODE;

/// External HTTP origin used to backfill missing media.
///
/// Either a single base URL shared by every store scope, or a per-scope map
/// which must carry a `default` entry used for scopes without their own URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackOrigin {
    Single(String),
    Scoped(BTreeMap<String, String>),
}

impl FallbackOrigin {
    /// Parse the `MEDIASYNC_FALLBACK_URL` value.
    ///
    /// Accepts `https://origin.example/media/` or
    /// `default=https://a.example/media/,uk=https://b.example/media/`.
    /// Blank input yields `None`.
    pub fn parse(raw: &str) -> Result<Option<Self>, anyhow::Error> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        let pairs: Option<Vec<(&str, &str)>> = raw
            .split(',')
            .map(|part| {
                part.split_once('=').and_then(|(code, url)| {
                    let code = code.trim();
                    let is_code = !code.is_empty() && !code.contains("://") && !code.contains('/');
                    is_code.then_some((code, url.trim()))
                })
            })
            .collect();

        let Some(pairs) = pairs else {
            return Ok(Some(FallbackOrigin::Single(raw.to_string())));
        };

        let mut scoped = BTreeMap::new();
        for (code, url) in pairs {
            if url.is_empty() {
                return Err(anyhow::anyhow!(
                    "Fallback URL for store '{}' must not be empty",
                    code
                ));
            }
            scoped.insert(code.to_string(), url.to_string());
        }

        if !scoped.contains_key(DEFAULT_STORE_CODE) {
            return Err(anyhow::anyhow!(
                "Per-store fallback URLs require a '{}' entry",
                DEFAULT_STORE_CODE
            ));
        }

        Ok(Some(FallbackOrigin::Scoped(scoped)))
    }

    /// Base URL for a store scope, falling back to the `default` entry.
    pub fn url_for(&self, store_code: &str) -> Option<&str> {
        match self {
            FallbackOrigin::Single(url) => Some(url.as_str()),
            FallbackOrigin::Scoped(urls) => urls
                .get(store_code)
                .or_else(|| urls.get(DEFAULT_STORE_CODE))
                .map(String::as_str),
        }
    }

    /// Full URL of `path` on the origin for a store scope.
    pub fn url_for_path(&self, store_code: &str, path: &str) -> Option<String> {
        self.url_for(store_code).map(|base| {
            format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        })
    }
}
