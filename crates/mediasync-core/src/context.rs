//! Per-request context threaded from the boundary layer into the orchestrator.

use crate::constants::{ADMIN_STORE_CODE, ADMIN_URI_SUFFIX};

/// Request-scoped facts the synchronization path depends on.
///
/// Built once by the HTTP handler, CLI, or worker and passed down explicitly;
/// inner components never inspect the raw request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    /// True when this call is itself the background fetch.
    pub is_background_fetch: bool,
    pub store_code: String,
}

impl RequestContext {
    /// Context for a foreground media request.
    pub fn request(store_code: impl Into<String>) -> Self {
        Self {
            is_background_fetch: false,
            store_code: store_code.into(),
        }
    }

    /// Context for the dedicated background fetch.
    pub fn background_fetch(store_code: impl Into<String>) -> Self {
        Self {
            is_background_fetch: true,
            store_code: store_code.into(),
        }
    }

    /// Derive the store scope the way the storefront routes media requests.
    ///
    /// An explicit `store` query value wins. Otherwise the current store code is
    /// used, except that admin requests routed through `/<code>_admin/...` are
    /// attributed to `<code>`.
    pub fn from_request_parts(
        explicit_store: Option<&str>,
        current_store: &str,
        request_uri: &str,
        is_background_fetch: bool,
    ) -> Self {
        let mut store_code = explicit_store
            .filter(|s| !s.is_empty())
            .unwrap_or(current_store)
            .to_string();

        if store_code == ADMIN_STORE_CODE && request_uri.contains(ADMIN_URI_SUFFIX) {
            let first_segment = request_uri
                .trim_start_matches('/')
                .split('/')
                .next()
                .unwrap_or_default();
            store_code = first_segment.replace(ADMIN_URI_SUFFIX, "");
        }

        Self {
            is_background_fetch,
            store_code,
        }
    }
}
