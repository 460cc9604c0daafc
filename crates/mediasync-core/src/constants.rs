//! Application-wide constants.

/// Store scope code used when a request carries no explicit scope.
pub const DEFAULT_STORE_CODE: &str = "default";

/// Store scope code reported by the admin area.
pub const ADMIN_STORE_CODE: &str = "admin";

/// Suffix the admin area appends to a store code in the first URI segment.
pub const ADMIN_URI_SUFFIX: &str = "_admin";

/// User-Agent sent with every fallback origin request.
pub const USER_AGENT: &str = "mediasync/gcs";

/// Identifier under which the lookup cache blob is stored.
pub const LOOKUP_CACHE_TYPE_ID: &str = "mediasync_gcs";

/// Tag attached to the lookup cache blob when saved.
pub const LOOKUP_CACHE_TAG: &str = "MEDIASYNC_GCS";

/// Query parameter carrying the store scope code on media requests.
pub const STORE_QUERY_PARAM: &str = "store";

/// Queue name for `(url, remote key)` fallback upload messages.
pub const FALLBACK_QUEUE_NAME: &str = "mediasync.fallback.image.queue";

/// Connect timeout for fallback origin requests.
pub const FETCH_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Total timeout for fallback origin requests.
pub const FETCH_TIMEOUT_SECS: u64 = 30;

/// How long a cached "not found" lookup stays authoritative before the path is
/// resolved again.
pub const LOOKUP_FALSE_TTL_SECS: u64 = 300;
