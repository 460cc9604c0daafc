use crate::gcs::{GcsSettings, GcsStorage};
use crate::{RemoteStorage, StorageError, StorageResult};
use mediasync_core::Config;
use std::sync::Arc;

/// Create the remote storage adapter described by the configuration.
///
/// Fails when remote media storage is disabled, or when the bucket settings are
/// incomplete.
pub fn create_remote_storage(config: &Config) -> StorageResult<Arc<dyn RemoteStorage>> {
    if !config.remote_enabled {
        return Err(StorageError::ConfigError(
            "Remote media storage is disabled (MEDIASYNC_MEDIA_STORAGE=file)".to_string(),
        ));
    }

    let storage = GcsStorage::new(GcsSettings::from_config(config))?;
    Ok(Arc::new(storage))
}
