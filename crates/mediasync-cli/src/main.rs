//! Mediasync CLI: mirror the local media directory to Google Cloud Storage.
//!
//! Configuration comes from `MEDIASYNC_*` environment variables, optionally
//! loaded from a `.env` file. Every command exits 0 on success and 1 on failure.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use mediasync_cli::collect_files;
use mediasync_core::{Config, RequestContext};
use mediasync_infra::init_telemetry;
use mediasync_services::{
    ImportFile, MediaBucket, Resolution, SyncComponents, SyncOrchestrator,
};
use mediasync_storage::LocalMediaStore;
use mediasync_worker::{fallback_upload_channel, FetchHandler, FetchQueueConfig};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "mediasync", about = "Mirror media files to Google Cloud Storage")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download a bucket object into the media directory
    Download {
        /// Object path in the bucket (prefix optional)
        bucket_path: String,
        /// Destination path relative to the media directory
        local_path: String,
        #[arg(long)]
        store: Option<String>,
    },
    /// Fetch a URL and upload it to the bucket, keeping a local copy
    Upload {
        url: String,
        /// Object path in the bucket (prefix optional)
        bucket_path: String,
        /// Destination path relative to the media directory
        local_path: String,
        #[arg(long)]
        store: Option<String>,
    },
    /// Queue a fallback upload message and process it
    Publish {
        url: String,
        bucket_path: String,
    },
    /// Resolve a media path the way a media request would
    Resolve {
        path: String,
        /// Explicit store scope (as the `store` query parameter)
        #[arg(long)]
        store: Option<String>,
        /// Request URI used to derive an admin store scope
        #[arg(long, default_value = "/")]
        request_uri: String,
        /// Resolve inline instead of queueing a background fetch
        #[arg(long)]
        sync: bool,
    },
    /// Download every bucket object into a directory
    Export {
        /// Target directory (defaults to the media directory)
        #[arg(long)]
        to: Option<PathBuf>,
        /// Objects per page
        #[arg(long, default_value = "100")]
        count: usize,
    },
    /// Upload every file below a directory
    Import {
        dir: PathBuf,
        /// Bucket directory to import into
        #[arg(long)]
        directory: Option<String>,
    },
    /// Upload files from the media directory
    Save { filenames: Vec<String> },
    /// List subdirectories and files of a bucket directory
    Ls {
        #[arg(default_value = "")]
        path: String,
    },
    /// Delete an object from the bucket
    Delete { path: String },
    /// Copy an object within the bucket
    Copy { source: String, target: String },
    /// Move an object within the bucket
    Rename { source: String, target: String },
    /// Delete every object under the configured prefix
    Clear {
        /// Required confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Forget every memoized lookup so paths are resolved again
    CacheClear,
}

#[derive(Serialize)]
struct DirectoryListing {
    directories: Vec<String>,
    files: Vec<String>,
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize output")?;
    println!("{}", out);
    Ok(())
}

fn describe(resolution: &Resolution) -> serde_json::Value {
    match resolution {
        Resolution::Local(path) => serde_json::json!({ "status": "local", "path": path }),
        Resolution::Downloaded(path) => {
            serde_json::json!({ "status": "downloaded", "path": path })
        }
        Resolution::Fallback {
            path,
            source,
            uploaded,
        } => serde_json::json!({
            "status": "fallback",
            "path": path,
            "source": format!("{:?}", source).to_lowercase(),
            "uploaded": uploaded,
        }),
        Resolution::Pending => serde_json::json!({ "status": "pending" }),
        Resolution::Missing => serde_json::json!({ "status": "missing" }),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate()?;
    init_telemetry("mediasync", &config.environment, config.is_production())
        .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;

    let components = SyncComponents::from_config(&config)
        .context("Failed to initialize Google Cloud Storage")?;
    let media = LocalMediaStore::new(&config.media_dir);
    let bucket = MediaBucket::new(components.remote.clone(), media.clone());
    let (orchestrator, queue) =
        SyncOrchestrator::with_fetch_queue(components, FetchQueueConfig::from(&config.fetch));
    let default_store = config.default_store_code.as_str();

    match cli.command {
        Commands::Download {
            bucket_path,
            local_path,
            store,
        } => {
            let store = store.as_deref().unwrap_or(default_store);
            let path = orchestrator
                .download_object(&bucket_path, &local_path, store)
                .await?;
            print_json(&serde_json::json!({ "path": path }))?;
        }
        Commands::Upload {
            url,
            bucket_path,
            local_path,
            store,
        } => {
            let store = store.as_deref().unwrap_or(default_store);
            if !orchestrator
                .upload_from_url(&url, &bucket_path, Some(&local_path), store)
                .await?
            {
                bail!("No content at {}", url);
            }
            print_json(&serde_json::json!({ "uploaded": bucket_path }))?;
        }
        Commands::Publish { url, bucket_path } => {
            let (publisher, consumer) = fallback_upload_channel(config.fetch.queue_size);
            let handler: Arc<dyn FetchHandler> = orchestrator.clone();
            let worker = consumer.spawn(Arc::downgrade(&handler));

            publisher.publish(&url, &bucket_path)?;
            drop(publisher);
            worker.await.context("Fallback upload consumer panicked")?;

            if !bucket.file_exists(&bucket_path).await? {
                bail!("Fallback upload of {} did not reach the bucket", url);
            }
        }
        Commands::Resolve {
            path,
            store,
            request_uri,
            sync,
        } => {
            let context = RequestContext::from_request_parts(
                store.as_deref(),
                default_store,
                &request_uri,
                sync,
            );
            let resolution = orchestrator.resolve(&path, &context).await?;
            if resolution == Resolution::Pending {
                queue.wait_idle().await;
            }
            print_json(&describe(&resolution))?;
        }
        Commands::Export { to, count } => {
            let target = to.map(LocalMediaStore::new).unwrap_or_else(|| media.clone());
            let mut token = None;
            let mut exported = 0usize;

            loop {
                let page = bucket.export_files(token, count).await?;
                for file in page.files {
                    target.write_locked(&file.filename, file.content).await?;
                    exported += 1;
                }
                match page.next_page_token {
                    Some(next) => token = Some(next),
                    None => break,
                }
            }

            print_json(&serde_json::json!({ "exported": exported }))?;
        }
        Commands::Import { dir, directory } => {
            let mut files = Vec::new();
            for (relative, absolute) in collect_files(&dir)
                .with_context(|| format!("Failed to read {}", dir.display()))?
            {
                let content = tokio::fs::read(&absolute)
                    .await
                    .with_context(|| format!("Failed to read {}", absolute.display()))?;
                files.push(ImportFile {
                    filename: relative,
                    directory: directory.clone(),
                    content: Bytes::from(content),
                });
            }

            let total = files.len();
            let errors = bucket.import_files(files).await;
            print_json(&serde_json::json!({ "imported": total - errors.len(), "errors": errors }))?;
            if !errors.is_empty() {
                bail!("{} of {} files failed to import", errors.len(), total);
            }
        }
        Commands::Save { filenames } => {
            for filename in &filenames {
                bucket.save_file(filename).await?;
            }
            print_json(&serde_json::json!({ "saved": filenames.len() }))?;
        }
        Commands::Ls { path } => {
            let listing = DirectoryListing {
                directories: bucket.subdirectories(&path).await?,
                files: bucket
                    .directory_files(&path)
                    .await?
                    .into_iter()
                    .map(|f| f.filename)
                    .collect(),
            };
            print_json(&listing)?;
        }
        Commands::Delete { path } => {
            if !bucket.delete_file(&path).await? {
                bail!("Object {} still exists after delete", path);
            }
        }
        Commands::Copy { source, target } => {
            if !bucket.copy_file(&source, &target).await? {
                bail!("Object {} does not exist", source);
            }
        }
        Commands::Rename { source, target } => {
            if !bucket.rename_file(&source, &target).await? {
                bail!("Object {} does not exist", source);
            }
        }
        Commands::Clear { yes } => {
            if !yes {
                bail!("Refusing to clear the bucket without --yes");
            }
            let deleted = bucket.clear().await?;
            print_json(&serde_json::json!({ "deleted": deleted }))?;
        }
        Commands::CacheClear => {
            orchestrator.cache().clear().await?;
            print_json(&serde_json::json!({ "cleared": true }))?;
        }
    }

    Ok(())
}
