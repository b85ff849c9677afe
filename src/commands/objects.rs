//! Object store commands

use super::Context;
use crate::remote::model::{Action, BatchItem, BatchRequest, Collection, ListQuery, ResourceRef};
use crate::resource::{CoreError, ErrorKind};
use anyhow::{Context as _, Result};
use clap::Subcommand;
use serde_json::{json, Value};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

/// Most keys a single delete-objects request accepts
pub const DELETE_OBJECTS_LIMIT: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => unreachable!(),
};

const TEMPFILE_DEFAULT_CONTENT: &str = "0";
const TEMPFILE_DEFAULT_SIZE: usize = 300;

#[derive(Subcommand, Debug)]
pub enum ObjectsCommand {
    /// Create a bucket
    CreateBucket {
        name: String,
        /// Region for the bucket (defaults to the configured region)
        #[arg(value_name = "REGION")]
        location: Option<String>,
    },
    /// List every bucket
    ListBuckets,
    /// Show a bucket, optionally creating it
    GetBucket {
        name: String,
        /// Create the bucket (in the selected region) when it does not exist
        #[arg(long)]
        create: bool,
    },
    /// Write a local text file of repeated content
    CreateTempfile {
        /// File name without extension (random when omitted)
        name: Option<String>,
        content: Option<String>,
        /// Number of times the content is repeated
        size: Option<usize>,
        /// Directory the file is written to
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Upload a file
    Put {
        bucket: String,
        file: PathBuf,
        #[arg(long)]
        key_prefix: Option<String>,
    },
    /// Download an object
    Get {
        bucket: String,
        key: String,
        /// Directory to save into
        #[arg(long)]
        dest: Option<PathBuf>,
        #[arg(long)]
        version_id: Option<String>,
    },
    /// Turn on versioning for a bucket
    EnableVersioning { bucket: String },
    /// Delete every object version in a bucket
    DeleteObjects {
        bucket: String,
        #[arg(long)]
        key_prefix: Option<String>,
    },
    /// Delete one bucket, or every bucket when no name is given
    DeleteBuckets { name: Option<String> },
}

fn bucket_params(region: &str) -> Value {
    json!({ "CreateBucketConfiguration": { "LocationConstraint": region } })
}

/// Bucket name from a listing entry
fn bucket_name(entry: &Value) -> Option<String> {
    ["name", "Name"]
        .iter()
        .find_map(|field| entry.get(*field).and_then(|v| v.as_str()))
        .map(str::to_string)
}

/// Object key for an uploaded file
pub fn object_key(file: &Path, key_prefix: Option<&str>) -> String {
    let path = file.to_string_lossy().replace('\\', "/");
    let path = path.trim_start_matches("./");
    format!("{}{}", key_prefix.unwrap_or_default(), path)
}

/// Write `content` repeated `size` times to `<dir>/<name>.txt`
pub fn create_tempfile(dir: &Path, name: Option<&str>, content: Option<&str>, size: Option<usize>) -> Result<PathBuf> {
    let name = name
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    let path = dir.join(format!("{name}.txt"));
    let body = content
        .unwrap_or(TEMPFILE_DEFAULT_CONTENT)
        .repeat(size.unwrap_or(TEMPFILE_DEFAULT_SIZE));
    std::fs::write(&path, body).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

async fn require_bucket(ctx: &Context, bucket: &str) -> Result<()> {
    ctx.lifecycle()
        .get_or_create(&ResourceRef::bucket(bucket), None, ctx.timeout)
        .await
        .with_context(|| format!("Bucket {bucket} is not available"))?;
    Ok(())
}

pub async fn run(ctx: &Context, command: &ObjectsCommand) -> Result<Value> {
    match command {
        ObjectsCommand::CreateBucket { name, location } => {
            let region = location.as_deref().unwrap_or(&ctx.region);
            let (bucket, created) = ctx
                .lifecycle()
                .get_or_create(&ResourceRef::bucket(name), Some(&bucket_params(region)), ctx.timeout)
                .await?;
            if created {
                tracing::info!("Bucket {} created", name);
            }
            Ok(json!({ "bucket": name, "created": created, "state": bucket.state }))
        }
        ObjectsCommand::ListBuckets => {
            let entries = ctx
                .lister()
                .collect_all(&ListQuery::new(Collection::Buckets), None)
                .await?;
            let names: Vec<String> = entries.iter().filter_map(bucket_name).collect();
            tracing::info!("Found {} buckets", names.len());
            Ok(json!({ "buckets": names, "count": names.len() }))
        }
        ObjectsCommand::GetBucket { name, create } => {
            let params = create.then(|| bucket_params(&ctx.region));
            match ctx
                .lifecycle()
                .get_or_create(&ResourceRef::bucket(name), params.as_ref(), ctx.timeout)
                .await
            {
                Ok((bucket, created)) => Ok(json!({
                    "bucket": name,
                    "exists": true,
                    "created": created,
                    "attributes": bucket.attributes,
                })),
                Err(CoreError::NotFound { .. }) => {
                    tracing::warn!("Bucket {} does not exist", name);
                    Ok(json!({ "bucket": name, "exists": false }))
                }
                Err(err) => Err(err.into()),
            }
        }
        ObjectsCommand::CreateTempfile {
            name,
            content,
            size,
            dir,
        } => {
            let path = create_tempfile(dir, name.as_deref(), content.as_deref(), *size)?;
            Ok(json!({ "file": path.display().to_string() }))
        }
        ObjectsCommand::Put {
            bucket,
            file,
            key_prefix,
        } => {
            require_bucket(ctx, bucket).await?;
            let body = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
            let size = body.len();
            let key = object_key(file, key_prefix.as_deref());
            let target = ResourceRef::object(bucket, &key, None);

            ctx.service()
                .invoke(&target, &Action::Upload { body })
                .await
                .with_context(|| format!("Failed to upload {}", file.display()))?;
            tracing::info!("Uploaded {} to {}", file.display(), target);
            Ok(json!({ "bucket": bucket, "key": key, "size": size }))
        }
        ObjectsCommand::Get {
            bucket,
            key,
            dest,
            version_id,
        } => {
            require_bucket(ctx, bucket).await?;
            let target = ResourceRef::object(bucket, key, version_id.as_deref());
            let body = ctx
                .service()
                .download(&target)
                .await
                .with_context(|| format!("Failed to download {target}"))?;

            let file_name = Path::new(key)
                .file_name()
                .with_context(|| format!("Object key {key} has no file name"))?;
            let path = dest.clone().unwrap_or_else(|| PathBuf::from(".")).join(file_name);
            std::fs::write(&path, &body).with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(json!({ "key": key, "file": path.display().to_string(), "size": body.len() }))
        }
        ObjectsCommand::EnableVersioning { bucket } => {
            require_bucket(ctx, bucket).await?;
            let response = ctx
                .service()
                .invoke(&ResourceRef::bucket(bucket), &Action::EnableVersioning)
                .await
                .with_context(|| format!("Failed to enable versioning on {bucket}"))?;
            let status = response
                .get("status")
                .or_else(|| response.get("Status"))
                .cloned()
                .unwrap_or_else(|| json!("Enabled"));
            Ok(json!({ "bucket": bucket, "versioning": status }))
        }
        ObjectsCommand::DeleteObjects { bucket, key_prefix } => {
            require_bucket(ctx, bucket).await?;
            let query = ListQuery::new(Collection::ObjectVersions {
                bucket: bucket.clone(),
                prefix: key_prefix.clone(),
            });
            let versions = ctx.lister().collect_all(&query, None).await?;

            let items: Vec<BatchItem> = versions
                .iter()
                .filter_map(|v| {
                    let key = v.get("Key").or_else(|| v.get("key"))?.as_str()?;
                    let version = v
                        .get("VersionId")
                        .or_else(|| v.get("versionId"))
                        .and_then(|id| id.as_str())
                        .map(str::to_string);
                    Some(BatchItem::delete(key).with_version(version))
                })
                .collect();

            let request = BatchRequest::new(ResourceRef::bucket(bucket), items);
            let result = ctx.batch().submit(&request, DELETE_OBJECTS_LIMIT).await;
            for (i, reason) in result.failures() {
                tracing::warn!("{} not deleted: {}", request.items[i].key, reason);
            }
            Ok(json!({
                "bucket": bucket,
                "targets": request.len(),
                "deleted": result.applied(),
                "skipped": result.skipped(),
                "failed": result.failed(),
            }))
        }
        ObjectsCommand::DeleteBuckets { name: Some(name) } => {
            let target = ResourceRef::bucket(name);
            match ctx.lifecycle().get_or_create(&target, None, ctx.timeout).await {
                Ok(_) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    tracing::warn!("Bucket {} does not exist", name);
                    return Ok(json!({ "deleted": 0, "failed": [] }));
                }
                Err(err) => return Err(err.into()),
            }
            ctx.lifecycle().delete_and_wait(&target, ctx.timeout).await?;
            Ok(json!({ "deleted": 1, "failed": [] }))
        }
        ObjectsCommand::DeleteBuckets { name: None } => {
            let entries = ctx
                .lister()
                .collect_all(&ListQuery::new(Collection::Buckets), None)
                .await?;

            let mut deleted = 0usize;
            let mut failed = Vec::new();
            for name in entries.iter().filter_map(bucket_name) {
                let target = ResourceRef::bucket(&name);
                match ctx.lifecycle().delete_and_wait(&target, ctx.timeout).await {
                    Ok(()) => deleted += 1,
                    Err(err) => {
                        tracing::warn!("Bucket {}: {}", name, err);
                        failed.push(name);
                    }
                }
            }
            Ok(json!({ "deleted": deleted, "failed": failed }))
        }
    }
}
