//! Remote resource model
//!
//! Identifiers, states and request/response shapes shared by every provider.

use crate::resource::cursor::Cursor;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Identifies a single remote resource.
///
/// Equality and hashing only consider the identifying fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceRef {
    LogGroup {
        name: String,
    },
    LogStream {
        group: String,
        name: String,
    },
    Table {
        name: String,
    },
    Item {
        table: String,
        key: BTreeMap<String, String>,
    },
    Bucket {
        name: String,
    },
    Object {
        bucket: String,
        key: String,
        version_id: Option<String>,
    },
    /// Topic addressed by name (on create) or ARN
    Topic {
        id: String,
    },
    Subscription {
        arn: String,
    },
}

impl ResourceRef {
    pub fn table(name: &str) -> Self {
        Self::Table {
            name: name.to_string(),
        }
    }

    pub fn bucket(name: &str) -> Self {
        Self::Bucket {
            name: name.to_string(),
        }
    }

    pub fn topic(id: &str) -> Self {
        Self::Topic { id: id.to_string() }
    }

    pub fn item<K, V>(table: &str, key: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::Item {
            table: table.to_string(),
            key: key.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn object(bucket: &str, key: &str, version_id: Option<&str>) -> Self {
        Self::Object {
            bucket: bucket.to_string(),
            key: key.to_string(),
            version_id: version_id.map(str::to_string),
        }
    }

    /// Short resource type name, used in logs and output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::LogGroup { .. } => "log-group",
            Self::LogStream { .. } => "log-stream",
            Self::Table { .. } => "table",
            Self::Item { .. } => "item",
            Self::Bucket { .. } => "bucket",
            Self::Object { .. } => "object",
            Self::Topic { .. } => "topic",
            Self::Subscription { .. } => "subscription",
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LogGroup { name } => write!(f, "log-group/{name}"),
            Self::LogStream { group, name } => write!(f, "log-group/{group}/stream/{name}"),
            Self::Table { name } => write!(f, "table/{name}"),
            Self::Item { table, key } => {
                let parts: Vec<String> = key.iter().map(|(k, v)| format!("{k}={v}")).collect();
                write!(f, "table/{table}/item/{{{}}}", parts.join(","))
            }
            Self::Bucket { name } => write!(f, "bucket/{name}"),
            Self::Object {
                bucket,
                key,
                version_id: Some(version),
            } => write!(f, "bucket/{bucket}/{key}@{version}"),
            Self::Object { bucket, key, .. } => write!(f, "bucket/{bucket}/{key}"),
            Self::Topic { id } => write!(f, "topic/{id}"),
            Self::Subscription { arn } => write!(f, "subscription/{arn}"),
        }
    }
}

/// Lifecycle state of a remote resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Absent,
    Creating,
    Ready,
    Deleting,
    Gone,
}

impl ResourceState {
    /// Parse a provider status string.
    ///
    /// Providers disagree on vocabulary (`ACTIVE`, `available`, `CREATING`...),
    /// anything unrecognised is taken to mean the resource is usable.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "absent" | "not_found" | "notfound" => Self::Absent,
            "creating" | "pending" | "provisioning" | "updating" => Self::Creating,
            "deleting" | "pending_deletion" => Self::Deleting,
            "gone" | "deleted" => Self::Gone,
            _ => Self::Ready,
        }
    }

    /// True when the resource does not (or no longer) exist
    pub fn is_missing(self) -> bool {
        matches!(self, Self::Absent | Self::Gone)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Deleting => "deleting",
            Self::Gone => "gone",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remote resource as last observed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub target: ResourceRef,
    pub state: ResourceState,
    pub attributes: Value,
}

impl Resource {
    pub fn new(target: ResourceRef, state: ResourceState, attributes: Value) -> Self {
        Self {
            target,
            state,
            attributes,
        }
    }
}

/// Collections that can be listed page by page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collection {
    LogGroups {
        prefix: Option<String>,
    },
    LogStreams {
        group: String,
        prefix: Option<String>,
    },
    LogEvents {
        group: String,
        pattern: String,
        start: Option<i64>,
        end: Option<i64>,
    },
    Buckets,
    ObjectVersions {
        bucket: String,
        prefix: Option<String>,
    },
    TableQuery {
        table: String,
        key_condition: String,
        filter: Option<String>,
    },
    TableScan {
        table: String,
        filter: Option<String>,
    },
    Topics,
    Subscriptions {
        topic: Option<String>,
    },
}

/// A listing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub collection: Collection,
    pub page_size: Option<u32>,
}

impl ListQuery {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            page_size: None,
        }
    }

    #[must_use]
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Value>,
    pub next: Cursor,
}

/// A single mutation inside a bulk request
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp {
    Put(Value),
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    /// Identifies the item within its container (object key, item key JSON...)
    pub key: String,
    pub op: BatchOp,
    /// Object version targeted by a delete, when the container is versioned
    pub version_id: Option<String>,
}

impl BatchItem {
    pub fn put(key: impl Into<String>, payload: Value) -> Self {
        Self {
            key: key.into(),
            op: BatchOp::Put(payload),
            version_id: None,
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            op: BatchOp::Delete,
            version_id: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version_id: Option<String>) -> Self {
        self.version_id = version_id;
        self
    }
}

/// Ordered bulk request against one container (table or bucket)
#[derive(Debug, Clone, PartialEq)]
pub struct BatchRequest {
    pub container: ResourceRef,
    pub items: Vec<BatchItem>,
}

impl BatchRequest {
    pub fn new(container: ResourceRef, items: Vec<BatchItem>) -> Self {
        Self { container, items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Per-item status as reported by the provider
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Applied,
    Failed(RemoteError),
    /// Accepted by the request but not processed (capacity limits)
    Unprocessed,
}

/// Service specific operations that are neither create, delete, nor a read
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Publish {
        message: String,
        subject: Option<String>,
    },
    Subscribe {
        protocol: String,
        endpoint: String,
    },
    EnableVersioning,
    Upload {
        body: Vec<u8>,
    },
    Update {
        attributes: BTreeMap<String, Value>,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Publish { .. } => "publish",
            Self::Subscribe { .. } => "subscribe",
            Self::EnableVersioning => "enable-versioning",
            Self::Upload { .. } => "upload",
            Self::Update { .. } => "update",
        }
    }
}

/// Failure reported by a remote service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
    /// Provider error code (`ThrottlingException`, `NoSuchBucket`...)
    pub code: Option<String>,
    pub message: String,
    pub retry_after: Option<Duration>,
}

/// Provider code used for failures that never produced a response
pub const TRANSPORT_ERROR_CODE: &str = "TransportError";

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: None,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn coded(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.to_string()),
            ..Self::new(message)
        }
    }

    pub fn http(status: u16, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            code,
            ..Self::new(message)
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::coded(TRANSPORT_ERROR_CODE, message)
    }

    #[must_use]
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, self.status) {
            (Some(code), Some(status)) => write!(f, "{code} ({status}): {}", self.message),
            (Some(code), None) => write!(f, "{code}: {}", self.message),
            (None, Some(status)) => write!(f, "HTTP {status}: {}", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

pub type RemoteResult<T> = Result<T, RemoteError>;
