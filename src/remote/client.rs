//! Gateway client
//!
//! [`HttpResourceService`] maps the resource model onto a JSON REST gateway
//! (a provider emulator or an API front door). Every resource lives under
//! `{endpoint}/v1/regions/{region}/...`.

use super::http::GatewayHttpClient;
use super::model::{
    Action, BatchItem, BatchOp, Collection, ItemOutcome, ListQuery, Page, RemoteError,
    RemoteResult, Resource, ResourceRef, ResourceState,
};
use super::RemoteResourceService;
use crate::resource::cursor::Cursor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

/// Response fields providers use for the continuation token
const NEXT_TOKEN_FIELDS: &[&str] = &["nextCursor", "nextToken", "NextToken", "nextPageToken"];

/// Response fields providers use for the resource status
const STATE_FIELDS: &[&str] = &["state", "status", "TableStatus", "Status"];

/// Percent-encode a single path segment
fn seg(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Append query parameters to a URL
fn with_query(url: String, params: &[(&str, String)]) -> String {
    if params.is_empty() {
        return url;
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())))
        .finish();
    format!("{url}?{query}")
}

/// Main gateway client
#[derive(Clone, Debug)]
pub struct HttpResourceService {
    pub http: GatewayHttpClient,
    pub endpoint: String,
    pub region: String,
}

impl HttpResourceService {
    /// Create a client for `endpoint` (e.g. `http://localhost:4566`)
    pub fn new(endpoint: &str, region: &str) -> Result<Self> {
        let parsed = url::Url::parse(endpoint)
            .with_context(|| format!("Invalid endpoint URL: {endpoint}"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            anyhow::bail!("Unsupported endpoint scheme: {}", parsed.scheme());
        }

        Ok(Self {
            http: GatewayHttpClient::new()?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            region: region.to_string(),
        })
    }

    /// Switch to a different region
    pub fn switch_region(&mut self, region: &str) {
        self.region = region.to_string();
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build a regional API URL
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/v1/regions/{}/{}", self.endpoint, seg(&self.region), path)
    }

    /// Build log store URL
    pub fn logs_url(&self, path: &str) -> String {
        self.api_url(&format!("logs/{path}"))
    }

    /// Build table store URL
    pub fn tables_url(&self, path: &str) -> String {
        self.api_url(&format!("tables/{path}"))
    }

    /// Build object store URL
    pub fn storage_url(&self, path: &str) -> String {
        self.api_url(&format!("buckets/{path}"))
    }

    /// Build notification service URL
    pub fn notifications_url(&self, path: &str) -> String {
        self.api_url(path)
    }

    /// URL addressing a single resource
    pub fn resource_url(&self, target: &ResourceRef) -> String {
        match target {
            ResourceRef::LogGroup { name } => self.logs_url(&format!("groups/{}", seg(name))),
            ResourceRef::LogStream { group, name } => {
                self.logs_url(&format!("groups/{}/streams/{}", seg(group), seg(name)))
            }
            ResourceRef::Table { name } => self.tables_url(&seg(name)),
            ResourceRef::Item { table, key } => {
                // BTreeMap serialises with sorted keys, so the path is stable
                let key_json = serde_json::to_string(key).unwrap_or_default();
                self.tables_url(&format!("{}/items/{}", seg(table), seg(&key_json)))
            }
            ResourceRef::Bucket { name } => self.storage_url(&seg(name)),
            ResourceRef::Object {
                bucket,
                key,
                version_id,
            } => {
                let url = self.storage_url(&format!("{}/objects/{}", seg(bucket), seg(key)));
                match version_id {
                    Some(v) => with_query(url, &[("versionId", v.clone())]),
                    None => url,
                }
            }
            ResourceRef::Topic { id } => self.notifications_url(&format!("topics/{}", seg(id))),
            ResourceRef::Subscription { arn } => {
                self.notifications_url(&format!("subscriptions/{}", seg(arn)))
            }
        }
    }

    /// URL for an operation nested under a resource (`.../actions/publish`)
    fn nested_url(&self, target: &ResourceRef, suffix: &str) -> String {
        let url = self.resource_url(target);
        match url.split_once('?') {
            Some((path, query)) => format!("{path}/{suffix}?{query}"),
            None => format!("{url}/{suffix}"),
        }
    }

    /// URL and filter parameters for a listing
    pub fn collection_url(&self, collection: &Collection) -> (String, Vec<(&'static str, String)>) {
        let mut params = Vec::new();
        let url = match collection {
            Collection::LogGroups { prefix } => {
                if let Some(p) = prefix {
                    params.push(("prefix", p.clone()));
                }
                self.logs_url("groups")
            }
            Collection::LogStreams { group, prefix } => {
                if let Some(p) = prefix {
                    params.push(("prefix", p.clone()));
                }
                self.logs_url(&format!("groups/{}/streams", seg(group)))
            }
            Collection::LogEvents {
                group,
                pattern,
                start,
                end,
            } => {
                params.push(("filterPattern", pattern.clone()));
                if let Some(s) = start {
                    params.push(("startTime", s.to_string()));
                }
                if let Some(e) = end {
                    params.push(("endTime", e.to_string()));
                }
                self.logs_url(&format!("groups/{}/events", seg(group)))
            }
            Collection::Buckets => self.api_url("buckets"),
            Collection::ObjectVersions { bucket, prefix } => {
                if let Some(p) = prefix {
                    params.push(("prefix", p.clone()));
                }
                self.storage_url(&format!("{}/versions", seg(bucket)))
            }
            Collection::TableQuery {
                table,
                key_condition,
                filter,
            } => {
                params.push(("keyCondition", key_condition.clone()));
                if let Some(f) = filter {
                    params.push(("filter", f.clone()));
                }
                self.tables_url(&format!("{}/query", seg(table)))
            }
            Collection::TableScan { table, filter } => {
                if let Some(f) = filter {
                    params.push(("filter", f.clone()));
                }
                self.tables_url(&format!("{}/scan", seg(table)))
            }
            Collection::Topics => self.notifications_url("topics"),
            Collection::Subscriptions { topic: Some(t) } => {
                self.notifications_url(&format!("topics/{}/subscriptions", seg(t)))
            }
            Collection::Subscriptions { topic: None } => self.notifications_url("subscriptions"),
        };
        (url, params)
    }
}

/// Field holding the listed items for each collection
fn response_path(collection: &Collection) -> &'static str {
    match collection {
        Collection::LogGroups { .. } => "logGroups",
        Collection::LogStreams { .. } => "logStreams",
        Collection::LogEvents { .. } => "events",
        Collection::Buckets => "buckets",
        Collection::ObjectVersions { .. } => "versions",
        Collection::TableQuery { .. } | Collection::TableScan { .. } => "items",
        Collection::Topics => "topics",
        Collection::Subscriptions { .. } => "subscriptions",
    }
}

/// Extract listed items, falling back to a generic `items` array
fn extract_items(response: &Value, path: &str) -> Vec<Value> {
    if let Some(arr) = response.as_array() {
        return arr.clone();
    }

    response
        .get(path)
        .or_else(|| response.get("items"))
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Read the continuation cursor from a list response
pub(crate) fn extract_cursor(response: &Value) -> Cursor {
    let token = NEXT_TOKEN_FIELDS
        .iter()
        .find_map(|field| response.get(*field).and_then(|v| v.as_str()))
        .map(str::to_string);

    let no_more = response.get("done").and_then(|v| v.as_bool()) == Some(true)
        || response.get("hasMore").and_then(|v| v.as_bool()) == Some(false)
        || response.get("IsTruncated").and_then(|v| v.as_bool()) == Some(false);

    Cursor::from_response(token, no_more)
}

/// Build a resource from a describe/create response
fn parse_resource(target: &ResourceRef, body: Value, default_state: ResourceState) -> Resource {
    // Some services wrap the description (`{"Table": {...}}`)
    let state = STATE_FIELDS
        .iter()
        .find_map(|field| {
            body.get(*field)
                .or_else(|| body.get("Table").and_then(|t| t.get(*field)))
                .and_then(|v| v.as_str())
        })
        .map(ResourceState::parse)
        .unwrap_or(default_state);

    Resource::new(target.clone(), state, body)
}

fn batch_body(chunk: &[BatchItem]) -> Value {
    let items: Vec<Value> = chunk
        .iter()
        .map(|item| match &item.op {
            BatchOp::Put(payload) => json!({"key": item.key, "op": "put", "payload": payload}),
            BatchOp::Delete => match &item.version_id {
                Some(version) => json!({"key": item.key, "op": "delete", "versionId": version}),
                None => json!({"key": item.key, "op": "delete"}),
            },
        })
        .collect();
    json!({ "items": items, "quiet": true })
}

fn parse_outcome(entry: &Value) -> ItemOutcome {
    let status = entry
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("failed");

    match status.to_ascii_lowercase().as_str() {
        "applied" | "ok" | "success" => ItemOutcome::Applied,
        "unprocessed" => ItemOutcome::Unprocessed,
        _ => ItemOutcome::Failed(item_error(entry)),
    }
}

fn item_error(entry: &Value) -> RemoteError {
    let message = entry
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or("item failed");
    match entry.get("code").and_then(|v| v.as_str()) {
        Some(code) => RemoteError::coded(code, message),
        None => RemoteError::new(message),
    }
}

/// Interpret a bulk response.
///
/// Either a full `outcomes` array parallel to the request, or the quiet form
/// listing only `errors` and `unprocessed` keys (everything else applied).
pub(crate) fn parse_batch_response(chunk: &[BatchItem], response: &Value) -> RemoteResult<Vec<ItemOutcome>> {
    if let Some(outcomes) = response.get("outcomes").and_then(|v| v.as_array()) {
        return Ok(outcomes.iter().map(parse_outcome).collect());
    }

    let errors = response.get("errors").and_then(|v| v.as_array());
    let unprocessed = response.get("unprocessed").and_then(|v| v.as_array());
    if errors.is_none() && unprocessed.is_none() && !response.is_null() && !response.is_object() {
        return Err(RemoteError::coded(
            "InvalidResponse",
            "batch response has neither outcomes nor errors",
        ));
    }

    let outcomes = chunk
        .iter()
        .map(|item| {
            let failed = errors.and_then(|errs| {
                errs.iter()
                    .find(|e| e.get("key").and_then(|k| k.as_str()) == Some(item.key.as_str()))
            });
            if let Some(entry) = failed {
                return ItemOutcome::Failed(item_error(entry));
            }
            let pending = unprocessed
                .map(|keys| keys.iter().any(|k| k.as_str() == Some(item.key.as_str())))
                .unwrap_or(false);
            if pending {
                ItemOutcome::Unprocessed
            } else {
                ItemOutcome::Applied
            }
        })
        .collect();
    Ok(outcomes)
}

fn container_batch_url(service: &HttpResourceService, container: &ResourceRef) -> RemoteResult<String> {
    match container {
        ResourceRef::Table { .. } | ResourceRef::Bucket { .. } => {
            Ok(service.nested_url(container, "batch"))
        }
        other => Err(RemoteError::coded(
            "InvalidRequest",
            format!("{} does not accept bulk requests", other.kind()),
        )),
    }
}

#[async_trait]
impl RemoteResourceService for HttpResourceService {
    async fn create(&self, target: &ResourceRef, params: &Value) -> RemoteResult<Resource> {
        let url = self.resource_url(target);
        let body = if params.is_null() { None } else { Some(params) };
        let response = self.http.put(&url, body).await?;
        Ok(parse_resource(target, response, ResourceState::Ready))
    }

    async fn delete(&self, target: &ResourceRef) -> RemoteResult<()> {
        let url = self.resource_url(target);
        self.http.delete(&url).await?;
        Ok(())
    }

    async fn get(&self, target: &ResourceRef) -> RemoteResult<Resource> {
        let url = self.resource_url(target);
        let response = self.http.get(&url).await?;
        Ok(parse_resource(target, response, ResourceState::Ready))
    }

    async fn list_page(&self, query: &ListQuery, cursor: Option<&str>) -> RemoteResult<Page> {
        let (url, mut params) = self.collection_url(&query.collection);
        if let Some(size) = query.page_size {
            params.push(("pageSize", size.to_string()));
        }
        if let Some(token) = cursor {
            params.push(("cursor", token.to_string()));
        }

        let response = self.http.get(&with_query(url, &params)).await?;
        let items = extract_items(&response, response_path(&query.collection));
        let next = extract_cursor(&response);

        Ok(Page { items, next })
    }

    async fn batch_submit(
        &self,
        container: &ResourceRef,
        chunk: &[BatchItem],
    ) -> RemoteResult<Vec<ItemOutcome>> {
        let url = container_batch_url(self, container)?;
        let response = self.http.post(&url, Some(&batch_body(chunk))).await?;
        parse_batch_response(chunk, &response)
    }

    async fn invoke(&self, target: &ResourceRef, action: &Action) -> RemoteResult<Value> {
        tracing::info!("invoke: action={}, target={}", action.name(), target);

        match action {
            Action::Upload { body } => {
                let url = self.nested_url(target, "content");
                self.http.put_bytes(&url, body.clone()).await
            }
            Action::Publish { message, subject } => {
                let url = self.nested_url(target, "actions/publish");
                let body = json!({ "message": message, "subject": subject });
                self.http.post(&url, Some(&body)).await
            }
            Action::Subscribe { protocol, endpoint } => {
                let url = self.nested_url(target, "subscriptions");
                let body = json!({ "protocol": protocol, "endpoint": endpoint });
                self.http.post(&url, Some(&body)).await
            }
            Action::EnableVersioning => {
                let url = self.nested_url(target, "versioning");
                self.http.put(&url, Some(&json!({ "status": "Enabled" }))).await
            }
            Action::Update { attributes } => {
                let url = self.nested_url(target, "actions/update");
                let body = json!({ "set": attributes });
                self.http.post(&url, Some(&body)).await
            }
        }
    }

    async fn download(&self, target: &ResourceRef) -> RemoteResult<Vec<u8>> {
        let url = self.nested_url(target, "content");
        self.http.get_bytes(&url).await
    }
}
