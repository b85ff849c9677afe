//! In-memory provider
//!
//! Simulates the remote services with plain maps so the resource core and the
//! commands can run without a network. State transitions, failures and page
//! boundaries are scriptable, and every call is counted.

use super::model::{
    Action, BatchItem, BatchOp, Collection, ItemOutcome, ListQuery, Page, RemoteError,
    RemoteResult, Resource, ResourceRef, ResourceState,
};
use super::RemoteResourceService;
use crate::resource::cursor::Cursor;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Default number of items returned per page
const DEFAULT_PAGE_SIZE: usize = 100;

/// Provider operations, used to count calls and inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Delete,
    Get,
    ListPage,
    BatchSubmit,
    Invoke,
    Download,
}

#[derive(Debug, Default)]
struct Inner {
    resources: HashMap<ResourceRef, Resource>,
    /// Upcoming states reported by `get`; the last entry sticks
    scripts: HashMap<ResourceRef, VecDeque<ResourceState>>,
    collections: Vec<(Collection, Vec<Value>)>,
    containers: HashMap<ResourceRef, Vec<(String, Value)>>,
    contents: HashMap<ResourceRef, Vec<u8>>,
    failures: HashMap<Op, VecDeque<RemoteError>>,
    batch_call_failures: HashMap<usize, RemoteError>,
    item_failures: HashMap<String, RemoteError>,
    unprocessed_once: HashSet<String>,
    calls: HashMap<Op, usize>,
    chunk_sizes: Vec<usize>,
    invocations: Vec<(ResourceRef, Action)>,
    create_state: Option<ResourceState>,
    delete_state: Option<ResourceState>,
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

fn not_found(target: &ResourceRef) -> RemoteError {
    RemoteError::http(404, Some("ResourceNotFoundException".into()), format!("{target} not found"))
}

/// In-memory [`RemoteResourceService`]
#[derive(Debug, Default)]
pub struct InMemoryService {
    inner: Mutex<Inner>,
}

impl InMemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Seeding
    // =========================================================================

    /// Insert an existing resource
    pub fn insert(&self, target: ResourceRef, state: ResourceState, attributes: Value) {
        let resource = Resource::new(target.clone(), state, attributes);
        lock(&self.inner).resources.insert(target, resource);
    }

    /// State reported right after `create` (default `Ready`)
    pub fn set_create_state(&self, state: ResourceState) {
        lock(&self.inner).create_state = Some(state);
    }

    /// State left behind by `delete` (default: removed immediately)
    pub fn set_delete_state(&self, state: ResourceState) {
        lock(&self.inner).delete_state = Some(state);
    }

    /// States the next `get` calls on `target` will observe, in order.
    /// The last state keeps being reported once the others are used up.
    pub fn script_states(&self, target: &ResourceRef, states: impl IntoIterator<Item = ResourceState>) {
        lock(&self.inner)
            .scripts
            .insert(target.clone(), states.into_iter().collect());
    }

    /// Items returned when `collection` is listed
    pub fn seed_collection(&self, collection: Collection, items: Vec<Value>) {
        let mut inner = lock(&self.inner);
        inner.collections.retain(|(c, _)| c != &collection);
        inner.collections.push((collection, items));
    }

    /// Fail the next call of `op` with `error`; repeat to queue more failures
    pub fn fail_next(&self, op: Op, error: RemoteError) {
        lock(&self.inner)
            .failures
            .entry(op)
            .or_default()
            .push_back(error);
    }

    /// Fail the `index`-th (0-based) `batch_submit` call as a whole
    pub fn fail_batch_call(&self, index: usize, error: RemoteError) {
        lock(&self.inner).batch_call_failures.insert(index, error);
    }

    /// Report `key` as failed every time it is submitted
    pub fn fail_item(&self, key: &str, error: RemoteError) {
        lock(&self.inner).item_failures.insert(key.to_string(), error);
    }

    /// Report `key` as unprocessed the first time it is submitted
    pub fn unprocess_once(&self, key: &str) {
        lock(&self.inner).unprocessed_once.insert(key.to_string());
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    /// Number of calls made for `op`
    pub fn calls(&self, op: Op) -> usize {
        lock(&self.inner).calls.get(&op).copied().unwrap_or(0)
    }

    /// Size of every chunk received by `batch_submit`, in call order
    pub fn chunk_sizes(&self) -> Vec<usize> {
        lock(&self.inner).chunk_sizes.clone()
    }

    /// Items currently stored in a table or bucket container
    pub fn container_items(&self, container: &ResourceRef) -> Vec<(String, Value)> {
        lock(&self.inner)
            .containers
            .get(container)
            .cloned()
            .unwrap_or_default()
    }

    /// Actions run through `invoke`, in call order
    pub fn invocations(&self) -> Vec<(ResourceRef, Action)> {
        lock(&self.inner).invocations.clone()
    }

    pub fn contains(&self, target: &ResourceRef) -> bool {
        lock(&self.inner).resources.contains_key(target)
    }

    fn begin(&self, op: Op) -> RemoteResult<MutexGuard<'_, Inner>> {
        let mut inner = lock(&self.inner);
        *inner.calls.entry(op).or_insert(0) += 1;
        if let Some(err) = inner.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            return Err(err);
        }
        Ok(inner)
    }
}

/// Listing built from stored resources when a collection was not seeded
fn derived_items(inner: &Inner, collection: &Collection) -> Vec<Value> {
    let has_prefix = |name: &str, prefix: &Option<String>| {
        prefix.as_deref().map_or(true, |p| name.starts_with(p))
    };

    let mut resources: Vec<&Resource> = inner
        .resources
        .values()
        .filter(|r| !r.state.is_missing())
        .collect();
    resources.sort_by(|a, b| a.target.cmp(&b.target));

    let mut items: Vec<Value> = resources
        .into_iter()
        .filter_map(|r| match (collection, &r.target) {
            (Collection::Buckets, ResourceRef::Bucket { name }) => Some(json!({ "name": name })),
            (
                Collection::TableScan { table, .. } | Collection::TableQuery { table, .. },
                ResourceRef::Item { table: t, .. },
            ) if t == table => Some(r.attributes.clone()),
            (Collection::Topics, ResourceRef::Topic { id }) => Some(json!({ "topicArn": id })),
            (Collection::LogGroups { prefix }, ResourceRef::LogGroup { name }) if has_prefix(name, prefix) => {
                Some(json!({ "logGroupName": name }))
            }
            (Collection::LogStreams { group, prefix }, ResourceRef::LogStream { group: g, name })
                if g == group && has_prefix(name, prefix) =>
            {
                Some(json!({ "logStreamName": name }))
            }
            (Collection::Subscriptions { topic }, ResourceRef::Subscription { arn })
                if topic.as_deref().map_or(true, |t| arn.starts_with(&format!("topic/{t}:"))) =>
            {
                let mut entry = r.attributes.clone();
                if let Value::Object(map) = &mut entry {
                    map.insert("subscriptionArn".to_string(), json!(arn));
                }
                Some(entry)
            }
            (
                Collection::ObjectVersions { bucket, prefix },
                ResourceRef::Object {
                    bucket: b,
                    key,
                    version_id,
                },
            ) if b == bucket && has_prefix(key, prefix) => {
                Some(json!({ "Key": key, "VersionId": version_id }))
            }
            _ => None,
        })
        .collect();

    match collection {
        Collection::ObjectVersions { bucket, prefix } => {
            if let Some(stored) = inner.containers.get(&ResourceRef::bucket(bucket)) {
                items.extend(
                    stored
                        .iter()
                        .filter(|(key, _)| has_prefix(key, prefix))
                        .map(|(key, _)| json!({ "Key": key, "VersionId": null })),
                );
            }
        }
        Collection::TableScan { table, .. } | Collection::TableQuery { table, .. } => {
            if let Some(stored) = inner.containers.get(&ResourceRef::table(table)) {
                items.extend(stored.iter().map(|(_, payload)| payload.clone()));
            }
        }
        _ => {}
    }
    items
}

fn merge_attributes(resource: &mut Resource, attributes: &Value) {
    if let (Value::Object(current), Value::Object(new)) = (&mut resource.attributes, attributes) {
        for (k, v) in new {
            current.insert(k.clone(), v.clone());
        }
    } else if !attributes.is_null() {
        resource.attributes = attributes.clone();
    }
}

#[async_trait]
impl RemoteResourceService for InMemoryService {
    async fn create(&self, target: &ResourceRef, params: &Value) -> RemoteResult<Resource> {
        let mut inner = self.begin(Op::Create)?;

        // Items are written with put semantics
        let upsert = matches!(target, ResourceRef::Item { .. });
        if let Some(existing) = inner.resources.get(target) {
            if !existing.state.is_missing() && !upsert {
                return Err(RemoteError::http(
                    409,
                    Some("ResourceInUseException".into()),
                    format!("{target} already exists"),
                ));
            }
        }

        let state = inner.create_state.unwrap_or(ResourceState::Ready);
        let attributes = if params.is_null() { json!({}) } else { params.clone() };
        let resource = Resource::new(target.clone(), state, attributes);
        inner.resources.insert(target.clone(), resource.clone());
        Ok(resource)
    }

    async fn delete(&self, target: &ResourceRef) -> RemoteResult<()> {
        let mut inner = self.begin(Op::Delete)?;

        let present = inner
            .resources
            .get(target)
            .map(|r| !r.state.is_missing())
            .unwrap_or(false);
        if !present {
            return Err(not_found(target));
        }

        let delete_state = inner.delete_state;
        match delete_state {
            Some(state) => {
                if let Some(resource) = inner.resources.get_mut(target) {
                    resource.state = state;
                }
            }
            None => {
                inner.resources.remove(target);
                inner.contents.remove(target);
            }
        }
        Ok(())
    }

    async fn get(&self, target: &ResourceRef) -> RemoteResult<Resource> {
        let mut inner = self.begin(Op::Get)?;

        let scripted = match inner.scripts.get_mut(target) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().copied(),
            None => None,
        };

        if let Some(state) = scripted {
            let resource = inner
                .resources
                .entry(target.clone())
                .or_insert_with(|| Resource::new(target.clone(), state, json!({})));
            resource.state = state;
            if state.is_missing() {
                return Err(not_found(target));
            }
            return Ok(resource.clone());
        }

        match inner.resources.get(target) {
            Some(resource) if !resource.state.is_missing() => Ok(resource.clone()),
            _ => Err(not_found(target)),
        }
    }

    async fn list_page(&self, query: &ListQuery, cursor: Option<&str>) -> RemoteResult<Page> {
        let inner = self.begin(Op::ListPage)?;

        let items = inner
            .collections
            .iter()
            .find(|(c, _)| c == &query.collection)
            .map(|(_, items)| items.clone())
            .unwrap_or_else(|| derived_items(&inner, &query.collection));

        let offset = match cursor {
            Some(token) => token
                .strip_prefix("offset:")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| RemoteError::http(400, Some("InvalidNextToken".into()), "invalid cursor"))?,
            None => 0,
        };

        let page_size = query
            .page_size
            .map(|n| n.max(1) as usize)
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let end = (offset + page_size).min(items.len());
        let page: Vec<Value> = items.get(offset..end).map(<[Value]>::to_vec).unwrap_or_default();

        let next = if end < items.len() {
            Cursor::next(format!("offset:{end}"))
        } else {
            Cursor::exhausted()
        };

        Ok(Page { items: page, next })
    }

    async fn batch_submit(
        &self,
        container: &ResourceRef,
        chunk: &[BatchItem],
    ) -> RemoteResult<Vec<ItemOutcome>> {
        let mut guard = self.begin(Op::BatchSubmit)?;
        let inner = &mut *guard;

        let call_index = inner.chunk_sizes.len();
        inner.chunk_sizes.push(chunk.len());
        if let Some(err) = inner.batch_call_failures.remove(&call_index) {
            return Err(err);
        }

        let mut outcomes = Vec::with_capacity(chunk.len());
        for item in chunk {
            if let Some(err) = inner.item_failures.get(&item.key) {
                outcomes.push(ItemOutcome::Failed(err.clone()));
                continue;
            }
            if inner.unprocessed_once.remove(&item.key) {
                outcomes.push(ItemOutcome::Unprocessed);
                continue;
            }

            let stored = inner.containers.entry(container.clone()).or_default();
            stored.retain(|(key, _)| key != &item.key);
            match &item.op {
                BatchOp::Put(payload) => stored.push((item.key.clone(), payload.clone())),
                BatchOp::Delete => {
                    if let ResourceRef::Bucket { name } = container {
                        inner.resources.retain(|r, _| {
                            !matches!(r, ResourceRef::Object { bucket, key, .. } if bucket == name && key == &item.key)
                        });
                    }
                }
            }
            outcomes.push(ItemOutcome::Applied);
        }
        Ok(outcomes)
    }

    async fn invoke(&self, target: &ResourceRef, action: &Action) -> RemoteResult<Value> {
        let mut inner = self.begin(Op::Invoke)?;
        inner.invocations.push((target.clone(), action.clone()));

        match action {
            Action::Upload { body } => {
                let size = body.len();
                inner.contents.insert(target.clone(), body.clone());
                let meta = json!({ "size": size });
                inner.resources.insert(
                    target.clone(),
                    Resource::new(target.clone(), ResourceState::Ready, meta.clone()),
                );
                Ok(meta)
            }
            Action::Publish { .. } => {
                if !inner.resources.contains_key(target) {
                    return Err(not_found(target));
                }
                Ok(json!({ "messageId": uuid::Uuid::new_v4().to_string() }))
            }
            Action::Subscribe { protocol, endpoint } => {
                if !inner.resources.contains_key(target) {
                    return Err(not_found(target));
                }
                let arn = format!("{}:{}", target, uuid::Uuid::new_v4().simple());
                let subscription = ResourceRef::Subscription { arn: arn.clone() };
                inner.resources.insert(
                    subscription.clone(),
                    Resource::new(
                        subscription,
                        ResourceState::Ready,
                        json!({ "protocol": protocol, "endpoint": endpoint }),
                    ),
                );
                Ok(json!({ "subscriptionArn": arn }))
            }
            Action::EnableVersioning => {
                let resource = inner.resources.get_mut(target).ok_or_else(|| not_found(target))?;
                merge_attributes(resource, &json!({ "versioning": "Enabled" }));
                Ok(json!({ "status": "Enabled" }))
            }
            Action::Update { attributes } => {
                let resource = inner.resources.get_mut(target).ok_or_else(|| not_found(target))?;
                let update = serde_json::to_value(attributes).unwrap_or(Value::Null);
                merge_attributes(resource, &update);
                Ok(resource.attributes.clone())
            }
        }
    }

    async fn download(&self, target: &ResourceRef) -> RemoteResult<Vec<u8>> {
        let inner = self.begin(Op::Download)?;
        inner
            .contents
            .get(target)
            .cloned()
            .ok_or_else(|| not_found(target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_then_conflict() {
        let svc = InMemoryService::new();
        let t = ResourceRef::bucket("b");
        svc.create(&t, &Value::Null).await.unwrap();
        let err = svc.create(&t, &Value::Null).await.unwrap_err();
        assert_eq!(err.status, Some(409));
        assert_eq!(svc.calls(Op::Create), 2);
    }

    #[tokio::test]
    async fn test_scripted_states_stick_on_last() {
        let svc = InMemoryService::new();
        let t = ResourceRef::table("t");
        svc.script_states(&t, [ResourceState::Creating, ResourceState::Ready]);
        assert_eq!(svc.get(&t).await.unwrap().state, ResourceState::Creating);
        assert_eq!(svc.get(&t).await.unwrap().state, ResourceState::Ready);
        assert_eq!(svc.get(&t).await.unwrap().state, ResourceState::Ready);
    }

    #[tokio::test]
    async fn test_paging_offsets() {
        let svc = InMemoryService::new();
        svc.seed_collection(Collection::Topics, (0..5).map(|i| json!(i)).collect());
        let q = ListQuery::new(Collection::Topics).with_page_size(2);

        let p1 = svc.list_page(&q, None).await.unwrap();
        assert_eq!(p1.items, vec![json!(0), json!(1)]);
        let p2 = svc.list_page(&q, p1.next.token()).await.unwrap();
        assert_eq!(p2.items, vec![json!(2), json!(3)]);
        let p3 = svc.list_page(&q, p2.next.token()).await.unwrap();
        assert_eq!(p3.items, vec![json!(4)]);
        assert!(p3.next.is_exhausted());
    }

    #[tokio::test]
    async fn test_unseeded_listing_follows_resources() {
        let svc = InMemoryService::new();
        svc.insert(ResourceRef::object("b", "logs/1", Some("v1")), ResourceState::Ready, json!({}));
        svc.insert(ResourceRef::object("b", "img/2", None), ResourceState::Ready, json!({}));
        svc.insert(ResourceRef::object("other", "logs/3", None), ResourceState::Ready, json!({}));

        let q = ListQuery::new(Collection::ObjectVersions {
            bucket: "b".into(),
            prefix: Some("logs/".into()),
        });
        let page = svc.list_page(&q, None).await.unwrap();
        assert_eq!(page.items, vec![json!({"Key": "logs/1", "VersionId": "v1"})]);
        assert!(page.next.is_exhausted());
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let svc = InMemoryService::new();
        let t = ResourceRef::bucket("b");
        svc.insert(t.clone(), ResourceState::Ready, json!({}));
        svc.fail_next(Op::Get, RemoteError::transport("reset"));
        assert!(svc.get(&t).await.is_err());
        assert!(svc.get(&t).await.is_ok());
    }
}
