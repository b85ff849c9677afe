//! Remote service boundary
//!
//! Everything the resource core knows about a cloud provider goes through
//! [`RemoteResourceService`]. Concrete providers live alongside it.
//!
//! # Module Structure
//!
//! - [`model`] - Identifiers, states and request/response shapes
//! - [`http`] - HTTP utilities for JSON gateway calls
//! - [`client`] - [`HttpResourceService`], the provider used by the CLI
//! - [`memory`] - In-memory provider for tests and dry runs
//!
//! # Example
//!
//! ```ignore
//! use skyctl::remote::{HttpResourceService, RemoteResourceService, ResourceRef};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let service = HttpResourceService::new("http://localhost:4566", "eu-west-1")?;
//!     let bucket = service.get(&ResourceRef::bucket("photos")).await?;
//!     println!("{} is {}", bucket.target, bucket.state);
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;
pub mod memory;
pub mod model;

use async_trait::async_trait;
use serde_json::Value;

pub use client::HttpResourceService;
pub use memory::InMemoryService;
pub use model::{
    Action, BatchItem, BatchOp, BatchRequest, Collection, ItemOutcome, ListQuery, Page,
    RemoteError, RemoteResult, Resource, ResourceRef, ResourceState,
};

/// Capability set every provider implements.
///
/// Reads (`get`, `list_page`) must be side-effect free so callers can repeat
/// them while polling.
#[async_trait]
pub trait RemoteResourceService: Send + Sync {
    /// Create `target`. The returned resource may still be `Creating`.
    async fn create(&self, target: &ResourceRef, params: &Value) -> RemoteResult<Resource>;

    /// Request deletion of `target`
    async fn delete(&self, target: &ResourceRef) -> RemoteResult<()>;

    /// Read the current state of `target`.
    ///
    /// Providers may report a missing resource either as a `NotFound` error or
    /// as a resource in the `Absent`/`Gone` state.
    async fn get(&self, target: &ResourceRef) -> RemoteResult<Resource>;

    /// Fetch one page of `query`, continuing from `cursor` when given
    async fn list_page(&self, query: &ListQuery, cursor: Option<&str>) -> RemoteResult<Page>;

    /// Apply a chunk of mutations to `container`, one outcome per item
    async fn batch_submit(
        &self,
        container: &ResourceRef,
        chunk: &[BatchItem],
    ) -> RemoteResult<Vec<ItemOutcome>>;

    /// Run a service specific operation against `target`
    async fn invoke(&self, target: &ResourceRef, action: &Action) -> RemoteResult<Value>;

    /// Fetch the raw content of an object
    async fn download(&self, target: &ResourceRef) -> RemoteResult<Vec<u8>>;
}
