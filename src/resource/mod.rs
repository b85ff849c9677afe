//! Resource core
//!
//! Provider-independent engineering shared by every command: pagination,
//! bulk mutations, create/delete with waiting, and error classification.
//! Everything here talks to a [`RemoteResourceService`] and nothing else.
//!
//! # Module Structure
//!
//! - [`cursor`] - Opaque pagination cursor
//! - [`fetcher`] - Lazy listing across pages
//! - [`batch`] - Chunked bulk mutations with per-item outcomes
//! - [`lifecycle`] - Get-or-create and delete-and-wait with bounded polling
//! - [`classify`] - Maps remote failures to outcome classes
//! - [`error`] - Core error type
//!
//! # Example
//!
//! ```ignore
//! use skyctl::remote::{InMemoryService, ResourceRef};
//! use skyctl::resource::{PollPolicy, ResourceLifecycle};
//!
//! async fn ensure_bucket(svc: &InMemoryService) -> skyctl::resource::CoreResult<bool> {
//!     let lifecycle = ResourceLifecycle::new(svc, PollPolicy::default());
//!     let params = serde_json::json!({ "region": "ap-southeast-1" });
//!     let (_, created) = lifecycle
//!         .get_or_create(&ResourceRef::bucket("photos"), Some(&params), std::time::Duration::from_secs(30))
//!         .await?;
//!     Ok(created)
//! }
//! ```
//!
//! [`RemoteResourceService`]: crate::remote::RemoteResourceService

pub mod batch;
pub mod classify;
pub mod cursor;
pub mod error;
pub mod fetcher;
pub mod lifecycle;

pub use batch::{partition, BatchOutcome, BatchResult, ChunkedBatch, FailureReason};
pub use classify::{classify, describe, ErrorClass, ErrorKind};
pub use cursor::Cursor;
pub use error::{CoreError, CoreResult};
pub use fetcher::PagedLister;
pub use lifecycle::{PollPolicy, ResourceLifecycle};
