//! Commands
//!
//! One module per service area. Each command is a typed clap variant and runs
//! against a [`Context`], returning the JSON value to print.
//!
//! # Module Structure
//!
//! - [`logs`] - Log groups, streams and event filtering
//! - [`tables`] - Tables and items
//! - [`objects`] - Buckets, objects and versions
//! - [`topics`] - Topics, subscriptions and messages

pub mod logs;
pub mod objects;
pub mod tables;
pub mod topics;

use crate::remote::RemoteResourceService;
use crate::resource::{ChunkedBatch, PagedLister, PollPolicy, ResourceLifecycle};
use anyhow::Result;
use clap::Subcommand;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Service area commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log groups, streams and events
    #[command(subcommand)]
    Logs(logs::LogsCommand),
    /// Tables and items
    #[command(subcommand)]
    Tables(tables::TablesCommand),
    /// Buckets and objects
    #[command(subcommand)]
    Objects(objects::ObjectsCommand),
    /// Notification topics and subscriptions
    #[command(subcommand)]
    Topics(topics::TopicsCommand),
}

/// Everything a command needs to talk to the provider
#[derive(Clone)]
pub struct Context {
    pub service: Arc<dyn RemoteResourceService>,
    pub policy: PollPolicy,
    /// Wait budget for create/delete
    pub timeout: Duration,
    pub region: String,
    pub batch_concurrency: usize,
}

impl Context {
    pub fn new(service: Arc<dyn RemoteResourceService>, region: &str) -> Self {
        Self {
            service,
            policy: PollPolicy::default(),
            timeout: Duration::from_secs(crate::config::DEFAULT_TIMEOUT_SECS),
            region: region.to_string(),
            batch_concurrency: 1,
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_batch_concurrency(mut self, concurrency: usize) -> Self {
        self.batch_concurrency = concurrency.max(1);
        self
    }

    pub fn service(&self) -> &(dyn RemoteResourceService + 'static) {
        self.service.as_ref()
    }

    pub fn lifecycle(&self) -> ResourceLifecycle<'_, dyn RemoteResourceService> {
        ResourceLifecycle::new(self.service(), self.policy.clone())
    }

    pub fn lister(&self) -> PagedLister<'_, dyn RemoteResourceService> {
        PagedLister::new(self.service())
    }

    pub fn batch(&self) -> ChunkedBatch<'_, dyn RemoteResourceService> {
        ChunkedBatch::new(self.service(), self.policy.clone()).with_concurrency(self.batch_concurrency)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("region", &self.region)
            .field("timeout", &self.timeout)
            .field("batch_concurrency", &self.batch_concurrency)
            .finish_non_exhaustive()
    }
}

/// Run a command and return what should be printed
pub async fn run(ctx: &Context, command: &Command) -> Result<Value> {
    match command {
        Command::Logs(cmd) => logs::run(ctx, cmd).await,
        Command::Tables(cmd) => tables::run(ctx, cmd).await,
        Command::Objects(cmd) => objects::run(ctx, cmd).await,
        Command::Topics(cmd) => topics::run(ctx, cmd).await,
    }
}
