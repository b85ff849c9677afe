//! skyctl
//!
//! Command-line front end for managed log, table, object and notification
//! services. The resource core in [`resource`] is provider independent and
//! only talks to the [`remote::RemoteResourceService`] trait.

pub mod commands;
pub mod config;
pub mod output;
pub mod remote;
pub mod resource;

/// Version injected at compile time via SKYCTL_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("SKYCTL_VERSION") {
    Some(v) => v,
    None => "dev",
};
