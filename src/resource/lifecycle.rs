//! Resource lifecycle
//!
//! Get-or-create and delete-and-wait on top of a [`RemoteResourceService`],
//! with bounded polling in between. Every wait is an explicit loop limited
//! by a deadline, a poll budget and a retry budget.

use super::classify::{classify, ErrorKind};
use super::error::{CoreError, CoreResult};
use crate::remote::model::{RemoteError, Resource, ResourceRef, ResourceState};
use crate::remote::RemoteResourceService;
use serde_json::Value;
use std::time::Duration;
use tokio::time::{sleep_until, Instant};

/// Deadline used when the requested timeout does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// How a waiter spaces out its state checks
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first check
    pub initial_interval: Duration,
    /// Upper bound for the backoff delay
    pub max_interval: Duration,
    /// Growth factor between checks; 1.0 polls at a fixed interval
    pub multiplier: f64,
    /// Consecutive retryable failures tolerated before giving up
    pub max_attempts: u32,
    /// Optional cap on the number of state checks per wait
    pub max_polls: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            multiplier: 1.5,
            max_attempts: 5,
            max_polls: None,
        }
    }
}

impl PollPolicy {
    /// Poll at a constant interval
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            initial_interval: interval,
            max_interval: interval,
            multiplier: 1.0,
            max_attempts,
            max_polls: None,
        }
    }

    #[must_use]
    pub fn with_max_polls(mut self, max_polls: u32) -> Self {
        self.max_polls = Some(max_polls);
        self
    }

    /// Delay before check number `step` (0-based), never shorter than the
    /// provider's retry hint
    pub fn delay(&self, step: u32, hint: Option<Duration>) -> Duration {
        let factor = self.multiplier.max(1.0).powi(step.min(64) as i32);
        let scaled = self.initial_interval.as_secs_f64() * factor;
        let capped = scaled.min(self.max_interval.as_secs_f64());
        let backoff = Duration::from_secs_f64(capped.max(0.0));
        match hint {
            Some(h) if h > backoff => h,
            _ => backoff,
        }
    }

    /// Like [`delay`](Self::delay), but the hint never pushes past `max_interval`
    pub fn capped_delay(&self, step: u32, hint: Option<Duration>) -> Duration {
        self.delay(step, hint.map(|h| h.min(self.max_interval)))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Bounds shared by the steps of one lifecycle call
struct Budget {
    started: Instant,
    deadline: Instant,
}

impl Budget {
    fn new(timeout: Duration) -> Self {
        let started = Instant::now();
        let deadline = started
            .checked_add(timeout)
            .or_else(|| started.checked_add(FAR_FUTURE))
            .unwrap_or(started);
        Self { started, deadline }
    }

    fn timeout(&self, target: &ResourceRef, expected: ResourceState) -> CoreError {
        CoreError::Timeout {
            target: target.clone(),
            expected,
            waited: Instant::now().saturating_duration_since(self.started),
        }
    }

    fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Sleep for `delay`, or until the deadline if that comes first
    async fn pause(&self, delay: Duration) {
        let wake = Instant::now()
            .checked_add(delay)
            .map_or(self.deadline, |w| w.min(self.deadline));
        sleep_until(wake).await;
    }
}

/// Lifecycle operations against one provider
#[derive(Debug, Clone)]
pub struct ResourceLifecycle<'a, S: RemoteResourceService + ?Sized> {
    service: &'a S,
    policy: PollPolicy,
}

impl<'a, S: RemoteResourceService + ?Sized> ResourceLifecycle<'a, S> {
    pub fn new(service: &'a S, policy: PollPolicy) -> Self {
        Self { service, policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Return `target`, creating it first when it is missing and
    /// `create_params` are given.
    ///
    /// The boolean is true only when this call issued the create. Waits for
    /// the resource to become `Ready` within `timeout`.
    pub async fn get_or_create(
        &self,
        target: &ResourceRef,
        create_params: Option<&Value>,
        timeout: Duration,
    ) -> CoreResult<(Resource, bool)> {
        let budget = Budget::new(timeout);

        match self.read(target, &budget, ResourceState::Ready).await? {
            Some(resource) if resource.state == ResourceState::Ready => {
                tracing::debug!("{} already exists", target);
                return Ok((resource, false));
            }
            Some(resource) if resource.state == ResourceState::Creating => {
                tracing::info!("{} is being created elsewhere, waiting", target);
                let resource = self.wait_until_ready(target, &budget).await?;
                return Ok((resource, false));
            }
            Some(resource) => {
                return Err(CoreError::Conflict {
                    target: target.clone(),
                    source: RemoteError::coded(
                        "ResourceInUse",
                        format!("{} is {}", target, resource.state),
                    ),
                });
            }
            None => {}
        }

        let Some(params) = create_params else {
            tracing::warn!("{} does not exist", target);
            return Err(CoreError::NotFound {
                target: target.clone(),
                source: RemoteError::coded("NotFound", format!("{target} does not exist")),
            });
        };

        tracing::info!("Creating {}", target);
        match self.service.create(target, params).await {
            Ok(resource) if resource.state == ResourceState::Ready => {
                tracing::info!("{} created", target);
                Ok((resource, true))
            }
            Ok(_) => {
                let resource = self.wait_until_ready(target, &budget).await?;
                tracing::info!("{} created", target);
                Ok((resource, true))
            }
            Err(err) if classify(&err).kind == ErrorKind::Conflict => {
                // Another caller may have won the race; only their resource counts
                match self.read(target, &budget, ResourceState::Ready).await {
                    Ok(Some(resource)) if resource.state == ResourceState::Ready => {
                        Ok((resource, false))
                    }
                    Ok(Some(resource)) if resource.state == ResourceState::Creating => {
                        let resource = self.wait_until_ready(target, &budget).await?;
                        Ok((resource, false))
                    }
                    _ => Err(CoreError::Conflict {
                        target: target.clone(),
                        source: err,
                    }),
                }
            }
            Err(err) => Err(CoreError::from_remote(target, err)),
        }
    }

    /// Delete `target` and wait until it is gone.
    ///
    /// Deleting something that does not exist succeeds.
    pub async fn delete_and_wait(&self, target: &ResourceRef, timeout: Duration) -> CoreResult<()> {
        let budget = Budget::new(timeout);

        tracing::info!("Deleting {}", target);
        match self.service.delete(target).await {
            Ok(()) => {}
            Err(err) if classify(&err).kind == ErrorKind::NotFound => {
                tracing::debug!("{} already gone", target);
                return Ok(());
            }
            Err(err) => return Err(CoreError::from_remote(target, err)),
        }

        self.wait_until_gone(target, &budget).await?;
        tracing::info!("{} deleted", target);
        Ok(())
    }

    /// Current state of `target`; `None` when it does not exist
    async fn read(
        &self,
        target: &ResourceRef,
        budget: &Budget,
        expected: ResourceState,
    ) -> CoreResult<Option<Resource>> {
        let mut failures = 0;
        loop {
            let err = match self.service.get(target).await {
                Ok(resource) if resource.state.is_missing() => return Ok(None),
                Ok(resource) => return Ok(Some(resource)),
                Err(err) => err,
            };

            let class = classify(&err);
            match class.kind {
                ErrorKind::NotFound => return Ok(None),
                ErrorKind::Retryable => {
                    failures += 1;
                    if failures >= self.policy.max_attempts() {
                        return Err(CoreError::RetriesExhausted {
                            target: target.clone(),
                            attempts: failures,
                            source: err,
                        });
                    }
                    if budget.expired() {
                        return Err(budget.timeout(target, expected));
                    }
                    tracing::debug!("Retrying read of {} after: {}", target, err);
                    budget
                        .pause(self.policy.delay(failures - 1, class.retry_after))
                        .await;
                }
                _ => return Err(CoreError::from_remote(target, err)),
            }
        }
    }

    async fn wait_until_ready(&self, target: &ResourceRef, budget: &Budget) -> CoreResult<Resource> {
        self.wait_until(target, ResourceState::Ready, budget)
            .await?
            .ok_or_else(|| budget.timeout(target, ResourceState::Ready))
    }

    async fn wait_until_gone(&self, target: &ResourceRef, budget: &Budget) -> CoreResult<()> {
        self.wait_until(target, ResourceState::Gone, budget).await?;
        Ok(())
    }

    /// Poll until `target` reaches `expected`.
    ///
    /// Returns the resource once it is `Ready`, or `None` once it is gone.
    async fn wait_until(
        &self,
        target: &ResourceRef,
        expected: ResourceState,
        budget: &Budget,
    ) -> CoreResult<Option<Resource>> {
        let mut polls: u32 = 0;
        let mut failures: u32 = 0;
        let mut hint = None;

        loop {
            if budget.expired() || self.policy.max_polls.is_some_and(|max| polls >= max) {
                return Err(budget.timeout(target, expected));
            }

            budget.pause(self.policy.delay(polls, hint)).await;
            polls += 1;

            match self.service.get(target).await {
                Ok(resource) => {
                    failures = 0;
                    hint = None;
                    tracing::debug!("{} is {} (poll {})", target, resource.state, polls);

                    match (expected, resource.state) {
                        (ResourceState::Gone, state) if state.is_missing() => return Ok(None),
                        (ResourceState::Ready, ResourceState::Ready) => return Ok(Some(resource)),
                        (ResourceState::Ready, ResourceState::Deleting) => {
                            return Err(CoreError::Conflict {
                                target: target.clone(),
                                source: RemoteError::coded(
                                    "ResourceInUse",
                                    format!("{target} is being deleted"),
                                ),
                            });
                        }
                        _ => {}
                    }
                }
                Err(err) => {
                    let class = classify(&err);
                    match class.kind {
                        ErrorKind::NotFound if expected == ResourceState::Gone => return Ok(None),
                        // Freshly created resources can take a moment to become visible
                        ErrorKind::NotFound => {
                            failures = 0;
                            hint = None;
                        }
                        ErrorKind::Retryable => {
                            failures += 1;
                            if failures >= self.policy.max_attempts() {
                                return Err(CoreError::RetriesExhausted {
                                    target: target.clone(),
                                    attempts: failures,
                                    source: err,
                                });
                            }
                            tracing::debug!("Poll of {} failed, retrying: {}", target, err);
                            hint = class.retry_after;
                        }
                        _ => return Err(CoreError::from_remote(target, err)),
                    }
                }
            }
        }
    }
}
