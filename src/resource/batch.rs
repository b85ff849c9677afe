//! Chunked bulk mutations
//!
//! Splits a [`BatchRequest`] into chunks no larger than the provider accepts,
//! submits them, and reports one [`BatchOutcome`] per input item. A failing
//! chunk never stops the others.

use super::classify::{classify, ErrorKind};
use super::lifecycle::PollPolicy;
use crate::remote::model::{BatchItem, BatchOp, BatchRequest, ItemOutcome, RemoteError, ResourceRef};
use crate::remote::RemoteResourceService;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Why an item was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: ErrorKind,
    pub message: String,
}

impl FailureReason {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    fn from_remote(err: &RemoteError) -> Self {
        Self::new(classify(err).kind, err.to_string())
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Final status of one item of a bulk request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Applied,
    Failed(FailureReason),
    /// Delete of an item that was already gone
    Skipped,
}

impl BatchOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    pub fn failure(&self) -> Option<&FailureReason> {
        match self {
            Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Outcomes of a bulk request, in request order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    outcomes: Vec<BatchOutcome>,
}

impl BatchResult {
    pub fn outcomes(&self) -> &[BatchOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.failure().is_some()).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::Skipped))
            .count()
    }

    /// Failed items as `(index in request, reason)`
    pub fn failures(&self) -> impl Iterator<Item = (usize, &FailureReason)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.failure().map(|r| (i, r)))
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

impl IntoIterator for BatchResult {
    type Item = BatchOutcome;
    type IntoIter = std::vec::IntoIter<BatchOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

/// Split `items` into consecutive chunks of at most `max` elements.
///
/// Concatenating the chunks gives back `items` unchanged.
pub fn partition<T>(items: &[T], max: NonZeroUsize) -> Vec<&[T]> {
    items.chunks(max.get()).collect()
}

/// Submits bulk requests chunk by chunk
#[derive(Debug, Clone)]
pub struct ChunkedBatch<'a, S: RemoteResourceService + ?Sized> {
    service: &'a S,
    policy: PollPolicy,
    concurrency: usize,
}

impl<'a, S: RemoteResourceService + ?Sized> ChunkedBatch<'a, S> {
    pub fn new(service: &'a S, policy: PollPolicy) -> Self {
        Self {
            service,
            policy,
            concurrency: 1,
        }
    }

    /// Number of chunks in flight at once (at least 1)
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Submit `request` in chunks of at most `max_chunk_size` items.
    ///
    /// The result has exactly one outcome per request item, in order.
    pub async fn submit(&self, request: &BatchRequest, max_chunk_size: NonZeroUsize) -> BatchResult {
        if request.is_empty() {
            return BatchResult::default();
        }

        let chunks = partition(&request.items, max_chunk_size);
        let total = chunks.len();
        tracing::info!(
            "Submitting {} items to {} in {} chunk(s)",
            request.len(),
            request.container,
            total
        );

        let per_chunk: Vec<Vec<BatchOutcome>> = stream::iter(chunks.into_iter().enumerate())
            .map(|(index, chunk)| self.submit_chunk(&request.container, index, total, chunk))
            .buffered(self.concurrency)
            .collect()
            .await;

        let result = BatchResult {
            outcomes: per_chunk.into_iter().flatten().collect(),
        };
        tracing::info!(
            "Batch on {}: {} applied, {} skipped, {} failed",
            request.container,
            result.applied(),
            result.skipped(),
            result.failed()
        );
        result
    }

    async fn submit_chunk(
        &self,
        container: &ResourceRef,
        index: usize,
        total: usize,
        chunk: &[BatchItem],
    ) -> Vec<BatchOutcome> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut outcomes: Vec<Option<BatchOutcome>> = vec![None; chunk.len()];
        let mut pending: Vec<usize> = (0..chunk.len()).collect();
        let mut call_failures: u32 = 0;
        let mut rounds: u32 = 0;

        tracing::debug!("Chunk {}/{}: {} items", index + 1, total, chunk.len());

        while !pending.is_empty() {
            let items: Vec<BatchItem> = pending.iter().map(|&i| chunk[i].clone()).collect();

            let reported = match self.service.batch_submit(container, &items).await {
                Ok(reported) => reported,
                Err(err) => {
                    let class = classify(&err);
                    call_failures += 1;
                    if class.kind.is_retryable() && call_failures < max_attempts {
                        tracing::debug!("Chunk {}/{} failed, retrying: {}", index + 1, total, err);
                        tokio::time::sleep(self.policy.capped_delay(call_failures - 1, class.retry_after)).await;
                        continue;
                    }
                    tracing::warn!("Chunk {}/{} failed: {}", index + 1, total, err);
                    let reason = FailureReason::new(class.kind, err.to_string());
                    fail_all(&mut outcomes, &pending, &reason);
                    break;
                }
            };

            if reported.len() != items.len() {
                tracing::warn!(
                    "Chunk {}/{}: provider reported {} outcomes for {} items",
                    index + 1,
                    total,
                    reported.len(),
                    items.len()
                );
                let reason = FailureReason::new(
                    ErrorKind::Fatal,
                    format!(
                        "provider reported {} outcomes for {} items",
                        reported.len(),
                        items.len()
                    ),
                );
                fail_all(&mut outcomes, &pending, &reason);
                break;
            }

            call_failures = 0;
            rounds += 1;
            let mut retry = Vec::new();
            let mut hint: Option<Duration> = None;

            for (&i, outcome) in pending.iter().zip(reported) {
                match outcome {
                    ItemOutcome::Applied => outcomes[i] = Some(BatchOutcome::Applied),
                    ItemOutcome::Unprocessed => retry.push((
                        i,
                        FailureReason::new(ErrorKind::Retryable, "item was not processed"),
                    )),
                    ItemOutcome::Failed(err) => {
                        let class = classify(&err);
                        match class.kind {
                            ErrorKind::NotFound if chunk[i].op == BatchOp::Delete => {
                                outcomes[i] = Some(BatchOutcome::Skipped);
                            }
                            ErrorKind::Retryable => {
                                hint = hint.max(class.retry_after);
                                retry.push((i, FailureReason::from_remote(&err)));
                            }
                            _ => outcomes[i] = Some(BatchOutcome::Failed(FailureReason::from_remote(&err))),
                        }
                    }
                }
            }

            if retry.is_empty() {
                break;
            }
            if rounds >= max_attempts {
                tracing::warn!(
                    "Chunk {}/{}: {} items still pending after {} attempts",
                    index + 1,
                    total,
                    retry.len(),
                    rounds
                );
                for (i, reason) in retry {
                    outcomes[i] = Some(BatchOutcome::Failed(reason));
                }
                break;
            }

            tracing::debug!("Chunk {}/{}: resubmitting {} items", index + 1, total, retry.len());
            pending = retry.into_iter().map(|(i, _)| i).collect();
            tokio::time::sleep(self.policy.capped_delay(rounds - 1, hint)).await;
        }

        outcomes
            .into_iter()
            .map(|o| {
                o.unwrap_or_else(|| {
                    BatchOutcome::Failed(FailureReason::new(ErrorKind::Fatal, "no outcome reported"))
                })
            })
            .collect()
    }
}

fn fail_all(outcomes: &mut [Option<BatchOutcome>], pending: &[usize], reason: &FailureReason) {
    for &i in pending {
        outcomes[i] = Some(BatchOutcome::Failed(reason.clone()));
    }
}
