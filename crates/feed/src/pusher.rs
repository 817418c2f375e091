//! The docid push engine: batching, per-batch retry, full-push retry, and
//! the one-at-a-time gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use sb_domain::adaptor::{Adaptor, ListingError, RecordPusher};
use sb_domain::docid::DocIdCodec;
use sb_domain::record::Record;
use sb_journal::{Journal, PushOutcome};

use crate::manifest::{ManifestMaker, FEEDTYPE};
use crate::sender::{FeedError, ManifestTransport};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Retry policies
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Consulted once per failed send with the number of the *prospective* next
/// attempt. `Some(delay)` retries after the delay; `None` gives up and the
/// batch fails.
pub trait FeedErrorHandler: Send + Sync {
    fn failed_to_connect(&self, err: &FeedError, next_attempt: u32) -> Option<Duration>;
    fn failed_writing(&self, err: &FeedError, next_attempt: u32) -> Option<Duration>;
    fn failed_reading_reply(&self, err: &FeedError, next_attempt: u32) -> Option<Duration>;
}

/// Up to 12 send attempts, sleeping `5000 ms × attempt#` after each failure.
pub struct DefaultFeedErrorHandler {
    pub max_attempts: u32,
}

impl Default for DefaultFeedErrorHandler {
    fn default() -> Self {
        Self { max_attempts: 12 }
    }
}

impl DefaultFeedErrorHandler {
    fn backoff(&self, next_attempt: u32) -> Option<Duration> {
        if next_attempt > self.max_attempts {
            None
        } else {
            Some(Duration::from_millis(5000 * u64::from(next_attempt - 1)))
        }
    }
}

impl FeedErrorHandler for DefaultFeedErrorHandler {
    fn failed_to_connect(&self, _err: &FeedError, next_attempt: u32) -> Option<Duration> {
        self.backoff(next_attempt)
    }

    fn failed_writing(&self, _err: &FeedError, next_attempt: u32) -> Option<Duration> {
        self.backoff(next_attempt)
    }

    fn failed_reading_reply(&self, _err: &FeedError, next_attempt: u32) -> Option<Duration> {
        self.backoff(next_attempt)
    }
}

/// Consulted when the adaptor's listing itself fails, with the number of the
/// attempt that just failed.
pub trait ListingErrorHandler: Send + Sync {
    fn should_retry(&self, err: &ListingError, attempt: u32) -> Option<Duration>;
}

pub struct DefaultListingErrorHandler {
    pub max_attempts: u32,
}

impl Default for DefaultListingErrorHandler {
    fn default() -> Self {
        Self { max_attempts: 12 }
    }
}

impl ListingErrorHandler for DefaultListingErrorHandler {
    fn should_retry(&self, _err: &ListingError, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            None
        } else {
            Some(Duration::from_millis(5000 * u64::from(attempt)))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Batching pusher
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

enum BatchOutcome {
    Sent,
    Failed,
}

/// Consumes record streams in `feed.maxUrls`-sized batches, renders each
/// batch and submits it, retrying per failure kind. Batches go out in the
/// order the adaptor produced them; a batch is fully settled (including
/// retries) before the next one starts.
pub struct BatchingPusher {
    transport: Arc<dyn ManifestTransport>,
    maker: ManifestMaker,
    codec: Arc<DocIdCodec>,
    journal: Arc<Journal>,
    max_urls: usize,
    cancel: CancellationToken,
    default_handler: DefaultFeedErrorHandler,
}

impl BatchingPusher {
    pub fn new(
        transport: Arc<dyn ManifestTransport>,
        maker: ManifestMaker,
        codec: Arc<DocIdCodec>,
        journal: Arc<Journal>,
        max_urls: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            maker,
            codec,
            journal,
            max_urls: max_urls.max(1),
            cancel,
            default_handler: DefaultFeedErrorHandler::default(),
        }
    }

    /// Like [`RecordPusher::push_records`] but with a caller-supplied retry
    /// policy.
    pub async fn push_records_with(
        &self,
        records: Vec<Record>,
        handler: &dyn FeedErrorHandler,
    ) -> Result<Option<Record>, ListingError> {
        for batch in records.chunks(self.max_urls) {
            if self.cancel.is_cancelled() {
                return Err(ListingError::Interrupted);
            }
            match self.push_batch(batch, handler).await? {
                BatchOutcome::Sent => {}
                BatchOutcome::Failed => return Ok(Some(batch[0].clone())),
            }
        }
        Ok(None)
    }

    /// Submit one batch, retrying until the handler gives up.
    async fn push_batch(
        &self,
        batch: &[Record],
        handler: &dyn FeedErrorHandler,
    ) -> Result<BatchOutcome, ListingError> {
        let xml = match self.maker.render(&self.codec, batch) {
            Ok(xml) => xml,
            Err(reason) => {
                tracing::error!(%reason, "manifest rendering failed; abandoning batch");
                return Ok(BatchOutcome::Failed);
            }
        };

        let mut attempt: u32 = 1;
        loop {
            match self
                .transport
                .send(self.maker.datasource(), FEEDTYPE, &xml)
                .await
            {
                Ok(()) => {
                    for record in batch {
                        self.journal.record_pushed(record.doc_id());
                    }
                    tracing::debug!(records = batch.len(), attempt, "batch accepted");
                    return Ok(BatchOutcome::Sent);
                }
                Err(err) => {
                    let decision = match &err {
                        FeedError::FailedToConnect(_) => handler.failed_to_connect(&err, attempt + 1),
                        FeedError::FailedWriting(_) => handler.failed_writing(&err, attempt + 1),
                        FeedError::FailedReadingReply(_) => {
                            handler.failed_reading_reply(&err, attempt + 1)
                        }
                        // A definite answer from the indexer: retrying the
                        // same bytes cannot help.
                        FeedError::IndexerRejected { .. } => None,
                    };
                    match decision {
                        Some(delay) => {
                            tracing::warn!(attempt, error = %err, delay_ms = delay.as_millis() as u64, "feed send failed; retrying");
                            attempt += 1;
                            tokio::select! {
                                _ = self.cancel.cancelled() => return Err(ListingError::Interrupted),
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                        None => {
                            tracing::error!(attempt, error = %err, "feed send failed permanently");
                            return Ok(BatchOutcome::Failed);
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl RecordPusher for BatchingPusher {
    async fn push_records(&self, records: Vec<Record>) -> Result<Option<Record>, ListingError> {
        self.push_records_with(records, &self.default_handler).await
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Full-push runner
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Drives one complete `get_doc_ids` enumeration through the pusher.
///
/// Single-flight: a trigger arriving while a push is running is dropped with
/// a warning.
pub struct PushRunner {
    adaptor: Arc<dyn Adaptor>,
    pusher: Arc<BatchingPusher>,
    journal: Arc<Journal>,
    listing_handler: Arc<dyn ListingErrorHandler>,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl PushRunner {
    pub fn new(
        adaptor: Arc<dyn Adaptor>,
        pusher: Arc<BatchingPusher>,
        journal: Arc<Journal>,
        listing_handler: Arc<dyn ListingErrorHandler>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adaptor,
            pusher,
            journal,
            listing_handler,
            cancel,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a full push to completion. Returns the recorded outcome, or
    /// `None` when another push was already in flight.
    pub async fn run_full_push(&self) -> Option<PushOutcome> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("full push already in progress; dropping trigger");
            return None;
        }

        self.journal.record_full_push_started();
        tracing::info!("full push started");

        let mut attempt: u32 = 1;
        let outcome = loop {
            match self.adaptor.get_doc_ids(&*self.pusher).await {
                Ok(()) => break PushOutcome::Success,
                Err(ListingError::Interrupted) => break PushOutcome::Interruption,
                Err(err) => match self.listing_handler.should_retry(&err, attempt) {
                    Some(delay) => {
                        tracing::warn!(attempt, error = %err, "listing failed; retrying full push");
                        attempt += 1;
                        tokio::select! {
                            _ = self.cancel.cancelled() => break PushOutcome::Interruption,
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                    None => {
                        tracing::error!(attempt, error = %err, "listing failed permanently");
                        break PushOutcome::Failure;
                    }
                },
            }
        };

        self.journal.record_full_push_outcome(outcome);
        self.running.store(false, Ordering::SeqCst);
        tracing::info!(%outcome, "full push finished");
        Some(outcome)
    }

    /// One incremental pass for adaptors that support it. No single-flight
    /// gate and no full-push bookkeeping; failures are logged and the next
    /// poll tries again.
    pub async fn run_incremental_pass(&self) {
        match self.adaptor.get_modified_records(&*self.pusher).await {
            Ok(()) => {}
            Err(ListingError::Interrupted) => {
                tracing::debug!("incremental pass interrupted");
            }
            Err(err) => {
                tracing::warn!(error = %err, "incremental pass failed");
            }
        }
    }
}
