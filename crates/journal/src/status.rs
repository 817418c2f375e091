//! Status sources and the monitor aggregating them for the dashboard.

use std::sync::Arc;

use chrono::Duration;
use parking_lot::Mutex;
use serde::Serialize;

use crate::{Journal, PushOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Inactive,
    Unavailable,
    Normal,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    pub fn new(code: StatusCode) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn with_message(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

/// One named health signal shown on the dashboard.
pub trait StatusSource: Send + Sync {
    fn name(&self) -> &str;
    fn retrieve_status(&self) -> Status;
}

/// Aggregates registered sources; registration happens at startup, reads
/// happen from dashboard RPCs.
#[derive(Default)]
pub struct StatusMonitor {
    sources: Mutex<Vec<Arc<dyn StatusSource>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NamedStatus {
    pub source: String,
    #[serde(flatten)]
    pub status: Status,
}

impl StatusMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, source: Arc<dyn StatusSource>) {
        self.sources.lock().push(source);
    }

    pub fn retrieve_all(&self) -> Vec<NamedStatus> {
        self.sources
            .lock()
            .iter()
            .map(|s| NamedStatus {
                source: s.name().to_owned(),
                status: s.retrieve_status(),
            })
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Built-in sources
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Reports the outcome of the most recent full push.
pub struct LastPushSource {
    journal: Arc<Journal>,
}

impl LastPushSource {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self { journal }
    }
}

impl StatusSource for LastPushSource {
    fn name(&self) -> &str {
        "feed-push"
    }

    fn retrieve_status(&self) -> Status {
        match self.journal.last_full_push() {
            None => Status::with_message(StatusCode::Inactive, "no full push has completed yet"),
            Some((at, PushOutcome::Success)) => {
                Status::with_message(StatusCode::Normal, format!("last push succeeded at {at}"))
            }
            Some((at, PushOutcome::Interruption)) => Status::with_message(
                StatusCode::Warning,
                format!("last push was interrupted at {at}"),
            ),
            Some((at, PushOutcome::Failure)) => {
                Status::with_message(StatusCode::Error, format!("last push failed at {at}"))
            }
        }
    }
}

/// Watches the adaptor's document-retrieval error rate over the last 1000
/// requests: 1/16 warns, 1/8 errors.
pub struct RetrieverErrorSource {
    journal: Arc<Journal>,
}

impl RetrieverErrorSource {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self { journal }
    }
}

const WARNING_RATE: f64 = 1.0 / 16.0;
const ERROR_RATE: f64 = 1.0 / 8.0;

impl StatusSource for RetrieverErrorSource {
    fn name(&self) -> &str {
        "retriever-errors"
    }

    fn retrieve_status(&self) -> Status {
        match self.journal.retriever_error_rate() {
            None => Status::new(StatusCode::Inactive),
            Some(rate) if rate >= ERROR_RATE => Status::with_message(
                StatusCode::Error,
                format!("{:.1}% of recent retrievals failed", rate * 100.0),
            ),
            Some(rate) if rate >= WARNING_RATE => Status::with_message(
                StatusCode::Warning,
                format!("{:.1}% of recent retrievals failed", rate * 100.0),
            ),
            Some(_) => Status::new(StatusCode::Normal),
        }
    }
}

/// Warns when the indexer has not fetched anything for a day.
pub struct IndexerCrawlSource {
    journal: Arc<Journal>,
}

impl IndexerCrawlSource {
    pub fn new(journal: Arc<Journal>) -> Self {
        Self { journal }
    }
}

impl StatusSource for IndexerCrawlSource {
    fn name(&self) -> &str {
        "indexer-crawl"
    }

    fn retrieve_status(&self) -> Status {
        match self.journal.last_indexer_fetch() {
            None => {
                Status::with_message(StatusCode::Inactive, "the indexer has never fetched a document")
            }
            Some(_) if self.journal.indexer_fetched_within(Duration::hours(24)) => {
                Status::new(StatusCode::Normal)
            }
            Some(at) => Status::with_message(
                StatusCode::Warning,
                format!("the indexer last fetched a document at {at}"),
            ),
        }
    }
}
