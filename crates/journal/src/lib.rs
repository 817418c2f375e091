//! The journal: concurrent serving and push statistics.
//!
//! Every counter lives behind a single mutex; snapshots deep-clone under the
//! same mutex so readers never observe a torn state. Time-windowed stats use
//! the ring buffers in [`stats`].

pub mod status;
pub mod stats;

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use sb_domain::docid::DocId;
use stats::{Stat, StatWindow, WindowSnapshot};

/// The three dashboard windows: 60 × 1 s, 60 × 1 min, 48 × 30 min.
pub const WINDOW_SHAPES: [(usize, u64); 3] = [(60, 1_000), (60, 60_000), (48, 1_800_000)];

/// How many document retrievals feed the error-rate status source.
const RETRIEVER_SAMPLE_SIZE: usize = 1000;

/// Outcome of one full push.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushOutcome {
    Success,
    Interruption,
    Failure,
}

impl std::fmt::Display for PushOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PushOutcome::Success => "SUCCESS",
            PushOutcome::Interruption => "INTERRUPTION",
            PushOutcome::Failure => "FAILURE",
        };
        f.write_str(s)
    }
}

/// Who a document request came from, as classified by IP/user-agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    Indexer,
    Other,
}

/// How one document retrieval ended, for the error-rate source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// Served, 304, or adaptor-signaled absence.
    Ok,
    /// Adaptor failure surfaced as a 500.
    Error,
}

/// Handle identifying one in-flight request inside the journal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken(u64);

#[derive(Debug, Default, Clone)]
struct CountingSet {
    seen: HashSet<DocId>,
    total: u64,
}

impl CountingSet {
    fn add(&mut self, id: &DocId) {
        if !self.seen.contains(id) {
            self.seen.insert(id.clone());
        }
        self.total += 1;
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CountSnapshot {
    pub unique: u64,
    pub total: u64,
}

impl From<&CountingSet> for CountSnapshot {
    fn from(set: &CountingSet) -> Self {
        Self {
            unique: set.seen.len() as u64,
            total: set.total,
        }
    }
}

#[derive(Debug)]
struct ActiveRequest {
    started_ms: u64,
    processing_started_ms: Option<u64>,
    processing_ms: u64,
    bytes_in: u64,
}

struct Inner {
    pushed: CountingSet,
    indexer_requests: CountingSet,
    other_requests: CountingSet,
    last_full_push: Option<(DateTime<Utc>, PushOutcome)>,
    full_push_started_at: Option<DateTime<Utc>>,
    last_indexer_fetch: Option<DateTime<Utc>>,
    next_token: u64,
    active: HashMap<RequestToken, ActiveRequest>,
    windows: [StatWindow; 3],
    retriever_ring: VecDeque<bool>,
    retriever_errors: usize,
}

/// Instance-scoped statistics accumulator; construct once and pass around.
pub struct Journal {
    inner: Mutex<Inner>,
}

impl Default for Journal {
    fn default() -> Self {
        Self::new()
    }
}

impl Journal {
    pub fn new() -> Self {
        let now = now_ms();
        let windows = WINDOW_SHAPES.map(|(buckets, ms)| StatWindow::new(buckets, ms, now));
        Self {
            inner: Mutex::new(Inner {
                pushed: CountingSet::default(),
                indexer_requests: CountingSet::default(),
                other_requests: CountingSet::default(),
                last_full_push: None,
                full_push_started_at: None,
                last_indexer_fetch: None,
                next_token: 0,
                active: HashMap::new(),
                windows,
                retriever_ring: VecDeque::with_capacity(RETRIEVER_SAMPLE_SIZE),
                retriever_errors: 0,
            }),
        }
    }

    // ── Push bookkeeping ─────────────────────────────────────────────

    pub fn record_full_push_started(&self) {
        self.inner.lock().full_push_started_at = Some(Utc::now());
    }

    pub fn record_full_push_outcome(&self, outcome: PushOutcome) {
        let mut inner = self.inner.lock();
        inner.full_push_started_at = None;
        inner.last_full_push = Some((Utc::now(), outcome));
    }

    pub fn record_pushed(&self, doc_id: &DocId) {
        self.inner.lock().pushed.add(doc_id);
    }

    pub fn last_full_push(&self) -> Option<(DateTime<Utc>, PushOutcome)> {
        self.inner.lock().last_full_push
    }

    // ── Request lifecycle ────────────────────────────────────────────

    /// Mark the arrival of a document request. Classifies the origin and
    /// starts the response clock.
    pub fn request_started(
        &self,
        origin: RequestOrigin,
        doc_id: &DocId,
        bytes_in: u64,
    ) -> RequestToken {
        let mut inner = self.inner.lock();
        match origin {
            RequestOrigin::Indexer => {
                inner.indexer_requests.add(doc_id);
                inner.last_indexer_fetch = Some(Utc::now());
            }
            RequestOrigin::Other => inner.other_requests.add(doc_id),
        }
        inner.next_token += 1;
        let token = RequestToken(inner.next_token);
        inner.active.insert(
            token,
            ActiveRequest {
                started_ms: now_ms(),
                processing_started_ms: None,
                processing_ms: 0,
                bytes_in,
            },
        );
        token
    }

    /// The adaptor was entered for this request.
    pub fn processing_started(&self, token: RequestToken) {
        let mut inner = self.inner.lock();
        if let Some(active) = inner.active.get_mut(&token) {
            active.processing_started_ms = Some(now_ms());
        }
    }

    /// The adaptor returned; fold the processing duration into the buckets.
    pub fn processing_ended(&self, token: RequestToken) {
        let now = now_ms();
        let mut inner = self.inner.lock();
        let Some(active) = inner.active.get_mut(&token) else {
            return;
        };
        let Some(started) = active.processing_started_ms.take() else {
            return;
        };
        let elapsed = now.saturating_sub(started);
        active.processing_ms += elapsed;
        for window in &mut inner.windows {
            window.current_stat(now).add_processing(elapsed);
        }
    }

    /// The response is complete; fold the request duration and byte counts
    /// into the buckets and drop the in-flight entry.
    pub fn request_finished(&self, token: RequestToken, bytes_out: u64) {
        let now = now_ms();
        let mut inner = self.inner.lock();
        let Some(active) = inner.active.remove(&token) else {
            return;
        };
        let elapsed = now.saturating_sub(active.started_ms);
        for window in &mut inner.windows {
            let stat = window.current_stat(now);
            stat.add_request(elapsed);
            stat.bytes_in += active.bytes_in;
            stat.bytes_out += bytes_out;
        }
    }

    // ── Retriever error tracking ─────────────────────────────────────

    pub fn record_retrieval(&self, outcome: RetrievalOutcome) {
        let mut inner = self.inner.lock();
        let is_error = outcome == RetrievalOutcome::Error;
        inner.retriever_ring.push_back(is_error);
        if is_error {
            inner.retriever_errors += 1;
        }
        if inner.retriever_ring.len() > RETRIEVER_SAMPLE_SIZE {
            if inner.retriever_ring.pop_front() == Some(true) {
                inner.retriever_errors -= 1;
            }
        }
    }

    /// Error fraction over the last [`RETRIEVER_SAMPLE_SIZE`] retrievals, or
    /// `None` before the first retrieval.
    pub fn retriever_error_rate(&self) -> Option<f64> {
        let inner = self.inner.lock();
        if inner.retriever_ring.is_empty() {
            return None;
        }
        Some(inner.retriever_errors as f64 / inner.retriever_ring.len() as f64)
    }

    // ── Indexer liveness ─────────────────────────────────────────────

    pub fn last_indexer_fetch(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().last_indexer_fetch
    }

    pub fn indexer_fetched_within(&self, window: Duration) -> bool {
        self.last_indexer_fetch()
            .map(|t| Utc::now() - t <= window)
            .unwrap_or(false)
    }

    // ── Snapshots ────────────────────────────────────────────────────

    pub fn snapshot(&self) -> JournalSnapshot {
        let now = now_ms();
        let mut inner = self.inner.lock();
        let windows = inner
            .windows
            .iter_mut()
            .map(|w| w.snapshot(now))
            .collect();
        JournalSnapshot {
            pushed: (&inner.pushed).into(),
            indexer_requests: (&inner.indexer_requests).into(),
            other_requests: (&inner.other_requests).into(),
            last_full_push: inner.last_full_push,
            full_push_in_progress: inner.full_push_started_at.is_some(),
            last_indexer_fetch: inner.last_indexer_fetch,
            in_flight_requests: inner.active.len(),
            windows,
        }
    }

    /// The currently accumulating bucket of the finest window; test hook and
    /// dashboard sparkline feed.
    pub fn current_second_stat(&self) -> Stat {
        let now = now_ms();
        let mut inner = self.inner.lock();
        *inner.windows[0].current_stat(now)
    }
}

/// Deep copy of every counter, decoupled from the live journal.
#[derive(Debug, Clone, Serialize)]
pub struct JournalSnapshot {
    pub pushed: CountSnapshot,
    pub indexer_requests: CountSnapshot,
    pub other_requests: CountSnapshot,
    pub last_full_push: Option<(DateTime<Utc>, PushOutcome)>,
    pub full_push_in_progress: bool,
    pub last_indexer_fetch: Option<DateTime<Utc>>,
    pub in_flight_requests: usize,
    pub windows: Vec<WindowSnapshot>,
}

fn now_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
