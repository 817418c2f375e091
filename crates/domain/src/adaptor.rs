//! The adaptor contract: the pluggable capability that supplies docids and
//! document content to the gateway.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::authz::{AuthzStatus, UserIdentity};
use crate::config::Config;
use crate::docid::{DocId, DocIdCodec};
use crate::record::Record;

/// Why a listing (full or incremental) stopped.
#[derive(thiserror::Error, Debug)]
pub enum ListingError {
    /// The push was cancelled while the listing was in progress.
    #[error("listing interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Errors an adaptor may signal while serving one document.
#[derive(thiserror::Error, Debug)]
pub enum DocError {
    /// The docid names no document. Maps to 404.
    #[error("document not found")]
    NotFound,

    /// The response body was already started; headers can no longer change.
    #[error("headers already sent")]
    HeadersAlreadySent,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// Receives batches of records from an adaptor's listing and forwards them
/// toward the indexer.
#[async_trait]
pub trait RecordPusher: Send + Sync {
    /// Push `records` toward the indexer, blocking (asynchronously) until the
    /// batch machinery accepted them all or gave up.
    ///
    /// Returns `Ok(None)` when everything was accepted, or `Ok(Some(record))`
    /// carrying the first record of the batch that could not be delivered;
    /// later records of the listing were not attempted.
    async fn push_records(&self, records: Vec<Record>) -> Result<Option<Record>, ListingError>;
}

/// Everything the gateway hands an adaptor at startup.
#[derive(Clone)]
pub struct AdaptorContext {
    pub config: Arc<Config>,
    pub codec: Arc<DocIdCodec>,
}

/// The pluggable content-repository bridge.
///
/// `get_doc_ids` is callback-shaped: the adaptor calls
/// [`RecordPusher::push_records`] any number of times, and backpressure is
/// natural because each call is awaited against the batching stage.
#[async_trait]
pub trait Adaptor: Send + Sync + 'static {
    async fn init(&self, context: &AdaptorContext) -> crate::Result<()> {
        let _ = context;
        Ok(())
    }

    /// Enumerate every docid the repository wants indexed.
    async fn get_doc_ids(&self, pusher: &dyn RecordPusher) -> Result<(), ListingError>;

    /// Serve one document into `response`.
    ///
    /// The adaptor must do exactly one of: call
    /// [`DocResponse::respond_not_modified`], write body bytes, or return
    /// [`DocError::NotFound`].
    async fn get_doc_content(
        &self,
        request: &DocRequest,
        response: &mut DocResponse,
    ) -> Result<(), DocError>;

    /// Late-binding authorization for a batch of docids.
    ///
    /// Docids missing from the returned map are treated as
    /// [`AuthzStatus::Indeterminate`] by the caller.
    async fn is_user_authorized(
        &self,
        identity: &UserIdentity,
        doc_ids: &[DocId],
    ) -> crate::Result<HashMap<DocId, AuthzStatus>>;

    /// Whether [`Adaptor::get_modified_records`] does anything. When true the
    /// gateway polls it at `adaptor.incrementalPollPeriodMillis`.
    fn supports_incremental(&self) -> bool {
        false
    }

    /// Enumerate only records changed since the previous poll.
    async fn get_modified_records(&self, pusher: &dyn RecordPusher) -> Result<(), ListingError> {
        let _ = pusher;
        Ok(())
    }

    async fn destroy(&self) {}
}

/// One document request as seen by the adaptor.
#[derive(Debug, Clone)]
pub struct DocRequest {
    doc_id: DocId,
    /// Client-presented `If-Modified-Since`, if any.
    last_access: Option<DateTime<Utc>>,
}

impl DocRequest {
    pub fn new(doc_id: DocId, last_access: Option<DateTime<Utc>>) -> Self {
        Self {
            doc_id,
            last_access,
        }
    }

    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    pub fn last_access(&self) -> Option<DateTime<Utc>> {
        self.last_access
    }

    /// Convenience for adaptors tracking modification times: true when the
    /// document changed after the client's recorded access (or the client
    /// presented no access time at all).
    pub fn has_changed_since_last_access(&self, modified: DateTime<Utc>) -> bool {
        match self.last_access {
            Some(access) => modified > access,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseState {
    Pending,
    NotModified,
    Body,
}

/// The response side of the document contract.
///
/// Metadata and content-type are buffered until the first body write; from
/// that point on the headers are latched and further header mutation fails
/// with [`DocError::HeadersAlreadySent`].
#[derive(Debug)]
pub struct DocResponse {
    state: ResponseState,
    content_type: Option<String>,
    last_modified: Option<DateTime<Utc>>,
    metadata: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl Default for DocResponse {
    fn default() -> Self {
        Self::new()
    }
}

impl DocResponse {
    pub fn new() -> Self {
        Self {
            state: ResponseState::Pending,
            content_type: None,
            last_modified: None,
            metadata: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    /// Answer the conditional request with 304 and no body.
    pub fn respond_not_modified(&mut self) -> Result<(), DocError> {
        match self.state {
            ResponseState::Body => Err(DocError::HeadersAlreadySent),
            _ => {
                self.state = ResponseState::NotModified;
                Ok(())
            }
        }
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) -> Result<(), DocError> {
        if self.state == ResponseState::Body {
            return Err(DocError::HeadersAlreadySent);
        }
        self.content_type = Some(content_type.into());
        Ok(())
    }

    pub fn set_last_modified(&mut self, when: DateTime<Utc>) -> Result<(), DocError> {
        if self.state == ResponseState::Body {
            return Err(DocError::HeadersAlreadySent);
        }
        self.last_modified = Some(when);
        Ok(())
    }

    pub fn add_metadata(
        &mut self,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Result<(), DocError> {
        if self.state == ResponseState::Body {
            return Err(DocError::HeadersAlreadySent);
        }
        self.metadata.insert(name.into(), content.into());
        Ok(())
    }

    /// Access the body buffer, latching the headers. May be called repeatedly
    /// to append further output.
    pub fn body_mut(&mut self) -> Result<&mut Vec<u8>, DocError> {
        match self.state {
            ResponseState::NotModified => Err(DocError::HeadersAlreadySent),
            _ => {
                self.state = ResponseState::Body;
                Ok(&mut self.body)
            }
        }
    }

    /// Append `bytes` to the body, latching the headers.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), DocError> {
        self.body_mut()?.extend_from_slice(bytes);
        Ok(())
    }

    // ── Consumed by the serving side ─────────────────────────────────

    pub fn is_not_modified(&self) -> bool {
        self.state == ResponseState::NotModified
    }

    /// True once the adaptor produced (possibly empty) body output.
    pub fn has_body(&self) -> bool {
        self.state == ResponseState::Body
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
