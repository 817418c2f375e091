//! Docid model and the stable docid ↔ URL codec.
//!
//! Two modes:
//! - **passthrough** (`docId.isUrl = true`): the docid *is* the URL.
//! - **namespaced**: `<base><docIdPath><escaped-id>`, where the escaped id is
//!   percent-encoded and dot-runs are extended so that path-collapsing
//!   intermediaries cannot destroy `/./` or `/../` sequences in the raw id.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use url::Url;

/// Opaque document identifier assigned by the adaptor.
///
/// Equality is plain string equality; no normalization is ever applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for DocId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for DocId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum CodecError {
    /// The URL does not live under this server's docid namespace.
    #[error("not our docid: {0}")]
    NotOurDocId(String),

    #[error("docid is not a valid URL: {0}")]
    NotAUrl(String),

    #[error("docid bytes are not valid UTF-8 after decoding")]
    InvalidUtf8,
}

/// Characters percent-encoded inside the escaped docid. `/` stays a path
/// separator and `.` must survive for the dot-run escape to round-trip.
const DOCID_PATH: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'~');

/// Reversible mapping between docids and the URLs the indexer crawls.
#[derive(Debug, Clone)]
pub struct DocIdCodec {
    /// Absolute prefix every namespaced doc URL starts with, e.g.
    /// `http://host:5678/doc/`.
    prefix: Url,
    passthrough: bool,
}

impl DocIdCodec {
    /// `base` is the server root (`scheme://host:port/`); `doc_id_path` is the
    /// URL namespace (`/doc/` by default).
    pub fn new(base: Url, doc_id_path: &str, passthrough: bool) -> Result<Self, CodecError> {
        let path = doc_id_path.trim_start_matches('/');
        let prefix = base
            .join(path)
            .map_err(|_| CodecError::NotAUrl(doc_id_path.to_owned()))?;
        Ok(Self {
            prefix,
            passthrough,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.passthrough
    }

    /// True when `url` is served by this server (scheme, host, and port all
    /// match the configured base).
    pub fn is_our_url(&self, url: &Url) -> bool {
        url.scheme() == self.prefix.scheme()
            && url.host_str() == self.prefix.host_str()
            && url.port_or_known_default() == self.prefix.port_or_known_default()
    }

    pub fn encode(&self, id: &DocId) -> Result<Url, CodecError> {
        if self.passthrough {
            return Url::parse(id.as_str()).map_err(|_| CodecError::NotAUrl(id.to_string()));
        }
        let escaped = utf8_percent_encode(&extend_dot_runs(id.as_str()), DOCID_PATH).to_string();
        let raw = format!("{}{escaped}", self.prefix);
        Url::parse(&raw).map_err(|_| CodecError::NotAUrl(raw))
    }

    pub fn decode(&self, url: &Url) -> Result<DocId, CodecError> {
        if self.passthrough {
            return Ok(DocId::new(url.as_str()));
        }
        let rest = url
            .as_str()
            .strip_prefix(self.prefix.as_str())
            .ok_or_else(|| CodecError::NotOurDocId(url.to_string()))?;
        let unescaped = percent_decode_str(rest)
            .decode_utf8()
            .map_err(|_| CodecError::InvalidUtf8)?;
        Ok(DocId::new(strip_dot_runs(&unescaped)))
    }
}

/// Extend every maximal run of dots bounded by `/` or the string endpoints by
/// two dots, so `/./` becomes `/.../` and `/../` becomes `/..../`.
fn extend_dot_runs(id: &str) -> String {
    id.split('/')
        .map(|segment| {
            if !segment.is_empty() && segment.bytes().all(|b| b == b'.') {
                format!("{segment}..")
            } else {
                segment.to_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Inverse of [`extend_dot_runs`]: strip two dots off every all-dot segment.
fn strip_dot_runs(escaped: &str) -> String {
    escaped
        .split('/')
        .map(|segment| {
            if segment.len() > 2 && segment.bytes().all(|b| b == b'.') {
                &segment[..segment.len() - 2]
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
