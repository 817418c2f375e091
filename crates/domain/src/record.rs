//! Push records: one entry in a feed manifest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::docid::DocId;

/// A docid plus the attributes the indexer is told about it.
///
/// Immutable once built; construct through [`Record::builder`]. Equality is
/// structural.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    doc_id: DocId,
    delete: bool,
    last_modified: Option<DateTime<Utc>>,
    result_link: Option<Url>,
    crawl_immediately: bool,
    crawl_once: bool,
    lock: bool,
}

impl Record {
    pub fn builder(doc_id: impl Into<DocId>) -> RecordBuilder {
        RecordBuilder {
            doc_id: doc_id.into(),
            delete: false,
            last_modified: None,
            result_link: None,
            crawl_immediately: false,
            crawl_once: false,
            lock: false,
        }
    }

    /// Shorthand for a plain add-record with no attributes.
    pub fn add(doc_id: impl Into<DocId>) -> Self {
        Self::builder(doc_id).build()
    }

    /// Shorthand for a deletion record.
    pub fn deletion(doc_id: impl Into<DocId>) -> Self {
        Self::builder(doc_id).delete(true).build()
    }

    pub fn doc_id(&self) -> &DocId {
        &self.doc_id
    }

    pub fn is_delete(&self) -> bool {
        self.delete
    }

    pub fn last_modified(&self) -> Option<DateTime<Utc>> {
        self.last_modified
    }

    pub fn result_link(&self) -> Option<&Url> {
        self.result_link.as_ref()
    }

    pub fn crawl_immediately(&self) -> bool {
        self.crawl_immediately
    }

    pub fn crawl_once(&self) -> bool {
        self.crawl_once
    }

    pub fn lock(&self) -> bool {
        self.lock
    }
}

/// Builder for [`Record`]. Every setter stores its argument.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    doc_id: DocId,
    delete: bool,
    last_modified: Option<DateTime<Utc>>,
    result_link: Option<Url>,
    crawl_immediately: bool,
    crawl_once: bool,
    lock: bool,
}

impl RecordBuilder {
    pub fn delete(mut self, delete: bool) -> Self {
        self.delete = delete;
        self
    }

    pub fn last_modified(mut self, when: DateTime<Utc>) -> Self {
        self.last_modified = Some(when);
        self
    }

    pub fn result_link(mut self, link: Url) -> Self {
        self.result_link = Some(link);
        self
    }

    pub fn crawl_immediately(mut self, crawl_immediately: bool) -> Self {
        self.crawl_immediately = crawl_immediately;
        self
    }

    pub fn crawl_once(mut self, crawl_once: bool) -> Self {
        self.crawl_once = crawl_once;
        self
    }

    pub fn lock(mut self, lock: bool) -> Self {
        self.lock = lock;
        self
    }

    pub fn build(self) -> Record {
        Record {
            doc_id: self.doc_id,
            delete: self.delete,
            last_modified: self.last_modified,
            result_link: self.result_link,
            crawl_immediately: self.crawl_immediately,
            crawl_once: self.crawl_once,
            lock: self.lock,
        }
    }
}
