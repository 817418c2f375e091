//! Built-in filesystem adaptor: serves a directory tree so a bare
//! `searchbridge serve` has something to push and serve. Docids are
//! slash-separated paths relative to the content root.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use walkdir::WalkDir;

use sb_domain::adaptor::{
    Adaptor, DocError, DocRequest, DocResponse, ListingError, RecordPusher,
};
use sb_domain::authz::{AuthzStatus, UserIdentity};
use sb_domain::docid::DocId;
use sb_domain::record::Record;

pub struct FsAdaptor {
    root: PathBuf,
    /// Modification-time watermark for the incremental poll.
    modified_since: Mutex<DateTime<Utc>>,
}

impl FsAdaptor {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            modified_since: Mutex::new(Utc::now()),
        }
    }

    /// Resolve a docid to a path inside the root, rejecting traversal.
    fn resolve(&self, doc_id: &DocId) -> Option<PathBuf> {
        let relative = Path::new(doc_id.as_str());
        if relative
            .components()
            .any(|c| !matches!(c, std::path::Component::Normal(_)))
        {
            return None;
        }
        Some(self.root.join(relative))
    }

    /// Walk the content root. With a cutoff, only files modified strictly
    /// after it are included.
    fn walk_records(&self, newer_than: Option<DateTime<Utc>>) -> Result<Vec<Record>, ListingError> {
        let mut records = Vec::new();
        for entry in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = entry.map_err(|e| ListingError::Other(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|e| ListingError::Other(e.to_string()))?;
            let doc_id = relative.to_string_lossy().replace('\\', "/");
            let mut builder = Record::builder(doc_id);
            let mut modified_at = None;
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    let modified = DateTime::<Utc>::from(modified);
                    builder = builder.last_modified(modified);
                    modified_at = Some(modified);
                }
            }
            if let Some(cutoff) = newer_than {
                match modified_at {
                    Some(modified) if modified > cutoff => {}
                    _ => continue,
                }
            }
            records.push(builder.build());
        }
        Ok(records)
    }
}

#[async_trait]
impl Adaptor for FsAdaptor {
    async fn get_doc_ids(&self, pusher: &dyn RecordPusher) -> Result<(), ListingError> {
        let records = self.walk_records(None)?;
        pusher.push_records(records).await?;
        Ok(())
    }

    fn supports_incremental(&self) -> bool {
        true
    }

    async fn get_modified_records(&self, pusher: &dyn RecordPusher) -> Result<(), ListingError> {
        // Advance the watermark to the start of this pass; anything written
        // while we walk shows up next time.
        let since = {
            let mut watermark = self.modified_since.lock();
            std::mem::replace(&mut *watermark, Utc::now())
        };
        let records = self.walk_records(Some(since))?;
        if !records.is_empty() {
            pusher.push_records(records).await?;
        }
        Ok(())
    }

    async fn get_doc_content(
        &self,
        request: &DocRequest,
        response: &mut DocResponse,
    ) -> Result<(), DocError> {
        let path = self.resolve(request.doc_id()).ok_or(DocError::NotFound)?;
        let metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            _ => return Err(DocError::NotFound),
        };

        if let Ok(modified) = metadata.modified() {
            let modified = DateTime::<Utc>::from(modified);
            if !request.has_changed_since_last_access(modified) {
                return response.respond_not_modified();
            }
            response.set_last_modified(modified)?;
        }

        response.set_content_type(guess_content_type(&path))?;
        let bytes = std::fs::read(&path)?;
        response.write(&bytes)?;
        Ok(())
    }

    async fn is_user_authorized(
        &self,
        _identity: &UserIdentity,
        doc_ids: &[DocId],
    ) -> sb_domain::Result<HashMap<DocId, AuthzStatus>> {
        // Everything under the content root is public.
        Ok(doc_ids
            .iter()
            .map(|id| (id.clone(), AuthzStatus::Permit))
            .collect())
    }
}

fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("txt") | Some("md") => "text/plain",
        Some("json") => "application/json",
        Some("xml") => "text/xml",
        Some("pdf") => "application/pdf",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CollectingPusher {
        records: Mutex<Vec<Record>>,
    }

    #[async_trait]
    impl RecordPusher for CollectingPusher {
        async fn push_records(&self, records: Vec<Record>) -> Result<Option<Record>, ListingError> {
            self.records.lock().extend(records);
            Ok(None)
        }
    }

    fn fixture() -> (tempfile::TempDir, FsAdaptor) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"alpha").unwrap();
        std::fs::write(dir.path().join("sub/b.html"), b"<p>beta</p>").unwrap();
        let adaptor = FsAdaptor::new(dir.path());
        (dir, adaptor)
    }

    #[tokio::test]
    async fn lists_files_as_relative_docids() {
        let (_dir, adaptor) = fixture();
        let pusher = CollectingPusher::default();
        adaptor.get_doc_ids(&pusher).await.unwrap();
        let ids: Vec<String> = pusher
            .records
            .lock()
            .iter()
            .map(|r| r.doc_id().as_str().to_owned())
            .collect();
        assert_eq!(ids, vec!["a.txt", "sub/b.html"]);
    }

    #[tokio::test]
    async fn serves_bytes_with_a_content_type() {
        let (_dir, adaptor) = fixture();
        let request = DocRequest::new(DocId::new("sub/b.html"), None);
        let mut response = DocResponse::new();
        adaptor.get_doc_content(&request, &mut response).await.unwrap();
        assert_eq!(response.content_type(), Some("text/html"));
        assert_eq!(response.body(), b"<p>beta</p>");
    }

    #[tokio::test]
    async fn unmodified_document_answers_not_modified() {
        let (_dir, adaptor) = fixture();
        let request = DocRequest::new(
            DocId::new("a.txt"),
            Some(Utc::now() + chrono::Duration::hours(1)),
        );
        let mut response = DocResponse::new();
        adaptor.get_doc_content(&request, &mut response).await.unwrap();
        assert!(response.is_not_modified());
    }

    #[tokio::test]
    async fn incremental_pass_sees_only_new_writes() {
        let (dir, adaptor) = fixture();

        // Nothing changed since construction.
        let pusher = CollectingPusher::default();
        adaptor.get_modified_records(&pusher).await.unwrap();
        assert!(pusher.records.lock().is_empty());

        // Coarse filesystem timestamps: leave a clear gap on both sides of
        // the write.
        std::thread::sleep(std::time::Duration::from_millis(30));
        std::fs::write(dir.path().join("fresh.txt"), b"new").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(30));
        let pusher = CollectingPusher::default();
        adaptor.get_modified_records(&pusher).await.unwrap();
        let ids: Vec<String> = pusher
            .records
            .lock()
            .iter()
            .map(|r| r.doc_id().as_str().to_owned())
            .collect();
        assert_eq!(ids, vec!["fresh.txt"]);

        // The watermark advanced past the write.
        let pusher = CollectingPusher::default();
        adaptor.get_modified_records(&pusher).await.unwrap();
        assert!(pusher.records.lock().is_empty());
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (_dir, adaptor) = fixture();
        let request = DocRequest::new(DocId::new("../escape"), None);
        let mut response = DocResponse::new();
        let err = adaptor
            .get_doc_content(&request, &mut response)
            .await
            .unwrap_err();
        assert!(matches!(err, DocError::NotFound));
    }
}
