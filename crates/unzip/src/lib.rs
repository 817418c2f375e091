//! Transparent adaptor wrapper that virtualizes zip archive members as
//! first-class docids.
//!
//! Listings gain a child record per non-directory entry of every `.zip`
//! docid (nested zips recurse); content requests for nested docids unpack
//! the chain and stream the final entry; authorization questions about a
//! nested docid are asked about the outermost docid only.

pub mod escape;

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::Arc;

use async_trait::async_trait;
use zip::result::ZipError;
use zip::ZipArchive;

use sb_domain::adaptor::{
    Adaptor, AdaptorContext, DocError, DocRequest, DocResponse, ListingError, RecordPusher,
};
use sb_domain::authz::{AuthzStatus, UserIdentity};
use sb_domain::docid::DocId;
use sb_domain::record::Record;

use escape::{escape, is_nested, push_component, split_nested, strip_virtual, unescape};

const ZIP_SUFFIX: &str = ".zip";

/// Wraps any adaptor and exposes zip contents as child docids.
pub struct AutoUnzipAdaptor {
    inner: Arc<dyn Adaptor>,
}

impl AutoUnzipAdaptor {
    pub fn new(inner: Arc<dyn Adaptor>) -> Self {
        Self { inner }
    }

    /// Fetch a whole document from the wrapped adaptor into a temp file.
    async fn fetch_to_temp(&self, doc_id: &DocId) -> Result<File, DocError> {
        let request = DocRequest::new(doc_id.clone(), None);
        let mut response = DocResponse::new();
        self.inner.get_doc_content(&request, &mut response).await?;
        let mut file = tempfile::tempfile()?;
        file.write_all(response.body())?;
        file.seek(SeekFrom::Start(0))?;
        Ok(file)
    }
}

#[async_trait]
impl Adaptor for AutoUnzipAdaptor {
    async fn init(&self, context: &AdaptorContext) -> sb_domain::Result<()> {
        self.inner.init(context).await
    }

    async fn get_doc_ids(&self, pusher: &dyn RecordPusher) -> Result<(), ListingError> {
        let expander = ExpandingPusher {
            wrapper: self,
            downstream: pusher,
        };
        self.inner.get_doc_ids(&expander).await
    }

    async fn get_doc_content(
        &self,
        request: &DocRequest,
        response: &mut DocResponse,
    ) -> Result<(), DocError> {
        let raw = request.doc_id().as_str();
        let Some((outer, rest)) = split_nested(raw) else {
            return self.inner.get_doc_content(request, response).await;
        };

        let file = self.fetch_to_temp(&DocId::new(outer)).await?;
        let bytes = read_entry_chain(file, rest)?;
        response.write(&bytes)?;
        Ok(())
    }

    async fn is_user_authorized(
        &self,
        identity: &UserIdentity,
        doc_ids: &[DocId],
    ) -> sb_domain::Result<HashMap<DocId, AuthzStatus>> {
        // Ask the wrapped adaptor about outermost docids only.
        let mut outer_ids: Vec<DocId> = Vec::new();
        for id in doc_ids {
            let outer = DocId::new(strip_virtual(id.as_str()));
            if !outer_ids.contains(&outer) {
                outer_ids.push(outer);
            }
        }
        let outer_answers = self.inner.is_user_authorized(identity, &outer_ids).await?;

        let mut answers = HashMap::with_capacity(doc_ids.len());
        for id in doc_ids {
            let outer = DocId::new(strip_virtual(id.as_str()));
            if let Some(status) = outer_answers.get(&outer) {
                answers.insert(id.clone(), *status);
            }
        }
        Ok(answers)
    }

    fn supports_incremental(&self) -> bool {
        self.inner.supports_incremental()
    }

    async fn get_modified_records(&self, pusher: &dyn RecordPusher) -> Result<(), ListingError> {
        let expander = ExpandingPusher {
            wrapper: self,
            downstream: pusher,
        };
        self.inner.get_modified_records(&expander).await
    }

    async fn destroy(&self) {
        self.inner.destroy().await;
    }
}

/// Pusher interposed on listings: passes records through and appends child
/// records for zip docids.
struct ExpandingPusher<'a> {
    wrapper: &'a AutoUnzipAdaptor,
    downstream: &'a dyn RecordPusher,
}

#[async_trait]
impl RecordPusher for ExpandingPusher<'_> {
    async fn push_records(&self, records: Vec<Record>) -> Result<Option<Record>, ListingError> {
        let mut expanded = Vec::with_capacity(records.len());
        for record in records {
            let raw = record.doc_id().as_str().to_owned();
            // Deletions are not enumerated; the indexer discovers absent
            // members via 404.
            let expand = raw.ends_with(ZIP_SUFFIX) && !record.is_delete() && !is_nested(&raw);
            expanded.push(record);
            if !expand {
                continue;
            }
            match self.wrapper.fetch_to_temp(&DocId::new(raw.clone())).await {
                Ok(file) => match list_children(&escape(&raw), file) {
                    Ok(children) => expanded.extend(children),
                    Err(err) => {
                        tracing::warn!(doc_id = %raw, error = %err, "unreadable zip; skipping members");
                    }
                },
                Err(err) => {
                    tracing::warn!(doc_id = %raw, error = %err, "cannot fetch zip; skipping members");
                }
            }
        }
        self.downstream.push_records(expanded).await
    }
}

/// Enumerate non-directory members of the archive in `file` as records under
/// the (escaped) prefix, recursing into nested zips via temp files.
fn list_children(prefix: &str, file: File) -> std::io::Result<Vec<Record>> {
    let mut records = Vec::new();
    let mut archive = ZipArchive::new(file).map_err(zip_io)?;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(zip_io)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_owned();
        let child_id = push_component(prefix, &name);
        records.push(Record::add(child_id.clone()));

        if name.ends_with(ZIP_SUFFIX) {
            let mut nested = tempfile::tempfile()?;
            std::io::copy(&mut entry, &mut nested)?;
            nested.seek(SeekFrom::Start(0))?;
            // The child docid is already fully escaped and serves as the
            // prefix for the next nesting level.
            records.extend(list_children(&child_id, nested)?);
        }
    }
    Ok(records)
}

/// Walk the still-escaped remainder down through nested archives and return
/// the final entry's bytes.
fn read_entry_chain(file: File, rest: &str) -> Result<Vec<u8>, DocError> {
    let mut current = file;
    let mut remainder = rest.to_owned();
    loop {
        let mut archive = ZipArchive::new(current).map_err(zip_doc)?;
        match split_nested(&remainder) {
            None => {
                let name = unescape(&remainder);
                let mut entry = archive.by_name(&name).map_err(zip_doc)?;
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                entry.read_to_end(&mut bytes)?;
                return Ok(bytes);
            }
            Some((next, deeper)) => {
                let mut entry = archive.by_name(&next).map_err(zip_doc)?;
                let mut nested = tempfile::tempfile()?;
                std::io::copy(&mut entry, &mut nested)?;
                nested.seek(SeekFrom::Start(0))?;
                current = nested;
                remainder = deeper.to_owned();
            }
        }
    }
}

fn zip_io(err: ZipError) -> std::io::Error {
    std::io::Error::other(err)
}

fn zip_doc(err: ZipError) -> DocError {
    match err {
        ZipError::FileNotFound => DocError::NotFound,
        other => DocError::Io(std::io::Error::other(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Cursor;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// Adaptor over an in-memory map of docid → bytes.
    struct MapAdaptor {
        contents: HashMap<DocId, Vec<u8>>,
    }

    impl MapAdaptor {
        fn new(entries: Vec<(&str, Vec<u8>)>) -> Self {
            Self {
                contents: entries
                    .into_iter()
                    .map(|(id, bytes)| (DocId::new(id), bytes))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl Adaptor for MapAdaptor {
        async fn get_doc_ids(&self, pusher: &dyn RecordPusher) -> Result<(), ListingError> {
            let mut ids: Vec<&DocId> = self.contents.keys().collect();
            ids.sort();
            pusher
                .push_records(ids.into_iter().map(|id| Record::add(id.clone())).collect())
                .await?;
            Ok(())
        }

        async fn get_doc_content(
            &self,
            request: &DocRequest,
            response: &mut DocResponse,
        ) -> Result<(), DocError> {
            match self.contents.get(request.doc_id()) {
                Some(bytes) => response.write(bytes),
                None => Err(DocError::NotFound),
            }
        }

        async fn is_user_authorized(
            &self,
            _identity: &UserIdentity,
            doc_ids: &[DocId],
        ) -> sb_domain::Result<HashMap<DocId, AuthzStatus>> {
            Ok(doc_ids
                .iter()
                .map(|id| (id.clone(), AuthzStatus::Permit))
                .collect())
        }
    }

    /// Pusher that just collects everything it is given.
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

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, bytes) in entries {
            writer
                .start_file(name.to_owned(), SimpleFileOptions::default())
                .unwrap();
            writer.write_all(bytes).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn nested_fixture() -> MapAdaptor {
        let inner = zip_bytes(&[("note.txt", b"take note")]);
        let outer = zip_bytes(&[("inner.zip", &inner), ("readme.md", b"hi")]);
        MapAdaptor::new(vec![("docs.zip", outer), ("plain.txt", b"plain".to_vec())])
    }

    #[tokio::test]
    async fn listing_emits_members_and_nested_members() {
        let wrapper = AutoUnzipAdaptor::new(Arc::new(nested_fixture()));
        let pusher = CollectingPusher::default();
        wrapper.get_doc_ids(&pusher).await.unwrap();

        let ids: Vec<String> = pusher
            .records
            .lock()
            .iter()
            .map(|r| r.doc_id().as_str().to_owned())
            .collect();
        assert_eq!(
            ids,
            vec![
                "docs.zip",
                "docs.zip!inner.zip",
                "docs.zip!inner.zip!note.txt",
                "docs.zip!readme.md",
                "plain.txt",
            ]
        );
    }

    #[tokio::test]
    async fn deletions_are_not_enumerated() {
        let wrapper = AutoUnzipAdaptor::new(Arc::new(nested_fixture()));
        let pusher = CollectingPusher::default();
        let expander = ExpandingPusher {
            wrapper: &wrapper,
            downstream: &pusher,
        };
        expander
            .push_records(vec![Record::deletion("docs.zip")])
            .await
            .unwrap();
        assert_eq!(pusher.records.lock().len(), 1);
    }

    #[tokio::test]
    async fn nested_entry_streams_its_bytes() {
        let wrapper = AutoUnzipAdaptor::new(Arc::new(nested_fixture()));
        let request = DocRequest::new(DocId::new("docs.zip!inner.zip!note.txt"), None);
        let mut response = DocResponse::new();
        wrapper.get_doc_content(&request, &mut response).await.unwrap();
        assert_eq!(response.body(), b"take note");
    }

    #[tokio::test]
    async fn missing_entry_is_not_found() {
        let wrapper = AutoUnzipAdaptor::new(Arc::new(nested_fixture()));
        let request = DocRequest::new(DocId::new("docs.zip!absent.txt"), None);
        let mut response = DocResponse::new();
        let err = wrapper
            .get_doc_content(&request, &mut response)
            .await
            .unwrap_err();
        assert!(matches!(err, DocError::NotFound));
    }

    #[tokio::test]
    async fn plain_documents_pass_straight_through() {
        let wrapper = AutoUnzipAdaptor::new(Arc::new(nested_fixture()));
        let request = DocRequest::new(DocId::new("plain.txt"), None);
        let mut response = DocResponse::new();
        wrapper.get_doc_content(&request, &mut response).await.unwrap();
        assert_eq!(response.body(), b"plain");
    }

    #[tokio::test]
    async fn authorization_asks_about_the_outer_docid() {
        /// Permits only `docs.zip`, rejects anything with a delimiter.
        struct OuterOnlyAdaptor;

        #[async_trait]
        impl Adaptor for OuterOnlyAdaptor {
            async fn get_doc_ids(&self, _pusher: &dyn RecordPusher) -> Result<(), ListingError> {
                Ok(())
            }

            async fn get_doc_content(
                &self,
                _request: &DocRequest,
                _response: &mut DocResponse,
            ) -> Result<(), DocError> {
                Err(DocError::NotFound)
            }

            async fn is_user_authorized(
                &self,
                _identity: &UserIdentity,
                doc_ids: &[DocId],
            ) -> sb_domain::Result<HashMap<DocId, AuthzStatus>> {
                Ok(doc_ids
                    .iter()
                    .map(|id| {
                        let status = if id.as_str().contains('!') {
                            AuthzStatus::Deny
                        } else {
                            AuthzStatus::Permit
                        };
                        (id.clone(), status)
                    })
                    .collect())
            }
        }

        let wrapper = AutoUnzipAdaptor::new(Arc::new(OuterOnlyAdaptor));
        let identity = UserIdentity::new("alice");
        let nested = DocId::new("docs.zip!inner.zip!note.txt");
        let answers = wrapper
            .is_user_authorized(&identity, std::slice::from_ref(&nested))
            .await
            .unwrap();
        // Virtual components stripped: the wrapped adaptor saw `docs.zip`.
        assert_eq!(answers[&nested], AuthzStatus::Permit);
    }
}
