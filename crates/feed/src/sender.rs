//! Delivers one rendered manifest to the indexer's feed port.
//!
//! Wire format: `POST http[s]://<indexer>:19900/xmlfeed` as
//! `multipart/form-data` with the fixed boundary `<<` and the three parts
//! `datasource`, `feedtype`, `data`. The indexer answers with the literal
//! body `Success` when it accepted the feed.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use url::Url;

pub const FEED_PORT: u16 = 19900;

/// The boundary is part of the protocol, which is why the body is assembled
/// by hand instead of through reqwest's multipart support (that one mints a
/// random boundary per request).
const BOUNDARY: &str = "<<";

/// The three orthogonal transport failures plus the terminal rejection.
#[derive(thiserror::Error, Debug)]
pub enum FeedError {
    #[error("failed to connect to the indexer: {0}")]
    FailedToConnect(String),

    #[error("failed writing the feed to the indexer: {0}")]
    FailedWriting(String),

    #[error("failed reading the indexer's reply: {0}")]
    FailedReadingReply(String),

    /// The indexer answered, but not with `Success`. Carries the reply for
    /// diagnostics; not retried.
    #[error("indexer rejected the feed: {reply:?}")]
    IndexerRejected { reply: String },
}

/// Seam between the push engine and the wire, so tests can fail sends at
/// will.
#[async_trait]
pub trait ManifestTransport: Send + Sync {
    async fn send(&self, datasource: &str, feedtype: &str, xml: &str) -> Result<(), FeedError>;
}

/// The real transport: multipart POST over reqwest.
pub struct FeedSender {
    client: reqwest::Client,
    endpoint: Url,
}

impl FeedSender {
    pub fn new(gsa_hostname: &str, secure: bool) -> sb_domain::Result<Self> {
        let scheme = if secure { "https" } else { "http" };
        let raw = format!("{scheme}://{gsa_hostname}:{FEED_PORT}/xmlfeed");
        let endpoint = Url::parse(&raw)
            .map_err(|e| sb_domain::Error::Config(format!("invalid indexer endpoint {raw:?}: {e}")))?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl ManifestTransport for FeedSender {
    async fn send(&self, datasource: &str, feedtype: &str, xml: &str) -> Result<(), FeedError> {
        let body = multipart_body(datasource, feedtype, xml);
        let response = self
            .client
            .post(self.endpoint.clone())
            .header(
                CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    FeedError::FailedToConnect(e.to_string())
                } else {
                    FeedError::FailedWriting(e.to_string())
                }
            })?;

        let reply = response
            .text()
            .await
            .map_err(|e| FeedError::FailedReadingReply(e.to_string()))?;
        if reply == "Success" {
            Ok(())
        } else {
            Err(FeedError::IndexerRejected { reply })
        }
    }
}

fn multipart_body(datasource: &str, feedtype: &str, xml: &str) -> String {
    let mut body = String::with_capacity(xml.len() + 512);
    for (name, content_type, value) in [
        ("datasource", "text/plain", datasource),
        ("feedtype", "text/plain", feedtype),
        ("data", "text/xml", xml),
    ] {
        body.push_str(&format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{name}\"\r\n\
             Content-Type: {content_type}\r\n\
             \r\n\
             {value}\r\n"
        ));
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    body
}
