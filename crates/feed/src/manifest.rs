//! Renders a batch of records into a `metadata-and-url` gsafeed manifest.

use instant_xml::ToXml;

use sb_domain::config::Config;
use sb_domain::docid::DocIdCodec;
use sb_domain::record::Record;

pub const FEEDTYPE: &str = "metadata-and-url";

/// The downstream parser chokes on an empty metadata block, so records
/// without metadata carry this single synthetic item.
const SYNTHETIC_META: (&str, &str) = ("ispublic", "true");

#[derive(Debug, ToXml)]
#[xml(rename = "gsafeed")]
struct GsaFeed {
    header: Header,
    group: Group,
}

#[derive(Debug, ToXml)]
#[xml(rename = "header")]
struct Header {
    datasource: String,
    feedtype: String,
}

#[derive(Debug, ToXml)]
#[xml(rename = "group")]
struct Group {
    record: Vec<RecordElem>,
}

#[derive(Debug, ToXml)]
#[xml(rename = "record")]
struct RecordElem {
    #[xml(attribute)]
    url: String,
    #[xml(attribute)]
    action: String,
    #[xml(attribute)]
    mimetype: String,
    #[xml(rename = "last-modified", attribute)]
    last_modified: Option<String>,
    #[xml(rename = "crawl-immediately", attribute)]
    crawl_immediately: Option<String>,
    #[xml(rename = "crawl-once", attribute)]
    crawl_once: Option<String>,
    #[xml(attribute)]
    lock: Option<String>,
    metadata: Option<Metadata>,
}

#[derive(Debug, ToXml)]
#[xml(rename = "metadata")]
struct Metadata {
    meta: Vec<Meta>,
}

#[derive(Debug, ToXml)]
#[xml(rename = "meta")]
struct Meta {
    #[xml(attribute)]
    name: String,
    #[xml(attribute)]
    content: String,
}

/// Renders record batches into manifest XML, honoring the feed-related
/// config bits.
#[derive(Debug, Clone)]
pub struct ManifestMaker {
    datasource: String,
    character_encoding: String,
    crawl_immediately_enabled: bool,
    no_recrawl_enabled: bool,
}

impl ManifestMaker {
    pub fn new(config: &Config) -> Self {
        Self {
            datasource: config.feed.name.clone(),
            character_encoding: config.gsa.character_encoding.clone(),
            crawl_immediately_enabled: config.feed.crawl_immediately_bit_enabled,
            no_recrawl_enabled: config.feed.no_recrawl_bit_enabled,
        }
    }

    pub fn datasource(&self) -> &str {
        &self.datasource
    }

    /// Render `records` into one manifest document.
    pub fn render(&self, codec: &DocIdCodec, records: &[Record]) -> Result<String, String> {
        let mut elems = Vec::with_capacity(records.len());
        for record in records {
            let url = codec
                .encode(record.doc_id())
                .map_err(|e| format!("cannot encode {:?}: {e}", record.doc_id().as_str()))?;
            let delete = record.is_delete();
            let truthy = |set: bool| set.then(|| "true".to_owned());
            elems.push(RecordElem {
                url: url.into(),
                action: if delete { "delete" } else { "add" }.to_owned(),
                mimetype: "text/plain".to_owned(),
                last_modified: record.last_modified().map(|t| t.to_rfc2822()),
                crawl_immediately: truthy(
                    self.crawl_immediately_enabled && record.crawl_immediately(),
                ),
                crawl_once: truthy(self.no_recrawl_enabled && record.crawl_once()),
                lock: truthy(record.lock()),
                // Deleted records carry no metadata at all.
                metadata: if delete { None } else { Some(synthetic_metadata()) },
            });
        }

        let feed = GsaFeed {
            header: Header {
                datasource: self.datasource.clone(),
                feedtype: FEEDTYPE.to_owned(),
            },
            group: Group { record: elems },
        };
        let body = instant_xml::to_string(&feed).map_err(|e| e.to_string())?;
        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"{}\"?>\n\
             <!DOCTYPE gsafeed PUBLIC \"-//Google//DTD GSA Feeds//EN\" \"gsafeed.dtd\">\n\
             {body}",
            self.character_encoding
        ))
    }
}

fn synthetic_metadata() -> Metadata {
    Metadata {
        meta: vec![Meta {
            name: SYNTHETIC_META.0.to_owned(),
            content: SYNTHETIC_META.1.to_owned(),
        }],
    }
}
