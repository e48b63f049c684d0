//! List Blobs response parsing.

use serde::Deserialize;

use crate::storage::BlobMetadata;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EnumerationResults {
    #[serde(default)]
    blobs: Blobs,
    #[serde(default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Blobs {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlobItem {
    name: String,
    properties: BlobProperties,
}

#[derive(Debug, Deserialize)]
struct BlobProperties {
    #[serde(rename = "Content-Length")]
    content_length: u64,
}

/// One page of a container enumeration.
#[derive(Debug)]
pub(super) struct BlobPage {
    pub blobs: Vec<BlobMetadata>,
    /// Continuation token; `None` on the last page
    pub next_marker: Option<String>,
}

pub(super) fn parse_blob_page(body: &str) -> Result<BlobPage, quick_xml::DeError> {
    // The service prefixes its XML with a UTF-8 byte order mark
    let results: EnumerationResults = quick_xml::de::from_str(body.trim_start_matches('\u{feff}'))?;

    Ok(BlobPage {
        blobs: results
            .blobs
            .items
            .into_iter()
            .map(|b| BlobMetadata::new(b.name, b.properties.content_length))
            .collect(),
        next_marker: results.next_marker.filter(|m| !m.is_empty()),
    })
}
