//! Container listing document
//!
//! ```text
//! <blobs count="N"><blob name="..." size="..."/>...</blobs>
//! ```
//!
//! Entries keep the order the backend enumerates them in. The enumeration is
//! consumed one entry at a time; only the encoded children are held, never
//! the metadata list itself.

use bytes::Bytes;
use futures::TryStreamExt;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::errors::{GatewayError, Result};
use crate::storage::{error_map, BlobListing, BlobMetadata};

const ROOT: &str = "blobs";
const ENTRY: &str = "blob";

/// Incremental listing encoder.
pub struct ListingWriter {
    entries: Writer<Vec<u8>>,
    count: u64,
}

impl Default for ListingWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ListingWriter {
    pub fn new() -> Self {
        Self {
            entries: Writer::new(Vec::new()),
            count: 0,
        }
    }

    /// Append one `<blob/>` entry.
    pub fn push(&mut self, blob: &BlobMetadata) -> Result<()> {
        let size = blob.size.to_string();
        let entry = BytesStart::new(ENTRY)
            .with_attributes([("name", blob.name.as_str()), ("size", size.as_str())]);
        self.entries
            .write_event(Event::Empty(entry))
            .map_err(|e| error_map::internal(e, "encoding listing entry"))?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Wrap the entries in the root element, which carries the final count.
    pub fn finish(self) -> Result<Bytes> {
        let entries = self.entries.into_inner();
        let count = self.count.to_string();

        let mut writer = Writer::new(Vec::with_capacity(entries.len() + 32));
        writer
            .write_event(Event::Start(
                BytesStart::new(ROOT).with_attributes([("count", count.as_str())]),
            ))
            .map_err(|e| error_map::internal(e, "encoding listing"))?;
        writer.get_mut().extend_from_slice(&entries);
        writer
            .write_event(Event::End(BytesEnd::new(ROOT)))
            .map_err(|e| error_map::internal(e, "encoding listing"))?;

        Ok(Bytes::from(writer.into_inner()))
    }
}

/// Drain `listing` into a complete document.
///
/// A failure partway through the enumeration fails the whole listing with
/// `BackendInternal`; no partial document is returned.
pub async fn encode_listing(mut listing: BlobListing) -> Result<Bytes> {
    let mut writer = ListingWriter::new();

    loop {
        match listing.try_next().await {
            Ok(Some(blob)) => writer.push(&blob)?,
            Ok(None) => break,
            Err(e) => {
                return Err(GatewayError::BackendInternal(format!(
                    "listing aborted after {} entries: {}",
                    writer.count(),
                    e
                )))
            }
        }
    }

    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use futures::stream::{self, StreamExt};

    fn listing(items: Vec<Result<BlobMetadata>>) -> BlobListing {
        stream::iter(items).boxed()
    }

    async fn encode(items: Vec<Result<BlobMetadata>>) -> Result<String> {
        let bytes = encode_listing(listing(items)).await?;
        Ok(String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_empty_listing() {
        assert_eq!(encode(vec![]).await.unwrap(), r#"<blobs count="0"></blobs>"#);
    }

    #[tokio::test]
    async fn test_entries_keep_enumeration_order() {
        let doc = encode(vec![
            Ok(BlobMetadata::new("b", 20)),
            Ok(BlobMetadata::new("a", 10)),
        ])
        .await
        .unwrap();
        assert_eq!(
            doc,
            r#"<blobs count="2"><blob name="b" size="20"/><blob name="a" size="10"/></blobs>"#
        );
    }

    #[tokio::test]
    async fn test_names_are_escaped() {
        let doc = encode(vec![Ok(BlobMetadata::new(r#"x"<&>.txt"#, 1))])
            .await
            .unwrap();
        assert!(doc.contains(r#"name="x&quot;&lt;&amp;&gt;.txt""#), "{}", doc);
    }

    #[tokio::test]
    async fn test_enumeration_failure_aborts() {
        let err = encode(vec![
            Ok(BlobMetadata::new("a", 10)),
            Err(GatewayError::NotFound("container pics".into())),
            Ok(BlobMetadata::new("b", 20)),
        ])
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendInternal);
    }

    #[test]
    fn test_writer_counts_entries() {
        let mut writer = ListingWriter::new();
        for i in 0..3 {
            writer.push(&BlobMetadata::new(format!("f{}", i), i)).unwrap();
        }
        assert_eq!(writer.count(), 3);
        let doc = writer.finish().unwrap();
        assert!(doc.starts_with(br#"<blobs count="3">"#));
        assert!(doc.ends_with(b"</blobs>"));
    }
}
