//! Redacted page substitutes
//!
//! Turns one page of an uploaded statement plus the saved redaction regions
//! into a complete, independently valid one-page PDF with the regions painted
//! over as opaque boxes.
//!
//! The boxes cover the page content; the text underneath is not removed from
//! the content stream.

pub mod error;
pub mod paint;
pub mod split;

use async_trait::async_trait;
use statement_core::{ApiError, PageRedactor, RedactionRegion, UploadedFile};
use tracing::{debug, info, instrument};

pub use error::RedactError;
pub use paint::parse_hex_color;
pub use split::{extract_page, media_box, PageBox};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<u32, RedactError> {
    let doc = split::load(bytes)?;
    Ok(doc.get_pages().len() as u32)
}

/// Native size (width, height) of a 1-indexed page, for computing the
/// rendering scale
pub fn page_size(bytes: &[u8], page: u32) -> Result<(f64, f64), RedactError> {
    let doc = split::load(bytes)?;
    let page_box = media_box(&doc, page)?;
    Ok((page_box.width(), page_box.height()))
}

/// Cut `page` out of the document and paint `regions` on it.
///
/// Regions are in page units with a top-left origin. An empty region list
/// still yields the single-page document.
pub fn redact_page(
    bytes: &[u8],
    page: u32,
    regions: &[RedactionRegion],
) -> Result<Vec<u8>, RedactError> {
    let doc = split::load(bytes)?;
    let page_box = media_box(&doc, page)?;

    let mut single = extract_page(&doc, page)?;
    let page_id = split::page_id(&single, 1)?;
    paint::paint_regions(&mut single, page_id, regions, &page_box)?;

    debug!(page, regions = regions.len(), "Painted redaction regions");
    split::save(single)
}

/// [`PageRedactor`] backed by lopdf, run on the blocking thread pool
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfRedactor;

impl LopdfRedactor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PageRedactor for LopdfRedactor {
    #[instrument(skip(self, document, regions), fields(name = %document.name, regions = regions.len()))]
    async fn redact_page(
        &self,
        document: &UploadedFile,
        page: u32,
        regions: &[RedactionRegion],
    ) -> Result<UploadedFile, ApiError> {
        let source = document.clone();
        let owned = regions.to_vec();

        let bytes = tokio::task::spawn_blocking(move || crate::redact_page(source.bytes(), page, &owned))
            .await
            .map_err(|e| ApiError::Failed(format!("Redaction task failed: {}", e)))??;

        info!(page, size_bytes = bytes.len(), "Created redacted substitute");
        Ok(UploadedFile::pdf(
            format!("redacted-page-{}.pdf", page),
            bytes,
        ))
    }
}
