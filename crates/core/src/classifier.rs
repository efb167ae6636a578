use crate::extractor::{PageText, PdfExtractor};
use crate::models::DocumentKind;
use std::path::Path;
use tracing::debug;

/// `Searchable` when any page has a non-blank text layer. Errors while reading
/// the text layer fall through to `Scanned`.
pub fn classify(extractor: &dyn PdfExtractor, path: &Path) -> DocumentKind {
    classify_pages(extractor, path).0
}

/// Like [`classify`], also handing back the pages read, so a searchable
/// document is not parsed a second time. The list is empty for `Scanned`.
pub fn classify_pages(
    extractor: &dyn PdfExtractor,
    path: &Path,
) -> (DocumentKind, Vec<PageText>) {
    match extractor.extract_pages(path) {
        Ok(pages) if pages.iter().any(|page| !page.text.trim().is_empty()) => {
            (DocumentKind::Searchable, pages)
        }
        Ok(_) => (DocumentKind::Scanned, Vec::new()),
        Err(error) => {
            debug!(path = %path.display(), %error, "text layer unreadable, treating as scanned");
            (DocumentKind::Scanned, Vec::new())
        }
    }
}
