use crate::error::IngestError;
use crate::ocr::{recognize_pages, OcrEngineFactory};
use lopdf::Document;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// A rendered page, PNG encoded.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub number: u32,
    pub png: Vec<u8>,
}

/// Reads the text layer of a PDF.
pub trait PdfExtractor: Send + Sync {
    /// Non-empty pages in page order. An image-only PDF yields an empty list.
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, path: &Path, dpi: u32) -> Result<Vec<PageImage>, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document = load_document(path)?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| IngestError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(PageText {
                    number: page_no,
                    text,
                });
            }
        }

        Ok(pages)
    }
}

fn load_document(path: &Path) -> Result<Document, IngestError> {
    Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))
}

/// Joins the non-empty pages of the text layer with newlines, in page order.
pub fn extract_searchable_text(
    extractor: &dyn PdfExtractor,
    path: &Path,
) -> Result<String, IngestError> {
    Ok(join_pages(&extractor.extract_pages(path)?))
}

pub fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.as_str())
        .filter(|text| !text.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders pages through poppler's `pdftoppm`. The binary reads the PDF
/// itself, so files lopdf cannot parse still get rendered.
pub struct PdftoppmRasterizer {
    binary: String,
}

impl PdftoppmRasterizer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for PdftoppmRasterizer {
    fn default() -> Self {
        Self::new("pdftoppm")
    }
}

const PAGE_PREFIX: &str = "page";

impl PageRasterizer for PdftoppmRasterizer {
    fn rasterize(&self, path: &Path, dpi: u32) -> Result<Vec<PageImage>, IngestError> {
        let staging = tempfile::tempdir()?;
        let prefix = staging.path().join(PAGE_PREFIX);

        let output = Command::new(&self.binary)
            .args(["-r", dpi.to_string().as_str(), "-png"])
            .arg(path)
            .arg(&prefix)
            .output()
            .map_err(|error| {
                IngestError::Rasterize(format!("failed to run {}: {error}", self.binary))
            })?;

        if !output.status.success() {
            return Err(IngestError::Rasterize(format!(
                "{} exited with {} on {}: {}",
                self.binary,
                output.status,
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let mut images = Vec::new();
        for entry in fs::read_dir(staging.path())? {
            let entry = entry?;
            let Some(number) = rendered_page_number(&entry.path()) else {
                continue;
            };
            images.push(PageImage {
                number,
                png: fs::read(entry.path())?,
            });
        }

        if images.is_empty() {
            return Err(IngestError::Rasterize(format!(
                "{} produced no pages for {}",
                self.binary,
                path.display()
            )));
        }

        images.sort_by_key(|image| image.number);
        Ok(images)
    }
}

/// `page-7.png` and `page-07.png` both map to page 7.
fn rendered_page_number(path: &Path) -> Option<u32> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("png") {
        return None;
    }
    path.file_stem()?
        .to_str()?
        .strip_prefix(PAGE_PREFIX)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

/// Rasterize + OCR path for documents without a usable text layer.
pub struct ScannedExtractor {
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Arc<dyn OcrEngineFactory>,
    dpi: u32,
    workers: usize,
}

impl ScannedExtractor {
    pub fn new(
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<dyn OcrEngineFactory>,
        dpi: u32,
        workers: Option<usize>,
    ) -> Self {
        let workers = workers.unwrap_or_else(default_worker_count).max(1);
        Self {
            rasterizer,
            ocr,
            dpi,
            workers,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn extract(&self, path: &Path) -> Result<String, IngestError> {
        let images = self.rasterizer.rasterize(path, self.dpi)?;
        let texts = recognize_pages(self.ocr.as_ref(), &images, self.workers)?;

        Ok(images
            .iter()
            .zip(texts.iter())
            .map(|(image, text)| format!("Page {}:\n{}", image.number, text))
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}
