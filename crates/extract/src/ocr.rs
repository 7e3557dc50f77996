//! Optical recognition fallback (requires the `ocr` feature).
//!
//! Pages are rasterized with poppler's `pdftoppm` and recognized with
//! Tesseract via leptess. Failures here are environmental (missing
//! binaries, timeouts, resource exhaustion), so they map to the transient,
//! retryable category rather than failing the document outright.

use crate::error::{ExtractError, ExtractResult};
use crate::recognition;
use sheetpress_core::Table;
use std::io::Cursor;
use std::path::Path;
use std::process::Command;

/// Tesseract-backed recognition engine.
pub struct OcrEngine {
    languages: String,
    dpi: u32,
}

impl OcrEngine {
    /// Create a new engine. Languages are Tesseract codes; empty defaults
    /// to English.
    pub fn new(languages: &[String], dpi: u32) -> Self {
        let languages = if languages.is_empty() {
            "eng".to_string()
        } else {
            languages.join("+")
        };
        Self { languages, dpi }
    }

    /// Recognize tables on every page. Pages where recognition finds no
    /// grid are recorded as warnings, not errors.
    pub fn recognize(
        &self,
        pdf: &[u8],
        page_count: usize,
        warnings: &mut Vec<String>,
    ) -> ExtractResult<Vec<Table>> {
        let span = tracing::info_span!("ocr_recognize", pages = page_count);
        let _guard = span.enter();

        let workdir = tempfile::tempdir()
            .map_err(|e| ExtractError::Transient(format!("failed to create temp dir: {e}")))?;
        let pdf_path = workdir.path().join("input.pdf");
        std::fs::write(&pdf_path, pdf)
            .map_err(|e| ExtractError::Transient(format!("failed to write temp PDF: {e}")))?;

        let mut tables = Vec::new();
        for page in 1..=page_count as u32 {
            let image = render_page(&pdf_path, workdir.path(), page, self.dpi)?;
            let tsv = self.recognize_page(&image)?;
            let words = recognition::parse_tsv(&tsv);
            match recognition::table_from_words(page, words) {
                Some(table) => tables.push(table),
                None => warnings.push(format!("page {page}: recognition found no grid")),
            }
        }
        Ok(tables)
    }

    /// Run Tesseract on one rendered page and return its TSV output.
    fn recognize_page(&self, image_data: &[u8]) -> ExtractResult<String> {
        // Normalize to PNG in memory; pdftoppm output is already PNG but
        // re-encoding shields leptess from format oddities.
        let img = image::load_from_memory(image_data)
            .map_err(|e| ExtractError::Transient(format!("failed to load page image: {e}")))?;
        let mut png_data = Vec::new();
        img.write_to(&mut Cursor::new(&mut png_data), image::ImageFormat::Png)
            .map_err(|e| ExtractError::Transient(format!("failed to encode page image: {e}")))?;

        let mut lt = leptess::LepTess::new(None, &self.languages)
            .map_err(|e| ExtractError::Transient(format!("failed to initialize Tesseract: {e}")))?;
        lt.set_image_from_mem(&png_data)
            .map_err(|e| ExtractError::Transient(format!("failed to set OCR image: {e}")))?;
        lt.get_tsv_text(0)
            .map_err(|e| ExtractError::Transient(format!("OCR failed: {e}")))
    }
}

/// Render one PDF page to a PNG with `pdftoppm`.
fn render_page(pdf_path: &Path, workdir: &Path, page: u32, dpi: u32) -> ExtractResult<Vec<u8>> {
    let output_prefix = workdir.join(format!("page-{page}"));

    let output = Command::new("pdftoppm")
        .args([
            "-png",
            "-r",
            &dpi.to_string(),
            "-f",
            &page.to_string(),
            "-l",
            &page.to_string(),
        ])
        .arg(pdf_path)
        .arg(&output_prefix)
        .output()
        .map_err(|e| {
            ExtractError::Transient(format!(
                "failed to run pdftoppm: {e}. Make sure poppler-utils is installed."
            ))
        })?;

    if !output.status.success() {
        return Err(ExtractError::Transient(format!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    // pdftoppm pads the page-number suffix depending on the page count.
    let candidates = [
        format!("{}-{page}.png", output_prefix.display()),
        format!("{}-{page:02}.png", output_prefix.display()),
        format!("{}-{page:03}.png", output_prefix.display()),
    ];
    let image_path = candidates
        .iter()
        .find(|p| Path::new(p).exists())
        .ok_or_else(|| {
            ExtractError::Transient("rendered page image not found".to_string())
        })?;

    std::fs::read(image_path)
        .map_err(|e| ExtractError::Transient(format!("failed to read rendered image: {e}")))
}
