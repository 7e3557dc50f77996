//! PDF table extraction engine for Sheetpress.
//!
//! The engine runs an ordered two-strategy pipeline:
//!
//! 1. **Structured extraction**: parse the PDF text layer and detect
//!    whitespace-aligned grids. Cheap and accurate for text-native PDFs.
//! 2. **Recognition extraction**: when the structured pass finds nothing
//!    usable, rasterize each page and reconstruct rows and columns from
//!    recognized word positions (Tesseract; `ocr` feature).
//!
//! Detected tables are assembled into an XLSX workbook, one worksheet per
//! table, in page order then top-to-bottom within a page.

pub mod error;
#[cfg(feature = "ocr")]
pub mod ocr;
pub mod recognition;
pub mod structured;
pub mod workbook;

pub use error::{ExtractError, ExtractResult};
pub use workbook::write_workbook;

use sheetpress_core::config::ExtractionConfig;
use sheetpress_core::Table;

/// Which strategy produced the final result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Text-layer grid detection.
    Structured,
    /// Rasterize-and-recognize fallback.
    Recognition,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Structured => "structured",
            Self::Recognition => "recognition",
        }
    }
}

/// Successful extraction output.
#[derive(Clone, Debug)]
pub struct ExtractionReport {
    /// Detected tables, page order then top-to-bottom within a page.
    pub tables: Vec<Table>,
    /// Non-fatal notes (skipped pages, unavailable fallback, ...).
    pub warnings: Vec<String>,
    /// Strategy that produced `tables`.
    pub strategy: Strategy,
}

/// The seam between the worker and the engine. Tests substitute scripted
/// implementations; production uses [`Extractor`].
pub trait TableExtractor: Send + Sync {
    /// Convert raw PDF bytes into detected tables.
    fn extract(&self, pdf: &[u8]) -> ExtractResult<ExtractionReport>;
}

/// The production extraction engine.
pub struct Extractor {
    min_fill_ratio: f64,
    #[cfg(feature = "ocr")]
    ocr: Option<ocr::OcrEngine>,
}

impl Extractor {
    /// Build an engine from configuration.
    pub fn from_config(config: &ExtractionConfig) -> Self {
        #[cfg(feature = "ocr")]
        let ocr = if config.ocr_enabled {
            Some(ocr::OcrEngine::new(&config.ocr_languages, config.ocr_dpi))
        } else {
            None
        };

        #[cfg(not(feature = "ocr"))]
        if config.ocr_enabled {
            tracing::warn!(
                "recognition fallback requested but this build lacks the `ocr` feature"
            );
        }

        Self {
            min_fill_ratio: config.min_fill_ratio,
            #[cfg(feature = "ocr")]
            ocr,
        }
    }

    /// Mean cell-fill ratio across tables; the structured-pass confidence.
    fn mean_fill_ratio(tables: &[Table]) -> f64 {
        if tables.is_empty() {
            return 0.0;
        }
        tables.iter().map(Table::fill_ratio).sum::<f64>() / tables.len() as f64
    }

    fn run_recognition(
        &self,
        pdf: &[u8],
        page_count: usize,
        warnings: &mut Vec<String>,
    ) -> ExtractResult<Vec<Table>> {
        #[cfg(feature = "ocr")]
        {
            if let Some(ocr) = &self.ocr {
                return ocr.recognize(pdf, page_count, warnings);
            }
        }
        let _ = (pdf, page_count);
        warnings.push("recognition fallback unavailable; structured result stands".to_string());
        Ok(Vec::new())
    }
}

impl TableExtractor for Extractor {
    fn extract(&self, pdf: &[u8]) -> ExtractResult<ExtractionReport> {
        let span = tracing::info_span!("extract", bytes = pdf.len());
        let _guard = span.enter();

        let document = structured::load_document(pdf)?;
        let mut warnings = Vec::new();
        let structured_tables = structured::extract_tables(&document, &mut warnings);
        let page_count = document.page_count;

        let fill = Self::mean_fill_ratio(&structured_tables);
        if !structured_tables.is_empty() && fill >= self.min_fill_ratio {
            tracing::debug!(
                tables = structured_tables.len(),
                fill_ratio = fill,
                "structured extraction succeeded"
            );
            return Ok(ExtractionReport {
                tables: structured_tables,
                warnings,
                strategy: Strategy::Structured,
            });
        }

        if !structured_tables.is_empty() {
            warnings.push(format!(
                "structured tables below confidence threshold (fill ratio {fill:.2}); trying recognition"
            ));
        }

        let recognized = self.run_recognition(pdf, page_count, &mut warnings)?;
        if !recognized.is_empty() {
            tracing::debug!(tables = recognized.len(), "recognition extraction succeeded");
            return Ok(ExtractionReport {
                tables: recognized,
                warnings,
                strategy: Strategy::Recognition,
            });
        }

        // Recognition found nothing (or was unavailable); a low-confidence
        // structured result is still better than none.
        if !structured_tables.is_empty() {
            return Ok(ExtractionReport {
                tables: structured_tables,
                warnings,
                strategy: Strategy::Structured,
            });
        }

        Err(ExtractError::NoTablesFound)
    }
}
