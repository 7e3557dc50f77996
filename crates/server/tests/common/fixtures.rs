//! Test fixtures: PDF builders and scripted extraction engines.
//! Note: each test file compiles common/ separately, so any one binary
//! uses only a subset of these helpers.
#![allow(dead_code)]

use lopdf::{dictionary, Document, Object, Stream};
use sheetpress_core::Table;
use sheetpress_extract::{
    ExtractError, ExtractResult, ExtractionReport, Strategy, TableExtractor,
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Build a single-page text-native PDF whose text layer contains `lines`
/// (Courier, so character columns align).
pub fn pdf_with_lines(lines: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut content = String::from("BT /F1 10 Tf 50 700 Td ");
    for line in lines {
        content.push_str(&format!("({line}) Tj 0 -14 Td "));
    }
    content.push_str("ET");

    let content_id = doc.add_object(Object::Stream(Stream::new(
        dictionary! {},
        content.into_bytes(),
    )));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Resources" => resources_id,
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// A PDF with one clean two-table-column grid.
pub fn tabular_pdf() -> Vec<u8> {
    pdf_with_lines(&[
        "Item      Qty    Price",
        "Widget    4      9.50",
        "Gadget    2      14.00",
    ])
}

/// A structurally valid PDF containing prose and no tables.
pub fn prose_pdf() -> Vec<u8> {
    pdf_with_lines(&[
        "Dear customer,",
        "thank you for your letter. There are",
        "no tables anywhere in this document.",
    ])
}

/// A structurally valid PDF carrying an Encrypt dictionary.
pub fn encrypted_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    let encrypt_id = doc.add_object(dictionary! {
        "Filter" => "Standard",
        "V" => 1,
        "R" => 2,
        "P" => -44,
    });
    doc.trailer.set("Root", catalog_id);
    doc.trailer.set("Encrypt", encrypt_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// One scripted outcome for [`ScriptedExtractor`].
#[derive(Clone, Copy, Debug)]
pub enum ScriptedOutcome {
    /// Succeed with this many tables.
    Tables(usize),
    NoTables,
    Unparsable,
    Transient,
}

/// A [`TableExtractor`] that plays back a fixed script of outcomes, used to
/// drive the worker through retry and failure paths deterministically.
/// Once the script is exhausted it keeps succeeding with one table.
pub struct ScriptedExtractor {
    script: Mutex<VecDeque<ScriptedOutcome>>,
}

impl ScriptedExtractor {
    pub fn new(outcomes: &[ScriptedOutcome]) -> Self {
        Self {
            script: Mutex::new(outcomes.iter().copied().collect()),
        }
    }

    fn sample_tables(count: usize) -> Vec<Table> {
        (0..count)
            .map(|i| Table {
                page: (i + 1) as u32,
                rows: vec![
                    vec!["Name".to_string(), "Total".to_string()],
                    vec![format!("row-{i}"), "42".to_string()],
                ],
            })
            .collect()
    }
}

impl TableExtractor for ScriptedExtractor {
    fn extract(&self, _pdf: &[u8]) -> ExtractResult<ExtractionReport> {
        let outcome = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedOutcome::Tables(1));
        match outcome {
            ScriptedOutcome::Tables(count) => Ok(ExtractionReport {
                tables: Self::sample_tables(count),
                warnings: Vec::new(),
                strategy: Strategy::Structured,
            }),
            ScriptedOutcome::NoTables => Err(ExtractError::NoTablesFound),
            ScriptedOutcome::Unparsable => Err(ExtractError::UnparsableDocument(
                "scripted unparsable document".to_string(),
            )),
            ScriptedOutcome::Transient => Err(ExtractError::Transient(
                "scripted transient failure".to_string(),
            )),
        }
    }
}
