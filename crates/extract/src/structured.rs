//! Structured extraction: table detection from the PDF text layer.
//!
//! Text-native PDFs render tables as whitespace-aligned character grids.
//! Each page's text is scanned line by line; a line whose content splits
//! into two or more cells (separated by runs of two or more spaces) is a
//! table-row candidate, and consecutive candidates whose column starts
//! agree form a table block.

use crate::error::{ExtractError, ExtractResult};
use sheetpress_core::Table;

/// A gap of this many columns (spaces) separates two cells.
const COLUMN_GAP: usize = 2;

/// Column starts may drift by this many characters between rows.
const COLUMN_TOLERANCE: usize = 3;

/// Minimum rows for a block to count as a table.
const MIN_TABLE_ROWS: usize = 2;

/// Minimum cells for a line to be a table-row candidate.
const MIN_TABLE_COLUMNS: usize = 2;

/// A parsed PDF with its page count.
pub struct LoadedDocument {
    pub doc: lopdf::Document,
    pub page_count: usize,
}

/// Load and validate a PDF. Corrupt and password-protected documents are
/// unparsable: terminal, never retried.
pub fn load_document(pdf: &[u8]) -> ExtractResult<LoadedDocument> {
    let doc = lopdf::Document::load_mem(pdf).map_err(|e| {
        let text = e.to_string().to_ascii_lowercase();
        if text.contains("crypt") {
            ExtractError::UnparsableDocument("password-protected document".to_string())
        } else {
            ExtractError::UnparsableDocument(format!("failed to load PDF: {e}"))
        }
    })?;

    if doc.trailer.get(b"Encrypt").is_ok() {
        return Err(ExtractError::UnparsableDocument(
            "password-protected document".to_string(),
        ));
    }

    let page_count = doc.get_pages().len();
    if page_count == 0 {
        return Err(ExtractError::UnparsableDocument(
            "document has no pages".to_string(),
        ));
    }

    Ok(LoadedDocument { doc, page_count })
}

/// Detect tables across all pages, in page order. Pages whose text cannot
/// be extracted are skipped with a warning rather than failing the job.
pub fn extract_tables(document: &LoadedDocument, warnings: &mut Vec<String>) -> Vec<Table> {
    let mut tables = Vec::new();
    for (page_num, _) in document.doc.get_pages() {
        match document.doc.extract_text(&[page_num]) {
            Ok(text) => tables.extend(detect_tables(page_num, &text)),
            Err(e) => {
                warnings.push(format!("page {page_num}: text extraction failed: {e}"));
            }
        }
    }
    tables
}

/// A table-row candidate: cell texts with their character-column starts.
struct CandidateRow {
    starts: Vec<usize>,
    cells: Vec<String>,
}

/// Split a line into cells on runs of two or more spaces (tabs count as a
/// full gap). Returns None unless the line has at least two cells.
fn split_cells(line: &str) -> Option<CandidateRow> {
    let mut cells: Vec<String> = Vec::new();
    let mut starts: Vec<usize> = Vec::new();
    let mut current = String::new();
    let mut start = 0usize;
    let mut pending = 0usize;

    for (idx, ch) in line.chars().enumerate() {
        if ch == ' ' || ch == '\t' {
            pending += if ch == '\t' { COLUMN_GAP } else { 1 };
            continue;
        }
        if current.is_empty() {
            start = idx;
        } else if pending >= COLUMN_GAP {
            starts.push(start);
            cells.push(std::mem::take(&mut current));
            start = idx;
        } else if pending > 0 {
            current.push(' ');
        }
        pending = 0;
        current.push(ch);
    }
    if !current.is_empty() {
        starts.push(start);
        cells.push(current);
    }

    if cells.len() >= MIN_TABLE_COLUMNS {
        Some(CandidateRow { starts, cells })
    } else {
        None
    }
}

/// Column starts agree when both rows have the same cell count and each
/// start drifts at most [`COLUMN_TOLERANCE`] characters.
fn compatible(previous: &CandidateRow, next: &CandidateRow) -> bool {
    previous.starts.len() == next.starts.len()
        && previous
            .starts
            .iter()
            .zip(&next.starts)
            .all(|(a, b)| a.abs_diff(*b) <= COLUMN_TOLERANCE)
}

fn flush_block(tables: &mut Vec<Table>, block: &mut Vec<CandidateRow>, page: u32) {
    if block.len() >= MIN_TABLE_ROWS {
        let mut table = Table {
            page,
            rows: block.drain(..).map(|row| row.cells).collect(),
        };
        table.normalize();
        tables.push(table);
    } else {
        block.clear();
    }
}

/// Detect whitespace-aligned grids in one page's text, top to bottom.
fn detect_tables(page: u32, text: &str) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut block: Vec<CandidateRow> = Vec::new();

    for line in text.lines() {
        match split_cells(line) {
            Some(row) => {
                if let Some(last) = block.last() {
                    if !compatible(last, &row) {
                        flush_block(&mut tables, &mut block, page);
                    }
                }
                block.push(row);
            }
            None => flush_block(&mut tables, &mut block, page),
        }
    }
    flush_block(&mut tables, &mut block, page);
    tables
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build a single-page PDF whose text layer contains `lines`, one text
    /// operation per line (Courier, so character columns align).
    pub fn pdf_with_lines(lines: &[&str]) -> Vec<u8> {
        pdf_with_pages(&[lines])
    }

    /// Build a multi-page PDF, one entry per page.
    pub fn pdf_with_pages(pages: &[&[&str]]) -> Vec<u8> {
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

        let mut kids: Vec<Object> = Vec::new();
        for lines in pages {
            let mut content = String::from("BT /F1 10 Tf 50 700 Td ");
            for line in *lines {
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
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
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

    #[test]
    fn split_cells_requires_a_double_space_gap() {
        let row = split_cells("North East  42  1.5").unwrap();
        assert_eq!(row.cells, vec!["North East", "42", "1.5"]);
        assert_eq!(row.starts, vec![0, 12, 16]);

        assert!(split_cells("just a prose sentence here").is_none());
        assert!(split_cells("").is_none());
        assert!(split_cells("single").is_none());
    }

    #[test]
    fn split_cells_handles_tabs_and_leading_space() {
        let row = split_cells("  a\tb").unwrap();
        assert_eq!(row.cells, vec!["a", "b"]);
        assert_eq!(row.starts[0], 2);
    }

    #[test]
    fn detect_tables_groups_aligned_lines() {
        let text = "Report heading\n\
                    Item      Qty    Price\n\
                    Widget    4      9.50\n\
                    Gadget    2      14.00\n\
                    Closing remarks go here\n";
        let tables = detect_tables(1, text);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 3);
        assert_eq!(tables[0].column_count(), 3);
        assert_eq!(tables[0].rows[1], vec!["Widget", "4", "9.50"]);
    }

    #[test]
    fn detect_tables_splits_on_misaligned_blocks() {
        let text = "A         B\n\
                    1         2\n\
                    \n\
                    Name                Total\n\
                    Quarterly           99\n";
        let tables = detect_tables(1, text);
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].rows[0], vec!["A", "B"]);
        assert_eq!(tables[1].rows[0], vec!["Name", "Total"]);
    }

    #[test]
    fn lone_candidate_rows_are_not_tables() {
        let text = "prose line\nA  B\nmore prose\n";
        assert!(detect_tables(1, text).is_empty());
    }

    #[test]
    fn tables_preserve_page_order() {
        let pdf = pdf_with_pages(&[
            &["P1A   P1B", "1     2"],
            &["P2A   P2B", "3     4"],
        ]);
        let document = load_document(&pdf).unwrap();
        let mut warnings = Vec::new();
        let tables = extract_tables(&document, &mut warnings);

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].page, 1);
        assert_eq!(tables[1].page, 2);
        assert_eq!(tables[0].rows[0][0], "P1A");
        assert_eq!(tables[1].rows[1][1], "4");
        assert!(warnings.is_empty());
    }

    #[test]
    fn load_rejects_garbage_and_empty_documents() {
        assert!(matches!(
            load_document(b"%PDF-garbage"),
            Err(ExtractError::UnparsableDocument(_))
        ));
    }
}
