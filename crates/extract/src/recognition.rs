//! Recognition extraction: rebuild tables from recognized word geometry.
//!
//! The OCR step (see the `ocr` module) yields Tesseract TSV output: one
//! word per line with its bounding box. Words are clustered into rows by
//! vertical position and into columns by the empty vertical channels
//! between merged horizontal spans. The geometry logic is pure so it can
//! be tested without a Tesseract installation.

use sheetpress_core::Table;

/// Words clustered into the same row may differ in top coordinate by this
/// fraction of the median word height.
const ROW_TOLERANCE: f64 = 0.7;

/// A horizontal gap narrower than this fraction of the median word height
/// does not separate columns.
const COLUMN_GUTTER: f64 = 0.5;

/// A word recognized on a rasterized page, with its pixel bounding box.
#[derive(Clone, Debug)]
pub struct RecognizedWord {
    pub left: i64,
    pub top: i64,
    pub width: i64,
    pub height: i64,
    pub conf: f32,
    pub text: String,
}

/// Parse Tesseract TSV output into words.
///
/// TSV columns: level, page, block, paragraph, line, word, left, top,
/// width, height, conf, text. Only word-level entries (level 5) with
/// non-negative confidence and non-empty text survive.
pub fn parse_tsv(tsv: &str) -> Vec<RecognizedWord> {
    let mut words = Vec::new();
    for line in tsv.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 12 {
            continue;
        }
        if fields[0] != "5" {
            continue;
        }
        let (Ok(left), Ok(top), Ok(width), Ok(height), Ok(conf)) = (
            fields[6].parse::<i64>(),
            fields[7].parse::<i64>(),
            fields[8].parse::<i64>(),
            fields[9].parse::<i64>(),
            fields[10].parse::<f32>(),
        ) else {
            continue;
        };
        let text = fields[11..].join("\t");
        let text = text.trim();
        if conf < 0.0 || text.is_empty() {
            continue;
        }
        words.push(RecognizedWord {
            left,
            top,
            width,
            height,
            conf,
            text: text.to_string(),
        });
    }
    words
}

fn median_height(words: &[RecognizedWord]) -> i64 {
    let mut heights: Vec<i64> = words.iter().map(|w| w.height.max(1)).collect();
    heights.sort_unstable();
    heights[heights.len() / 2]
}

/// Cluster words into rows by vertical position; rows come out top to
/// bottom, words within a row left to right.
fn cluster_rows(mut words: Vec<RecognizedWord>) -> Vec<Vec<RecognizedWord>> {
    let tolerance = (median_height(&words) as f64 * ROW_TOLERANCE) as i64;
    words.sort_by_key(|w| (w.top, w.left));

    let mut rows: Vec<Vec<RecognizedWord>> = Vec::new();
    for word in words {
        match rows.last_mut() {
            Some(row) if (word.top - row[0].top).abs() <= tolerance => row.push(word),
            _ => rows.push(vec![word]),
        }
    }
    for row in &mut rows {
        row.sort_by_key(|w| w.left);
    }
    rows
}

/// Derive column spans from the empty vertical channels of the page:
/// merge every word's horizontal extent, tolerating intra-column gaps up
/// to a fraction of the median word height; what remains separated are
/// the columns.
fn column_spans(words: &[RecognizedWord]) -> Vec<(i64, i64)> {
    let gutter = (median_height(words) as f64 * COLUMN_GUTTER).max(1.0) as i64;
    let mut intervals: Vec<(i64, i64)> = words
        .iter()
        .map(|w| (w.left, w.left + w.width.max(1)))
        .collect();
    intervals.sort_unstable();

    let mut spans: Vec<(i64, i64)> = Vec::new();
    for (start, end) in intervals {
        match spans.last_mut() {
            Some((_, span_end)) if start <= *span_end + gutter => {
                *span_end = (*span_end).max(end);
            }
            _ => spans.push((start, end)),
        }
    }
    spans
}

fn column_index(spans: &[(i64, i64)], word: &RecognizedWord) -> usize {
    let center = word.left + word.width / 2;
    spans
        .iter()
        .position(|(start, end)| center >= *start && center < *end)
        .unwrap_or_else(|| {
            // A word straddling a gutter lands in the nearest span.
            spans
                .iter()
                .enumerate()
                .min_by_key(|(_, (start, end))| {
                    (center - *start).abs().min((center - *end).abs())
                })
                .map(|(i, _)| i)
                .unwrap_or(0)
        })
}

/// Rebuild one table from a page's recognized words. Returns None when the
/// words do not form at least a 2×2 grid.
pub fn table_from_words(page: u32, words: Vec<RecognizedWord>) -> Option<Table> {
    if words.len() < 4 {
        return None;
    }

    let spans = column_spans(&words);
    if spans.len() < 2 {
        return None;
    }

    let rows = cluster_rows(words);
    if rows.len() < 2 {
        return None;
    }

    let mut table_rows = Vec::with_capacity(rows.len());
    for row in rows {
        let mut cells = vec![String::new(); spans.len()];
        for word in row {
            let idx = column_index(&spans, &word);
            if !cells[idx].is_empty() {
                cells[idx].push(' ');
            }
            cells[idx].push_str(&word.text);
        }
        table_rows.push(cells);
    }

    let mut table = Table {
        page,
        rows: table_rows,
    };
    table.normalize();
    Some(table)
}
