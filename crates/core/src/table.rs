//! The extracted table model.

use serde::{Deserialize, Serialize};

/// A single table detected in a document.
///
/// Rows are rectangular: every row has the same number of cells, padded with
/// empty strings where the source was ragged. Tables are ordered by page,
/// then top-to-bottom within a page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// 1-based page number the table was detected on.
    pub page: u32,
    /// Cell text, row-major.
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Number of columns (width of the widest row; rows are padded to this).
    pub fn column_count(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Fraction of cells containing non-whitespace text, in `0.0..=1.0`.
    /// Used as the structured-extraction confidence signal.
    pub fn fill_ratio(&self) -> f64 {
        let total: usize = self.rows.iter().map(Vec::len).sum();
        if total == 0 {
            return 0.0;
        }
        let filled = self
            .rows
            .iter()
            .flatten()
            .filter(|cell| !cell.trim().is_empty())
            .count();
        filled as f64 / total as f64
    }

    /// Pad ragged rows with empty cells so the table is rectangular.
    pub fn normalize(&mut self) {
        let width = self.column_count();
        for row in &mut self.rows {
            row.resize(width, String::new());
        }
    }
}
