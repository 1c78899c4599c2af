// Ratio table extraction from a loosely structured source grid
//
// Source exports carry a free-form header block, then a row whose first
// cell reads "Ratio", then one row per ratio code with the three quartiles
// at fixed columns D, E and F. Footer notes may follow the table.

use crate::cell::CellValue;
use crate::record::{Quartile, QuartileValues, RatioRecord};

/// First-column marker that precedes the ratio table
pub const DEFAULT_SENTINEL: &str = "Ratio";

/// Fixed column positions (0-indexed) of the quartile values
pub const QUARTILE_COLUMNS: [(Quartile, usize); 3] =
    [(Quartile::Q1, 3), (Quartile::Q2, 4), (Quartile::Q3, 5)];

static EMPTY_CELL: CellValue = CellValue::Empty;

/// Row-major cells of one source sheet, positioned absolutely from A1.
///
/// Rows may be ragged; any position outside the stored cells reads as
/// `CellValue::Empty`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceGrid {
    rows: Vec<Vec<CellValue>>,
}

impl SourceGrid {
    pub fn new(rows: Vec<Vec<CellValue>>) -> Self {
        Self { rows }
    }

    pub fn push_row(&mut self, row: Vec<CellValue>) {
        self.rows.push(row);
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    /// Set a cell, growing the grid as needed.
    pub fn set(&mut self, row: usize, col: usize, value: CellValue) {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let r = &mut self.rows[row];
        if r.len() <= col {
            r.resize(col + 1, CellValue::Empty);
        }
        r[col] = value;
    }
}

/// Result of scanning one source grid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub record: RatioRecord,
    /// Row index of the sentinel, if one was found
    pub sentinel_row: Option<usize>,
    /// Rows examined below the sentinel
    pub rows_scanned: usize,
    /// Rows skipped as notes (first column not a ratio code)
    pub rows_skipped: usize,
    /// Quartile fields that coerced to absent
    pub absent_fields: usize,
}

impl Extraction {
    pub fn found_sentinel(&self) -> bool {
        self.sentinel_row.is_some()
    }

    /// True when the file contributes nothing to the masterfile.
    pub fn is_empty(&self) -> bool {
        self.record.is_empty()
    }
}

/// Scans source grids for the ratio table
#[derive(Debug, Clone)]
pub struct Extractor {
    sentinel: String,
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL)
    }
}

impl Extractor {
    pub fn new(sentinel: impl Into<String>) -> Self {
        Self { sentinel: sentinel.into().trim().to_string() }
    }

    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Locate the sentinel row: first row whose trimmed first cell equals it.
    pub fn find_sentinel(&self, grid: &SourceGrid) -> Option<usize> {
        (0..grid.height()).find(|&row| {
            grid.cell(row, 0)
                .as_text()
                .is_some_and(|text| text.trim() == self.sentinel)
        })
    }

    /// Extract every ratio row below the sentinel.
    ///
    /// Never fails: a missing sentinel yields an empty record, non-ratio rows
    /// are skipped without ending the scan, and unreadable quartile cells
    /// become absent values.
    pub fn extract(&self, grid: &SourceGrid) -> Extraction {
        let mut extraction = Extraction::default();

        let Some(sentinel_row) = self.find_sentinel(grid) else {
            return extraction;
        };
        extraction.sentinel_row = Some(sentinel_row);

        for row in (sentinel_row + 1)..grid.height() {
            extraction.rows_scanned += 1;

            let Some(text) = grid.cell(row, 0).as_text() else {
                continue;
            };
            let code = text.trim();
            if code.is_empty() {
                continue;
            }
            if !is_ratio_code(code) {
                extraction.rows_skipped += 1;
                continue;
            }

            let mut values = QuartileValues::default();
            for (quartile, col) in QUARTILE_COLUMNS {
                values.set(quartile, grid.cell(row, col).to_number());
            }
            extraction.absent_fields += values.absent_count();

            if extraction.record.insert(code, values).is_some() {
                log::debug!("Ratio {} repeated at row {}; keeping the later values", code, row + 1);
            }
        }

        extraction
    }
}

/// Ratio rows are recognised by prefix only (`R..` or `T..`).
fn is_ratio_code(code: &str) -> bool {
    code.starts_with('R') || code.starts_with('T')
}

/// Extract with the default sentinel.
pub fn extract_ratios(grid: &SourceGrid) -> Extraction {
    Extractor::default().extract(grid)
}
