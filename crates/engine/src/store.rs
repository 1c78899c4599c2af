// In-memory masterfile: one sheet per period, one row per entity code
//
// Invariants held at the boundary of `MasterStore::upsert`:
// - entity codes are unique within a sheet (upsert finds before it appends)
// - a sheet's columns never change after creation; unknown ratio/quartile
//   pairs are skipped, not added

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::cell::CellValue;
use crate::record::RatioRecord;

/// Header of the entity-code column in every sheet
pub const DEFAULT_KEY_COLUMN: &str = "CNAE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No sheet exists to clone a column layout from.
    NoTemplate { period: String },
    /// Entity code is not an integer.
    InvalidEntityCode { code: String },
    /// A sheet's header row lacks the key column.
    MissingKeyColumn { sheet: String, column: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTemplate { period } => {
                write!(f, "cannot create sheet '{period}': the masterfile has no sheet to use as a template")
            }
            Self::InvalidEntityCode { code } => write!(f, "invalid entity code: '{code}'"),
            Self::MissingKeyColumn { sheet, column } => {
                write!(f, "sheet '{sheet}': missing key column '{column}'")
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// One masterfile row; `cells` is parallel to the sheet's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    cells: Vec<CellValue>,
}

impl Row {
    pub fn cells(&self) -> &[CellValue] {
        &self.cells
    }

    pub fn get(&self, col: usize) -> &CellValue {
        &self.cells[col]
    }
}

/// A single period's table
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    columns: Vec<String>,
    key_col: usize,
    column_index: HashMap<String, usize>,
    rows: Vec<Row>,
    /// Zero-based (row, column) of the header's first cell in the workbook
    origin: (u32, u16),
}

impl Sheet {
    /// Create an empty sheet with the given header row.
    ///
    /// `key_column` must appear among `columns`. Duplicate headers resolve to
    /// their first occurrence.
    pub fn new(name: impl Into<String>, columns: Vec<String>, key_column: &str) -> Result<Self, StoreError> {
        let name = name.into();
        let mut column_index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            column_index.entry(col.trim().to_string()).or_insert(i);
        }

        let key_col = *column_index.get(key_column).ok_or_else(|| StoreError::MissingKeyColumn {
            sheet: name.clone(),
            column: key_column.to_string(),
        })?;

        Ok(Self { name, columns, key_col, column_index, rows: Vec::new(), origin: (0, 0) })
    }

    /// Place the table at `origin` instead of A1.
    pub fn with_origin(mut self, origin: (u32, u16)) -> Self {
        self.origin = origin;
        self
    }

    pub fn origin(&self) -> (u32, u16) {
        self.origin
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn key_column(&self) -> &str {
        &self.columns[self.key_col]
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_index.get(name).copied()
    }

    /// Append a loaded row. Short rows are padded, long rows truncated to the
    /// header width.
    pub fn push_row(&mut self, mut cells: Vec<CellValue>) {
        cells.resize(self.columns.len(), CellValue::Empty);
        self.rows.push(Row { cells });
    }

    /// Integer entity code of row `idx`, if its key cell holds one.
    pub fn row_code(&self, idx: usize) -> Option<i64> {
        self.rows.get(idx).and_then(|r| r.cells[self.key_col].to_integer())
    }

    pub fn find_row(&self, code: i64) -> Option<usize> {
        (0..self.rows.len()).find(|&i| self.row_code(i) == Some(code))
    }

    /// Cell lookup by entity code and column name.
    pub fn value(&self, code: i64, column: &str) -> Option<&CellValue> {
        let row = self.find_row(code)?;
        let col = self.column_index(column)?;
        Some(self.rows[row].get(col))
    }

    /// Entity codes in row order (rows without an integer key are omitted).
    pub fn codes(&self) -> Vec<i64> {
        (0..self.rows.len()).filter_map(|i| self.row_code(i)).collect()
    }

    /// Codes that appear on more than one row, ascending.
    pub fn duplicate_codes(&self) -> Vec<i64> {
        let mut codes = self.codes();
        codes.sort_unstable();
        let mut dups: Vec<i64> = codes.windows(2).filter(|w| w[0] == w[1]).map(|w| w[0]).collect();
        dups.dedup();
        dups
    }

    /// Same columns, no rows.
    fn empty_like(&self, name: &str) -> Sheet {
        Sheet {
            name: name.to_string(),
            columns: self.columns.clone(),
            key_col: self.key_col,
            column_index: self.column_index.clone(),
            rows: Vec::new(),
            origin: self.origin,
        }
    }

    /// Stable ascending sort by entity code; rows without an integer key go
    /// last in their existing order.
    pub fn sort_by_code(&mut self) {
        let key_col = self.key_col;
        self.rows.sort_by_key(|row| match row.cells[key_col].to_integer() {
            Some(code) => (0u8, code),
            None => (1u8, 0),
        });
    }

    fn find_or_append(&mut self, code: i64) -> (usize, bool) {
        if let Some(idx) = self.find_row(code) {
            return (idx, false);
        }
        let mut cells = vec![CellValue::Empty; self.columns.len()];
        cells[self.key_col] = CellValue::Number(code as f64);
        self.rows.push(Row { cells });
        (self.rows.len() - 1, true)
    }
}

/// What a single upsert changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpsertOutcome {
    /// Cells written (overwritten or newly filled)
    pub written: usize,
    /// Fields skipped because the extracted value was absent
    pub skipped_absent: usize,
    /// Record columns with no counterpart in the sheet
    pub unknown_columns: Vec<String>,
    pub row_created: bool,
    pub sheet_created: bool,
}

/// All sheets of the masterfile, in workbook order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MasterStore {
    sheets: Vec<Sheet>,
}

impl MasterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sheet, replacing any existing sheet of the same name in place.
    pub fn insert_sheet(&mut self, sheet: Sheet) {
        match self.sheets.iter_mut().find(|s| s.name == sheet.name) {
            Some(existing) => *existing = sheet,
            None => self.sheets.push(sheet),
        }
    }

    pub fn sheet(&self, period: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == period)
    }

    pub fn sheets(&self) -> &[Sheet] {
        &self.sheets
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }

    /// Template for new sheets: the lexicographically smallest period, so the
    /// choice does not depend on workbook order.
    pub fn template(&self) -> Option<&Sheet> {
        self.sheets.iter().min_by(|a, b| a.name.cmp(&b.name))
    }

    /// Index of the sheet for `period`, creating it from the template when
    /// missing. The bool reports creation.
    fn resolve_sheet(&mut self, period: &str) -> Result<(usize, bool), StoreError> {
        if let Some(idx) = self.sheets.iter().position(|s| s.name == period) {
            return Ok((idx, false));
        }

        let template = self.template().ok_or_else(|| StoreError::NoTemplate {
            period: period.to_string(),
        })?;
        log::warn!(
            "Sheet '{}' not found in masterfile; creating it with the columns of '{}'",
            period,
            template.name
        );
        let sheet = template.empty_like(period);
        self.sheets.push(sheet);
        Ok((self.sheets.len() - 1, true))
    }

    /// Write one file's record into the row for (`period`, `entity_code`).
    ///
    /// Present values overwrite their cells; absent values and columns the
    /// sheet does not have are skipped. Applying the same arguments twice
    /// leaves the store as applying them once.
    pub fn upsert(
        &mut self,
        period: &str,
        entity_code: &str,
        record: &RatioRecord,
    ) -> Result<UpsertOutcome, StoreError> {
        let code = entity_code.trim().parse::<i64>().map_err(|_| StoreError::InvalidEntityCode {
            code: entity_code.to_string(),
        })?;

        let (sheet_idx, sheet_created) = self.resolve_sheet(period)?;
        let sheet = &mut self.sheets[sheet_idx];

        let (row_idx, row_created) = sheet.find_or_append(code);
        if row_created {
            log::info!("Adding row for {} {} in sheet '{}'", sheet.key_column(), entity_code, period);
        }

        let mut outcome = UpsertOutcome { row_created, sheet_created, ..Default::default() };

        for (column, value) in record.fields() {
            let Some(col) = sheet.column_index(&column) else {
                log::debug!("Column {} does not exist in sheet '{}'", column, period);
                outcome.unknown_columns.push(column);
                continue;
            };
            match value {
                Some(v) => {
                    sheet.rows[row_idx].cells[col] = CellValue::Number(v);
                    outcome.written += 1;
                }
                None => {
                    log::debug!("No value for {} ({} {})", column, period, entity_code);
                    outcome.skipped_absent += 1;
                }
            }
        }

        Ok(outcome)
    }

    /// Sort every sheet by entity code. Run once, right before persisting.
    pub fn sort_for_persist(&mut self) {
        for sheet in &mut self.sheets {
            sheet.sort_by_code();
        }
    }
}
