// Excel file import (xls, xlsx, xlsb, ods) and export (xlsx only)
//
// Import: source exports are read as positioned grids; the masterfile is read
//         as header + rows per sheet.
// Export: the masterfile is rewritten in full, values only.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Range, Reader, Sheets};
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook, Worksheet};
use ratiobook_engine::store::Sheet;
use ratiobook_engine::{CellValue, MasterStore, SourceGrid};

use crate::error::{MasterfileError, SourceError};

/// Convert a calamine cell. Error cells read as empty so they coerce to
/// absent values instead of text.
fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => {
            if s.trim().is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(s.clone())
            }
        }
        Data::Float(n) => CellValue::Number(*n),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        // Keep the serial so the value survives a load/save round trip
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
    }
}

/// Rows of a range as stored, starting at the range's first used cell.
fn range_rows(range: &Range<Data>) -> Vec<Vec<CellValue>> {
    range
        .rows()
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect()
}

/// Rows of a range placed at their absolute sheet positions (A1 = 0,0).
/// Source layouts address quartiles by fixed column, so leading blank
/// columns must not shift them.
fn range_grid(range: &Range<Data>) -> SourceGrid {
    let (start_row, start_col) = range.start().unwrap_or((0, 0));
    let mut grid = SourceGrid::default();

    for _ in 0..start_row {
        grid.push_row(Vec::new());
    }
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; start_col as usize];
        cells.extend(row.iter().map(cell_from_data));
        grid.push_row(cells);
    }
    grid
}

fn open_source(path: &Path) -> Result<Sheets<std::io::BufReader<std::fs::File>>, SourceError> {
    open_workbook_auto(path).map_err(|e| SourceError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Read the first sheet of a source workbook as a positioned grid.
pub fn import_grid(path: &Path) -> Result<SourceGrid, SourceError> {
    let mut workbook = open_source(path)?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| SourceError::NoSheets { path: path.to_path_buf() })?
        .map_err(|e| SourceError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    Ok(range_grid(&range))
}

/// Per-sheet load statistics
#[derive(Debug, Default, Clone)]
pub struct SheetStats {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub duplicate_codes: Vec<i64>,
}

/// Load every sheet of the masterfile. The first row of each sheet is the
/// header; it must contain `key_column`. Fully blank rows are dropped.
pub fn import_masterfile(path: &Path, key_column: &str) -> Result<(MasterStore, Vec<SheetStats>), MasterfileError> {
    let mut workbook = open_workbook_auto(path).map_err(|e| MasterfileError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut store = MasterStore::new();
    let mut stats = Vec::new();

    for sheet_name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| MasterfileError::ReadSheet {
                sheet: sheet_name.clone(),
                message: e.to_string(),
            })?;

        let mut rows = range_rows(&range).into_iter();
        let header: Vec<String> = rows
            .next()
            .unwrap_or_default()
            .iter()
            .map(|cell| cell.as_text().map(|s| s.trim().to_string()).unwrap_or_default())
            .collect();

        // Written back at the same place so leading blank rows and columns survive
        let origin = range.start().map(|(r, c)| (r, c as u16)).unwrap_or((0, 0));
        let mut sheet = Sheet::new(sheet_name.clone(), header, key_column)?.with_origin(origin);
        for row in rows {
            if row.iter().all(CellValue::is_empty) {
                continue;
            }
            sheet.push_row(row);
        }

        let sheet_stats = SheetStats {
            name: sheet_name.clone(),
            rows: sheet.len(),
            columns: sheet.columns().len(),
            duplicate_codes: sheet.duplicate_codes(),
        };
        log::info!("Loaded sheet '{}' with {} rows", sheet_name, sheet_stats.rows);
        if !sheet_stats.duplicate_codes.is_empty() {
            log::warn!(
                "Sheet '{}' repeats {} codes {:?}; updates go to the first matching row",
                sheet_name,
                key_column,
                sheet_stats.duplicate_codes
            );
        }

        store.insert_sheet(sheet);
        stats.push(sheet_stats);
    }

    Ok((store, stats))
}

/// Result of an Excel export operation
#[derive(Debug, Default, Clone)]
pub struct ExportResult {
    /// Number of sheets exported
    pub sheets_exported: usize,
    /// Data rows exported, all sheets
    pub rows_exported: usize,
    /// Non-empty cells exported, headers excluded
    pub cells_exported: usize,
}

impl ExportResult {
    /// Returns a summary message suitable for display
    pub fn summary(&self) -> String {
        format!(
            "{} sheet{}, {} rows, {} cells",
            self.sheets_exported,
            if self.sheets_exported == 1 { "" } else { "s" },
            self.rows_exported,
            self.cells_exported
        )
    }
}

/// Render the store as an xlsx file in memory, sheets in store order.
pub fn export_to_buffer(store: &MasterStore) -> Result<(Vec<u8>, ExportResult), MasterfileError> {
    let mut result = ExportResult::default();
    let mut xlsx_workbook = XlsxWorkbook::new();
    let header_format = Format::new().set_bold();

    for sheet in store.sheets() {
        let write_err = |e: rust_xlsxwriter::XlsxError| MasterfileError::Write {
            sheet: sheet.name().to_string(),
            message: e.to_string(),
        };

        let worksheet = xlsx_workbook
            .add_worksheet()
            .set_name(sheet.name())
            .map_err(write_err)?;

        let (top, left) = sheet.origin();
        for (col, name) in sheet.columns().iter().enumerate() {
            if !name.is_empty() {
                worksheet
                    .write_string_with_format(top, left + col as u16, name, &header_format)
                    .map_err(write_err)?;
            }
        }

        let cells = export_sheet_rows(sheet, worksheet).map_err(write_err)?;
        result.cells_exported += cells;
        result.rows_exported += sheet.len();
        result.sheets_exported += 1;
        log::info!("Saved sheet '{}' with {} rows", sheet.name(), sheet.len());
    }

    let buffer = xlsx_workbook.save_to_buffer().map_err(|e| MasterfileError::Write {
        sheet: String::new(),
        message: e.to_string(),
    })?;
    Ok((buffer, result))
}

/// Write data rows below the header. Returns the number of cells written.
fn export_sheet_rows(sheet: &Sheet, worksheet: &mut Worksheet) -> Result<usize, rust_xlsxwriter::XlsxError> {
    let mut cells_exported = 0;
    let (top, left) = sheet.origin();

    for (row_idx, row) in sheet.rows().iter().enumerate() {
        let row32 = top + row_idx as u32 + 1;
        for (col_idx, cell) in row.cells().iter().enumerate() {
            let col16 = left + col_idx as u16;
            match cell {
                CellValue::Empty => continue,
                CellValue::Text(s) => {
                    worksheet.write_string(row32, col16, s)?;
                }
                CellValue::Number(n) => {
                    worksheet.write_number(row32, col16, *n)?;
                }
                CellValue::Bool(b) => {
                    worksheet.write_boolean(row32, col16, *b)?;
                }
            }
            cells_exported += 1;
        }
    }

    Ok(cells_exported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_from_data() {
        assert_eq!(cell_from_data(&Data::Empty), CellValue::Empty);
        assert_eq!(cell_from_data(&Data::String("  ".into())), CellValue::Empty);
        assert_eq!(cell_from_data(&Data::String("R01".into())), CellValue::Text("R01".into()));
        assert_eq!(cell_from_data(&Data::Float(1.5)), CellValue::Number(1.5));
        assert_eq!(cell_from_data(&Data::Int(7)), CellValue::Number(7.0));
        assert_eq!(cell_from_data(&Data::Bool(true)), CellValue::Bool(true));
        assert_eq!(
            cell_from_data(&Data::Error(calamine::CellErrorType::Div0)),
            CellValue::Empty
        );
    }

    #[test]
    fn test_range_grid_keeps_absolute_columns() {
        // Used range starting at C2
        let mut range: Range<Data> = Range::new((1, 2), (2, 5));
        range.set_value((1, 2), Data::String("Ratio".into()));
        range.set_value((2, 2), Data::String("R01".into()));
        range.set_value((2, 5), Data::Float(2.5));

        let grid = range_grid(&range);
        assert_eq!(grid.height(), 3);
        assert!(grid.cell(0, 0).is_empty());
        assert_eq!(grid.cell(1, 2), &CellValue::Text("Ratio".into()));
        assert_eq!(grid.cell(2, 5), &CellValue::Number(2.5));
    }

    #[test]
    fn test_offset_table_is_written_back_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master.xlsx");

        // Header at B3: one blank row above, column A blank
        let mut workbook = XlsxWorkbook::new();
        let ws = workbook.add_worksheet().set_name("2023").unwrap();
        ws.write_string(2, 1, "CNAE").unwrap();
        ws.write_string(2, 2, "R01_Q1").unwrap();
        ws.write_number(3, 1, 100.0).unwrap();
        ws.write_number(3, 2, 1.5).unwrap();
        workbook.save(&path).unwrap();

        let (store, _) = import_masterfile(&path, "CNAE").unwrap();
        assert_eq!(store.sheet("2023").unwrap().origin(), (2, 1));

        let (buffer, _) = export_to_buffer(&store).unwrap();
        std::fs::write(&path, buffer).unwrap();

        let mut reread = open_workbook_auto(&path).unwrap();
        let range = reread.worksheet_range("2023").unwrap();
        assert_eq!(range.start(), Some((2, 1)));
        assert_eq!(range.get_value((2, 1)), Some(&Data::String("CNAE".into())));
        assert_eq!(range.get_value((3, 2)), Some(&Data::Float(1.5)));
    }

    #[test]
    fn test_export_result_summary() {
        let mut result = ExportResult::default();
        result.sheets_exported = 1;
        result.rows_exported = 10;
        result.cells_exported = 40;
        assert_eq!(result.summary(), "1 sheet, 10 rows, 40 cells");

        result.sheets_exported = 3;
        assert_eq!(result.summary(), "3 sheets, 10 rows, 40 cells");
    }
}
