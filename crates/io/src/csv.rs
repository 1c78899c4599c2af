// Delimited-text source import (CSV/TSV exports of the ratio tables)

use std::io::Read;
use std::path::Path;

use ratiobook_engine::{CellValue, SourceGrid};

use crate::error::SourceError;

pub fn import(path: &Path) -> Result<SourceGrid, SourceError> {
    let content = read_file_as_utf8(path)?;
    let delimiter = sniff_delimiter(&content);
    grid_from_str(&content, delimiter).map_err(|message| SourceError::Read {
        path: path.to_path_buf(),
        message,
    })
}

pub fn import_tsv(path: &Path) -> Result<SourceGrid, SourceError> {
    let content = read_file_as_utf8(path)?;
    grid_from_str(&content, b'\t').map_err(|message| SourceError::Read {
        path: path.to_path_buf(),
        message,
    })
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Ratio exports start with single-field title lines, so score every
        // line that splits at all rather than requiring line 1 to split
        let widest = counts.iter().copied().max().unwrap_or(1);
        if widest <= 1 {
            continue;
        }
        let consistent = counts.iter().filter(|&&c| c == widest).count() as u64;
        let score = consistent * widest as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, SourceError> {
    let open_err = |e: std::io::Error| SourceError::Open {
        path: path.to_path_buf(),
        message: e.to_string(),
    };
    let mut file = std::fs::File::open(path).map_err(open_err)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(open_err)?;

    // Try UTF-8 first; on failure, recover the buffer from the error
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            // Spanish exports are commonly Windows-1252
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

fn grid_from_str(content: &str, delimiter: u8) -> Result<SourceGrid, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.trim_start_matches('\u{feff}').as_bytes());

    // Semicolon exports come from Spanish locales, which write 1,5 for 1.5
    let decimal_comma = delimiter == b';';

    let mut grid = SourceGrid::default();
    for result in reader.records() {
        let record = result.map_err(|e| e.to_string())?;
        grid.push_row(record.iter().map(|field| cell_from_field(field, decimal_comma)).collect());
    }
    Ok(grid)
}

fn cell_from_field(field: &str, decimal_comma: bool) -> CellValue {
    if decimal_comma {
        let trimmed = field.trim();
        if !trimmed.contains('.') && trimmed.matches(',').count() == 1 {
            if let Ok(n) = trimmed.replacen(',', ".", 1).parse::<f64>() {
                if n.is_finite() {
                    return CellValue::Number(n);
                }
            }
        }
    }
    CellValue::from_input(field)
}
