// `ratiobook extract <file>`: classify and extract one source file, print the result

use std::io::{self, Write};
use std::path::PathBuf;

use serde::Serialize;

use ratiobook_engine::classify::DEFAULT_EXTENSION;
use ratiobook_engine::{Classifier, Extraction, Extractor, Quartile, RatioRecord, SourceKey};

use crate::CliError;

#[derive(Serialize)]
struct ExtractReport<'a> {
    file: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a SourceKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rejected: Option<String>,
    /// 1-based, as shown by spreadsheet programs
    sentinel_row: Option<usize>,
    rows_scanned: usize,
    rows_skipped: usize,
    absent_fields: usize,
    ratios: &'a RatioRecord,
}

pub fn cmd_extract(
    file: PathBuf,
    sentinel: Option<String>,
    extension: Option<String>,
    json: bool,
) -> Result<(), CliError> {
    let extension = extension
        .or_else(|| file.extension().and_then(|e| e.to_str()).map(str::to_string))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    let classifier = Classifier::new(&extension).map_err(|e| CliError::args(e.to_string()))?;

    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| CliError::args(format!("'{}' is not a file path", file.display())))?;

    // A rejected name is reported, not fatal: the point is to see the table
    let key = classifier.classify(&name);
    if let Err(e) = &key {
        log::warn!("{}", e);
    }

    let extractor = sentinel.map(Extractor::new).unwrap_or_default();
    let extraction = ratiobook_io::extract_file(&file, &extractor).map_err(|e| CliError::io(e.to_string()))?;

    let report = ExtractReport {
        file: &name,
        key: key.as_ref().ok(),
        rejected: key.as_ref().err().map(|e| e.to_string()),
        sentinel_row: extraction.sentinel_row.map(|r| r + 1),
        rows_scanned: extraction.rows_scanned,
        rows_skipped: extraction.rows_skipped,
        absent_fields: extraction.absent_fields,
        ratios: &extraction.record,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        let text = serde_json::to_string_pretty(&report).map_err(|e| CliError::io(e.to_string()))?;
        writeln!(out, "{}", text).map_err(|e| CliError::io(e.to_string()))?;
    } else {
        write_table(&mut out, &report, &extraction, extractor.sentinel())
            .map_err(|e| CliError::io(e.to_string()))?;
    }
    Ok(())
}

fn write_table(
    out: &mut impl Write,
    report: &ExtractReport<'_>,
    extraction: &Extraction,
    sentinel: &str,
) -> io::Result<()> {
    writeln!(out, "file:      {}", report.file)?;
    match (&report.key, &report.rejected) {
        (Some(key), _) => writeln!(out, "key:       year {}, code {}", key.period(), key.entity_code())?,
        (None, Some(reason)) => writeln!(out, "rejected:  {}", reason)?,
        (None, None) => {}
    }
    match report.sentinel_row {
        Some(row) => writeln!(out, "sentinel:  '{}' at row {}", sentinel, row)?,
        None => writeln!(out, "sentinel:  '{}' not found", sentinel)?,
    }
    writeln!(
        out,
        "ratios:    {} ({} absent values, {} note rows skipped)",
        extraction.record.len(),
        report.absent_fields,
        report.rows_skipped
    )?;

    if extraction.record.is_empty() {
        return Ok(());
    }

    writeln!(out)?;
    write!(out, "{:<8}", "ratio")?;
    for q in Quartile::ALL {
        write!(out, "{:>12}", q.label())?;
    }
    writeln!(out)?;

    for (code, values) in extraction.record.iter() {
        write!(out, "{:<8}", code)?;
        for (_, value) in values.iter() {
            write!(out, "{:>12}", format_value(value))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => "-".to_string(),
    }
}
