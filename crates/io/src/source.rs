// Source file reading: any supported format -> SourceGrid -> Extraction

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use ratiobook_engine::{Extraction, Extractor, SourceGrid};

use crate::error::SourceError;

/// Input formats a source file can come in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// xls, xlsx, xlsm, xlsb, ods
    Workbook,
    Csv,
    Tsv,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xls" | "xlsx" | "xlsm" | "xlsb" | "ods" => Some(Self::Workbook),
            "csv" | "txt" => Some(Self::Csv),
            "tsv" | "tab" => Some(Self::Tsv),
            _ => None,
        }
    }
}

/// Read a source file into a positioned grid (first sheet for workbooks).
pub fn read_grid(path: &Path) -> Result<SourceGrid, SourceError> {
    let format = SourceFormat::from_path(path).ok_or_else(|| SourceError::UnsupportedExtension {
        path: path.to_path_buf(),
    })?;

    match format {
        SourceFormat::Workbook => crate::xlsx::import_grid(path),
        SourceFormat::Csv => crate::csv::import(path),
        SourceFormat::Tsv => crate::csv::import_tsv(path),
    }
}

/// Read and extract one source file.
///
/// Reader panics on malformed files are caught and reported as errors so a
/// single bad file cannot take down a batch.
pub fn extract_file(path: &Path, extractor: &Extractor) -> Result<Extraction, SourceError> {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| read_grid(path)));
    let grid = match outcome {
        Ok(grid) => grid?,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            return Err(SourceError::Panicked { path: path.to_path_buf(), message });
        }
    };
    Ok(extractor.extract(&grid))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(SourceFormat::from_path(Path::new("2023_0100.xls")), Some(SourceFormat::Workbook));
        assert_eq!(SourceFormat::from_path(Path::new("2023_0100.XLSX")), Some(SourceFormat::Workbook));
        assert_eq!(SourceFormat::from_path(Path::new("a/2023_0100.csv")), Some(SourceFormat::Csv));
        assert_eq!(SourceFormat::from_path(Path::new("2023_0100.tsv")), Some(SourceFormat::Tsv));
        assert_eq!(SourceFormat::from_path(Path::new("2023_0100.pdf")), None);
        assert_eq!(SourceFormat::from_path(Path::new("2023_0100")), None);
    }

    #[test]
    fn test_unsupported_extension() {
        let err = read_grid(Path::new("2023_0100.pdf")).unwrap_err();
        assert!(matches!(err, SourceError::UnsupportedExtension { .. }));
    }

    #[test]
    fn test_missing_file_is_open_error() {
        let err = extract_file(Path::new("/nonexistent/2023_0100.csv"), &Extractor::default()).unwrap_err();
        assert!(matches!(err, SourceError::Open { .. }));
    }

    #[test]
    fn test_garbage_workbook_is_error_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2023_0100.xls");
        std::fs::write(&path, b"this is not a workbook").unwrap();
        assert!(extract_file(&path, &Extractor::default()).is_err());
    }

    #[test]
    fn test_extract_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("2023_0100.csv");
        std::fs::write(
            &path,
            "Ratios sectoriales\n\nRatio,Nombre,Empresas,Q1,Q2,Q3\nR01,Liquidez,120,1.5,2.5,3.5\nNota,,,,,\nR02,Endeudamiento,120,,4.0,\n",
        )
        .unwrap();

        let extraction = extract_file(&path, &Extractor::default()).unwrap();
        assert_eq!(extraction.record.len(), 2);
        assert_eq!(extraction.record.get("R01").and_then(|v| v.q2), Some(2.5));
        assert_eq!(extraction.record.get("R02").and_then(|v| v.q1), None);
        assert_eq!(extraction.record.get("R02").and_then(|v| v.q2), Some(4.0));
    }
}
