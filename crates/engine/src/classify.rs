// Filename classification: `<year>_<code>.<ext>` -> (period, entity code)

use std::fmt;

use regex::Regex;
use serde::Serialize;

/// Extension of the canonical source files
pub const DEFAULT_EXTENSION: &str = "xls";

/// Identifies one source file and the masterfile cell block it feeds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SourceKey {
    period: String,
    entity_code: String,
}

impl SourceKey {
    /// Four-digit year; doubles as the masterfile sheet name.
    pub fn period(&self) -> &str {
        &self.period
    }

    /// Four-digit entity (CNAE) code, leading zeros preserved.
    pub fn entity_code(&self) -> &str {
        &self.entity_code
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.period, self.entity_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// Filename does not follow `NNNN_NNNN.<ext>`.
    Mismatch { filename: String },
    /// The configured extension cannot be part of a filename.
    InvalidExtension(String),
}

impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch { filename } => {
                write!(f, "'{filename}' does not match the expected pattern (YYYY_CCCC.<ext>)")
            }
            Self::InvalidExtension(ext) => write!(f, "invalid source extension: '{ext}'"),
        }
    }
}

impl std::error::Error for ClassifyError {}

/// Matches canonical source filenames for one fixed extension.
#[derive(Debug, Clone)]
pub struct Classifier {
    pattern: Regex,
    extension: String,
}

impl Classifier {
    /// Build a classifier for `extension` (with or without the leading dot).
    pub fn new(extension: &str) -> Result<Self, ClassifyError> {
        let extension = extension.trim_start_matches('.');
        if extension.is_empty() || extension.contains(['/', '\\', '.']) {
            return Err(ClassifyError::InvalidExtension(extension.to_string()));
        }

        // ASCII digits only: `\d` would also accept other Unicode digit classes
        let pattern = Regex::new(&format!(
            r"^([0-9]{{4}})_([0-9]{{4}})\.{}$",
            regex::escape(extension)
        ))
        .map_err(|_| ClassifyError::InvalidExtension(extension.to_string()))?;

        Ok(Self { pattern, extension: extension.to_string() })
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Classify a bare filename (no directory components).
    ///
    /// Anything other than an exact match is rejected; there is no partial
    /// parse of near-miss names.
    pub fn classify(&self, filename: &str) -> Result<SourceKey, ClassifyError> {
        let caps = self.pattern.captures(filename).ok_or_else(|| ClassifyError::Mismatch {
            filename: filename.to_string(),
        })?;

        Ok(SourceKey {
            period: caps[1].to_string(),
            entity_code: caps[2].to_string(),
        })
    }
}
