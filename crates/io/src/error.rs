use std::fmt;
use std::path::PathBuf;

use ratiobook_config::ConfigError;
use ratiobook_engine::{ClassifyError, StoreError};

/// Failure to turn one source file into a grid.
#[derive(Debug)]
pub enum SourceError {
    /// Extension is neither a workbook nor a delimited-text format.
    UnsupportedExtension { path: PathBuf },
    /// File could not be opened or decoded.
    Open { path: PathBuf, message: String },
    /// Workbook opened but has no sheets.
    NoSheets { path: PathBuf },
    /// Sheet or record could not be read.
    Read { path: PathBuf, message: String },
    /// The reader panicked on a malformed file.
    Panicked { path: PathBuf, message: String },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedExtension { path } => {
                write!(f, "{}: unsupported file type", path.display())
            }
            Self::Open { path, message } => write!(f, "{}: cannot open: {message}", path.display()),
            Self::NoSheets { path } => write!(f, "{}: workbook contains no sheets", path.display()),
            Self::Read { path, message } => write!(f, "{}: cannot read: {message}", path.display()),
            Self::Panicked { path, message } => {
                write!(f, "{}: reader failed unexpectedly: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for SourceError {}

/// Failure to load or persist the masterfile.
#[derive(Debug)]
pub enum MasterfileError {
    /// Masterfile exists but cannot be opened as a workbook.
    Open { path: PathBuf, message: String },
    /// A sheet could not be read.
    ReadSheet { sheet: String, message: String },
    /// A sheet does not have the expected layout.
    Layout(StoreError),
    /// Building the output workbook failed.
    Write { sheet: String, message: String },
    /// Writing the output file failed. In-memory changes are lost.
    Persist { path: PathBuf, message: String },
}

impl fmt::Display for MasterfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open { path, message } => {
                write!(f, "cannot open masterfile '{}': {message}", path.display())
            }
            Self::ReadSheet { sheet, message } => {
                write!(f, "cannot read masterfile sheet '{sheet}': {message}")
            }
            Self::Layout(err) => write!(f, "masterfile layout error: {err}"),
            Self::Write { sheet, message } => {
                write!(f, "cannot write masterfile sheet '{sheet}': {message}")
            }
            Self::Persist { path, message } => {
                write!(f, "cannot save masterfile '{}': {message}", path.display())
            }
        }
    }
}

impl std::error::Error for MasterfileError {}

impl From<StoreError> for MasterfileError {
    fn from(err: StoreError) -> Self {
        Self::Layout(err)
    }
}

/// Failures that abort a whole batch run.
#[derive(Debug)]
pub enum RunError {
    Config(ConfigError),
    Classifier(ClassifyError),
    /// Input directory missing or unreadable.
    InputDir { path: PathBuf, message: String },
    Masterfile(MasterfileError),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Classifier(err) => write!(f, "{err}"),
            Self::InputDir { path, message } => {
                write!(f, "input directory '{}': {message}", path.display())
            }
            Self::Masterfile(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RunError {}

impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

impl From<ClassifyError> for RunError {
    fn from(err: ClassifyError) -> Self {
        Self::Classifier(err)
    }
}

impl From<MasterfileError> for RunError {
    fn from(err: MasterfileError) -> Self {
        Self::Masterfile(err)
    }
}
