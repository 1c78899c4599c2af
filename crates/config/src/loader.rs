// Loader run configuration
// Read from a TOML file; every key is optional.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    /// Config file could not be read.
    Read { path: PathBuf, message: String },
    /// TOML parse / deserialization error.
    Parse(String),
    /// A value is out of range or empty.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { path, message } => {
                write!(f, "cannot read config '{}': {message}", path.display())
            }
            Self::Parse(msg) => write!(f, "config parse error: {msg}"),
            Self::Validation(msg) => write!(f, "config validation error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Everything a loader run needs to know
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    /// Directory scanned for `<year>_<code>.<ext>` files
    pub input_dir: PathBuf,

    /// Target workbook
    pub masterfile: PathBuf,

    /// Source file extension, without the dot
    pub extension: String,

    /// Header of the entity-code column in every masterfile sheet
    pub key_column: String,

    /// First-column marker that precedes the ratio table in source files
    pub sentinel: String,

    /// Extraction threads; 1 reads files strictly one after another
    pub jobs: usize,

    /// Do everything except writing the masterfile
    pub dry_run: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("downloads"),
            masterfile: PathBuf::from("CNAE masterfile.xlsx"),
            extension: "xls".to_string(),
            key_column: "CNAE".to_string(),
            sentinel: "Ratio".to_string(),
            jobs: 1,
            dry_run: false,
        }
    }
}

impl LoaderConfig {
    /// Defaults with the two paths a run always needs.
    pub fn with_paths(input_dir: impl Into<PathBuf>, masterfile: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            masterfile: masterfile.into(),
            ..Self::default()
        }
    }

    pub fn from_toml(input: &str) -> Result<Self, ConfigError> {
        let config: LoaderConfig =
            toml::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. Relative paths inside the file are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let mut config = Self::from_toml(&content)?;

        if let Some(base) = path.parent() {
            config.input_dir = resolve(base, &config.input_dir);
            config.masterfile = resolve(base, &config.masterfile);
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let extension = self.extension.trim_start_matches('.');
        if extension.is_empty() {
            return Err(ConfigError::Validation("extension must not be empty".into()));
        }
        if extension.contains(['/', '\\', '.']) {
            return Err(ConfigError::Validation(format!(
                "extension must be a single suffix, got '{}'",
                self.extension
            )));
        }
        if self.key_column.trim().is_empty() {
            return Err(ConfigError::Validation("key_column must not be empty".into()));
        }
        if self.sentinel.trim().is_empty() {
            return Err(ConfigError::Validation("sentinel must not be empty".into()));
        }
        if self.jobs == 0 {
            return Err(ConfigError::Validation("jobs must be at least 1".into()));
        }
        Ok(())
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() || base.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
