// Masterfile consolidation: load once, upsert per file, persist once

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use ratiobook_engine::{MasterStore, RatioRecord, StoreError, UpsertOutcome};

use crate::error::MasterfileError;
use crate::xlsx::{self, ExportResult};

/// Owns the in-memory masterfile for the duration of one run.
///
/// `persist` consumes the consolidator, so the store is written at most once.
#[derive(Debug)]
pub struct Consolidator {
    path: PathBuf,
    store: MasterStore,
    existed: bool,
    applied: usize,
}

impl Consolidator {
    /// Load an existing masterfile. Any failure to open or read it is an error.
    pub fn load(path: &Path, key_column: &str) -> Result<Self, MasterfileError> {
        let (store, _) = xlsx::import_masterfile(path, key_column)?;
        Ok(Self { path: path.to_path_buf(), store, existed: true, applied: 0 })
    }

    /// Load the masterfile if it exists, otherwise start from an empty store.
    ///
    /// An empty store has no template sheet, so upserts into it fail until a
    /// sheet exists; that is reported per file, not here.
    pub fn open(path: &Path, key_column: &str) -> Result<Self, MasterfileError> {
        if path.exists() {
            return Self::load(path, key_column);
        }
        log::warn!("Masterfile '{}' does not exist; starting empty", path.display());
        Ok(Self::empty(path))
    }

    /// Start from an empty store targeting `path`.
    pub fn empty(path: &Path) -> Self {
        Self { path: path.to_path_buf(), store: MasterStore::new(), existed: false, applied: 0 }
    }

    /// Wrap an already-built store.
    pub fn from_store(path: &Path, store: MasterStore) -> Self {
        Self { path: path.to_path_buf(), store, existed: path.exists(), applied: 0 }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn store(&self) -> &MasterStore {
        &self.store
    }

    /// Whether the target existed when the consolidator was created.
    pub fn existed(&self) -> bool {
        self.existed
    }

    /// Successful upserts so far.
    pub fn applied(&self) -> usize {
        self.applied
    }

    pub fn upsert(
        &mut self,
        period: &str,
        entity_code: &str,
        record: &RatioRecord,
    ) -> Result<UpsertOutcome, StoreError> {
        let outcome = self.store.upsert(period, entity_code, record)?;
        self.applied += 1;
        log::info!(
            "Updated {} values for code {} in year {}",
            outcome.written,
            entity_code,
            period
        );
        Ok(outcome)
    }

    /// Sort every sheet and write the whole workbook.
    ///
    /// Returns `None` without touching the file when no upsert succeeded, so
    /// an unchanged or empty store never clobbers the target.
    pub fn persist(mut self) -> Result<Option<ExportResult>, MasterfileError> {
        if self.applied == 0 {
            log::info!("No updates applied; '{}' left untouched", self.path.display());
            return Ok(None);
        }

        self.store.sort_for_persist();
        let result = save_store(&self.store, &self.path)?;
        log::info!("Masterfile saved to {} ({})", self.path.display(), result.summary());
        Ok(Some(result))
    }
}

/// Write `store` to `path` via a temporary file in the same directory that
/// is renamed over the target once complete.
pub fn save_store(store: &MasterStore, path: &Path) -> Result<ExportResult, MasterfileError> {
    let (buffer, result) = xlsx::export_to_buffer(store)?;

    let persist_err = |message: String| MasterfileError::Persist {
        path: path.to_path_buf(),
        message,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| persist_err(e.to_string()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".ratiobook-")
        .suffix(".xlsx")
        .tempfile_in(&dir)
        .map_err(|e| persist_err(e.to_string()))?;
    tmp.write_all(&buffer).map_err(|e| persist_err(e.to_string()))?;
    // The temp file is created private; keep the target's permissions
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file()
            .set_permissions(meta.permissions())
            .map_err(|e| persist_err(e.to_string()))?;
    }
    tmp.as_file().sync_all().map_err(|e| persist_err(e.to_string()))?;
    tmp.persist(path).map_err(|e| persist_err(e.error.to_string()))?;

    Ok(result)
}
