// Batch driver: classify -> extract -> upsert for every file, then persist once
//
// Per-file failures become counters and log lines. Only loading the
// masterfile and persisting it can abort a run.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use ratiobook_config::LoaderConfig;
use ratiobook_engine::{ClassifyError, Classifier, Extraction, Extractor, SourceKey, UpsertOutcome};

use crate::error::{RunError, SourceError};
use crate::masterfile::Consolidator;
use crate::source;

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileStatus {
    Processed {
        period: String,
        entity_code: String,
        written: usize,
        skipped_absent: usize,
        unknown_columns: usize,
        row_created: bool,
        sheet_created: bool,
    },
    /// Filename does not follow the naming contract
    Rejected { reason: String },
    /// Readable, but no ratio rows were found
    Empty { sentinel_found: bool },
    ReadError { message: String },
    UpsertError { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileOutcome {
    pub file: String,
    #[serde(flatten)]
    pub status: FileStatus,
}

/// Counters and per-file outcomes of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub processed: usize,
    pub rejected: usize,
    pub empty: usize,
    pub read_errors: usize,
    pub upsert_errors: usize,
    pub fields_written: usize,
    pub persisted: bool,
    pub dry_run: bool,
    pub files: Vec<FileOutcome>,
}

impl RunSummary {
    fn record(&mut self, file: String, status: FileStatus) {
        self.total += 1;
        match &status {
            FileStatus::Processed { written, .. } => {
                self.processed += 1;
                self.fields_written += written;
            }
            FileStatus::Rejected { .. } => self.rejected += 1,
            FileStatus::Empty { .. } => self.empty += 1,
            FileStatus::ReadError { .. } => self.read_errors += 1,
            FileStatus::UpsertError { .. } => self.upsert_errors += 1,
        }
        self.files.push(FileOutcome { file, status });
    }

    /// Files that did not reach the masterfile, for any reason.
    pub fn errors(&self) -> usize {
        self.rejected + self.empty + self.read_errors + self.upsert_errors
    }

    /// Returns a summary message suitable for display
    pub fn summary(&self) -> String {
        format!(
            "{} processed, {} with errors, {} total",
            self.processed,
            self.errors(),
            self.total
        )
    }

    /// Emit the end-of-run block.
    pub fn log(&self) {
        let rule = "=".repeat(60);
        log::info!("{}", rule);
        log::info!("Processing complete:");
        log::info!("  - Files processed successfully: {}", self.processed);
        log::info!("  - Files with errors: {}", self.errors());
        log::info!("      rejected names: {}", self.rejected);
        log::info!("      no ratio data: {}", self.empty);
        log::info!("      read errors: {}", self.read_errors);
        log::info!("      update errors: {}", self.upsert_errors);
        log::info!("  - Values written: {}", self.fields_written);
        log::info!("  - Total files: {}", self.total);
        log::info!("{}", rule);
    }
}

/// Files in `dir` with extension `ext`, sorted by filename.
pub fn list_candidates(dir: &Path, ext: &str) -> Result<Vec<PathBuf>, RunError> {
    let dir_err = |message: String| RunError::InputDir { path: dir.to_path_buf(), message };

    if !dir.is_dir() {
        return Err(dir_err("not found or not a directory".into()));
    }
    let dir_str = dir.to_str().ok_or_else(|| dir_err("path is not valid UTF-8".into()))?;
    let pattern = format!("{}/*.{}", glob::Pattern::escape(dir_str), glob::Pattern::escape(ext));

    let mut files: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| dir_err(e.to_string()))?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

struct Candidate {
    path: PathBuf,
    name: String,
    key: Result<SourceKey, ClassifyError>,
}

/// Extract every classified candidate, in candidate order.
///
/// With `jobs > 1` files are read on a rayon pool; results still come back
/// in filename order so applying them stays deterministic.
fn extract_candidates(
    candidates: &[Candidate],
    extractor: &Extractor,
    jobs: usize,
) -> Vec<Option<Result<Extraction, SourceError>>> {
    let extract_one = |c: &Candidate| {
        c.key.as_ref().ok().map(|_| source::extract_file(&c.path, extractor))
    };

    if jobs <= 1 {
        return candidates.iter().map(extract_one).collect();
    }

    match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
        Ok(pool) => pool.install(|| candidates.par_iter().map(extract_one).collect()),
        Err(e) => {
            log::warn!("Cannot start {} extraction threads ({}); reading sequentially", jobs, e);
            candidates.iter().map(extract_one).collect()
        }
    }
}

/// Run a full load as described by `config`.
pub fn run(config: &LoaderConfig) -> Result<RunSummary, RunError> {
    config.validate()?;
    let classifier = Classifier::new(&config.extension)?;
    let extractor = Extractor::new(config.sentinel.as_str());

    let mut summary = RunSummary { dry_run: config.dry_run, ..Default::default() };

    let files = list_candidates(&config.input_dir, classifier.extension())?;
    log::info!(
        "Found {} .{} files in {}",
        files.len(),
        classifier.extension(),
        config.input_dir.display()
    );
    if files.is_empty() {
        log::warn!("No files to process");
        summary.log();
        return Ok(summary);
    }

    let mut consolidator = Consolidator::open(&config.masterfile, &config.key_column)?;

    let candidates: Vec<Candidate> = files
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let key = classifier.classify(&name);
            Candidate { path, name, key }
        })
        .collect();

    let extractions = extract_candidates(&candidates, &extractor, config.jobs);

    for (candidate, extraction) in candidates.into_iter().zip(extractions) {
        let status = apply(&mut consolidator, &candidate, extraction);
        summary.record(candidate.name, status);
    }

    if config.dry_run {
        log::info!("Dry run: masterfile not written");
    } else {
        summary.persisted = consolidator.persist()?.is_some();
    }

    summary.log();
    Ok(summary)
}

fn apply(
    consolidator: &mut Consolidator,
    candidate: &Candidate,
    extraction: Option<Result<Extraction, SourceError>>,
) -> FileStatus {
    let key = match &candidate.key {
        Ok(key) => key,
        Err(e) => {
            log::warn!("{}", e);
            return FileStatus::Rejected { reason: e.to_string() };
        }
    };

    log::info!(
        "Processing {} -> year {}, code {}",
        candidate.name,
        key.period(),
        key.entity_code()
    );

    let extraction = match extraction {
        Some(Ok(extraction)) => extraction,
        Some(Err(e)) => {
            log::error!("Error reading {}: {}", candidate.name, e);
            return FileStatus::ReadError { message: e.to_string() };
        }
        None => {
            return FileStatus::ReadError { message: "file was not read".to_string() };
        }
    };

    if extraction.is_empty() {
        if extraction.found_sentinel() {
            log::warn!("No ratios extracted from {}", candidate.name);
        } else {
            log::warn!("Ratio section not found in {}", candidate.name);
        }
        return FileStatus::Empty { sentinel_found: extraction.found_sentinel() };
    }

    match consolidator.upsert(key.period(), key.entity_code(), &extraction.record) {
        Ok(outcome) if outcome.written == 0 => {
            log::warn!(
                "No values written from {}: {} absent, {} columns not in the masterfile",
                candidate.name,
                outcome.skipped_absent,
                outcome.unknown_columns.len()
            );
            processed(key.period(), key.entity_code(), outcome)
        }
        Ok(outcome) => processed(key.period(), key.entity_code(), outcome),
        Err(e) => {
            log::error!("Cannot update masterfile from {}: {}", candidate.name, e);
            FileStatus::UpsertError { message: e.to_string() }
        }
    }
}

fn processed(period: &str, entity_code: &str, outcome: UpsertOutcome) -> FileStatus {
    FileStatus::Processed {
        period: period.to_string(),
        entity_code: entity_code.to_string(),
        written: outcome.written,
        skipped_absent: outcome.skipped_absent,
        unknown_columns: outcome.unknown_columns.len(),
        row_created: outcome.row_created,
        sheet_created: outcome.sheet_created,
    }
}

/// Load every `<year>_<code>.xls` file in `input_dir` into `masterfile` with
/// default settings.
pub fn load_directory(input_dir: &Path, masterfile: &Path) -> Result<RunSummary, RunError> {
    run(&LoaderConfig::with_paths(input_dir, masterfile))
}
