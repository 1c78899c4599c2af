//! `ratiobook-engine`: consolidation engine for sector ratio exports.
//!
//! Pure engine crate: classifies filenames, extracts ratio tables from
//! already-read grids and applies them to an in-memory masterfile.
//! No file I/O.

pub mod cell;
pub mod classify;
pub mod extract;
pub mod record;
pub mod store;

pub use cell::CellValue;
pub use classify::{ClassifyError, Classifier, SourceKey};
pub use extract::{extract_ratios, Extraction, Extractor, SourceGrid};
pub use record::{Quartile, QuartileValues, RatioRecord};
pub use store::{MasterStore, Sheet, StoreError, UpsertOutcome};
