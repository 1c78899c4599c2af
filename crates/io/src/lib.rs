// File I/O: source exports, masterfile load/persist, batch driver

pub mod batch;
pub mod csv;
pub mod error;
pub mod masterfile;
pub mod source;
pub mod xlsx;

pub use batch::{list_candidates, load_directory, run, FileOutcome, FileStatus, RunSummary};
pub use error::{MasterfileError, RunError, SourceError};
pub use masterfile::{save_store, Consolidator};
pub use source::{extract_file, read_grid, SourceFormat};
pub use xlsx::{ExportResult, SheetStats};
