//! CLI Exit Code Registry
//!
//! Single source of truth for `ratiobook` exit codes. Scripts that schedule
//! the loader rely on them.
//!
//! | Code | Meaning                                                   |
//! |------|-----------------------------------------------------------|
//! | 0    | Success                                                   |
//! | 1    | General error (unspecified)                               |
//! | 2    | Usage error (bad args, missing input directory)           |
//! | 3    | Masterfile could not be loaded                            |
//! | 4    | Masterfile could not be saved; the run's updates are lost |
//! | 5    | Configuration error                                       |
//! | 6    | Run completed but some files failed (`--strict` only)     |

use ratiobook_io::{MasterfileError, RunError};

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing input directory.
pub const EXIT_USAGE: u8 = 2;

/// The masterfile exists but could not be opened or read.
pub const EXIT_MASTERFILE_LOAD: u8 = 3;

/// Writing the masterfile failed.
pub const EXIT_PERSIST: u8 = 4;

/// Config file unreadable, unparseable or invalid.
pub const EXIT_CONFIG: u8 = 5;

/// At least one file was rejected, empty or unreadable and `--strict` was set.
pub const EXIT_FILE_ERRORS: u8 = 6;

/// Map a run-aborting error to its exit code.
pub fn run_exit_code(err: &RunError) -> u8 {
    match err {
        RunError::Config(_) | RunError::Classifier(_) => EXIT_CONFIG,
        RunError::InputDir { .. } => EXIT_USAGE,
        RunError::Masterfile(e) => match e {
            MasterfileError::Write { .. } | MasterfileError::Persist { .. } => EXIT_PERSIST,
            MasterfileError::Open { .. }
            | MasterfileError::ReadSheet { .. }
            | MasterfileError::Layout(_) => EXIT_MASTERFILE_LOAD,
        },
    }
}
