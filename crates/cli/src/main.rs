// ratiobook CLI - load sector ratio exports into the CNAE masterfile

mod exit_codes;
mod inspect;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use ratiobook_config::LoaderConfig;
use ratiobook_io::{MasterfileError, RunError, RunSummary};

use exit_codes::{run_exit_code, EXIT_CONFIG, EXIT_ERROR, EXIT_FILE_ERRORS, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "ratiobook")]
#[command(about = "Consolidate sector financial-ratio exports into the CNAE masterfile")]
#[command(version)]
#[command(subcommand_required = false)]
struct Cli {
    /// Log debug detail (skipped columns, absent values)
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Log warnings and errors only
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load every <year>_<code> file of the input directory into the masterfile
    #[command(after_help = "\
Examples:
  ratiobook run
  ratiobook run --input-dir downloads --masterfile 'CNAE masterfile.xlsx'
  ratiobook run --config loader.toml --jobs 4
  ratiobook run --dry-run --json | jq '.files[] | select(.status != \"processed\")'")]
    Run(RunArgs),

    /// Show the ratio table extracted from one source file
    #[command(after_help = "\
Examples:
  ratiobook extract downloads/2023_0100.xls
  ratiobook extract downloads/2023_0100.xls --json")]
    Extract {
        /// Source file (xls, xlsx, ods, csv, tsv)
        file: PathBuf,

        /// Marker text that precedes the ratio table
        #[arg(long)]
        sentinel: Option<String>,

        /// Extension the filename must carry (default: the file's own)
        #[arg(long)]
        extension: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// TOML config file; flags given here override its values
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding the downloaded source files
    #[arg(long, short = 'i', value_name = "DIR", env = "RATIOBOOK_INPUT_DIR")]
    input_dir: Option<PathBuf>,

    /// Masterfile workbook to update
    #[arg(long, short = 'm', value_name = "FILE", env = "RATIOBOOK_MASTERFILE")]
    masterfile: Option<PathBuf>,

    /// Source file extension, without the dot
    #[arg(long)]
    extension: Option<String>,

    /// Header of the entity-code column in the masterfile
    #[arg(long)]
    key_column: Option<String>,

    /// Marker text that precedes the ratio table
    #[arg(long)]
    sentinel: Option<String>,

    /// Files read in parallel (updates are still applied in filename order)
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Process everything but leave the masterfile untouched
    #[arg(long)]
    dry_run: bool,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,

    /// Exit with code 6 when any file failed
    #[arg(long)]
    strict: bool,
}

impl RunArgs {
    /// Defaults, then the config file, then flags.
    fn resolve(&self) -> Result<LoaderConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => LoaderConfig::load(path).map_err(|e| CliError::config(e.to_string()))?,
            None => LoaderConfig::default(),
        };

        if let Some(dir) = &self.input_dir {
            config.input_dir = dir.clone();
        }
        if let Some(path) = &self.masterfile {
            config.masterfile = path.clone();
        }
        if let Some(ext) = &self.extension {
            config.extension = ext.clone();
        }
        if let Some(key) = &self.key_column {
            config.key_column = key.clone();
        }
        if let Some(sentinel) = &self.sentinel {
            config.sentinel = sentinel.clone();
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if self.dry_run {
            config.dry_run = true;
        }

        config.validate().map_err(|e| CliError::config(e.to_string()))?;
        Ok(config)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = match cli.command {
        None => Err(CliError::args("no command given")
            .with_hint("try 'ratiobook run' or 'ratiobook --help'")),
        Some(Commands::Run(args)) => cmd_run(args),
        Some(Commands::Extract { file, sentinel, extension, json }) => {
            inspect::cmd_extract(file, sentinel, extension, json)
        }
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
/// `log` records from the library crates are bridged into the subscriber.
fn init_logging(verbose: bool, quiet: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    /// Create error from a run-aborting error with the matching exit code.
    pub fn run(err: RunError) -> Self {
        let code = run_exit_code(&err);
        let hint = match &err {
            RunError::InputDir { .. } => {
                Some("pass --input-dir or set input_dir in the config file".to_string())
            }
            RunError::Masterfile(MasterfileError::Layout(_)) => {
                Some("the first row of every masterfile sheet must hold the key column header".to_string())
            }
            RunError::Masterfile(MasterfileError::Persist { .. }) => {
                Some("close the masterfile if it is open in a spreadsheet program, then rerun".to_string())
            }
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let config = args.resolve()?;
    log::debug!("Resolved configuration: {:?}", config);

    let summary = ratiobook_io::run(&config).map_err(CliError::run)?;

    if args.json {
        let out = serde_json::to_string_pretty(&summary).map_err(|e| CliError::io(e.to_string()))?;
        println!("{}", out);
    } else {
        print_summary(&summary, &config);
    }

    if args.strict && summary.errors() > 0 {
        return Err(CliError {
            code: EXIT_FILE_ERRORS,
            message: format!("{} of {} files were not loaded", summary.errors(), summary.total),
            hint: Some("rerun with --json to list each file's status".to_string()),
        });
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, config: &LoaderConfig) {
    println!("{}", summary.summary());
    if summary.persisted {
        println!("saved {}", config.masterfile.display());
    } else if summary.dry_run {
        println!("dry run: {} not written", config.masterfile.display());
    } else {
        println!("no updates: {} not written", config.masterfile.display());
    }
}
