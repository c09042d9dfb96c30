//! covdelta compares per-file test coverage of the current branch against a
//! base branch and fails the build when any compared file lost coverage.
//!
//! The CLI consumes results documents that a test runner already wrote and an
//! optional changed-path list, and writes a JSON report.

use clap::{Args, Parser, Subcommand, ValueEnum};
use covdelta_adapters_changes::parse_changed_paths;
use covdelta_adapters_results::load_results_file;
use covdelta_app::{AppError, CompareRequest, change_options, compare};
use covdelta_config::{CliOverrides, FailOn, discover_config, load_config, resolve_config};
use covdelta_types::{UnitKind, explain};
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// covdelta compares per-file test coverage of the current branch against a base branch.
#[derive(Parser)]
#[command(name = "covdelta")]
#[command(
    about = "covdelta compares per-file test coverage of the current branch against a base branch and fails the build on regression."
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// CLI coverage unit option
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliUnit {
    Statements,
    Branches,
    Functions,
    Lines,
}

impl From<CliUnit> for UnitKind {
    fn from(unit: CliUnit) -> Self {
        match unit {
            CliUnit::Statements => UnitKind::Statements,
            CliUnit::Branches => UnitKind::Branches,
            CliUnit::Functions => UnitKind::Functions,
            CliUnit::Lines => UnitKind::Lines,
        }
    }
}

/// CLI fail-on option
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFailOn {
    Regression,
    Never,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare current coverage against the base branch
    Compare(CompareArgs),
    /// Explain a report code
    Explain {
        /// Code to explain
        code: String,
    },
}

#[derive(Debug, Args)]
struct CompareArgs {
    /// Results document of the current branch run
    #[arg(long)]
    current: String,

    /// Results document of the base branch run
    #[arg(long)]
    base: Option<String>,

    /// Changed-path list, one path per line ("-" reads stdin)
    #[arg(long)]
    changed_files: Option<String>,

    /// Name of the current branch, for the report
    #[arg(long, default_value = "HEAD")]
    current_branch: String,

    /// Name of the base branch, for the report
    #[arg(long)]
    base_branch: Option<String>,

    /// Coverage unit to compare (overrides config file)
    #[arg(long, value_enum)]
    unit: Option<CliUnit>,

    /// When to fail the build (overrides config file)
    #[arg(long, value_enum)]
    fail_on: Option<CliFailOn>,

    /// Output path for report JSON
    #[arg(long, default_value = "artifacts/covdelta/report.json")]
    out: String,

    /// Print GitHub workflow annotations to stdout
    #[arg(long)]
    annotations: bool,

    /// Path to config file (default: auto-discover covdelta.toml)
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// Working directory of the current run (default: current directory)
    #[arg(long)]
    cwd: Option<String>,

    /// Working directory of the base run, when it ran in another checkout
    /// (default: --cwd)
    #[arg(long)]
    base_cwd: Option<String>,

    /// Prefix to strip from reported paths (repeatable)
    #[arg(long)]
    path_strip: Vec<String>,

    /// Compare every covered file even when a changed-path list is given
    #[arg(long)]
    no_changes_only: bool,
}

/// CLI errors
#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to load config: {0}")]
    ConfigLoad(String),

    #[error("{0}")]
    App(#[from] AppError),
}

/// Exit codes:
/// - 0: improved, unchanged, skipped
/// - 1: tool/runtime error (I/O, invalid config)
/// - 2: coverage regressed
const EXIT_CODE_ERROR: i32 = 1;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {}", e);
            EXIT_CODE_ERROR
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Commands::Compare(args) => run_compare(args),
        Commands::Explain { code } => run_explain(&code),
    }
}

fn run_compare(args: CompareArgs) -> Result<i32, CliError> {
    let loaded_config = match &args.config {
        Some(path) => {
            Some(load_config(Path::new(path)).map_err(|e| CliError::ConfigLoad(e.to_string()))?)
        }
        None => discover_config()
            .map_err(|e| CliError::ConfigLoad(e.to_string()))?
            .map(|(path, config)| {
                log::info!("using config {}", path.display());
                config
            }),
    };

    let cli_overrides = CliOverrides {
        unit: args.unit.map(UnitKind::from),
        fail_on: args.fail_on.map(|f| match f {
            CliFailOn::Regression => FailOn::Regression,
            CliFailOn::Never => FailOn::Never,
        }),
        changes_only: args.no_changes_only.then_some(false),
        path_strip: if args.path_strip.is_empty() {
            None
        } else {
            Some(args.path_strip.clone())
        },
    };
    let effective = resolve_config(loaded_config.as_ref(), &cli_overrides);

    let cwd = resolve_cwd(args.cwd.as_deref());

    let changes = match args.changed_files.as_deref() {
        Some(source) => {
            let text = read_changed_files(source)?;
            Some(parse_changed_paths(&text, &change_options(&effective, &cwd)))
        }
        None => None,
    };

    let request = CompareRequest {
        current: load_results_file(Path::new(&args.current)),
        base: args.base.as_deref().map(|p| load_results_file(Path::new(p))),
        changes,
        current_branch: args.current_branch.clone(),
        base_branch: args.base_branch.clone(),
        cwd,
        base_cwd: args.base_cwd.clone(),
        ..Default::default()
    }
    .with_config(&effective);

    let result = compare(request)?;

    ensure_parent_dir(&args.out)?;
    let report_json = serde_json::to_string_pretty(&result.report)?;
    fs::write(&args.out, &report_json).map_err(|e| CliError::FileWrite {
        path: args.out.clone(),
        source: e,
    })?;

    println!("{}", result.summary);
    if args.annotations && !result.annotations.is_empty() {
        print!("{}", result.annotations);
    }

    Ok(result.exit_code)
}

fn run_explain(code: &str) -> Result<i32, CliError> {
    if let Some(info) = explain(code) {
        println!("Code: {}", info.code);
        println!("Name: {}", info.name);
        println!("Summary: {}", info.short_description);
        println!("Meaning: {}", info.full_description);
        println!("Remediation: {}", info.remediation);
        Ok(0)
    } else {
        eprintln!("Unknown code: {code}");
        Ok(1)
    }
}

fn resolve_cwd(cwd: Option<&str>) -> String {
    let path = match cwd {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    path.display().to_string()
}

fn read_changed_files(source: &str) -> Result<String, CliError> {
    if source == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| CliError::FileRead {
                path: "stdin".to_string(),
                source: e,
            })?;
        return Ok(buf);
    }
    fs::read_to_string(source).map_err(|e| CliError::FileRead {
        path: source.to_string(),
        source: e,
    })
}

/// Ensure the parent directory of a path exists
fn ensure_parent_dir(path: &str) -> Result<(), CliError> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| CliError::DirCreate {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}
