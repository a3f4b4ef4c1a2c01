use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sqlmark",
    version,
    about = "Grades SQL stored routines and query scripts against an authored assignment"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,

    /// emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample assignment file
    Init(InitArgs),
    /// Load an assignment and report what it grades
    Validate(ValidateArgs),
    /// Compute expectations from the author's reference database
    Expected(ExpectedArgs),
    /// Grade a directory of submissions
    Grade(GradeArgs),
    Version,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "assignment.yaml")]
    pub config: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(long, default_value = "assignment.yaml")]
    pub config: PathBuf,

    /// reject unknown keys instead of warning
    #[arg(long)]
    pub strict: bool,

    #[arg(long, default_value = "text")]
    pub format: String, // text|json
}

#[derive(clap::Args, Debug, Clone)]
pub struct ExpectedArgs {
    #[arg(long, default_value = "assignment.yaml")]
    pub config: PathBuf,

    /// author database url (overrides SQLMARK_AUTHOR_DATABASE_URL)
    #[arg(long)]
    pub author_db: Option<String>,

    /// where to write the resolved assignment; defaults to --config
    #[arg(long)]
    pub out: Option<PathBuf>,

    #[arg(long)]
    pub probe_timeout_ms: Option<u64>,

    #[arg(long)]
    pub strict: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct GradeArgs {
    #[arg(long, default_value = "assignment.yaml")]
    pub config: PathBuf,

    /// one directory per candidate
    #[arg(long)]
    pub submissions: PathBuf,

    /// grading database url (overrides SQLMARK_DATABASE_URL)
    #[arg(long)]
    pub db: Option<String>,

    /// apply author.setup to the grading database first
    #[arg(long)]
    pub apply_setup: bool,

    #[arg(long)]
    pub probe_timeout_ms: Option<u64>,

    /// sqlite file recording runs and candidate reports
    #[arg(long)]
    pub store: Option<PathBuf>,

    #[arg(long)]
    pub json: Option<PathBuf>,

    #[arg(long)]
    pub junit: Option<PathBuf>,

    /// CSV marks sheet
    #[arg(long)]
    pub marks: Option<PathBuf>,

    /// indented execution log (appended)
    #[arg(long)]
    pub log: Option<PathBuf>,

    #[arg(long)]
    pub strict: bool,
}
