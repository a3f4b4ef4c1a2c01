use super::args::*;
use sqlmark_core::settings::Settings;
use std::path::Path;

pub mod expected;
pub mod grade;
pub mod validate;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const TEST_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli, settings: Settings) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(args),
        Command::Validate(args) => validate::run(args),
        Command::Expected(args) => expected::run(args, settings).await,
        Command::Grade(args) => grade::run(args, settings).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if args.config.exists() {
        eprintln!("note: {} already exists", args.config.display());
        return Ok(exit_codes::OK);
    }
    ensure_parent_dir(&args.config)?;
    sqlmark_core::config::write_sample_config(&args.config)?;
    eprintln!("created {}", args.config.display());
    Ok(exit_codes::OK)
}

pub(crate) fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// CLI flag first, then the environment.
pub(crate) fn probe_settings(settings: &Settings, flag: Option<u64>) -> Settings {
    let mut s = settings.clone();
    if let Some(ms) = flag {
        s.probe_timeout_ms = ms;
    }
    s
}
