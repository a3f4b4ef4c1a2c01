use super::{ensure_parent_dir, exit_codes, probe_settings};
use crate::cli::args::ExpectedArgs;
use anyhow::Context;
use sqlmark_core::config::{load_config, save_assignment};
use sqlmark_core::db::{self, redact_url};
use sqlmark_core::engine::author::build_expectations;
use sqlmark_core::settings::Settings;

pub async fn run(args: ExpectedArgs, settings: Settings) -> anyhow::Result<i32> {
    let cfg = match load_config(&args.config, args.strict) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let Some(url) = args
        .author_db
        .clone()
        .or_else(|| settings.author_url().map(str::to_string))
    else {
        eprintln!("config error: no author database (use --author-db or SQLMARK_AUTHOR_DATABASE_URL)");
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let runner = probe_settings(&settings, args.probe_timeout_ms).probe_runner();

    tracing::info!(assignment = %cfg.assignment, db = %redact_url(&url), "building expectations");
    let built = tokio::task::spawn_blocking(move || {
        let mut session = db::connect(&url)?;
        build_expectations(session.as_mut(), &cfg, runner)
    })
    .await
    .context("expectation builder panicked")?;

    let built = match built {
        Ok(b) => b,
        Err(e) => {
            // a broken reference is an authoring problem
            eprintln!("error: {:#}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let out = args.out.unwrap_or(args.config);
    ensure_parent_dir(&out)?;
    save_assignment(&built.assignment, &out)?;

    for w in &built.warnings {
        eprintln!("WARN: {}", w);
    }
    eprintln!(
        "wrote {} ({} warning(s))",
        out.display(),
        built.warnings.len()
    );
    Ok(exit_codes::OK)
}
