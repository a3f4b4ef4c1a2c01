use super::{ensure_parent_dir, exit_codes, probe_settings};
use crate::cli::args::GradeArgs;
use anyhow::Context;
use sqlmark_core::batch::{apply_setup, BatchRunner, DirectorySubmissions, ReportSink, StoreSink};
use sqlmark_core::config::{load_config, require_expectations};
use sqlmark_core::db::{self, redact_url};
use sqlmark_core::model::Assignment;
use sqlmark_core::probe::ProbeRunner;
use sqlmark_core::report::{console, json, junit, log, marks, RunSummary};
use sqlmark_core::settings::Settings;
use sqlmark_core::storage::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub async fn run(args: GradeArgs, settings: Settings) -> anyhow::Result<i32> {
    let cfg = match load_config(&args.config, args.strict) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    if let Err(e) = require_expectations(&cfg) {
        eprintln!("{}", e);
        return Ok(exit_codes::CONFIG_ERROR);
    }
    if !args.submissions.is_dir() {
        eprintln!(
            "config error: submissions directory {} does not exist",
            args.submissions.display()
        );
        return Ok(exit_codes::CONFIG_ERROR);
    }
    let Some(url) = args.db.clone().or_else(|| settings.database_url.clone()) else {
        eprintln!("config error: no grading database (use --db or SQLMARK_DATABASE_URL)");
        return Ok(exit_codes::CONFIG_ERROR);
    };
    let runner = probe_settings(&settings, args.probe_timeout_ms).probe_runner();

    let cancel = Arc::new(AtomicBool::new(false));
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; stopping after the current candidate");
            on_signal.store(true, Ordering::SeqCst);
        }
    });

    tracing::info!(
        assignment = %cfg.assignment,
        db = %redact_url(&url),
        submissions = %args.submissions.display(),
        "grading"
    );
    let job = GradeJob {
        cfg,
        url,
        runner,
        cancel,
        args: args.clone(),
    };
    let summary = tokio::task::spawn_blocking(move || job.run())
        .await
        .context("grading task panicked")?;
    let summary = match summary {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {:#}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    write_outputs(&args, &summary)?;
    console::print_summary(&summary.candidates);

    if summary.cancelled {
        eprintln!(
            "cancelled after {} candidate(s); outputs are partial",
            summary.candidates.len()
        );
        return Ok(exit_codes::TEST_FAILED);
    }
    if summary.all_full_marks() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::TEST_FAILED)
    }
}

/// Everything the blocking grading thread owns.
struct GradeJob {
    cfg: Assignment,
    url: String,
    runner: ProbeRunner,
    cancel: Arc<AtomicBool>,
    args: GradeArgs,
}

impl GradeJob {
    fn run(self) -> anyhow::Result<RunSummary> {
        let mut session = db::connect(&self.url)?;
        if self.args.apply_setup {
            apply_setup(session.as_mut(), &self.cfg)?;
        }

        let mut store_sink = match &self.args.store {
            Some(path) => {
                ensure_parent_dir(path)?;
                Some(StoreSink::new(Store::open(path)?))
            }
            None => None,
        };
        let source = DirectorySubmissions::new(&self.args.submissions);
        let mut summary = {
            let mut sinks: Vec<&mut dyn ReportSink> = Vec::new();
            if let Some(sink) = store_sink.as_mut() {
                sinks.push(sink);
            }
            let batch = BatchRunner::new(&self.cfg, self.runner).with_cancel_flag(self.cancel.clone());
            batch.run(session.as_mut(), &source, &mut sinks)?
        };
        summary.run_id = store_sink.as_ref().and_then(StoreSink::run_id);
        if let Some(run_id) = summary.run_id {
            tracing::info!(run_id, "run recorded");
        }
        Ok(summary)
    }
}

fn write_outputs(args: &GradeArgs, summary: &RunSummary) -> anyhow::Result<()> {
    if let Some(path) = &args.json {
        ensure_parent_dir(path)?;
        json::write_json(summary, path)?;
    }
    if let Some(path) = &args.junit {
        ensure_parent_dir(path)?;
        junit::write_junit(&summary.assignment, &summary.candidates, path)?;
    }
    if let Some(path) = &args.marks {
        ensure_parent_dir(path)?;
        marks::write_marks(&summary.candidates, path)?;
    }
    if let Some(path) = &args.log {
        ensure_parent_dir(path)?;
        log::append_log(&summary.candidates, path)?;
    }
    Ok(())
}
