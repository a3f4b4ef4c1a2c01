use super::exit_codes;
use crate::cli::args::ValidateArgs;
use serde_json::json;
use sqlmark_core::config::load_config;
use sqlmark_core::model::{Assignment, Marked, RoutineSuite};

pub fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    let cfg = match load_config(&args.config, args.strict) {
        Ok(c) => c,
        Err(e) => {
            if args.format == "json" {
                let out = json!({
                    "schema_version": 1,
                    "ok": false,
                    "file": args.config,
                    "errors": [e.to_string()],
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                eprintln!("{}", e);
            }
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&json_report(&cfg))?);
    } else {
        print_text(&cfg);
    }
    Ok(exit_codes::OK)
}

fn suite_json<T: Marked>(suite: &RoutineSuite<T>) -> serde_json::Value {
    json!({
        "kind": suite.spec.kind.label(),
        "name": suite.spec.name,
        "source_file": suite.source_file_name(),
        "tests": suite.tests.len(),
        "max_marks": suite.max_marks(),
    })
}

fn json_report(cfg: &Assignment) -> serde_json::Value {
    let mut suites = Vec::new();
    if let Some(s) = &cfg.function {
        suites.push(suite_json(s));
    }
    if let Some(s) = &cfg.procedure {
        suites.push(suite_json(s));
    }
    let queries: Vec<_> = cfg
        .queries
        .iter()
        .map(|q| json!({ "file": q.file, "max_marks": q.marks }))
        .collect();
    json!({
        "schema_version": 1,
        "ok": true,
        "assignment": cfg.assignment,
        "config_version": cfg.version,
        "suites": suites,
        "queries": queries,
        "max_marks": cfg.max_marks(),
        "missing_expectations": cfg.missing_expectations(),
    })
}

fn print_text(cfg: &Assignment) {
    println!("assignment: {} (configVersion {})", cfg.assignment, cfg.version);
    if let Some(s) = &cfg.function {
        print_suite(s);
    }
    if let Some(s) = &cfg.procedure {
        print_suite(s);
    }
    if !cfg.queries.is_empty() {
        let marks: u32 = cfg.queries.iter().map(|q| q.marks).sum();
        println!("queries: {} script(s), {} marks", cfg.queries.len(), marks);
    }
    println!("max marks: {}", cfg.max_marks());

    let missing = cfg.missing_expectations();
    if missing.is_empty() {
        println!("expectations: complete");
    } else {
        println!("missing expectations: {}", missing.len());
        for m in missing {
            println!("  - {}", m);
        }
    }
}

fn print_suite<T: Marked>(suite: &RoutineSuite<T>) {
    println!(
        "{} {} ({}): {} test(s), {} marks",
        suite.spec.kind.label(),
        suite.spec.name,
        suite.source_file_name(),
        suite.tests.len(),
        suite.max_marks()
    );
}
