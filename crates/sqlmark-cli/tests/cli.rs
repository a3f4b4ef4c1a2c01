use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Runs in `dir` with a clean sqlmark environment, so a developer `.env`
/// or exported variables cannot leak into the assertions.
fn sqlmark(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("sqlmark").unwrap();
    cmd.current_dir(dir)
        .env_remove("SQLMARK_DATABASE_URL")
        .env_remove("SQLMARK_AUTHOR_DATABASE_URL")
        .env_remove("SQLMARK_PROBE_TIMEOUT_MS")
        .env("SQLMARK_LOG", "warn");
    cmd
}

const ONE_QUERY: &str = r#"
configVersion: 1
assignment: warmup
queries:
  - file: q1.txt
    marks: 3
    expected:
      - rows: [["1"]]
"#;

fn submit(root: &Path, candidate: &str, file: &str, body: &str) {
    let dir = root.join(candidate);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(file), body).unwrap();
}

#[test]
fn init_writes_sample_once() {
    let dir = TempDir::new().unwrap();

    sqlmark(dir.path())
        .args(["init", "--config", "course/assignment.yaml"])
        .assert()
        .success()
        .stderr(contains("created course/assignment.yaml"));
    let body = fs::read_to_string(dir.path().join("course/assignment.yaml")).unwrap();
    assert!(body.contains("assignment: hr-routines"));

    sqlmark(dir.path())
        .args(["init", "--config", "course/assignment.yaml"])
        .assert()
        .success()
        .stderr(contains("already exists"));
}

#[test]
fn validate_reports_marks_and_missing_expectations() {
    let dir = TempDir::new().unwrap();
    sqlmark(dir.path()).args(["init"]).assert().success();

    sqlmark(dir.path())
        .args(["validate", "--strict"])
        .assert()
        .success()
        .stdout(contains("function get_bonus (fun.txt): 2 test(s), 25 marks"))
        .stdout(contains("max marks: 47"))
        .stdout(contains("missing expectations: 5"));

    sqlmark(dir.path())
        .args(["validate", "--format", "json"])
        .assert()
        .success()
        .stdout(contains("\"ok\": true"))
        .stdout(contains("\"max_marks\": 47"));
}

#[test]
fn validate_rejects_broken_config() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("assignment.yaml"), "configVersion: 1\nassignment: empty\n").unwrap();

    sqlmark(dir.path())
        .args(["validate"])
        .assert()
        .code(2)
        .stderr(contains("config error"));

    sqlmark(dir.path())
        .args(["validate", "--format", "json"])
        .assert()
        .code(2)
        .stdout(contains("\"ok\": false"));
}

#[test]
fn version_prints_package_version() {
    let dir = TempDir::new().unwrap();
    sqlmark(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn grade_scores_query_scripts_and_writes_outputs() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("assignment.yaml"), ONE_QUERY).unwrap();
    let subs = dir.path().join("subs");
    submit(&subs, "trn01", "q1.txt", "SELECT 1;");
    submit(&subs, "trn02", "q1.txt", "SELECT 2;");

    sqlmark(dir.path())
        .args([
            "grade",
            "--submissions",
            "subs",
            "--db",
            "sqlite::memory:",
            "--store",
            "out/runs.db",
            "--json",
            "out/run.json",
            "--junit",
            "out/junit.xml",
            "--marks",
            "out/marks.csv",
            "--log",
            "out/grading.log",
        ])
        .assert()
        .code(1)
        .stderr(contains("trn01: 3/3"))
        .stderr(contains("trn02: 0/3"))
        .stderr(contains("FAIL [trn02]: q1.txt: output differs"));

    let out = dir.path().join("out");
    let marks = fs::read_to_string(out.join("marks.csv")).unwrap();
    assert!(marks.starts_with("candidate,function,procedure,q1.txt_res,fun_avg_marks,total\n"));
    assert!(marks.contains("trn01,0,0,3,0.00,3\n"));
    assert!(marks.contains("trn02,0,0,0,0.00,0\n"));

    let json = fs::read_to_string(out.join("run.json")).unwrap();
    assert!(json.contains("\"run_id\": 1"));
    assert!(json.contains("\"candidate\": \"trn02\""));

    let junit = fs::read_to_string(out.join("junit.xml")).unwrap();
    assert!(junit.contains("<testsuites"));
    assert!(junit.contains("<failure"));

    assert!(out.join("runs.db").is_file());
    assert!(fs::read_to_string(out.join("grading.log")).unwrap().contains("trn01"));
}

#[test]
fn grade_exits_zero_when_everyone_has_full_marks() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("assignment.yaml"), ONE_QUERY).unwrap();
    submit(&dir.path().join("subs"), "trn01", "q1.txt", "select 1");

    sqlmark(dir.path())
        .env("SQLMARK_DATABASE_URL", "sqlite::memory:")
        .args(["grade", "--submissions", "subs"])
        .assert()
        .success()
        .stderr(contains("Candidates: 1 full=1 partial=0 not_gradeable=0"));
}

#[test]
fn grade_refuses_uncomputed_expectations() {
    let dir = TempDir::new().unwrap();
    sqlmark(dir.path()).args(["init"]).assert().success();
    fs::create_dir_all(dir.path().join("subs")).unwrap();

    sqlmark(dir.path())
        .args(["grade", "--submissions", "subs", "--db", "sqlite::memory:"])
        .assert()
        .code(2)
        .stderr(contains("not computed yet"));
}

#[test]
fn grade_needs_a_database() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("assignment.yaml"), ONE_QUERY).unwrap();
    fs::create_dir_all(dir.path().join("subs")).unwrap();

    sqlmark(dir.path())
        .args(["grade", "--submissions", "subs"])
        .assert()
        .code(2)
        .stderr(contains("no grading database"));
}

#[test]
fn expected_then_grade_round_trip() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("author/queries")).unwrap();
    fs::write(
        root.join("author/setup.sql"),
        "CREATE TABLE dept (id INTEGER, name TEXT);\nINSERT INTO dept VALUES (1, 'IT'), (2, 'HR');\n",
    )
    .unwrap();
    fs::write(
        root.join("author/queries/q1.txt"),
        "SELECT name FROM dept ORDER BY id;\nSELECT COUNT(*) FROM dept;\n",
    )
    .unwrap();
    fs::write(
        root.join("assignment.yaml"),
        "configVersion: 1\nassignment: depts\nauthor:\n  setup: author/setup.sql\n  queries_dir: author/queries\nqueries:\n  - file: q1.txt\n    marks: 4\n",
    )
    .unwrap();

    sqlmark(root)
        .args([
            "expected",
            "--author-db",
            "sqlite://author.db",
            "--out",
            "resolved.yaml",
        ])
        .assert()
        .success()
        .stderr(contains("wrote resolved.yaml (0 warning(s))"));

    sqlmark(root)
        .args(["validate", "--config", "resolved.yaml", "--strict"])
        .assert()
        .success()
        .stdout(contains("expectations: complete"));

    submit(&root.join("subs"), "trn01", "q1.txt", "select name from dept; select count(*) from dept;");
    sqlmark(root)
        .args([
            "grade",
            "--config",
            "resolved.yaml",
            "--submissions",
            "subs",
            "--db",
            "sqlite://grading.db",
            "--apply-setup",
        ])
        .assert()
        .success()
        .stderr(contains("trn01: 4/4"));
}
