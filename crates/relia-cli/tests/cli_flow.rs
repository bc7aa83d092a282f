use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn write_config(dir: &Path, per_caller_daily: u32) {
    fs::write(
        dir.join("relia.yaml"),
        format!(
            r#"
configVersion: 1
store:
  path: data/evaluations.db
quota:
  global_daily: 100
  per_caller_daily: {}
analysis:
  provider: fake
  backoff_ms: 0
"#,
            per_caller_daily
        ),
    )
    .unwrap();
}

fn relia(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("relia").unwrap();
    cmd.current_dir(dir)
        .env_remove("RELIA_DB")
        .env_remove("RELIA_GLOBAL_DAILY_LIMIT")
        .env_remove("RELIA_USER_DAILY_LIMIT")
        .env_remove("RELIA_CALLER");
    cmd
}

fn analyze(dir: &Path, caller: &str) -> Command {
    let mut cmd = relia(dir);
    cmd.args([
        "analyze",
        "--caller",
        caller,
        "--make",
        "Toyota",
        "--model",
        "Corolla",
        "--year",
        "2018",
        "--fuel",
        "gasoline",
        "--transmission",
        "automatic",
        "--mileage",
        "50,000-100,000",
    ]);
    cmd
}

#[test]
fn init_writes_config_and_store() {
    let dir = TempDir::new().unwrap();

    relia(dir.path())
        .args(["init", "--db", "store/relia.db"])
        .assert()
        .success()
        .stderr(contains("wrote config"))
        .stderr(contains("store ready"));

    assert!(dir.path().join("relia.yaml").exists());
    assert!(dir.path().join("store/relia.db").exists());

    // A second init keeps the existing file.
    relia(dir.path())
        .args(["init", "--db", "store/relia.db"])
        .assert()
        .success()
        .stderr(contains("config exists"));
}

#[test]
fn second_lookup_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), 5);

    analyze(dir.path(), "u1")
        .assert()
        .success()
        .stdout(contains("source: model"))
        .stdout(contains("score: 72"))
        .stdout(contains("quota: 4 left for you, 99 left today"));

    analyze(dir.path(), "u1")
        .assert()
        .success()
        .stdout(contains("source: cache"))
        .stdout(contains("quota: 4 left for you"));

    relia(dir.path())
        .args(["quota", "--caller", "u1", "--format", "json"])
        .assert()
        .success()
        .stdout(contains("\"user_left\": 4"))
        .stdout(contains("\"global_left\": 99"));
}

#[test]
fn per_caller_limit_stops_requests() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), 1);

    analyze(dir.path(), "u1").assert().success();
    analyze(dir.path(), "u1")
        .assert()
        .code(3)
        .stderr(contains("E_QUOTA_EXCEEDED"));

    // Another caller still has budget.
    analyze(dir.path(), "u2").assert().success();
}

#[test]
fn invalid_request_is_rejected() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), 5);

    let mut cmd = relia(dir.path());
    cmd.args(["analyze", "--make", "Toyota", "--model", " ", "--year", "2018"])
        .assert()
        .code(4)
        .stderr(contains("E_INVALID_REQUEST"));
}

#[test]
fn history_lists_and_exports_callers_rows() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), 5);

    analyze(dir.path(), "u1").assert().success();
    analyze(dir.path(), "u2").assert().success();

    relia(dir.path())
        .args(["history", "--caller", "u1", "--format", "json"])
        .assert()
        .success()
        .stdout(contains("\"total\": 1"))
        .stdout(contains("\"make\": \"Toyota\""));

    let out = relia(dir.path())
        .args(["history", "--caller", "u1", "--csv"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let csv = String::from_utf8(out).unwrap();
    let mut lines = csv.lines();
    assert!(lines.next().unwrap().starts_with("date,user_id,make,model"));
    assert_eq!(lines.count(), 1);

    relia(dir.path())
        .args(["history", "--caller", "anonymous"])
        .assert()
        .code(4);
}

#[test]
fn doctor_reports_store_as_json() {
    let dir = TempDir::new().unwrap();
    write_config(dir.path(), 5);
    analyze(dir.path(), "u1").assert().success();

    let out = relia(dir.path())
        .args(["doctor", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let report: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(report["store"]["reachable"], true);
    assert_eq!(report["store"]["row_count"], 1);
    assert_eq!(report["analysis"]["provider"], "fake");
    assert_eq!(report["quota"]["global_left"], 99);
}

#[test]
fn strict_config_rejects_unknown_keys() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("relia.yaml"),
        "configVersion: 1\nanalysis:\n  provider: fake\nunexpected: true\n",
    )
    .unwrap();

    relia(dir.path())
        .args(["quota", "--strict-config"])
        .assert()
        .code(2)
        .stderr(contains("unknown config fields"));

    relia(dir.path()).args(["quota"]).assert().success();
}
