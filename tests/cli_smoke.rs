mod support;

use predicates::str::contains;

use support::twtools_cmd;

#[test]
fn twtools_help_works() {
    twtools_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("task/interval store coordination"));
}

#[test]
fn subcommand_help_works() {
    let subcommands = [
        "get",
        "fql",
        "new",
        "rename",
        "start",
        "done",
        "current",
        "reconcile",
        "check",
        "import-undo",
        "hook",
    ];

    for cmd in subcommands {
        twtools_cmd().arg(cmd).arg("--help").assert().success();
    }
}

#[test]
fn usage_errors_share_the_failure_code() {
    twtools_cmd().arg("frobnicate").assert().code(70);
    twtools_cmd().arg("get").assert().code(70);
}

#[test]
fn missing_config_file_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    twtools_cmd()
        .args(["--config"])
        .arg(dir.path().join("nope.toml"))
        .args(["get", "widget"])
        .assert()
        .code(70)
        .stderr(contains("error:"));
}

#[test]
fn invalid_config_reports_json_kind() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[fql]\nuuid_prefix_len = 1\n").expect("write config");

    let output = twtools_cmd()
        .arg("--config")
        .arg(&path)
        .args(["--json", "check"])
        .assert()
        .code(70)
        .get_output()
        .stdout
        .clone();
    let value: serde_json::Value = serde_json::from_slice(&output).expect("json envelope");
    assert_eq!(value["schema_version"], "twtools.v1");
    assert_eq!(value["status"], "error");
    assert_eq!(value["command"], "check");
    assert_eq!(value["error"]["kind"], "invalid_config");
    assert_eq!(value["error"]["code"], 70);
}
