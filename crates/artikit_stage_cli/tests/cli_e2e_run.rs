//! End-to-end tests for `artikit-stage run`.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::prelude::*;
use predicates::prelude::*;

const C_STAGING_FILE: &str = r#"
[defaults]
output_path = "bin"
artifacts_path = "artifacts"
"#;

fn build_output(temp: &assert_fs::TempDir) {
    for name in ["foo.exe", "foo.pdb", "foo.exe.config", "bar.dll", "bar.pdb", "bar.cs"] {
        temp.child("bin").child(name).write_str(name).unwrap();
    }
    temp.child("artifacts.toml").write_str(C_STAGING_FILE).unwrap();
}

#[test]
fn test_run_stages_default_artifact() {
    let temp = assert_fs::TempDir::new().unwrap();
    build_output(&temp);

    cargo_bin_cmd!("artikit-stage")
        .current_dir(temp.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("copied=3"));

    temp.child("artifacts/foo.exe").assert(predicate::path::is_file());
    temp.child("artifacts/foo.exe.config").assert(predicate::path::is_file());
    temp.child("artifacts/bar.dll").assert(predicate::path::is_file());
    temp.child("artifacts/foo.pdb").assert(predicate::path::missing());
    temp.child("artifacts/bar.cs").assert(predicate::path::missing());
}

#[test]
fn test_run_again_skips_up_to_date_and_restores_deleted() {
    let temp = assert_fs::TempDir::new().unwrap();
    build_output(&temp);

    cargo_bin_cmd!("artikit-stage")
        .current_dir(temp.path())
        .arg("run")
        .assert()
        .success();

    cargo_bin_cmd!("artikit-stage")
        .current_dir(temp.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("copied=0 skipped=3"));

    std::fs::remove_file(temp.child("artifacts/bar.dll").path()).unwrap();
    cargo_bin_cmd!("artikit-stage")
        .current_dir(temp.path())
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("copied=1 skipped=2"));
    temp.child("artifacts/bar.dll")
        .assert(predicate::path::is_file());
}

#[test]
fn test_run_dependent_phase_stages_nothing() {
    let temp = assert_fs::TempDir::new().unwrap();
    build_output(&temp);

    for cfg in ["Debug", "Release"] {
        cargo_bin_cmd!("artikit-stage")
            .current_dir(temp.path())
            .args(["run", "--configurations", "Debug;Release", "--configuration", cfg])
            .assert()
            .success()
            .stdout(predicate::str::contains("planned=0"));
    }
    temp.child("artifacts").assert(predicate::path::missing());

    cargo_bin_cmd!("artikit-stage")
        .current_dir(temp.path())
        .args(["run", "--configurations", "Debug;Release"])
        .assert()
        .success()
        .stdout(predicate::str::contains("copied=3"));
}

#[test]
fn test_run_dry_run_writes_nothing() {
    let temp = assert_fs::TempDir::new().unwrap();
    build_output(&temp);

    cargo_bin_cmd!("artikit-stage")
        .current_dir(temp.path())
        .args(["run", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending=3"));
    temp.child("artifacts").assert(predicate::path::missing());
}

#[test]
fn test_run_explicit_config_with_tokens() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("out/Release/app.dll").write_str("app").unwrap();
    temp.child("out/Release/obj/tmp.dll").write_str("tmp").unwrap();
    temp.child("cfg/stage.toml")
        .write_str(
            r#"
[defaults]
output_path = "../out/{configuration}"

[[artifact]]
source = "{output_path}"
destination = "../staged/{configuration}"
robocopy = "*.dll /XD obj"
"#,
        )
        .unwrap();

    cargo_bin_cmd!("artikit-stage")
        .current_dir(temp.path())
        .args(["run", "--config", "cfg/stage.toml", "--configuration", "Release"])
        .assert()
        .success();

    temp.child("staged/Release/app.dll")
        .assert(predicate::path::is_file());
    temp.child("staged/Release/obj")
        .assert(predicate::path::missing());
}
