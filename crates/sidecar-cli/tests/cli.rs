use assert_cmd::Command;
use tempfile::TempDir;

#[test]
fn doctor_prints_the_storage_layout() {
    let scratch = TempDir::new().expect("tempdir");
    let mut cmd = Command::cargo_bin("sidecar").expect("binary");
    cmd.arg("doctor")
        .arg("--workspace")
        .arg(scratch.path())
        .arg("--storage-dir")
        .arg(scratch.path().join("storage"));
    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("storage root:"));
    assert!(stdout.contains("workspace shard:"));
    assert!(stdout.contains("echo"));
}

#[test]
fn run_completes_a_task_with_the_echo_extension() {
    let scratch = TempDir::new().expect("tempdir");
    let mut cmd = Command::cargo_bin("sidecar").expect("binary");
    cmd.arg("run")
        .arg("--prompt")
        .arg("ship it")
        .arg("--workspace")
        .arg(scratch.path())
        .arg("--storage-dir")
        .arg(scratch.path().join("storage"))
        .arg("--timeout-secs")
        .arg("10");
    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("taskCompleted"));
    assert!(stdout.contains("task completed: echo: ship it"));
}

#[test]
fn run_without_a_prompt_fails() {
    let scratch = TempDir::new().expect("tempdir");
    let mut cmd = Command::cargo_bin("sidecar").expect("binary");
    cmd.arg("run")
        .arg("--workspace")
        .arg(scratch.path())
        .arg("--storage-dir")
        .arg(scratch.path().join("storage"))
        .write_stdin("");
    cmd.assert().failure();
}

#[test]
fn state_lists_keys_after_a_run() {
    let scratch = TempDir::new().expect("tempdir");
    let storage = scratch.path().join("storage");

    let mut run = Command::cargo_bin("sidecar").expect("binary");
    run.arg("run")
        .arg("--prompt")
        .arg("hello")
        .arg("--workspace")
        .arg(scratch.path())
        .arg("--storage-dir")
        .arg(&storage)
        .assert()
        .success();

    let mut state = Command::cargo_bin("sidecar").expect("binary");
    state
        .arg("state")
        .arg("--scope")
        .arg("global")
        .arg("--workspace")
        .arg(scratch.path())
        .arg("--storage-dir")
        .arg(&storage);
    let assert = state.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    assert!(stdout.contains("global-state.json"));
}
