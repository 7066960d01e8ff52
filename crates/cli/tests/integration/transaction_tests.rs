//! Transaction command integration tests against the directory backend.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn open_prints_id_and_keeps_snapshot() {
  let env = TestEnv::new();

  env
    .tukit_cmd()
    .arg("open")
    .assert()
    .success()
    .stdout(predicate::eq("ID: 2\n"))
    .stderr(predicate::str::contains("started"))
    .stderr(predicate::str::contains("Transaction completed."));

  assert!(env.exists("2"));
  assert!(env.tree("2").join("os-release").is_file());
  assert_eq!(env.default_id().as_deref(), Some("1"));
  assert!(!env.lock_path().exists(), "lock file should be gone after exit");
}

#[test]
fn quiet_suppresses_log_output() {
  let env = TestEnv::new();

  env
    .tukit_cmd()
    .arg("-q")
    .arg("open")
    .assert()
    .success()
    .stdout(predicate::eq("ID: 2\n"))
    .stderr(predicate::str::is_empty());
}

#[test]
fn callext_runs_on_host_with_mount_path() {
  let env = TestEnv::new();
  let id = env.open();

  env
    .tukit_cmd()
    .args(["callext", &id, "sh", "-c", "echo hello > {}/marker"])
    .assert()
    .success();

  assert_eq!(
    std::fs::read_to_string(env.tree(&id).join("marker")).unwrap(),
    "hello\n"
  );
  assert_eq!(env.default_id().as_deref(), Some("1"));
}

#[test]
fn callext_returns_child_status_and_keeps_transaction() {
  let env = TestEnv::new();
  let id = env.open();

  env
    .tukit_cmd()
    .args(["callext", &id, "sh", "-c", "exit 7"])
    .assert()
    .code(7);

  assert!(env.exists(&id));
  assert!(env.store().load_info(&id).unwrap().open);
}

#[test]
fn close_makes_snapshot_default() {
  let env = TestEnv::new();
  let id = env.open();

  env.tukit_cmd().args(["close", &id]).assert().success();

  assert_eq!(env.default_id(), Some(id.clone()));
  assert!(!env.store().load_info(&id).unwrap().open);

  // a finalized snapshot is no longer a transaction
  env
    .tukit_cmd()
    .args(["close", &id])
    .assert()
    .failure()
    .stderr(predicate::str::contains(id.as_str()));
  assert_eq!(env.default_id(), Some(id));
}

#[test]
fn abort_deletes_and_second_abort_fails() {
  let env = TestEnv::new();
  let id = env.open();

  env.tukit_cmd().args(["abort", &id]).assert().success();
  assert!(!env.exists(&id));

  env.tukit_cmd().args(["abort", &id]).assert().code(1);
  assert_eq!(env.default_id().as_deref(), Some("1"));
}

#[test]
fn call_unknown_transaction_fails_without_changes() {
  let env = TestEnv::new();

  env
    .tukit_cmd()
    .args(["call", "42", "true"])
    .assert()
    .code(1);

  assert!(!env.exists("2"));
  assert!(!env.exists("42"));
  assert_eq!(env.default_id().as_deref(), Some("1"));
}

#[test]
fn failing_execute_discards_snapshot() {
  // The base snapshot holds no binaries, so the chrooted command can never start.
  let env = TestEnv::new();

  env
    .tukit_cmd()
    .args(["execute", "/bin/true"])
    .assert()
    .code(1);

  assert!(!env.exists("2"));
  assert_eq!(env.default_id().as_deref(), Some("1"));
}

#[test]
fn continue_branches_from_given_snapshot() {
  let env = TestEnv::new();
  let first = env.open();
  std::fs::write(env.tree(&first).join("only-in-first"), "x").unwrap();

  let output = env
    .tukit_cmd()
    .arg(format!("--continue={}", first))
    .arg("open")
    .output()
    .unwrap();
  assert!(output.status.success());
  let second = String::from_utf8(output.stdout).unwrap().trim().trim_start_matches("ID: ").to_string();

  assert_eq!(second, "3");
  assert!(env.tree(&second).join("only-in-first").is_file());
  assert_eq!(env.store().load_info(&second).unwrap().basis.as_deref(), Some(first.as_str()));
}

#[test]
fn continue_from_missing_snapshot_fails() {
  let env = TestEnv::new();

  env
    .tukit_cmd()
    .args(["--continue=9", "open"])
    .assert()
    .code(1)
    .stdout(predicate::str::is_empty());

  assert!(!env.exists("2"));
}

#[test]
fn attached_short_continue_value() {
  let env = TestEnv::new();
  let first = env.open();

  env
    .tukit_cmd()
    .args([&format!("-c{}", first), "open"])
    .assert()
    .success()
    .stdout(predicate::eq("ID: 3\n"));

  assert_eq!(env.store().load_info("3").unwrap().basis.as_deref(), Some(first.as_str()));
}

#[cfg(unix)]
#[test]
fn parent_survives_termination_signals() {
  let env = TestEnv::new();
  let id = env.open();

  env
    .tukit_cmd()
    .args(["callext", &id, "sh", "-c", "kill -TERM $PPID; kill -INT $PPID; sleep 0.3; exit 5"])
    .assert()
    .code(5)
    .stderr(predicate::str::contains("Transaction completed."));

  assert!(!env.lock_path().exists(), "lock file should be gone after exit");
  assert!(env.exists(&id));
  assert!(env.store().load_info(&id).unwrap().open);
}

#[test]
fn callext_without_placeholder_warns() {
  let env = TestEnv::new();
  let id = env.open();

  env
    .tukit_cmd()
    .args(["callext", &id, "true"])
    .assert()
    .success()
    .stderr(predicate::str::contains("does not contain {}"));

  env
    .tukit_cmd()
    .args(["callext", &id, "test", "-d", "{}"])
    .assert()
    .success()
    .stderr(predicate::str::contains("does not contain {}").not());
}
