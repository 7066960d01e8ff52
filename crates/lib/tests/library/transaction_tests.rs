//! Transactions against a real directory store and host runner.

use std::fs;

use tempfile::TempDir;

use tukit_lib::snapshot::DirectoryStore;
use tukit_lib::{
  CommandError, HostRunner, Outcome, SnapshotStore, Transaction, TransactionCommand, TransactionState,
  run_command,
};

fn seeded_store() -> (TempDir, DirectoryStore) {
  let temp = TempDir::new().unwrap();
  let store = DirectoryStore::new(temp.path().join("snapshots"));
  let base = store.create_base("base").unwrap();
  fs::write(base.mount_path.join("version"), "1\n").unwrap();
  (temp, store)
}

fn runner() -> HostRunner {
  HostRunner::new("/bin/sh")
}

fn argv(args: &[&str]) -> Vec<String> {
  args.iter().map(|s| s.to_string()).collect()
}

fn open(store: &DirectoryStore) -> String {
  match run_command(&TransactionCommand::Open, "default", store, &runner()).unwrap() {
    Outcome::Opened { id } => id,
    other => panic!("unexpected outcome: {other:?}"),
  }
}

#[test]
fn open_callext_close() {
  let (_temp, store) = seeded_store();
  let id = open(&store);
  assert_eq!(id, "2");

  let outcome = run_command(
    &TransactionCommand::CallExt {
      id: id.clone(),
      argv: argv(&["sh", "-c", "echo 2 > {}/version"]),
    },
    "default",
    &store,
    &runner(),
  )
  .unwrap();
  assert_eq!(outcome, Outcome::Exited(0));

  run_command(&TransactionCommand::Close { id: id.clone() }, "default", &store, &runner()).unwrap();

  assert_eq!(store.default_id().unwrap(), Some(id.clone()));
  let tree = store.mount_path_of(&id).unwrap();
  assert_eq!(fs::read_to_string(tree.join("version")).unwrap(), "2\n");
  let base = store.mount_path_of("1").unwrap();
  assert_eq!(fs::read_to_string(base.join("version")).unwrap(), "1\n");
}

#[test]
fn callext_reports_signal_as_status() {
  let (_temp, store) = seeded_store();
  let id = open(&store);

  let outcome = run_command(
    &TransactionCommand::CallExt {
      id: id.clone(),
      argv: argv(&["sh", "-c", "kill -TERM $$"]),
    },
    "default",
    &store,
    &runner(),
  )
  .unwrap();

  assert_eq!(outcome.exit_status(), 128 + 15);
  assert!(store.is_open(&id).unwrap());
}

#[test]
fn unretained_transaction_is_deleted_on_drop() {
  let (_temp, store) = seeded_store();
  let runner = runner();

  let path = {
    let mut tx = Transaction::new(&store, &runner);
    tx.init("default").unwrap();
    let status = tx.call_ext(&argv(&["test", "-f", "{}/version"])).unwrap();
    assert_eq!(status, 0);
    tx.mount_path().unwrap().to_path_buf()
  };

  assert!(!path.exists());
  assert_eq!(store.default_id().unwrap(), Some("1".to_string()));
}

#[test]
fn kept_transaction_survives_and_resumes() {
  let (_temp, store) = seeded_store();
  let runner = runner();

  let id = {
    let mut tx = Transaction::new(&store, &runner);
    tx.init("default").unwrap();
    tx.keep().unwrap();
    tx.snapshot().unwrap().to_string()
  };

  let mut tx = Transaction::new(&store, &runner);
  tx.resume(&id).unwrap();
  assert_eq!(tx.state(), TransactionState::Open);
  tx.abort().unwrap();
  drop(tx);

  assert!(store.mount_path_of(&id).is_err());
}

#[test]
fn execute_that_cannot_start_discards_snapshot() {
  let (_temp, store) = seeded_store();

  let err = run_command(
    &TransactionCommand::Execute {
      argv: argv(&["/nonexistent/tool"]),
    },
    "default",
    &store,
    &runner(),
  )
  .unwrap_err();

  assert!(matches!(err, CommandError::Transaction(_)));
  assert_eq!(store.ids().unwrap(), vec![1]);
  assert_eq!(store.default_id().unwrap(), Some("1".to_string()));
}
