use ledgerlite::engine::Environment;
use tempfile::tempdir;

#[test]
fn commits_are_durable_across_a_fresh_open_of_the_same_directory() {
    let dir = tempdir().unwrap();
    {
        let env = Environment::open(dir.path().to_path_buf(), 0, true, 16).unwrap();
        env.open_subdb("accounts", true, false).unwrap();
        let wtxn = env.begin_write();
        wtxn.put_multi("accounts", vec![(b"alice".to_vec(), b"100".to_vec()), (b"bob".to_vec(), b"50".to_vec())], false).unwrap();
        wtxn.commit().unwrap();
    }
    let reopened = Environment::open(dir.path().to_path_buf(), 0, true, 16).unwrap();
    reopened.open_subdb("accounts", true, false).unwrap();
    let rtxn = reopened.begin_read();
    assert_eq!(rtxn.get("accounts", b"alice").unwrap(), Some(b"100".to_vec()));
    assert_eq!(rtxn.get("accounts", b"bob").unwrap(), Some(b"50".to_vec()));
}

#[test]
fn an_aborted_write_transaction_leaves_no_trace() {
    let dir = tempdir().unwrap();
    let env = Environment::open(dir.path().to_path_buf(), 0, true, 16).unwrap();
    env.open_subdb("m", true, false).unwrap();

    let wtxn = env.begin_write();
    wtxn.put("m", b"k".to_vec(), b"v".to_vec(), false).unwrap();
    wtxn.abort();

    let rtxn = env.begin_read();
    assert_eq!(rtxn.get("m", b"k").unwrap(), None);
}

#[test]
fn unopened_subdb_is_reported_as_unknown_name() {
    let dir = tempdir().unwrap();
    let env = Environment::open(dir.path().to_path_buf(), 0, true, 16).unwrap();
    let rtxn = env.begin_read();
    assert!(rtxn.get("never-opened", b"k").is_err());
}

#[test]
fn opening_past_the_subdb_cap_fails() {
    let dir = tempdir().unwrap();
    let env = Environment::open(dir.path().to_path_buf(), 0, true, 2).unwrap();
    env.open_subdb("a", true, false).unwrap();
    env.open_subdb("b", true, false).unwrap();
    assert!(env.open_subdb("c", true, false).is_err());
}
