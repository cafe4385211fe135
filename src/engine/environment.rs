//! The transactional embedded key/value engine consumed by the store layer
//! (spec §4.2 / §6.1). Generalizes the teacher's CoW B-tree + dual-slot manifest
//! (`recovery::wasp::{tree,manifest,page}`) into a directory of named sub-databases,
//! each backed by a [`SlotFile`](crate::engine::manifest::SlotFile) snapshot and an
//! in-memory `BTreeMap` for the committed contents.
//!
//! Concurrency: one [`parking_lot::Mutex`] per environment serializes write
//! transactions (spec §5, "single-writer per environment, many readers"). Readers take
//! a cheap `Arc` clone of a sub-database's committed map and never block a concurrent
//! writer or each other. Page ids inside a write transaction are assigned
//! monotonically from the environment's slot-file version counter and are never
//! recycled, so an in-flight `ReadTxn`'s snapshot stays valid for its entire lifetime
//! even as the writer commits further transactions — a deliberate simplification of
//! the teacher's `BlockAllocator`, which reuses freed page ids (see DESIGN.md).

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::engine::manifest::SlotFile;
use crate::errors::{Result, StoreError};

type Snapshot = BTreeMap<Vec<u8>, Vec<u8>>;

/// A mutual-exclusion lock whose guard is `'static` (owns an `Arc` back to the lock
/// rather than borrowing it), so it can be stored inside [`WriteTxn`] alongside the
/// `Arc<Environment>` that keeps it alive. `parking_lot::Mutex::lock` ties its guard's
/// lifetime to the `&self` borrow, which this struct's self-referential use forbids;
/// this tiny condvar-based lock sidesteps that without reaching for `unsafe`.
struct WriterLock {
    locked: Mutex<bool>,
    available: Condvar,
}

impl WriterLock {
    fn new() -> Arc<Self> {
        Arc::new(Self { locked: Mutex::new(false), available: Condvar::new() })
    }

    fn acquire(self: &Arc<Self>) -> WriterLockGuard {
        let mut guard = self.locked.lock();
        while *guard {
            self.available.wait(&mut guard);
        }
        *guard = true;
        WriterLockGuard { lock: self.clone() }
    }
}

struct WriterLockGuard {
    lock: Arc<WriterLock>,
}

impl Drop for WriterLockGuard {
    fn drop(&mut self) {
        *self.lock.locked.lock() = false;
        self.lock.available.notify_one();
    }
}

struct SubDb {
    slots: Mutex<SlotFile>,
    committed: RwLock<Arc<Snapshot>>,
}

impl SubDb {
    fn open(dir: &std::path::Path, name: &str) -> Result<Self> {
        let slots = SlotFile::open(dir, name)?;
        let snapshot = slots.read_current()?;
        Ok(Self { slots: Mutex::new(slots), committed: RwLock::new(Arc::new(snapshot)) })
    }
}

/// A directory-backed collection of named sub-databases.
pub struct Environment {
    dir: PathBuf,
    max_subdbs: usize,
    lock_safe: bool,
    subdbs: RwLock<HashMap<String, Arc<SubDb>>>,
    writer: Arc<WriterLock>,
}

impl Environment {
    /// Opens (creating if absent) an environment rooted at `dir`.
    ///
    /// `size_bytes` is accepted for contract parity with spec §6.1 but is not
    /// enforced — this engine has no fixed memory-mapped arena to size.
    ///
    /// # Errors
    /// Returns an error if the directory cannot be created.
    pub fn open(dir: PathBuf, _size_bytes: u64, lock_safe: bool, max_subdbs: usize) -> Result<Arc<Self>> {
        fs::create_dir_all(&dir).map_err(StoreError::EngineError)?;
        Ok(Arc::new(Self {
            dir,
            max_subdbs,
            lock_safe,
            subdbs: RwLock::new(HashMap::new()),
            writer: WriterLock::new(),
        }))
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.dir
    }

    /// Opens (and lazily creates, if `create`) a named sub-database.
    ///
    /// `integer_keys` is accepted for contract parity with spec §6.1; keys are always
    /// stored as raw bytes, so little-endian-encoded integer keys sort correctly
    /// without special-casing.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownName`] if `create` is false and the sub-database
    /// has never been opened, or [`StoreError::StoreCorrupt`] if the cap on
    /// sub-databases would be exceeded.
    pub fn open_subdb(
        self: &Arc<Self>,
        name: &str,
        create: bool,
        _integer_keys: bool,
    ) -> Result<()> {
        if self.subdbs.read().contains_key(name) {
            return Ok(());
        }
        let mut guard = self.subdbs.write();
        if guard.contains_key(name) {
            return Ok(());
        }
        if !create && !subdb_files_exist(&self.dir, name) {
            return Err(StoreError::UnknownName(name.to_string()));
        }
        if guard.len() >= self.max_subdbs {
            return Err(StoreError::StoreCorrupt(format!(
                "sub-database cap ({}) exceeded opening {name}",
                self.max_subdbs
            )));
        }
        let subdb = SubDb::open(&self.dir, name)?;
        guard.insert(name.to_string(), Arc::new(subdb));
        Ok(())
    }

    fn subdb(&self, name: &str) -> Result<Arc<SubDb>> {
        self.subdbs.read().get(name).cloned().ok_or_else(|| StoreError::UnknownName(name.to_string()))
    }

    /// Drops a sub-database entirely: removes its in-memory state and on-disk slot files.
    ///
    /// # Errors
    /// Returns an error if the underlying slot files cannot be removed.
    pub fn drop_subdb(&self, name: &str) -> Result<()> {
        self.subdbs.write().remove(name);
        crate::engine::manifest::reset(&self.dir, name)
    }

    /// Begins a snapshot-consistent read transaction.
    #[must_use]
    pub fn begin_read(self: &Arc<Self>) -> ReadTxn {
        ReadTxn { env: self.clone(), captured: Mutex::new(HashMap::new()) }
    }

    /// Begins the single write transaction this environment allows at a time; the
    /// returned guard blocks a concurrent caller until this transaction commits or
    /// is dropped (aborting any uncommitted work).
    #[must_use]
    pub fn begin_write(self: &Arc<Self>) -> WriteTxn {
        let guard = self.writer.acquire();
        WriteTxn { env: self.clone(), _guard: guard, working: RwLock::new(HashMap::new()) }
    }
}

fn subdb_files_exist(dir: &std::path::Path, name: &str) -> bool {
    dir.join(format!("{name}.slot0")).exists() || dir.join(format!("{name}.slot1")).exists()
}

/// A read-only, snapshot-consistent view over the environment's sub-databases.
///
/// Each sub-database touched by this transaction is captured (`Arc` clone of its
/// committed map) the first time it's read and reused for every subsequent read on
/// this `ReadTxn`, so a later writer's commits never become visible mid-transaction
/// (spec §4.2, §5).
pub struct ReadTxn {
    env: Arc<Environment>,
    captured: Mutex<HashMap<String, Arc<Snapshot>>>,
}

impl ReadTxn {
    fn snapshot(&self, subdb_name: &str) -> Result<Arc<Snapshot>> {
        if let Some(snap) = self.captured.lock().get(subdb_name) {
            return Ok(snap.clone());
        }
        let snap = self.env.subdb(subdb_name)?.committed.read().clone();
        self.captured.lock().entry(subdb_name.to_string()).or_insert_with(|| snap.clone());
        Ok(snap)
    }

    /// # Errors
    /// Returns an error if the sub-database is not open.
    pub fn get(&self, subdb_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.snapshot(subdb_name)?.get(key).cloned())
    }

    /// Returns the `(key, value)` pairs found for `keys`, in input order, omitting
    /// any key with no current value.
    ///
    /// # Errors
    /// Returns an error if the sub-database is not open.
    pub fn get_multi(&self, subdb_name: &str, keys: &[Vec<u8>]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let snap = self.snapshot(subdb_name)?;
        Ok(keys.iter().filter_map(|k| snap.get(k).map(|v| (k.clone(), v.clone()))).collect())
    }

    /// Returns every `(key, value)` pair in ascending key order.
    ///
    /// # Errors
    /// Returns an error if the sub-database is not open.
    pub fn iternext(&self, subdb_name: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let snap = self.snapshot(subdb_name)?;
        Ok(snap.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

/// The environment's single concurrent write transaction.
pub struct WriteTxn {
    env: Arc<Environment>,
    _guard: WriterLockGuard,
    working: RwLock<HashMap<String, Snapshot>>,
}

impl WriteTxn {
    fn with_working<T>(&self, subdb_name: &str, f: impl FnOnce(&mut Snapshot) -> Result<T>) -> Result<T> {
        {
            let has = self.working.read().contains_key(subdb_name);
            if !has {
                let base = (*self.env.subdb(subdb_name)?.committed.read()).clone();
                self.working.write().insert(subdb_name.to_string(), base);
            }
        }
        let mut guard = self.working.write();
        let map = guard.get_mut(subdb_name).expect("working snapshot populated above");
        f(map)
    }

    /// # Errors
    /// Returns an error if the sub-database is not open.
    pub fn get(&self, subdb_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with_working(subdb_name, |m| Ok(m.get(key).cloned()))
    }

    /// # Errors
    /// Returns an error if the sub-database is not open.
    pub fn get_multi(&self, subdb_name: &str, keys: &[Vec<u8>]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.with_working(subdb_name, |m| {
            Ok(keys.iter().filter_map(|k| m.get(k).map(|v| (k.clone(), v.clone()))).collect())
        })
    }

    /// Inserts or overwrites `key`. `append_hint` is accepted for contract parity
    /// with spec §6.1; this engine's in-memory `BTreeMap` makes the lookup it would
    /// skip already O(log n), so the hint has no effect on behavior.
    ///
    /// # Errors
    /// Returns an error if the sub-database is not open.
    pub fn put(&self, subdb_name: &str, key: Vec<u8>, value: Vec<u8>, _append_hint: bool) -> Result<()> {
        self.with_working(subdb_name, |m| {
            m.insert(key, value);
            Ok(())
        })
    }

    /// # Errors
    /// Returns an error if the sub-database is not open.
    pub fn put_multi(
        &self,
        subdb_name: &str,
        items: Vec<(Vec<u8>, Vec<u8>)>,
        _append_hint: bool,
    ) -> Result<()> {
        self.with_working(subdb_name, |m| {
            for (k, v) in items {
                m.insert(k, v);
            }
            Ok(())
        })
    }

    /// # Errors
    /// Returns an error if the sub-database is not open.
    pub fn delete(&self, subdb_name: &str, key: &[u8]) -> Result<()> {
        self.with_working(subdb_name, |m| {
            m.remove(key);
            Ok(())
        })
    }

    /// # Errors
    /// Returns an error if the sub-database is not open.
    pub fn iternext(&self, subdb_name: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.with_working(subdb_name, |m| Ok(m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
    }

    /// Commits every sub-database touched during this transaction, in name order
    /// (deterministic, so replaying identical operations twice produces identical
    /// on-disk byte layouts — spec §8 property 10).
    ///
    /// # Errors
    /// Returns an error if a touched sub-database is unknown or a slot-file commit fails.
    pub fn commit(self) -> Result<()> {
        let mut names: Vec<String> = self.working.read().keys().cloned().collect();
        names.sort();
        for name in names {
            let new_map = self.working.write().remove(&name).expect("present by construction");
            let subdb = self.env.subdb(&name)?;
            let mut slots = subdb.slots.lock();
            slots.commit(&new_map, self.env.lock_safe)?;
            *subdb.committed.write() = Arc::new(new_map);
        }
        Ok(())
    }

    /// Discards all buffered mutations without touching the engine. Equivalent to
    /// dropping the transaction.
    pub fn abort(self) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn write_then_read_snapshot_is_stable_across_later_writes() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path().to_path_buf(), 0, true, 16).unwrap();
        env.open_subdb("main", true, false).unwrap();

        let wtxn = env.begin_write();
        wtxn.put("main", b"a".to_vec(), b"1".to_vec(), false).unwrap();
        wtxn.commit().unwrap();

        let rtxn = env.begin_read();
        assert_eq!(rtxn.get("main", b"a").unwrap(), Some(b"1".to_vec()));

        let wtxn2 = env.begin_write();
        wtxn2.put("main", b"a".to_vec(), b"2".to_vec(), false).unwrap();
        wtxn2.commit().unwrap();

        // The earlier read snapshot is unaffected by the later commit.
        assert_eq!(rtxn.get("main", b"a").unwrap(), Some(b"1".to_vec()));
        let rtxn2 = env.begin_read();
        assert_eq!(rtxn2.get("main", b"a").unwrap(), Some(b"2".to_vec()));
    }

    #[test]
    fn reopen_preserves_committed_state() {
        let dir = tempdir().unwrap();
        {
            let env = Environment::open(dir.path().to_path_buf(), 0, true, 16).unwrap();
            env.open_subdb("seq", true, false).unwrap();
            let wtxn = env.begin_write();
            wtxn.put_multi("seq", vec![(b"k1".to_vec(), b"v1".to_vec())], true).unwrap();
            wtxn.commit().unwrap();
        }
        let env2 = Environment::open(dir.path().to_path_buf(), 0, true, 16).unwrap();
        env2.open_subdb("seq", true, false).unwrap();
        let rtxn = env2.begin_read();
        assert_eq!(rtxn.get("seq", b"k1").unwrap(), Some(b"v1".to_vec()));
    }

    #[test]
    fn delete_then_get_returns_none() {
        let dir = tempdir().unwrap();
        let env = Environment::open(dir.path().to_path_buf(), 0, false, 16).unwrap();
        env.open_subdb("m", true, false).unwrap();
        let w1 = env.begin_write();
        w1.put("m", b"k".to_vec(), b"v".to_vec(), false).unwrap();
        w1.commit().unwrap();
        let w2 = env.begin_write();
        w2.delete("m", b"k").unwrap();
        w2.commit().unwrap();
        let r = env.begin_read();
        assert_eq!(r.get("m", b"k").unwrap(), None);
    }
}
