//! KeyValueMap: a finite partial function from non-empty byte strings to byte
//! strings, optionally bucketed so many logical pairs share one physical page
//! (spec §3.5, §4.5).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::codec::{deserialize_submap, serialize_submap};
use crate::engine::Environment;
use crate::errors::{Result, StoreError};
use crate::store::container::{ContainerBase, Kind, Stat};

/// The physical layout a [`KeyValueMap`] was created with (spec §3.5, §3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Unbucketed,
    Bucketed { bucket_count: u64 },
}

impl Layout {
    fn to_stat(self) -> Stat {
        match self {
            Self::Unbucketed => {
                Stat { length: 0, kind: Kind::Map, batching: false, batch_size: 0, max_item_len: 0, constant_length: false }
            }
            Self::Bucketed { bucket_count } => {
                Stat { length: 0, kind: Kind::Map, batching: true, batch_size: bucket_count, max_item_len: 0, constant_length: false }
            }
        }
    }

    fn from_stat(stat: Stat) -> Result<Self> {
        if stat.kind != Kind::Map {
            return Err(StoreError::StoreCorrupt("sidecar kind is not map".to_string()));
        }
        if stat.batching { Ok(Self::Bucketed { bucket_count: stat.batch_size }) } else { Ok(Self::Unbucketed) }
    }
}

fn bucket_key(bucket: u64) -> Vec<u8> {
    bucket.to_le_bytes().to_vec()
}

const CACHE_CAPACITY: usize = 256;

struct State {
    read_cache: lru::LruCache<Vec<u8>, Vec<u8>>,
    negative_cache: lru::LruCache<Vec<u8>, ()>,
    pending_puts: BTreeMap<Vec<u8>, Vec<u8>>,
    pending_deletes: BTreeSet<Vec<u8>>,
}

impl State {
    fn new() -> Self {
        Self {
            read_cache: lru::LruCache::new(std::num::NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero")),
            negative_cache: lru::LruCache::new(std::num::NonZeroUsize::new(CACHE_CAPACITY).expect("nonzero")),
            pending_puts: BTreeMap::new(),
            pending_deletes: BTreeSet::new(),
        }
    }
}

/// A mapping from key-bytes to value-bytes, unbucketed or bucketed (spec §3.5, §4.5,
/// §6.2). See [`crate::store::sequence::OrderedSequence`] for the `self_weak` /
/// threaded-flush pattern this mirrors.
pub struct KeyValueMap {
    base: ContainerBase,
    layout: Layout,
    cache_on_set: bool,
    state: Mutex<State>,
    self_weak: std::sync::Weak<Self>,
}

impl KeyValueMap {
    /// Creates (or reopens) an unbucketed map.
    ///
    /// # Errors
    /// Returns an error if the container exists with an incompatible layout.
    pub fn create_unbucketed(env: Arc<Environment>, name: &str, cache_on_set: bool) -> Result<Arc<Self>> {
        Self::open_with_default(env, name, Layout::Unbucketed, cache_on_set)
    }

    /// Creates (or reopens) a bucketed map with `bucket_count` buckets.
    ///
    /// # Errors
    /// Returns an error if the container exists with an incompatible layout.
    pub fn create_bucketed(env: Arc<Environment>, name: &str, bucket_count: u64, cache_on_set: bool) -> Result<Arc<Self>> {
        Self::open_with_default(env, name, Layout::Bucketed { bucket_count }, cache_on_set)
    }

    fn open_with_default(env: Arc<Environment>, name: &str, layout: Layout, cache_on_set: bool) -> Result<Arc<Self>> {
        let base = ContainerBase::open_or_create(env, name, layout.to_stat())?;
        let stat = base.read_stat()?;
        let actual_layout = Layout::from_stat(stat)?;
        if actual_layout != layout {
            return Err(StoreError::StoreCorrupt(format!("map {name} reopened with a different layout than persisted")));
        }
        Ok(Arc::new_cyclic(|weak| Self { base, layout, cache_on_set, state: Mutex::new(State::new()), self_weak: weak.clone() }))
    }

    /// Reopens an existing map by name alone, recovering its layout from the sidecar.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownName`] if no sidecar exists for `name`.
    pub fn open(env: Arc<Environment>, name: &str) -> Result<Arc<Self>> {
        let base = ContainerBase::open(env, name)?;
        let stat = base.read_stat()?;
        let layout = Layout::from_stat(stat)?;
        Ok(Arc::new_cyclic(|weak| Self { base, layout, cache_on_set: false, state: Mutex::new(State::new()), self_weak: weak.clone() }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.base.name()
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    fn bucket_of(&self, key: &[u8]) -> Option<u64> {
        match self.layout {
            Layout::Unbucketed => None,
            Layout::Bucketed { bucket_count } => Some(crate::codec::bucket(key, bucket_count)),
        }
    }

    /// Buffers `key -> value`; any pending delete for `key` is cleared (spec §4.5).
    ///
    /// # Errors
    /// Returns an error if the sidecar/flush machinery is inconsistent (never in the
    /// buffering path itself).
    pub fn set(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        let mut state = self.state.lock();
        state.pending_deletes.remove(key);
        state.negative_cache.pop(key);
        state.read_cache.pop(key);
        state.pending_puts.insert(key.to_vec(), value.clone());
        if self.cache_on_set {
            state.read_cache.put(key.to_vec(), value);
        }
        Ok(())
    }

    /// Sets `key -> value` only if `key` is not currently visible (spec §6.2
    /// `set_default`).
    ///
    /// # Errors
    /// Returns an error if the engine lookup fails.
    pub fn set_default(&self, key: &[u8], value: Vec<u8>) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(false),
            Err(StoreError::NotFound) => {
                self.set(key, value)?;
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Buffers a delete intent for `key`; any pending put is cleared (spec §4.5).
    pub fn delete(&self, key: &[u8]) {
        let mut state = self.state.lock();
        state.pending_puts.remove(key);
        state.read_cache.pop(key);
        state.pending_deletes.insert(key.to_vec());
    }

    /// Looks up `key`: read cache, then pending put, then pending delete (raising
    /// [`StoreError::NotFound`]), then the engine (spec §4.5 priority order).
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if absent, or a store/engine error otherwise.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        if let Some(v) = state.read_cache.get(key) {
            return Ok(v.clone());
        }
        if let Some(v) = state.pending_puts.get(key) {
            return Ok(v.clone());
        }
        if state.pending_deletes.contains(key) {
            return Err(StoreError::NotFound);
        }
        if state.negative_cache.get(key).is_some() {
            return Err(StoreError::NotFound);
        }
        drop(state);
        let found = self.read_from_engine(key)?;
        let mut state = self.state.lock();
        match found {
            Some(v) => {
                state.read_cache.put(key.to_vec(), v.clone());
                Ok(v)
            }
            None => {
                state.negative_cache.put(key.to_vec(), ());
                Err(StoreError::NotFound)
            }
        }
    }

    fn read_from_engine(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let rtxn = self.base.env().begin_read();
        match self.layout {
            Layout::Unbucketed => rtxn.get(self.base.name(), key),
            Layout::Bucketed { bucket_count } => {
                let bucket = crate::codec::bucket(key, bucket_count);
                let Some(page) = rtxn.get(self.base.name(), &bucket_key(bucket))? else { return Ok(None) };
                let submap = deserialize_submap(&page)?;
                Ok(submap.get(key).cloned())
            }
        }
    }

    /// Boolean form of [`Self::get`]; never raises, consults the negative cache.
    ///
    /// # Errors
    /// Returns an error only if the engine read itself fails (not on absence).
    pub fn contains(&self, key: &[u8]) -> Result<bool> {
        match self.get(key) {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Enumerates every visible `(key, value)` pair. Bucketed maps flush first (spec
    /// §9's bucket-iteration precondition: iteration after a flush is well-defined;
    /// this implementation satisfies the precondition by flushing implicitly rather
    /// than refusing to iterate with buffers outstanding).
    ///
    /// # Errors
    /// Returns an error if a flush or an underlying page read fails.
    pub fn iterate(&self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        match self.layout {
            Layout::Unbucketed => {
                let mut out: BTreeMap<Vec<u8>, Vec<u8>> = {
                    let rtxn = self.base.env().begin_read();
                    rtxn.iternext(self.base.name())?.into_iter().collect()
                };
                let state = self.state.lock();
                for (k, v) in &state.pending_puts {
                    out.insert(k.clone(), v.clone());
                }
                for k in &state.pending_deletes {
                    out.remove(k);
                }
                Ok(out.into_iter().collect())
            }
            Layout::Bucketed { .. } => {
                self.flush_inline()?;
                let rtxn = self.base.env().begin_read();
                let mut out = Vec::new();
                for (_bucket, page) in rtxn.iternext(self.base.name())? {
                    out.extend(deserialize_submap(&page)?);
                }
                out.sort_by(|a, b| a.0.cmp(&b.0));
                Ok(out)
            }
        }
    }

    /// Flushes pending puts and deletes (spec §4.5 flush algorithm). See
    /// [`crate::store::sequence::OrderedSequence::flush`] for the threading contract.
    ///
    /// # Errors
    /// Returns an error if the underlying write transaction or sidecar update fails, or
    /// if `threaded` is requested on a map with no surviving `Arc` handle elsewhere.
    pub fn flush(&self, threaded: bool) -> Result<()> {
        if threaded {
            let map = self
                .self_weak
                .upgrade()
                .ok_or_else(|| StoreError::StoreCorrupt(format!("map {} has no live Arc handle to flush from", self.name())))?;
            self.base.run_flush(true, move || map.flush_inline())
        } else {
            self.base.run_flush(false, || Ok(()))?;
            self.flush_inline()
        }
    }

    /// Blocks until a prior background flush (if any) completes.
    ///
    /// # Errors
    /// Returns an error if that flush failed.
    pub fn wait_for_flush(&self) -> Result<()> {
        self.base.wait_for_flush()
    }

    fn flush_inline(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.pending_puts.is_empty() && state.pending_deletes.is_empty() {
            return Ok(());
        }
        let puts = std::mem::take(&mut state.pending_puts);
        let deletes = std::mem::take(&mut state.pending_deletes);
        drop(state);

        let wtxn = self.base.env().begin_write();
        match self.layout {
            Layout::Unbucketed => {
                if !puts.is_empty() {
                    wtxn.put_multi(self.base.name(), puts.into_iter().collect(), false)?;
                }
                for key in &deletes {
                    wtxn.delete(self.base.name(), key)?;
                }
            }
            Layout::Bucketed { bucket_count } => {
                self.flush_bucketed(&wtxn, bucket_count, puts, deletes)?;
            }
        }
        wtxn.commit()?;
        Ok(())
    }

    fn flush_bucketed(
        &self,
        wtxn: &crate::engine::WriteTxn,
        bucket_count: u64,
        puts: BTreeMap<Vec<u8>, Vec<u8>>,
        deletes: BTreeSet<Vec<u8>>,
    ) -> Result<()> {
        let mut puts_by_bucket: HashMap<u64, Vec<(Vec<u8>, Vec<u8>)>> = HashMap::new();
        for (k, v) in puts {
            puts_by_bucket.entry(crate::codec::bucket(&k, bucket_count)).or_default().push((k, v));
        }
        let mut deletes_by_bucket: HashMap<u64, Vec<Vec<u8>>> = HashMap::new();
        for k in deletes {
            deletes_by_bucket.entry(crate::codec::bucket(&k, bucket_count)).or_default().push(k);
        }

        let mut touched: std::collections::BTreeSet<u64> = std::collections::BTreeSet::new();
        touched.extend(puts_by_bucket.keys().copied());
        touched.extend(deletes_by_bucket.keys().copied());

        let keys: Vec<Vec<u8>> = touched.iter().map(|b| bucket_key(*b)).collect();
        let existing = wtxn.get_multi(self.base.name(), &keys)?;
        let existing_by_key: HashMap<Vec<u8>, Vec<u8>> = existing.into_iter().collect();

        for bucket in touched {
            let key = bucket_key(bucket);
            let mut submap = match existing_by_key.get(&key) {
                Some(bytes) => deserialize_submap(bytes)?,
                None => BTreeMap::new(),
            };
            if let Some(puts) = puts_by_bucket.get(&bucket) {
                for (k, v) in puts {
                    submap.insert(k.clone(), v.clone());
                }
            }
            if let Some(dels) = deletes_by_bucket.get(&bucket) {
                for k in dels {
                    submap.remove(k);
                }
            }
            let encoded = serialize_submap(&submap)?;
            wtxn.put(self.base.name(), key, encoded, false)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn env() -> Arc<Environment> {
        let dir = tempdir().unwrap();
        Environment::open(dir.keep(), 0, true, 64).unwrap()
    }

    #[test]
    fn unbucketed_set_get_delete_cycle() {
        let map = KeyValueMap::create_unbucketed(env(), "u", false).unwrap();
        map.set(b"k1", b"v1".to_vec()).unwrap();
        map.flush(false).unwrap();
        assert_eq!(map.get(b"k1").unwrap(), b"v1");
        map.delete(b"k1");
        map.flush(false).unwrap();
        assert!(matches!(map.get(b"k1"), Err(StoreError::NotFound)));
        assert!(!map.contains(b"k1").unwrap());
    }

    #[test]
    fn bucketed_matches_scenario_s6() {
        let map = KeyValueMap::create_bucketed(env(), "s6", 8, false).unwrap();
        // Find two keys that hash to the same bucket.
        let k1 = b"alpha".to_vec();
        let mut k2 = b"beta".to_vec();
        let target_bucket = crate::codec::bucket(&k1, 8);
        while crate::codec::bucket(&k2, 8) != target_bucket {
            k2.push(b'!');
        }
        map.set(&k1, b"v1".to_vec()).unwrap();
        map.set(&k2, b"v2".to_vec()).unwrap();
        map.flush(false).unwrap();
        map.delete(&k1);
        map.flush(false).unwrap();
        assert!(!map.contains(&k1).unwrap());
        assert_eq!(map.get(&k2).unwrap(), b"v2");

        let rtxn = map.base.env().begin_read();
        let page = rtxn.get(map.base.name(), &bucket_key(target_bucket)).unwrap().unwrap();
        let submap = deserialize_submap(&page).unwrap();
        let mut expected = BTreeMap::new();
        expected.insert(k2, b"v2".to_vec());
        assert_eq!(submap, expected);
    }

    #[test]
    fn set_dominates_prior_delete_before_flush() {
        let map = KeyValueMap::create_unbucketed(env(), "dom", false).unwrap();
        map.set(b"k", b"v1".to_vec()).unwrap();
        map.flush(false).unwrap();
        map.delete(b"k");
        map.set(b"k", b"v2".to_vec()).unwrap();
        assert_eq!(map.get(b"k").unwrap(), b"v2");
        map.flush(false).unwrap();
        assert_eq!(map.get(b"k").unwrap(), b"v2");
    }

    #[test]
    fn set_invalidates_a_stale_read_cache_entry() {
        let map = KeyValueMap::create_unbucketed(env(), "stale", false).unwrap();
        map.set(b"k", b"v1".to_vec()).unwrap();
        map.flush(false).unwrap();
        assert_eq!(map.get(b"k").unwrap(), b"v1"); // populates the read cache
        map.set(b"k", b"v2".to_vec()).unwrap();
        assert_eq!(map.get(b"k").unwrap(), b"v2");
        map.flush(false).unwrap();
        assert_eq!(map.get(b"k").unwrap(), b"v2");
    }

    #[test]
    fn set_default_only_sets_when_absent() {
        let map = KeyValueMap::create_unbucketed(env(), "sd", false).unwrap();
        assert!(map.set_default(b"k", b"first".to_vec()).unwrap());
        assert!(!map.set_default(b"k", b"second".to_vec()).unwrap());
        assert_eq!(map.get(b"k").unwrap(), b"first");
    }

    #[test]
    fn negative_cache_never_false_positives() {
        let map = KeyValueMap::create_unbucketed(env(), "neg", false).unwrap();
        assert!(!map.contains(b"missing").unwrap());
        map.set(b"missing", b"now-present".to_vec()).unwrap();
        assert!(map.contains(b"missing").unwrap());
    }

    #[test]
    fn reopen_preserves_map_contents() {
        let dir = tempdir().unwrap();
        let path = dir.keep();
        {
            let env = Environment::open(path.clone(), 0, true, 64).unwrap();
            let map = KeyValueMap::create_bucketed(env, "r", 4, false).unwrap();
            map.set(b"a", b"1".to_vec()).unwrap();
            map.set(b"b", b"2".to_vec()).unwrap();
            map.flush(false).unwrap();
        }
        let env2 = Environment::open(path, 0, true, 64).unwrap();
        let reopened = KeyValueMap::open(env2, "r").unwrap();
        assert_eq!(reopened.get(b"a").unwrap(), b"1");
        assert_eq!(reopened.get(b"b").unwrap(), b"2");
    }
}
