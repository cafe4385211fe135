//! Per-service Merkle Mountain Range engine and bundle verifier (spec §3.6, §4.6, §4.7).
//!
//! Each service owns a sub-[`crate::engine::Environment`] holding five containers —
//! `node_hashes` (a constant-length [`OrderedSequence`] of 16-byte leaf digests),
//! `hash_to_index` and `levels_index` ([`KeyValueMap`]s), and `peaks`/`peaks_start`
//! (variable-length `OrderedSequence`s of tagged optionals) — plus a lazily-created
//! [`KeyValueMap`] per occupied tree level holding that level's internal nodes. The
//! per-level maps are reached the way spec §3.1/§9 describe: a [`Value::Ref`] stored
//! in `levels_index` naming the child container, resolved through this service's own
//! [`ContainerRegistry`] rather than any process-wide ambient state.
//!
//! Hash function: BLAKE2b with a 16-byte digest, applied with **no** domain
//! separation between leaf and internal-node hashing. This reproduces
//! `original_source/merkle.py`'s `kief()` exactly, matching spec §4.6.1 and §9's
//! explicit instruction not to silently correct the open second-preimage issue.
//! Likewise, spec §4.6.1 step 1 appends a leaf to `node_hashes` *before* checking
//! `hash_to_index` for a duplicate — `node_hashes` may end up longer than the number
//! of distinct leaves ever proven, while peaks and proofs only ever reflect the first
//! occurrence. See DESIGN.md for both Open Question resolutions.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;

use blake2::Blake2bVar;
use blake2::digest::{Update, VariableOutput};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::codec::{self, Value, deserialize_submap, serialize_submap};
use crate::engine::Environment;
use crate::errors::{Result, StoreError};
use crate::store::map::KeyValueMap;
use crate::store::registry::ContainerRegistry;
use crate::store::sequence::OrderedSequence;

/// Batch size for `node_hashes` (spec §3.4 constant-length paging).
const NODE_HASHES_BATCH: u64 = 512;
/// Batch size for the tagged-optional `peaks`/`peaks_start` sequences.
const PEAKS_BATCH: u64 = 64;
/// Bucket counts for `hash_to_index`, `levels_index`, and per-level child maps
/// (spec §4.5's bucketing rationale: amortize per-key engine overhead).
const HASH_INDEX_BUCKETS: u64 = 512;
const LEVELS_INDEX_BUCKETS: u64 = 64;
const LEVEL_MAP_BUCKETS: u64 = 512;

const DIGEST_LEN: usize = 16;

/// Computes `H(data)`: BLAKE2b truncated to a 16-byte digest (spec §4.6.1).
#[must_use]
pub fn hash(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Blake2bVar::new(DIGEST_LEN).expect("16 is a valid blake2b output size");
    hasher.update(data);
    let mut out = [0u8; DIGEST_LEN];
    hasher.finalize_variable(&mut out).expect("output buffer is exactly digest_size");
    out
}

/// Computes `H(left || right)` for internal-node hashing (spec §4.6.1).
#[must_use]
pub fn hash2(left: &[u8], right: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Blake2bVar::new(DIGEST_LEN).expect("16 is a valid blake2b output size");
    hasher.update(left);
    hasher.update(right);
    let mut out = [0u8; DIGEST_LEN];
    hasher.finalize_variable(&mut out).expect("output buffer is exactly digest_size");
    out
}

fn to_digest(bytes: Vec<u8>) -> Result<[u8; DIGEST_LEN]> {
    bytes.try_into().map_err(|v: Vec<u8>| StoreError::StoreCorrupt(format!("expected a {DIGEST_LEN}-byte digest, got {} bytes", v.len())))
}

fn start_key(start: u64) -> Vec<u8> {
    start.to_string().into_bytes()
}

fn level_key(level: u32) -> Vec<u8> {
    level.to_string().into_bytes()
}

/// The wire shape of a server-produced inclusion bundle (spec §6.2): digests are
/// hex-encoded so the whole record round-trips through `serde_json` unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bundle {
    pub status: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leaf: Option<String>,
    #[serde(default)]
    pub proof: Vec<(String, bool)>,
    #[serde(default)]
    pub left_roots: Vec<String>,
    #[serde(default)]
    pub right_roots: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_root: Option<String>,
}

impl Bundle {
    fn not_found(detail: &str) -> Self {
        Self { status: 0, detail: Some(detail.to_string()), leaf: None, proof: Vec::new(), left_roots: Vec::new(), right_roots: Vec::new(), global_root: None }
    }
}

/// Pure, stateless client-side verification of a [`Bundle`] (spec §4.6.4, §4.7).
/// Any malformed hex field is treated as a failed verification rather than an error,
/// matching the spec's framing of this as a boolean check.
#[must_use]
pub fn verify(bundle: &Bundle) -> bool {
    if bundle.status != 1 {
        return false;
    }
    let Some(leaf_hex) = bundle.leaf.as_deref() else { return false };
    let Ok(mut h) = hex::decode(leaf_hex) else { return false };

    for (sib_hex, was_left) in &bundle.proof {
        let Ok(sib) = hex::decode(sib_hex) else { return false };
        h = if *was_left { hash2(&sib, &h).to_vec() } else { hash2(&h, &sib).to_vec() };
    }

    if !bundle.left_roots.is_empty() {
        let Ok(mut acc) = hex::decode(&bundle.left_roots[0]) else { return false };
        for r in &bundle.left_roots[1..] {
            let Ok(rb) = hex::decode(r) else { return false };
            acc = hash2(&acc, &rb).to_vec();
        }
        h = hash2(&acc, &h).to_vec();
    }

    for r in &bundle.right_roots {
        let Ok(rb) = hex::decode(r) else { return false };
        h = hash2(&h, &rb).to_vec();
    }

    let Some(gr_hex) = bundle.global_root.as_deref() else { return false };
    let Ok(gr) = hex::decode(gr_hex) else { return false };
    h == gr
}

/// A single service's Merkle Mountain Range state (spec §3.6, §4.6).
pub struct MmrService {
    name: String,
    env: Arc<Environment>,
    node_hashes: Arc<OrderedSequence>,
    hash_to_index: Arc<KeyValueMap>,
    levels_index: Arc<KeyValueMap>,
    peaks: Arc<OrderedSequence>,
    peaks_start: Arc<OrderedSequence>,
    registry: ContainerRegistry,
    level_maps: Mutex<HashMap<u32, Arc<KeyValueMap>>>,
    dirty_levels: Mutex<std::collections::BTreeSet<u32>>,
}

impl MmrService {
    /// Opens (creating containers lazily) the MMR state for `name` inside `env`, the
    /// service's own sub-environment.
    ///
    /// # Errors
    /// Returns an error if any container's sidecar is inconsistent.
    pub fn open(env: Arc<Environment>, name: String) -> Result<Self> {
        let node_hashes = OrderedSequence::create_constant_length(env.clone(), "node_hashes", NODE_HASHES_BATCH, DIGEST_LEN as u64)?;
        let hash_to_index = KeyValueMap::create_bucketed(env.clone(), "hash_to_index", HASH_INDEX_BUCKETS, false)?;
        let levels_index = KeyValueMap::create_bucketed(env.clone(), "levels_index", LEVELS_INDEX_BUCKETS, false)?;
        let peaks = OrderedSequence::create_variable_length(env.clone(), "peaks", PEAKS_BATCH)?;
        let peaks_start = OrderedSequence::create_variable_length(env.clone(), "peaks_start", PEAKS_BATCH)?;
        Ok(Self {
            name,
            env,
            node_hashes,
            hash_to_index,
            levels_index,
            peaks,
            peaks_start,
            registry: ContainerRegistry::new(),
            level_maps: Mutex::new(HashMap::new()),
            dirty_levels: Mutex::new(std::collections::BTreeSet::new()),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn child_level_map(&self, level: u32) -> Result<Arc<KeyValueMap>> {
        if let Some(existing) = self.level_maps.lock().get(&level) {
            self.dirty_levels.lock().insert(level);
            return Ok(existing.clone());
        }
        let child_name = format!("{}__lvl{}", self.name, level);
        let env = self.env.clone();
        let registry_name = child_name.clone();
        let map = self.registry.get_or_open(&registry_name, move || KeyValueMap::create_bucketed(env, &child_name, LEVEL_MAP_BUCKETS, false))?;

        // The top-level `levels_index` points at this child by name; create the
        // pointer the first time this level is touched (spec §3.6, §4.1's rationale
        // for the `r` tag: "to support the MMR's per-level lazy child maps without a
        // second index").
        let key = level_key(level);
        match self.levels_index.get(&key) {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                self.levels_index.set(&key, codec::encode(&Value::Ref(registry_name)))?;
            }
            Err(e) => return Err(e),
        }

        self.level_maps.lock().insert(level, map.clone());
        self.dirty_levels.lock().insert(level);
        Ok(map)
    }

    fn open_level_map_readonly(&self, level: u32) -> Result<Arc<KeyValueMap>> {
        if let Some(existing) = self.level_maps.lock().get(&level) {
            return Ok(existing.clone());
        }
        let key = level_key(level);
        let raw = self.levels_index.get(&key)?;
        let Value::Ref(child_name) = codec::decode(&raw)? else {
            return Err(StoreError::StoreCorrupt(format!("levels_index[{level}] is not a reference")));
        };
        let env = self.env.clone();
        let map = self.registry.get_or_open(&child_name, move || KeyValueMap::open(env, &child_name))?;
        self.level_maps.lock().insert(level, map.clone());
        Ok(map)
    }

    fn ensure_level_slot(&self, level: u32) -> Result<()> {
        while self.peaks.length() <= u64::from(level) {
            self.peaks.append(codec::encode(&Value::Null))?;
            self.peaks_start.append(codec::encode(&Value::Null))?;
        }
        Ok(())
    }

    fn peak_at(&self, level: u32) -> Result<Option<([u8; DIGEST_LEN], u64)>> {
        let root_val = codec::decode(&self.peaks.get(i64::from(level))?)?;
        let start_val = codec::decode(&self.peaks_start.get(i64::from(level))?)?;
        match (root_val, start_val) {
            (Value::Null, Value::Null) => Ok(None),
            (Value::Bytes(root), Value::Int(start)) => Ok(Some((to_digest(root)?, start as u64))),
            _ => Err(StoreError::StoreCorrupt(format!("peaks/peaks_start disagree at level {level}"))),
        }
    }

    fn clear_peak(&self, level: u32) -> Result<()> {
        self.peaks.set(i64::from(level), codec::encode(&Value::Null))?;
        self.peaks_start.set(i64::from(level), codec::encode(&Value::Null))?;
        Ok(())
    }

    fn set_peak(&self, level: u32, root: [u8; DIGEST_LEN], start: u64) -> Result<()> {
        self.peaks.set(i64::from(level), codec::encode(&Value::Bytes(root.to_vec())))?;
        self.peaks_start.set(i64::from(level), codec::encode(&Value::Int(start as i64)))?;
        Ok(())
    }

    /// `(start, root, level)` for every occupied peak, ascending by `start` (spec §4.6.2's
    /// fold order and §4.6.3's peak lookup both need this).
    fn sorted_peaks(&self) -> Result<Vec<(u64, [u8; DIGEST_LEN], u32)>> {
        let peak_slots = self.peaks.iterate()?;
        let start_slots = self.peaks_start.iterate()?;
        let mut out = Vec::new();
        for (level, (root_bytes, start_bytes)) in peak_slots.iter().zip(start_slots.iter()).enumerate() {
            let root_val = codec::decode(root_bytes)?;
            let start_val = codec::decode(start_bytes)?;
            if let (Value::Bytes(root), Value::Int(start)) = (root_val, start_val) {
                out.push((start as u64, to_digest(root)?, level as u32));
            }
        }
        out.sort_by_key(|(start, _, _)| *start);
        Ok(out)
    }

    /// Appends `leaf` (spec §4.6.1). A leaf already present in `hash_to_index` is a
    /// no-op for peaks/proofs, though `node_hashes` still grows (see module docs).
    ///
    /// # Errors
    /// Returns an error if any underlying container operation fails.
    pub fn append(&self, leaf: [u8; DIGEST_LEN]) -> Result<()> {
        let idx = self.node_hashes.length();
        self.node_hashes.append(leaf.to_vec())?;

        match self.hash_to_index.get(&leaf) {
            Ok(_) => return Ok(()),
            Err(StoreError::NotFound) => {}
            Err(e) => return Err(e),
        }
        self.hash_to_index.set(&leaf, codec::encode(&Value::Int(idx as i64)))?;

        let mut level = 0u32;
        let mut root = leaf;
        let mut start = idx;
        self.ensure_level_slot(level)?;

        while let Some((left_root, left_start)) = self.peak_at(level)? {
            self.clear_peak(level)?;
            let (left, right, merged_start) =
                if left_start < start { (left_root, root, left_start) } else { (root, left_root, start) };
            let parent = hash2(&left, &right);

            let next_level = level + 1;
            let child = self.child_level_map(next_level)?;
            child.set(&start_key(merged_start), parent.to_vec())?;

            root = parent;
            start = merged_start;
            level = next_level;
            self.ensure_level_slot(level)?;
        }

        self.set_peak(level, root, start)
    }

    /// Folds the occupied peaks left-to-right by ascending start index into the
    /// service's current global root (spec §4.6.2). Empty when no leaves are present.
    ///
    /// # Errors
    /// Returns an error if the peak sequences cannot be read.
    pub fn global_root(&self) -> Result<Vec<u8>> {
        let peaks = self.sorted_peaks()?;
        let Some((_, first, _)) = peaks.first().copied() else { return Ok(Vec::new()) };
        let mut acc = first;
        for (_, root, _) in &peaks[1..] {
            acc = hash2(&acc, root);
        }
        Ok(acc.to_vec())
    }

    /// Builds the server-side inclusion bundle for `leaf` (spec §4.6.3).
    ///
    /// # Errors
    /// Returns an error if a container read fails; a leaf that was never appended (or
    /// was fully de-duplicated away) is a normal `status: 0` result, not an error.
    pub fn server_inclusion(&self, leaf: [u8; DIGEST_LEN]) -> Result<Bundle> {
        let idx = match self.hash_to_index.get(&leaf) {
            Ok(raw) => match codec::decode(&raw)? {
                Value::Int(i) => i as u64,
                _ => return Err(StoreError::StoreCorrupt("hash_to_index value is not an integer".to_string())),
            },
            Err(StoreError::NotFound) => return Ok(Bundle::not_found("not found")),
            Err(e) => return Err(e),
        };

        let peaks = self.sorted_peaks()?;
        let Some(&(tree_start, _, tree_level)) = peaks.iter().find(|(start, _, level)| {
            let size = 1u64 << level;
            *start <= idx && idx < *start + size
        }) else {
            return Ok(Bundle::not_found("inconsistent"));
        };

        let mut proof = Vec::with_capacity(tree_level as usize);
        let local_idx = idx - tree_start;
        for l in 0..tree_level {
            let block = 1u64 << l;
            let group = local_idx >> l;
            let sib_group = group ^ 1;
            let sib_start = tree_start + sib_group * block;
            let sib_digest = if l == 0 {
                to_digest(self.node_hashes.get(sib_start as i64)?)?
            } else {
                let child = self.open_level_map_readonly(l)?;
                to_digest(child.get(&start_key(sib_start))?)?
            };
            let was_left = sib_group < group;
            proof.push((hex::encode(sib_digest), was_left));
        }

        let left_roots: Vec<String> = peaks.iter().filter(|(start, _, _)| *start < tree_start).map(|(_, r, _)| hex::encode(r)).collect();
        let right_roots: Vec<String> = peaks.iter().filter(|(start, _, _)| *start > tree_start).map(|(_, r, _)| hex::encode(r)).collect();

        Ok(Bundle {
            status: 1,
            detail: None,
            leaf: Some(hex::encode(leaf)),
            proof,
            left_roots,
            right_roots,
            global_root: Some(hex::encode(self.global_root()?)),
        })
    }

    /// Flushes dirty level-child maps, then `node_hashes`, `hash_to_index`,
    /// `levels_index`, `peaks`, `peaks_start`, each in its own write transaction on
    /// this service's sub-environment (spec §4.6.5). Append is monotonic and
    /// replay-safe, so an interrupted flush is simply retried by calling this again.
    ///
    /// # Errors
    /// Returns an error if any container's flush fails.
    pub fn flush(&self) -> Result<()> {
        let levels: Vec<u32> = self.dirty_levels.lock().iter().copied().collect();
        for level in levels {
            if let Some(child) = self.level_maps.lock().get(&level).cloned() {
                child.flush(false)?;
            }
        }
        self.dirty_levels.lock().clear();
        self.node_hashes.flush(false)?;
        self.hash_to_index.flush(false)?;
        self.levels_index.flush(false)?;
        self.peaks.flush(false)?;
        self.peaks_start.flush(false)?;
        Ok(())
    }

    /// The number of entries in `node_hashes`, which may exceed the number of
    /// distinct leaves ever appended (spec §9's dedup-timing open question).
    #[must_use]
    pub fn node_hashes_len(&self) -> u64 {
        self.node_hashes.length()
    }
}

/// The process-global directory of services (spec §3.7): tracks which service names
/// exist and owns the lazily-opened [`MmrService`] handle for each.
pub struct MmrStore {
    base_dir: PathBuf,
    services: Arc<KeyValueMap>,
    open: Mutex<HashMap<String, Arc<MmrService>>>,
}

impl MmrStore {
    /// Opens (creating if absent) the registry environment rooted at `base_dir`.
    ///
    /// # Errors
    /// Returns an error if the registry environment or its `__services` map cannot
    /// be opened.
    pub fn open(base_dir: PathBuf) -> Result<Self> {
        let root_env = Environment::open(base_dir.join("__root"), 0, true, 64)?;
        let services = KeyValueMap::create_unbucketed(root_env, "__services", false)?;
        Ok(Self { base_dir, services, open: Mutex::new(HashMap::new()) })
    }

    /// # Errors
    /// Returns an error if the registry lookup fails.
    pub fn exists(&self, name: &str) -> Result<bool> {
        self.services.contains(name.as_bytes())
    }

    /// Lists every registered service name, in ascending order.
    ///
    /// # Errors
    /// Returns an error if the registry cannot be iterated.
    pub fn list_names(&self) -> Result<Vec<String>> {
        let pairs = self.services.iterate()?;
        pairs
            .into_iter()
            .map(|(k, _)| String::from_utf8(k).map_err(|e| StoreError::StoreCorrupt(format!("service name is not utf-8: {e}"))))
            .collect()
    }

    /// Returns the service's metadata sub-map, decoded via the codec's submap format
    /// (spec §3.7, §4.1).
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the service does not exist.
    pub fn get_meta(&self, name: &str) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        let raw = self.services.get(name.as_bytes())?;
        deserialize_submap(&raw)
    }

    /// Creates the service (if absent) or overwrites its metadata (spec §3.7).
    ///
    /// # Errors
    /// Returns an error if the registry write fails.
    pub fn set_meta(&self, name: &str, meta: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<()> {
        let encoded = serialize_submap(meta)?;
        self.services.set(name.as_bytes(), encoded)?;
        self.services.flush(false)
    }

    /// Opens the service's [`MmrService`] handle, creating its registry entry and
    /// on-disk sub-environment on first use (spec §3.7).
    ///
    /// # Errors
    /// Returns an error if the registry or the service's sub-environment cannot be
    /// opened.
    pub fn open_or_create(&self, name: &str) -> Result<Arc<MmrService>> {
        if let Some(existing) = self.open.lock().get(name) {
            return Ok(existing.clone());
        }
        if !self.exists(name)? {
            self.set_meta(name, &BTreeMap::new())?;
        }
        let env = Environment::open(self.service_dir(name), 0, true, 2048)?;
        let service = Arc::new(MmrService::open(env, name.to_string())?);
        self.open.lock().insert(name.to_string(), service.clone());
        Ok(service)
    }

    fn service_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join("services").join(name)
    }

    /// Tears down a service entirely: drops its open handle, its registry entry, and
    /// its on-disk sub-environment (spec §3.7). The fuzzy-search collaborator that
    /// would also forget the name is out of scope for this crate.
    ///
    /// # Errors
    /// Returns an error if the on-disk directory cannot be removed.
    pub fn delete_service(&self, name: &str) -> Result<()> {
        self.open.lock().remove(name);
        self.services.delete(name.as_bytes());
        self.services.flush(false)?;
        let dir = self.service_dir(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).map_err(StoreError::EngineError)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, MmrStore) {
        let dir = tempdir().unwrap();
        let store = MmrStore::open(dir.path().to_path_buf()).unwrap();
        (dir, store)
    }

    #[test]
    fn scenario_s1_three_leaves() {
        let (_dir, store) = store();
        let svc = store.open_or_create("demo").unwrap();
        for leaf in ["0", "1", "2"] {
            svc.append(hash(leaf.as_bytes())).unwrap();
        }
        svc.flush().unwrap();

        assert_eq!(svc.node_hashes_len(), 3);
        let peaks = svc.sorted_peaks().unwrap();
        let levels: Vec<u32> = peaks.iter().map(|(_, _, l)| *l).collect();
        assert_eq!(levels, vec![0, 1]);
        let level1_start = peaks.iter().find(|(_, _, l)| *l == 1).unwrap().0;
        let level0_start = peaks.iter().find(|(_, _, l)| *l == 0).unwrap().0;
        assert_eq!(level1_start, 0);
        assert_eq!(level0_start, 2);

        let peak_level_1 = hash2(&hash(b"0"), &hash(b"1"));
        let peak_level_0 = hash(b"2");
        let expected_root = hash2(&peak_level_1, &peak_level_0);
        assert_eq!(svc.global_root().unwrap(), expected_root.to_vec());
    }

    #[test]
    fn scenario_s2_inclusion_of_middle_leaf() {
        let (_dir, store) = store();
        let svc = store.open_or_create("demo").unwrap();
        for leaf in ["0", "1", "2"] {
            svc.append(hash(leaf.as_bytes())).unwrap();
        }
        svc.flush().unwrap();

        let bundle = svc.server_inclusion(hash(b"1")).unwrap();
        assert_eq!(bundle.status, 1);
        assert_eq!(bundle.proof, vec![(hex::encode(hash(b"0")), true)]);
        assert!(bundle.left_roots.is_empty());
        assert_eq!(bundle.right_roots, vec![hex::encode(hash(b"2"))]);
        assert!(verify(&bundle));
    }

    #[test]
    fn scenario_s3_not_found() {
        let (_dir, store) = store();
        let svc = store.open_or_create("demo").unwrap();
        for leaf in ["0", "1", "2"] {
            svc.append(hash(leaf.as_bytes())).unwrap();
        }
        svc.flush().unwrap();

        let bundle = svc.server_inclusion(hash(b"nope")).unwrap();
        assert_eq!(bundle.status, 0);
        assert!(!verify(&bundle));
    }

    #[test]
    fn dedup_is_a_noop_for_root_and_proofs() {
        let (_dir, store) = store();
        let svc = store.open_or_create("dedup").unwrap();
        svc.append(hash(b"x")).unwrap();
        svc.append(hash(b"y")).unwrap();
        let root_before = svc.global_root().unwrap();
        svc.append(hash(b"x")).unwrap();
        let root_after = svc.global_root().unwrap();
        assert_eq!(root_before, root_after);
        // node_hashes grows even though the dedup'd append is a no-op above it.
        assert_eq!(svc.node_hashes_len(), 3);
    }

    #[test]
    fn peaks_match_binary_representation_of_length() {
        let (_dir, store) = store();
        let svc = store.open_or_create("binrep").unwrap();
        for n in 1..=20u32 {
            svc.append(hash(&n.to_le_bytes())).unwrap();
            let occupied: std::collections::BTreeSet<u32> = svc.sorted_peaks().unwrap().into_iter().map(|(_, _, l)| l).collect();
            let expected: std::collections::BTreeSet<u32> = (0..32).filter(|h| (n >> h) & 1 == 1).collect();
            assert_eq!(occupied, expected, "after {n} appends");
        }
    }

    #[test]
    fn every_appended_leaf_proves_against_the_global_root() {
        let (_dir, store) = store();
        let svc = store.open_or_create("complete").unwrap();
        let leaves: Vec<[u8; DIGEST_LEN]> = (0..37u32).map(|i| hash(&i.to_le_bytes())).collect();
        for l in &leaves {
            svc.append(*l).unwrap();
        }
        svc.flush().unwrap();
        for l in &leaves {
            let bundle = svc.server_inclusion(*l).unwrap();
            assert!(verify(&bundle), "leaf {l:?} failed to verify");
        }
    }

    #[test]
    fn root_is_stable_across_independent_runs_with_different_flush_points() {
        let leaves: Vec<[u8; DIGEST_LEN]> = (0..13u32).map(|i| hash(&i.to_le_bytes())).collect();

        let dir_a = tempdir().unwrap();
        let store_a = MmrStore::open(dir_a.path().to_path_buf()).unwrap();
        let svc_a = store_a.open_or_create("a").unwrap();
        for l in &leaves {
            svc_a.append(*l).unwrap();
        }
        svc_a.flush().unwrap();

        let dir_b = tempdir().unwrap();
        let store_b = MmrStore::open(dir_b.path().to_path_buf()).unwrap();
        let svc_b = store_b.open_or_create("b").unwrap();
        for (i, l) in leaves.iter().enumerate() {
            svc_b.append(*l).unwrap();
            if i % 3 == 0 {
                svc_b.flush().unwrap();
            }
        }
        svc_b.flush().unwrap();

        assert_eq!(svc_a.global_root().unwrap(), svc_b.global_root().unwrap());
    }

    #[test]
    fn reopen_preserves_root_and_proofs() {
        let dir = tempdir().unwrap();
        let name = "persist";
        let leaves: Vec<[u8; DIGEST_LEN]> = (0..9u32).map(|i| hash(&i.to_le_bytes())).collect();
        {
            let store = MmrStore::open(dir.path().to_path_buf()).unwrap();
            let svc = store.open_or_create(name).unwrap();
            for l in &leaves {
                svc.append(*l).unwrap();
            }
            svc.flush().unwrap();
        }
        let store2 = MmrStore::open(dir.path().to_path_buf()).unwrap();
        assert!(store2.exists(name).unwrap());
        let svc2 = store2.open_or_create(name).unwrap();
        assert_eq!(svc2.node_hashes_len(), 9);
        for l in &leaves {
            let bundle = svc2.server_inclusion(*l).unwrap();
            assert!(verify(&bundle));
        }
    }

    #[test]
    fn delete_service_removes_registry_entry_and_directory() {
        let (_dir, store) = store();
        let svc = store.open_or_create("gone").unwrap();
        svc.append(hash(b"x")).unwrap();
        svc.flush().unwrap();
        store.delete_service("gone").unwrap();
        assert!(!store.exists("gone").unwrap());
    }

    #[test]
    fn set_meta_overwrite_is_visible_through_a_prior_read_cache_hit() {
        let (_dir, store) = store();
        let mut m1 = BTreeMap::new();
        m1.insert(b"owner".to_vec(), b"alice".to_vec());
        store.set_meta("svc", &m1).unwrap();
        assert_eq!(store.get_meta("svc").unwrap(), m1); // populates __services' read cache

        let mut m2 = BTreeMap::new();
        m2.insert(b"owner".to_vec(), b"bob".to_vec());
        store.set_meta("svc", &m2).unwrap();
        assert_eq!(store.get_meta("svc").unwrap(), m2);
    }
}
