//! OrderedSequence: an append-only, densely-indexed sequence of byte strings with
//! three physical layouts (spec §3.4, §4.4).

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::Environment;
use crate::errors::{Result, StoreError};
use crate::store::container::{ContainerBase, Kind, Stat};

/// The physical layout an [`OrderedSequence`] was created with; persisted in its
/// sidecar and reconstructed unchanged on reopen (spec §3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Unbatched,
    ConstantLength { batch_size: u64, item_len: u64 },
    VariableLength { batch_size: u64 },
}

impl Layout {
    fn to_stat(self, length: u64) -> Stat {
        match self {
            Self::Unbatched => Stat { length, kind: Kind::Sequence, batching: false, batch_size: 0, max_item_len: 0, constant_length: false },
            Self::ConstantLength { batch_size, item_len } => Stat {
                length,
                kind: Kind::Sequence,
                batching: true,
                batch_size,
                max_item_len: item_len,
                constant_length: true,
            },
            Self::VariableLength { batch_size } => {
                Stat { length, kind: Kind::Sequence, batching: true, batch_size, max_item_len: 0, constant_length: false }
            }
        }
    }

    fn from_stat(stat: Stat) -> Result<Self> {
        if stat.kind != Kind::Sequence {
            return Err(StoreError::StoreCorrupt("sidecar kind is not sequence".to_string()));
        }
        if !stat.batching {
            Ok(Self::Unbatched)
        } else if stat.constant_length {
            Ok(Self::ConstantLength { batch_size: stat.batch_size, item_len: stat.max_item_len })
        } else {
            Ok(Self::VariableLength { batch_size: stat.batch_size })
        }
    }
}

fn page_key(page_idx: u64) -> Vec<u8> {
    page_idx.to_le_bytes().to_vec()
}

struct State {
    persisted_len: u64,
    append_buffer: Vec<Vec<u8>>,
    overwrites: BTreeMap<u64, Vec<u8>>,
    page_cache: lru::LruCache<u64, Vec<u8>>,
}

impl State {
    fn new(persisted_len: u64) -> Self {
        Self {
            persisted_len,
            append_buffer: Vec::new(),
            overwrites: BTreeMap::new(),
            page_cache: lru::LruCache::new(std::num::NonZeroUsize::new(64).expect("64 != 0")),
        }
    }
}

/// An append-only indexed sequence of byte strings (spec §3.4, §4.4, §6.2).
///
/// Constructors return `Arc<Self>`: a threaded [`Self::flush`] upgrades an internal
/// `Weak` back to a strong handle so the background worker can outlive the call that
/// spawned it, without requiring every caller to thread `Arc` clones through the API.
pub struct OrderedSequence {
    base: ContainerBase,
    layout: Layout,
    state: Mutex<State>,
    self_weak: std::sync::Weak<Self>,
}

impl OrderedSequence {
    /// Creates (or reopens, verifying the layout matches) a constant-length sequence.
    ///
    /// # Errors
    /// Returns an error if the container exists with an incompatible layout.
    pub fn create_constant_length(
        env: Arc<Environment>,
        name: &str,
        batch_size: u64,
        item_len: u64,
    ) -> Result<Arc<Self>> {
        Self::open_with_default(env, name, Layout::ConstantLength { batch_size, item_len })
    }

    /// Creates (or reopens) a variable-length batched sequence.
    ///
    /// # Errors
    /// Returns an error if the container exists with an incompatible layout.
    pub fn create_variable_length(env: Arc<Environment>, name: &str, batch_size: u64) -> Result<Arc<Self>> {
        Self::open_with_default(env, name, Layout::VariableLength { batch_size })
    }

    /// Creates (or reopens) an unbatched, one-page-per-element sequence.
    ///
    /// # Errors
    /// Returns an error if the container exists with an incompatible layout.
    pub fn create_unbatched(env: Arc<Environment>, name: &str) -> Result<Arc<Self>> {
        Self::open_with_default(env, name, Layout::Unbatched)
    }

    fn open_with_default(env: Arc<Environment>, name: &str, layout: Layout) -> Result<Arc<Self>> {
        let base = ContainerBase::open_or_create(env, name, layout.to_stat(0))?;
        let stat = base.read_stat()?;
        let actual_layout = Layout::from_stat(stat)?;
        if actual_layout != layout {
            return Err(StoreError::StoreCorrupt(format!(
                "sequence {name} reopened with a different layout than persisted"
            )));
        }
        Ok(Arc::new_cyclic(|weak| Self {
            base,
            layout,
            state: Mutex::new(State::new(stat.length)),
            self_weak: weak.clone(),
        }))
    }

    /// Reopens an existing sequence by name alone, recovering its layout from the sidecar.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownName`] if no sidecar exists for `name`.
    pub fn open(env: Arc<Environment>, name: &str) -> Result<Arc<Self>> {
        let base = ContainerBase::open(env, name)?;
        let stat = base.read_stat()?;
        let layout = Layout::from_stat(stat)?;
        Ok(Arc::new_cyclic(|weak| Self {
            base,
            layout,
            state: Mutex::new(State::new(stat.length)),
            self_weak: weak.clone(),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.base.name()
    }

    #[must_use]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Enqueues `value` for append. Never touches the engine.
    ///
    /// # Errors
    /// Returns [`StoreError::BadLength`] if the layout is constant-length and `value`
    /// is not exactly `L` bytes.
    pub fn append(&self, value: Vec<u8>) -> Result<()> {
        if let Layout::ConstantLength { item_len, .. } = self.layout
            && value.len() as u64 != item_len
        {
            return Err(StoreError::BadLength { expected: item_len as usize, actual: value.len() });
        }
        self.state.lock().append_buffer.push(value);
        Ok(())
    }

    fn normalize_index(&self, index: i64, len: u64) -> Result<u64> {
        let resolved = if index < 0 { index + len as i64 } else { index };
        if resolved < 0 || resolved as u64 >= len {
            return Err(StoreError::OutOfRange { index, length: len as usize });
        }
        Ok(resolved as u64)
    }

    /// Overwrites the value at `index`. No deletion or insertion is supported.
    ///
    /// # Errors
    /// Returns [`StoreError::OutOfRange`] if out of bounds, or [`StoreError::BadLength`]
    /// for a constant-length sequence given a value of the wrong size.
    pub fn set(&self, index: i64, value: Vec<u8>) -> Result<()> {
        if let Layout::ConstantLength { item_len, .. } = self.layout
            && value.len() as u64 != item_len
        {
            return Err(StoreError::BadLength { expected: item_len as usize, actual: value.len() });
        }
        let mut state = self.state.lock();
        let len = state.persisted_len + state.append_buffer.len() as u64;
        let idx = self.normalize_index(index, len)?;
        if idx >= state.persisted_len {
            let offset = (idx - state.persisted_len) as usize;
            state.append_buffer[offset] = value;
        } else {
            state.overwrites.insert(idx, value);
        }
        Ok(())
    }

    /// Returns the element at `index` (negative indices fold from the end).
    ///
    /// # Errors
    /// Returns [`StoreError::OutOfRange`] if out of bounds, or an engine/codec error
    /// if a persisted page cannot be read.
    pub fn get(&self, index: i64) -> Result<Vec<u8>> {
        let mut state = self.state.lock();
        let len = state.persisted_len + state.append_buffer.len() as u64;
        let idx = self.normalize_index(index, len)?;
        if let Some(v) = state.overwrites.get(&idx) {
            return Ok(v.clone());
        }
        if idx >= state.persisted_len {
            let offset = (idx - state.persisted_len) as usize;
            return Ok(state.append_buffer[offset].clone());
        }
        self.read_persisted(&mut state, idx)
    }

    fn read_persisted(&self, state: &mut State, idx: u64) -> Result<Vec<u8>> {
        match self.layout {
            Layout::Unbatched => {
                let rtxn = self.base.env().begin_read();
                rtxn.get(self.base.name(), &page_key(idx))?
                    .ok_or_else(|| StoreError::StoreCorrupt(format!("missing unbatched element {idx}")))
            }
            Layout::ConstantLength { batch_size, item_len } => {
                let page_no = idx / batch_size;
                let slot = (idx % batch_size) as usize;
                let bytes = self.load_page(state, page_no)?;
                let start = slot * item_len as usize;
                let end = start + item_len as usize;
                bytes
                    .get(start..end)
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| StoreError::StoreCorrupt(format!("page {page_no} too short for slot {slot}")))
            }
            Layout::VariableLength { batch_size } => {
                let page_no = idx / batch_size;
                let slot = (idx % batch_size) as usize;
                let bytes = self.load_page(state, page_no)?;
                let (offsets, body) = parse_var_page(&bytes, batch_size)?;
                let start = *offsets.get(slot).ok_or_else(|| StoreError::StoreCorrupt("slot beyond header".to_string()))?;
                let end = *offsets
                    .get(slot + 1)
                    .ok_or_else(|| StoreError::StoreCorrupt("slot beyond header".to_string()))?;
                body.get(start as usize..end as usize)
                    .map(<[u8]>::to_vec)
                    .ok_or_else(|| StoreError::StoreCorrupt(format!("page {page_no} body too short for slot {slot}")))
            }
        }
    }

    fn load_page(&self, state: &mut State, page_no: u64) -> Result<Vec<u8>> {
        if let Some(bytes) = state.page_cache.get(&page_no) {
            return Ok(bytes.clone());
        }
        let rtxn = self.base.env().begin_read();
        let bytes = rtxn
            .get(self.base.name(), &page_key(page_no))?
            .ok_or_else(|| StoreError::StoreCorrupt(format!("missing page {page_no}")))?;
        state.page_cache.put(page_no, bytes.clone());
        Ok(bytes)
    }

    /// Returns the visible length: persisted elements plus the pending append buffer.
    #[must_use]
    pub fn length(&self) -> u64 {
        let state = self.state.lock();
        state.persisted_len + state.append_buffer.len() as u64
    }

    /// Materializes every visible element in index order.
    ///
    /// Note: unlike a production lazy iterator that would own a read transaction for
    /// its whole lifetime (spec §9's design note on coroutine-style iteration), this
    /// eagerly collects into a `Vec` — simpler to reason about without a compiler in
    /// the loop, at the cost of buffering the whole sequence in memory. See DESIGN.md.
    ///
    /// # Errors
    /// Returns an error if a persisted page cannot be read.
    pub fn iterate(&self) -> Result<Vec<Vec<u8>>> {
        let len = self.length();
        let mut out = Vec::with_capacity(len as usize);
        for i in 0..len {
            out.push(self.get(i as i64)?);
        }
        Ok(out)
    }

    /// Flushes the append buffer and any pending overwrites (spec §4.4 flush algorithm).
    ///
    /// If `threaded`, the flush runs on a single background worker (any previous
    /// worker for this container is joined first, per spec §4.3/§5); otherwise it runs
    /// inline on the caller after joining any prior worker.
    ///
    /// # Errors
    /// Returns an error if the underlying write transaction or sidecar update fails, or
    /// if `threaded` is requested on a sequence with no surviving `Arc` handle elsewhere.
    pub fn flush(&self, threaded: bool) -> Result<()> {
        if threaded {
            let seq = self
                .self_weak
                .upgrade()
                .ok_or_else(|| StoreError::StoreCorrupt(format!("sequence {} has no live Arc handle to flush from", self.name())))?;
            self.base.run_flush(true, move || seq.flush_inline())
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
        if state.append_buffer.is_empty() && state.overwrites.is_empty() {
            return Ok(());
        }
        let appended = std::mem::take(&mut state.append_buffer);
        let overwrites = std::mem::take(&mut state.overwrites);
        let old_persisted_len = state.persisted_len;
        let new_persisted_len = old_persisted_len + appended.len() as u64;

        let wtxn = self.base.env().begin_write();
        match self.layout {
            Layout::Unbatched => {
                if !appended.is_empty() {
                    let items: Vec<(Vec<u8>, Vec<u8>)> = appended
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| (page_key(old_persisted_len + i as u64), v))
                        .collect();
                    wtxn.put_multi(self.base.name(), items, true)?;
                }
                for (idx, value) in overwrites {
                    wtxn.put(self.base.name(), page_key(idx), value, false)?;
                }
            }
            Layout::ConstantLength { batch_size, item_len } => {
                self.flush_constant(&wtxn, &mut state, old_persisted_len, appended, overwrites, batch_size, item_len)?;
            }
            Layout::VariableLength { batch_size } => {
                self.flush_variable(&wtxn, &mut state, old_persisted_len, appended, overwrites, batch_size)?;
            }
        }
        wtxn.commit()?;
        state.persisted_len = new_persisted_len;
        drop(state);
        self.base.write_stat(&self.layout.to_stat(new_persisted_len))?;
        Ok(())
    }

    /// Flush step for constant-length paged layout: `B` elements of exactly `L` bytes
    /// concatenated per page (spec §3.4, §4.4).
    #[allow(clippy::too_many_arguments)]
    fn flush_constant(
        &self,
        wtxn: &crate::engine::WriteTxn,
        state: &mut State,
        old_persisted_len: u64,
        appended: Vec<Vec<u8>>,
        overwrites: BTreeMap<u64, Vec<u8>>,
        batch_size: u64,
        item_len: u64,
    ) -> Result<()> {
        let l = item_len as usize;
        let mut page = old_persisted_len / batch_size;
        let offset_in_page = (old_persisted_len % batch_size) as usize;
        let mut tail: Vec<u8> = if offset_in_page > 0 { self.load_page(state, page)? } else { Vec::new() };
        let mut written: HashMap<u64, Vec<u8>> = HashMap::new();
        let mut first_emit = true;

        for value in appended {
            tail.extend_from_slice(&value);
            if tail.len() == batch_size as usize * l {
                wtxn.put(self.base.name(), page_key(page), tail.clone(), !first_emit)?;
                written.insert(page, tail.clone());
                state.page_cache.put(page, tail.clone());
                first_emit = false;
                page += 1;
                tail.clear();
            }
        }
        if !tail.is_empty() {
            wtxn.put(self.base.name(), page_key(page), tail.clone(), !first_emit)?;
            written.insert(page, tail.clone());
            state.page_cache.put(page, tail);
        }

        for (idx, value) in overwrites {
            let p = idx / batch_size;
            let slot = (idx % batch_size) as usize;
            let mut bytes = if let Some(existing) = written.get(&p) { existing.clone() } else { self.load_page(state, p)? };
            let start = slot * l;
            if bytes.len() < start + l {
                bytes.resize(start + l, 0);
            }
            bytes[start..start + l].copy_from_slice(&value);
            wtxn.put(self.base.name(), page_key(p), bytes.clone(), false)?;
            written.insert(p, bytes.clone());
            state.page_cache.put(p, bytes);
        }
        Ok(())
    }

    /// Flush step for variable-length paged layout: a `(B+1)`-entry cumulative-offset
    /// header followed by concatenated element bodies (spec §3.4, §4.4).
    #[allow(clippy::too_many_arguments)]
    fn flush_variable(
        &self,
        wtxn: &crate::engine::WriteTxn,
        state: &mut State,
        old_persisted_len: u64,
        appended: Vec<Vec<u8>>,
        overwrites: BTreeMap<u64, Vec<u8>>,
        batch_size: u64,
    ) -> Result<()> {
        let mut page = old_persisted_len / batch_size;
        let offset_in_page = old_persisted_len % batch_size;
        let (mut offsets, mut body) = if offset_in_page > 0 {
            let bytes = self.load_page(state, page)?;
            let (all_offsets, all_body) = parse_var_page(&bytes, batch_size)?;
            let real_len = all_offsets[offset_in_page as usize] as usize;
            (all_offsets[..=offset_in_page as usize].to_vec(), all_body[..real_len].to_vec())
        } else {
            (vec![0u64], Vec::new())
        };
        let mut slot_count = offset_in_page;
        let mut written: HashMap<u64, Vec<u8>> = HashMap::new();
        let mut real_counts: HashMap<u64, u64> = HashMap::new();
        let mut first_emit = true;

        for value in appended {
            let running = *offsets.last().expect("offsets always non-empty");
            offsets.push(running + value.len() as u64);
            body.extend_from_slice(&value);
            slot_count += 1;
            if slot_count == batch_size {
                let bytes = encode_var_page(&offsets, &body, batch_size);
                wtxn.put(self.base.name(), page_key(page), bytes.clone(), !first_emit)?;
                written.insert(page, bytes.clone());
                real_counts.insert(page, slot_count);
                state.page_cache.put(page, bytes);
                first_emit = false;
                page += 1;
                offsets = vec![0];
                body = Vec::new();
                slot_count = 0;
            }
        }
        if slot_count > 0 {
            let bytes = encode_var_page(&offsets, &body, batch_size);
            wtxn.put(self.base.name(), page_key(page), bytes.clone(), !first_emit)?;
            written.insert(page, bytes.clone());
            real_counts.insert(page, slot_count);
            state.page_cache.put(page, bytes);
        }

        let mut by_page: BTreeMap<u64, Vec<(u64, Vec<u8>)>> = BTreeMap::new();
        for (idx, value) in overwrites {
            by_page.entry(idx / batch_size).or_default().push((idx % batch_size, value));
        }
        for (p, slots) in by_page {
            let bytes = if let Some(existing) = written.get(&p) { existing.clone() } else { self.load_page(state, p)? };
            let (page_offsets, page_body) = parse_var_page(&bytes, batch_size)?;
            let real_count = real_counts.get(&p).copied().unwrap_or_else(|| {
                if p == old_persisted_len / batch_size && old_persisted_len % batch_size != 0 {
                    old_persisted_len % batch_size
                } else {
                    batch_size
                }
            });
            let mut elements: Vec<Vec<u8>> = (0..real_count as usize)
                .map(|k| page_body[page_offsets[k] as usize..page_offsets[k + 1] as usize].to_vec())
                .collect();
            for (slot, value) in slots {
                elements[slot as usize] = value;
            }
            let mut new_offsets = vec![0u64];
            let mut new_body = Vec::new();
            for el in &elements {
                let running = *new_offsets.last().expect("non-empty");
                new_offsets.push(running + el.len() as u64);
                new_body.extend_from_slice(el);
            }
            let new_bytes = encode_var_page(&new_offsets, &new_body, batch_size);
            wtxn.put(self.base.name(), page_key(p), new_bytes.clone(), false)?;
            written.insert(p, new_bytes.clone());
            state.page_cache.put(p, new_bytes);
        }
        Ok(())
    }
}

/// Parses a variable-length page's full `(B+1)`-entry header and body.
fn parse_var_page(bytes: &[u8], batch_size: u64) -> Result<(Vec<u64>, Vec<u8>)> {
    let header_len = (batch_size as usize + 1) * 8;
    if bytes.len() < header_len {
        return Err(StoreError::StoreCorrupt("variable-length page shorter than its header".to_string()));
    }
    let mut offsets = Vec::with_capacity(batch_size as usize + 1);
    for chunk in bytes[..header_len].chunks_exact(8) {
        offsets.push(u64::from_le_bytes(chunk.try_into().expect("8-byte chunk")));
    }
    let body = bytes[header_len..].to_vec();
    Ok((offsets, body))
}

/// Encodes a variable-length page: the offsets header padded (by repeating the final
/// cumulative offset) out to `batch_size + 1` entries, followed by the body bytes.
fn encode_var_page(offsets: &[u64], body: &[u8], batch_size: u64) -> Vec<u8> {
    let mut padded = offsets.to_vec();
    let last = *padded.last().unwrap_or(&0);
    while padded.len() < batch_size as usize + 1 {
        padded.push(last);
    }
    let mut out = Vec::with_capacity(padded.len() * 8 + body.len());
    for o in &padded {
        out.extend_from_slice(&o.to_le_bytes());
    }
    out.extend_from_slice(body);
    out
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
    fn constant_length_matches_scenario_s4() {
        let seq = OrderedSequence::create_constant_length(env(), "s4", 4, 6).unwrap();
        for v in ["aaaaaa", "bbbbbb", "cccccc", "dddddd", "eeeeee"] {
            seq.append(v.as_bytes().to_vec()).unwrap();
        }
        seq.flush(false).unwrap();
        assert_eq!(seq.get(3).unwrap(), b"dddddd");
        assert_eq!(seq.get(4).unwrap(), b"eeeeee");
        assert_eq!(seq.length(), 5);
    }

    #[test]
    fn variable_length_matches_scenario_s5() {
        let seq = OrderedSequence::create_variable_length(env(), "s5", 2).unwrap();
        for v in ["x", "yy", "zzz"] {
            seq.append(v.as_bytes().to_vec()).unwrap();
        }
        seq.flush(false).unwrap();
        assert_eq!(seq.get(0).unwrap(), b"x");
        assert_eq!(seq.get(1).unwrap(), b"yy");
        assert_eq!(seq.get(2).unwrap(), b"zzz");
        assert_eq!(seq.length(), 3);
    }

    #[test]
    fn unbatched_round_trips() {
        let seq = OrderedSequence::create_unbatched(env(), "u1").unwrap();
        for v in ["one", "two", "three"] {
            seq.append(v.as_bytes().to_vec()).unwrap();
        }
        seq.flush(false).unwrap();
        assert_eq!(seq.iterate().unwrap(), vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]);
    }

    #[test]
    fn overwrite_after_flush_is_visible_and_isolated() {
        let seq = OrderedSequence::create_constant_length(env(), "ov", 4, 3).unwrap();
        for v in ["aaa", "bbb", "ccc", "ddd", "eee", "fff"] {
            seq.append(v.as_bytes().to_vec()).unwrap();
        }
        seq.flush(false).unwrap();
        seq.set(1, b"XXX".to_vec()).unwrap();
        seq.set(4, b"YYY".to_vec()).unwrap();
        seq.flush(false).unwrap();
        assert_eq!(seq.get(0).unwrap(), b"aaa");
        assert_eq!(seq.get(1).unwrap(), b"XXX");
        assert_eq!(seq.get(2).unwrap(), b"ccc");
        assert_eq!(seq.get(3).unwrap(), b"ddd");
        assert_eq!(seq.get(4).unwrap(), b"YYY");
        assert_eq!(seq.get(5).unwrap(), b"fff");
    }

    #[test]
    fn variable_length_overwrite_across_flushes() {
        let seq = OrderedSequence::create_variable_length(env(), "ovv", 2).unwrap();
        for v in ["a", "bb", "ccc", "d"] {
            seq.append(v.as_bytes().to_vec()).unwrap();
        }
        seq.flush(false).unwrap();
        seq.set(2, b"ZZZZZ".to_vec()).unwrap();
        seq.flush(false).unwrap();
        assert_eq!(seq.get(0).unwrap(), b"a");
        assert_eq!(seq.get(1).unwrap(), b"bb");
        assert_eq!(seq.get(2).unwrap(), b"ZZZZZ");
        assert_eq!(seq.get(3).unwrap(), b"d");
    }

    #[test]
    fn reopen_preserves_length_and_elements() {
        let dir = tempdir().unwrap();
        let path = dir.keep();
        {
            let env = Environment::open(path.clone(), 0, true, 64).unwrap();
            let seq = OrderedSequence::create_variable_length(env, "r1", 3).unwrap();
            for v in ["hello", "world", "!"] {
                seq.append(v.as_bytes().to_vec()).unwrap();
            }
            seq.flush(false).unwrap();
        }
        let env2 = Environment::open(path, 0, true, 64).unwrap();
        let reopened = OrderedSequence::open(env2, "r1").unwrap();
        assert_eq!(reopened.length(), 3);
        assert_eq!(reopened.iterate().unwrap(), vec![b"hello".to_vec(), b"world".to_vec(), b"!".to_vec()]);
    }

    #[test]
    fn negative_index_folds_from_end() {
        let seq = OrderedSequence::create_unbatched(env(), "neg").unwrap();
        for v in ["a", "b", "c"] {
            seq.append(v.as_bytes().to_vec()).unwrap();
        }
        seq.flush(false).unwrap();
        assert_eq!(seq.get(-1).unwrap(), b"c");
        assert_eq!(seq.get(-3).unwrap(), b"a");
        assert!(seq.get(-4).is_err());
    }

    #[test]
    fn out_of_range_is_rejected() {
        let seq = OrderedSequence::create_unbatched(env(), "oor").unwrap();
        seq.append(b"x".to_vec()).unwrap();
        assert!(matches!(seq.get(5), Err(StoreError::OutOfRange { .. })));
    }

    #[test]
    fn constant_length_rejects_wrong_size_value() {
        let seq = OrderedSequence::create_constant_length(env(), "bad", 4, 3).unwrap();
        assert!(matches!(seq.append(b"ab".to_vec()), Err(StoreError::BadLength { .. })));
    }
}
