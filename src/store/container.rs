//! Shared container lifecycle: sidecar metadata and cooperative flush orchestration
//! (spec §4.3). Generalizes the teacher's join-before-replace background flush
//! pattern (`StoredObject::flush_buffer` / `wait_for_flush` in the Python original,
//! reproduced here in the teacher's own idiom of an `Option<JoinHandle<_>>` guarded
//! by a `parking_lot::Mutex`).

use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Mutex, RwLock};

use crate::engine::Environment;
use crate::errors::{Result, StoreError};

/// Container kind tag persisted in the sidecar (spec §3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Sequence = 1,
    Map = 2,
}

impl Kind {
    #[must_use]
    pub const fn tag(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Sequence),
            2 => Some(Self::Map),
            _ => None,
        }
    }
}

/// Persisted container metadata (spec §3.3): logical length (sequences only), kind,
/// batching configuration, max item length, and whether elements are constant-length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stat {
    pub length: u64,
    pub kind: Kind,
    pub batching: bool,
    pub batch_size: u64,
    pub max_item_len: u64,
    pub constant_length: bool,
}

const FIELD_LENGTH: &[u8] = b"length";
const FIELD_KIND: &[u8] = b"kind";
const FIELD_BATCHING: &[u8] = b"batching";
const FIELD_BATCH_SIZE: &[u8] = b"batch_size";
const FIELD_MAX_ITEM_LEN: &[u8] = b"max_item_len";
const FIELD_CONSTANT_LENGTH: &[u8] = b"constant_length";

impl Stat {
    fn to_fields(self) -> Vec<(Vec<u8>, Vec<u8>)> {
        vec![
            (FIELD_LENGTH.to_vec(), self.length.to_string().into_bytes()),
            (FIELD_KIND.to_vec(), vec![self.kind.tag()]),
            (FIELD_BATCHING.to_vec(), vec![u8::from(self.batching)]),
            (FIELD_BATCH_SIZE.to_vec(), self.batch_size.to_string().into_bytes()),
            (FIELD_MAX_ITEM_LEN.to_vec(), self.max_item_len.to_string().into_bytes()),
            (FIELD_CONSTANT_LENGTH.to_vec(), vec![u8::from(self.constant_length)]),
        ]
    }

    fn from_fields(fields: &std::collections::HashMap<Vec<u8>, Vec<u8>>) -> Result<Self> {
        let get_u64 = |name: &[u8]| -> Result<u64> {
            let bytes = fields.get(name).ok_or_else(|| {
                StoreError::StoreCorrupt(format!("sidecar missing field {:?}", String::from_utf8_lossy(name)))
            })?;
            std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| s.parse::<u64>().ok())
                .ok_or_else(|| StoreError::StoreCorrupt(format!("sidecar field {:?} not an integer", String::from_utf8_lossy(name))))
        };
        let get_bool = |name: &[u8]| -> Result<bool> {
            let bytes = fields.get(name).ok_or_else(|| {
                StoreError::StoreCorrupt(format!("sidecar missing field {:?}", String::from_utf8_lossy(name)))
            })?;
            Ok(bytes.first().copied().unwrap_or(0) != 0)
        };
        let kind_byte = fields
            .get(FIELD_KIND)
            .and_then(|b| b.first().copied())
            .ok_or_else(|| StoreError::StoreCorrupt("sidecar missing field kind".to_string()))?;
        let kind = Kind::from_tag(kind_byte)
            .ok_or_else(|| StoreError::StoreCorrupt(format!("sidecar has unknown kind tag {kind_byte}")))?;
        Ok(Self {
            length: get_u64(FIELD_LENGTH)?,
            kind,
            batching: get_bool(FIELD_BATCHING)?,
            batch_size: get_u64(FIELD_BATCH_SIZE)?,
            max_item_len: get_u64(FIELD_MAX_ITEM_LEN)?,
            constant_length: get_bool(FIELD_CONSTANT_LENGTH)?,
        })
    }
}

/// Shared base for [`crate::store::sequence::OrderedSequence`] and
/// [`crate::store::map::KeyValueMap`]: environment handle, sidecar accessors, and
/// at-most-one background flush worker (spec §4.3).
pub struct ContainerBase {
    env: Arc<Environment>,
    name: String,
    sidecar_name: String,
    stat_cache: RwLock<Option<Stat>>,
    flush_handle: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl ContainerBase {
    /// Opens the data sub-database and sidecar for `name`, writing `stat` if the
    /// sidecar does not yet exist (first creation), or verifying consistency against
    /// the persisted `stat` otherwise.
    ///
    /// # Errors
    /// Returns an error if the sub-databases cannot be opened or the sidecar is
    /// inconsistent.
    pub fn open_or_create(env: Arc<Environment>, name: &str, default_stat: Stat) -> Result<Self> {
        let sidecar_name = format!("{name}__stat");
        env.open_subdb(name, true, false)?;
        env.open_subdb(&sidecar_name, true, false)?;
        let base = Self { env, name: name.to_string(), sidecar_name, stat_cache: RwLock::new(None), flush_handle: Mutex::new(None) };
        let existing = base.try_read_stat()?;
        match existing {
            Some(stat) => {
                *base.stat_cache.write() = Some(stat);
            }
            None => {
                base.write_stat(&default_stat)?;
            }
        }
        Ok(base)
    }

    /// Opens an existing container by name, failing if its sidecar is absent.
    ///
    /// # Errors
    /// Returns [`StoreError::UnknownName`] if no sidecar exists for `name`.
    pub fn open(env: Arc<Environment>, name: &str) -> Result<Self> {
        let sidecar_name = format!("{name}__stat");
        env.open_subdb(name, true, false)?;
        env.open_subdb(&sidecar_name, true, false)?;
        let base = Self { env, name: name.to_string(), sidecar_name, stat_cache: RwLock::new(None), flush_handle: Mutex::new(None) };
        let stat = base
            .try_read_stat()?
            .ok_or_else(|| StoreError::UnknownName(name.to_string()))?;
        *base.stat_cache.write() = Some(stat);
        Ok(base)
    }

    #[must_use]
    pub fn env(&self) -> &Arc<Environment> {
        &self.env
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn sidecar_name(&self) -> &str {
        &self.sidecar_name
    }

    fn try_read_stat(&self) -> Result<Option<Stat>> {
        let rtxn = self.env.begin_read();
        let pairs = rtxn.iternext(&self.sidecar_name)?;
        if pairs.is_empty() {
            return Ok(None);
        }
        let fields: std::collections::HashMap<Vec<u8>, Vec<u8>> = pairs.into_iter().collect();
        Stat::from_fields(&fields).map(Some)
    }

    /// Returns the cached sidecar metadata, populating the cache from the engine if empty.
    ///
    /// # Errors
    /// Returns an error if the sidecar is missing or unparseable.
    pub fn read_stat(&self) -> Result<Stat> {
        if let Some(stat) = *self.stat_cache.read() {
            return Ok(stat);
        }
        let stat = self
            .try_read_stat()?
            .ok_or_else(|| StoreError::StoreCorrupt(format!("sidecar for {} vanished", self.name)))?;
        *self.stat_cache.write() = Some(stat);
        Ok(stat)
    }

    /// Writes `stat` to the sidecar sub-database if it differs from the cached value.
    ///
    /// # Errors
    /// Returns an error if the write transaction fails to commit.
    pub fn write_stat(&self, stat: &Stat) -> Result<()> {
        if *self.stat_cache.read() == Some(*stat) {
            return Ok(());
        }
        let wtxn = self.env.begin_write();
        wtxn.put_multi(&self.sidecar_name, stat.to_fields(), false)?;
        wtxn.commit()?;
        *self.stat_cache.write() = Some(*stat);
        Ok(())
    }

    /// Runs `flush_fn` to completion, honoring spec §4.3/§5's cooperative flush
    /// discipline: if a prior background flush is outstanding, it is joined first;
    /// then the new flush either runs inline or is handed to exactly one new worker.
    ///
    /// # Errors
    /// Returns an error if a prior background flush panicked or failed, or if an
    /// inline flush fails.
    pub fn run_flush(&self, threaded: bool, flush_fn: impl FnOnce() -> Result<()> + Send + 'static) -> Result<()> {
        self.wait_for_flush()?;
        if threaded {
            let mut guard = self.flush_handle.lock();
            *guard = Some(std::thread::spawn(flush_fn));
            Ok(())
        } else {
            flush_fn()
        }
    }

    /// Blocks until any in-flight background flush completes, surfacing its result.
    ///
    /// # Errors
    /// Returns an error if the flush itself failed, or [`StoreError::StoreCorrupt`]
    /// if the worker thread panicked.
    pub fn wait_for_flush(&self) -> Result<()> {
        let handle = self.flush_handle.lock().take();
        if let Some(handle) = handle {
            return handle
                .join()
                .map_err(|_| StoreError::StoreCorrupt(format!("flush worker for {} panicked", self.name)))?;
        }
        Ok(())
    }

    #[must_use]
    pub fn is_flushing(&self) -> bool {
        self.flush_handle.lock().as_ref().is_some_and(|h| !h.is_finished())
    }
}
