//! Time-bounded, file-backed caches
//!
//! Both on-disk caches (the SKU catalog snapshot and the per family/region
//! price table) are a `TtlCache` over an `EntryStore`:
//!
//! - `SnapshotFile<V>`: the whole file is one timestamped entry.
//! - `KeyedFile<V>`: the file is a JSON object of `key -> timestamped entry`.
//!
//! Entries are `Stamped<V>`: the value's fields flattened next to a
//! `timestamp` in fractional epoch seconds. A missing timestamp reads as `0`,
//! which is always expired.
//!
//! There is no locking. Two processes writing the same file race and the last
//! writer wins.

use crate::error::{CostError, Result};
use crate::utils::{ensure_dir, epoch_seconds, format_duration};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Freshness window shared by both cache tiers
pub const CACHE_TTL: Duration = Duration::from_secs(86_400);

/// A cached value together with the time it was written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped<V> {
    #[serde(flatten)]
    pub value: V,
    #[serde(default)]
    pub timestamp: f64,
}

impl<V> Stamped<V> {
    pub fn now(value: V) -> Self {
        Self {
            value,
            timestamp: epoch_seconds(),
        }
    }

    pub fn at(value: V, timestamp: f64) -> Self {
        Self { value, timestamp }
    }
}

/// Values that decide for themselves whether they should be persisted
pub trait Cacheable {
    fn is_cacheable(&self) -> bool {
        true
    }
}

/// Outcome of reading one key from a cache
#[derive(Debug)]
pub enum Lookup<V> {
    /// Present and within TTL
    Fresh(V),
    /// Present but older than TTL
    Expired { age_secs: f64 },
    /// No file, or no entry for the key
    Absent,
    /// The file exists but could not be read or decoded
    Unreadable(CostError),
}

impl<V> Lookup<V> {
    pub fn into_fresh(self) -> Option<V> {
        match self {
            Lookup::Fresh(v) => Some(v),
            _ => None,
        }
    }
}

/// Persistent storage for timestamped entries
pub trait EntryStore {
    type Key: ?Sized;
    type Value;

    /// `Ok(None)` when there is nothing stored for `key`.
    fn read(&self, key: &Self::Key) -> Result<Option<Stamped<Self::Value>>>;

    fn write(&self, key: &Self::Key, entry: &Stamped<Self::Value>) -> Result<()>;

    fn path(&self) -> &Path;
}

fn read_file(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    std::fs::read_to_string(path)
        .map(Some)
        .map_err(|e| CostError::cache(path, format!("read failed: {}", e)))
}

fn write_file<T: Serialize>(path: &Path, contents: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    let json = serde_json::to_string_pretty(contents)?;
    std::fs::write(path, json).map_err(|e| CostError::cache(path, format!("write failed: {}", e)))
}

/// A file holding exactly one entry
#[derive(Debug, Clone)]
pub struct SnapshotFile<V> {
    path: PathBuf,
    _value: PhantomData<fn() -> V>,
}

impl<V> SnapshotFile<V> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _value: PhantomData,
        }
    }
}

impl<V: Serialize + DeserializeOwned> EntryStore for SnapshotFile<V> {
    type Key = ();
    type Value = V;

    fn read(&self, _key: &()) -> Result<Option<Stamped<V>>> {
        match read_file(&self.path)? {
            Some(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| CostError::cache(&self.path, format!("invalid JSON: {}", e))),
            None => Ok(None),
        }
    }

    fn write(&self, _key: &(), entry: &Stamped<V>) -> Result<()> {
        write_file(&self.path, entry)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// A file holding a JSON object of independently timestamped entries
#[derive(Debug, Clone)]
pub struct KeyedFile<V> {
    path: PathBuf,
    _value: PhantomData<fn() -> V>,
}

impl<V> KeyedFile<V> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _value: PhantomData,
        }
    }

    fn read_object(&self) -> Result<Option<BTreeMap<String, Value>>> {
        match read_file(&self.path)? {
            Some(content) => serde_json::from_str(&content)
                .map(Some)
                .map_err(|e| CostError::cache(&self.path, format!("invalid JSON: {}", e))),
            None => Ok(None),
        }
    }
}

impl<V: Serialize + DeserializeOwned> EntryStore for KeyedFile<V> {
    type Key = str;
    type Value = V;

    fn read(&self, key: &str) -> Result<Option<Stamped<V>>> {
        let Some(mut object) = self.read_object()? else {
            return Ok(None);
        };
        match object.remove(key) {
            Some(raw) => serde_json::from_value(raw).map(Some).map_err(|e| {
                CostError::cache(&self.path, format!("invalid entry '{}': {}", key, e))
            }),
            None => Ok(None),
        }
    }

    /// Replace `key`, keeping every other entry already in the file.
    fn write(&self, key: &str, entry: &Stamped<V>) -> Result<()> {
        let mut object = match self.read_object() {
            Ok(Some(object)) => object,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                debug!("Starting a new cache file: {}", e);
                BTreeMap::new()
            }
        };
        object.insert(key.to_string(), serde_json::to_value(entry)?);
        write_file(&self.path, &object)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Get-or-populate cache with a fixed time-to-live
#[derive(Debug, Clone)]
pub struct TtlCache<S> {
    name: &'static str,
    store: S,
    ttl: Duration,
}

impl<S> TtlCache<S>
where
    S: EntryStore,
    S::Value: Cacheable + Clone,
{
    pub fn new(name: &'static str, store: S, ttl: Duration) -> Self {
        Self { name, store, ttl }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn lookup(&self, key: &S::Key) -> Lookup<S::Value> {
        self.lookup_at(key, epoch_seconds())
    }

    fn lookup_at(&self, key: &S::Key, now: f64) -> Lookup<S::Value> {
        match self.store.read(key) {
            Ok(Some(entry)) => {
                let age_secs = now - entry.timestamp;
                if age_secs < self.ttl.as_secs_f64() {
                    Lookup::Fresh(entry.value)
                } else {
                    Lookup::Expired { age_secs }
                }
            }
            Ok(None) => Lookup::Absent,
            Err(e) => Lookup::Unreadable(e),
        }
    }

    /// Stamp `value` with the current time and persist it.
    pub fn put(&self, key: &S::Key, value: &S::Value) -> Result<()> {
        self.store.write(key, &Stamped::now(value.clone()))
    }

    /// Return the fresh cached value for `key`, or run `populate` and cache its
    /// result when it is cacheable.
    ///
    /// Errors from `populate` propagate. Cache read and write failures are
    /// logged and never fail the call.
    pub async fn get_or_populate<F, Fut>(&self, key: &S::Key, populate: F) -> Result<S::Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S::Value>>,
    {
        match self.lookup(key) {
            Lookup::Fresh(value) => {
                info!("Loaded {} from local cache", self.name);
                return Ok(value);
            }
            Lookup::Expired { age_secs } => {
                debug!(
                    "{} cache expired ({} old)",
                    self.name,
                    format_duration(age_secs.max(0.0) as u64)
                );
            }
            Lookup::Absent => debug!(
                "{} not cached in {}",
                self.name,
                self.store.path().display()
            ),
            Lookup::Unreadable(e) => warn!("{} cache read error: {}", self.name, e),
        }

        let value = populate().await?;

        if value.is_cacheable() {
            if let Err(e) = self.put(key, &value) {
                warn!("{} cache write error: {}", self.name, e);
            }
        } else {
            debug!("Not caching incomplete {}", self.name);
        }

        Ok(value)
    }
}
