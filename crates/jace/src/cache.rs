//! Memoization of the stage transitions.
//!
//! Each stage type owns one [`StageCache`]. A lookup is keyed by the identity of the
//! stage object that performs the transition plus a description of the call: the
//! abstract structure of the arguments for `lower`, the resolved option values for
//! `compile`. Cached values are handed out as shared, immutable stage objects.

use std::fmt;
use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::env;
use crate::error::{JaceError, JaceResult};
use crate::optimization::CompilerOptions;
use crate::profiling;
use crate::sdfg::{DType, StorageType};
use crate::value::Value;

const FNV1A_OFFSET: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;

fn fnv1a_hash(bytes: &[u8]) -> u64 {
    let mut hash = FNV1A_OFFSET;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV1A_PRIME);
    }
    hash
}

fn hash_serializable<T: Serialize>(value: &T) -> u64 {
    match bincode::serialize(value) {
        Ok(bytes) => fnv1a_hash(&bytes),
        Err(err) => {
            log::warn!("can not fingerprint call description: {err}");
            0
        }
    }
}

/// Abstract description of one call argument: everything but its values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArgDescriptor {
    /// Empty for scalars.
    pub shape: Vec<usize>,
    pub dtype: DType,
    /// Strides in elements, `None` for scalars.
    pub strides: Option<Vec<usize>>,
    pub storage: StorageType,
}

impl ArgDescriptor {
    /// Describes `value`; nested values can not be described.
    pub fn from_value(value: &Value) -> JaceResult<Self> {
        match value {
            Value::Array(array) => Ok(Self {
                shape: array.shape().to_vec(),
                dtype: array.dtype(),
                strides: Some(array.strides().to_vec()),
                storage: array.storage(),
            }),
            Value::Scalar(scalar) => Ok(Self {
                shape: Vec::new(),
                dtype: scalar.dtype(),
                strides: None,
                storage: StorageType::CpuHeap,
            }),
            Value::Tuple(items) => Err(JaceError::cache_key(format!(
                "can not make an abstract description of a tuple with {} elements",
                items.len()
            ))),
        }
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty() && self.strides.is_none()
    }
}

impl fmt::Display for ArgDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.dtype, self.shape)?;
        if let Some(strides) = &self.strides {
            write!(f, "/{strides:?}")?;
        }
        write!(f, "@{:?}", self.storage)
    }
}

/// Ordered abstract description of all arguments of a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallDescriptor(pub Vec<ArgDescriptor>);

impl CallDescriptor {
    pub fn from_values(values: &[Value]) -> JaceResult<Self> {
        values
            .iter()
            .map(ArgDescriptor::from_value)
            .collect::<JaceResult<Vec<_>>>()
            .map(CallDescriptor)
    }

    pub fn args(&self) -> &[ArgDescriptor] {
        &self.0
    }

    /// Stable 64-bit fingerprint of the description.
    pub fn fingerprint(&self) -> u64 {
        hash_serializable(self)
    }
}

/// Identity of a stage object for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(u64);

impl StageId {
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        StageId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage#{}", self.0)
    }
}

/// What a transition was called with.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CallKey {
    /// Abstract argument structure, used by `lower`.
    Args(CallDescriptor),
    /// Concrete option values, used by `compile`.
    Options(CompilerOptions),
}

impl CallKey {
    pub fn fingerprint(&self) -> u64 {
        match self {
            CallKey::Args(call) => call.fingerprint(),
            CallKey::Options(options) => hash_serializable(options),
        }
    }
}

/// Full cache key of one transition call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StageKey {
    pub stage: StageId,
    pub call: CallKey,
}

impl StageKey {
    pub fn new(stage: StageId, call: CallKey) -> Self {
        Self { stage, call }
    }
}

/// Names of the profiling events a cache reports.
#[derive(Debug, Clone, Copy)]
pub struct CacheEvents {
    pub hit: &'static str,
    pub miss: &'static str,
}

pub const LOWERING_EVENTS: CacheEvents = CacheEvents {
    hit: "lowering_cache_hit",
    miss: "lowering_cache_miss",
};

pub const COMPILE_EVENTS: CacheEvents = CacheEvents {
    hit: "compile_cache_hit",
    miss: "compile_cache_miss",
};

pub const EVICT_EVENT: &str = "cache_evict";

/// LRU store of the transition results of one stage type.
///
/// Hits and re-insertions move an entry to the most recently used position; inserting
/// past capacity evicts the least recently used entry.
pub struct StageCache<V> {
    name: &'static str,
    events: CacheEvents,
    memory: Mutex<LruCache<StageKey, V>>,
}

impl<V: Clone> StageCache<V> {
    /// A cache holding `JACE_CACHE_SIZE` entries, 256 by default.
    pub fn new(name: &'static str, events: CacheEvents) -> Self {
        Self::with_capacity(name, events, env::cache_capacity())
    }

    pub fn with_capacity(name: &'static str, events: CacheEvents, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            events,
            memory: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Returns the cached value for `key`, computing and storing it on a miss.
    ///
    /// The lock is not held while `make` runs, so a transition may itself use the cache.
    /// A failing `make` stores nothing.
    pub fn get_or_try_insert_with(
        &self,
        key: StageKey,
        make: impl FnOnce() -> JaceResult<V>,
    ) -> JaceResult<V> {
        if let Some(value) = self.lock().get(&key) {
            profiling::cache_event(self.events.hit);
            log::debug!(
                "{} cache hit for {} ({:016x})",
                self.name,
                key.stage,
                key.call.fingerprint()
            );
            return Ok(value.clone());
        }
        profiling::cache_event(self.events.miss);
        log::debug!(
            "{} cache miss for {} ({:016x})",
            self.name,
            key.stage,
            key.call.fingerprint()
        );

        let value = make()?;
        self.insert(key, value.clone());
        Ok(value)
    }

    /// Stores `value`, replacing and refreshing an existing entry for `key`.
    pub fn insert(&self, key: StageKey, value: V) {
        let mut memory = self.lock();
        if let Some((evicted, _)) = memory.push(key.clone(), value) {
            if evicted != key {
                profiling::cache_event(EVICT_EVENT);
                log::debug!("{} cache evicted an entry of {}", self.name, evicted.stage);
            }
        }
    }

    pub fn contains(&self, key: &StageKey) -> bool {
        self.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LruCache<StageKey, V>> {
        self.memory.lock().expect("stage cache poisoned")
    }
}

impl<V> fmt::Debug for StageCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let memory = self.memory.lock().expect("stage cache poisoned");
        write!(
            f,
            "StageCache({}: {} / {})",
            self.name,
            memory.len(),
            memory.cap()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{HostArray, Scalar};

    fn key(stage: StageId, n: usize) -> StageKey {
        StageKey::new(
            stage,
            CallKey::Args(CallDescriptor(vec![ArgDescriptor {
                shape: vec![n],
                dtype: DType::F64,
                strides: Some(vec![1]),
                storage: StorageType::CpuHeap,
            }])),
        )
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache: StageCache<usize> = StageCache::with_capacity("test", LOWERING_EVENTS, 2);
        let stage = StageId::fresh();
        cache.insert(key(stage, 1), 1);
        cache.insert(key(stage, 2), 2);
        let hit = cache
            .get_or_try_insert_with(key(stage, 1), || Ok(99))
            .unwrap();
        assert_eq!(hit, 1);
        cache.insert(key(stage, 3), 3);
        assert!(cache.contains(&key(stage, 1)));
        assert!(!cache.contains(&key(stage, 2)));
        assert!(cache.contains(&key(stage, 3)));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_transition_is_not_stored() {
        let cache: StageCache<usize> = StageCache::with_capacity("test", COMPILE_EVENTS, 4);
        let stage = StageId::fresh();
        let err = cache
            .get_or_try_insert_with(key(stage, 1), || Err(JaceError::unsupported("no")))
            .unwrap_err();
        assert!(err.is_unsupported());
        assert!(cache.is_empty());
    }

    #[test]
    fn descriptors_ignore_values() {
        let a = HostArray::from_f64(vec![2], vec![1.0, 2.0]).unwrap();
        let b = HostArray::from_f64(vec![2], vec![3.0, 4.0]).unwrap();
        let da = CallDescriptor::from_values(&[a.into(), Scalar::i64(1).into()]).unwrap();
        let db = CallDescriptor::from_values(&[b.into(), Scalar::i64(7).into()]).unwrap();
        assert_eq!(da, db);
        assert_eq!(da.fingerprint(), db.fingerprint());
        assert!(da.args()[1].is_scalar());
    }

    #[test]
    fn tuples_are_rejected() {
        let err = ArgDescriptor::from_value(&Value::Tuple(vec![])).unwrap_err();
        assert!(matches!(err, JaceError::CacheKey(_)));
    }
}
