//! Extendible hashing.
//!
//! The directory is a `Vec` of bucket indices into a bucket arena. Two
//! directory slots "sharing" a bucket just hold the same index; a split
//! rewrites those indices and never frees anything.

use std::collections::hash_map::DefaultHasher;
use std::hash::{BuildHasher, BuildHasherDefault, Hash};

use log::debug;
use parking_lot::Mutex;

/// Default cap on how deep a bucket may split. A bucket that is still full
/// at the cap takes the entry anyway instead of doubling the directory again.
pub const DEFAULT_MAX_DEPTH: u32 = 20;

/// Deterministic SipHash; the same keys always produce the same layout.
pub type DefaultBuildHasher = BuildHasherDefault<DefaultHasher>;

struct Bucket<K, V> {
    local_depth: u32,
    entries: Vec<(K, V)>,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(local_depth: u32, capacity: usize) -> Self {
        Self {
            local_depth,
            entries: Vec::with_capacity(capacity),
        }
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }
}

struct Directory<K, V> {
    global_depth: u32,
    /// `slots[i]` is an index into `buckets`; length is `2^global_depth`.
    slots: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
    len: usize,
}

/// A thread-safe hash table that grows one bucket at a time.
///
/// Lookups pick a directory slot from the low `global_depth` bits of the
/// key's hash. When an insert lands in a full bucket, only that bucket is
/// split (doubling the directory first if the bucket was already as deep as
/// the directory), repeating until the key's bucket has room.
///
/// Removal never merges buckets or shrinks the directory.
///
/// # Duplicate keys
/// [`insert`](Self::insert) of a key that is already present is a no-op:
/// the stored value is **kept**, not overwritten. Callers that need to
/// replace a value must `remove` first.
///
/// # Example
/// ```
/// use pagepool::container::hash::ExtendibleHash;
///
/// let table = ExtendibleHash::new(2);
/// table.insert(1, "a");
/// table.insert(1, "b");
/// assert_eq!(table.find(&1), Some("a"));
/// assert!(table.remove(&1));
/// assert_eq!(table.find(&1), None);
/// ```
pub struct ExtendibleHash<K, V, S = DefaultBuildHasher> {
    bucket_size: usize,
    max_depth: u32,
    hasher: S,
    dir: Mutex<Directory<K, V>>,
}

impl<K: Hash + Eq, V: Clone> ExtendibleHash<K, V> {
    /// Create a table whose buckets hold `bucket_size` entries.
    ///
    /// # Panics
    /// Panics if `bucket_size` is 0.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, DefaultBuildHasher::default())
    }
}

impl<K: Hash + Eq, V: Clone, S: BuildHasher> ExtendibleHash<K, V, S> {
    /// Create a table that hashes keys with `hasher`.
    ///
    /// # Panics
    /// Panics if `bucket_size` is 0.
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size > 0, "bucket_size must be > 0");

        Self {
            bucket_size,
            max_depth: DEFAULT_MAX_DEPTH,
            hasher,
            dir: Mutex::new(Directory {
                global_depth: 0,
                slots: vec![0],
                buckets: vec![Bucket::new(0, bucket_size)],
                len: 0,
            }),
        }
    }

    /// Cap how deep buckets may split (at most 63).
    ///
    /// Only matters when more than `bucket_size` keys agree on every one of
    /// the low `max_depth` hash bits.
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth.min(63);
        self
    }

    fn hash_key(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    fn slot_of(hash: u64, global_depth: u32) -> usize {
        (hash & ((1u64 << global_depth) - 1)) as usize
    }

    /// Look up `key`, returning a clone of its value.
    pub fn find(&self, key: &K) -> Option<V> {
        let hash = self.hash_key(key);
        let dir = self.dir.lock();
        let bucket = &dir.buckets[dir.slots[Self::slot_of(hash, dir.global_depth)]];
        bucket
            .position(key)
            .map(|pos| bucket.entries[pos].1.clone())
    }

    /// Remove `key`. Returns whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        let hash = self.hash_key(key);
        let mut dir = self.dir.lock();
        let bucket_idx = dir.slots[Self::slot_of(hash, dir.global_depth)];

        let bucket = &mut dir.buckets[bucket_idx];
        match bucket.position(key) {
            Some(pos) => {
                bucket.entries.swap_remove(pos);
                dir.len -= 1;
                true
            }
            None => false,
        }
    }

    /// Insert `key -> value` unless `key` is already present.
    pub fn insert(&self, key: K, value: V) {
        let hash = self.hash_key(&key);
        let mut dir = self.dir.lock();

        let mut bucket_idx = dir.slots[Self::slot_of(hash, dir.global_depth)];
        if dir.buckets[bucket_idx].position(&key).is_some() {
            return;
        }

        while dir.buckets[bucket_idx].entries.len() >= self.bucket_size {
            if dir.buckets[bucket_idx].local_depth >= self.max_depth {
                break;
            }
            self.split(&mut dir, bucket_idx);
            bucket_idx = dir.slots[Self::slot_of(hash, dir.global_depth)];
        }

        dir.buckets[bucket_idx].entries.push((key, value));
        dir.len += 1;
    }

    /// Split the bucket at `bucket_idx` in two on its next hash bit.
    fn split(&self, dir: &mut Directory<K, V>, bucket_idx: usize) {
        let local_depth = dir.buckets[bucket_idx].local_depth;

        if local_depth == dir.global_depth {
            dir.slots.extend_from_within(..);
            dir.global_depth += 1;
            debug!(
                "extendible hash directory doubled to {} slots (global depth {})",
                dir.slots.len(),
                dir.global_depth
            );
        }

        let mask = 1u64 << local_depth;
        let old = std::mem::replace(
            &mut dir.buckets[bucket_idx],
            Bucket::new(local_depth + 1, self.bucket_size),
        );
        let mut one = Bucket::new(local_depth + 1, self.bucket_size);

        // The zero child keeps the old bucket's arena slot.
        for (key, value) in old.entries {
            if self.hash_key(&key) & mask != 0 {
                one.entries.push((key, value));
            } else {
                dir.buckets[bucket_idx].entries.push((key, value));
            }
        }

        let one_idx = dir.buckets.len();
        dir.buckets.push(one);

        for (slot, target) in dir.slots.iter_mut().enumerate() {
            if *target == bucket_idx && (slot as u64) & mask != 0 {
                *target = one_idx;
            }
        }
    }

    /// Number of hash bits the directory is indexed by.
    pub fn global_depth(&self) -> u32 {
        self.dir.lock().global_depth
    }

    /// Local depth of the bucket that directory slot `dir_index` points at.
    ///
    /// Returns `None` if `dir_index` is outside the directory.
    pub fn local_depth(&self, dir_index: usize) -> Option<u32> {
        let dir = self.dir.lock();
        dir.slots
            .get(dir_index)
            .map(|&bucket_idx| dir.buckets[bucket_idx].local_depth)
    }

    /// Number of distinct buckets.
    pub fn num_buckets(&self) -> usize {
        self.dir.lock().buckets.len()
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.dir.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
