//! Lock-free handle registry.
//!
//! A fixed-capacity open-addressing table that attaches out-of-band data to
//! opaque native handles. Many threads may insert, look up and remove at the
//! same time without taking a lock.
//!
//! Each slot holds a key, an inline 64-bit value and a generation counter.
//! Writers claim a slot by swapping its key to [`UPDATING_KEY`], bump the
//! generation, write the value and publish the real key last with release
//! ordering. Readers load the generation, match the key with acquire ordering,
//! read the value and validate the generation again. A lookup that overlaps a
//! remove-then-insert of the same key therefore reports a miss instead of
//! handing out the newer object's value.
//!
//! Owned values need one more step. A reader that matched a key pins the slot
//! while it takes its own reference, and a remover that unpublished the key
//! waits for the slot's pins to drain before handing the value back. Readers
//! never wait; a remover only waits for readers that matched before it.

use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::{LayerError, LayerResult};

/// Key value marking an unused slot.
pub const EMPTY_KEY: u64 = 0;
/// Key value marking a slot that is being written.
pub const UPDATING_KEY: u64 = u64::MAX;

/// Tables larger than this start their scan at a hashed index.
const HASHED_START_THRESHOLD: usize = 64;

/// Returns `true` if `key` may be stored in a table.
#[inline]
pub fn is_valid_key(key: u64) -> bool {
    key != EMPTY_KEY && key != UPDATING_KEY
}

#[derive(Default)]
struct Slot {
    key: AtomicU64,
    value: AtomicU64,
    generation: AtomicU64,
    pins: AtomicU32,
}

impl Slot {
    /// Unpublish `key` and return its value once no pinned reader is left.
    fn take(&self, key: u64) -> Option<u64> {
        if self
            .key
            .compare_exchange(key, UPDATING_KEY, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            return None;
        }
        let value = self.value.load(Ordering::Acquire);
        self.generation.fetch_add(1, Ordering::AcqRel);
        while self.pins.load(Ordering::SeqCst) != 0 {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
        self.key.store(EMPTY_KEY, Ordering::Release);
        Some(value)
    }
}

/// Keeps a slot's value from being handed back to a remover.
struct SlotPin<'a>(&'a AtomicU32);

impl<'a> SlotPin<'a> {
    fn new(slot: &'a Slot) -> Self {
        slot.pins.fetch_add(1, Ordering::SeqCst);
        Self(&slot.pins)
    }
}

impl Drop for SlotPin<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Release);
    }
}

/// Fixed-capacity table mapping non-zero keys to inline `u64` values.
pub struct HandleTable {
    slots: Box<[Slot]>,
    mask: usize,
}

impl HandleTable {
    /// Create a table with `capacity` slots. `capacity` must be a power of two.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(
            capacity.is_power_of_two(),
            "handle table capacity must be a power of two, got {capacity}"
        );
        let slots = (0..capacity).map(|_| Slot::default()).collect();
        Self {
            slots,
            mask: capacity - 1,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn start_index(&self, key: u64) -> usize {
        if self.slots.len() > HASHED_START_THRESHOLD {
            // Fibonacci hashing spreads pointer-aligned handles.
            (key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32) as usize & self.mask
        } else {
            0
        }
    }

    #[inline]
    fn scan(&self, key: u64) -> impl Iterator<Item = &Slot> {
        let start = self.start_index(key);
        (0..self.slots.len()).map(move |i| &self.slots[(start + i) & self.mask])
    }

    /// Find the value stored for `key`.
    ///
    /// Never blocks. May miss an entry that is being inserted or replaced at
    /// the same moment.
    pub fn lookup(&self, key: u64) -> Option<u64> {
        if !is_valid_key(key) {
            return None;
        }

        for slot in self.scan(key) {
            let generation = slot.generation.load(Ordering::Acquire);
            if slot.key.load(Ordering::Acquire) != key {
                continue;
            }
            let value = slot.value.load(Ordering::Acquire);
            if slot.generation.load(Ordering::Acquire) != generation {
                return None;
            }
            return Some(value);
        }
        None
    }

    /// Find the value stored for `key` and pass it to `f` while the slot is
    /// pinned.
    ///
    /// A concurrent [`remove`](Self::remove) of `key` does not return until `f`
    /// is done. `f` must not remove `key` itself.
    pub fn lookup_with<R>(&self, key: u64, f: impl FnOnce(u64) -> R) -> Option<R> {
        if !is_valid_key(key) {
            return None;
        }

        for slot in self.scan(key) {
            if slot.key.load(Ordering::Acquire) != key {
                continue;
            }
            let _pin = SlotPin::new(slot);
            let generation = slot.generation.load(Ordering::SeqCst);
            if slot.key.load(Ordering::SeqCst) != key {
                return None;
            }
            let value = slot.value.load(Ordering::Acquire);
            if slot.generation.load(Ordering::SeqCst) != generation {
                return None;
            }
            return Some(f(value));
        }
        None
    }

    /// Returns `true` if `key` is currently stored.
    pub fn contains(&self, key: u64) -> bool {
        self.lookup(key).is_some()
    }

    /// Store `value` under `key`.
    ///
    /// Fails with [`LayerError::RegistryFull`] when no empty slot is left.
    pub fn insert(&self, key: u64, value: u64) -> LayerResult<()> {
        if !is_valid_key(key) {
            return Err(LayerError::InvalidParameter(format!(
                "reserved handle value {key:#x}"
            )));
        }
        debug_assert!(
            !self.contains(key),
            "handle {key:#x} is already registered"
        );

        for slot in self.scan(key) {
            if slot.key.load(Ordering::Relaxed) != EMPTY_KEY {
                continue;
            }
            if slot
                .key
                .compare_exchange(EMPTY_KEY, UPDATING_KEY, Ordering::AcqRel, Ordering::Relaxed)
                .is_err()
            {
                continue;
            }
            slot.generation.fetch_add(1, Ordering::AcqRel);
            slot.value.store(value, Ordering::Release);
            slot.key.store(key, Ordering::Release);
            return Ok(());
        }
        Err(LayerError::RegistryFull)
    }

    /// Remove `key` and return the value that was stored for it.
    pub fn remove(&self, key: u64) -> Option<u64> {
        if !is_valid_key(key) {
            return None;
        }

        for slot in self.scan(key) {
            if slot.key.load(Ordering::Relaxed) != key {
                continue;
            }
            if let Some(value) = slot.take(key) {
                return Some(value);
            }
        }
        None
    }

    /// Remove every published entry, passing each to `f`.
    ///
    /// Best effort: entries inserted concurrently with the sweep may survive.
    /// Only meant for teardown.
    pub fn drain(&self, mut f: impl FnMut(u64, u64)) {
        for slot in self.slots.iter() {
            let key = slot.key.load(Ordering::Acquire);
            if !is_valid_key(key) {
                continue;
            }
            if let Some(value) = slot.take(key) {
                f(key, value);
            }
        }
    }

    /// Remove every published entry.
    pub fn clear(&self) {
        self.drain(|_, _| {});
    }

    /// Snapshot of the published keys.
    pub fn keys(&self) -> Vec<u64> {
        self.slots
            .iter()
            .map(|slot| slot.key.load(Ordering::Acquire))
            .filter(|key| is_valid_key(*key))
            .collect()
    }

    /// Number of published entries. Only exact when no writer is active.
    pub fn len(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| is_valid_key(slot.key.load(Ordering::Relaxed)))
            .count()
    }

    /// Returns `true` if no entry is published.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Owning variant of [`HandleTable`]: values are reference counted records.
///
/// A record handed out by [`HandleMap::get`] stays alive for as long as the
/// caller holds it, even if the handle is removed at the same time.
pub struct HandleMap<T> {
    table: HandleTable,
    _marker: PhantomData<Arc<T>>,
}

impl<T> HandleMap<T> {
    /// Create a map with `capacity` slots (power of two).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            table: HandleTable::with_capacity(capacity),
            _marker: PhantomData,
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Insert a record and return a shared reference to it.
    pub fn insert(&self, key: u64, value: T) -> LayerResult<Arc<T>> {
        let value = Arc::new(value);
        self.insert_arc(key, Arc::clone(&value))?;
        Ok(value)
    }

    /// Insert an already shared record.
    ///
    /// On failure the table's reference is dropped again.
    pub fn insert_arc(&self, key: u64, value: Arc<T>) -> LayerResult<()> {
        if let Some(stale) = self.remove(key) {
            log::warn!("replacing stale record for handle {key:#x}");
            drop(stale);
        }

        let raw = Arc::into_raw(value);
        match self.table.insert(key, raw as u64) {
            Ok(()) => Ok(()),
            Err(err) => {
                // SAFETY: `raw` came from `Arc::into_raw` above and was never published.
                drop(unsafe { Arc::from_raw(raw) });
                Err(err)
            }
        }
    }

    /// Look up the record for `key`.
    pub fn get(&self, key: u64) -> Option<Arc<T>> {
        self.table.lookup_with(key, |raw| {
            let raw = raw as *const T;
            // SAFETY: the table holds one strong reference for every published
            // pointer, and the pinned slot keeps a remover from releasing it.
            unsafe {
                Arc::increment_strong_count(raw);
                Arc::from_raw(raw)
            }
        })
    }

    /// Returns `true` if a record is stored for `key`.
    pub fn contains(&self, key: u64) -> bool {
        self.table.contains(key)
    }

    /// Detach the record for `key` and return the table's reference.
    pub fn remove(&self, key: u64) -> Option<Arc<T>> {
        let raw = self.table.remove(key)? as *const T;
        // SAFETY: the slot owned this strong reference and no longer publishes it.
        Some(unsafe { Arc::from_raw(raw) })
    }

    /// Detach every record.
    pub fn drain(&self) -> Vec<(u64, Arc<T>)> {
        let mut drained = Vec::new();
        self.table.drain(|key, raw| {
            // SAFETY: as in `remove`.
            drained.push((key, unsafe { Arc::from_raw(raw as *const T) }));
        });
        drained
    }

    /// Drop every record.
    pub fn clear(&self) {
        drop(self.drain());
    }

    /// Detach every record `f` selects.
    pub fn remove_where(&self, mut f: impl FnMut(u64, &T) -> bool) -> Vec<(u64, Arc<T>)> {
        self.table
            .keys()
            .into_iter()
            .filter(|key| self.get(*key).is_some_and(|value| f(*key, &value)))
            .filter_map(|key| Some((key, self.remove(key)?)))
            .collect()
    }

    /// Snapshot of the records `f` selects.
    pub fn filter(&self, mut f: impl FnMut(u64, &T) -> bool) -> Vec<(u64, Arc<T>)> {
        self.table
            .keys()
            .into_iter()
            .filter_map(|key| Some((key, self.get(key)?)))
            .filter(|(key, value)| f(*key, value))
            .collect()
    }

    /// Number of records. Only exact when no writer is active.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if no record is stored.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl<T> Drop for HandleMap<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn test_insert_lookup_remove() {
        let table = HandleTable::with_capacity(64);
        table.insert(0x1000, 7).unwrap();
        table.insert(0x2000, 9).unwrap();

        assert_eq!(table.lookup(0x1000), Some(7));
        assert_eq!(table.lookup(0x2000), Some(9));
        assert_eq!(table.lookup(0x3000), None);

        assert_eq!(table.remove(0x1000), Some(7));
        assert_eq!(table.lookup(0x1000), None);
        assert_eq!(table.remove(0x1000), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reserved_keys_are_rejected() {
        let table = HandleTable::with_capacity(64);
        assert!(table.insert(EMPTY_KEY, 1).is_err());
        assert!(table.insert(UPDATING_KEY, 1).is_err());
        assert_eq!(table.lookup(EMPTY_KEY), None);
        assert_eq!(table.lookup(UPDATING_KEY), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_full_table_reports_error() {
        let table = HandleTable::with_capacity(64);
        for key in 1..=64 {
            table.insert(key, key * 10).unwrap();
        }
        assert_eq!(table.insert(65, 650), Err(LayerError::RegistryFull));

        assert_eq!(table.remove(10), Some(100));
        table.insert(65, 650).unwrap();
        assert_eq!(table.lookup(65), Some(650));
    }

    #[test]
    fn test_hashed_start_wraps_around() {
        let table = HandleTable::with_capacity(128);
        let keys: Vec<u64> = (1..=128).map(|i| i * 0x40).collect();
        for &key in &keys {
            table.insert(key, key + 1).unwrap();
        }
        for &key in &keys {
            assert_eq!(table.lookup(key), Some(key + 1));
        }
        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic]
    fn test_capacity_must_be_power_of_two() {
        let _ = HandleTable::with_capacity(100);
    }

    #[test]
    fn test_reinsert_after_remove_returns_new_value() {
        let table = HandleTable::with_capacity(64);
        table.insert(42, 1).unwrap();
        assert_eq!(table.remove(42), Some(1));
        table.insert(42, 2).unwrap();
        assert_eq!(table.lookup(42), Some(2));
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_values() {
        let table = HandleTable::with_capacity(1024);
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for writer in 0..4u64 {
                let table = &table;
                scope.spawn(move || {
                    for _round in 0..200 {
                        for i in 0..32u64 {
                            let key = (writer << 32) | (i + 1);
                            table.insert(key, key).unwrap();
                        }
                        for i in 0..32u64 {
                            let key = (writer << 32) | (i + 1);
                            assert_eq!(table.remove(key), Some(key));
                        }
                    }
                });
            }
            for _ in 0..2 {
                let table = &table;
                let done = &done;
                scope.spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        for writer in 0..4u64 {
                            for i in 0..32u64 {
                                let key = (writer << 32) | (i + 1);
                                if let Some(value) = table.lookup(key) {
                                    assert_eq!(value, key);
                                }
                            }
                        }
                    }
                });
            }
            // Writers finish first; then release the readers.
            std::thread::sleep(std::time::Duration::from_millis(50));
            done.store(true, Ordering::Relaxed);
        });

        assert!(table.is_empty());
    }

    #[test]
    fn test_map_owns_records() {
        let map = HandleMap::with_capacity(64);
        let record = map.insert(0xabc, String::from("image")).unwrap();
        assert_eq!(Arc::strong_count(&record), 2);

        let looked_up = map.get(0xabc).unwrap();
        assert!(Arc::ptr_eq(&record, &looked_up));
        assert_eq!(Arc::strong_count(&record), 3);
        drop(looked_up);

        let removed = map.remove(0xabc).unwrap();
        assert!(map.get(0xabc).is_none());
        drop(removed);
        assert_eq!(Arc::strong_count(&record), 1);
    }

    #[test]
    fn test_map_full_drops_rejected_value() {
        let map = HandleMap::with_capacity(64);
        for key in 1..=64u64 {
            map.insert(key, key).unwrap();
        }
        let extra = Arc::new(65u64);
        assert_eq!(
            map.insert_arc(65, Arc::clone(&extra)),
            Err(LayerError::RegistryFull)
        );
        assert_eq!(Arc::strong_count(&extra), 1);
    }

    #[test]
    fn test_map_replaces_stale_record() {
        let map = HandleMap::with_capacity(64);
        let first = map.insert(5, 1u32).unwrap();
        let second = map.insert(5, 2u32).unwrap();
        assert_eq!(Arc::strong_count(&first), 1);
        assert_eq!(*map.get(5).unwrap(), 2);
        assert_eq!(map.len(), 1);
        drop(second);
    }

    #[test]
    fn test_remove_waits_for_pinned_reader() {
        let table = HandleTable::with_capacity(64);
        table.insert(0x70, 3).unwrap();
        let removed = AtomicBool::new(false);

        std::thread::scope(|scope| {
            let seen = table.lookup_with(0x70, |value| {
                let remover = scope.spawn(|| {
                    let value = table.remove(0x70);
                    removed.store(true, Ordering::SeqCst);
                    value
                });
                std::thread::sleep(std::time::Duration::from_millis(20));
                assert!(!removed.load(Ordering::SeqCst));
                (value, remover)
            });
            let (value, remover) = seen.unwrap();
            assert_eq!(value, 3);
            assert_eq!(remover.join().unwrap(), Some(3));
        });

        assert!(removed.load(Ordering::SeqCst));
        assert_eq!(table.lookup_with(0x70, |value| value), None);
    }

    #[test]
    fn test_map_readers_race_removal() {
        struct Record {
            key: u64,
            alive: Arc<AtomicBool>,
        }
        impl Drop for Record {
            fn drop(&mut self) {
                self.alive.store(false, Ordering::SeqCst);
            }
        }

        let map = HandleMap::with_capacity(256);
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            for _ in 0..3 {
                let map = &map;
                let done = &done;
                scope.spawn(move || {
                    while !done.load(Ordering::Relaxed) {
                        for (key, record) in map.filter(|_, _: &Record| true) {
                            assert_eq!(record.key, key);
                            assert!(record.alive.load(Ordering::SeqCst));
                        }
                        for key in 1..=32u64 {
                            if let Some(record) = map.get(key) {
                                assert!(record.alive.load(Ordering::SeqCst));
                            }
                        }
                    }
                });
            }

            for _round in 0..300 {
                for key in 1..=32u64 {
                    let alive = Arc::new(AtomicBool::new(true));
                    map.insert(key, Record { key, alive }).unwrap();
                }
                let removed = map.remove_where(|key, _| key % 2 == 0);
                assert_eq!(removed.len(), 16);
                for key in (1..=32u64).step_by(2) {
                    assert!(map.remove(key).is_some());
                }
            }
            done.store(true, Ordering::Relaxed);
        });

        assert!(map.is_empty());
    }

    #[test]
    fn test_map_drop_releases_records() {
        let record = Arc::new(String::from("buffer"));
        {
            let map = HandleMap::with_capacity(64);
            map.insert_arc(1, Arc::clone(&record)).unwrap();
            assert_eq!(Arc::strong_count(&record), 2);
        }
        assert_eq!(Arc::strong_count(&record), 1);
    }
}
