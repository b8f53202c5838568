//! Last-value store with an observer list.
//!
//! The store keeps the most recent payload published under each key and an
//! ordered list of observers. Observers run synchronously from inside
//! [`DataStore::set`], after the new entry is installed, so their side
//! effects are ordered with the publish that caused them.

use ahash::AHashMap;
use bytes::Bytes;

use crate::error::{Error, Result};
use crate::key::TopicKey;

/// One retained value: the most recent payload published under a key and
/// the host-clock timestamp of that publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub payload: Bytes,
    pub timestamp: u32,
}

/// Observer handler. Invoked with every stored `(key, entry)` pair;
/// returning `false` declares the observer dead and removes it.
pub type ObserverFn<K> = Box<dyn FnMut(&K, &Entry) -> bool + Send>;

/// A handler tagged with the connection that owns it, so a closing
/// connection can take its subscriptions with it.
pub struct Observer<K> {
    pub client_id: u32,
    pub callback: ObserverFn<K>,
}

/// Retained-value map keyed by topic, plus an ordered observer list.
pub struct DataStore<K: TopicKey> {
    entries: AHashMap<K, Entry>,
    observers: Vec<Observer<K>>,
}

impl<K: TopicKey> DataStore<K> {
    pub fn new() -> Self {
        Self {
            entries: AHashMap::new(),
            observers: Vec::new(),
        }
    }

    /// Install `entry` under `key`, replacing any previous value, then
    /// notify every observer in insertion order. Observers that report
    /// failure are removed before this returns.
    ///
    /// Handlers see the post-set state: the entry they are handed is the
    /// one just installed.
    pub fn set(&mut self, key: K, entry: Entry) {
        self.entries.insert(key.clone(), entry);
        if let Some(entry) = self.entries.get(&key) {
            self.observers
                .retain_mut(|observer| (observer.callback)(&key, entry));
        }
    }

    pub fn get(&self, key: &K) -> Result<&Entry> {
        self.entries.get(key).ok_or(Error::KeyMissing)
    }

    /// Append an observer, first replaying the full current store to it so
    /// a subscriber sees the retained value without waiting for the next
    /// publish. An observer that fails during replay is not kept.
    pub fn add_observer(&mut self, mut observer: Observer<K>) {
        for (key, entry) in &self.entries {
            if !(observer.callback)(key, entry) {
                return;
            }
        }
        self.observers.push(observer);
    }

    /// Drop every observer owned by `client_id`. Called when a connection
    /// goes away.
    pub fn remove_client(&mut self, client_id: u32) {
        self.observers
            .retain(|observer| observer.client_id != client_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

impl<K: TopicKey> Default for DataStore<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::key::{PackedKey, StringKey};

    fn entry(value: &str) -> Entry {
        Entry {
            payload: Bytes::copy_from_slice(value.as_bytes()),
            timestamp: 0,
        }
    }

    fn packed(topic: &[u8]) -> PackedKey {
        PackedKey::encode(topic).unwrap()
    }

    #[test]
    fn store_retrieve() {
        let mut store = DataStore::new();
        store.set(packed(b"TEST"), entry("I'M A TEST!"));

        let stored = store.get(&packed(b"TEST")).unwrap();
        assert_eq!(stored.payload, "I'M A TEST!");
    }

    #[test]
    fn store_retrieve_string_key() {
        let mut store = DataStore::new();
        store.set(StringKey::encode(b"TEST").unwrap(), entry("I'M A TEST!"));

        let stored = store.get(&StringKey::encode(b"TEST").unwrap()).unwrap();
        assert_eq!(stored.payload, "I'M A TEST!");
    }

    #[test]
    fn get_missing_key() {
        let store: DataStore<PackedKey> = DataStore::new();
        assert_eq!(store.get(&packed(b"nope")).err(), Some(Error::KeyMissing));
    }

    #[test]
    fn set_replaces_previous_value() {
        let mut store = DataStore::new();
        store.set(packed(b"k"), entry("first"));
        store.set(packed(b"k"), entry("second"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&packed(b"k")).unwrap().payload, "second");
    }

    #[test]
    fn observers_see_post_set_state() {
        let mut store: DataStore<PackedKey> = DataStore::new();
        let seen: Arc<Mutex<Vec<(PackedKey, Vec<u8>)>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        store.add_observer(Observer {
            client_id: 0,
            callback: Box::new(move |key, entry| {
                sink.lock()
                    .unwrap()
                    .push((key.clone(), entry.payload.to_vec()));
                true
            }),
        });

        store.set(packed(b"TEST"), entry("I'M A TEST!"));

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, packed(b"TEST"));
        assert_eq!(seen[0].1, b"I'M A TEST!");
    }

    #[test]
    fn new_observer_replays_current_store() {
        let mut store = DataStore::new();
        store.set(StringKey::encode(b"a").unwrap(), entry("1"));
        store.set(StringKey::encode(b"b").unwrap(), entry("2"));

        let seen: Arc<Mutex<Vec<Vec<u8>>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.add_observer(Observer {
            client_id: 0,
            callback: Box::new(move |_, entry| {
                sink.lock().unwrap().push(entry.payload.to_vec());
                true
            }),
        });

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec![b"1".to_vec(), b"2".to_vec()]);
        assert_eq!(store.observer_count(), 1);
    }

    #[test]
    fn observer_failing_during_replay_is_not_kept() {
        let mut store = DataStore::new();
        store.set(packed(b"a"), entry("1"));

        store.add_observer(Observer {
            client_id: 0,
            callback: Box::new(|_, _| false),
        });

        assert_eq!(store.observer_count(), 0);
    }

    #[test]
    fn failing_observer_is_never_called_again() {
        let mut store = DataStore::new();
        let calls = Arc::new(Mutex::new(0u32));

        let counter = Arc::clone(&calls);
        store.add_observer(Observer {
            client_id: 0,
            callback: Box::new(move |_, _| {
                *counter.lock().unwrap() += 1;
                false
            }),
        });

        store.set(packed(b"k"), entry("1"));
        store.set(packed(b"k"), entry("2"));

        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(store.observer_count(), 0);
    }

    #[test]
    fn surviving_observers_keep_insertion_order() {
        let mut store = DataStore::new();
        let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3u32 {
            let sink = Arc::clone(&order);
            store.add_observer(Observer {
                client_id: id,
                callback: Box::new(move |_, _| {
                    sink.lock().unwrap().push(id);
                    id != 1 // the middle observer removes itself
                }),
            });
        }

        store.set(packed(b"k"), entry("1"));
        store.set(packed(b"k"), entry("2"));

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 0, 2]);
        assert_eq!(store.observer_count(), 2);
    }

    #[test]
    fn remove_client_purges_only_its_observers() {
        let mut store: DataStore<PackedKey> = DataStore::new();
        for client_id in [7, 8, 7] {
            store.add_observer(Observer {
                client_id,
                callback: Box::new(|_, _| true),
            });
        }

        store.remove_client(7);
        assert_eq!(store.observer_count(), 1);

        store.remove_client(8);
        assert_eq!(store.observer_count(), 0);
    }
}
