//! Capped, newest-first recency lists.
//!
//! A recency list holds the latest positions of one entity under
//! `"<entityId>:latest_coordinates"`. Appends run inside an optimistic
//! transaction on that key: read the length, evict the tail when the list is
//! full, push the new value onto the head. Writers to the same entity are
//! serialized by the store's watch; writers to different entities never
//! contend.

use log::info;
use serde::Serialize;

use crate::store::{KeyValueStore, TransactionOutcome};
use crate::Result;

/// Number of positions kept per entity.
pub const RECENCY_CAPACITY: usize = 100;

const KEY_SUFFIX: &str = ":latest_coordinates";

/// Derives the storage key of an entity's recency list.
pub fn storage_key(entity_id: &str) -> String {
    format!("{entity_id}{KEY_SUFFIX}")
}

/// Pushes `value` onto the list at `key`, evicting the oldest element first
/// when the list holds exactly `capacity` elements.
///
/// Only a list of exactly `capacity` elements is trimmed. A list that grew
/// past `capacity` through writes outside this function keeps growing.
pub fn push_bounded<S, T>(
    store: &S,
    key: &str,
    value: &T,
    capacity: usize,
) -> Result<TransactionOutcome>
where
    S: KeyValueStore,
    T: Serialize + ?Sized,
{
    store.run_isolated_transaction(key, |reader, batch| {
        let len = reader.list_len(key)?;
        info!("Recency list {} holds {}/{} entries", key, len, capacity);

        if len == capacity {
            info!("Evicting oldest entry of {}", key);
            batch.pop_oldest(key);
        }

        info!("Pushing newest entry onto {}", key);
        batch.push_newest(key, value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{RecordingStore, StoreCall};

    #[test]
    fn storage_key_appends_suffix() {
        assert_eq!(storage_key("item-id-1"), "item-id-1:latest_coordinates");
    }

    #[test]
    fn evicts_only_at_exact_capacity() {
        let store = RecordingStore::new();
        for i in 0..3 {
            push_bounded(&store, "k", &i, 3).unwrap();
        }
        assert_eq!(store.read_list::<i32>("k").unwrap(), vec![2, 1, 0]);

        push_bounded(&store, "k", &3, 3).unwrap();
        assert_eq!(store.read_list::<i32>("k").unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn overfull_list_is_not_trimmed() {
        let store = RecordingStore::new();
        for i in 0..4 {
            store.append_to_list("k", &i).unwrap();
        }

        push_bounded(&store, "k", &4, 3).unwrap();

        assert_eq!(store.read_list::<i32>("k").unwrap(), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn each_push_is_one_transaction() {
        let store = RecordingStore::new();
        push_bounded(&store, "k", &1, 3).unwrap();
        assert_eq!(store.calls(), vec![StoreCall::Transaction("k".into())]);
    }
}
