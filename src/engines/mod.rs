use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::common::{Command, Reply};
use crate::Result;

/// Trait for a key/list storage engine.
///
/// Every mutation bumps a per-key version. `exec` compares the versions
/// recorded by `WATCH` against the current ones and applies the batch only
/// when none of them moved, all under one atomic step.
///
/// Engines must be cloneable (cheaply, via `Arc`) and safe to
/// send across threads, enabling concurrent access from a thread pool.
pub trait ListEngine: Clone + Send + 'static {
    /// Applies a single command.
    fn apply(&self, command: Command) -> Result<Reply>;

    /// Returns the current version of a key. Unknown keys are at version 0.
    fn version(&self, key: String) -> Result<u64>;

    /// Applies `commands` atomically if every `(key, version)` in `watched`
    /// still holds.
    ///
    /// Returns `None` when a watched key changed and nothing was applied.
    fn exec(&self, watched: Vec<(String, u64)>, commands: Vec<Command>)
        -> Result<Option<Vec<Reply>>>;
}

mod memory;
mod sled_engine;

pub use self::memory::MemoryEngine;
pub use self::sled_engine::SledEngine;

/// A stored value: a plain string or a list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Value {
    Str(String),
    List(VecDeque<String>),
}

/// A value together with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Entry {
    pub value: Value,
    /// Milliseconds since the Unix epoch.
    pub expires_at: Option<u64>,
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Access to entries and versions from inside one atomic engine step.
pub(crate) trait Keyspace {
    type Error;

    /// Loads a live entry; expired entries read as `None`.
    fn load(&mut self, key: &str) -> std::result::Result<Option<Entry>, Self::Error>;

    /// Stores or removes an entry and bumps the key's version.
    fn store(&mut self, key: &str, entry: Option<Entry>) -> std::result::Result<(), Self::Error>;

    fn version(&mut self, key: &str) -> std::result::Result<u64, Self::Error>;
}

const WRONG_TYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Runs a batch against a keyspace once the watched versions are confirmed.
pub(crate) fn exec_batch<K: Keyspace>(
    keyspace: &mut K,
    watched: &[(String, u64)],
    commands: &[Command],
) -> std::result::Result<Option<Vec<Reply>>, K::Error> {
    for (key, version) in watched {
        if keyspace.version(key)? != *version {
            return Ok(None);
        }
    }
    let mut replies = Vec::with_capacity(commands.len());
    for command in commands {
        replies.push(apply_command(keyspace, command)?);
    }
    Ok(Some(replies))
}

/// Applies one command. Type mismatches are reported as `Reply::Error`
/// so that a batch never aborts halfway.
pub(crate) fn apply_command<K: Keyspace>(
    keyspace: &mut K,
    command: &Command,
) -> std::result::Result<Reply, K::Error> {
    let reply = match command {
        Command::Get { key } => match keyspace.load(key)? {
            None => Reply::Nil,
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Reply::Value(s),
            Some(_) => Reply::Error(WRONG_TYPE.to_owned()),
        },
        Command::Set {
            key,
            value,
            ttl_secs,
        } => {
            if *ttl_secs == 0 {
                return Ok(Reply::Error("invalid expire time".to_owned()));
            }
            let entry = Entry {
                value: Value::Str(value.clone()),
                expires_at: Some(now_millis().saturating_add(ttl_secs.saturating_mul(1000))),
            };
            keyspace.store(key, Some(entry))?;
            Reply::Ok
        }
        Command::LPush { key, values } => {
            if values.is_empty() {
                return Ok(Reply::Error("LPUSH needs at least one value".to_owned()));
            }
            let mut entry = match keyspace.load(key)? {
                None => Entry::new(Value::List(VecDeque::new())),
                Some(entry) => entry,
            };
            let len = match &mut entry.value {
                Value::List(list) => {
                    for value in values {
                        list.push_front(value.clone());
                    }
                    list.len()
                }
                Value::Str(_) => return Ok(Reply::Error(WRONG_TYPE.to_owned())),
            };
            keyspace.store(key, Some(entry))?;
            Reply::Int(len as u64)
        }
        Command::RPop { key } => match keyspace.load(key)? {
            None => Reply::Nil,
            Some(mut entry) => {
                let Value::List(list) = &mut entry.value else {
                    return Ok(Reply::Error(WRONG_TYPE.to_owned()));
                };
                let popped = list.pop_back();
                if list.is_empty() {
                    keyspace.store(key, None)?;
                } else {
                    keyspace.store(key, Some(entry))?;
                }
                popped.map_or(Reply::Nil, Reply::Value)
            }
        },
        Command::LLen { key } => match keyspace.load(key)? {
            None => Reply::Int(0),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Reply::Int(list.len() as u64),
            Some(_) => Reply::Error(WRONG_TYPE.to_owned()),
        },
        Command::LRange { key, start, stop } => match keyspace.load(key)? {
            None => Reply::List(Vec::new()),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Reply::List(range(&list, *start, *stop)),
            Some(_) => Reply::Error(WRONG_TYPE.to_owned()),
        },
    };
    Ok(reply)
}

/// Inclusive slice with negative indices counting back from the end.
fn range(list: &VecDeque<String>, start: i64, stop: i64) -> Vec<String> {
    let len = list.len() as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || start >= len {
        return Vec::new();
    }
    list.iter()
        .skip(start as usize)
        .take((stop - start + 1) as usize)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(items: &[&str]) -> VecDeque<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn range_handles_negative_indices() {
        let l = list(&["a", "b", "c", "d"]);
        assert_eq!(range(&l, 0, -1), vec!["a", "b", "c", "d"]);
        assert_eq!(range(&l, -2, -1), vec!["c", "d"]);
        assert_eq!(range(&l, 1, 2), vec!["b", "c"]);
        assert_eq!(range(&l, 0, 100), vec!["a", "b", "c", "d"]);
        assert_eq!(range(&l, -100, 0), vec!["a"]);
    }

    #[test]
    fn range_out_of_bounds_is_empty() {
        let l = list(&["a", "b"]);
        assert!(range(&l, 5, 10).is_empty());
        assert!(range(&l, 1, 0).is_empty());
        assert!(range(&VecDeque::new(), 0, -1).is_empty());
    }

    #[test]
    fn entry_expiry() {
        let mut entry = Entry::new(Value::Str("v".into()));
        assert!(!entry.is_expired(u64::MAX));
        entry.expires_at = Some(10);
        assert!(entry.is_expired(10));
        assert!(!entry.is_expired(9));
    }
}
