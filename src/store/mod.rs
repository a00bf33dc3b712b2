//! The key/value store contract used by the geolocation service.
//!
//! The service only ever talks to a [`KeyValueStore`]. Values are stored as
//! JSON text; decoding failures read as "absent" rather than errors.

use log::{debug, error, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::{Command, Reply};
use crate::{GeoError, Result};

mod managed;
mod recording;

pub use self::managed::{ManagedStoreClient, StoreConfig, DEFAULT_ADDR};
pub use self::recording::{RecordingStore, StoreCall};

/// Number of times a transaction body is run before a conflict is reported.
pub const DEFAULT_TRANSACTION_ATTEMPTS: u32 = 5;

/// Capability interface over a remote key/list store.
pub trait KeyValueStore: Send + Sync {
    /// Gets and decodes the value at `key`.
    ///
    /// Returns `None` if the key does not exist or its value cannot be
    /// decoded as `T`.
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>>;

    /// Encodes `value` and stores it at `key`, expiring after `ttl_secs`.
    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()>;

    /// Encodes `value` and pushes it onto the head of the list at `key`.
    fn append_to_list<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()>;

    /// Reads the whole list at `key`, head first.
    ///
    /// Returns an empty vector if the key does not exist.
    fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>>;

    /// Runs `body` inside an optimistic transaction watching `key`.
    ///
    /// `body` reads committed state through the reader and queues writes into
    /// the batch. The batch is executed atomically afterwards; if `key`
    /// changed in between, `body` is run again from scratch.
    ///
    /// If `body` fails the batch is dropped, the error is logged, and the call
    /// returns `Ok(TransactionOutcome::Discarded)`.
    fn run_isolated_transaction<F>(&self, key: &str, body: F) -> Result<TransactionOutcome>
    where
        F: FnMut(&mut dyn TransactionReader, &mut Batch) -> Result<()>;
}

/// Read access to committed state from inside a transaction body.
pub trait TransactionReader {
    /// Length of the list at `key`, 0 if it does not exist.
    fn list_len(&mut self, key: &str) -> Result<usize>;
}

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// The batch was applied.
    Committed {
        /// Number of times the body ran.
        attempts: u32,
    },
    /// The body failed and nothing was written.
    Discarded,
}

/// Commands queued by a transaction body.
#[derive(Debug, Default)]
pub struct Batch {
    commands: Vec<Command>,
}

impl Batch {
    /// Queues removal of the tail (oldest element) of the list at `key`.
    pub fn pop_oldest(&mut self, key: &str) {
        self.commands.push(Command::RPop {
            key: key.to_owned(),
        });
    }

    /// Queues a push of the encoded `value` onto the head of the list at `key`.
    pub fn push_newest<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        self.commands.push(Command::LPush {
            key: key.to_owned(),
            values: vec![serde_json::to_string(value)?],
        });
        Ok(())
    }

    /// Queued commands, in order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if nothing was queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// The watch/exec half of a store connection.
pub(crate) trait Session: TransactionReader {
    fn watch(&mut self, key: &str) -> Result<()>;

    fn unwatch(&mut self) -> Result<()>;

    /// `None` means a watched key changed and nothing was applied.
    fn exec(&mut self, commands: Vec<Command>) -> Result<Option<Vec<Reply>>>;
}

/// Drives watch → body → exec, retrying on conflict.
pub(crate) fn run_transaction<S, F>(
    session: &mut S,
    key: &str,
    max_attempts: u32,
    mut body: F,
) -> Result<TransactionOutcome>
where
    S: Session,
    F: FnMut(&mut dyn TransactionReader, &mut Batch) -> Result<()>,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        session.watch(key)?;

        let mut batch = Batch::default();
        if let Err(e) = body(&mut *session, &mut batch) {
            error!("Transaction on {} discarded: {}", key, e);
            if let Err(e) = session.unwatch() {
                warn!("Unwatch of {} failed: {}", key, e);
            }
            return Ok(TransactionOutcome::Discarded);
        }

        match session.exec(batch.into_commands())? {
            Some(replies) => {
                if let Some(msg) = replies.into_iter().find_map(|reply| match reply {
                    Reply::Error(msg) => Some(msg),
                    _ => None,
                }) {
                    return Err(GeoError::Store(msg));
                }
                debug!("Transaction on {} committed after {} attempt(s)", key, attempt);
                return Ok(TransactionOutcome::Committed { attempts: attempt });
            }
            None => warn!(
                "Transaction on {} conflicted (attempt {}/{})",
                key, attempt, max_attempts
            ),
        }
    }

    Err(GeoError::TransactionConflict {
        key: key.to_owned(),
        attempts: max_attempts,
    })
}

pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(GeoError::InvalidKey);
    }
    Ok(())
}

/// Decodes a stored value, logging and returning `None` on failure.
pub(crate) fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Undecodable value at {}: {}", key, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_is_invalid() {
        assert!(matches!(validate_key(""), Err(GeoError::InvalidKey)));
        assert!(validate_key("a").is_ok());
    }

    #[test]
    fn decode_failure_is_absent() {
        assert_eq!(decode::<Vec<f64>>("k", "[1.0, 2.0]"), Some(vec![1.0, 2.0]));
        assert_eq!(decode::<Vec<f64>>("k", "not json"), None);
        assert_eq!(decode::<u32>("k", "\"text\""), None);
    }

    #[test]
    fn batch_queues_in_order() {
        let mut batch = Batch::default();
        assert!(batch.is_empty());
        batch.pop_oldest("k");
        batch.push_newest("k", &[1.5, -2.0]).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(
            batch.commands(),
            &[
                Command::RPop { key: "k".into() },
                Command::LPush {
                    key: "k".into(),
                    values: vec!["[1.5,-2.0]".into()],
                },
            ]
        );
    }
}
