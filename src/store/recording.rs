use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use log::info;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{
    decode, run_transaction, validate_key, Batch, KeyValueStore, Session, TransactionOutcome,
    TransactionReader, DEFAULT_TRANSACTION_ATTEMPTS,
};
use crate::common::{Command, Reply};
use crate::engines::{ListEngine, MemoryEngine};
use crate::{GeoError, Result};

/// A call made against a [`RecordingStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum StoreCall {
    /// `get(key)`
    Get(String),
    /// `set(key, encoded value, ttl)`
    Set(String, String, u64),
    /// `append_to_list(key, encoded value)`
    AppendToList(String, String),
    /// `read_list(key)`
    ReadList(String),
    /// `run_isolated_transaction(key, ..)`
    Transaction(String),
}

/// An in-process [`KeyValueStore`] that records every call.
///
/// Data lives in a [`MemoryEngine`], so the store behaves like the real one,
/// including watch conflicts. Conflicts can also be forced with
/// [`inject_conflicts`](Self::inject_conflicts).
#[derive(Default)]
pub struct RecordingStore {
    engine: MemoryEngine,
    calls: Mutex<Vec<StoreCall>>,
    pending_conflicts: AtomicU32,
    max_transaction_attempts: Option<u32>,
}

impl RecordingStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many times a conflicting transaction is attempted.
    pub fn with_max_transaction_attempts(mut self, attempts: u32) -> Self {
        self.max_transaction_attempts = Some(attempts);
        self
    }

    /// The engine holding the store's data.
    pub fn engine(&self) -> &MemoryEngine {
        &self.engine
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    /// Makes the next `n` transaction commits fail as if the key had changed.
    pub fn inject_conflicts(&self, n: u32) {
        self.pending_conflicts.store(n, Ordering::SeqCst);
    }

    fn record(&self, call: StoreCall) -> Result<()> {
        self.calls.lock()?.push(call);
        Ok(())
    }

    fn call(&self, command: Command) -> Result<Reply> {
        match self.engine.apply(command)? {
            Reply::Error(msg) => Err(GeoError::Store(msg)),
            reply => Ok(reply),
        }
    }
}

/// A transaction session over the in-process engine.
struct EngineSession<'a> {
    engine: &'a MemoryEngine,
    watched: Vec<(String, u64)>,
    pending_conflicts: &'a AtomicU32,
}

impl TransactionReader for EngineSession<'_> {
    fn list_len(&mut self, key: &str) -> Result<usize> {
        match self.engine.apply(Command::LLen {
            key: key.to_owned(),
        })? {
            Reply::Int(len) => Ok(len as usize),
            Reply::Error(msg) => Err(GeoError::Store(msg)),
            other => Err(GeoError::StringError(format!("Unexpected reply: {other:?}"))),
        }
    }
}

impl Session for EngineSession<'_> {
    fn watch(&mut self, key: &str) -> Result<()> {
        let version = self.engine.version(key.to_owned())?;
        self.watched.push((key.to_owned(), version));
        Ok(())
    }

    fn unwatch(&mut self) -> Result<()> {
        self.watched.clear();
        Ok(())
    }

    fn exec(&mut self, commands: Vec<Command>) -> Result<Option<Vec<Reply>>> {
        let watched = std::mem::take(&mut self.watched);
        let forced = self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if forced {
            return Ok(None);
        }
        self.engine.exec(watched, commands)
    }
}

impl KeyValueStore for RecordingStore {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;
        self.record(StoreCall::Get(key.to_owned()))?;
        match self.call(Command::Get {
            key: key.to_owned(),
        })? {
            Reply::Value(raw) => Ok(decode(key, &raw)),
            _ => Ok(None),
        }
    }

    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        validate_key(key)?;
        let value = serde_json::to_string(value)?;
        self.record(StoreCall::Set(key.to_owned(), value.clone(), ttl_secs))?;
        self.call(Command::Set {
            key: key.to_owned(),
            value,
            ttl_secs,
        })?;
        Ok(())
    }

    fn append_to_list<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        validate_key(key)?;
        let value = serde_json::to_string(value)?;
        self.record(StoreCall::AppendToList(key.to_owned(), value.clone()))?;
        self.call(Command::LPush {
            key: key.to_owned(),
            values: vec![value],
        })?;
        Ok(())
    }

    fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        validate_key(key)?;
        self.record(StoreCall::ReadList(key.to_owned()))?;
        match self.call(Command::LRange {
            key: key.to_owned(),
            start: 0,
            stop: -1,
        })? {
            Reply::List(raws) => Ok(raws.iter().filter_map(|raw| decode(key, raw)).collect()),
            _ => Ok(Vec::new()),
        }
    }

    fn run_isolated_transaction<F>(&self, key: &str, body: F) -> Result<TransactionOutcome>
    where
        F: FnMut(&mut dyn TransactionReader, &mut Batch) -> Result<()>,
    {
        validate_key(key)?;
        self.record(StoreCall::Transaction(key.to_owned()))?;
        info!("Starting transaction on {}", key);

        let mut session = EngineSession {
            engine: &self.engine,
            watched: Vec::new(),
            pending_conflicts: &self.pending_conflicts,
        };
        run_transaction(
            &mut session,
            key,
            self.max_transaction_attempts
                .unwrap_or(DEFAULT_TRANSACTION_ATTEMPTS),
            body,
        )
    }
}
