use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use log::{error, info};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{
    decode, run_transaction, validate_key, Batch, KeyValueStore, Session, TransactionOutcome,
    TransactionReader, DEFAULT_TRANSACTION_ATTEMPTS,
};
use crate::client::{unexpected, Connection};
use crate::common::{Command, Reply, Request, Response};
use crate::{GeoError, Result};

/// Default address of the store server.
pub const DEFAULT_ADDR: &str = "127.0.0.1:4000";

/// Connection settings for [`ManagedStoreClient`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Address of the store server.
    pub addr: SocketAddr,
    /// Connect, read and write timeout.
    pub timeout: Duration,
    /// How many times a conflicting transaction is attempted.
    pub max_transaction_attempts: u32,
}

impl StoreConfig {
    /// Default settings for the server at `addr`.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: Duration::from_millis(5_000),
            max_transaction_attempts: DEFAULT_TRANSACTION_ATTEMPTS,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 4000)))
    }
}

/// A [`KeyValueStore`] backed by a `geostore-server` over TCP.
///
/// Plain operations share one long-lived connection. Transactions open their
/// own connection so that watch state is never shared between callers, and
/// dropping it on any exit path discards the uncommitted batch.
pub struct ManagedStoreClient {
    config: StoreConfig,
    connection: Mutex<Option<Connection>>,
}

impl ManagedStoreClient {
    /// Creates a disconnected client. Call [`connect`](Self::connect) before use.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
        }
    }

    /// Opens the shared connection and checks it with a ping.
    pub fn connect(&self) -> Result<()> {
        let connection = Connection::open(self.config.addr, self.config.timeout).and_then(
            |mut connection| {
                connection.ping()?;
                Ok(connection)
            },
        );
        let connection = connection.inspect_err(|e| self.on_error(e))?;

        *self.connection.lock()? = Some(connection);
        info!("Store connected at {}", self.config.addr);
        Ok(())
    }

    /// Closes the shared connection. Does nothing if already closed.
    pub fn disconnect(&self) -> Result<()> {
        if self.connection.lock()?.take().is_some() {
            info!("Store disconnected from {}", self.config.addr);
        }
        Ok(())
    }

    /// Returns `true` while the shared connection is open.
    pub fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .map(|connection| connection.is_some())
            .unwrap_or_default()
    }

    /// The client's settings.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn on_error(&self, e: &GeoError) {
        error!("Store client error ({}): {}", self.config.addr, e);
    }

    /// Runs `f` on the shared connection, dropping it on transport failure.
    fn with_connection<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.connection.lock()?;
        let connection = guard.as_mut().ok_or(GeoError::NotConnected)?;
        let result = f(connection);
        if let Err(e) = &result {
            if e.is_transport() {
                self.on_error(e);
                *guard = None;
            }
        }
        result
    }
}

impl Session for Connection {
    fn watch(&mut self, key: &str) -> Result<()> {
        match self.send(&Request::Watch {
            key: key.to_owned(),
        })? {
            Response::Reply(Reply::Ok) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn unwatch(&mut self) -> Result<()> {
        match self.send(&Request::Unwatch)? {
            Response::Reply(Reply::Ok) => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn exec(&mut self, commands: Vec<Command>) -> Result<Option<Vec<Reply>>> {
        match self.send(&Request::Exec { commands })? {
            Response::Batch(replies) => Ok(Some(replies)),
            Response::Aborted => Ok(None),
            other => Err(unexpected(&other)),
        }
    }
}

impl KeyValueStore for ManagedStoreClient {
    fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        validate_key(key)?;
        let reply = self.with_connection(|c| {
            c.call(Command::Get {
                key: key.to_owned(),
            })
        })?;
        match reply {
            Reply::Value(raw) => Ok(decode(key, &raw)),
            Reply::Nil => Ok(None),
            other => Err(GeoError::StringError(format!("Unexpected reply: {other:?}"))),
        }
    }

    fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        validate_key(key)?;
        let value = serde_json::to_string(value)?;
        self.with_connection(|c| {
            c.call(Command::Set {
                key: key.to_owned(),
                value,
                ttl_secs,
            })
        })?;
        Ok(())
    }

    fn append_to_list<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        validate_key(key)?;
        let value = serde_json::to_string(value)?;
        self.with_connection(|c| {
            c.call(Command::LPush {
                key: key.to_owned(),
                values: vec![value],
            })
        })?;
        Ok(())
    }

    fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        validate_key(key)?;
        let reply = self.with_connection(|c| {
            c.call(Command::LRange {
                key: key.to_owned(),
                start: 0,
                stop: -1,
            })
        })?;
        match reply {
            Reply::List(raws) => Ok(raws.iter().filter_map(|raw| decode(key, raw)).collect()),
            other => Err(GeoError::StringError(format!("Unexpected reply: {other:?}"))),
        }
    }

    fn run_isolated_transaction<F>(&self, key: &str, body: F) -> Result<TransactionOutcome>
    where
        F: FnMut(&mut dyn TransactionReader, &mut Batch) -> Result<()>,
    {
        validate_key(key)?;
        if !self.is_connected() {
            return Err(GeoError::NotConnected);
        }
        info!("Starting transaction on {}", key);

        let mut session = Connection::open(self.config.addr, self.config.timeout)
            .inspect_err(|e| self.on_error(e))?;
        run_transaction(
            &mut session,
            key,
            self.config.max_transaction_attempts,
            body,
        )
        .inspect_err(|e| {
            if e.is_transport() {
                self.on_error(e);
            }
        })
    }
}
