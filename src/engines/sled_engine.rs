use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::{Db, Transactional, Tree};

use super::{apply_command, exec_batch, now_millis, Entry, Keyspace, ListEngine};
use crate::common::{Command, Reply};
use crate::{GeoError, Result};

/// A key/list engine backed by the `sled` embedded database.
///
/// Entries and versions live in two trees that are always written inside
/// one sled transaction. `sled::Tree` is internally `Arc`-based, so cloning
/// is cheap and thread-safe.
#[derive(Clone)]
pub struct SledEngine {
    entries: Tree,
    versions: Tree,
}

impl SledEngine {
    /// Creates a `SledEngine` from an already-opened sled `Db`.
    pub fn new(db: Db) -> Result<Self> {
        Ok(Self {
            entries: db.open_tree("entries")?,
            versions: db.open_tree("versions")?,
        })
    }

    fn run<T>(&self, f: impl Fn(&mut SledKeyspace<'_>) -> TxResult<T>) -> Result<T> {
        let result = (&self.entries, &self.versions).transaction(|(entries, versions)| {
            f(&mut SledKeyspace { entries, versions })
        });
        let value = match result {
            Ok(value) => value,
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        };
        self.entries.flush()?;
        Ok(value)
    }
}

type TxResult<T> = std::result::Result<T, ConflictableTransactionError<GeoError>>;

struct SledKeyspace<'a> {
    entries: &'a TransactionalTree,
    versions: &'a TransactionalTree,
}

fn abort(e: impl Into<GeoError>) -> ConflictableTransactionError<GeoError> {
    ConflictableTransactionError::Abort(e.into())
}

impl Keyspace for SledKeyspace<'_> {
    type Error = ConflictableTransactionError<GeoError>;

    fn load(&mut self, key: &str) -> std::result::Result<Option<Entry>, Self::Error> {
        let Some(raw) = self.entries.get(key.as_bytes())? else {
            return Ok(None);
        };
        let entry: Entry = serde_json::from_slice(&raw).map_err(abort)?;
        Ok(Some(entry).filter(|entry| !entry.is_expired(now_millis())))
    }

    fn store(&mut self, key: &str, entry: Option<Entry>) -> std::result::Result<(), Self::Error> {
        let next = self.version(key)? + 1;
        self.versions
            .insert(key.as_bytes(), next.to_be_bytes().to_vec())?;
        match entry {
            Some(entry) => {
                let raw = serde_json::to_vec(&entry).map_err(abort)?;
                self.entries.insert(key.as_bytes(), raw)?;
            }
            None => {
                self.entries.remove(key.as_bytes())?;
            }
        }
        Ok(())
    }

    fn version(&mut self, key: &str) -> std::result::Result<u64, Self::Error> {
        Ok(self
            .versions
            .get(key.as_bytes())?
            .map(|raw| decode_version(&raw))
            .unwrap_or(0))
    }
}

fn decode_version(raw: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    let n = raw.len().min(8);
    bytes[..n].copy_from_slice(&raw[..n]);
    u64::from_be_bytes(bytes)
}

impl ListEngine for SledEngine {
    fn apply(&self, command: Command) -> Result<Reply> {
        self.run(|keyspace| apply_command(keyspace, &command))
    }

    #[allow(clippy::needless_pass_by_value)]
    fn version(&self, key: String) -> Result<u64> {
        Ok(self
            .versions
            .get(key.as_bytes())?
            .map(|raw| decode_version(&raw))
            .unwrap_or(0))
    }

    fn exec(
        &self,
        watched: Vec<(String, u64)>,
        commands: Vec<Command>,
    ) -> Result<Option<Vec<Reply>>> {
        self.run(|keyspace| exec_batch(keyspace, &watched, &commands))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> SledEngine {
        SledEngine::new(sled::open(dir.path()).unwrap()).unwrap()
    }

    #[test]
    fn lists_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let engine = open(&dir);
            for value in ["1", "2", "3"] {
                engine
                    .apply(Command::LPush {
                        key: "l".into(),
                        values: vec![value.into()],
                    })
                    .unwrap();
            }
        }

        let engine = open(&dir);
        let reply = engine
            .apply(Command::LRange {
                key: "l".into(),
                start: 0,
                stop: -1,
            })
            .unwrap();
        assert_eq!(
            reply,
            Reply::List(vec!["3".into(), "2".into(), "1".into()])
        );
        assert_eq!(engine.version("l".into()).unwrap(), 3);
    }

    #[test]
    fn exec_respects_watched_versions() {
        let dir = TempDir::new().unwrap();
        let engine = open(&dir);
        let push = Command::LPush {
            key: "l".into(),
            values: vec!["x".into()],
        };

        let stale = engine.version("l".into()).unwrap();
        engine.apply(push.clone()).unwrap();
        assert!(engine
            .exec(vec![("l".into(), stale)], vec![push.clone()])
            .unwrap()
            .is_none());

        let current = engine.version("l".into()).unwrap();
        let replies = engine
            .exec(vec![("l".into(), current)], vec![push])
            .unwrap()
            .unwrap();
        assert_eq!(replies, vec![Reply::Int(2)]);
    }
}
