use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use super::{apply_command, exec_batch, now_millis, Entry, Keyspace, ListEngine};
use crate::common::{Command, Reply};
use crate::Result;

/// An in-memory key/list engine.
///
/// All state sits behind one `Mutex`, so every command and every batch is
/// applied as a single critical section. Clones share the same state.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<State>>,
}

/// Milliseconds between sweeps of expired entries.
const SWEEP_INTERVAL_MS: u64 = 1_000;

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    versions: HashMap<String, u64>,
    next_sweep: u64,
}

impl State {
    /// Drops every expired entry, at most once per sweep interval.
    fn sweep_expired(&mut self, now: u64) {
        if now < self.next_sweep {
            return;
        }
        self.entries.retain(|_, entry| !entry.is_expired(now));
        self.next_sweep = now.saturating_add(SWEEP_INTERVAL_MS);
    }
}

impl MemoryEngine {
    /// Creates an empty engine.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Keyspace for State {
    type Error = Infallible;

    fn load(&mut self, key: &str) -> std::result::Result<Option<Entry>, Infallible> {
        let now = now_millis();
        if self.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            self.entries.remove(key);
            return Ok(None);
        }
        Ok(self.entries.get(key).cloned())
    }

    fn store(&mut self, key: &str, entry: Option<Entry>) -> std::result::Result<(), Infallible> {
        *self.versions.entry(key.to_owned()).or_insert(0) += 1;
        match entry {
            Some(entry) => {
                self.entries.insert(key.to_owned(), entry);
            }
            None => {
                self.entries.remove(key);
            }
        }
        self.sweep_expired(now_millis());
        Ok(())
    }

    fn version(&mut self, key: &str) -> std::result::Result<u64, Infallible> {
        Ok(self.versions.get(key).copied().unwrap_or(0))
    }
}

impl ListEngine for MemoryEngine {
    fn apply(&self, command: Command) -> Result<Reply> {
        let mut state = self.state.lock()?;
        Ok(apply_command(&mut *state, &command).unwrap_or_else(|never| match never {}))
    }

    #[allow(clippy::needless_pass_by_value)]
    fn version(&self, key: String) -> Result<u64> {
        let mut state = self.state.lock()?;
        Ok(Keyspace::version(&mut *state, &key).unwrap_or_else(|never| match never {}))
    }

    fn exec(
        &self,
        watched: Vec<(String, u64)>,
        commands: Vec<Command>,
    ) -> Result<Option<Vec<Reply>>> {
        let mut state = self.state.lock()?;
        Ok(exec_batch(&mut *state, &watched, &commands).unwrap_or_else(|never| match never {}))
    }
}
