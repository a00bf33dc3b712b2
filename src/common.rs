use serde::{Deserialize, Serialize};

/// A data command understood by the store server.
///
/// Commands can be sent one at a time or queued into an `Exec` batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Get the string value of a key.
    Get {
        /// The key to look up.
        key: String,
    },
    /// Set a string value that expires after `ttl_secs`.
    Set {
        /// The key to set.
        key: String,
        /// The value to associate with the key.
        value: String,
        /// Seconds until the key expires. Must be positive.
        ttl_secs: u64,
    },
    /// Push values onto the head of a list, creating it if needed.
    LPush {
        /// The list key.
        key: String,
        /// Values to push, in push order.
        values: Vec<String>,
    },
    /// Remove and return the tail of a list.
    RPop {
        /// The list key.
        key: String,
    },
    /// Length of a list.
    LLen {
        /// The list key.
        key: String,
    },
    /// Inclusive range of a list. Negative indices count from the tail.
    LRange {
        /// The list key.
        key: String,
        /// First index.
        start: i64,
        /// Last index.
        stop: i64,
    },
}

/// Request sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Liveness check.
    Ping,
    /// Run a single command immediately.
    Command(Command),
    /// Remember the current version of a key for the next `Exec`.
    Watch {
        /// The key to watch.
        key: String,
    },
    /// Forget all watched keys of this connection.
    Unwatch,
    /// Apply a batch atomically unless a watched key changed.
    Exec {
        /// The queued commands.
        commands: Vec<Command>,
    },
}

/// Result of a single command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// Command succeeded without a value.
    Ok,
    /// No value at the key.
    Nil,
    /// A string value.
    Value(String),
    /// An integer result, such as a list length.
    Int(u64),
    /// A list of values.
    List(Vec<String>),
    /// The command was rejected, e.g. it targeted a key of the wrong type.
    Error(String),
}

/// Response sent from server to client.
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    /// Answer to `Ping`.
    Pong,
    /// Answer to a single command, `Watch` or `Unwatch`.
    Reply(Reply),
    /// Replies of a committed `Exec`, one per command.
    Batch(Vec<Reply>),
    /// A watched key changed; nothing was applied.
    Aborted,
    /// The server failed to handle the request.
    Err(String),
}
