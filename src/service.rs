use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::recency::{push_bounded, storage_key, RECENCY_CAPACITY};
use crate::store::{KeyValueStore, TransactionOutcome};
use crate::Result;

/// Entity id produced by clients that serialize a missing id.
const UNDEFINED_ID: &str = "undefined";

/// A `(latitude, longitude)` pair, encoded as `[lat, lng]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position(pub f64, pub f64);

impl Position {
    /// Latitude.
    pub fn lat(&self) -> f64 {
        self.0
    }

    /// Longitude.
    pub fn lng(&self) -> f64 {
        self.1
    }
}

/// Why a request was turned down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The entity id was the literal `"undefined"`.
    InvalidItemId,
    /// The coordinates were not two numbers.
    InvalidBody,
}

impl Rejection {
    /// Message shown to the caller.
    pub fn message(&self) -> &'static str {
        match self {
            Rejection::InvalidItemId => "Invalid item id",
            Rejection::InvalidBody => {
                "Invalid request body. Expected an object with the following signature: \
                 { coordinates: [number, number] }"
            }
        }
    }
}

impl Display for Rejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of [`GeoService::ingest`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Ingest {
    /// The position was handed to the store.
    ///
    /// A `Discarded` outcome is still `Accepted`: the transaction body failed,
    /// the failure was logged, and nothing was written.
    Accepted(TransactionOutcome),
    /// The request was invalid.
    Rejected(Rejection),
}

/// Result of [`GeoService::query_latest`].
#[derive(Debug, Clone, PartialEq)]
pub enum Latest {
    /// Positions, newest first.
    Positions(Vec<Position>),
    /// The request was invalid.
    Rejected(Rejection),
}

/// Settings for [`GeoService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Maximum number of positions kept per entity.
    pub capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            capacity: RECENCY_CAPACITY,
        }
    }
}

/// Validates position updates and keeps each entity's latest positions.
///
/// The store is injected at construction and shared by every request.
pub struct GeoService<S: KeyValueStore> {
    store: Arc<S>,
    config: ServiceConfig,
}

impl<S: KeyValueStore> Clone for GeoService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config.clone(),
        }
    }
}

impl<S: KeyValueStore> GeoService<S> {
    /// Creates a service with the default capacity.
    pub fn new(store: Arc<S>) -> Self {
        Self::with_config(store, ServiceConfig::default())
    }

    /// Creates a service with explicit settings.
    pub fn with_config(store: Arc<S>, config: ServiceConfig) -> Self {
        Self { store, config }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Records a new position for `item_id`.
    ///
    /// `coordinates` must be an array of exactly two values that each parse as
    /// a finite number; numeric strings are accepted.
    pub fn ingest(&self, item_id: &str, coordinates: &Value) -> Result<Ingest> {
        if item_id == UNDEFINED_ID {
            return Ok(Ingest::Rejected(Rejection::InvalidItemId));
        }
        let Some(position) = parse_position(coordinates) else {
            return Ok(Ingest::Rejected(Rejection::InvalidBody));
        };

        let key = storage_key(item_id);
        let outcome = push_bounded(&*self.store, &key, &position, self.config.capacity)?;
        Ok(Ingest::Accepted(outcome))
    }

    /// Returns the latest positions of `item_id`, newest first.
    pub fn query_latest(&self, item_id: &str) -> Result<Latest> {
        if item_id == UNDEFINED_ID {
            return Ok(Latest::Rejected(Rejection::InvalidItemId));
        }
        let positions = self.store.read_list(&storage_key(item_id))?;
        Ok(Latest::Positions(positions))
    }
}

fn parse_position(coordinates: &Value) -> Option<Position> {
    match coordinates.as_array()?.as_slice() {
        [lat, lng] => Some(Position(parse_number(lat)?, parse_number(lng)?)),
        _ => None,
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_numbers_and_numeric_strings() {
        assert_eq!(
            parse_position(&json!([-26.13213, -46.31423])),
            Some(Position(-26.13213, -46.31423))
        );
        assert_eq!(
            parse_position(&json!(["12.5", " 7 "])),
            Some(Position(12.5, 7.0))
        );
        assert_eq!(parse_position(&json!([0, 0])), Some(Position(0.0, 0.0)));
    }

    #[test]
    fn rejects_malformed_coordinates() {
        for body in [
            json!(null),
            json!({ "lat": 1, "lng": 2 }),
            json!("1,2"),
            json!([]),
            json!([1]),
            json!([1, 2, 3]),
            json!([1, "abc"]),
            json!([true, 1]),
            json!([null, 1]),
            json!([[1], 2]),
            json!(["NaN", 1]),
            json!(["inf", 1]),
            json!(["", 1]),
        ] {
            assert_eq!(parse_position(&body), None, "accepted {body}");
        }
    }

    #[test]
    fn position_encodes_as_pair() {
        let encoded = serde_json::to_string(&Position(1.5, -2.25)).unwrap();
        assert_eq!(encoded, "[1.5,-2.25]");
        let decoded: Position = serde_json::from_str("[-26.0,-46.0]").unwrap();
        assert_eq!((decoded.lat(), decoded.lng()), (-26.0, -46.0));
    }

    #[test]
    fn rejection_messages() {
        assert_eq!(Rejection::InvalidItemId.to_string(), "Invalid item id");
        assert!(Rejection::InvalidBody
            .message()
            .contains("{ coordinates: [number, number] }"));
    }
}
