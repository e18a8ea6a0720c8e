//! Order records as the view sees them, and the wire patches that feed them.
//!
//! The same [`OrderPatch`] shape arrives from two streams: entries of the periodic
//! snapshot (`GET /active-orders`) and `order-upsert` pushes on the socket. Both are
//! wrapped in an [`OrderObservation`] that remembers which stream produced it and when.

use crate::model::{LatLng, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Display;

/// Human-readable pickup or dropoff address.
pub type Address = String;

/// Server-assigned order identifier.
///
/// Servers send it as either a string or a number; both normalise to the same text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for OrderId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl<'de> Deserialize<'de> for OrderId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Ok(Self(text)),
            RawId::Number(n) => Ok(Self(n.to_string())),
        }
    }
}

/// Which stream last won for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Snapshot,
    Delta,
}

/// One order as held by the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderRecord {
    pub id: OrderId,
    pub pickup: Address,
    pub dropoff: Address,
    pub pickup_coords: Option<LatLng>,
    pub dropoff_coords: Option<LatLng>,
    pub tariff: Option<String>,
    pub distance_km: Option<f64>,
    pub price: Option<Money>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Set when an authoritative snapshot stopped listing the order.
    pub retired_at: Option<DateTime<Utc>>,
    pub source: RecordSource,
}

impl OrderRecord {
    pub fn is_canceled(&self) -> bool {
        self.canceled_at.is_some()
    }

    /// Shown in the active view: neither canceled nor retired.
    pub fn is_active(&self) -> bool {
        self.canceled_at.is_none() && self.retired_at.is_none()
    }
}

/// Partial order as it appears on the wire. Every field is optional.
///
/// `canceled_at` keeps three states apart: absent (`None`), explicit `null`
/// (`Some(None)`) and a timestamp (`Some(Some(t))`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderPatch {
    #[serde(default, alias = "orderId", skip_serializing_if = "Option::is_none")]
    pub id: Option<OrderId>,
    #[serde(default, alias = "from", skip_serializing_if = "Option::is_none")]
    pub pickup: Option<Address>,
    #[serde(default, alias = "to", skip_serializing_if = "Option::is_none")]
    pub dropoff: Option<Address>,
    #[serde(default, alias = "pickupCoords", skip_serializing_if = "Option::is_none")]
    pub pickup_coords: Option<LatLng>,
    #[serde(default, alias = "dropoffCoords", skip_serializing_if = "Option::is_none")]
    pub dropoff_coords: Option<LatLng>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tariff: Option<String>,
    #[serde(
        default,
        alias = "distance",
        alias = "distanceKm",
        skip_serializing_if = "Option::is_none"
    )]
    pub distance_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Money>,
    #[serde(
        default,
        alias = "canceledAt",
        deserialize_with = "nullable_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub canceled_at: Option<Option<DateTime<Utc>>>,
    #[serde(
        default,
        alias = "updatedAt",
        deserialize_with = "optional_time",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrderPatch {
    pub fn with_id(id: impl Into<OrderId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Whether the patch carries a cancellation timestamp.
    pub fn cancels(&self) -> bool {
        matches!(self.canceled_at, Some(Some(_)))
    }
}

/// An [`OrderPatch`] tagged with its stream and the local time it was received.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderObservation {
    pub source: RecordSource,
    pub patch: OrderPatch,
    pub observed_at: DateTime<Utc>,
}

impl OrderObservation {
    pub fn snapshot(patch: OrderPatch, fetched_at: DateTime<Utc>) -> Self {
        Self {
            source: RecordSource::Snapshot,
            patch,
            observed_at: fetched_at,
        }
    }

    pub fn delta(patch: OrderPatch, received_at: DateTime<Utc>) -> Self {
        Self {
            source: RecordSource::Delta,
            patch,
            observed_at: received_at,
        }
    }

    /// The timestamp the precedence gate compares: the server's `updated_at`, or the
    /// receive/fetch time when the server sent none.
    pub fn stamp(&self) -> DateTime<Utc> {
        self.patch.updated_at.unwrap_or(self.observed_at)
    }
}

/// Batch metadata for a snapshot sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub fetched_at: DateTime<Utc>,
}

/// One authoritative fetch of the active-order set.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub records: Vec<OrderPatch>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(records: Vec<OrderPatch>, fetched_at: DateTime<Utc>) -> Self {
        Self {
            records,
            fetched_at,
        }
    }

    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self::new(Vec::new(), fetched_at)
    }

    /// Entries that do not carry a cancellation.
    pub fn active(&self) -> impl Iterator<Item = &OrderPatch> {
        self.records.iter().filter(|patch| !patch.cancels())
    }

    pub fn meta(&self) -> SnapshotMeta {
        SnapshotMeta {
            fetched_at: self.fetched_at,
        }
    }
}

// --- wire timestamps -------------------------------------------------------

/// RFC 3339 text or epoch milliseconds.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireTime {
    Text(DateTime<Utc>),
    Millis(i64),
}

fn to_utc<E: serde::de::Error>(time: WireTime) -> Result<DateTime<Utc>, E> {
    match time {
        WireTime::Text(dt) => Ok(dt),
        WireTime::Millis(ms) => DateTime::from_timestamp_millis(ms)
            .ok_or_else(|| E::custom(format!("timestamp out of range: {ms}"))),
    }
}

fn optional_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<WireTime>::deserialize(deserializer)?
        .map(to_utc)
        .transpose()
}

fn nullable_time<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    optional_time(deserializer).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_numeric_and_text_ids_normalise() {
        let a: OrderPatch = serde_json::from_str(r#"{"id": 17}"#).unwrap();
        let b: OrderPatch = serde_json::from_str(r#"{"orderId": "17"}"#).unwrap();
        assert_eq!(a.id, Some(OrderId::from("17")));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_canceled_at_distinguishes_absent_from_null() {
        let absent: OrderPatch = serde_json::from_str(r#"{"id": "1"}"#).unwrap();
        let null: OrderPatch = serde_json::from_str(r#"{"id": "1", "canceledAt": null}"#).unwrap();
        let set: OrderPatch =
            serde_json::from_str(r#"{"id": "1", "canceled_at": "2024-05-01T10:00:00Z"}"#).unwrap();

        assert_eq!(absent.canceled_at, None);
        assert_eq!(null.canceled_at, Some(None));
        assert_eq!(
            set.canceled_at,
            Some(Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()))
        );
        assert!(set.cancels());
        assert!(!null.cancels());
    }

    #[test]
    fn test_updated_at_accepts_epoch_millis_and_aliases() {
        let patch: OrderPatch = serde_json::from_str(
            r#"{"id": 3, "updatedAt": 1714557600000, "distance": 5.0, "price": 209.6}"#,
        )
        .unwrap();
        assert_eq!(
            patch.updated_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap())
        );
        assert_eq!(patch.distance_km, Some(5.0));
        assert_eq!(patch.price, Some(Money(210)));
    }

    #[test]
    fn test_stamp_falls_back_to_observed_time() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        let obs = OrderObservation::delta(OrderPatch::with_id("9"), at);
        assert_eq!(obs.stamp(), at);
    }
}
