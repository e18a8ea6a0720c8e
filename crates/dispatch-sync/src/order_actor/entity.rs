//! Entity trait implementation for [`OrderRecord`].
//!
//! Precedence between the snapshot and delta streams is decided per record by
//! timestamp: an observation whose stamp is older than the stored `updated_at` is
//! discarded. Among observations that pass the gate:
//!
//! - snapshot entries overwrite every field they carry, an explicit `canceled_at: null`
//!   included;
//! - deltas merge only the fields they carry with a value, and cannot lift a
//!   cancellation;
//! - any accepted observation clears `retired_at`.

use crate::model::{OrderId, OrderObservation, OrderPatch, OrderRecord, RecordSource, SnapshotMeta};
use crate::order_actor::OrderError;
use actor_framework::{ActorEntity, UpdateOutcome};

impl ActorEntity for OrderRecord {
    type Id = OrderId;
    type Update = OrderObservation;
    type Batch = SnapshotMeta;
    type Context = ();
    type Error = OrderError;

    fn key(update: &OrderObservation) -> Result<OrderId, OrderError> {
        update.patch.id.clone().ok_or(OrderError::MissingId)
    }

    /// Builds a record from the first observation seen for `id`.
    fn from_update(id: OrderId, update: OrderObservation, _ctx: &()) -> Result<Self, OrderError> {
        let updated_at = update.stamp();
        let OrderPatch {
            pickup,
            dropoff,
            pickup_coords,
            dropoff_coords,
            tariff,
            distance_km,
            price,
            canceled_at,
            ..
        } = update.patch;

        Ok(Self {
            id,
            pickup: pickup.unwrap_or_default(),
            dropoff: dropoff.unwrap_or_default(),
            pickup_coords,
            dropoff_coords,
            tariff,
            distance_km,
            price,
            canceled_at: canceled_at.flatten(),
            updated_at,
            retired_at: None,
            source: update.source,
        })
    }

    fn on_update(&mut self, update: OrderObservation, _ctx: &()) -> Result<UpdateOutcome, OrderError> {
        let stamp = update.stamp();
        if stamp < self.updated_at {
            return Ok(UpdateOutcome::Stale);
        }

        let patch = update.patch;
        if let Some(pickup) = patch.pickup {
            self.pickup = pickup;
        }
        if let Some(dropoff) = patch.dropoff {
            self.dropoff = dropoff;
        }
        if patch.pickup_coords.is_some() {
            self.pickup_coords = patch.pickup_coords;
        }
        if patch.dropoff_coords.is_some() {
            self.dropoff_coords = patch.dropoff_coords;
        }
        if patch.tariff.is_some() {
            self.tariff = patch.tariff;
        }
        if patch.distance_km.is_some() {
            self.distance_km = patch.distance_km;
        }
        if patch.price.is_some() {
            self.price = patch.price;
        }

        match (update.source, patch.canceled_at) {
            (RecordSource::Snapshot, Some(canceled_at)) => self.canceled_at = canceled_at,
            (RecordSource::Delta, Some(Some(canceled_at))) => {
                // first cancellation wins
                self.canceled_at.get_or_insert(canceled_at);
            }
            _ => {}
        }

        self.updated_at = stamp;
        self.retired_at = None;
        self.source = update.source;
        Ok(UpdateOutcome::Applied)
    }

    /// Retires a record the snapshot no longer lists, unless a delta newer than the
    /// fetch already told us about it.
    fn on_absent(&mut self, batch: &SnapshotMeta, _ctx: &()) -> UpdateOutcome {
        if self.retired_at.is_some() {
            return UpdateOutcome::Unchanged;
        }
        if self.source == RecordSource::Delta && self.updated_at > batch.fetched_at {
            return UpdateOutcome::Unchanged;
        }
        self.retired_at = Some(batch.fetched_at);
        UpdateOutcome::Retired
    }

    fn is_live(&self) -> bool {
        self.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
    }

    fn patch(id: &str, pickup: &str, updated_at: DateTime<Utc>) -> OrderPatch {
        OrderPatch {
            pickup: Some(pickup.to_string()),
            updated_at: Some(updated_at),
            ..OrderPatch::with_id(id)
        }
    }

    fn record(obs: OrderObservation) -> OrderRecord {
        let id = OrderRecord::key(&obs).unwrap();
        OrderRecord::from_update(id, obs, &()).unwrap()
    }

    #[test]
    fn test_older_delta_is_stale() {
        let mut rec = record(OrderObservation::snapshot(patch("1", "A", t(5)), t(5)));
        let outcome = rec
            .on_update(OrderObservation::delta(patch("1", "B", t(1)), t(6)), &())
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Stale);
        assert_eq!(rec.pickup, "A");
    }

    #[test]
    fn test_delta_merges_only_present_fields() {
        let mut first = patch("1", "A", t(1));
        first.tariff = Some("eco".into());
        let mut rec = record(OrderObservation::snapshot(first, t(1)));

        let mut later = OrderPatch::with_id("1");
        later.updated_at = Some(t(2));
        later.dropoff = Some("Station".into());
        rec.on_update(OrderObservation::delta(later, t(2)), &()).unwrap();

        assert_eq!(rec.pickup, "A");
        assert_eq!(rec.dropoff, "Station");
        assert_eq!(rec.tariff.as_deref(), Some("eco"));
        assert_eq!(rec.source, RecordSource::Delta);
    }

    #[test]
    fn test_delta_cannot_lift_cancellation_but_snapshot_can() {
        let mut canceled = patch("1", "A", t(1));
        canceled.canceled_at = Some(Some(t(1)));
        let mut rec = record(OrderObservation::delta(canceled, t(1)));

        let mut lift = OrderPatch::with_id("1");
        lift.updated_at = Some(t(2));
        lift.canceled_at = Some(None);
        rec.on_update(OrderObservation::delta(lift.clone(), t(2)), &())
            .unwrap();
        assert_eq!(rec.canceled_at, Some(t(1)));

        lift.updated_at = Some(t(3));
        rec.on_update(OrderObservation::snapshot(lift, t(3)), &())
            .unwrap();
        assert_eq!(rec.canceled_at, None);
    }

    #[test]
    fn test_absent_from_snapshot_retires_unless_newer_delta() {
        let mut from_snapshot = record(OrderObservation::snapshot(patch("1", "A", t(1)), t(1)));
        let mut from_delta = record(OrderObservation::delta(patch("2", "B", t(9)), t(9)));
        let meta = SnapshotMeta { fetched_at: t(5) };

        assert_eq!(from_snapshot.on_absent(&meta, &()), UpdateOutcome::Retired);
        assert_eq!(from_snapshot.retired_at, Some(t(5)));
        assert!(!from_snapshot.is_live());

        assert_eq!(from_delta.on_absent(&meta, &()), UpdateOutcome::Unchanged);
        assert!(from_delta.is_live());

        // Already retired records are left alone
        let later = SnapshotMeta {
            fetched_at: t(5) + Duration::minutes(1),
        };
        assert_eq!(from_snapshot.on_absent(&later, &()), UpdateOutcome::Unchanged);
        assert_eq!(from_snapshot.retired_at, Some(t(5)));
    }

    #[test]
    fn test_newer_update_revives_retired_record() {
        let mut rec = record(OrderObservation::snapshot(patch("1", "A", t(1)), t(1)));
        rec.on_absent(&SnapshotMeta { fetched_at: t(2) }, &());
        assert!(!rec.is_live());

        rec.on_update(OrderObservation::delta(patch("1", "A", t(3)), t(3)), &())
            .unwrap();
        assert!(rec.is_live());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let obs = OrderObservation::delta(OrderPatch::default(), t(0));
        assert_eq!(OrderRecord::key(&obs), Err(OrderError::MissingId));
    }
}
