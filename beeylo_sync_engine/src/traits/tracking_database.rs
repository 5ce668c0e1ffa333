use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    db_types::{Fulfillment, FulfillmentTrackingUpdate, NewTrackingEvent, TrackingEvent},
    traits::StoreError,
};

/// A fulfillment whose shipment should be looked up again, along with the tenant it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentToCheck {
    pub store_id: i64,
    pub fulfillment: Fulfillment,
}

#[async_trait]
pub trait TrackingDatabase: Clone + Send + Sync + 'static {
    /// Appends a tracking event. Appending an identical event a second time returns the stored one.
    async fn create_tracking_event(&self, event: NewTrackingEvent) -> Result<TrackingEvent, StoreError>;

    /// Events for the fulfillment, in ascending timestamp order.
    async fn fetch_tracking_events(&self, fulfillment_id: i64) -> Result<Vec<TrackingEvent>, StoreError>;

    async fn update_fulfillment_tracking(&self, update: FulfillmentTrackingUpdate) -> Result<Fulfillment, StoreError>;

    /// Records that the shipment was considered for a lookup at `checked_at`, without touching its status. Used for
    /// shipments no courier lookup can be made for, so they stop taking up recheck batches.
    async fn mark_tracking_checked(&self, fulfillment_id: i64, checked_at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Fulfillments that have a tracking number, are not in a terminal shipment state, and were last checked before
    /// `checked_before` (or never).
    async fn fetch_shipments_to_check(
        &self,
        checked_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ShipmentToCheck>, StoreError>;
}
