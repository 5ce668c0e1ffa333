//! `SqliteDatabase` is the concrete backend for the sync engine.
//!
//! It implements every trait in [`crate::traits`], so one instance serves as the state store and the job broker.
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{customers, db_url, fulfillments, jobs, new_pool, notifications, orders, stores, tracking, users};
use crate::{
    db_types::{
        AppUser,
        Customer,
        Fulfillment,
        FulfillmentTrackingUpdate,
        JobRecord,
        NewCustomer,
        NewFulfillment,
        NewJob,
        NewNotification,
        NewOrder,
        NewStore,
        NewTrackingEvent,
        Notification,
        Order,
        QueueName,
        Store,
        StoreSettings,
        TrackingEvent,
        UserType,
    },
    traits::{
        JobBroker,
        NotificationDatabase,
        QueueError,
        ShipmentToCheck,
        StoreError,
        SyncDatabase,
        TrackingDatabase,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `BSYNC_DATABASE_URL`.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies any outstanding schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./src/sqlite/migrations").run(&self.pool).await?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }
}

#[async_trait]
impl SyncDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_store(&self, store: NewStore) -> Result<Store, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = stores::insert_store(store, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_store(&self, id: i64) -> Result<Option<Store>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(stores::fetch_store(id, &mut conn).await?)
    }

    async fn fetch_store_by_domain(&self, shop_domain: &str) -> Result<Option<Store>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(stores::fetch_active_store_by_domain(shop_domain, &mut conn).await?)
    }

    async fn update_store_settings(&self, id: i64, settings: StoreSettings) -> Result<Store, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = stores::update_settings(id, settings, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn upsert_order(&self, order: NewOrder) -> Result<Order, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = orders::upsert_order(order, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order(id, &mut conn).await?)
    }

    async fn fetch_order_by_shopify_id(
        &self,
        store_id: i64,
        shopify_order_id: &str,
    ) -> Result<Option<Order>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(orders::fetch_order_by_shopify_id(store_id, shopify_order_id, &mut conn).await?)
    }

    async fn upsert_customer(&self, customer: NewCustomer) -> Result<Customer, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = customers::upsert_customer(customer, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_customer(&self, id: i64) -> Result<Option<Customer>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(customers::fetch_customer(id, &mut conn).await?)
    }

    async fn fetch_unlinked_customers(&self, store_id: i64) -> Result<Vec<Customer>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(customers::fetch_unlinked_customers(store_id, &mut conn).await?)
    }

    async fn upsert_fulfillment(&self, fulfillment: NewFulfillment) -> Result<Fulfillment, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = fulfillments::upsert_fulfillment(fulfillment, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_fulfillment(&self, id: i64) -> Result<Option<Fulfillment>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fulfillments::fetch_fulfillment(id, &mut conn).await?)
    }

    async fn fetch_fulfillments_for_order(&self, order_id: i64) -> Result<Vec<Fulfillment>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fulfillments::fetch_fulfillments_for_order(order_id, &mut conn).await?)
    }

    async fn insert_app_user(&self, email: &str, user_type: UserType) -> Result<AppUser, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = users::insert_app_user(email, user_type, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn find_eligible_user_by_email(&self, email: &str) -> Result<Option<AppUser>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(users::find_eligible_user_by_email(email, &mut conn).await?)
    }

    async fn link_customer_to_user(&self, customer_id: i64, user_id: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let linked = customers::link_to_user(customer_id, user_id, &mut tx).await?;
        tx.commit().await?;
        if linked {
            debug!("🗃️ Customer {customer_id} linked to app user {user_id}");
        }
        Ok(linked)
    }
}

#[async_trait]
impl TrackingDatabase for SqliteDatabase {
    async fn create_tracking_event(&self, event: NewTrackingEvent) -> Result<TrackingEvent, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = tracking::insert_event(event, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_tracking_events(&self, fulfillment_id: i64) -> Result<Vec<TrackingEvent>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(tracking::fetch_events_for_fulfillment(fulfillment_id, &mut conn).await?)
    }

    async fn update_fulfillment_tracking(&self, update: FulfillmentTrackingUpdate) -> Result<Fulfillment, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = fulfillments::update_tracking(update, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn mark_tracking_checked(&self, fulfillment_id: i64, checked_at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        fulfillments::mark_checked(fulfillment_id, checked_at, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_shipments_to_check(
        &self,
        checked_before: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<ShipmentToCheck>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(fulfillments::fetch_shipments_to_check(checked_before, limit, &mut conn).await?)
    }
}

#[async_trait]
impl NotificationDatabase for SqliteDatabase {
    async fn create_notification(&self, notification: NewNotification) -> Result<(Notification, bool), StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = notifications::idempotent_insert(notification, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn mark_notification_sent(&self, id: i64) -> Result<Notification, StoreError> {
        let mut tx = self.pool.begin().await?;
        let result = notifications::mark_sent(id, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_pending_notifications(&self, limit: u32) -> Result<Vec<Notification>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(notifications::fetch_pending(limit, &mut conn).await?)
    }

    async fn fetch_notifications_for_order(&self, order_id: i64) -> Result<Vec<Notification>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(notifications::fetch_for_order(order_id, &mut conn).await?)
    }

    async fn record_inbox_entry(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        notifications::insert_inbox_entry(notification, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[async_trait]
impl JobBroker for SqliteDatabase {
    async fn push_job(&self, job: NewJob) -> Result<i64, QueueError> {
        let mut tx = self.pool.begin().await?;
        let result = jobs::insert_job(job, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn claim_next_job(
        &self,
        queue: QueueName,
        now: i64,
        lease_until: i64,
    ) -> Result<Option<JobRecord>, QueueError> {
        let mut tx = self.pool.begin().await?;
        let expired = jobs::dead_letter_expired(queue, now, &mut tx).await?;
        if expired > 0 {
            warn!("🗃️ {expired} jobs in the {queue} queue ran out of attempts with an expired lease. Dead-lettered.");
        }
        let result = jobs::claim_next(queue, now, lease_until, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn next_available_at(&self, queue: QueueName) -> Result<Option<i64>, QueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::next_available_at(queue, &mut conn).await
    }

    async fn complete_job(&self, id: i64, now: i64) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;
        jobs::mark_completed(id, now, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn reschedule_job(&self, id: i64, available_at: i64, error: &str) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;
        jobs::reschedule(id, available_at, error, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn dead_letter_job(&self, id: i64, now: i64, error: &str) -> Result<(), QueueError> {
        let mut tx = self.pool.begin().await?;
        jobs::mark_dead_letter(id, now, error, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_job(&self, id: i64) -> Result<Option<JobRecord>, QueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::fetch_job(id, &mut conn).await
    }

    async fn fetch_dead_letters(&self, queue: QueueName, limit: u32) -> Result<Vec<JobRecord>, QueueError> {
        let mut conn = self.pool.acquire().await?;
        jobs::fetch_dead_letters(queue, limit, &mut conn).await
    }

    async fn purge_jobs(&self, queue: QueueName, completed_before: i64, dead_before: i64) -> Result<u64, QueueError> {
        let mut tx = self.pool.begin().await?;
        let purged = jobs::purge(queue, completed_before, dead_before, &mut tx).await?;
        tx.commit().await?;
        if purged > 0 {
            debug!("🗃️ Purged {purged} finished jobs from the {queue} queue");
        }
        Ok(purged)
    }
}
