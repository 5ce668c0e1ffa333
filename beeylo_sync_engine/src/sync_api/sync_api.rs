use std::fmt::Debug;

use log::*;
use shopify_tools::{ShopifyCustomer, ShopifyFulfillment, ShopifyOrder};

use crate::{
    db_types::{Customer, Fulfillment, Order},
    sync_api::{canonical, errors::SyncError},
    traits::SyncDatabase,
};

/// The result of syncing one storefront order.
#[derive(Debug, Clone)]
pub struct SyncedOrder {
    pub order: Order,
    /// `None` if the payload had no customer, or the customer could not be synced.
    pub customer: Option<Customer>,
    pub fulfillments: Vec<Fulfillment>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkSummary {
    pub candidates: usize,
    pub linked: usize,
}

/// `SyncApi` turns storefront payloads into canonical rows.
///
/// Every method is an idempotent upsert keyed on the storefront's ids, so any payload can be replayed safely.
pub struct SyncApi<B> {
    db: B,
}

impl<B> Debug for SyncApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SyncApi")
    }
}

impl<B: Clone> Clone for SyncApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<B> SyncApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> SyncApi<B>
where B: SyncDatabase
{
    /// Syncs an order, its customer, and any fulfillments embedded in the payload.
    ///
    /// `receive_in_app` overrides the preference in the order's note attributes. A customer that fails to sync does
    /// not stop the order: it is stored without a customer link, keeping the order's email for linking later.
    pub async fn sync_order(
        &self,
        store_id: i64,
        order: &ShopifyOrder,
        receive_in_app: Option<bool>,
    ) -> Result<SyncedOrder, SyncError> {
        if order.id.is_none() {
            return Err(SyncError::MissingPrimaryKey("order"));
        }
        let customer = match &order.customer {
            Some(c) => match self.sync_customer(store_id, c).await {
                Ok(customer) => Some(customer),
                Err(e) => {
                    warn!("🔄️ Could not sync the customer on order {:?}. Continuing without it. {e}", order.id);
                    None
                },
            },
            None => None,
        };
        let receive_in_app = receive_in_app.unwrap_or_else(|| canonical::receive_in_app(order));
        let new_order = canonical::new_order(store_id, order, customer.as_ref().map(|c| c.id), receive_in_app)?;
        let order_id = new_order.shopify_order_id.clone();
        let stored = self.db.upsert_order(new_order).await?;
        debug!("🔄️ Order {order_id} synced as #{} for store {store_id}. App delivery: {receive_in_app}", stored.id);
        let mut fulfillments = Vec::with_capacity(order.fulfillments.len());
        for f in &order.fulfillments {
            match self.sync_fulfillment(&stored, f).await {
                Ok(fulfillment) => fulfillments.push(fulfillment),
                Err(SyncError::MissingPrimaryKey(_)) => {
                    warn!("🔄️ Order {order_id} has a fulfillment without an id. Skipping it.")
                },
                Err(e) => return Err(e),
            }
        }
        Ok(SyncedOrder { order: stored, customer, fulfillments })
    }

    /// Syncs a customer and tries to link it to an app account with the same email.
    pub async fn sync_customer(&self, store_id: i64, customer: &ShopifyCustomer) -> Result<Customer, SyncError> {
        let new_customer = canonical::new_customer(store_id, customer)?;
        let stored = self.db.upsert_customer(new_customer).await?;
        trace!("🔄️ Customer {} synced as #{}", stored.shopify_customer_id, stored.id);
        match self.link_customer(&stored).await {
            Ok(user_id) if user_id != stored.user_id => Ok(Customer { user_id, ..stored }),
            Ok(_) => Ok(stored),
            Err(e) => {
                warn!("🔄️ Could not link customer #{} to an app account. {e}", stored.id);
                Ok(stored)
            },
        }
    }

    /// Syncs a fulfillment for an order that has already been stored.
    pub async fn sync_fulfillment(&self, order: &Order, fulfillment: &ShopifyFulfillment) -> Result<Fulfillment, SyncError> {
        let new_fulfillment = canonical::new_fulfillment(order.id, fulfillment)?;
        let stored = self.db.upsert_fulfillment(new_fulfillment).await?;
        debug!(
            "🔄️ Fulfillment {} synced as #{} on order #{}. Tracking: {:?} {:?}",
            stored.shopify_fulfillment_id, stored.id, order.id, stored.tracking_company, stored.tracking_number
        );
        Ok(stored)
    }

    /// Syncs a standalone fulfillment payload, such as `fulfillments/create`, onto its stored order.
    pub async fn sync_fulfillment_for_store(
        &self,
        store_id: i64,
        fulfillment: &ShopifyFulfillment,
    ) -> Result<(Order, Fulfillment), SyncError> {
        let shopify_order_id = fulfillment.order_id.as_ref().ok_or(SyncError::MissingPrimaryKey("fulfillment order"))?;
        let order = self
            .db
            .fetch_order_by_shopify_id(store_id, shopify_order_id.as_str())
            .await?
            .ok_or_else(|| SyncError::NotFound(format!("Order {shopify_order_id} for store {store_id}")))?;
        let stored = self.sync_fulfillment(&order, fulfillment).await?;
        Ok((order, stored))
    }

    /// Links the customer to an eligible app account with the same email.
    ///
    /// A customer that is already linked is never re-evaluated. Returns the customer's user id after the attempt.
    pub async fn link_customer(&self, customer: &Customer) -> Result<Option<i64>, SyncError> {
        if customer.user_id.is_some() {
            return Ok(customer.user_id);
        }
        let Some(email) = customer.email.as_deref() else {
            return Ok(None);
        };
        let Some(user) = self.db.find_eligible_user_by_email(email).await? else {
            trace!("🔄️ No app account for customer #{}", customer.id);
            return Ok(None);
        };
        if self.db.link_customer_to_user(customer.id, user.id).await? {
            info!("🔄️ Customer #{} linked to app user #{}", customer.id, user.id);
            Ok(Some(user.id))
        } else {
            // Someone else linked it first
            let current = self.db.fetch_customer(customer.id).await?;
            Ok(current.and_then(|c| c.user_id))
        }
    }

    /// Tries to link every unlinked customer of the store.
    pub async fn link_unlinked_customers(&self, store_id: i64) -> Result<LinkSummary, SyncError> {
        let customers = self.db.fetch_unlinked_customers(store_id).await?;
        let mut summary = LinkSummary { candidates: customers.len(), linked: 0 };
        for customer in &customers {
            match self.link_customer(customer).await {
                Ok(Some(_)) => summary.linked += 1,
                Ok(None) => {},
                Err(e) => warn!("🔄️ Could not link customer #{}. {e}", customer.id),
            }
        }
        info!("🔄️ Linked {} of {} unlinked customers for store {store_id}", summary.linked, summary.candidates);
        Ok(summary)
    }
}
