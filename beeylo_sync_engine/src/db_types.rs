//! Canonical, vendor-neutral records persisted by the sync engine.
//!
//! Storefront payloads ([`shopify_tools`]) and courier responses are translated into these types before they touch the
//! database. Everything downstream of the sync engine (notifications, tracking, workers) works only with these.
use std::{fmt::Display, str::FromStr};

use beeylo_common::{Money, Secret};
use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, FromRow, Row, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid {kind} value: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

impl ConversionError {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

/// Decodes a JSON text column, falling back to the default value (with a warning) if the column holds garbage.
fn json_column<T: serde::de::DeserializeOwned + Default>(row: &SqliteRow, column: &str) -> Result<T, sqlx::Error> {
    let raw: Option<String> = row.try_get(column)?;
    match raw {
        None => Ok(T::default()),
        Some(s) => Ok(serde_json::from_str(&s).unwrap_or_else(|e| {
            warn!("🗃️ Column {column} holds invalid JSON ({e}). Using the default value.");
            T::default()
        })),
    }
}

//--------------------------------------   ShipmentStatus     ---------------------------------------------------------
/// The canonical shipment status. Every courier vocabulary (and Shopify's own `shipment_status`) is mapped onto this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    InTransit,
    OutForDelivery,
    Delivered,
    Failure,
    AvailableForPickup,
    ReturnToSender,
    Cancelled,
    Unknown,
}

impl ShipmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InTransit => "in_transit",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Failure => "failure",
            Self::AvailableForPickup => "available_for_pickup",
            Self::ReturnToSender => "return_to_sender",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }

    /// A shipment in a terminal state will not change again, so it is no longer re-checked.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::ReturnToSender | Self::Cancelled)
    }

    /// Maps Shopify's fulfillment `shipment_status` vocabulary onto the canonical status.
    pub fn from_shopify(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "label_printed" | "label_purchased" | "confirmed" => Self::Pending,
            "in_transit" => Self::InTransit,
            "out_for_delivery" => Self::OutForDelivery,
            "delivered" => Self::Delivered,
            "attempted_delivery" | "failure" => Self::Failure,
            "ready_for_pickup" => Self::AvailableForPickup,
            _ => Self::Unknown,
        }
    }
}

impl Display for ShipmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShipmentStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_transit" => Ok(Self::InTransit),
            "out_for_delivery" => Ok(Self::OutForDelivery),
            "delivered" => Ok(Self::Delivered),
            "failure" => Ok(Self::Failure),
            "available_for_pickup" => Ok(Self::AvailableForPickup),
            "return_to_sender" => Ok(Self::ReturnToSender),
            "cancelled" => Ok(Self::Cancelled),
            "unknown" => Ok(Self::Unknown),
            _ => Err(ConversionError::new("shipment status", s)),
        }
    }
}

//--------------------------------------   Stores     ---------------------------------------------------------
/// Per-tenant behaviour switches. Stored as JSON on the store row; missing keys take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub auto_sync: bool,
    pub sync_interval_minutes: u32,
    pub send_order_confirmations: bool,
    pub send_shipping_updates: bool,
    pub send_delivery_updates: bool,
    pub suppress_shopify_notifications_for_beeylo_orders: bool,
    pub notification_template_id: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            auto_sync: true,
            sync_interval_minutes: 15,
            send_order_confirmations: true,
            send_shipping_updates: true,
            send_delivery_updates: true,
            suppress_shopify_notifications_for_beeylo_orders: true,
            notification_template_id: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewStore {
    pub shop_domain: String,
    pub company_id: Option<String>,
    pub access_token: Secret<String>,
    pub scope: Option<String>,
    pub settings: StoreSettings,
}

impl NewStore {
    pub fn new(shop_domain: &str, access_token: &str) -> Self {
        Self {
            shop_domain: shop_domain.to_string(),
            company_id: None,
            access_token: Secret::from(access_token),
            scope: None,
            settings: StoreSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: StoreSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// A tenant: one connected storefront.
#[derive(Debug, Clone)]
pub struct Store {
    pub id: i64,
    pub shop_domain: String,
    pub company_id: Option<String>,
    pub access_token: Secret<String>,
    pub scope: Option<String>,
    pub is_active: bool,
    pub settings: StoreSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Store {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            shop_domain: row.try_get("shop_domain")?,
            company_id: row.try_get("company_id")?,
            access_token: Secret::new(row.try_get("access_token")?),
            scope: row.try_get("scope")?,
            is_active: row.try_get("is_active")?,
            settings: json_column(row, "settings")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

//--------------------------------------   App users     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum UserType {
    /// Shoppers using the Beeylo app.
    Consumer,
    /// Merchant staff accounts.
    Business,
    Both,
}

#[derive(Debug, Clone, FromRow)]
pub struct AppUser {
    pub id: i64,
    pub email: String,
    pub user_type: UserType,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------   Orders     ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub id: Option<String>,
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub title: String,
    pub quantity: i64,
    pub price: Money,
    pub sku: Option<String>,
    pub vendor: Option<String>,
    pub fulfillment_status: Option<String>,
    pub fulfillment_service: Option<String>,
    pub product_exists: bool,
    pub image_url: Option<String>,
}

impl OrderLineItem {
    pub fn subtotal(&self) -> Money {
        self.price * self.quantity
    }
}

/// The canonical form of a storefront order, ready to be upserted on `(store_id, shopify_order_id)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewOrder {
    pub store_id: i64,
    pub shopify_order_id: String,
    pub order_number: Option<String>,
    pub customer_id: Option<i64>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub financial_status: Option<String>,
    pub fulfillment_status: Option<String>,
    pub total_price: Money,
    pub currency: String,
    pub line_items: Vec<OrderLineItem>,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub receive_in_app: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub store_id: i64,
    pub shopify_order_id: String,
    pub order_number: Option<String>,
    pub customer_id: Option<i64>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub financial_status: Option<String>,
    pub fulfillment_status: Option<String>,
    pub total_price: Money,
    pub currency: String,
    pub line_items: Vec<OrderLineItem>,
    pub shipping_address: Option<Value>,
    pub billing_address: Option<Value>,
    pub receive_in_app: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// The order reference shown to shoppers: the storefront's order number, or its id if there is none.
    pub fn display_number(&self) -> &str {
        self.order_number.as_deref().unwrap_or(self.shopify_order_id.as_str())
    }
}

impl FromRow<'_, SqliteRow> for Order {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            store_id: row.try_get("store_id")?,
            shopify_order_id: row.try_get("shopify_order_id")?,
            order_number: row.try_get("order_number")?,
            customer_id: row.try_get("customer_id")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            financial_status: row.try_get("financial_status")?,
            fulfillment_status: row.try_get("fulfillment_status")?,
            total_price: row.try_get("total_price")?,
            currency: row.try_get("currency")?,
            line_items: json_column(row, "line_items")?,
            shipping_address: json_column(row, "shipping_address")?,
            billing_address: json_column(row, "billing_address")?,
            receive_in_app: row.try_get("receive_in_app")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            cancelled_at: row.try_get("cancelled_at")?,
        })
    }
}

//--------------------------------------   Customers     ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewCustomer {
    pub store_id: i64,
    pub shopify_customer_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub orders_count: i64,
    pub total_spent: Money,
    pub verified_email: bool,
    pub tax_exempt: bool,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub store_id: i64,
    pub shopify_customer_id: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub orders_count: i64,
    pub total_spent: Money,
    pub verified_email: bool,
    pub tax_exempt: bool,
    pub tags: Vec<String>,
    /// The Beeylo app account this customer has been linked to, if any. Once set, it is never re-evaluated.
    pub user_id: Option<i64>,
}

impl FromRow<'_, SqliteRow> for Customer {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            store_id: row.try_get("store_id")?,
            shopify_customer_id: row.try_get("shopify_customer_id")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            orders_count: row.try_get("orders_count")?,
            total_spent: row.try_get("total_spent")?,
            verified_email: row.try_get("verified_email")?,
            tax_exempt: row.try_get("tax_exempt")?,
            tags: json_column(row, "tags")?,
            user_id: row.try_get("user_id")?,
        })
    }
}

//--------------------------------------   Fulfillments     ---------------------------------------------------------
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewFulfillment {
    pub order_id: i64,
    pub shopify_fulfillment_id: String,
    pub status: Option<String>,
    pub tracking_company: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    /// Only set when the storefront reports one. Tracking results own this field otherwise.
    pub shipment_status: Option<ShipmentStatus>,
    pub line_items: Vec<OrderLineItem>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fulfillment {
    pub id: i64,
    pub order_id: i64,
    pub shopify_fulfillment_id: String,
    pub status: Option<String>,
    pub tracking_company: Option<String>,
    pub tracking_number: Option<String>,
    pub tracking_url: Option<String>,
    pub shipment_status: Option<ShipmentStatus>,
    pub line_items: Vec<OrderLineItem>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub tracking_checked_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Fulfillment {
    pub fn has_tracking(&self) -> bool {
        self.tracking_number.as_deref().map(|t| !t.trim().is_empty()).unwrap_or(false)
    }
}

impl FromRow<'_, SqliteRow> for Fulfillment {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            shopify_fulfillment_id: row.try_get("shopify_fulfillment_id")?,
            status: row.try_get("status")?,
            tracking_company: row.try_get("tracking_company")?,
            tracking_number: row.try_get("tracking_number")?,
            tracking_url: row.try_get("tracking_url")?,
            shipment_status: row.try_get("shipment_status")?,
            line_items: json_column(row, "line_items")?,
            estimated_delivery: row.try_get("estimated_delivery")?,
            actual_delivery: row.try_get("actual_delivery")?,
            tracking_checked_at: row.try_get("tracking_checked_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// The result of one tracking lookup, applied to a fulfillment row.
#[derive(Debug, Clone, PartialEq)]
pub struct FulfillmentTrackingUpdate {
    pub fulfillment_id: i64,
    pub shipment_status: ShipmentStatus,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub actual_delivery: Option<DateTime<Utc>>,
    pub checked_at: DateTime<Utc>,
}

//--------------------------------------   Tracking events     ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq)]
pub struct NewTrackingEvent {
    pub fulfillment_id: i64,
    pub courier: String,
    pub status: ShipmentStatus,
    pub description: String,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TrackingEvent {
    pub id: i64,
    pub fulfillment_id: i64,
    pub courier: String,
    pub status: ShipmentStatus,
    pub description: String,
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
}

//--------------------------------------   Notifications     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationType {
    OrderConfirmation,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderConfirmation => "order_confirmation",
            Self::OrderShipped => "order_shipped",
            Self::OrderDelivered => "order_delivered",
            Self::OrderCancelled => "order_cancelled",
        }
    }
}

impl Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a notification is meant to surface. `Email` notifications stand in for the storefront's own customer
/// emails, and are what gets suppressed for app-delivery orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum NotificationChannel {
    InApp,
    Email,
}

impl NotificationChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InApp => "in_app",
            Self::Email => "email",
        }
    }
}

impl Display for NotificationChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewNotification {
    pub order_id: i64,
    pub customer_id: Option<i64>,
    pub user_id: Option<i64>,
    pub notification_type: NotificationType,
    pub channel: NotificationChannel,
    pub title: String,
    pub message: String,
    pub payload: Value,
    pub template_id: Option<String>,
    /// Uniquely identifies the triggering event, so that replayed events never create a second notification.
    pub dedupe_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub order_id: i64,
    pub customer_id: Option<i64>,
    pub user_id: Option<i64>,
    pub notification_type: NotificationType,
    pub channel: NotificationChannel,
    pub title: String,
    pub message: String,
    pub payload: Value,
    pub template_id: Option<String>,
    pub dedupe_key: String,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Notification {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            order_id: row.try_get("order_id")?,
            customer_id: row.try_get("customer_id")?,
            user_id: row.try_get("user_id")?,
            notification_type: row.try_get("notification_type")?,
            channel: row.try_get("channel")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            payload: json_column(row, "payload")?,
            template_id: row.try_get("template_id")?,
            dedupe_key: row.try_get("dedupe_key")?,
            sent: row.try_get("sent")?,
            sent_at: row.try_get("sent_at")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

//--------------------------------------   Jobs     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum QueueName {
    Webhooks,
    Tracking,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhooks => "webhooks",
            Self::Tracking => "tracking",
        }
    }
}

impl Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueName {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webhooks" | "webhook" => Ok(Self::Webhooks),
            "tracking" => Ok(Self::Tracking),
            _ => Err(ConversionError::new("queue name", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    DeadLetter,
}

/// A job as handed to the broker. Times are unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub queue: QueueName,
    pub payload: String,
    pub priority: i64,
    pub max_attempts: u32,
    pub backoff_base_ms: i64,
    pub enqueued_at: i64,
    pub available_at: i64,
}

/// A job row, in whatever state it is in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub id: i64,
    pub queue: QueueName,
    pub payload: String,
    pub priority: i64,
    pub status: JobStatus,
    /// The number of attempts that have been started so far.
    pub attempts: u32,
    pub max_attempts: u32,
    pub backoff_base_ms: i64,
    pub enqueued_at: i64,
    pub available_at: i64,
    pub locked_until: Option<i64>,
    pub last_error: Option<String>,
    pub finished_at: Option<i64>,
}

impl FromRow<'_, SqliteRow> for JobRecord {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let attempts: i64 = row.try_get("attempts")?;
        let max_attempts: i64 = row.try_get("max_attempts")?;
        Ok(Self {
            id: row.try_get("id")?,
            queue: row.try_get("queue")?,
            payload: row.try_get("payload")?,
            priority: row.try_get("priority")?,
            status: row.try_get("status")?,
            attempts: u32::try_from(attempts).unwrap_or_default(),
            max_attempts: u32::try_from(max_attempts).unwrap_or_default(),
            backoff_base_ms: row.try_get("backoff_base_ms")?,
            enqueued_at: row.try_get("enqueued_at")?,
            available_at: row.try_get("available_at")?,
            locked_until: row.try_get("locked_until")?,
            last_error: row.try_get("last_error")?,
            finished_at: row.try_get("finished_at")?,
        })
    }
}
