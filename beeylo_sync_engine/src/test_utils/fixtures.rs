use serde_json::{json, Value};

use crate::{
    db_types::{NewStore, Store, StoreSettings},
    traits::SyncDatabase,
};

pub const TEST_SHOP: &str = "beeylo-test.myshopify.com";

pub async fn insert_test_store<B: SyncDatabase>(db: &B, settings: StoreSettings) -> Store {
    db.insert_store(NewStore::new(TEST_SHOP, "shpat_test").with_settings(settings))
        .await
        .expect("Error inserting test store")
}

/// A minimal `orders/create` payload with one line item.
pub fn order_payload(id: &str, email: &str, receive_in_app: bool) -> Value {
    json!({
        "id": id,
        "email": email,
        "line_items": [{"id": 1, "title": "Honey jar", "quantity": 2, "price": "9.99"}],
        "note_attributes": [{"name": "Receive_in_Beeylo_App", "value": if receive_in_app { "Yes" } else { "No" }}]
    })
}

pub fn fulfillment_payload(id: i64, order_id: &str, company: &str, tracking_number: &str) -> Value {
    json!({
        "id": id,
        "order_id": order_id,
        "status": "success",
        "tracking_company": company,
        "tracking_number": tracking_number,
        "tracking_url": format!("https://track.example.com/{tracking_number}"),
        "line_items": []
    })
}
