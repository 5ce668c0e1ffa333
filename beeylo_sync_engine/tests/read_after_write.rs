use beeylo_sync_engine::{
    db_types::{NewNotification, NewOrder, NotificationChannel, NotificationType},
    test_utils::{
        fixtures::{insert_test_store, TEST_SHOP},
        prepare_env::{prepare_test_env, random_db_path},
    },
    traits::{NotificationDatabase, SyncDatabase},
};
use serde_json::json;
use tokio::task::JoinSet;

#[tokio::test]
async fn new_store_is_visible_on_every_connection() {
    let db = prepare_test_env(&random_db_path()).await;
    let store = insert_test_store(&db, Default::default()).await;

    let mut readers = JoinSet::new();
    for _ in 0..5 {
        let db = db.clone();
        readers.spawn(async move { db.fetch_store_by_domain(TEST_SHOP).await });
    }
    while let Some(found) = readers.join_next().await {
        let found = found.unwrap().unwrap().expect("store should be visible");
        assert_eq!(found.id, store.id);
    }
}

#[tokio::test]
async fn upserted_order_is_readable_straight_away() {
    let db = prepare_test_env(&random_db_path()).await;
    let store = insert_test_store(&db, Default::default()).await;
    let order = NewOrder {
        store_id: store.id,
        shopify_order_id: "5001".into(),
        email: Some("a@x.com".into()),
        currency: "EUR".into(),
        receive_in_app: true,
        ..Default::default()
    };
    let first = db.upsert_order(order.clone()).await.unwrap();
    let fetched = db.fetch_order(first.id).await.unwrap().expect("order should be visible");
    assert_eq!(fetched, first);

    let second = db.upsert_order(NewOrder { receive_in_app: false, ..order }).await.unwrap();
    assert_eq!(second.id, first.id);
    let fetched = db.fetch_order(first.id).await.unwrap().unwrap();
    assert!(!fetched.receive_in_app);
}

#[tokio::test]
async fn created_notification_is_pending_until_sent() {
    let db = prepare_test_env(&random_db_path()).await;
    let store = insert_test_store(&db, Default::default()).await;
    let order = db
        .upsert_order(NewOrder {
            store_id: store.id,
            shopify_order_id: "5002".into(),
            currency: "EUR".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let (notification, created) = db
        .create_notification(NewNotification {
            order_id: order.id,
            customer_id: None,
            user_id: None,
            notification_type: NotificationType::OrderConfirmation,
            channel: NotificationChannel::InApp,
            title: "Order confirmed".into(),
            message: "Your order is confirmed".into(),
            payload: json!({}),
            template_id: None,
            dedupe_key: "order-confirmation-5002".into(),
        })
        .await
        .unwrap();
    assert!(created);

    let pending = db.fetch_pending_notifications(10).await.unwrap();
    assert_eq!(pending.iter().map(|n| n.id).collect::<Vec<_>>(), vec![notification.id]);

    let sent = db.mark_notification_sent(notification.id).await.unwrap();
    assert!(sent.sent);
    assert!(db.fetch_pending_notifications(10).await.unwrap().is_empty());
}
