use chrono::Utc;
use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewStore, Store, StoreSettings},
    traits::StoreError,
};

pub async fn insert_store(store: NewStore, conn: &mut SqliteConnection) -> Result<Store, StoreError> {
    let now = Utc::now();
    let settings = serde_json::to_string(&store.settings)?;
    let store: Store = sqlx::query_as(
        r#"
            INSERT INTO stores (shop_domain, company_id, access_token, scope, settings, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *;
        "#,
    )
    .bind(store.shop_domain.trim().to_ascii_lowercase())
    .bind(store.company_id)
    .bind(store.access_token.reveal().clone())
    .bind(store.scope)
    .bind(settings)
    .bind(now)
    .fetch_all(conn)
    .await?
    .into_iter()
    .next()
    .ok_or(sqlx::Error::RowNotFound)?;
    debug!("🗃️ Store {} inserted with id {}", store.shop_domain, store.id);
    Ok(store)
}

pub async fn fetch_store(id: i64, conn: &mut SqliteConnection) -> Result<Option<Store>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM stores WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_active_store_by_domain(
    shop_domain: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Store>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM stores WHERE shop_domain = $1 AND is_active = 1")
        .bind(shop_domain.trim().to_ascii_lowercase())
        .fetch_optional(conn)
        .await
}

pub async fn update_settings(
    id: i64,
    settings: StoreSettings,
    conn: &mut SqliteConnection,
) -> Result<Store, StoreError> {
    let settings = serde_json::to_string(&settings)?;
    let store = sqlx::query_as("UPDATE stores SET settings = $1, updated_at = $2 WHERE id = $3 RETURNING *")
        .bind(settings)
        .bind(Utc::now())
        .bind(id)
        .fetch_all(conn)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::NotFound(format!("Store {id}")))?;
    Ok(store)
}
