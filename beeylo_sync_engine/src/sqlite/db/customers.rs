use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{Customer, NewCustomer},
    traits::StoreError,
};

/// Upserts on `(store_id, shopify_customer_id)`. The `user_id` link is never touched here.
pub async fn upsert_customer(customer: NewCustomer, conn: &mut SqliteConnection) -> Result<Customer, StoreError> {
    let tags = serde_json::to_string(&customer.tags)?;
    let customer: Customer = sqlx::query_as(
        r#"
            INSERT INTO customers (
                store_id,
                shopify_customer_id,
                email,
                phone,
                first_name,
                last_name,
                orders_count,
                total_spent,
                verified_email,
                tax_exempt,
                tags
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (store_id, shopify_customer_id) DO UPDATE SET
                email = excluded.email,
                phone = excluded.phone,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                orders_count = excluded.orders_count,
                total_spent = excluded.total_spent,
                verified_email = excluded.verified_email,
                tax_exempt = excluded.tax_exempt,
                tags = excluded.tags
            RETURNING *;
        "#,
    )
    .bind(customer.store_id)
    .bind(customer.shopify_customer_id)
    .bind(customer.email)
    .bind(customer.phone)
    .bind(customer.first_name)
    .bind(customer.last_name)
    .bind(customer.orders_count)
    .bind(customer.total_spent)
    .bind(customer.verified_email)
    .bind(customer.tax_exempt)
    .bind(tags)
    .fetch_all(conn)
    .await?
    .into_iter()
    .next()
    .ok_or(sqlx::Error::RowNotFound)?;
    debug!("🗃️ Customer {} upserted with id {}", customer.shopify_customer_id, customer.id);
    Ok(customer)
}

pub async fn fetch_customer(id: i64, conn: &mut SqliteConnection) -> Result<Option<Customer>, sqlx::Error> {
    sqlx::query_as("SELECT * FROM customers WHERE id = $1").bind(id).fetch_optional(conn).await
}

pub async fn fetch_unlinked_customers(store_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Customer>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM customers WHERE store_id = $1 AND user_id IS NULL AND email IS NOT NULL AND email <> '' ORDER \
         BY id",
    )
    .bind(store_id)
    .fetch_all(conn)
    .await
}

/// Sets the user link, only if the customer has none. Returns `true` if a row was changed.
pub async fn link_to_user(customer_id: i64, user_id: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE customers SET user_id = $1 WHERE id = $2 AND user_id IS NULL")
        .bind(user_id)
        .bind(customer_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() > 0)
}
