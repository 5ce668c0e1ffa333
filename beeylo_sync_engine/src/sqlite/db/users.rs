use chrono::Utc;
use sqlx::SqliteConnection;

use crate::{
    db_types::{AppUser, UserType},
    traits::StoreError,
};

pub async fn insert_app_user(
    email: &str,
    user_type: UserType,
    conn: &mut SqliteConnection,
) -> Result<AppUser, StoreError> {
    let user = sqlx::query_as("INSERT INTO app_users (email, user_type, created_at) VALUES ($1, $2, $3) RETURNING *")
        .bind(email.trim())
        .bind(user_type)
        .bind(Utc::now())
        .fetch_all(conn)
        .await?
        .into_iter()
        .next()
        .ok_or(sqlx::Error::RowNotFound)?;
    Ok(user)
}

/// Exact email match, ignoring case, restricted to accounts that can receive orders.
pub async fn find_eligible_user_by_email(
    email: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<AppUser>, sqlx::Error> {
    sqlx::query_as(
        "SELECT * FROM app_users WHERE email = $1 COLLATE NOCASE AND user_type IN ('consumer', 'both') ORDER BY id \
         LIMIT 1",
    )
    .bind(email.trim())
    .fetch_optional(conn)
    .await
}
