use sqlx::SqliteConnection;

use crate::{
    db_types::{JobRecord, NewJob, QueueName},
    traits::QueueError,
};

pub async fn insert_job(job: NewJob, conn: &mut SqliteConnection) -> Result<i64, QueueError> {
    let id: i64 = sqlx::query_scalar(
        r#"
            INSERT INTO jobs (queue, payload, priority, max_attempts, backoff_base_ms, enqueued_at, available_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id;
        "#,
    )
    .bind(job.queue)
    .bind(job.payload)
    .bind(job.priority)
    .bind(i64::from(job.max_attempts))
    .bind(job.backoff_base_ms)
    .bind(job.enqueued_at)
    .bind(job.available_at)
    .fetch_all(conn)
    .await?
    .into_iter()
    .next()
    .ok_or(sqlx::Error::RowNotFound)?;
    Ok(id)
}

/// Claims the next available job in a single statement, so two workers can never claim the same job.
///
/// A job is available if it is pending and due, or if it is being processed under a lease that has expired and it
/// still has attempts left.
pub async fn claim_next(
    queue: QueueName,
    now: i64,
    lease_until: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<JobRecord>, QueueError> {
    let job = sqlx::query_as(
        r#"
            UPDATE jobs SET status = 'processing', attempts = attempts + 1, locked_until = $3
            WHERE id = (
                SELECT id FROM jobs
                WHERE queue = $1
                  AND ((status = 'pending' AND available_at <= $2)
                       OR (status = 'processing' AND locked_until <= $2 AND attempts < max_attempts))
                ORDER BY priority ASC, enqueued_at ASC, id ASC
                LIMIT 1
            )
            RETURNING *;
        "#,
    )
    .bind(queue)
    .bind(now)
    .bind(lease_until)
    .fetch_all(conn)
    .await?
    .into_iter()
    .next();
    Ok(job)
}

/// Dead-letters jobs whose lease expired on their final attempt. Returns the number of jobs moved.
pub async fn dead_letter_expired(queue: QueueName, now: i64, conn: &mut SqliteConnection) -> Result<u64, QueueError> {
    let result = sqlx::query(
        r#"
            UPDATE jobs SET status = 'dead_letter', finished_at = $2, locked_until = NULL,
                last_error = 'Lease expired on the final attempt'
            WHERE queue = $1 AND status = 'processing' AND locked_until <= $2 AND attempts >= max_attempts
        "#,
    )
    .bind(queue)
    .bind(now)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn next_available_at(queue: QueueName, conn: &mut SqliteConnection) -> Result<Option<i64>, QueueError> {
    let next: Option<i64> = sqlx::query_scalar(
        r#"
            SELECT MIN(CASE WHEN status = 'pending' THEN available_at ELSE locked_until END) FROM jobs
            WHERE queue = $1 AND status IN ('pending', 'processing')
        "#,
    )
    .bind(queue)
    .fetch_one(conn)
    .await?;
    Ok(next)
}

fn expect_one(id: i64, rows: u64) -> Result<(), QueueError> {
    if rows == 0 {
        Err(QueueError::JobNotFound(id))
    } else {
        Ok(())
    }
}

pub async fn mark_completed(id: i64, now: i64, conn: &mut SqliteConnection) -> Result<(), QueueError> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'completed', finished_at = $1, locked_until = NULL WHERE id = $2 AND status <> \
         'dead_letter'",
    )
    .bind(now)
    .bind(id)
    .execute(conn)
    .await?;
    expect_one(id, result.rows_affected())
}

pub async fn reschedule(id: i64, available_at: i64, error: &str, conn: &mut SqliteConnection) -> Result<(), QueueError> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'pending', available_at = $1, last_error = $2, locked_until = NULL WHERE id = $3 \
         AND status = 'processing'",
    )
    .bind(available_at)
    .bind(error)
    .bind(id)
    .execute(conn)
    .await?;
    expect_one(id, result.rows_affected())
}

pub async fn mark_dead_letter(id: i64, now: i64, error: &str, conn: &mut SqliteConnection) -> Result<(), QueueError> {
    let result = sqlx::query(
        "UPDATE jobs SET status = 'dead_letter', finished_at = $1, last_error = $2, locked_until = NULL WHERE id = $3",
    )
    .bind(now)
    .bind(error)
    .bind(id)
    .execute(conn)
    .await?;
    expect_one(id, result.rows_affected())
}

pub async fn fetch_job(id: i64, conn: &mut SqliteConnection) -> Result<Option<JobRecord>, QueueError> {
    Ok(sqlx::query_as("SELECT * FROM jobs WHERE id = $1").bind(id).fetch_optional(conn).await?)
}

pub async fn fetch_dead_letters(
    queue: QueueName,
    limit: u32,
    conn: &mut SqliteConnection,
) -> Result<Vec<JobRecord>, QueueError> {
    let jobs = sqlx::query_as(
        "SELECT * FROM jobs WHERE queue = $1 AND status = 'dead_letter' ORDER BY finished_at DESC, id DESC LIMIT $2",
    )
    .bind(queue)
    .bind(i64::from(limit))
    .fetch_all(conn)
    .await?;
    Ok(jobs)
}

pub async fn purge(
    queue: QueueName,
    completed_before: i64,
    dead_before: i64,
    conn: &mut SqliteConnection,
) -> Result<u64, QueueError> {
    let result = sqlx::query(
        r#"
            DELETE FROM jobs WHERE queue = $1 AND (
                (status = 'completed' AND finished_at < $2) OR (status = 'dead_letter' AND finished_at < $3)
            )
        "#,
    )
    .bind(queue)
    .bind(completed_before)
    .bind(dead_before)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}
