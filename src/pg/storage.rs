use super::schema::{BackgroundJob, CloneOutcomeRow};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;

/// Inserts a job. Identical payloads are accepted.
pub(crate) async fn insert_job(
    pool: &PgPool,
    job_type: &str,
    data: Value,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO background_jobs (job_type, data) VALUES ($1, $2) RETURNING id",
    )
    .bind(job_type)
    .bind(data)
    .fetch_one(pool)
    .await
}

/// Lists the jobs still in the queue, oldest first.
pub(crate) async fn find_pending_jobs(
    pool: &PgPool,
    job_type: &str,
    destination_category_id: Option<i64>,
    payload_contains: Option<&str>,
) -> Result<Vec<BackgroundJob>, sqlx::Error> {
    sqlx::query_as::<_, BackgroundJob>(
        r"
        SELECT id, job_type, data, created_at, started_at
        FROM background_jobs
        WHERE job_type = $1
          AND ($2::BIGINT IS NULL OR (data ->> 'destination_category_id')::BIGINT = $2)
          AND ($3::TEXT IS NULL OR strpos(data::TEXT, $3) > 0)
        ORDER BY id ASC
        ",
    )
    .bind(job_type)
    .bind(destination_category_id)
    .bind(payload_contains)
    .fetch_all(pool)
    .await
}

/// Claims the oldest job that was never started, or whose start lies more
/// than `lease_secs` in the past, and stamps `started_at`.
///
/// The stamp is committed immediately so that other readers see the job as
/// running while it executes.
pub(crate) async fn claim_next_job(
    pool: &PgPool,
    job_type: &str,
    lease_secs: f64,
) -> Result<Option<BackgroundJob>, sqlx::Error> {
    sqlx::query_as::<_, BackgroundJob>(
        r"
        UPDATE background_jobs
        SET started_at = NOW()
        WHERE id = (
            SELECT id
            FROM background_jobs
            WHERE job_type = $1
              AND (started_at IS NULL OR started_at < NOW() - make_interval(secs => $2))
            ORDER BY id ASC
            FOR UPDATE SKIP LOCKED
            LIMIT 1
        )
        RETURNING id, job_type, data, created_at, started_at
        ",
    )
    .bind(job_type)
    .bind(lease_secs)
    .fetch_optional(pool)
    .await
}

/// Deletes a job whose execution returned
pub(crate) async fn delete_job(pool: &PgPool, job_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM background_jobs WHERE id = $1")
        .bind(job_id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Appends an outcome record
pub(crate) async fn insert_outcome(
    pool: &PgPool,
    created_at: DateTime<Utc>,
    success: bool,
    payload: Value,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO clone_outcomes (created_at, success, payload) VALUES ($1, $2, $3)")
        .bind(created_at)
        .bind(success)
        .bind(payload)
        .execute(pool)
        .await?;
    Ok(())
}

/// Lists outcome records, newest first
pub(crate) async fn find_outcomes(
    pool: &PgPool,
    payload_contains: Option<&str>,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    limit: Option<i64>,
) -> Result<Vec<CloneOutcomeRow>, sqlx::Error> {
    sqlx::query_as::<_, CloneOutcomeRow>(
        r"
        SELECT id, created_at, success, payload
        FROM clone_outcomes
        WHERE ($1::TEXT IS NULL OR strpos(payload::TEXT, $1) > 0)
          AND ($2::TIMESTAMPTZ IS NULL OR created_at >= $2)
          AND ($3::TIMESTAMPTZ IS NULL OR created_at <= $3)
        ORDER BY created_at DESC, id DESC
        LIMIT $4
        ",
    )
    .bind(payload_contains)
    .bind(since)
    .bind(until)
    .bind(limit)
    .fetch_all(pool)
    .await
}
