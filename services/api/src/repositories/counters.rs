//! Request and view counters

use anyhow::Result;
use sqlx::PgPool;

#[derive(Clone)]
pub struct CounterRepository {
    pool: PgPool,
}

impl CounterRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Count a request from `ip`, returning the new total for that address
    pub async fn record_request(&self, ip: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO requests (ip, count, last_request_at)
            VALUES ($1, 1, NOW())
            ON CONFLICT (ip) DO UPDATE
            SET count = requests.count + 1, last_request_at = NOW()
            RETURNING count
            "#,
        )
        .bind(ip)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    /// Bump the singleton view counter in a single statement
    pub async fn record_view(&self, last_view_at: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO views (id, count, last_view_at)
            VALUES (1, 1, $1)
            ON CONFLICT (id) DO UPDATE
            SET count = views.count + 1, last_view_at = EXCLUDED.last_view_at
            RETURNING count
            "#,
        )
        .bind(last_view_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
