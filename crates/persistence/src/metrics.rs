//! Database metrics collection.
//!
//! Every repository query is timed with [`QueryTimer`] and lands in the
//! `database_query_duration_seconds` histogram, labelled by query name and outcome.

use metrics::{gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Record database query duration.
pub fn record_query_duration(query_name: &str, outcome: &'static str, duration_secs: f64) {
    histogram!(
        "database_query_duration_seconds",
        "query" => query_name.to_string(),
        "outcome" => outcome
    )
    .record(duration_secs);
}

/// Record database connection pool metrics.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("database_connections_active").set(active as f64);
    gauge!("database_connections_idle").set(idle as f64);
    gauge!("database_connections_total").set(size as f64);
}

/// Times one database operation.
///
/// ```ignore
/// let timer = QueryTimer::new("find_group_by_id");
/// let result = sqlx::query_as::<_, GroupEntity>(...).fetch_optional(&pool).await;
/// timer.observe(result)
/// ```
pub struct QueryTimer {
    query_name: String,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query_name: impl Into<String>) -> Self {
        Self {
            query_name: query_name.into(),
            start: Instant::now(),
        }
    }

    /// Records a successful operation.
    pub fn record(self) {
        self.finish("ok");
    }

    /// Records the operation with an outcome taken from `result`, then hands the result back.
    pub fn observe<T, E>(self, result: Result<T, E>) -> Result<T, E> {
        self.finish(outcome_label(&result));
        result
    }

    fn finish(self, outcome: &'static str) {
        let duration = self.start.elapsed().as_secs_f64();
        record_query_duration(&self.query_name, outcome, duration);
    }
}

fn outcome_label<T, E>(result: &Result<T, E>) -> &'static str {
    if result.is_ok() {
        "ok"
    } else {
        "error"
    }
}
