//! Postgres gateway: pools, retry, breaker guard.

use crate::circuit::{CircuitBreaker, CircuitBreakerConfig};
use crate::config::DbConfig;
use crate::error::{StoreError, StoreResult};
use crate::migrations::{preflight_report, scan_migrations_dir, MigrationReport};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::Row;
use std::future::Future;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// The gateway: a main pool for ordinary queries and a small
/// dedicated pool behind the circuit breaker for health-sensitive
/// writes.
pub struct PgGateway {
    main: PgPool,
    breaker_pool: PgPool,
    breaker: CircuitBreaker,
    config: DbConfig,
}

impl PgGateway {
    /// Build both pools. The URL is parsed here, once.
    pub async fn connect(config: DbConfig) -> StoreResult<Arc<Self>> {
        let options = PgConnectOptions::from_str(config.url())
            .map_err(|_| StoreError::Config("DATABASE_URL failed to parse".into()))?
            .options([(
                "statement_timeout",
                config.statement_timeout_ms.to_string(),
            )]);

        let main = PgPoolOptions::new()
            .max_connections(config.main_max_connections)
            .min_connections(config.main_min_connections)
            .idle_timeout(Duration::from_millis(config.idle_timeout_ms))
            .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
            .connect_with(options.clone())
            .await
            .map_err(StoreError::from_sqlx)?;

        let breaker_pool = PgPoolOptions::new()
            .max_connections(config.breaker_max_connections)
            .acquire_timeout(Duration::from_millis(config.connect_timeout_ms))
            .connect_with(options)
            .await
            .map_err(StoreError::from_sqlx)?;

        info!(
            main_max = config.main_max_connections,
            breaker_max = config.breaker_max_connections,
            "Database pools ready"
        );

        let breaker = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: config.breaker_failure_threshold,
            cooldown: Duration::from_millis(config.breaker_cooldown_ms),
        });

        Ok(Arc::new(Self {
            main,
            breaker_pool,
            breaker,
            config,
        }))
    }

    pub fn main(&self) -> &PgPool {
        &self.main
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Run an operation with the transient-retry envelope:
    /// exponential backoff from `initial_delay_ms` capped at
    /// `max_delay_ms`, at most `max_attempts` tries.
    pub async fn with_retry<T, Fut>(
        &self,
        op: &str,
        mut run: impl FnMut() -> Fut,
    ) -> StoreResult<T>
    where
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        let retry = &self.config.retry;
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match run().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let classified = StoreError::from_sqlx(e);
                    if !classified.is_transient() || attempt >= retry.max_attempts {
                        return Err(classified);
                    }
                    let exp = attempt.saturating_sub(1).min(16);
                    let delay = retry
                        .initial_delay_ms
                        .saturating_mul(1u64 << exp)
                        .min(retry.max_delay_ms);
                    warn!(op, attempt, delay_ms = delay, "Transient database error, retrying");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }
    }

    /// Run an operation on the breaker pool, honoring breaker state.
    pub async fn with_breaker<T, Fut>(
        &self,
        op: &str,
        mut run: impl FnMut(PgPool) -> Fut,
    ) -> StoreResult<T>
    where
        Fut: Future<Output = Result<T, sqlx::Error>>,
    {
        if !self.breaker.allow() {
            debug!(op, "Breaker open, refusing query");
            return Err(StoreError::CircuitOpen);
        }
        match run(self.breaker_pool.clone()).await {
            Ok(value) => {
                self.breaker.on_success();
                Ok(value)
            }
            Err(e) => {
                self.breaker.on_failure();
                Err(StoreError::from_sqlx(e))
            }
        }
    }

    /// Create the migrations ledger if absent.
    pub async fn ensure_migrations_table(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.main)
        .await
        .map_err(StoreError::from_sqlx)?;
        Ok(())
    }

    /// Applied migration versions, sorted.
    pub async fn applied_migrations(&self) -> StoreResult<Vec<String>> {
        let rows = sqlx::query("SELECT version FROM schema_migrations ORDER BY version")
            .fetch_all(&self.main)
            .await
            .map_err(StoreError::from_sqlx)?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("version").map_err(StoreError::from_sqlx))
            .collect()
    }

    /// Compare the migrations directory against the ledger.
    pub async fn preflight(&self, migrations_dir: &Path) -> StoreResult<MigrationReport> {
        self.ensure_migrations_table().await?;
        let on_disk = scan_migrations_dir(migrations_dir)?;
        let applied = self.applied_migrations().await?;
        let report = preflight_report(&on_disk, &applied);
        if !report.is_clean() {
            warn!(
                missing = report.missing.len(),
                extra = report.extra.len(),
                "Migrations preflight found drift"
            );
        }
        Ok(report)
    }

    /// Apply pending migrations in name order.
    pub async fn apply_pending(&self, migrations_dir: &Path) -> StoreResult<usize> {
        self.ensure_migrations_table().await?;
        let report = self.preflight(migrations_dir).await?;
        let mut applied = 0usize;
        for name in &report.missing {
            let sql = std::fs::read_to_string(migrations_dir.join(name))
                .map_err(|e| StoreError::Migration(format!("cannot read {name}: {e}")))?;
            let mut tx = self.main.begin().await.map_err(StoreError::from_sqlx)?;
            sqlx::raw_sql(&sql)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;
            sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1)")
                .bind(name)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from_sqlx)?;
            tx.commit().await.map_err(StoreError::from_sqlx)?;
            info!(migration = %name, "Migration applied");
            applied += 1;
        }
        Ok(applied)
    }
}
