//! PostgreSQL ramp store

use super::{RampStore, SubsidyRecord};
use crate::config::DatabaseConfig;
use crate::error::{RampError, RampResult};
use crate::ramp::{
    AssetId, ErrorLogEntry, PhaseHistoryEntry, PresignedTx, RampMetadata, RampState, RampUpdate,
    RouteClass, UnsignedTx,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

const RAMP_COLUMNS: &str = "id, quote_id, route, current_phase, unsigned_txs, presigned_txs, \
     metadata, phase_history, error_logs, created_at, updated_at";

/// Ramp store backed by PostgreSQL
pub struct PgRampStore {
    pool: PgPool,
}

impl PgRampStore {
    pub async fn new(config: &DatabaseConfig) -> RampResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;

        Ok(Self { pool })
    }

    /// Create tables inline
    pub async fn run_migrations(&self) -> RampResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ramp_states (
                id UUID PRIMARY KEY,
                quote_id TEXT NOT NULL UNIQUE,
                route JSONB NOT NULL,
                current_phase VARCHAR(40) NOT NULL,
                unsigned_txs JSONB NOT NULL,
                presigned_txs JSONB,
                metadata JSONB NOT NULL,
                phase_history JSONB NOT NULL,
                error_logs JSONB NOT NULL,
                settled BOOLEAN NOT NULL DEFAULT FALSE,
                parked BOOLEAN NOT NULL DEFAULT FALSE,
                processing_owner TEXT,
                processing_lock_at TIMESTAMPTZ,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            ALTER TABLE ramp_states
            ADD COLUMN IF NOT EXISTS parked BOOLEAN NOT NULL DEFAULT FALSE
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_ramp_states_resumable
            ON ramp_states (updated_at)
            WHERE settled = FALSE AND parked = FALSE AND presigned_txs IS NOT NULL
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subsidies (
                id BIGSERIAL PRIMARY KEY,
                ramp_id UUID NOT NULL REFERENCES ramp_states (id),
                phase VARCHAR(40) NOT NULL,
                network VARCHAR(20) NOT NULL,
                asset JSONB NOT NULL,
                amount_raw NUMERIC NOT NULL,
                payer TEXT NOT NULL,
                tx_hash TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_subsidies_ramp_id
            ON subsidies (ramp_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }

    fn row_to_state(row: &PgRow) -> RampResult<RampState> {
        let phase: String = row.try_get("current_phase")?;
        let current_phase = phase
            .parse()
            .map_err(|e: String| RampError::Internal(format!("corrupt ramp row: {}", e)))?;

        Ok(RampState {
            id: row.try_get("id")?,
            quote_id: row.try_get("quote_id")?,
            route: row.try_get::<Json<RouteClass>, _>("route")?.0,
            current_phase,
            unsigned_txs: row.try_get::<Json<Vec<UnsignedTx>>, _>("unsigned_txs")?.0,
            presigned_txs: row
                .try_get::<Option<Json<Vec<PresignedTx>>>, _>("presigned_txs")?
                .map(|j| j.0),
            metadata: row.try_get::<Json<RampMetadata>, _>("metadata")?.0,
            phase_history: row
                .try_get::<Json<Vec<PhaseHistoryEntry>>, _>("phase_history")?
                .0,
            error_logs: row.try_get::<Json<Vec<ErrorLogEntry>>, _>("error_logs")?.0,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_subsidy(row: &PgRow) -> RampResult<SubsidyRecord> {
        let parse_err = |e: String| RampError::Internal(format!("corrupt subsidy row: {}", e));
        let amount: String = row.try_get("amount_raw")?;

        Ok(SubsidyRecord {
            ramp_id: row.try_get("ramp_id")?,
            phase: row.try_get::<String, _>("phase")?.parse().map_err(parse_err)?,
            network: row.try_get::<String, _>("network")?.parse().map_err(parse_err)?,
            asset: row.try_get::<Json<AssetId>, _>("asset")?.0,
            amount_raw: amount
                .parse()
                .map_err(|e: rust_decimal::Error| parse_err(e.to_string()))?,
            payer: row.try_get("payer")?,
            tx_hash: row.try_get("tx_hash")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl RampStore for PgRampStore {
    async fn create(&self, state: &RampState) -> RampResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO ramp_states
                (id, quote_id, route, current_phase, unsigned_txs, presigned_txs, metadata,
                 phase_history, error_logs, settled, parked, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(state.id)
        .bind(&state.quote_id)
        .bind(Json(&state.route))
        .bind(state.current_phase.as_str())
        .bind(Json(&state.unsigned_txs))
        .bind(state.presigned_txs.as_ref().map(Json))
        .bind(Json(&state.metadata))
        .bind(Json(&state.phase_history))
        .bind(Json(&state.error_logs))
        .bind(state.is_settled())
        .bind(state.is_parked())
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(RampError::Validation(format!(
                    "quote {} is already bound to a ramp",
                    state.quote_id
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, id: Uuid) -> RampResult<Option<RampState>> {
        let row = sqlx::query(&format!("SELECT {} FROM ramp_states WHERE id = $1", RAMP_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_state).transpose()
    }

    async fn update(&self, id: Uuid, update: RampUpdate) -> RampResult<RampState> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM ramp_states WHERE id = $1 FOR UPDATE",
            RAMP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(RampError::NotFound(id))?;

        let mut state = Self::row_to_state(&row)?;
        // A rejected update drops `tx`, which rolls back and releases the row lock
        state.apply(update)?;

        sqlx::query(
            r#"
            UPDATE ramp_states
            SET current_phase = $2, presigned_txs = $3, metadata = $4, phase_history = $5,
                error_logs = $6, settled = $7, parked = $8, updated_at = $9
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(state.current_phase.as_str())
        .bind(state.presigned_txs.as_ref().map(Json))
        .bind(Json(&state.metadata))
        .bind(Json(&state.phase_history))
        .bind(Json(&state.error_logs))
        .bind(state.is_settled())
        .bind(state.is_parked())
        .bind(state.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(ramp_id = %id, phase = %state.current_phase, "Ramp state updated");
        Ok(state)
    }

    async fn list_stale(&self, before: DateTime<Utc>, limit: usize) -> RampResult<Vec<RampState>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM ramp_states
            WHERE settled = FALSE AND parked = FALSE AND presigned_txs IS NOT NULL
              AND updated_at < $1
            ORDER BY updated_at
            LIMIT $2
            "#,
            RAMP_COLUMNS
        ))
        .bind(before)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_state).collect()
    }

    async fn try_acquire_lease(&self, id: Uuid, owner: &str, ttl: Duration) -> RampResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ramp_states
            SET processing_owner = $2, processing_lock_at = NOW()
            WHERE id = $1
              AND (processing_lock_at IS NULL
                   OR processing_lock_at <= NOW() - make_interval(secs => $3))
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }

        let exists = sqlx::query("SELECT 1 FROM ramp_states WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(RampError::NotFound(id)),
        }
    }

    async fn renew_lease(&self, id: Uuid, owner: &str) -> RampResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE ramp_states
            SET processing_lock_at = NOW()
            WHERE id = $1 AND processing_owner = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn release_lease(&self, id: Uuid, owner: &str) -> RampResult<()> {
        sqlx::query(
            r#"
            UPDATE ramp_states
            SET processing_owner = NULL, processing_lock_at = NULL
            WHERE id = $1 AND processing_owner = $2
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_subsidy(&self, record: &SubsidyRecord) -> RampResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subsidies
                (ramp_id, phase, network, asset, amount_raw, payer, tx_hash, created_at)
            VALUES ($1, $2, $3, $4, $5::NUMERIC, $6, $7, $8)
            "#,
        )
        .bind(record.ramp_id)
        .bind(record.phase.as_str())
        .bind(record.network.as_str())
        .bind(Json(&record.asset))
        .bind(record.amount_raw.to_string())
        .bind(&record.payer)
        .bind(&record.tx_hash)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn subsidies(&self, ramp_id: Uuid) -> RampResult<Vec<SubsidyRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT ramp_id, phase, network, asset, amount_raw::TEXT AS amount_raw,
                   payer, tx_hash, created_at
            FROM subsidies
            WHERE ramp_id = $1
            ORDER BY id
            "#,
        )
        .bind(ramp_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_subsidy).collect()
    }

    async fn health_check(&self) -> RampResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
