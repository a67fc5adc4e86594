use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CafId, CafRefNo, CorrelationId, ZoneCode};
use domain::{
    AgentZone, Caf, CafStatus, DomainError, IntegrationMode, OutboxEntry, OutboxStatus,
    TransitionRecord, ZoneConfig,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    repository::{CafRepository, CreateOutcome, OrchestrationStore, OutboxRepository, ZoneRepository},
};

const CAF_COLUMNS: &str = "id, caf_ref_no, plan_code, is_usim, imsi, permanent_imsi, pos_agent_hrno, \
     csc_hrno, zone_code, is_agent, customer, status, created_at, updated_at";

const OUTBOX_COLUMNS: &str = "correlation_id, caf_id, caf_ref_no, target, mode, payload, status, \
     attempts, last_error, created_at, updated_at";

const OPEN_OUTBOX_INDEX: &str = "one_open_outbox_per_target";

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        tracing::info!("database migrations applied");
        Ok(())
    }

    fn row_to_caf(row: PgRow) -> Result<Caf> {
        let status: String = row.try_get("status")?;
        Ok(Caf {
            id: CafId::from_uuid(row.try_get::<Uuid, _>("id")?),
            caf_ref_no: CafRefNo::parse(row.try_get::<String, _>("caf_ref_no")?)?,
            plan_code: row.try_get("plan_code")?,
            is_usim: row.try_get("is_usim")?,
            imsi: row.try_get("imsi")?,
            permanent_imsi: row.try_get("permanent_imsi")?,
            pos_agent_hrno: row.try_get("pos_agent_hrno")?,
            csc_hrno: row.try_get("csc_hrno")?,
            zone_code: ZoneCode::parse(row.try_get::<String, _>("zone_code")?)?,
            is_agent: row.try_get("is_agent")?,
            customer: serde_json::from_value(row.try_get("customer")?)?,
            status: status.parse().map_err(DomainError::from)?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_outbox(row: PgRow) -> Result<OutboxEntry> {
        let target: String = row.try_get("target")?;
        let mode: String = row.try_get("mode")?;
        let status: String = row.try_get("status")?;
        let attempts: i32 = row.try_get("attempts")?;
        Ok(OutboxEntry {
            correlation_id: CorrelationId::new(row.try_get::<String, _>("correlation_id")?),
            caf_id: CafId::from_uuid(row.try_get::<Uuid, _>("caf_id")?),
            caf_ref_no: CafRefNo::parse(row.try_get::<String, _>("caf_ref_no")?)?,
            target: target.parse().map_err(DomainError::from)?,
            mode: mode.parse().map_err(DomainError::from)?,
            payload: row.try_get("payload")?,
            status: status.parse().map_err(DomainError::from)?,
            attempts: attempts.max(0) as u32,
            last_error: row.try_get("last_error")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_transition(row: PgRow) -> Result<TransitionRecord> {
        let from: Option<String> = row.try_get("from_status")?;
        let to: String = row.try_get("to_status")?;
        let correlation_id: Option<String> = row.try_get("correlation_id")?;
        Ok(TransitionRecord {
            caf_id: CafId::from_uuid(row.try_get::<Uuid, _>("caf_id")?),
            caf_ref_no: CafRefNo::parse(row.try_get::<String, _>("caf_ref_no")?)?,
            from: from
                .map(|s| s.parse::<CafStatus>())
                .transpose()
                .map_err(DomainError::from)?,
            to: to.parse().map_err(DomainError::from)?,
            trigger: row.try_get("trigger")?,
            actor: row.try_get("actor")?,
            detail: row.try_get("detail")?,
            correlation_id: correlation_id.map(CorrelationId::new),
            occurred_at: row.try_get::<DateTime<Utc>, _>("occurred_at")?,
        })
    }

    fn row_to_zone(row: PgRow) -> Result<ZoneConfig> {
        let mode = |column: &str| -> Result<IntegrationMode> {
            let value: String = row.try_get(column)?;
            Ok(value.parse().map_err(DomainError::from)?)
        };
        Ok(ZoneConfig {
            zone_code: ZoneCode::parse(row.try_get::<String, _>("zone_code")?)?,
            zone_name: row.try_get("zone_name")?,
            preact_mode: mode("preact_mode")?,
            tv_mode: mode("tv_mode")?,
            finalact_mode: mode("finalact_mode")?,
            commission_mode: mode("commission_mode")?,
            is_active: row.try_get("is_active")?,
        })
    }

    async fn insert_transition(
        tx: &mut Transaction<'_, Postgres>,
        record: &TransitionRecord,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO caf_transition
                (caf_id, caf_ref_no, from_status, to_status, trigger, actor, detail, correlation_id, occurred_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.caf_id.as_uuid())
        .bind(record.caf_ref_no.as_str())
        .bind(record.from.map(|s| s.as_str()))
        .bind(record.to.as_str())
        .bind(&record.trigger)
        .bind(&record.actor)
        .bind(&record.detail)
        .bind(record.correlation_id.as_ref().map(|c| c.as_str()))
        .bind(record.occurred_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Conditional status write; the row only changes if it still holds `expected`.
    async fn conditional_update(
        tx: &mut Transaction<'_, Postgres>,
        caf: &Caf,
        expected: CafStatus,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE caf
            SET status = $1, current_step = $2, updated_at = $3
            WHERE caf_ref_no = $4 AND status = $5
            "#,
        )
        .bind(caf.status.as_str())
        .bind(i16::from(caf.current_step()))
        .bind(caf.updated_at)
        .bind(caf.caf_ref_no.as_str())
        .bind(expected.as_str())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let actual: Option<String> = sqlx::query_scalar("SELECT status FROM caf WHERE caf_ref_no = $1")
            .bind(caf.caf_ref_no.as_str())
            .fetch_optional(&mut **tx)
            .await?;
        match actual {
            Some(actual) => Err(StoreError::StaleStatus {
                caf_ref_no: caf.caf_ref_no.clone(),
                expected,
                actual: actual.parse().map_err(DomainError::from)?,
            }),
            None => Err(StoreError::CafNotFound(caf.caf_ref_no.clone())),
        }
    }
}

#[async_trait]
impl CafRepository for PostgresStore {
    async fn create_if_absent(&self, caf: Caf, record: TransitionRecord) -> Result<CreateOutcome> {
        let mut tx = self.pool.begin().await?;

        let inserted: Option<Uuid> = sqlx::query_scalar(
            r#"
            INSERT INTO caf
                (id, caf_ref_no, plan_code, is_usim, imsi, permanent_imsi, pos_agent_hrno,
                 csc_hrno, zone_code, is_agent, customer, status, current_step, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (caf_ref_no) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(caf.id.as_uuid())
        .bind(caf.caf_ref_no.as_str())
        .bind(&caf.plan_code)
        .bind(caf.is_usim)
        .bind(&caf.imsi)
        .bind(&caf.permanent_imsi)
        .bind(&caf.pos_agent_hrno)
        .bind(&caf.csc_hrno)
        .bind(caf.zone_code.as_str())
        .bind(caf.is_agent)
        .bind(serde_json::to_value(&caf.customer)?)
        .bind(caf.status.as_str())
        .bind(i16::from(caf.current_step()))
        .bind(caf.created_at)
        .bind(caf.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        if inserted.is_none() {
            tx.rollback().await?;
            tracing::debug!(caf_ref_no = %caf.caf_ref_no, "CAF already exists, insert skipped");
            let existing = self
                .get_caf(&caf.caf_ref_no)
                .await?
                .ok_or_else(|| StoreError::CafNotFound(caf.caf_ref_no.clone()))?;
            return Ok(CreateOutcome::Existing(existing));
        }

        Self::insert_transition(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(CreateOutcome::Created(caf))
    }

    async fn get_caf(&self, caf_ref_no: &CafRefNo) -> Result<Option<Caf>> {
        let row = sqlx::query(&format!("SELECT {CAF_COLUMNS} FROM caf WHERE caf_ref_no = $1"))
            .bind(caf_ref_no.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_caf).transpose()
    }

    async fn update_status(
        &self,
        caf: &Caf,
        expected: CafStatus,
        record: TransitionRecord,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::conditional_update(&mut tx, caf, expected).await?;
        Self::insert_transition(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn transitions(&self, caf_ref_no: &CafRefNo) -> Result<Vec<TransitionRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT caf_id, caf_ref_no, from_status, to_status, trigger, actor, detail, correlation_id, occurred_at
            FROM caf_transition
            WHERE caf_ref_no = $1
            ORDER BY id ASC
            "#,
        )
        .bind(caf_ref_no.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_transition).collect()
    }
}

#[async_trait]
impl OutboxRepository for PostgresStore {
    async fn get_outbox(&self, correlation_id: &CorrelationId) -> Result<Option<OutboxEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM integration_outbox WHERE correlation_id = $1"
        ))
        .bind(correlation_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_outbox).transpose()
    }

    async fn list_outbox(&self, caf_ref_no: &CafRefNo) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM integration_outbox WHERE caf_ref_no = $1 ORDER BY created_at ASC, correlation_id ASC"
        ))
        .bind(caf_ref_no.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn list_pending(&self, mode: IntegrationMode) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM integration_outbox WHERE status = 'PENDING' AND mode = $1 ORDER BY created_at ASC, correlation_id ASC"
        ))
        .bind(mode.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_outbox).collect()
    }

    async fn record_attempt(
        &self,
        correlation_id: &CorrelationId,
        error: Option<String>,
    ) -> Result<OutboxEntry> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE integration_outbox
            SET attempts = attempts + 1, last_error = COALESCE($2, last_error), updated_at = NOW()
            WHERE correlation_id = $1 AND status = 'PENDING'
            RETURNING {OUTBOX_COLUMNS}
            "#
        ))
        .bind(correlation_id.as_str())
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_outbox(row),
            None => match self.get_outbox(correlation_id).await? {
                Some(entry) => Err(StoreError::OutboxNotPending {
                    correlation_id: correlation_id.clone(),
                    status: entry.status,
                }),
                None => Err(StoreError::OutboxNotFound(correlation_id.clone())),
            },
        }
    }
}

#[async_trait]
impl ZoneRepository for PostgresStore {
    async fn zone_config(&self, zone_code: &ZoneCode) -> Result<Option<ZoneConfig>> {
        let row = sqlx::query(
            r#"
            SELECT zone_code, zone_name, preact_mode, tv_mode, finalact_mode, commission_mode, is_active
            FROM zone_config
            WHERE zone_code = $1
            "#,
        )
        .bind(zone_code.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_zone).transpose()
    }

    async fn agent_zone(&self, hrno: &str) -> Result<Option<AgentZone>> {
        let row = sqlx::query(
            "SELECT hrno, agent_name, zone_code, is_active FROM agent_zone_map WHERE hrno = $1",
        )
        .bind(hrno)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(AgentZone {
                hrno: row.try_get("hrno")?,
                agent_name: row.try_get("agent_name")?,
                zone_code: ZoneCode::parse(row.try_get::<String, _>("zone_code")?)?,
                is_active: row.try_get("is_active")?,
            })),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl OrchestrationStore for PostgresStore {
    async fn create_dispatch(
        &self,
        caf: &Caf,
        expected: CafStatus,
        record: TransitionRecord,
        entry: OutboxEntry,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::conditional_update(&mut tx, caf, expected).await?;

        sqlx::query(
            r#"
            INSERT INTO integration_outbox
                (correlation_id, caf_id, caf_ref_no, target, mode, payload, status, attempts, last_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.correlation_id.as_str())
        .bind(entry.caf_id.as_uuid())
        .bind(entry.caf_ref_no.as_str())
        .bind(entry.target.as_str())
        .bind(entry.mode.as_str())
        .bind(&entry.payload)
        .bind(entry.status.as_str())
        .bind(i32::try_from(entry.attempts).unwrap_or(i32::MAX))
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e {
                if db_err.constraint() == Some(OPEN_OUTBOX_INDEX) {
                    return StoreError::OpenOutboxExists {
                        caf_ref_no: entry.caf_ref_no.clone(),
                        target: entry.target,
                    };
                }
                if db_err.is_unique_violation() {
                    return StoreError::DuplicateCorrelation(entry.correlation_id.clone());
                }
            }
            StoreError::Database(e)
        })?;

        Self::insert_transition(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn resolve_outbox(
        &self,
        correlation_id: &CorrelationId,
        status: OutboxStatus,
        last_error: Option<String>,
        caf: &Caf,
        expected: CafStatus,
        record: TransitionRecord,
    ) -> Result<OutboxEntry> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE integration_outbox
            SET status = $2, last_error = COALESCE($3, last_error), updated_at = $4
            WHERE correlation_id = $1 AND status = 'PENDING'
            RETURNING {OUTBOX_COLUMNS}
            "#
        ))
        .bind(correlation_id.as_str())
        .bind(status.as_str())
        .bind(&last_error)
        .bind(record.occurred_at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return match self.get_outbox(correlation_id).await? {
                Some(entry) => Err(StoreError::OutboxNotPending {
                    correlation_id: correlation_id.clone(),
                    status: entry.status,
                }),
                None => Err(StoreError::OutboxNotFound(correlation_id.clone())),
            };
        };
        let resolved = Self::row_to_outbox(row)?;

        Self::conditional_update(&mut tx, caf, expected).await?;
        Self::insert_transition(&mut tx, &record).await?;
        tx.commit().await?;
        Ok(resolved)
    }
}
