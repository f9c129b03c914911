//! Postgres store. Reserve and claim run inside `SERIALIZABLE`
//! transactions so the existence check and the write are atomic against
//! concurrent callers; a serialization failure surfaces as `Conflict`,
//! which is what a losing racer deserves to see.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use tracing::{info, instrument};

use crate::errors::RegistryError;
use crate::model::{ReserveRequest, SymbolRecord, SymbolStatus};
use crate::store::SymbolStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS symbols (
    id              BIGSERIAL PRIMARY KEY,
    repo            TEXT NOT NULL,
    branch          TEXT NOT NULL,
    fq_name         TEXT NOT NULL,
    kind            TEXT NOT NULL,
    file_path       TEXT NOT NULL,
    status          TEXT NOT NULL,
    plan_id         TEXT,
    reserved_until  TIMESTAMPTZ,
    commit_sha      TEXT,
    created_at      TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS symbols_name_idx ON symbols (repo, branch, fq_name);
"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connects and ensures the schema exists.
    ///
    /// # Errors
    /// [`RegistryError::Config`] when the database is unreachable; this is
    /// fatal at startup by design of the error model.
    pub async fn connect(database_url: &str) -> Result<Self, RegistryError> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await
            .map_err(|e| RegistryError::Config(format!("database unreachable: {e}")))?;

        for stmt in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(stmt).execute(&pool).await.map_err(db_err)?;
        }
        info!("symbol schema ready");
        Ok(Self { pool })
    }

    /// Connects using `DATABASE_URL`.
    pub async fn from_env() -> Result<Self, RegistryError> {
        let url = std::env::var("DATABASE_URL")
            .map_err(|_| RegistryError::Config("DATABASE_URL is required".to_string()))?;
        Self::connect(&url).await
    }
}

#[async_trait]
impl SymbolStore for PgStore {
    #[instrument(skip_all, fields(fq_name = %req.fq_name))]
    async fn reserve(
        &self,
        req: &ReserveRequest,
        now: DateTime<Utc>,
    ) -> Result<SymbolRecord, RegistryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        let live = sqlx::query(
            "SELECT id FROM symbols \
             WHERE repo = $1 AND branch = $2 AND fq_name = $3 \
               AND (status = 'active' OR (status = 'reserved' AND reserved_until >= $4)) \
             LIMIT 1",
        )
        .bind(&req.repo)
        .bind(&req.branch)
        .bind(&req.fq_name)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(conflict_or_db)?;

        if live.is_some() {
            return Err(RegistryError::Conflict(req.fq_name.clone()));
        }

        let expires = now + Duration::seconds(req.ttl_sec);
        let row = sqlx::query(
            "INSERT INTO symbols \
               (repo, branch, fq_name, kind, file_path, status, plan_id, reserved_until, commit_sha, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'reserved', $6, $7, NULL, $8) \
             RETURNING *",
        )
        .bind(&req.repo)
        .bind(&req.branch)
        .bind(&req.fq_name)
        .bind(&req.kind)
        .bind(&req.file_path)
        .bind(&req.plan_id)
        .bind(expires)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(conflict_or_db)?;

        tx.commit().await.map_err(conflict_or_db)?;
        row_to_record(&row)
    }

    async fn claim(
        &self,
        lease_id: i64,
        commit_sha: &str,
        now: DateTime<Utc>,
    ) -> Result<SymbolRecord, RegistryError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query("SELECT * FROM symbols WHERE id = $1 FOR UPDATE")
            .bind(lease_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?
            .ok_or_else(|| RegistryError::InvalidLease("lease not found".to_string()))?;

        let record = row_to_record(&row)?;
        if record.status != SymbolStatus::Reserved {
            return Err(RegistryError::InvalidLease(
                "lease not in reserved state".to_string(),
            ));
        }
        if record.reserved_until.map(|t| now > t).unwrap_or(true) {
            return Err(RegistryError::InvalidLease("lease expired".to_string()));
        }

        let row = sqlx::query(
            "UPDATE symbols \
             SET status = 'active', commit_sha = $2, reserved_until = NULL \
             WHERE id = $1 \
             RETURNING *",
        )
        .bind(lease_id)
        .bind(commit_sha)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        row_to_record(&row)
    }

    async fn lookup(
        &self,
        repo: &str,
        branch: &str,
        fq_name: &str,
    ) -> Result<Option<SymbolRecord>, RegistryError> {
        let row = sqlx::query(
            "SELECT * FROM symbols \
             WHERE repo = $1 AND branch = $2 AND fq_name = $3 \
             ORDER BY id DESC LIMIT 1",
        )
        .bind(repo)
        .bind(branch)
        .bind(fq_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn health(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(db_err)
    }
}

fn row_to_record(row: &PgRow) -> Result<SymbolRecord, RegistryError> {
    let status_raw: String = row.try_get("status").map_err(db_err)?;
    let status = SymbolStatus::parse(&status_raw)
        .ok_or_else(|| RegistryError::Database(format!("unknown status '{status_raw}'")))?;
    Ok(SymbolRecord {
        id: row.try_get("id").map_err(db_err)?,
        repo: row.try_get("repo").map_err(db_err)?,
        branch: row.try_get("branch").map_err(db_err)?,
        fq_name: row.try_get("fq_name").map_err(db_err)?,
        kind: row.try_get("kind").map_err(db_err)?,
        file_path: row.try_get("file_path").map_err(db_err)?,
        status,
        plan_id: row.try_get("plan_id").map_err(db_err)?,
        reserved_until: row.try_get("reserved_until").map_err(db_err)?,
        commit_sha: row.try_get("commit_sha").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn db_err<E: std::fmt::Display>(e: E) -> RegistryError {
    RegistryError::Database(e.to_string())
}

/// A serialization failure (SQLSTATE 40001) means another reserve won the
/// race; report it as the conflict it is.
fn conflict_or_db(e: sqlx::Error) -> RegistryError {
    if let sqlx::Error::Database(ref db) = e {
        if db.code().as_deref() == Some("40001") {
            return RegistryError::Conflict("concurrent reservation".to_string());
        }
    }
    RegistryError::Database(e.to_string())
}
