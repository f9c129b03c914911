//! In-memory store. One mutex across check-and-insert gives the
//! serializable behaviour the contract demands; audit rows are kept.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::errors::RegistryError;
use crate::model::{ReserveRequest, SymbolRecord, SymbolStatus};
use crate::store::SymbolStore;

pub struct MemoryStore {
    inner: Mutex<Inner>,
}

struct Inner {
    next_id: i64,
    rows: Vec<SymbolRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_id: 1,
                rows: Vec::new(),
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SymbolStore for MemoryStore {
    async fn reserve(
        &self,
        req: &ReserveRequest,
        now: DateTime<Utc>,
    ) -> Result<SymbolRecord, RegistryError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| RegistryError::Database("store poisoned".to_string()))?;

        let blocked = inner.rows.iter().any(|r| {
            r.repo == req.repo && r.branch == req.branch && r.fq_name == req.fq_name && r.is_live(now)
        });
        if blocked {
            return Err(RegistryError::Conflict(req.fq_name.clone()));
        }

        let record = SymbolRecord {
            id: inner.next_id,
            repo: req.repo.clone(),
            branch: req.branch.clone(),
            fq_name: req.fq_name.clone(),
            kind: req.kind.clone(),
            file_path: req.file_path.clone(),
            status: SymbolStatus::Reserved,
            plan_id: Some(req.plan_id.clone()),
            reserved_until: Some(now + Duration::seconds(req.ttl_sec)),
            commit_sha: None,
            created_at: now,
        };
        inner.next_id += 1;
        inner.rows.push(record.clone());
        debug!(lease_id = record.id, fq_name = %record.fq_name, "reserved in memory");
        Ok(record)
    }

    async fn claim(
        &self,
        lease_id: i64,
        commit_sha: &str,
        now: DateTime<Utc>,
    ) -> Result<SymbolRecord, RegistryError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| RegistryError::Database("store poisoned".to_string()))?;

        let row = inner
            .rows
            .iter_mut()
            .find(|r| r.id == lease_id)
            .ok_or_else(|| RegistryError::InvalidLease("lease not found".to_string()))?;

        if row.status != SymbolStatus::Reserved {
            return Err(RegistryError::InvalidLease(
                "lease not in reserved state".to_string(),
            ));
        }
        if row.reserved_until.map(|t| now > t).unwrap_or(true) {
            return Err(RegistryError::InvalidLease("lease expired".to_string()));
        }

        row.status = SymbolStatus::Active;
        row.commit_sha = Some(commit_sha.to_string());
        row.reserved_until = None;
        Ok(row.clone())
    }

    async fn lookup(
        &self,
        repo: &str,
        branch: &str,
        fq_name: &str,
    ) -> Result<Option<SymbolRecord>, RegistryError> {
        let inner = self
            .inner
            .lock()
            .map_err(|_| RegistryError::Database("store poisoned".to_string()))?;
        // Most recent row wins: expired leases stay behind for audit.
        Ok(inner
            .rows
            .iter()
            .rev()
            .find(|r| r.repo == repo && r.branch == branch && r.fq_name == fq_name)
            .cloned())
    }

    async fn health(&self) -> Result<(), RegistryError> {
        self.inner
            .lock()
            .map(|_| ())
            .map_err(|_| RegistryError::Database("store poisoned".to_string()))
    }
}
