//! Symbol registry: global uniqueness of fully-qualified names.
//!
//! A planner **reserves** a name before any code exists, which hands back a
//! time-limited lease; once the coding agent lands a commit it **claims**
//! the lease, upgrading the record to `active` and binding the commit SHA.
//! TTL expiry is lazy: expired reservations are treated as free at reserve
//! time and make a later claim fail, but the rows stay in the store for
//! audit. There is no sweeper.
//!
//! Uniqueness of `(repo, branch, fq_name)` is the central invariant. Both
//! store backends make the existence check and the insert atomic against
//! concurrent reserves: [`MemoryStore`] holds one mutex across the pair,
//! [`PgStore`] runs them inside a `SERIALIZABLE` transaction.

mod errors;
mod memory;
mod model;
mod postgres;
mod store;

pub use errors::RegistryError;
pub use memory::MemoryStore;
pub use model::{Lease, ReserveRequest, SymbolRecord, SymbolStatus};
pub use postgres::PgStore;
pub use store::SymbolStore;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

/// Result alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Service front for a [`SymbolStore`] backend.
pub struct SymbolRegistry {
    store: Arc<dyn SymbolStore>,
}

impl SymbolRegistry {
    pub fn new(store: Arc<dyn SymbolStore>) -> Self {
        Self { store }
    }

    /// Reserves `(repo, branch, fq_name)` for `ttl_sec` seconds.
    ///
    /// # Errors
    /// [`RegistryError::Conflict`] when an active or unexpired reserved
    /// record already holds the name.
    #[instrument(skip_all, fields(repo = %req.repo, fq_name = %req.fq_name))]
    pub async fn reserve(&self, req: &ReserveRequest) -> Result<Lease> {
        let record = self.store.reserve(req, Utc::now()).await?;
        info!(lease_id = record.id, plan_id = ?record.plan_id, "symbol reserved");
        Ok(Lease {
            lease_id: record.id,
            status: record.status,
            expires_at: record.reserved_until,
        })
    }

    /// Upgrades a lease to `active`, binding the commit SHA.
    ///
    /// # Errors
    /// [`RegistryError::InvalidLease`] when the record is missing, not in
    /// `reserved` state, or past its `reserved_until`.
    #[instrument(skip_all, fields(lease_id))]
    pub async fn claim(&self, lease_id: i64, commit_sha: &str) -> Result<SymbolRecord> {
        if commit_sha.trim().is_empty() {
            return Err(RegistryError::InvalidLease(
                "claim requires a commit sha".to_string(),
            ));
        }
        let record = self.store.claim(lease_id, commit_sha, Utc::now()).await?;
        info!(lease_id, commit_sha, "symbol claimed");
        Ok(record)
    }

    /// Fetches the record holding `(repo, branch, fq_name)`.
    ///
    /// # Errors
    /// [`RegistryError::NotFound`] when no record matches.
    pub async fn lookup(&self, repo: &str, branch: &str, fq_name: &str) -> Result<SymbolRecord> {
        match self.store.lookup(repo, branch, fq_name).await? {
            Some(record) => {
                debug!(repo, branch, fq_name, status = ?record.status, "lookup hit");
                Ok(record)
            }
            None => {
                warn!(repo, branch, fq_name, "lookup miss");
                Err(RegistryError::NotFound)
            }
        }
    }

    /// Liveness probe delegated to the backing store.
    pub async fn health(&self) -> Result<()> {
        self.store.health().await
    }
}
