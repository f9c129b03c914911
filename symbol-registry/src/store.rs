//! Storage backend contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::RegistryError;
use crate::model::{ReserveRequest, SymbolRecord};

/// Backend holding symbol rows.
///
/// Implementations must make `reserve` atomic: the check for a live record
/// and the insert happen as one unit against concurrent reserves, so that
/// of N racing calls for the same name exactly one wins.
#[async_trait]
pub trait SymbolStore: Send + Sync {
    async fn reserve(
        &self,
        req: &ReserveRequest,
        now: DateTime<Utc>,
    ) -> Result<SymbolRecord, RegistryError>;

    async fn claim(
        &self,
        lease_id: i64,
        commit_sha: &str,
        now: DateTime<Utc>,
    ) -> Result<SymbolRecord, RegistryError>;

    async fn lookup(
        &self,
        repo: &str,
        branch: &str,
        fq_name: &str,
    ) -> Result<Option<SymbolRecord>, RegistryError>;

    async fn health(&self) -> Result<(), RegistryError>;
}
