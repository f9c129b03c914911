//! Registry records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a symbol row.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolStatus {
    #[serde(rename = "reserved")]
    Reserved,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "deprecated")]
    Deprecated,
}

impl SymbolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolStatus::Reserved => "reserved",
            SymbolStatus::Active => "active",
            SymbolStatus::Deprecated => "deprecated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reserved" => Some(SymbolStatus::Reserved),
            "active" => Some(SymbolStatus::Active),
            "deprecated" => Some(SymbolStatus::Deprecated),
            _ => None,
        }
    }
}

/// One stored symbol row. A `reserved` row has `reserved_until` set and no
/// commit; an `active` row has a commit and no `reserved_until`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymbolRecord {
    pub id: i64,
    pub repo: String,
    pub branch: String,
    pub fq_name: String,
    pub kind: String,
    pub file_path: String,
    pub status: SymbolStatus,
    pub plan_id: Option<String>,
    pub reserved_until: Option<DateTime<Utc>>,
    pub commit_sha: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SymbolRecord {
    /// Whether this row still blocks a new reservation at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            SymbolStatus::Active => true,
            SymbolStatus::Reserved => self.reserved_until.map(|t| now <= t).unwrap_or(false),
            SymbolStatus::Deprecated => false,
        }
    }
}

/// Parameters of a reserve call.
#[derive(Clone, Debug)]
pub struct ReserveRequest {
    pub repo: String,
    pub branch: String,
    pub fq_name: String,
    pub kind: String,
    pub file_path: String,
    pub plan_id: String,
    pub ttl_sec: i64,
}

/// What a successful reserve hands back to the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lease {
    pub lease_id: i64,
    pub status: SymbolStatus,
    pub expires_at: Option<DateTime<Utc>>,
}
