use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::utils::IdRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitmentStatus {
    Pending,
    /// Older backends report an accepted commitment as `active`.
    #[serde(alias = "active")]
    Committed,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeadlineWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentCommitmentEntity {
    #[serde(rename = "_id")]
    pub id: String,
    pub startup: IdRef,
    pub investor: IdRef,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub milestone: Option<IdRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DeadlineWindow>,
    pub status: CommitmentStatus,
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
