
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};

use crate::database::{Collection, DistanceMetric};

/// Registry row describing a vector collection's fixed schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CollectionRecord {
    pub name: String,
    pub dimension: i64,
    pub metric: DistanceMetric,
    pub created_date: NaiveDateTime,
}

impl CollectionRecord {
    #[inline]
    pub fn to_collection(&self) -> Collection {
        Collection {
            name: self.name.clone(),
            dimension: usize::try_from(self.dimension).unwrap_or_default(),
            metric: self.metric,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum IngestStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for IngestStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            IngestStatus::Running => write!(f, "Running"),
            IngestStatus::Completed => write!(f, "Completed"),
            IngestStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// One recorded ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct IngestRun {
    pub id: i64,
    pub collection: String,
    pub status: IngestStatus,
    pub fetched: i64,
    pub embedded: i64,
    pub skipped: i64,
    pub upserted: i64,
    pub error_message: Option<String>,
    pub started_date: NaiveDateTime,
    pub finished_date: Option<NaiveDateTime>,
}

impl IngestRun {
    #[inline]
    pub fn is_running(&self) -> bool {
        self.status == IngestStatus::Running
    }

    /// Wall-clock duration, if the run has finished
    #[inline]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.finished_date
            .map(|finished| finished.signed_duration_since(self.started_date))
    }
}

/// Counters written when a run finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCounts {
    pub fetched: i64,
    pub embedded: i64,
    pub skipped: i64,
    pub upserted: i64,
}
