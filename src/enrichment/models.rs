//! Enrichment job domain types.

use crate::providers::ProviderError;
use crate::selection::{QueueEntry, SelectionError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of the enrichment job.
///
/// `Idle -> Running -> {Paused, Completed}`, `Paused -> Running` on resume
/// and `{Paused, Completed} -> Idle` on reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Running,
    Paused,
    Completed,
}

impl JobState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            JobState::Idle => "idle",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Completed => "completed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(JobState::Idle),
            "running" => Some(JobState::Running),
            "paused" => Some(JobState::Paused),
            "completed" => Some(JobState::Completed),
            _ => None,
        }
    }
}

/// Classification of an item failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    RateLimited,
    Timeout,
    NotFound,
    InvalidData,
    ProviderError,
    Persistence,
}

impl FailureKind {
    /// Auto-retried in-line with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, FailureKind::RateLimited | FailureKind::Timeout)
    }

    /// Never requeued by `retry_failed`, only by a forced retry.
    pub fn is_permanent(&self) -> bool {
        matches!(self, FailureKind::NotFound | FailureKind::InvalidData)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => "rate_limited",
            FailureKind::Timeout => "timeout",
            FailureKind::NotFound => "not_found",
            FailureKind::InvalidData => "invalid_data",
            FailureKind::ProviderError => "provider_error",
            FailureKind::Persistence => "persistence",
        }
    }
}

impl From<&ProviderError> for FailureKind {
    fn from(e: &ProviderError) -> Self {
        match e {
            ProviderError::RateLimited => FailureKind::RateLimited,
            ProviderError::Timeout => FailureKind::Timeout,
            ProviderError::NotFound(_) => FailureKind::NotFound,
            ProviderError::InvalidData(_) => FailureKind::InvalidData,
            ProviderError::Api { .. } | ProviderError::Connection(_) => FailureKind::ProviderError,
        }
    }
}

/// Failure of a single salon enrichment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnrichError {
    #[error("{provider}: {source}")]
    Provider {
        provider: String,
        source: ProviderError,
    },

    #[error("Salon {0} is not in the location store")]
    MissingSalon(String),

    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl EnrichError {
    pub fn kind(&self) -> FailureKind {
        match self {
            EnrichError::Provider { source, .. } => FailureKind::from(source),
            EnrichError::MissingSalon(_) => FailureKind::NotFound,
            EnrichError::Persistence(_) => FailureKind::Persistence,
        }
    }
}

/// A salon that failed in the current job. One entry per place id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedSalon {
    pub place_id: String,
    pub name: String,
    pub state: String,
    pub city: String,
    pub error: String,
    pub kind: FailureKind,
    pub retries: u32,
    pub failed_at: i64,
}

impl FailedSalon {
    pub fn to_queue_entry(&self) -> QueueEntry {
        QueueEntry {
            place_id: self.place_id.clone(),
            name: self.name.clone(),
            state: self.state.clone(),
            city: self.city.clone(),
            retries: self.retries,
        }
    }
}

/// Errors returned by job controller operations.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("An enrichment job is already running")]
    AlreadyRunning,

    #[error("No enrichment job is running")]
    NotRunning,

    #[error("There is no paused job to resume")]
    NothingToResume,

    #[error("No failed salons are eligible for retry")]
    NothingToRetry,

    #[error("Job store error: {0}")]
    Store(String),
}

impl From<SelectionError> for JobError {
    fn from(e: SelectionError) -> Self {
        match e {
            SelectionError::Validation(msg) => JobError::Validation(msg),
            SelectionError::Store(e) => JobError::Store(format!("{:#}", e)),
        }
    }
}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        JobError::Store(format!("{:#}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        let cases = [
            (ProviderError::RateLimited, FailureKind::RateLimited),
            (ProviderError::Timeout, FailureKind::Timeout),
            (ProviderError::NotFound("x".into()), FailureKind::NotFound),
            (ProviderError::InvalidData("x".into()), FailureKind::InvalidData),
            (
                ProviderError::Api {
                    status: 503,
                    message: "down".into(),
                },
                FailureKind::ProviderError,
            ),
            (
                ProviderError::Connection("reset".into()),
                FailureKind::ProviderError,
            ),
        ];
        for (error, kind) in cases {
            let enrich = EnrichError::Provider {
                provider: "places".to_string(),
                source: error,
            };
            assert_eq!(enrich.kind(), kind);
        }
        assert_eq!(
            EnrichError::Persistence("locked".into()).kind(),
            FailureKind::Persistence
        );
    }

    #[test]
    fn test_transient_and_permanent_are_disjoint() {
        for kind in [
            FailureKind::RateLimited,
            FailureKind::Timeout,
            FailureKind::NotFound,
            FailureKind::InvalidData,
            FailureKind::ProviderError,
            FailureKind::Persistence,
        ] {
            assert!(!(kind.is_transient() && kind.is_permanent()));
        }
    }

    #[test]
    fn test_job_state_db_round_trip() {
        for state in [
            JobState::Idle,
            JobState::Running,
            JobState::Paused,
            JobState::Completed,
        ] {
            assert_eq!(JobState::from_db_str(state.as_db_str()), Some(state));
        }
        assert_eq!(JobState::from_db_str("bogus"), None);
    }
}
