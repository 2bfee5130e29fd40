//! Workflow run state machine
//!
//! QUEUED → RUNNING → {COMPLETED | FAILED}
//!
//! Terminal states are final. A failed run is never resumed; the client triggers a new one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Workflow run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Accepted, waiting for a worker
    Queued,
    /// Stages executing
    Running,
    /// Report persisted
    Completed,
    /// Error or timeout, no report
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    /// Legal transitions of the run state machine
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Queued, RunStatus::Running)
                | (RunStatus::Queued, RunStatus::Failed)
                | (RunStatus::Running, RunStatus::Completed)
                | (RunStatus::Running, RunStatus::Failed)
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = mintel_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            other => Err(mintel_common::Error::Internal(format!(
                "Unknown run status: {}",
                other
            ))),
        }
    }
}

/// Failure detail for operators. Never sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFailure {
    pub message: String,
    /// Error chain, outermost first
    pub chain: Vec<String>,
    /// Stage that was executing, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl RunFailure {
    pub fn from_error(err: &anyhow::Error, stage: Option<String>) -> Self {
        Self {
            message: err.to_string(),
            chain: err.chain().map(|cause| cause.to_string()).collect(),
            stage,
            occurred_at: Utc::now(),
        }
    }
}

/// Run metadata column (JSON)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RunFailure>,
    #[serde(default)]
    pub is_timeout: bool,
    /// Set when a crashed process left the run in RUNNING
    #[serde(default)]
    pub interrupted: bool,
    /// Milliseconds spent per stage
    #[serde(default)]
    pub timings_ms: BTreeMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_ms: Option<u64>,
}

/// Transition record
#[derive(Debug, Clone)]
pub struct StateTransition {
    pub workflow_id: Uuid,
    pub old_status: RunStatus,
    pub new_status: RunStatus,
    pub transitioned_at: DateTime<Utc>,
}

/// One end-to-end report attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub user_id: String,
    pub website_url: String,
    pub status: RunStatus,
    pub triggered_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: RunMetadata,
}

impl WorkflowRun {
    /// Create new run in QUEUED
    pub fn new(user_id: impl Into<String>, website_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            website_url: website_url.into(),
            status: RunStatus::Queued,
            triggered_at: Utc::now(),
            started_at: None,
            completed_at: None,
            metadata: RunMetadata::default(),
        }
    }

    /// Transition to new status, stamping start/end times
    pub fn transition_to(&mut self, new_status: RunStatus) -> mintel_common::Result<StateTransition> {
        if !self.status.can_transition_to(new_status) {
            return Err(mintel_common::Error::Internal(format!(
                "Illegal run transition {} → {} for {}",
                self.status, new_status, self.id
            )));
        }

        let transition = StateTransition {
            workflow_id: self.id,
            old_status: self.status,
            new_status,
            transitioned_at: Utc::now(),
        };
        self.status = new_status;

        match new_status {
            RunStatus::Running => self.started_at = Some(transition.transitioned_at),
            RunStatus::Completed | RunStatus::Failed => {
                self.completed_at = Some(transition.transitioned_at)
            }
            RunStatus::Queued => {}
        }

        Ok(transition)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_run_is_queued() {
        let run = WorkflowRun::new("user_1", "https://example.com");
        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.started_at.is_none());
        assert!(run.completed_at.is_none());
    }

    #[test]
    fn test_happy_path_transitions_stamp_times() {
        let mut run = WorkflowRun::new("user_1", "https://example.com");
        run.transition_to(RunStatus::Running).unwrap();
        assert!(run.started_at.is_some());

        let t = run.transition_to(RunStatus::Completed).unwrap();
        assert_eq!(t.old_status, RunStatus::Running);
        assert!(run.completed_at.is_some());
        assert!(run.is_terminal());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut run = WorkflowRun::new("user_1", "https://example.com");
        run.transition_to(RunStatus::Running).unwrap();
        run.transition_to(RunStatus::Failed).unwrap();

        assert!(run.transition_to(RunStatus::Running).is_err());
        assert!(run.transition_to(RunStatus::Completed).is_err());
        assert_eq!(run.status, RunStatus::Failed);
    }

    #[test]
    fn test_queued_cannot_complete_directly() {
        let mut run = WorkflowRun::new("user_1", "https://example.com");
        assert!(run.transition_to(RunStatus::Completed).is_err());
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            RunStatus::Queued,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<RunStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<RunStatus>().is_err());
    }

    #[test]
    fn test_failure_captures_error_chain() {
        let err = anyhow::anyhow!("connection refused").context("primary LLM request failed");
        let failure = RunFailure::from_error(&err, Some("synthesis".to_string()));

        assert_eq!(failure.message, "primary LLM request failed");
        assert_eq!(failure.chain.len(), 2);
        assert_eq!(failure.chain[1], "connection refused");
        assert_eq!(failure.stage.as_deref(), Some("synthesis"));
    }
}
