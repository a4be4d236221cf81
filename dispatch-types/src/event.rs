use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Position in the `PENDING -> PROCESSING -> {COMPLETED, FAILED}` DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Processing => "PROCESSING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The durable record of a single task's lifecycle. One document per
/// `message_id` in the event store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub message_id: String,
    pub batch_id: Option<String>,
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: serde_json::Value,
    pub body_hash: String,
    pub status: TaskStatus,
    pub cached: bool,
    pub attempt: u32,
    /// Upstream response body on success, or an error descriptor on
    /// failure. Absent while `status == PENDING`.
    pub result: Option<serde_json::Value>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// `completed_at - started_at` in milliseconds.
    pub duration: Option<i64>,
    pub dataset: Option<String>,
    pub source: Option<serde_json::Value>,
}

impl Event {
    /// A freshly ingested task, status `PENDING`, no attempts yet.
    pub fn new_pending(
        message_id: String,
        batch_id: Option<String>,
        custom_id: String,
        method: String,
        url: String,
        body: serde_json::Value,
        dataset: Option<String>,
        source: Option<serde_json::Value>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let body_hash = crate::canonical::body_hash(&body);
        Self {
            message_id,
            batch_id,
            custom_id,
            method,
            url,
            body,
            body_hash,
            status: TaskStatus::Pending,
            cached: false,
            attempt: 0,
            result: None,
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            created_at,
            started_at: None,
            completed_at: None,
            duration: None,
            dataset,
            source,
        }
    }
}

/// The priority order used to derive a batch's aggregate status from its
/// member events: any `PROCESSING` member wins, else any `PENDING`, else
/// any `FAILED`, else the batch is `COMPLETED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BatchStatus {
    Processing,
    Pending,
    Failed,
    Completed,
}

impl BatchStatus {
    pub fn derive(counts: &StatusCounts) -> Self {
        if counts.processing > 0 {
            BatchStatus::Processing
        } else if counts.pending > 0 {
            BatchStatus::Pending
        } else if counts.failed > 0 {
            BatchStatus::Failed
        } else {
            BatchStatus::Completed
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

/// The aggregation `{batch_id -> stats}` computed from member events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStats {
    pub batch_id: String,
    pub total_tasks: i64,
    pub counts: StatusCounts,
    pub cached: i64,
    pub batch_status: BatchStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_status_prioritizes_processing() {
        let counts = StatusCounts {
            pending: 3,
            processing: 1,
            completed: 2,
            failed: 1,
        };
        assert_eq!(BatchStatus::derive(&counts), BatchStatus::Processing);
    }

    #[test]
    fn batch_status_falls_back_to_completed() {
        let counts = StatusCounts {
            pending: 0,
            processing: 0,
            completed: 5,
            failed: 0,
        };
        assert_eq!(BatchStatus::derive(&counts), BatchStatus::Completed);
    }

    #[test]
    fn batch_status_failed_before_completed() {
        let counts = StatusCounts {
            pending: 0,
            processing: 0,
            completed: 2,
            failed: 1,
        };
        assert_eq!(BatchStatus::derive(&counts), BatchStatus::Failed);
    }
}
