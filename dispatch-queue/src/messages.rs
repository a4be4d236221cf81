use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One `batch_jobs` message: the ingestion worker's unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJobMessage {
    pub batch_id: String,
    pub object_name: String,
    pub bucket_name: String,
    pub upload_timestamp: DateTime<Utc>,
}

/// One `tasks` message: the execution worker's unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMessage {
    pub message_id: String,
    pub batch_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_message_round_trips_through_json() {
        let message = TaskMessage {
            message_id: "msg-1".to_string(),
            batch_id: Some("batch-1".to_string()),
            timestamp: Utc::now(),
            payload: serde_json::json!({ "api_key": "secret" }),
        };

        let bytes = serde_json::to_vec(&message).unwrap();
        let decoded: TaskMessage = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded.message_id, message.message_id);
        assert_eq!(decoded.batch_id, message.batch_id);
        assert_eq!(decoded.payload, message.payload);
    }

    #[test]
    fn batch_job_message_round_trips_through_json() {
        let message = BatchJobMessage {
            batch_id: "batch-1".to_string(),
            object_name: "batches/batch-1/input.jsonl_abc".to_string(),
            bucket_name: "batches".to_string(),
            upload_timestamp: Utc::now(),
        };

        let bytes = serde_json::to_vec(&message).unwrap();
        let decoded: BatchJobMessage = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(decoded.object_name, message.object_name);
        assert_eq!(decoded.bucket_name, message.bucket_name);
    }
}
