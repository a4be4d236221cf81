use serde_json::{Value, json};

/// Mirrors the field list of `Event` exactly: `message_id`/`batch_id`/
/// `body_hash`/`status`/`custom_id` are exact-match keyword fields;
/// `created_at`/`started_at`/`completed_at` are ranges; `body`/`result`/
/// `source` are opaque nested documents, left unmapped (dynamic).
pub fn events_index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "message_id": { "type": "keyword" },
                "batch_id": { "type": "keyword" },
                "custom_id": { "type": "keyword" },
                "method": { "type": "keyword" },
                "url": { "type": "keyword" },
                "body": { "type": "object", "enabled": false },
                "body_hash": { "type": "keyword" },
                "status": { "type": "keyword" },
                "cached": { "type": "boolean" },
                "attempt": { "type": "integer" },
                "result": { "type": "object", "enabled": false },
                "prompt_tokens": { "type": "long" },
                "completion_tokens": { "type": "long" },
                "total_tokens": { "type": "long" },
                "created_at": { "type": "date" },
                "started_at": { "type": "date" },
                "completed_at": { "type": "date" },
                "duration": { "type": "long" },
                "dataset": { "type": "keyword" },
                "source": { "type": "object", "enabled": false }
            }
        }
    })
}
