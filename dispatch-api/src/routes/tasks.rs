use chrono::Utc;
use dispatch_queue::{Broker, TaskMessage};
use dispatch_store::EventStore;
use dispatch_types::{BatchStats, Event};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::ApiToken;
use crate::error::ApiError;

#[get("/tasks/<message_id>")]
pub async fn get_task(
    _token: ApiToken,
    message_id: &str,
    store: &State<EventStore>,
) -> Result<Json<Event>, ApiError> {
    match store.get(message_id).await? {
        Some(event) => Ok(Json(event)),
        None => Err(ApiError::NotFound(format!("task {message_id}"))),
    }
}

#[delete("/tasks/<message_id>")]
pub async fn delete_task(
    _token: ApiToken,
    message_id: &str,
    store: &State<EventStore>,
) -> Result<Status, ApiError> {
    let deleted = store.delete(message_id).await?;
    if !deleted {
        return Err(ApiError::NotFound(format!("task {message_id}")));
    }
    Ok(Status::NoContent)
}

#[get("/tasks/stats")]
pub async fn global_stats(_token: ApiToken, store: &State<EventStore>) -> Result<Json<BatchStats>, ApiError> {
    Ok(Json(store.aggregate_global().await?))
}

/// The standalone counterpart to a batch line: one `{custom_id, method,
/// url, body}` submission, `batch_id` left null. Optional `dataset`,
/// `source`, and `api_key` mirror the JSONL schema of §6.
#[derive(Debug, Deserialize)]
pub struct TaskSubmission {
    custom_id: String,
    method: String,
    url: String,
    body: serde_json::Value,
    #[serde(default)]
    dataset: Option<String>,
    #[serde(default)]
    source: Option<serde_json::Value>,
    #[serde(default)]
    api_key: Option<String>,
}

#[derive(Serialize)]
pub struct TaskSubmissionResponse {
    message_id: String,
}

#[post("/tasks", data = "<submission>")]
pub async fn submit_task(
    _token: ApiToken,
    submission: Json<TaskSubmission>,
    store: &State<EventStore>,
    broker: &State<Broker>,
) -> Result<Json<TaskSubmissionResponse>, ApiError> {
    let submission = submission.into_inner();
    if !submission.body.is_object() {
        return Err(ApiError::Validation("body must be a JSON object".to_string()));
    }

    let event = Event::new_pending(
        uuid::Uuid::new_v4().to_string(),
        None,
        submission.custom_id,
        submission.method,
        submission.url,
        submission.body,
        submission.dataset,
        submission.source,
        Utc::now(),
    );

    store.create_pending_bulk(std::slice::from_ref(&event)).await?;

    broker
        .publish_task(&TaskMessage {
            message_id: event.message_id.clone(),
            batch_id: None,
            timestamp: Utc::now(),
            payload: json!({ "api_key": submission.api_key }),
        })
        .await?;

    Ok(Json(TaskSubmissionResponse { message_id: event.message_id }))
}

pub fn routes() -> Vec<rocket::Route> {
    rocket::routes![get_task, delete_task, global_stats, submit_task]
}
