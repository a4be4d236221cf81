use chrono::{Duration as ChronoDuration, Utc};
use dispatch_objectstore::ObjectStore;
use dispatch_queue::{Broker, BatchJobMessage};
use dispatch_store::EventStore;
use dispatch_types::{BatchStats, TaskStatus};
use rocket::form::Form;
use rocket::fs::TempFile;
use rocket::http::ContentType;
use rocket::response::stream::TextStream;
use rocket::serde::json::Json;
use rocket::tokio::io::AsyncReadExt;
use rocket::{FromForm, State, delete, get, post};
use serde::Serialize;

use crate::auth::ApiToken;
use crate::error::ApiError;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 10_000;

#[derive(FromForm)]
pub struct UploadForm<'r> {
    file: TempFile<'r>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    batch_id: String,
    total_tasks: usize,
}

/// Uploads a JSONL batch: stages the raw bytes in the object store, counts
/// its non-blank lines for the immediate response, and publishes one
/// `batch_jobs` message for the ingestion worker to explode asynchronously.
#[post("/batches?<batch_id>", data = "<form>")]
pub async fn upload_batch(
    _token: ApiToken,
    batch_id: Option<String>,
    mut form: Form<UploadForm<'_>>,
    object_store: &State<ObjectStore>,
    broker: &State<Broker>,
) -> Result<Json<UploadResponse>, ApiError> {
    let filename = form
        .file
        .raw_name()
        .and_then(|n| n.dangerous_unsafe_unsanitized_raw().as_str().split('/').next_back())
        .unwrap_or("batch")
        .to_string();
    if !filename.ends_with(".jsonl") {
        return Err(ApiError::Validation("uploaded file must have a .jsonl extension".to_string()));
    }

    let mut bytes = Vec::new();
    form.file
        .open()
        .await
        .map_err(|err| ApiError::Validation(format!("could not read upload: {err}")))?
        .read_to_end(&mut bytes)
        .await
        .map_err(|err| ApiError::Validation(format!("could not read upload: {err}")))?;

    let total_tasks = String::from_utf8_lossy(&bytes)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .count();

    let batch_id = batch_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let key = object_store.key_for(&batch_id, &filename);
    object_store.put(&key, bytes.into()).await?;

    broker
        .publish_batch_job(&BatchJobMessage {
            batch_id: batch_id.clone(),
            object_name: key,
            bucket_name: object_store.bucket_name().to_string(),
            upload_timestamp: Utc::now(),
        })
        .await?;

    Ok(Json(UploadResponse { batch_id, total_tasks }))
}

#[derive(Serialize)]
pub struct BatchListResponse {
    total: usize,
    batches: Vec<BatchStats>,
}

#[get("/batches")]
pub async fn list_batches(_token: ApiToken, store: &State<EventStore>) -> Result<Json<BatchListResponse>, ApiError> {
    let batches = store.list_batches().await?;
    Ok(Json(BatchListResponse { total: batches.len(), batches }))
}

#[get("/batches/<batch_id>")]
pub async fn get_batch(
    _token: ApiToken,
    batch_id: &str,
    store: &State<EventStore>,
) -> Result<Json<BatchStats>, ApiError> {
    match store.aggregate_batch(batch_id).await? {
        Some(stats) => Ok(Json(stats)),
        None => Err(ApiError::NotFound(format!("batch {batch_id}"))),
    }
}

#[delete("/batches/<batch_id>")]
pub async fn delete_batch(
    _token: ApiToken,
    batch_id: &str,
    store: &State<EventStore>,
) -> Result<rocket::http::Status, ApiError> {
    let deleted = store.delete_by_batch(batch_id).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound(format!("batch {batch_id}")));
    }
    Ok(rocket::http::Status::NoContent)
}

fn parse_status(task_status: Option<&str>) -> Result<Option<TaskStatus>, ApiError> {
    match task_status {
        None => Ok(None),
        Some("PENDING") => Ok(Some(TaskStatus::Pending)),
        Some("PROCESSING") => Ok(Some(TaskStatus::Processing)),
        Some("COMPLETED") => Ok(Some(TaskStatus::Completed)),
        Some("FAILED") => Ok(Some(TaskStatus::Failed)),
        Some(other) => Err(ApiError::Validation(format!("unknown task_status {other}"))),
    }
}

#[derive(Serialize)]
pub struct TaskListResponse {
    total: i64,
    page: usize,
    page_size: usize,
    tasks: Vec<dispatch_types::Event>,
}

#[get("/batches/<batch_id>/tasks?<task_status>&<page>&<page_size>")]
pub async fn list_tasks(
    _token: ApiToken,
    batch_id: &str,
    task_status: Option<&str>,
    page: Option<usize>,
    page_size: Option<usize>,
    store: &State<EventStore>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let status = parse_status(task_status)?;
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let (tasks, total) = store.list_tasks_page(batch_id, status, page, page_size).await?;
    Ok(Json(TaskListResponse { total, page, page_size, tasks }))
}

/// Newline-delimited JSON export, one `{tasks:[...], total}` chunk per
/// scroll page. The underlying cursor is released when the stream ends or
/// the client disconnects, whichever comes first.
#[get("/batches/<batch_id>/tasks/export?<task_status>")]
pub async fn export_tasks(
    _token: ApiToken,
    batch_id: &str,
    task_status: Option<&str>,
    store: &State<EventStore>,
) -> Result<(ContentType, TextStream![String]), ApiError> {
    let status = parse_status(task_status)?;
    let batch_id = batch_id.to_string();
    let store = (*store).clone();

    Ok((
        ContentType::new("application", "x-ndjson"),
        TextStream! {
            use futures::StreamExt;
            let mut scroll = store.scroll_tasks(&batch_id, status);
            while let Some(page) = scroll.next().await {
                match page {
                    Ok(tasks) => {
                        let total = tasks.len();
                        let chunk = serde_json::json!({ "tasks": tasks, "total": total });
                        yield format!("{chunk}\n");
                    }
                    Err(err) => {
                        log::error!("scroll export for batch {batch_id} failed: {err}");
                        break;
                    }
                }
            }
        },
    ))
}

struct TimeRangeBound {
    amount: i64,
    unit: char,
}

fn parse_time_range(raw: &str) -> Result<TimeRangeBound, ApiError> {
    let invalid = || ApiError::Validation(format!("time_range {raw} must match ^\\d+[mhd]$"));
    let unit = raw.chars().last().ok_or_else(invalid)?;
    if !matches!(unit, 'm' | 'h' | 'd') {
        return Err(invalid());
    }
    let digits = &raw[..raw.len() - 1];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let amount: i64 = digits.parse().map_err(|_| invalid())?;

    let max = match unit {
        'm' => 1440,
        'h' => 720,
        'd' => 365,
        _ => unreachable!(),
    };
    if amount == 0 || amount > max {
        return Err(ApiError::Validation(format!("time_range {raw} out of range (max {max}{unit})")));
    }
    Ok(TimeRangeBound { amount, unit })
}

fn validate_interval(interval: &str) -> Result<(), ApiError> {
    match interval {
        "1m" | "1h" | "1d" | "1w" | "1M" | "1q" | "1y" => Ok(()),
        other => Err(ApiError::Validation(format!("unsupported interval {other}"))),
    }
}

#[get("/batches/<batch_id>/stats?<time_range>&<interval>")]
pub async fn batch_stats(
    _token: ApiToken,
    batch_id: &str,
    time_range: &str,
    interval: &str,
    store: &State<EventStore>,
) -> Result<Json<dispatch_types::UsageStats>, ApiError> {
    let bound = parse_time_range(time_range)?;
    validate_interval(interval)?;

    if store.aggregate_batch(batch_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("batch {batch_id}")));
    }

    let since = Utc::now()
        - match bound.unit {
            'm' => ChronoDuration::minutes(bound.amount),
            'h' => ChronoDuration::hours(bound.amount),
            'd' => ChronoDuration::days(bound.amount),
            _ => unreachable!(),
        };

    let stats = store.usage_time_series(batch_id, since, interval).await?;
    Ok(Json(stats))
}

pub fn routes() -> Vec<rocket::Route> {
    rocket::routes![
        upload_batch,
        list_batches,
        get_batch,
        delete_batch,
        list_tasks,
        export_tasks,
        batch_stats,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_status_accepts_known_values() {
        assert_eq!(parse_status(Some("COMPLETED")).unwrap(), Some(TaskStatus::Completed));
        assert_eq!(parse_status(None).unwrap(), None);
    }

    #[test]
    fn parse_status_rejects_unknown_value() {
        assert!(parse_status(Some("DONE")).is_err());
    }

    #[test]
    fn parse_time_range_accepts_within_bounds() {
        let bound = parse_time_range("90m").unwrap();
        assert_eq!(bound.amount, 90);
        assert_eq!(bound.unit, 'm');

        assert!(parse_time_range("1440m").is_ok());
        assert!(parse_time_range("720h").is_ok());
        assert!(parse_time_range("365d").is_ok());
    }

    #[test]
    fn parse_time_range_rejects_out_of_range() {
        assert!(parse_time_range("1441m").is_err());
        assert!(parse_time_range("721h").is_err());
        assert!(parse_time_range("366d").is_err());
    }

    #[test]
    fn parse_time_range_rejects_malformed_input() {
        assert!(parse_time_range("10").is_err());
        assert!(parse_time_range("m10").is_err());
        assert!(parse_time_range("10x").is_err());
        assert!(parse_time_range("0m").is_err());
    }

    #[test]
    fn validate_interval_accepts_known_intervals() {
        for interval in ["1m", "1h", "1d", "1w", "1M", "1q", "1y"] {
            assert!(validate_interval(interval).is_ok());
        }
    }

    #[test]
    fn validate_interval_rejects_unknown() {
        assert!(validate_interval("2h").is_err());
    }
}
