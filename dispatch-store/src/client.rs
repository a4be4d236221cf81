use chrono::{DateTime, Utc};
use dispatch_types::{BatchStats, BatchStatus, Event, StatusCounts, TaskStatus};
use elasticsearch::auth::Credentials;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::{
    BulkParts, DeleteByQueryParts, DeleteParts, Elasticsearch, GetParts,
    IndicesCreateParts, IndicesExistsParts, SearchParts, UpdateParts,
};
use log::{debug, info, warn};
use serde_json::{Value, json};

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::mapping::events_index_mapping;
use crate::scroll::ScrollStream;

/// The Event Store client: one per process, cheap to clone (the
/// underlying transport is reference counted), safe to share across
/// concurrent requests the way the teacher's connection pool is.
#[derive(Clone)]
pub struct EventStore {
    client: Elasticsearch,
    index: String,
}

impl EventStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let url = url::Url::parse(&config.url()).map_err(StoreError::InvalidUrl)?;
        let conn_pool = SingleNodeConnectionPool::new(url);
        let mut builder = TransportBuilder::new(conn_pool);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.auth(Credentials::Basic(username.clone(), password.clone()));
        }
        let transport = builder.build().map_err(StoreError::Transport)?;
        Ok(Self {
            client: Elasticsearch::new(transport),
            index: config.index.clone(),
        })
    }

    /// Liveness check for `GET /health`: a bare cluster ping, no query.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let response = self.client.ping().send().await.map_err(StoreError::Transport)?;
        if !response.status_code().is_success() {
            return Err(StoreError::Response {
                status: response.status_code().as_u16(),
                body: "cluster ping failed".to_string(),
            });
        }
        Ok(())
    }

    /// Idempotent startup step: create the `events` index if it does not
    /// already exist. Must succeed before anything else runs.
    pub async fn ensure_index(&self) -> Result<(), StoreError> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[&self.index]))
            .send()
            .await
            .map_err(StoreError::Transport)?;

        if exists.status_code().as_u16() == 200 {
            debug!("events index {} already exists", self.index);
            return Ok(());
        }

        info!("creating events index {}", self.index);
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index))
            .body(events_index_mapping())
            .send()
            .await
            .map_err(|e| StoreError::IndexSetup(Box::new(StoreError::Transport(e))))?;

        ensure_success(response).await.map_err(|e| StoreError::IndexSetup(Box::new(e)))?;
        Ok(())
    }

    /// Bulk-index new PENDING events, upserting by `message_id` so
    /// repeated indexing of the same ids (redelivery between ingest steps)
    /// is idempotent. Refresh-visible on return.
    pub async fn create_pending_bulk(&self, events: &[Event]) -> Result<(), StoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut body: Vec<Value> = Vec::with_capacity(events.len() * 2);
        for event in events {
            body.push(json!({ "index": { "_id": event.message_id } }));
            body.push(serde_json::to_value(event).map_err(StoreError::Serialize)?);
        }

        let response = self
            .client
            .bulk(BulkParts::Index(&self.index))
            .body(body)
            .refresh("true")
            .send()
            .await
            .map_err(StoreError::Transport)?;

        let parsed = ensure_success(response).await?;
        if parsed["errors"].as_bool().unwrap_or(false) {
            warn!("bulk index into {} reported per-item errors: {parsed}", self.index);
        }
        Ok(())
    }

    /// Conditional state update. Fails with `NotFound` if no such event,
    /// `Conflict` if `from_expected` does not match the document's current
    /// status. Optimistic concurrency is enforced via `if_seq_no`/
    /// `if_primary_term` taken from the read, so a concurrent writer
    /// losing the race gets `Conflict` rather than clobbering state.
    pub async fn transition(
        &self,
        message_id: &str,
        from_expected: TaskStatus,
        to: TaskStatus,
        patch: Value,
    ) -> Result<(), StoreError> {
        let get_response = self
            .client
            .get(GetParts::IndexId(&self.index, message_id))
            .send()
            .await
            .map_err(StoreError::Transport)?;

        if get_response.status_code().as_u16() == 404 {
            return Err(StoreError::NotFound(message_id.to_string()));
        }

        let doc: Value = get_response.json().await.map_err(StoreError::Transport)?;
        if !doc["found"].as_bool().unwrap_or(false) {
            return Err(StoreError::NotFound(message_id.to_string()));
        }

        let current_status = doc["_source"]["status"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if current_status != from_expected.as_str() {
            return Err(StoreError::Conflict(message_id.to_string()));
        }

        let seq_no = doc["_seq_no"].as_i64().unwrap_or_default();
        let primary_term = doc["_primary_term"].as_i64().unwrap_or_default();

        let mut merged = patch;
        merged["status"] = json!(to.as_str());

        let update_response = self
            .client
            .update(UpdateParts::IndexId(&self.index, message_id))
            .if_seq_no(seq_no)
            .if_primary_term(primary_term)
            .body(json!({ "doc": merged }))
            .send()
            .await
            .map_err(StoreError::Transport)?;

        if update_response.status_code().as_u16() == 409 {
            return Err(StoreError::Conflict(message_id.to_string()));
        }
        ensure_success(update_response).await?;
        Ok(())
    }

    /// The earliest (by `created_at`) completed, non-cached event with a
    /// matching `body_hash`. Cache lookup is scoped globally, not per
    /// batch.
    pub async fn find_cached_completion(&self, body_hash: &str) -> Result<Option<Event>, StoreError> {
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index]))
            .body(json!({
                "size": 1,
                "sort": [{ "created_at": "asc" }],
                "query": {
                    "bool": {
                        "filter": [
                            { "term": { "body_hash": body_hash } },
                            { "term": { "status": TaskStatus::Completed.as_str() } },
                            { "term": { "cached": false } }
                        ]
                    }
                }
            }))
            .send()
            .await
            .map_err(StoreError::Transport)?;

        let parsed = ensure_success(response).await?;
        first_hit(&parsed)
    }

    pub async fn get(&self, message_id: &str) -> Result<Option<Event>, StoreError> {
        let response = self
            .client
            .get(GetParts::IndexId(&self.index, message_id))
            .send()
            .await
            .map_err(StoreError::Transport)?;

        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }
        let doc: Value = response.json().await.map_err(StoreError::Transport)?;
        if !doc["found"].as_bool().unwrap_or(false) {
            return Ok(None);
        }
        let event: Event = serde_json::from_value(doc["_source"].clone()).map_err(StoreError::Deserialize)?;
        Ok(Some(event))
    }

    pub async fn delete(&self, message_id: &str) -> Result<bool, StoreError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(&self.index, message_id))
            .refresh("true")
            .send()
            .await
            .map_err(StoreError::Transport)?;

        if response.status_code().as_u16() == 404 {
            return Ok(false);
        }
        ensure_success(response).await?;
        Ok(true)
    }

    pub async fn delete_by_batch(&self, batch_id: &str) -> Result<u64, StoreError> {
        let response = self
            .client
            .delete_by_query(DeleteByQueryParts::Index(&[&self.index]))
            .refresh(true)
            .body(json!({ "query": { "term": { "batch_id": batch_id } } }))
            .send()
            .await
            .map_err(StoreError::Transport)?;

        let parsed = ensure_success(response).await?;
        Ok(parsed["deleted"].as_u64().unwrap_or(0))
    }

    /// Single-pass aggregation for one batch: per-status counts, cached
    /// count, timestamp extremes, and token sums over non-cached members.
    pub async fn aggregate_batch(&self, batch_id: &str) -> Result<Option<BatchStats>, StoreError> {
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index]))
            .body(json!({
                "size": 0,
                "query": { "term": { "batch_id": batch_id } },
                "aggs": batch_stats_aggs()
            }))
            .send()
            .await
            .map_err(StoreError::Transport)?;

        let parsed = ensure_success(response).await?;
        let total = parsed["hits"]["total"]["value"].as_i64().unwrap_or(0);
        if total == 0 {
            return Ok(None);
        }
        Ok(Some(batch_stats_from_aggs(batch_id.to_string(), total, &parsed["aggregations"])))
    }

    /// Same aggregation, bucketed by `batch_id`, most-recently-created
    /// batch first.
    pub async fn list_batches(&self) -> Result<Vec<BatchStats>, StoreError> {
        let mut sub_aggs = flatten(batch_stats_aggs());
        sub_aggs.insert("most_recent".to_string(), json!({ "max": { "field": "created_at" } }));

        let response = self
            .client
            .search(SearchParts::Index(&[&self.index]))
            .body(json!({
                "size": 0,
                "aggs": {
                    "batches": {
                        "terms": { "field": "batch_id", "size": 10000, "order": { "most_recent": "desc" } },
                        "aggs": Value::Object(sub_aggs)
                    }
                }
            }))
            .send()
            .await
            .map_err(StoreError::Transport)?;

        let parsed = ensure_success(response).await?;
        let buckets = parsed["aggregations"]["batches"]["buckets"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        Ok(buckets
            .into_iter()
            .map(|bucket| {
                let batch_id = bucket["key"].as_str().unwrap_or_default().to_string();
                let total = bucket["doc_count"].as_i64().unwrap_or(0);
                batch_stats_from_aggs(batch_id, total, &bucket)
            })
            .collect())
    }

    /// A restartable cursor over matching events, chunked at ≤10 000,
    /// ordered by `created_at` descending. The returned stream clears its
    /// scroll context on completion or drop.
    pub fn scroll_tasks(&self, batch_id: &str, status: Option<TaskStatus>) -> ScrollStream {
        let mut filters = vec![json!({ "term": { "batch_id": batch_id } })];
        if let Some(status) = status {
            filters.push(json!({ "term": { "status": status.as_str() } }));
        }
        let query = json!({
            "sort": [{ "created_at": "desc" }],
            "query": { "bool": { "filter": filters } }
        });
        ScrollStream::new(self.client.clone(), self.index.clone(), query, 10_000)
    }

    /// A bounded `page x page_size` window over a batch's tasks, most
    /// recently created first, optionally filtered by status. Returns the
    /// page plus the total matching count for the caller to paginate.
    pub async fn list_tasks_page(
        &self,
        batch_id: &str,
        status: Option<TaskStatus>,
        page: usize,
        page_size: usize,
    ) -> Result<(Vec<Event>, i64), StoreError> {
        let mut filters = vec![json!({ "term": { "batch_id": batch_id } })];
        if let Some(status) = status {
            filters.push(json!({ "term": { "status": status.as_str() } }));
        }

        let response = self
            .client
            .search(SearchParts::Index(&[&self.index]))
            .from((page.saturating_sub(1) * page_size) as i64)
            .size(page_size as i64)
            .body(json!({
                "sort": [{ "created_at": "desc" }],
                "query": { "bool": { "filter": filters } }
            }))
            .send()
            .await
            .map_err(StoreError::Transport)?;

        let parsed = ensure_success(response).await?;
        let total = parsed["hits"]["total"]["value"].as_i64().unwrap_or(0);
        let hits = parsed["hits"]["hits"].as_array().cloned().unwrap_or_default();
        let events = hits
            .into_iter()
            .map(|hit| serde_json::from_value(hit["_source"].clone()).map_err(StoreError::Deserialize))
            .collect::<Result<Vec<Event>, StoreError>>()?;
        Ok((events, total))
    }

    /// The same single-pass aggregation as [`aggregate_batch`], but over
    /// every event in the store rather than one batch's members (the
    /// global task rollup of `GET /api/v1/tasks/stats`).
    pub async fn aggregate_global(&self) -> Result<BatchStats, StoreError> {
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index]))
            .body(json!({
                "size": 0,
                "query": { "match_all": {} },
                "aggs": batch_stats_aggs()
            }))
            .send()
            .await
            .map_err(StoreError::Transport)?;

        let parsed = ensure_success(response).await?;
        let total = parsed["hits"]["total"]["value"].as_i64().unwrap_or(0);
        Ok(batch_stats_from_aggs(String::new(), total, &parsed["aggregations"]))
    }

    pub async fn usage_time_series(
        &self,
        batch_id: &str,
        since: DateTime<Utc>,
        interval: &str,
    ) -> Result<dispatch_types::UsageStats, StoreError> {
        let calendar_interval = crate::interval::calendar_interval(interval)?;
        crate::usage::usage_time_series(&self.client, &self.index, batch_id, since, calendar_interval).await
    }
}

/// Copies a JSON object's top-level keys out so they can be merged into
/// another aggregation map (the `json!` macro has no spread operator).
fn flatten(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

fn batch_stats_aggs() -> Value {
    json!({
        "by_status": { "terms": { "field": "status" } },
        "cached": { "filter": { "term": { "cached": true } } },
        "earliest_created": { "min": { "field": "created_at" } },
        "earliest_started": { "min": { "field": "started_at" } },
        "latest_completed": { "max": { "field": "completed_at" } },
        "non_cached": {
            "filter": { "term": { "cached": false } },
            "aggs": {
                "prompt_tokens": { "sum": { "field": "prompt_tokens" } },
                "completion_tokens": { "sum": { "field": "completion_tokens" } },
                "total_tokens": { "sum": { "field": "total_tokens" } }
            }
        }
    })
}

fn batch_stats_from_aggs(batch_id: String, total: i64, aggs: &Value) -> BatchStats {
    let mut counts = StatusCounts::default();
    for bucket in aggs["by_status"]["buckets"].as_array().into_iter().flatten() {
        let count = bucket["doc_count"].as_i64().unwrap_or(0);
        match bucket["key"].as_str().unwrap_or_default() {
            "PENDING" => counts.pending = count,
            "PROCESSING" => counts.processing = count,
            "COMPLETED" => counts.completed = count,
            "FAILED" => counts.failed = count,
            _ => {}
        }
    }
    let cached = aggs["cached"]["doc_count"].as_i64().unwrap_or(0);
    counts.completed -= cached;

    BatchStats {
        batch_id,
        total_tasks: total,
        cached,
        batch_status: BatchStatus::derive(&counts),
        counts,
        created_at: parse_epoch_millis(&aggs["earliest_created"]["value"]),
        started_at: parse_epoch_millis(&aggs["earliest_started"]["value"]),
        completed_at: parse_epoch_millis(&aggs["latest_completed"]["value"]),
        prompt_tokens: aggs["non_cached"]["prompt_tokens"]["value"].as_f64().unwrap_or(0.0) as i64,
        completion_tokens: aggs["non_cached"]["completion_tokens"]["value"].as_f64().unwrap_or(0.0) as i64,
        total_tokens: aggs["non_cached"]["total_tokens"]["value"].as_f64().unwrap_or(0.0) as i64,
    }
}

pub(crate) fn parse_epoch_millis(value: &Value) -> Option<DateTime<Utc>> {
    let millis = value.as_f64()?;
    DateTime::from_timestamp_millis(millis as i64)
}

fn first_hit(parsed: &Value) -> Result<Option<Event>, StoreError> {
    let hit = parsed["hits"]["hits"].as_array().and_then(|hits| hits.first());
    match hit {
        None => Ok(None),
        Some(hit) => {
            let event: Event =
                serde_json::from_value(hit["_source"].clone()).map_err(StoreError::Deserialize)?;
            Ok(Some(event))
        }
    }
}

pub(crate) async fn ensure_success(response: elasticsearch::http::response::Response) -> Result<Value, StoreError> {
    let status = response.status_code();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(StoreError::Response { status: status.as_u16(), body });
    }
    response.json::<Value>().await.map_err(StoreError::Transport)
}
