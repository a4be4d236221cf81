use chrono::{DateTime, Utc};
use dispatch_types::{TimeBucket, UsageStats, UsageSummary, cache_hit_rate, tokens_per_second};
use elasticsearch::{Elasticsearch, SearchParts};
use serde_json::{Value, json};

use crate::client::{ensure_success, parse_epoch_millis};
use crate::error::StoreError;

/// Date histogram over `completed_at` in calendar intervals, with the
/// per-bucket fields of the Event Store contract plus an overall summary.
pub async fn usage_time_series(
    client: &Elasticsearch,
    index: &str,
    batch_id: &str,
    since: DateTime<Utc>,
    calendar_interval: &str,
) -> Result<UsageStats, StoreError> {
    let response = client
        .search(SearchParts::Index(&[index]))
        .body(json!({
            "size": 0,
            "query": {
                "bool": {
                    "filter": [
                        { "term": { "batch_id": batch_id } },
                        { "range": { "completed_at": { "gte": since.to_rfc3339() } } }
                    ]
                }
            },
            "aggs": {
                "buckets": {
                    "date_histogram": {
                        "field": "completed_at",
                        "calendar_interval": calendar_interval,
                        "min_doc_count": 0
                    },
                    "aggs": bucket_metric_aggs()
                },
                "summary": bucket_metric_aggs()
            }
        }))
        .send()
        .await
        .map_err(StoreError::Transport)?;

    let parsed = ensure_success(response).await?;
    let buckets = parsed["aggregations"]["buckets"]["buckets"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(time_bucket_from_agg)
        .collect::<Result<Vec<_>, _>>()?;

    let total = parsed["hits"]["total"]["value"].as_i64().unwrap_or(0);
    let summary = summary_from_agg(&parsed["aggregations"]["summary"], total)?;

    Ok(UsageStats { buckets, summary })
}

fn bucket_metric_aggs() -> Value {
    json!({
        "completed": { "filter": { "term": { "status": "COMPLETED" } } },
        "failed": { "filter": { "term": { "status": "FAILED" } } },
        "cached": { "filter": { "term": { "cached": true } } },
        "prompt_tokens": { "sum": { "field": "prompt_tokens" } },
        "completion_tokens": { "sum": { "field": "completion_tokens" } },
        "total_tokens": { "sum": { "field": "total_tokens" } },
        "avg_duration_ms": { "avg": { "field": "duration" } },
        "total_duration_ms": { "sum": { "field": "duration" } }
    })
}

fn time_bucket_from_agg(agg: Value) -> Result<TimeBucket, StoreError> {
    let bucket_start = parse_epoch_millis(&agg["key"]).ok_or_else(|| StoreError::Response {
        status: 0,
        body: "date histogram bucket missing a numeric key".to_string(),
    })?;

    let completion_tokens = agg["completion_tokens"]["value"].as_f64().unwrap_or(0.0) as i64;
    let total_duration_ms = agg["total_duration_ms"]["value"].as_f64().unwrap_or(0.0) as i64;
    let cached = agg["cached"]["doc_count"].as_i64().unwrap_or(0);
    let completed_raw = agg["completed"]["doc_count"].as_i64().unwrap_or(0);

    Ok(TimeBucket {
        bucket_start,
        completed: completed_raw - cached,
        failed: agg["failed"]["doc_count"].as_i64().unwrap_or(0),
        cached,
        prompt_tokens: agg["prompt_tokens"]["value"].as_f64().unwrap_or(0.0) as i64,
        completion_tokens,
        total_tokens: agg["total_tokens"]["value"].as_f64().unwrap_or(0.0) as i64,
        avg_duration_ms: agg["avg_duration_ms"]["value"].as_f64().unwrap_or(0.0),
        tokens_per_second: tokens_per_second(completion_tokens, total_duration_ms),
    })
}

fn summary_from_agg(agg: &Value, total: i64) -> Result<UsageSummary, StoreError> {
    let completed_raw = agg["completed"]["doc_count"].as_i64().unwrap_or(0);
    let cached = agg["cached"]["doc_count"].as_i64().unwrap_or(0);
    let completion_tokens = agg["completion_tokens"]["value"].as_f64().unwrap_or(0.0) as i64;
    let total_duration_ms = agg["total_duration_ms"]["value"].as_f64().unwrap_or(0.0) as i64;

    Ok(UsageSummary {
        completed: completed_raw - cached,
        failed: agg["failed"]["doc_count"].as_i64().unwrap_or(0),
        cached,
        prompt_tokens: agg["prompt_tokens"]["value"].as_f64().unwrap_or(0.0) as i64,
        completion_tokens,
        total_tokens: agg["total_tokens"]["value"].as_f64().unwrap_or(0.0) as i64,
        avg_duration_ms: agg["avg_duration_ms"]["value"].as_f64().unwrap_or(0.0),
        tokens_per_second: tokens_per_second(completion_tokens, total_duration_ms),
        cache_hit_rate: cache_hit_rate(cached, total),
    })
}
