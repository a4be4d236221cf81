use std::time::Duration;

use chrono::Utc;
use dispatch_queue::{AckHandle, TaskMessage};
use dispatch_retry::RetryPolicy;
use dispatch_store::EventStore;
use dispatch_types::TaskStatus;
use dispatch_upstream::UpstreamClient;
use log::{debug, info, warn};
use serde_json::json;

use crate::config::ExecutorConfig;

/// Exponential backoff for upstream retries: multiplier 2, min 4s, max
/// 60s, capped at `max_retries` attempts. Matches §4.5's retry discipline
/// exactly (the `tenacity` decorator constants the original wraps around
/// its LLM call).
fn upstream_policy(config: &ExecutorConfig) -> RetryPolicy {
    RetryPolicy::new(config.max_retries, 2.0, Duration::from_secs(4), Duration::from_secs(60))
}

/// Runs one `tasks` delivery through the PENDING -> PROCESSING ->
/// {COMPLETED, FAILED} pipeline of §4.5, acking (or nacking) via
/// `ack_handle` only once the terminal transition is durable. Never
/// returns an error for a message-local problem (§7's propagation policy
/// isolates failures per message), so this always acks or nacks before
/// returning.
pub async fn process_task(
    message: TaskMessage,
    delivery_tag: u64,
    store: &EventStore,
    upstream: &UpstreamClient,
    ack_handle: &AckHandle,
    config: &ExecutorConfig,
) {
    let message_id = message.message_id.clone();

    let event = match store.get(&message_id).await {
        Ok(Some(event)) => event,
        Ok(None) => {
            debug!("task {message_id} has no event, assuming stale redelivery after delete");
            ack_handle.ack(delivery_tag);
            return;
        }
        Err(err) => {
            warn!("error fetching event {message_id}, requeuing: {err}");
            ack_handle.nack(delivery_tag, true);
            return;
        }
    };

    if event.status.is_terminal() {
        debug!("task {message_id} already {}; acking without reprocessing", event.status);
        ack_handle.ack(delivery_tag);
        return;
    }

    let started_at = Utc::now();
    let effective_started_at = match store
        .transition(&message_id, TaskStatus::Pending, TaskStatus::Processing, json!({ "started_at": started_at }))
        .await
    {
        Ok(()) => started_at,
        Err(dispatch_store::StoreError::Conflict(_)) => {
            debug!("task {message_id} was already PROCESSING; continuing from its prior state");
            event.started_at.unwrap_or(started_at)
        }
        Err(dispatch_store::StoreError::NotFound(_)) => {
            debug!("task {message_id} deleted before it could start; acking");
            ack_handle.ack(delivery_tag);
            return;
        }
        Err(err) => {
            warn!("error transitioning {message_id} to PROCESSING, requeuing: {err}");
            ack_handle.nack(delivery_tag, true);
            return;
        }
    };

    match store.find_cached_completion(&event.body_hash).await {
        Ok(Some(cached)) => {
            let completed_at = Utc::now();
            let duration = (completed_at - effective_started_at).num_milliseconds();
            let patch = json!({
                "started_at": effective_started_at,
                "completed_at": completed_at,
                "duration": duration,
                "result": cached.result,
                "prompt_tokens": 0,
                "completion_tokens": 0,
                "total_tokens": 0,
                "cached": true,
            });
            finish(store, ack_handle, delivery_tag, &message_id, patch).await;
            return;
        }
        Ok(None) => {}
        Err(err) => {
            warn!("cache lookup for {message_id} failed, requeuing: {err}");
            ack_handle.nack(delivery_tag, true);
            return;
        }
    }

    let api_key = message.payload.get("api_key").and_then(|v| v.as_str()).map(str::to_string);
    let policy = upstream_policy(config);
    let mut attempt = 0u32;

    let outcome = loop {
        attempt += 1;
        match upstream.invoke(&event.method, &event.url, &event.body, api_key.as_deref()).await {
            Ok(response) => break Ok(response),
            Err(err) => {
                if attempt >= config.max_retries {
                    break Err(err);
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    "upstream call for {message_id} failed on attempt {attempt}/{}: {err}. retrying in {:.1}s",
                    config.max_retries,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
            }
        }
    };

    let completed_at = Utc::now();
    let duration = (completed_at - effective_started_at).num_milliseconds();

    let patch = match outcome {
        Ok(response) => {
            info!("task {message_id} completed after {attempt} attempt(s)");
            json!({
                "started_at": effective_started_at,
                "completed_at": completed_at,
                "duration": duration,
                "result": response.body,
                "prompt_tokens": response.usage.prompt_tokens,
                "completion_tokens": response.usage.completion_tokens,
                "total_tokens": response.usage.total_tokens,
                "cached": false,
                "attempt": attempt,
            })
        }
        Err(err) => {
            warn!("task {message_id} failed permanently after {attempt} attempt(s): {err}");
            json!({
                "started_at": effective_started_at,
                "completed_at": completed_at,
                "duration": duration,
                "result": { "error": err.to_string() },
                "cached": false,
                "attempt": attempt,
            })
        }
    };

    finish(store, ack_handle, delivery_tag, &message_id, patch).await;
}

async fn finish(
    store: &EventStore,
    ack_handle: &AckHandle,
    delivery_tag: u64,
    message_id: &str,
    patch: serde_json::Value,
) {
    let to = if patch["result"]["error"].is_string() {
        TaskStatus::Failed
    } else {
        TaskStatus::Completed
    };

    match store.transition(message_id, TaskStatus::Processing, to, patch).await {
        Ok(()) => ack_handle.ack(delivery_tag),
        Err(dispatch_store::StoreError::Conflict(_)) => {
            debug!("task {message_id} was already moved to a terminal state by another delivery");
            ack_handle.ack(delivery_tag);
        }
        Err(dispatch_store::StoreError::NotFound(_)) => {
            debug!("task {message_id} deleted mid-processing; acking anyway");
            ack_handle.ack(delivery_tag);
        }
        Err(err) => {
            warn!("error writing terminal state for {message_id}, requeuing: {err}");
            ack_handle.nack(delivery_tag, true);
        }
    }
}
