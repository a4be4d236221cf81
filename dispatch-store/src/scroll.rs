use std::pin::Pin;
use std::task::{Context, Poll};

use dispatch_types::Event;
use elasticsearch::{ClearScrollParts, Elasticsearch, ScrollParts, SearchParts};
use futures::Stream;
use futures::future::BoxFuture;
use log::{debug, warn};
use serde_json::Value;

use crate::client::ensure_success;
use crate::error::StoreError;

const SCROLL_KEEP_ALIVE: &str = "2m";

type PageFuture = BoxFuture<'static, Result<(Vec<Event>, Option<String>), StoreError>>;

enum State {
    /// The initial search has not been issued yet.
    NotStarted { query: Value },
    /// A page fetch (initial search or scroll continuation) is in flight.
    Fetching(PageFuture),
    /// A page was yielded and a scroll id is ready to continue from on
    /// the next poll.
    HaveMore { scroll_id: String },
    /// No more pages; the scroll context (if any) has been cleared.
    Done,
}

/// A lazy sequence of ≤10 000-event chunks backed by an Elasticsearch
/// scroll cursor. The cursor is released both on normal exhaustion and on
/// early drop (the caller disconnecting mid-export), matching the
/// streaming-generator contract of the export endpoint.
pub struct ScrollStream {
    client: Elasticsearch,
    index: String,
    scroll_id: Option<String>,
    page_size: usize,
    state: State,
}

impl ScrollStream {
    pub(crate) fn new(client: Elasticsearch, index: String, query: Value, page_size: usize) -> Self {
        Self {
            client,
            index,
            scroll_id: None,
            page_size,
            state: State::NotStarted { query },
        }
    }

    fn handle_page(&mut self, events: Vec<Event>, next_scroll_id: Option<String>) -> Option<Vec<Event>> {
        self.scroll_id = next_scroll_id.clone();
        match next_scroll_id {
            Some(scroll_id) if events.len() >= self.page_size => {
                self.state = State::HaveMore { scroll_id };
            }
            Some(scroll_id) => {
                // Short page: this was the last one.
                self.state = State::Done;
                self.scroll_id = None;
                tokio::spawn(clear_scroll(self.client.clone(), scroll_id));
            }
            None => {
                self.state = State::Done;
            }
        }
        if events.is_empty() { None } else { Some(events) }
    }
}

impl Stream for ScrollStream {
    type Item = Result<Vec<Event>, StoreError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            match &mut this.state {
                State::Done => return Poll::Ready(None),
                State::NotStarted { query } => {
                    let client = this.client.clone();
                    let index = this.index.clone();
                    let query = query.clone();
                    let page_size = this.page_size;
                    this.state = State::Fetching(Box::pin(async move {
                        fetch_first_page(client, index, query, page_size).await
                    }));
                }
                State::HaveMore { scroll_id } => {
                    let client = this.client.clone();
                    let scroll_id = scroll_id.clone();
                    this.state = State::Fetching(Box::pin(fetch_next_page(client, scroll_id)));
                }
                State::Fetching(fut) => match fut.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(err)) => {
                        this.state = State::Done;
                        return Poll::Ready(Some(Err(err)));
                    }
                    Poll::Ready(Ok((events, next_scroll_id))) => {
                        match this.handle_page(events, next_scroll_id) {
                            Some(events) => return Poll::Ready(Some(Ok(events))),
                            None => continue,
                        }
                    }
                },
            }
        }
    }
}

async fn fetch_first_page(
    client: Elasticsearch,
    index: String,
    query: Value,
    page_size: usize,
) -> Result<(Vec<Event>, Option<String>), StoreError> {
    let response = client
        .search(SearchParts::Index(&[&index]))
        .scroll(SCROLL_KEEP_ALIVE)
        .size(page_size as i64)
        .body(query)
        .send()
        .await
        .map_err(StoreError::Transport)?;

    let parsed = ensure_success(response).await?;
    parse_page(parsed)
}

async fn fetch_next_page(
    client: Elasticsearch,
    scroll_id: String,
) -> Result<(Vec<Event>, Option<String>), StoreError> {
    let response = client
        .scroll(ScrollParts::None)
        .body(serde_json::json!({ "scroll": SCROLL_KEEP_ALIVE, "scroll_id": scroll_id }))
        .send()
        .await
        .map_err(StoreError::Transport)?;

    let parsed = ensure_success(response).await?;
    parse_page(parsed)
}

fn parse_page(parsed: Value) -> Result<(Vec<Event>, Option<String>), StoreError> {
    let scroll_id = parsed["_scroll_id"].as_str().map(str::to_string);
    let hits = parsed["hits"]["hits"].as_array().cloned().unwrap_or_default();
    let events = hits
        .into_iter()
        .map(|hit| serde_json::from_value(hit["_source"].clone()).map_err(StoreError::Deserialize))
        .collect::<Result<Vec<Event>, StoreError>>()?;
    Ok((events, scroll_id))
}

async fn clear_scroll(client: Elasticsearch, scroll_id: String) {
    if let Err(err) = client
        .clear_scroll(ClearScrollParts::ScrollId(&[&scroll_id]))
        .send()
        .await
    {
        warn!("failed to clear scroll context {scroll_id}: {err}");
    } else {
        debug!("cleared scroll context {scroll_id}");
    }
}

impl Drop for ScrollStream {
    fn drop(&mut self) {
        if let Some(scroll_id) = self.scroll_id.take() {
            let client = self.client.clone();
            tokio::spawn(clear_scroll(client, scroll_id));
        }
    }
}
