use std::time::Duration;

use log::debug;
use serde_json::Value;

use crate::error::UpstreamError;
use crate::usage::TokenUsage;

/// The upstream LLM response: its JSON body plus whatever token usage it
/// reported.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub body: Value,
    pub usage: TokenUsage,
}

/// One request per task body. Collapses the paginated-client shape of the
/// corpus's Chron client down to a single call: build, execute, check
/// status, parse.
pub struct UpstreamClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Invokes `method url` with `body` as the JSON payload. `api_key`, if
    /// present on the task, is sent as a bearer token to the upstream
    /// endpoint (propagated verbatim from the JSONL line, never logged).
    pub async fn invoke(
        &self,
        method: &str,
        url: &str,
        body: &Value,
        api_key: Option<&str>,
    ) -> Result<UpstreamResponse, UpstreamError> {
        let method = method
            .parse::<reqwest::Method>()
            .unwrap_or(reqwest::Method::POST);

        let mut builder = self.client.request(method, url).json(body);
        if let Some(api_key) = api_key {
            builder = builder.bearer_auth(api_key);
        }

        let request = builder.build().map_err(UpstreamError::Build)?;

        debug!("invoking upstream {} {}", request.method(), request.url());

        let response = tokio::time::timeout(self.timeout, self.client.execute(request))
            .await
            .map_err(|_| UpstreamError::Timeout)?
            .map_err(UpstreamError::Execute)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Status { status: status.as_u16(), body });
        }

        let body: Value = response.json().await.map_err(UpstreamError::Body)?;
        let usage = TokenUsage::from_response(&body);
        Ok(UpstreamResponse { body, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn invoke_returns_body_and_usage_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"content": "hi"}}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}
            })))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Duration::from_secs(5));
        let response = client
            .invoke(
                "POST",
                &format!("{}/v1/chat/completions", server.uri()),
                &json!({"model": "test"}),
                None,
            )
            .await
            .unwrap();

        assert_eq!(response.usage.prompt_tokens, 3);
        assert_eq!(response.usage.total_tokens, 8);
    }

    #[tokio::test]
    async fn invoke_sends_bearer_auth_when_api_key_present() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer secret-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Duration::from_secs(5));
        client
            .invoke(
                "POST",
                &format!("{}/v1/chat/completions", server.uri()),
                &json!({}),
                Some("secret-key"),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn invoke_surfaces_non_success_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = UpstreamClient::new(Duration::from_secs(5));
        let err = client
            .invoke(
                "POST",
                &format!("{}/v1/chat/completions", server.uri()),
                &json!({}),
                None,
            )
            .await
            .unwrap_err();

        match err {
            UpstreamError::Status { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("expected Status error, got {other:?}"),
        }
    }
}
