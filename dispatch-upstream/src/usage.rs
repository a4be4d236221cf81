use serde_json::Value;

/// Token counters pulled out of an upstream chat-completion response's
/// `usage` object. Zero for upstreams that don't report usage.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
}

impl TokenUsage {
    pub fn from_response(body: &Value) -> Self {
        let usage = &body["usage"];
        let prompt_tokens = usage["prompt_tokens"].as_i64().unwrap_or(0);
        let completion_tokens = usage["completion_tokens"].as_i64().unwrap_or(0);
        let total_tokens = usage["total_tokens"].as_i64().unwrap_or(prompt_tokens + completion_tokens);
        Self { prompt_tokens, completion_tokens, total_tokens }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_usage_object() {
        let body = json!({ "usage": { "prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15 } });
        let usage = TokenUsage::from_response(&body);
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
        assert_eq!(usage.total_tokens, 15);
    }

    #[test]
    fn defaults_to_zero_without_usage() {
        let body = json!({ "choices": [] });
        let usage = TokenUsage::from_response(&body);
        assert_eq!(usage.total_tokens, 0);
    }

    #[test]
    fn derives_total_when_missing() {
        let body = json!({ "usage": { "prompt_tokens": 3, "completion_tokens": 4 } });
        let usage = TokenUsage::from_response(&body);
        assert_eq!(usage.total_tokens, 7);
    }
}
