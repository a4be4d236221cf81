use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One calendar-interval bucket of a usage time series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeBucket {
    pub bucket_start: DateTime<Utc>,
    pub completed: i64,
    pub failed: i64,
    pub cached: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub avg_duration_ms: f64,
    pub tokens_per_second: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSummary {
    pub completed: i64,
    pub failed: i64,
    pub cached: i64,
    pub prompt_tokens: i64,
    pub completion_tokens: i64,
    pub total_tokens: i64,
    pub avg_duration_ms: f64,
    pub tokens_per_second: f64,
    pub cache_hit_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageStats {
    pub buckets: Vec<TimeBucket>,
    pub summary: UsageSummary,
}

/// `sum(completion_tokens) / (sum(duration_ms) / 1000)`, zero when there is
/// no elapsed time to divide by.
pub fn tokens_per_second(completion_tokens: i64, total_duration_ms: i64) -> f64 {
    if total_duration_ms <= 0 {
        return 0.0;
    }
    completion_tokens as f64 / (total_duration_ms as f64 / 1000.0)
}

/// Percentage of all tasks in the window that were served from cache,
/// rounded to 2 decimals. Denominator is every task seen, not just the
/// completed ones.
pub fn cache_hit_rate(cached: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let rate = cached as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_per_second_handles_zero_duration() {
        assert_eq!(tokens_per_second(100, 0), 0.0);
    }

    #[test]
    fn tokens_per_second_basic() {
        assert_eq!(tokens_per_second(200, 2000), 100.0);
    }

    #[test]
    fn cache_hit_rate_basic() {
        assert_eq!(cache_hit_rate(5, 10), 50.0);
    }

    #[test]
    fn cache_hit_rate_zero_total() {
        assert_eq!(cache_hit_rate(0, 0), 0.0);
    }

    #[test]
    fn cache_hit_rate_rounds_to_two_decimals() {
        assert_eq!(cache_hit_rate(1, 3), 33.33);
    }
}
