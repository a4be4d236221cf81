use crate::error::StoreError;

/// Translates the API's `interval` parameter (`1m|1h|1d|1w|1M|1q|1y`) into
/// the calendar_interval keyword Elasticsearch's date_histogram
/// aggregation expects.
pub fn calendar_interval(spec: &str) -> Result<&'static str, StoreError> {
    match spec {
        "1m" => Ok("minute"),
        "1h" => Ok("hour"),
        "1d" => Ok("day"),
        "1w" => Ok("week"),
        "1M" => Ok("month"),
        "1q" => Ok("quarter"),
        "1y" => Ok("year"),
        other => Err(StoreError::Response {
            status: 400,
            body: format!("unsupported interval {other}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_known_intervals() {
        assert_eq!(calendar_interval("1d").unwrap(), "day");
        assert_eq!(calendar_interval("1q").unwrap(), "quarter");
    }

    #[test]
    fn rejects_unknown_interval() {
        assert!(calendar_interval("3h").is_err());
    }
}
