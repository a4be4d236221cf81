use std::io::BufRead;

use log::warn;
use serde_json::Value;

/// One validated line of an uploaded JSONL batch: the required
/// `{custom_id, method, url, body}` plus the optional caller metadata.
/// `api_key`, if present, is carried only as far as the `tasks` message
/// (it is never written into the stored `Event`).
#[derive(Debug, Clone)]
pub struct ParsedLine {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: Value,
    pub dataset: Option<String>,
    pub source: Option<Value>,
    pub api_key: Option<String>,
}

/// Parses and validates one JSONL line. Invalid lines are the caller's to
/// log and skip; they never poison the batch (§4.4 step 3).
fn parse_line(line: &str) -> Result<ParsedLine, String> {
    let value: Value = serde_json::from_str(line).map_err(|err| err.to_string())?;
    let object = value.as_object().ok_or("line is not a JSON object")?;

    let custom_id = object
        .get("custom_id")
        .and_then(Value::as_str)
        .ok_or("missing required field custom_id")?
        .to_string();
    let method = object
        .get("method")
        .and_then(Value::as_str)
        .ok_or("missing required field method")?
        .to_string();
    let url = object
        .get("url")
        .and_then(Value::as_str)
        .ok_or("missing required field url")?
        .to_string();
    let body = object.get("body").cloned().ok_or("missing required field body")?;
    if !body.is_object() {
        return Err("body must be a JSON object".to_string());
    }

    let dataset = object.get("dataset").and_then(Value::as_str).map(str::to_string);
    let source = object.get("source").cloned();
    let api_key = object.get("api_key").and_then(Value::as_str).map(str::to_string);

    Ok(ParsedLine { custom_id, method, url, body, dataset, source, api_key })
}

/// Streams `blob` line by line, partitioning valid lines into
/// fixed-size chunks. Invalid lines are logged at `warn` with their
/// 1-indexed line number and dropped; they do not advance or break a
/// chunk. Returns the chunks plus the count of lines skipped.
pub fn parse_jsonl_chunks(blob: &[u8], chunk_size: usize) -> (Vec<Vec<ParsedLine>>, usize) {
    let mut chunks = Vec::new();
    let mut current = Vec::with_capacity(chunk_size);
    let mut skipped = 0;

    for (line_number, line) in blob.lines().enumerate() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("line {} is not valid UTF-8, skipping: {err}", line_number + 1);
                skipped += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_line(&line) {
            Ok(parsed) => {
                current.push(parsed);
                if current.len() >= chunk_size {
                    chunks.push(std::mem::replace(&mut current, Vec::with_capacity(chunk_size)));
                }
            }
            Err(reason) => {
                warn!("skipping invalid JSONL line {}: {reason}", line_number + 1);
                skipped += 1;
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    (chunks, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_line() {
        let line = r#"{"custom_id":"a","method":"POST","url":"/v1/chat","body":{"x":1}}"#;
        let parsed = parse_line(line).unwrap();
        assert_eq!(parsed.custom_id, "a");
        assert_eq!(parsed.method, "POST");
    }

    #[test]
    fn rejects_missing_field() {
        let line = r#"{"custom_id":"a","method":"POST","body":{}}"#;
        assert!(parse_line(line).is_err());
    }

    #[test]
    fn rejects_non_object_body() {
        let line = r#"{"custom_id":"a","method":"POST","url":"/v1","body":"not an object"}"#;
        assert!(parse_line(line).is_err());
    }

    #[test]
    fn invalid_line_is_skipped_not_fatal() {
        let blob = b"{\"custom_id\":\"a\",\"method\":\"POST\",\"url\":\"/v1\",\"body\":{}}\nnot-json\n{\"custom_id\":\"b\",\"method\":\"POST\",\"url\":\"/v1\",\"body\":{}}\n";
        let (chunks, skipped) = parse_jsonl_chunks(blob, 10);
        assert_eq!(skipped, 1);
        assert_eq!(chunks.iter().map(Vec::len).sum::<usize>(), 2);
    }

    #[test]
    fn partitions_into_fixed_size_chunks() {
        let mut blob = String::new();
        for i in 0..25 {
            blob.push_str(&format!(
                "{{\"custom_id\":\"{i}\",\"method\":\"POST\",\"url\":\"/v1\",\"body\":{{}}}}\n"
            ));
        }
        let (chunks, skipped) = parse_jsonl_chunks(blob.as_bytes(), 10);
        assert_eq!(skipped, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }
}
