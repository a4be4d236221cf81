use miette::Diagnostic;
use thiserror::Error;

/// A malformed JSONL line, missing required field, or illegal query
/// parameter. Recovered locally: ingestion skips the line and logs it;
/// the API surface turns it into a 400.
#[derive(Debug, Error, Diagnostic)]
pub enum DomainError {
    #[error("{0}")]
    Validation(String),
}
