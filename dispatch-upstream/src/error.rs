use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum UpstreamError {
    #[error("error building upstream request")]
    Build(#[source] reqwest::Error),

    #[error("error executing upstream request")]
    Execute(#[source] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("error reading upstream response body")]
    Body(#[source] reqwest::Error),

    #[error("upstream call exceeded its timeout")]
    Timeout,
}
