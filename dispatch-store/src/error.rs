use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("event {0} not found")]
    NotFound(String),

    #[error("event {0} was not in the expected prior state")]
    Conflict(String),

    #[error("event store transport error")]
    Transport(#[source] elasticsearch::Error),

    #[error("error serializing document for the event store")]
    Serialize(#[source] serde_json::Error),

    #[error("error deserializing event store response")]
    Deserialize(#[source] serde_json::Error),

    #[error("event store returned status {status}: {body}")]
    Response { status: u16, body: String },

    #[error("failed to set up the events index")]
    IndexSetup(#[source] Box<StoreError>),

    #[error("invalid event store configuration")]
    Config(#[from] figment::Error),

    #[error("invalid event store url")]
    InvalidUrl(#[source] url::ParseError),
}
