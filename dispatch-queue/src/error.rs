use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum QueueError {
    #[error("error connecting to the broker")]
    Connect(#[source] lapin::Error),

    #[error("publish was not confirmed within the timeout")]
    Unconfirmed,

    #[error("publish was negatively acknowledged by the broker")]
    Nacked,

    #[error("error consuming from the broker")]
    Consume(#[source] lapin::Error),

    #[error("error encoding or decoding a queue message")]
    Decode(#[source] serde_json::Error),

    #[error("invalid broker configuration")]
    Config(#[from] figment::Error),
}
