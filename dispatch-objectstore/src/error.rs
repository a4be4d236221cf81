use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ObjectStoreError {
    #[error("error reaching the object store")]
    Connect(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("object {0} not found")]
    NotFound(String),

    #[error("failed to ensure bucket {0} exists")]
    BucketSetup(String),

    #[error("invalid object store configuration")]
    Config(#[from] figment::Error),
}
