use dispatch_objectstore::ObjectStoreError;
use dispatch_queue::QueueError;
use dispatch_store::StoreError;
use miette::Diagnostic;
use thiserror::Error;

/// A batch message that fails to fully ingest aborts and is NACKed (or
/// simply not acked) so the broker redelivers it, per §4.4. Mirrors the
/// teacher's `IngestFatalError` shape, one `#[from]` variant per
/// collaborator.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestFatalError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),

    #[error(transparent)]
    Config(#[from] figment::Error),
}
