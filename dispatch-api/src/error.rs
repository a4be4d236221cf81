use dispatch_objectstore::ObjectStoreError;
use dispatch_queue::QueueError;
use dispatch_store::StoreError;
use log::error;
use rocket::http::{ContentType, Status};
use rocket::response::Responder;
use rocket::serde::json::Json;
use rocket::{Request, Response};
use serde::Serialize;
use std::io::Cursor;
use thiserror::Error;

/// The API-facing error taxonomy of §7: a malformed request becomes 400,
/// an unknown resource 404, everything else a logged 500.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    ObjectStore(#[from] ObjectStoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = match &self {
            ApiError::Validation(_) => Status::BadRequest,
            ApiError::NotFound(_) => Status::NotFound,
            ApiError::Store(StoreError::NotFound(_)) => Status::NotFound,
            ApiError::Store(StoreError::Conflict(_)) => Status::Conflict,
            _ => Status::InternalServerError,
        };

        if status == Status::InternalServerError {
            error!("request {} {} failed: {self}", request.method(), request.uri());
        }

        let body = serde_json::to_string(&ErrorBody { error: self.to_string() })
            .unwrap_or_else(|_| "{\"error\":\"internal error\"}".to_string());

        Response::build()
            .status(status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
