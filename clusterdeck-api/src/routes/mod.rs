use actix_web::error::{InternalError, JsonPayloadError, PathError, QueryPayloadError};
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

pub mod clusters;
pub mod health_check;
pub mod metrics;
pub mod nodes;
pub mod workloads;

/// Body of every error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub error: String,
}

pub(crate) fn error_response(status: StatusCode, message: String) -> HttpResponse {
    HttpResponse::build(status).json(ErrorMessage { error: message })
}

/// Turns malformed JSON bodies into a `400` with an [`ErrorMessage`].
pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = error_response(StatusCode::BAD_REQUEST, err.to_string());
    InternalError::from_response(err, response).into()
}

pub fn path_error_handler(err: PathError, _req: &HttpRequest) -> actix_web::Error {
    let response = error_response(StatusCode::BAD_REQUEST, err.to_string());
    InternalError::from_response(err, response).into()
}

pub fn query_error_handler(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let response = error_response(StatusCode::BAD_REQUEST, err.to_string());
    InternalError::from_response(err, response).into()
}
