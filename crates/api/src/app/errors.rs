use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use stockroom_core::DomainError;
use stockroom_infra::EngineError;

pub fn engine_error_to_response(err: EngineError) -> Response {
    let status = match &err {
        EngineError::Domain(domain) => domain_status(domain),
        EngineError::Contention { .. } => StatusCode::CONFLICT,
        EngineError::Storage(e) => {
            tracing::error!(error = %e, "storage failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    json_error(status, err.code(), err.to_string())
}

pub fn domain_error_to_response(err: DomainError) -> Response {
    json_error(domain_status(&err), err.code(), err.to_string())
}

fn domain_status(err: &DomainError) -> StatusCode {
    match err {
        DomainError::Validation(_) | DomainError::InvalidId(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::InsufficientStock { .. }
        | DomainError::OverReturn { .. }
        | DomainError::InvalidState(_)
        | DomainError::Conflict(_) => StatusCode::CONFLICT,
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path/body value with its domain `FromStr`, mapping failures to a 400.
pub fn parse<T>(raw: &str) -> Result<T, Response>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.parse().map_err(domain_error_to_response)
}

pub fn parse_opt<T>(raw: Option<&str>) -> Result<Option<T>, Response>
where
    T: std::str::FromStr<Err = DomainError>,
{
    raw.map(parse).transpose()
}
