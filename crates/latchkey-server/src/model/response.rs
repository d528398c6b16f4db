//! HTTP response envelope

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use serde::{Deserialize, Serialize};

use latchkey_common::LatchkeyError;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RestResult<T> {
    pub code: i32,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> RestResult<T> {
    pub fn ok(data: Option<T>) -> Self {
        RestResult {
            code: 0,
            message: Some("success".to_string()),
            data,
        }
    }

    pub fn err(code: i32, message: &str) -> Self {
        RestResult {
            code,
            message: Some(message.to_string()),
            data: None,
        }
    }

    pub fn err_with(code: i32, message: &str, data: T) -> Self {
        RestResult {
            code,
            message: Some(message.to_string()),
            data: Some(data),
        }
    }
}

/// Map a store failure onto an HTTP status: transport problems are 503, the rest 500
pub fn error_response(error: &LatchkeyError) -> HttpResponse {
    let status = if error.is_transient() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    HttpResponse::build(status).json(RestResult::<()>::err(
        i32::from(status.as_u16()),
        &error.to_string(),
    ))
}
