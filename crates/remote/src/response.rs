//! Classification of remote responses.

use bytes::Bytes;
use http::StatusCode;
use serde::de::DeserializeOwned;

use crate::error::{RemoteError, TransportError};
use crate::transport::RemoteResponse;

const NO_ERROR_BODY: &str = "No error body.";

/// Turn a response into `T`, or classify why that is not possible.
///
/// Checked in order: oversized body, 429, other non-success status, body
/// read failure, missing or unsupported content type, JSON parse.
pub fn decode<T: DeserializeOwned>(response: RemoteResponse) -> Result<T, RemoteError> {
    let RemoteResponse {
        status,
        content_type,
        body,
    } = response;

    if let Err(error @ TransportError::BodyTooLarge { .. }) = &body {
        return Err(RemoteError::TooLarge {
            source: error.clone(),
        });
    }

    if status == StatusCode::TOO_MANY_REQUESTS.as_u16() {
        return Err(RemoteError::Rejected {
            status,
            message: error_message(body.as_ref().ok()),
        });
    }

    if !(200..300).contains(&status) {
        return Err(status_error(status, body.as_ref().ok()));
    }

    let body = body.map_err(|source| RemoteError::Deserialize { source })?;

    let Some(content_type) = content_type else {
        return Err(RemoteError::MissingContentType {
            body: String::from_utf8_lossy(&body).into_owned(),
        });
    };
    if !is_json(&content_type) {
        return Err(RemoteError::UnsupportedContentType { content_type });
    }

    serde_json::from_slice(&body).map_err(|source| RemoteError::Incompatible { source })
}

/// Error for a non-success, non-429 status.
///
/// A code outside the valid HTTP range becomes 500 and the message says
/// which code could not be used.
fn status_error(status: u16, body: Option<&Bytes>) -> RemoteError {
    let message = error_message(body);
    match StatusCode::from_u16(status) {
        Ok(code) => RemoteError::Status {
            status: code.as_u16(),
            message,
        },
        Err(_) => RemoteError::Status {
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            message: format!("Couldn't extract status [{status}]. {message}"),
        },
    }
}

fn error_message(body: Option<&Bytes>) -> String {
    match body {
        Some(body) if !body.is_empty() => {
            format!("body={}", String::from_utf8_lossy(body))
        }
        _ => NO_ERROR_BODY.to_string(),
    }
}

fn is_json(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}
