//! Mapping of HTTP outcomes onto [`UpstreamError`].
//!
//! 429 is rate limiting, 5xx and network failures are outages, any other
//! non-success status is a permanent rejection.

use reqwest::StatusCode;
use rfp_harness_core::error::UpstreamError;

pub fn status_error(service: &str, status: StatusCode, body: String) -> UpstreamError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        UpstreamError::RateLimited {
            service: service.to_string(),
            message: body,
        }
    } else if status.is_server_error() {
        UpstreamError::Unavailable {
            service: service.to_string(),
            message: format!("{}: {}", status, body),
        }
    } else {
        UpstreamError::Rejected {
            service: service.to_string(),
            status: status.as_u16(),
            message: body,
        }
    }
}

pub fn network_error(service: &str, err: reqwest::Error) -> UpstreamError {
    UpstreamError::Unavailable {
        service: service.to_string(),
        message: err.to_string(),
    }
}

pub fn malformed(service: &str, message: impl Into<String>) -> UpstreamError {
    UpstreamError::Malformed {
        service: service.to_string(),
        message: message.into(),
    }
}
