use serde::Deserialize;
use thiserror::Error;

/// PostgREST code for "`.single()` matched no rows".
pub const NO_ROWS_CODE: &str = "PGRST116";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - check the API key")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Resource already exists: {0}")]
    Conflict(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Database error {code}: {message}")]
    Postgrest { code: String, message: String },

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape shared by PostgREST and the storage API.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
    #[serde(rename = "statusCode")]
    status_code: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();

        match status.as_u16() {
            401 => return ApiError::Unauthorized,
            429 => return ApiError::RateLimited,
            _ => {}
        }

        if let Some(parsed) = parsed {
            // The storage API reports duplicates as 400 with statusCode "409".
            if status.as_u16() == 409 || parsed.status_code.as_deref() == Some("409") {
                return ApiError::Conflict(truncated);
            }
            if let Some(code) = parsed.code.filter(|c| c.starts_with("PGRST")) {
                return ApiError::Postgrest {
                    code,
                    message: parsed.message.unwrap_or_default(),
                };
            }
        }

        match status.as_u16() {
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            409 => ApiError::Conflict(truncated),
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True when a single-row lookup found nothing.
    pub fn is_no_rows(&self) -> bool {
        matches!(self, ApiError::Postgrest { code, .. } if code == NO_ROWS_CODE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_codes() {
        assert!(matches!(ApiError::from_status(StatusCode::UNAUTHORIZED, ""), ApiError::Unauthorized));
        assert!(matches!(ApiError::from_status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(ApiError::from_status(StatusCode::FORBIDDEN, "nope"), ApiError::AccessDenied(_)));
        assert!(matches!(ApiError::from_status(StatusCode::BAD_GATEWAY, "down"), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(StatusCode::IM_A_TEAPOT, "?"), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_postgrest_no_rows() {
        let body = r#"{"code":"PGRST116","details":"The result contains 0 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#;
        let err = ApiError::from_status(StatusCode::NOT_ACCEPTABLE, body);
        assert!(err.is_no_rows());
    }

    #[test]
    fn test_postgrest_multiple_rows_reads_as_no_rows() {
        let body = r#"{"code":"PGRST116","details":"The result contains 2 rows","hint":null,"message":"JSON object requested, multiple (or no) rows returned"}"#;
        let err = ApiError::from_status(StatusCode::NOT_ACCEPTABLE, body);
        assert!(err.is_no_rows());
        assert!(!ApiError::from_status(StatusCode::NOT_FOUND, "").is_no_rows());
    }

    #[test]
    fn test_storage_duplicate_is_conflict() {
        let body = r#"{"statusCode":"409","error":"Duplicate","message":"The resource already exists"}"#;
        assert!(matches!(ApiError::from_status(StatusCode::BAD_REQUEST, body), ApiError::Conflict(_)));
    }

    #[test]
    fn test_truncate_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with("(truncated, 510 total bytes)"));
    }
}
