//! Shared HTTP utilities for the library catalog workspace.
//!
//! Provides the uniform response envelope `{code, message, data}` and the
//! business status codes carried in it. Framework-agnostic: the api-server
//! pairs each envelope with an HTTP status of its own.

use serde::{Deserialize, Serialize};

// ============================================================================
// Business codes
// ============================================================================

pub const CODE_SUCCESS: i32 = 200;
/// The payload failed a backend constraint (e.g. missing title).
pub const CODE_INVALID: i32 = 4000;
pub const CODE_NOT_FOUND: i32 = 4040;
pub const CODE_CONFLICT: i32 = 4090;
pub const CODE_INTERNAL: i32 = 5000;

pub const MSG_SUCCESS: &str = "Success";
/// Generic text for unhandled faults; details go to the logs only.
pub const MSG_INTERNAL: &str = "Internal Server Error. Please contact support.";

// ============================================================================
// Envelope
// ============================================================================

/// Uniform wrapper for every API response.
///
/// `code == 200` means success; any other value is a domain-specific failure.
/// `data` is serialized as `null` when absent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Success envelope carrying `data`.
    pub fn success(data: T) -> Self {
        Self {
            code: CODE_SUCCESS,
            message: MSG_SUCCESS.to_string(),
            data: Some(data),
        }
    }

    /// Success envelope without payload.
    pub fn empty() -> Self {
        Self {
            code: CODE_SUCCESS,
            message: MSG_SUCCESS.to_string(),
            data: None,
        }
    }

    /// Failure envelope; failures never carry data.
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Generic internal-error envelope that leaks no detail to the caller.
    pub fn internal() -> Self {
        Self::failure(CODE_INTERNAL, MSG_INTERNAL)
    }

    pub fn is_success(&self) -> bool {
        self.code == CODE_SUCCESS
    }
}

/// Message used for a delete that matched nothing.
pub fn not_found_message(id: i64) -> String {
    format!("Book not found with id: {}", id)
}

/// Message used when an insert collides with an existing id.
pub fn conflict_message(id: i64) -> String {
    format!("Book already exists with id: {}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_envelope_shape() {
        let v = serde_json::to_value(ApiResponse::success(vec![1, 2])).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"code": 200, "message": "Success", "data": [1, 2]})
        );
    }

    #[test]
    fn empty_envelope_serializes_null_data() {
        let v = serde_json::to_value(ApiResponse::<()>::empty()).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"code": 200, "message": "Success", "data": null})
        );
    }

    #[test]
    fn failure_envelope_shape() {
        let r = ApiResponse::<u8>::failure(CODE_NOT_FOUND, not_found_message(3));
        assert!(!r.is_success());
        let v = serde_json::to_value(r).unwrap();
        assert_eq!(
            v,
            serde_json::json!({"code": 4040, "message": "Book not found with id: 3", "data": null})
        );
    }

    #[test]
    fn internal_envelope_is_generic() {
        let r = ApiResponse::<()>::internal();
        assert_eq!(r.code, 5000);
        assert_eq!(r.message, MSG_INTERNAL);
        assert!(r.data.is_none());
    }

    #[test]
    fn envelope_deserializes() {
        let r: ApiResponse<String> =
            serde_json::from_str("{\"code\":200,\"message\":\"Success\",\"data\":\"ok\"}").unwrap();
        assert!(r.is_success());
        assert_eq!(r.data.as_deref(), Some("ok"));
    }
}
