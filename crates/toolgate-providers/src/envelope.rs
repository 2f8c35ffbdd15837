//! Uniform response envelope returned to the tool-call host.

use serde::Serialize;

use crate::error::{ErrorCategory, ProviderError, ProviderResult};

/// Result of one tool invocation.
///
/// Serialises as `{"success": true, "data": ...}` or
/// `{"success": false, "kind": "<category>", "error": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ToolResponse<T> {
    /// A successful response carrying `data` unchanged.
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            kind: None,
            error: None,
        }
    }

    /// A failed response for `error`.
    pub fn failure(error: &ProviderError) -> Self {
        Self {
            success: false,
            data: None,
            kind: Some(error.category()),
            error: Some(error.message().to_string()),
        }
    }

    /// Returns true if the invocation succeeded.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Returns the error category of a failed response.
    pub fn kind(&self) -> Option<ErrorCategory> {
        self.kind
    }
}

impl<T> From<ProviderResult<T>> for ToolResponse<T> {
    fn from(result: ProviderResult<T>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::failure(&e),
        }
    }
}

impl<T: Serialize> ToolResponse<T> {
    /// Serialises the envelope to a JSON value.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({
                "success": false,
                "kind": ErrorCategory::Operation,
                "error": format!("failed to serialize response: {}", e),
            })
        })
    }
}
