use serde::Serialize;
use utoipa::ToSchema;

/// Envoltura estándar de la API: `{success, data|message, errors}`.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            errors: None,
        }
    }
}

impl ApiResponse<serde_json::Value> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            errors: None,
        }
    }

    pub fn error(message: impl Into<String>, errors: serde_json::Value) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
            errors: Some(errors),
        }
    }
}
