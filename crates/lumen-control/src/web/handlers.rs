//! HTTP request and response bodies

use serde::{Deserialize, Serialize};

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// Start request; omitted fields fall back to the configured show defaults
#[derive(Debug, Serialize, Deserialize)]
pub struct StartShowRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub device_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity: Option<i64>,
}

impl StartShowRequest {
    /// Validate the request parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.device_ids.is_empty() {
            return Err("device_ids must not be empty".to_string());
        }
        if self.device_ids.iter().any(|id| id.trim().is_empty()) {
            return Err("device_ids must not contain blank ids".to_string());
        }
        Ok(())
    }
}

/// Mode change request
#[derive(Debug, Serialize, Deserialize)]
pub struct SetModeRequest {
    pub mode: String,
}

/// Latency change request
#[derive(Debug, Serialize, Deserialize)]
pub struct SetLatencyRequest {
    pub latency_ms: i64,
}

/// Intensity change request
#[derive(Debug, Serialize, Deserialize)]
pub struct SetIntensityRequest {
    pub intensity: i64,
}

/// Devices listing query
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DevicesQuery {
    /// Rescan instead of serving the cache
    #[serde(default)]
    pub refresh: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success(42);
        assert!(response.success);
        assert_eq!(response.data, Some(42));
        assert!(response.error.is_none());
    }

    #[test]
    fn test_api_response_error_skips_data() {
        let response: ApiResponse<()> = ApiResponse::error("Test error".to_string());
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "Test error"}));
    }

    #[test]
    fn test_start_request_optional_fields() {
        let request: StartShowRequest =
            serde_json::from_str(r#"{"device_ids": ["a", "b"]}"#).unwrap();
        assert!(request.mode.is_none());
        assert!(request.latency_ms.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_start_request_validation() {
        let empty = StartShowRequest {
            mode: Some("pulse".to_string()),
            device_ids: vec![],
            latency_ms: None,
            intensity: None,
        };
        assert!(empty.validate().is_err());

        let blank = StartShowRequest {
            device_ids: vec!["a".to_string(), "  ".to_string()],
            ..empty
        };
        assert!(blank.validate().is_err());
    }
}
