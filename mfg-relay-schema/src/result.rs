use serde::ser::{Serialize, SerializeStruct, Serializer};
use serde_json::Value;

/// Uniform outcome of a backend call.
///
/// Serializes to `{"success": true, "data": .., "status": ..}` or
/// `{"success": false, "error": .., "status": .., "data": ..}`.
/// A `status` of `0` means no HTTP response was received.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResult {
    Success {
        data: Value,
        status: u16,
    },
    Failure {
        error: String,
        status: u16,
        data: Option<Value>,
    },
}

impl ApiResult {
    pub fn success(data: Value, status: u16) -> Self {
        ApiResult::Success { data, status }
    }

    pub fn failure(error: impl Into<String>, status: u16, data: Option<Value>) -> Self {
        ApiResult::Failure {
            error: error.into(),
            status,
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ApiResult::Success { .. })
    }

    pub fn status(&self) -> u16 {
        match self {
            ApiResult::Success { status, .. } | ApiResult::Failure { status, .. } => *status,
        }
    }

    /// Payload of the response; `None` for failures without a body.
    pub fn data(&self) -> Option<&Value> {
        match self {
            ApiResult::Success { data, .. } => Some(data),
            ApiResult::Failure { data, .. } => data.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            ApiResult::Success { .. } => None,
            ApiResult::Failure { error, .. } => Some(error.as_str()),
        }
    }
}

impl Serialize for ApiResult {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ApiResult::Success { data, status } => {
                let mut state = serializer.serialize_struct("ApiResult", 3)?;
                state.serialize_field("success", &true)?;
                state.serialize_field("data", data)?;
                state.serialize_field("status", status)?;
                state.end()
            }
            ApiResult::Failure {
                error,
                status,
                data,
            } => {
                let mut state = serializer.serialize_struct("ApiResult", 4)?;
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
                state.serialize_field("status", status)?;
                state.serialize_field("data", data)?;
                state.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_serializes_with_flag_data_and_status() {
        let result = ApiResult::success(json!([{"id": 1}]), 200);
        assert_eq!(
            serde_json::to_value(&result).expect("serialize"),
            json!({"success": true, "data": [{"id": 1}], "status": 200})
        );
    }

    #[test]
    fn failure_serializes_null_data_when_absent() {
        let result = ApiResult::failure("Permission denied", 403, None);
        assert_eq!(
            serde_json::to_value(&result).expect("serialize"),
            json!({"success": false, "error": "Permission denied", "status": 403, "data": null})
        );
        assert_eq!(result.error(), Some("Permission denied"));
        assert!(!result.is_success());
    }
}
