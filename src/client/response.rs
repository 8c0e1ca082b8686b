use crate::transport::InboundResponse;
use crate::utils::logging::{body_preview, with_pretty_json_debug};
use mfg_relay_schema::{ApiResult, describe_error};
use serde_json::Value;

/// Parses the body according to its declared content type.
///
/// Empty bodies become `null`; undeclared or unparsable JSON is kept as text.
pub(crate) fn parse_body(response: &InboundResponse) -> Value {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    if response.declares_json()
        && let Ok(value) = serde_json::from_slice::<Value>(&response.body)
    {
        return value;
    }
    Value::String(String::from_utf8_lossy(&response.body).into_owned())
}

pub(crate) fn normalize(response: &InboundResponse) -> ApiResult {
    let status = response.status.as_u16();
    let data = parse_body(response);

    if response.status.is_success() {
        return ApiResult::success(data, status);
    }

    let error = describe_error(&data, status);
    match &data {
        Value::String(raw) => tracing::debug!(
            status,
            body = %body_preview(raw),
            "[Relay] Backend unstructured error"
        ),
        structured => with_pretty_json_debug(structured, |pretty| {
            tracing::debug!(status, error = %error, body = %pretty, "[Relay] Backend structured error");
        }),
    }

    let data = (!data.is_null()).then_some(data);
    ApiResult::failure(error, status, data)
}
