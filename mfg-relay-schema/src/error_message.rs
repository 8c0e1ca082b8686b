use serde_json::{Map, Value};

const PRIORITY_FIELDS: [&str; 3] = ["message", "detail", "error"];
const NON_FIELD_ERRORS: &str = "non_field_errors";

/// Builds a human-readable message for a failed backend response.
///
/// Lookup order: `message`, `detail`, `error`, a raw string body, then the
/// flattened per-field validation errors of an object body.
pub fn describe_error(body: &Value, status: u16) -> String {
    if let Value::Object(map) = body {
        for field in PRIORITY_FIELDS {
            if let Some(text) = map.get(field).and_then(scalar_text) {
                return text;
            }
        }
    }

    match body {
        Value::String(raw) if !raw.trim().is_empty() => raw.clone(),
        Value::Object(map) => {
            let flattened = flatten_field_errors(map);
            if flattened.is_empty() {
                fallback_message(status)
            } else {
                flattened
            }
        }
        _ => fallback_message(status),
    }
}

pub fn fallback_message(status: u16) -> String {
    format!("Request failed with status {status}")
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Null | Value::String(_) => None,
        Value::Array(items) => {
            let joined = messages(items.iter()).join(", ");
            (!joined.is_empty()).then_some(joined)
        }
        other => Some(other.to_string()),
    }
}

/// `{"code": ["blank"], "items": [{"qty": ["too small"]}]}`
/// becomes `code: blank; items.qty: too small`.
fn flatten_field_errors(map: &Map<String, Value>) -> String {
    let mut parts = Vec::new();

    for (field, value) in map {
        match value {
            Value::Array(items) if items.iter().any(Value::is_object) => {
                for nested in items.iter().filter_map(Value::as_object) {
                    push_nested(&mut parts, field, nested);
                }
                let plain = messages(items.iter().filter(|item| !item.is_object()));
                push_part(&mut parts, field, &plain);
            }
            Value::Object(nested) => push_nested(&mut parts, field, nested),
            Value::Array(items) => push_part(&mut parts, field, &messages(items.iter())),
            other => push_part(&mut parts, field, &messages(std::iter::once(other))),
        }
    }

    parts.join("; ")
}

fn push_nested(parts: &mut Vec<String>, field: &str, nested: &Map<String, Value>) {
    for (sub_field, sub_value) in nested {
        let msgs = match sub_value {
            Value::Array(items) => messages(items.iter()),
            other => messages(std::iter::once(other)),
        };
        push_part(parts, &format!("{field}.{sub_field}"), &msgs);
    }
}

fn push_part(parts: &mut Vec<String>, field: &str, msgs: &[String]) {
    if msgs.is_empty() {
        return;
    }
    if field == NON_FIELD_ERRORS {
        parts.push(msgs.join(", "));
    } else {
        parts.push(format!("{field}: {}", msgs.join(", ")));
    }
}

fn messages<'a>(values: impl Iterator<Item = &'a Value>) -> Vec<String> {
    values
        .filter_map(|value| match value {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_field_wins_over_detail() {
        let body = json!({"detail": "Not found.", "message": "Batch is locked"});
        assert_eq!(describe_error(&body, 409), "Batch is locked");
    }

    #[test]
    fn detail_used_for_drf_style_errors() {
        let body = json!({"detail": "You do not have permission to perform this action."});
        assert_eq!(
            describe_error(&body, 403),
            "You do not have permission to perform this action."
        );
    }

    #[test]
    fn raw_text_body_is_returned_verbatim() {
        let body = Value::String("Bad Gateway".to_string());
        assert_eq!(describe_error(&body, 502), "Bad Gateway");
    }

    #[test]
    fn single_field_validation_error() {
        let body = json!({"code": ["This field may not be blank."]});
        assert_eq!(
            describe_error(&body, 400),
            "code: This field may not be blank."
        );
    }

    #[test]
    fn nested_validation_errors_are_prefixed_with_parent_field() {
        let body = json!({
            "items": [
                {"quantity": ["Ensure this value is greater than 0."]},
                {}
            ],
            "supplier": ["This field is required."]
        });
        assert_eq!(
            describe_error(&body, 400),
            "items.quantity: Ensure this value is greater than 0.; supplier: This field is required."
        );
    }

    #[test]
    fn non_field_errors_have_no_prefix() {
        let body = json!({"non_field_errors": ["Batch already packed.", "Order closed."]});
        assert_eq!(
            describe_error(&body, 400),
            "Batch already packed., Order closed."
        );
    }

    #[test]
    fn empty_body_falls_back_to_status() {
        assert_eq!(describe_error(&Value::Null, 500), "Request failed with status 500");
        assert_eq!(describe_error(&json!({}), 418), "Request failed with status 418");
    }
}
