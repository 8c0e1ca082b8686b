use serde::Serialize;

/// Number of characters of a raw backend body kept in log lines.
pub const UPSTREAM_BODY_PREVIEW_CHARS: usize = 300;

pub(crate) fn with_pretty_json_debug<T, F>(value: &T, log_action: F)
where
    T: Serialize,
    F: FnOnce(&str),
{
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }

    let pretty_json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|error| format!("<pretty serialize failed: {error}>"));
    log_action(body_preview(&pretty_json).as_str());
}

pub(crate) fn body_preview(raw: &str) -> String {
    format!("{:.len$}", raw, len = UPSTREAM_BODY_PREVIEW_CHARS)
}
