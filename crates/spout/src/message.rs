//! Message payloads and protocol-level trace handling.

use serde_json::Value;

/// Reserved key marking a protocol control message injected by the cloud.
const TRACE_KEY: &str = "__trace";

/// A message delivered to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum SpoutMessage {
    /// Decoded JSON payload (parsing enabled).
    Json(Value),
    /// Raw line (parsing disabled).
    Raw(String),
}

impl SpoutMessage {
    /// Borrow the decoded payload, if this is a JSON message.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    /// Consume into the decoded payload, if this is a JSON message.
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }
}

/// Whether a decoded object is a protocol trace rather than user data.
///
/// The cloud injects keep-alives and drop notices into the stream under the
/// `__trace` key; none of them are ever forwarded to the consumer.
pub(crate) fn is_trace(value: &Value) -> bool {
    value.get(TRACE_KEY).is_some()
}

/// Extract the server-side drop count from a trace message.
///
/// Returns `Some(n)` for `{"__trace": "dropped", "n": N}` where `N` is a
/// number or a numeric string. A `dropped` trace with a missing or
/// unusable count still represents at least one lost message and yields
/// `Some(1)`. Any other trace (keep-alives) or user data yields `None`.
pub(crate) fn trace_dropped(value: &Value) -> Option<u64> {
    if value.get(TRACE_KEY)?.as_str()? != "dropped" {
        return None;
    }
    let n = match value.get("n") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    };
    Some(n.unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dropped_trace_numeric() {
        let value = json!({"__trace": "dropped", "n": 5});
        assert!(is_trace(&value));
        assert_eq!(trace_dropped(&value), Some(5));
    }

    #[test]
    fn test_dropped_trace_string_count() {
        let value = json!({"__trace": "dropped", "n": "12"});
        assert_eq!(trace_dropped(&value), Some(12));
    }

    #[test]
    fn test_keep_alive_trace_is_not_a_drop() {
        let value = json!({"__trace": "keepalive"});
        assert!(is_trace(&value));
        assert_eq!(trace_dropped(&value), None);
    }

    #[test]
    fn test_user_data_is_not_a_trace() {
        let value = json!({"event": {"FILE_PATH": "c:\\x.exe"}, "n": 3});
        assert!(!is_trace(&value));
        assert_eq!(trace_dropped(&value), None);
    }

    #[test]
    fn test_dropped_trace_without_count_is_one_drop() {
        let value = json!({"__trace": "dropped"});
        assert_eq!(trace_dropped(&value), Some(1));
    }

    #[test]
    fn test_dropped_trace_with_unusable_count_is_one_drop() {
        let value = json!({"__trace": "dropped", "n": [3]});
        assert_eq!(trace_dropped(&value), Some(1));
        let value = json!({"__trace": "dropped", "n": "many"});
        assert_eq!(trace_dropped(&value), Some(1));
    }

    #[test]
    fn test_message_accessors() {
        let msg = SpoutMessage::Json(json!({"a": 1}));
        assert!(msg.as_json().is_some());
        let raw = SpoutMessage::Raw("not json".to_owned());
        assert!(raw.into_json().is_none());
    }
}
