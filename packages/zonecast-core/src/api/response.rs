//! Response shaping for the action API.
//!
//! Every answer to a GET is HTTP 200. Command-style answers use the status
//! envelope with an `error` flag; returnable actions answer with their raw
//! payload and the version/session headers.

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::protocol_constants::{HEADER_SESSION_ID, HEADER_UPDATE_ID};

/// Body of every command/status response.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StatusEnvelope {
    pub request_url: String,
    pub request_query: String,
    /// Resolved action name; empty when the route did not resolve.
    pub action: String,
    pub msg: String,
    pub error: bool,
}

impl StatusEnvelope {
    pub fn new(
        path: &str,
        query: Option<&str>,
        action: &str,
        msg: impl Into<String>,
        error: bool,
    ) -> Self {
        Self {
            request_url: path.to_string(),
            request_query: query.unwrap_or_default().to_string(),
            action: action.to_string(),
            msg: msg.into(),
            error,
        }
    }
}

impl IntoResponse for StatusEnvelope {
    fn into_response(self) -> Response {
        if self.error {
            log::debug!("[Server] {} -> {}", self.request_url, self.msg);
        }
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Builds a data response for a returnable action.
pub fn data_response(payload: Value, update_id: Option<u64>, session_id: Option<&str>) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(update_id) = update_id {
        headers.insert(HEADER_UPDATE_ID, HeaderValue::from(update_id));
    }
    if let Some(value) = session_id.and_then(|s| HeaderValue::from_str(s).ok()) {
        headers.insert(HEADER_SESSION_ID, value);
    }
    (StatusCode::OK, headers, Json(payload)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_uses_wire_keys() {
        let envelope = StatusEnvelope::new("/zonecast/controller/play", None, "PLAY", "ok", false);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "requestUrl": "/zonecast/controller/play",
                "requestQuery": "",
                "action": "PLAY",
                "msg": "ok",
                "error": false
            })
        );
    }

    #[test]
    fn data_response_carries_version_and_session() {
        let response = data_response(json!([]), Some(7), Some("abc"));
        let headers = response.headers();
        assert_eq!(headers.get("updateId").unwrap(), "7");
        assert_eq!(headers.get("sessionId").unwrap(), "abc");
    }

    #[test]
    fn unversioned_data_has_no_update_header() {
        let response = data_response(json!({}), None, None);
        assert!(response.headers().get(HEADER_UPDATE_ID).is_none());
    }

    #[test]
    fn unencodable_session_is_omitted() {
        let response = data_response(json!({}), Some(1), Some("bad\nid"));
        assert!(response.headers().get(HEADER_SESSION_ID).is_none());
        assert_eq!(response.headers().get(HEADER_UPDATE_ID).unwrap(), "1");
    }
}
