//! Response envelope handling.
//!
//! The server answers some endpoints with `{"code": 0, "msg": "ok", "data":
//! {...}}` and others with the payload at the top level. Error bodies carry
//! their message under `error`, `msg` or `message`. Both shapes are
//! normalized here.

use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// Error body returned with a non-success status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// First non-empty message among `error`, `msg` and `message`.
    pub fn text(&self) -> Option<&str> {
        [&self.error, &self.msg, &self.message]
            .into_iter()
            .filter_map(|m| m.as_deref())
            .map(str::trim)
            .find(|m| !m.is_empty())
    }
}

/// Strips the `{code, data}` wrapper if present.
pub fn unwrap_data(value: serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(mut map) if map.contains_key("code") && map.contains_key("data") => {
            map.remove("data").unwrap_or(serde_json::Value::Null)
        }
        other => other,
    }
}

/// Decodes a success body into `T`, unwrapping the envelope first.
///
/// An empty body decodes as JSON `null`, which lets `Option`/defaulted
/// payloads accept bare `200 OK` answers.
pub fn decode_data<T: DeserializeOwned>(body: &[u8]) -> Result<T, serde_json::Error> {
    let value = decode_value(body)?;
    serde_json::from_value(value)
}

/// Decodes a success body into a raw JSON value with the envelope removed.
pub fn decode_value(body: &[u8]) -> Result<serde_json::Value, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(serde_json::Value::Null);
    }
    let value: serde_json::Value = serde_json::from_slice(body)?;
    Ok(unwrap_data(value))
}

/// Extracts a human-readable message from an error body.
///
/// Falls back to the raw text when the body is not JSON.
pub fn error_message(body: &[u8]) -> String {
    if let Ok(parsed) = serde_json::from_slice::<ApiErrorBody>(body)
        && let Some(text) = parsed.text()
    {
        return text.to_string();
    }
    String::from_utf8_lossy(body).trim().to_string()
}
