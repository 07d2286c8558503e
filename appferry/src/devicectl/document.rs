//! The device tool's JSON output document.
//!
//! Decoding is two-stage: the whole file is parsed into a generic
//! [`serde_json::Value`], then records are pulled out of it one by one so a
//! single odd record cannot fail the whole response.
//!
//! ```text
//! {
//!   "error":  { "domain": ..., "code": ..., "userInfo": { ... } } | absent | null,
//!   "result": { "devices": [ ... ] } | { "apps": [ ... ] } | ...
//! }
//! ```

use std::error::Error;
use std::fmt;

use serde_json::Value;

use super::error::{BridgeError, BridgeResult};

const DESCRIPTION_KEY: &str = "NSLocalizedDescription";
const FAILURE_REASON_KEY: &str = "NSLocalizedFailureReason";
const UNDERLYING_KEY: &str = "NSUnderlyingError";

/// A structured error reported by the device tool.
///
/// Underlying errors form a chain reachable through [`Error::source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolError {
    pub domain: String,
    pub code: i64,
    pub description: Option<String>,
    pub failure_reason: Option<String>,
    pub underlying: Option<Box<ToolError>>,
}

impl ToolError {
    /// Decode an error object. `None` if `domain` or `code` is missing.
    pub fn from_value(value: &Value) -> Option<Self> {
        let domain = value.get("domain")?.as_str()?.to_string();
        let code = value.get("code")?.as_i64()?;
        let user_info = value.get("userInfo");
        let text = |key: &str| user_info.and_then(|info| info.get(key)).and_then(localized);
        let underlying = user_info
            .and_then(|info| info.get(UNDERLYING_KEY))
            .and_then(|u| u.get("error"))
            .and_then(Self::from_value)
            .map(Box::new);

        Some(Self {
            domain,
            code,
            description: text(DESCRIPTION_KEY),
            failure_reason: text(FAILURE_REASON_KEY),
            underlying,
        })
    }

    /// Iterate this error and every underlying error, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &ToolError> {
        std::iter::successors(Some(self), |e| e.underlying.as_deref())
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}", description)?,
            None => write!(f, "{} error {}", self.domain, self.code)?,
        }
        if let Some(reason) = &self.failure_reason {
            write!(f, " ({})", reason)?;
        }
        if self.description.is_some() {
            write!(f, " [{} {}]", self.domain, self.code)?;
        }
        Ok(())
    }
}

impl Error for ToolError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.underlying.as_deref().map(|e| e as &(dyn Error + 'static))
    }
}

/// Localized strings are wrapped as `{"string": "..."}`; accept bare strings too.
fn localized(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("string")?.as_str().map(str::to_string),
        _ => None,
    }
}

/// Parse a raw output file.
pub fn parse_document(bytes: &[u8]) -> BridgeResult<Value> {
    let document: Value = serde_json::from_slice(bytes)
        .map_err(|e| BridgeError::protocol(format!("invalid JSON: {}", e)))?;
    if !document.is_object() {
        return Err(BridgeError::protocol("top-level value is not an object"));
    }
    Ok(document)
}

/// Extract the embedded error, if any.
///
/// An absent or `null` error means success. An error object without a
/// usable `domain` and `code` is a protocol violation.
pub fn embedded_error(document: &Value) -> BridgeResult<Option<ToolError>> {
    match document.get("error") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => ToolError::from_value(value)
            .map(Some)
            .ok_or_else(|| BridgeError::protocol("error object lacks domain or code")),
    }
}

/// The `result.<key>` array.
pub fn result_array<'a>(document: &'a Value, key: &str) -> BridgeResult<&'a Vec<Value>> {
    document
        .get("result")
        .and_then(|r| r.get(key))
        .and_then(Value::as_array)
        .ok_or_else(|| BridgeError::protocol(format!("missing result.{} array", key)))
}
