//! Input parsing shared by the handlers.
//!
//! Each helper either yields a clean value or the `ApiError` the client sees.

use serde_json::Value;

use super::error::{ApiError, ApiResult};
use crate::db::DEFAULT_AUTHOR;

/// Parse a path identifier.
pub fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::BadId(raw.to_string()))
}

/// Trim `value` and require it to be non-empty.
pub fn required_text(field: &str, value: Option<&str>) -> ApiResult<String> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(ApiError::Validation(format!("{field} is required"))),
    }
}

/// Trimmed author, or the placeholder when blank.
pub fn author_or_default(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|author| !author.is_empty())
        .unwrap_or(DEFAULT_AUTHOR)
        .to_string()
}

/// Parse an optional parent reference.
///
/// Absent, `null` and blank strings mean "top-level comment". Numbers and
/// numeric strings are accepted when they hold a whole value (`5`, `5.0`,
/// `"5"`); anything else is `BadParentId`.
pub fn parse_parent_id(value: Option<&Value>) -> ApiResult<Option<i64>> {
    let id = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse()
                .ok()
                .or_else(|| s.parse().ok().and_then(whole_number))
        }
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().and_then(whole_number)),
        Some(_) => None,
    };
    id.map(Some).ok_or(ApiError::BadParentId)
}

/// `value` as an `i64` when it is finite, integral and in range.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn whole_number(value: f64) -> Option<i64> {
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.is_finite() && value.fract() == 0.0 && in_range).then_some(value as i64)
}
