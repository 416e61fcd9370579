//! JSON success bodies.
//!
//! Browsers parse JSON numbers as IEEE doubles, so integers outside
//! ±(2^53 - 1) lose precision on the client. `SafeJson` rewrites such numbers
//! as decimal strings before the body is sent.

use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::{Number, Value};

use crate::error::ApiError;

/// Largest integer a double represents exactly.
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

#[allow(clippy::cast_precision_loss)]
const MAX_SAFE_FLOAT: f64 = MAX_SAFE_INTEGER as f64;

/// A JSON response whose unsafe integers are widened to strings.
#[derive(Debug, Clone)]
pub struct SafeJson<T>(pub T);

impl<T: Serialize> IntoResponse for SafeJson<T> {
    fn into_response(self) -> Response {
        match serde_json::to_value(&self.0) {
            Ok(value) => Json(widen_precision(value)).into_response(),
            Err(e) => ApiError::Internal(format!("response serialization failed: {e}"))
                .into_response(),
        }
    }
}

fn is_safe(n: &Number) -> bool {
    if let Some(i) = n.as_i64() {
        (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&i)
    } else if n.is_u64() {
        // as_i64 failed, so the value exceeds i64::MAX
        false
    } else {
        n.as_f64().map_or(true, |f| f.abs() <= MAX_SAFE_FLOAT)
    }
}

/// Replace every number beyond ±(2^53 - 1) with its decimal string, recursively.
#[must_use]
pub fn widen_precision(value: Value) -> Value {
    match value {
        Value::Number(n) if !is_safe(&n) => Value::String(n.to_string()),
        Value::Array(items) => Value::Array(items.into_iter().map(widen_precision).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, widen_precision(v)))
                .collect(),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn safe_numbers_are_untouched() {
        let value = json!({ "a": 1, "b": -MAX_SAFE_INTEGER, "c": 1.5, "d": MAX_SAFE_INTEGER });
        assert_eq!(widen_precision(value.clone()), value);
    }

    #[test]
    fn large_integers_become_strings() {
        let value = json!({
            "seq": 9_007_199_254_740_993_i64,
            "negative": -9_007_199_254_740_993_i64,
            "huge": u64::MAX,
        });
        assert_eq!(
            widen_precision(value),
            json!({
                "seq": "9007199254740993",
                "negative": "-9007199254740993",
                "huge": "18446744073709551615",
            })
        );
    }

    #[test]
    fn widening_is_recursive() {
        let value = json!({
            "tests": [{ "cr_seq": 9_007_199_254_740_992_i64, "name": "basic" }],
            "nested": { "deep": [[9_007_199_254_740_992_i64]] },
        });
        let widened = widen_precision(value);
        assert_eq!(widened["tests"][0]["cr_seq"], "9007199254740992");
        assert_eq!(widened["tests"][0]["name"], "basic");
        assert_eq!(widened["nested"]["deep"][0][0], "9007199254740992");
    }

    #[test]
    fn large_floats_become_strings() {
        let widened = widen_precision(json!({ "f": 1.0e20 }));
        assert!(widened["f"].is_string());
    }
}
