// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Typed field values and classification of dynamic bus values.
//!
//! The bus delivers channel updates as dynamic JSON values. Only numeric
//! and textual values are persisted; everything else is dropped at
//! classification without logging.

use std::fmt;

/// A value that can be stored in an InfluxDB field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    Text(String),
}

impl Value {
    /// Format this value for InfluxDB Line Protocol.
    ///
    /// - Integer: suffixed with `i` (e.g., `42i`)
    /// - Float: written as-is (e.g., `3.14`)
    /// - Text: quoted with double quotes, inner quotes escaped (e.g., `"ok"`)
    pub fn to_line_protocol(&self) -> String {
        match self {
            Value::Integer(v) => format!("{}i", v),
            Value::Float(v) => format!("{}", v),
            Value::Text(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{}\"", escaped)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_line_protocol())
    }
}

/// A single named observation pending persistence.
///
/// Immutable once constructed. One instance per observed update per
/// interval; repeated updates to the same channel produce separate
/// instances.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    /// Channel address, used as the InfluxDB field key.
    pub field: String,
    /// The observed value.
    pub value: Value,
}

impl FieldValue {
    /// Create a new field value.
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

/// Classify a dynamic bus value into a typed field value.
///
/// JSON numbers become `Integer` when representable as `i64`, otherwise
/// `Float`. JSON strings become `Text`. Booleans, null, arrays and
/// objects are not persisted and yield `None`.
///
/// Pure; timestamp assignment happens at the queueing layer.
pub fn classify(field: &str, raw: &serde_json::Value) -> Option<FieldValue> {
    let value = match raw {
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Float(n.as_f64()?)
            }
        }
        serde_json::Value::String(s) => Value::Text(s.clone()),
        _ => return None,
    };
    Some(FieldValue::new(field, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_integer() {
        let fv = classify("ess0/ActivePower", &json!(3500)).expect("classify");
        assert_eq!(fv.field, "ess0/ActivePower");
        assert_eq!(fv.value, Value::Integer(3500));
    }

    #[test]
    fn test_classify_negative_integer() {
        let fv = classify("ess0/ReactivePower", &json!(-120)).expect("classify");
        assert_eq!(fv.value, Value::Integer(-120));
    }

    #[test]
    fn test_classify_float() {
        let fv = classify("meter0/Frequency", &json!(49.98)).expect("classify");
        match fv.value {
            Value::Float(v) => assert!((v - 49.98).abs() < f64::EPSILON),
            other => panic!("expected Float, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_text() {
        let fv = classify("system0/State", &json!("RUNNING")).expect("classify");
        assert_eq!(fv.value, Value::Text("RUNNING".to_string()));
    }

    #[test]
    fn test_classify_rejects_unsupported_types() {
        assert!(classify("c", &json!(true)).is_none());
        assert!(classify("c", &json!(null)).is_none());
        assert!(classify("c", &json!([1, 2, 3])).is_none());
        assert!(classify("c", &json!({"nested": 1})).is_none());
    }

    #[test]
    fn test_value_integer_line_protocol() {
        assert_eq!(Value::Integer(42).to_line_protocol(), "42i");
        assert_eq!(Value::Integer(-7).to_line_protocol(), "-7i");
    }

    #[test]
    fn test_value_float_line_protocol() {
        assert_eq!(Value::Float(21.5).to_line_protocol(), "21.5");
    }

    #[test]
    fn test_value_text_line_protocol_escapes_quotes() {
        let v = Value::Text("say \"hi\"".to_string());
        assert_eq!(v.to_line_protocol(), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_value_text_line_protocol_escapes_backslash() {
        let v = Value::Text("a\\b".to_string());
        assert_eq!(v.to_line_protocol(), "\"a\\\\b\"");
    }
}
