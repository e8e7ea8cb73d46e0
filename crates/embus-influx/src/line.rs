// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! InfluxDB v1 Line Protocol point construction.
//!
//! Line Protocol format:
//! ```text
//! measurement,tag1=val1,tag2=val2 field1=val1,field2=val2 timestamp
//! ```
//!
//! Timestamps are milliseconds since the Unix epoch; the HTTP client
//! pairs them with `precision=ms` on the write request.

use crate::value::Value;

/// A single batched data point.
///
/// Fields are kept as an ordered list, not a map: repeated field keys are
/// retained in insertion order and all of them are rendered onto the
/// line. InfluxDB applies its own last-write-wins rule per field key
/// server-side.
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    /// Measurement name.
    pub measurement: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Tag key-value pairs (indexed, for filtering).
    pub tags: Vec<(String, String)>,
    /// Field key-value pairs (actual data).
    pub fields: Vec<(String, Value)>,
}

impl DataPoint {
    /// Create an empty point for a measurement at a timestamp.
    pub fn new(measurement: impl Into<String>, timestamp_ms: u64) -> Self {
        Self {
            measurement: measurement.into(),
            timestamp_ms,
            tags: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Append a tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    /// Append a field.
    pub fn field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.fields.push((key.into(), value));
        self
    }

    /// Render this point as one Line Protocol line.
    ///
    /// Tags are sorted by key for canonical form; fields keep insertion
    /// order.
    ///
    /// # Panics
    /// Panics if `fields` is empty (InfluxDB requires at least one field).
    pub fn to_line_protocol(&self) -> String {
        assert!(
            !self.fields.is_empty(),
            "InfluxDB requires at least one field"
        );

        let mut line = escape_measurement(&self.measurement);

        let mut sorted_tags: Vec<_> = self.tags.iter().collect();
        sorted_tags.sort_by(|(a, _), (b, _)| a.cmp(b));
        for (key, value) in &sorted_tags {
            line.push(',');
            line.push_str(&escape_tag_part(key));
            line.push('=');
            line.push_str(&escape_tag_part(value));
        }

        line.push(' ');

        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_field_key(key));
            line.push('=');
            line.push_str(&value.to_line_protocol());
        }

        line.push(' ');
        line.push_str(&self.timestamp_ms.to_string());

        line
    }
}

/// Render a batch of points, one line per point, newline separated.
pub fn render_batch(points: &[DataPoint]) -> String {
    points
        .iter()
        .map(DataPoint::to_line_protocol)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Escape measurement name per Line Protocol spec.
/// Spaces and commas must be escaped with backslash.
fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

/// Escape a tag key or tag value per Line Protocol spec.
/// Commas, equals signs, and spaces must be escaped.
fn escape_tag_part(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

/// Escape field key per Line Protocol spec.
/// Commas, equals signs, and spaces must be escaped.
fn escape_field_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_point() {
        let point = DataPoint::new("data", 1_000).field("power", Value::Float(23.5));
        assert_eq!(point.to_line_protocol(), "data power=23.5 1000");
    }

    #[test]
    fn test_point_with_tags_sorted() {
        let point = DataPoint::new("data", 1_000)
            .tag("site", "north")
            .tag("fleet", "42")
            .field("power", Value::Integer(3500));
        // Tags are sorted alphabetically by key
        assert_eq!(
            point.to_line_protocol(),
            "data,fleet=42,site=north power=3500i 1000"
        );
    }

    #[test]
    fn test_point_multiple_fields_keep_insertion_order() {
        let point = DataPoint::new("data", 2_000)
            .field("temp", Value::Float(22.1))
            .field("state", Value::Text("ok".to_string()))
            .field("soc", Value::Integer(65));
        assert_eq!(
            point.to_line_protocol(),
            "data temp=22.1,state=\"ok\",soc=65i 2000"
        );
    }

    #[test]
    fn test_point_repeated_field_key_renders_both() {
        // Repeated keys within one window are all sent; the server applies
        // last-write-wins per field key.
        let point = DataPoint::new("data", 0)
            .field("power", Value::Integer(42))
            .field("power", Value::Integer(43));
        assert_eq!(point.to_line_protocol(), "data power=42i,power=43i 0");
    }

    #[test]
    fn test_point_escapes_special_chars() {
        let point = DataPoint::new("my measurement", 3_000)
            .tag("tag key", "tag,value")
            .field("field=key", Value::Text("hello \"world\"".to_string()));
        assert_eq!(
            point.to_line_protocol(),
            "my\\ measurement,tag\\ key=tag\\,value field\\=key=\"hello \\\"world\\\"\" 3000"
        );
    }

    #[test]
    fn test_render_batch_joins_lines() {
        let points = vec![
            DataPoint::new("data", 0).field("a", Value::Integer(1)),
            DataPoint::new("data", 10_000).field("b", Value::Integer(2)),
        ];
        assert_eq!(render_batch(&points), "data a=1i 0\ndata b=2i 10000");
    }

    #[test]
    fn test_render_batch_empty() {
        assert_eq!(render_batch(&[]), "");
    }
}
