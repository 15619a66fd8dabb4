use base64::Engine;
use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════
//  CellValue
// ════════════════════════════════════════════════════════════════

/// Opaque element of a column.
///
/// The viewer layer never interprets cells; it only windows and ships them.
/// Some variants cannot be represented in JSON as-is (non-finite floats,
/// raw bytes), so serialization goes through the JSON-safe mapping below.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    /// May be NaN or infinite; sent as `null` in that case.
    Float(f64),
    Text(String),
    /// Sent as a standard base64 string.
    Bytes(Vec<u8>),
    /// Nested structure (arrays, objects, out-of-range numbers).
    Json(serde_json::Value),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

impl From<serde_json::Value> for CellValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => CellValue::Null,
            serde_json::Value::Bool(b) => CellValue::Bool(b),
            serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => CellValue::Int(i),
                (None, Some(f)) if n.is_f64() => CellValue::Float(f),
                // u64 above i64::MAX: keep exact
                _ => CellValue::Json(serde_json::Value::Number(n)),
            },
            serde_json::Value::String(s) => CellValue::Text(s),
            other => CellValue::Json(other),
        }
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<f64> for CellValue {
    fn from(v: f64) -> Self {
        CellValue::Float(v)
    }
}

impl From<bool> for CellValue {
    fn from(v: bool) -> Self {
        CellValue::Bool(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl Serialize for CellValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_unit(),
            CellValue::Bool(b) => serializer.serialize_bool(*b),
            CellValue::Int(i) => serializer.serialize_i64(*i),
            CellValue::Float(f) if f.is_finite() => serializer.serialize_f64(*f),
            CellValue::Float(_) => serializer.serialize_unit(),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Bytes(bytes) => {
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                serializer.serialize_str(&encoded)
            }
            CellValue::Json(value) => value.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CellValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(CellValue::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn non_finite_floats_become_null() {
        let cells = vec![
            CellValue::Float(f64::NAN),
            CellValue::Float(f64::INFINITY),
            CellValue::Float(f64::NEG_INFINITY),
            CellValue::Float(1.5),
        ];
        let value = serde_json::to_value(&cells).unwrap();
        assert_eq!(value, json!([null, null, null, 1.5]));
    }

    #[test]
    fn bytes_are_base64() {
        let value = serde_json::to_value(CellValue::Bytes(b"hi!".to_vec())).unwrap();
        assert_eq!(value, json!("aGkh"));
    }

    #[test]
    fn deserialize_classifies_json() {
        let cells: Vec<CellValue> =
            serde_json::from_value(json!([null, true, 3, 2.5, "x", [1, 2], {"a": 1}])).unwrap();
        assert_eq!(
            cells,
            vec![
                CellValue::Null,
                CellValue::Bool(true),
                CellValue::Int(3),
                CellValue::Float(2.5),
                CellValue::Text("x".into()),
                CellValue::Json(json!([1, 2])),
                CellValue::Json(json!({"a": 1})),
            ]
        );
    }

    #[test]
    fn large_unsigned_stays_exact() {
        let cell: CellValue = serde_json::from_value(json!(u64::MAX)).unwrap();
        assert_eq!(serde_json::to_value(&cell).unwrap(), json!(u64::MAX));
    }
}
