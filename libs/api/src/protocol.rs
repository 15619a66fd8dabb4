//! Data viewer wire protocol.
//!
//! Client → service messages carry a `msg_type` of `ready` or `request_rows`
//! plus an optional row window. Service → client messages are
//! `initial_data` / `receive_rows` (a windowed dataset) or `error`.
//! Every outbound message goes through [`clean`] before it reaches a channel.

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetWindow;
use crate::error::ProtocolError;

/// Start row used when a request omits `start_row`.
pub const DEFAULT_START_ROW: i64 = 0;

/// Page size used when a request omits `fetch_size`.
pub const DEFAULT_FETCH_SIZE: i64 = 100;

// ════════════════════════════════════════════════════════════════
//  Tags
// ════════════════════════════════════════════════════════════════

/// Message types a client may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundTag {
    /// Request for the first page.
    Ready,
    /// Request for a further page.
    RequestRows,
}

impl InboundTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundTag::Ready => "ready",
            InboundTag::RequestRows => "request_rows",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "ready" => Some(InboundTag::Ready),
            "request_rows" => Some(InboundTag::RequestRows),
            _ => None,
        }
    }

    /// Tag of the data message answering this request.
    pub fn response(&self) -> ResponseTag {
        match self {
            InboundTag::Ready => ResponseTag::InitialData,
            InboundTag::RequestRows => ResponseTag::ReceiveRows,
        }
    }
}

impl std::fmt::Display for InboundTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message types the service sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundTag {
    InitialData,
    ReceiveRows,
    Error,
}

impl OutboundTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboundTag::InitialData => "initial_data",
            OutboundTag::ReceiveRows => "receive_rows",
            OutboundTag::Error => "error",
        }
    }
}

impl std::fmt::Display for OutboundTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of outbound tags that carry a dataset window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseTag {
    InitialData,
    ReceiveRows,
}

impl From<ResponseTag> for OutboundTag {
    fn from(tag: ResponseTag) -> Self {
        match tag {
            ResponseTag::InitialData => OutboundTag::InitialData,
            ResponseTag::ReceiveRows => OutboundTag::ReceiveRows,
        }
    }
}

// ════════════════════════════════════════════════════════════════
//  Inbound
// ════════════════════════════════════════════════════════════════

/// Row window requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    pub start_row: i64,
    pub fetch_size: i64,
}

impl Default for RowWindow {
    fn default() -> Self {
        Self {
            start_row: DEFAULT_START_ROW,
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }
}

/// A decoded client request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundMessage {
    Ready(RowWindow),
    RequestRows(RowWindow),
}

impl InboundMessage {
    /// Decode a client message.
    ///
    /// The tag is checked before the window fields, so an unknown tag is
    /// reported as such even when the rest of the message is garbage.
    pub fn parse(value: &serde_json::Value) -> Result<Self, ProtocolError> {
        let obj = value
            .as_object()
            .ok_or_else(|| ProtocolError::Malformed(format!("expected a JSON object, got {value}")))?;

        let tag = match obj.get("msg_type") {
            Some(serde_json::Value::String(s)) => InboundTag::parse(s)
                .ok_or_else(|| ProtocolError::UnknownMessageType(s.clone()))?,
            Some(other) => return Err(ProtocolError::UnknownMessageType(other.to_string())),
            None => return Err(ProtocolError::UnknownMessageType("None".to_string())),
        };

        let window = RowWindow {
            start_row: int_field(obj, "start_row")?.unwrap_or(DEFAULT_START_ROW),
            fetch_size: int_field(obj, "fetch_size")?.unwrap_or(DEFAULT_FETCH_SIZE),
        };

        Ok(match tag {
            InboundTag::Ready => InboundMessage::Ready(window),
            InboundTag::RequestRows => InboundMessage::RequestRows(window),
        })
    }

    pub fn tag(&self) -> InboundTag {
        match self {
            InboundMessage::Ready(_) => InboundTag::Ready,
            InboundMessage::RequestRows(_) => InboundTag::RequestRows,
        }
    }

    pub fn window(&self) -> RowWindow {
        match self {
            InboundMessage::Ready(w) | InboundMessage::RequestRows(w) => *w,
        }
    }
}

fn int_field(
    obj: &serde_json::Map<String, serde_json::Value>,
    field: &'static str,
) -> Result<Option<i64>, ProtocolError> {
    match obj.get(field) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or_else(|| ProtocolError::InvalidField {
            field,
            detail: format!("expected an integer, got {v}"),
        }),
    }
}

// ════════════════════════════════════════════════════════════════
//  Outbound
// ════════════════════════════════════════════════════════════════

/// Windowed dataset plus the window that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataMessage<'a> {
    pub data: DatasetWindow<'a>,
    pub start_row: i64,
    pub fetch_size: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorMessage {
    pub error: String,
}

/// A message from the service to the viewer client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "msg_type", rename_all = "snake_case")]
pub enum OutboundMessage<'a> {
    InitialData(DataMessage<'a>),
    ReceiveRows(DataMessage<'a>),
    Error(ErrorMessage),
}

impl<'a> OutboundMessage<'a> {
    pub fn data(tag: ResponseTag, data: DatasetWindow<'a>, window: RowWindow) -> Self {
        let msg = DataMessage {
            data,
            start_row: window.start_row,
            fetch_size: window.fetch_size,
        };
        match tag {
            ResponseTag::InitialData => OutboundMessage::InitialData(msg),
            ResponseTag::ReceiveRows => OutboundMessage::ReceiveRows(msg),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        OutboundMessage::Error(ErrorMessage { error: text.into() })
    }

    pub fn tag(&self) -> OutboundTag {
        match self {
            OutboundMessage::InitialData(_) => OutboundTag::InitialData,
            OutboundMessage::ReceiveRows(_) => OutboundTag::ReceiveRows,
            OutboundMessage::Error(_) => OutboundTag::Error,
        }
    }
}

/// Convert a payload into a transmit-safe JSON value.
///
/// Cell values map themselves to JSON-safe forms on serialization
/// (non-finite floats → `null`, bytes → base64), so this is the single
/// point where that mapping is applied to a whole message.
pub fn clean<T: Serialize + ?Sized>(value: &T) -> Result<serde_json::Value, ProtocolError> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{DataColumn, Dataset};
    use crate::value::CellValue;
    use serde_json::json;

    #[test]
    fn ready_uses_defaults() {
        let msg = InboundMessage::parse(&json!({"msg_type": "ready"})).unwrap();
        assert_eq!(msg, InboundMessage::Ready(RowWindow { start_row: 0, fetch_size: 100 }));
        assert_eq!(msg.tag().response(), ResponseTag::InitialData);
    }

    #[test]
    fn request_rows_reads_window() {
        let msg = InboundMessage::parse(&json!({
            "msg_type": "request_rows", "start_row": 200, "fetch_size": null
        }))
        .unwrap();
        assert_eq!(msg.tag(), InboundTag::RequestRows);
        assert_eq!(msg.window(), RowWindow { start_row: 200, fetch_size: 100 });
        assert_eq!(msg.tag().response(), ResponseTag::ReceiveRows);
    }

    #[test]
    fn unknown_tag_is_named() {
        let err = InboundMessage::parse(&json!({"msg_type": "bogus", "start_row": "x"})).unwrap_err();
        assert!(matches!(&err, ProtocolError::UnknownMessageType(t) if t == "bogus"));
        assert_eq!(err.to_string(), "Unknown message type 'bogus'");

        let err = InboundMessage::parse(&json!({"start_row": 1})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown message type 'None'");

        let err = InboundMessage::parse(&json!({"msg_type": 7})).unwrap_err();
        assert_eq!(err.to_string(), "Unknown message type '7'");
    }

    #[test]
    fn non_integer_window_is_rejected() {
        let err = InboundMessage::parse(&json!({"msg_type": "ready", "fetch_size": 1.5})).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field: "fetch_size", .. }));

        let err = InboundMessage::parse(&json!(["ready"])).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn data_message_wire_shape() {
        let ds = Dataset::new(
            "d1",
            "Numbers",
            vec![DataColumn::new("x", "float", vec![CellValue::Float(f64::NAN), CellValue::Float(2.0)])],
            2,
        );
        let window = RowWindow { start_row: 0, fetch_size: 100 };
        let msg = OutboundMessage::data(
            ResponseTag::InitialData,
            ds.window(window.start_row, window.fetch_size).unwrap(),
            window,
        );
        assert_eq!(msg.tag(), OutboundTag::InitialData);
        assert_eq!(
            clean(&msg).unwrap(),
            json!({
                "msg_type": "initial_data",
                "data": {
                    "id": "d1",
                    "title": "Numbers",
                    "rowCount": 2,
                    "columns": [{"name": "x", "type": "float", "data": [null, 2.0]}],
                },
                "start_row": 0,
                "fetch_size": 100,
            })
        );
    }

    #[test]
    fn error_message_wire_shape() {
        let msg = OutboundMessage::error("Invalid start row: 5");
        assert_eq!(
            clean(&msg).unwrap(),
            json!({"msg_type": "error", "error": "Invalid start row: 5"})
        );
    }

    #[test]
    fn tags_round_trip_through_strings() {
        for tag in [InboundTag::Ready, InboundTag::RequestRows] {
            assert_eq!(InboundTag::parse(tag.as_str()), Some(tag));
        }
        assert_eq!(OutboundTag::from(ResponseTag::ReceiveRows).to_string(), "receive_rows");
    }
}
