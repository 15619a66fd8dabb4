/// Requested window start is outside `[0, rowCount)`.
///
/// The display text is what the client receives in the `error` message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Invalid start row: {start}")]
pub struct InvalidRange {
    pub start: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DatasetError {
    #[error("column '{column}' has {actual} values, expected {expected}")]
    RaggedColumns {
        column: String,
        expected: usize,
        actual: usize,
    },
}

/// Failure to interpret an inbound message or to encode an outbound one.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown message type '{0}'")]
    UnknownMessageType(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Invalid field '{field}': {detail}")]
    InvalidField { field: &'static str, detail: String },

    #[error("encode: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Failure reported by a Channel implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("channel '{0}' is closed")]
    Closed(String),

    #[error("channel '{0}' has no connected peer")]
    Detached(String),

    #[error("channel '{0}' outbound queue is full")]
    Full(String),

    #[error("transport: {0}")]
    Transport(String),
}
