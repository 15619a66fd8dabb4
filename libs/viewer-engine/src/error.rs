use viewer_api::{ChannelError, DatasetError, ProtocolError};

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("open channel: {0}")]
    Channel(#[from] ChannelError),
}

/// Why an inbound message produced no response.
///
/// Request problems (unknown tag, bad range) are not here: they are answered
/// with an `error` message and dispatch succeeds.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("data viewer dataset {0} not found")]
    UnknownDataset(String),

    #[error("data viewer channel {0} is not open")]
    ChannelUnavailable(String),

    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    #[error("send: {0}")]
    Send(#[from] ChannelError),
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parse json '{path}': {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("parse csv '{path}': {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("cannot tell format of '{0}', set `format` explicitly")]
    UnknownFormat(String),

    #[error("dataset '{path}': {source}")]
    Shape {
        path: String,
        #[source]
        source: DatasetError,
    },
}

/// Channel that failed to close during shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFailure {
    pub channel_id: String,
    pub error: ChannelError,
}

/// Outcome of [`crate::DataViewerService::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Channels closed cleanly.
    pub closed: usize,
    pub failures: Vec<CloseFailure>,
}
