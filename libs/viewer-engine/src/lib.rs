pub mod error;
pub mod loader;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use viewer_api::{
    clean, Channel, ChannelFactory, Dataset, InboundMessage, MessageHandler, OutboundMessage,
    ResponseTag, RowWindow,
};

pub use error::{CloseFailure, DispatchError, LoadError, RegisterError, ShutdownReport};
pub use loader::{load_dataset, DatasetSource, SourceFormat};
pub use memory::{MemoryChannel, MemoryChannelFactory};

/// Channel namespace used when none is configured.
pub const DEFAULT_TARGET_NAME: &str = "positron.dataViewer";

// ═══════════════════════════════════════════════════════════════
//  Registry
// ═══════════════════════════════════════════════════════════════

/// A registered dataset and the channel serving it.
#[derive(Clone)]
struct Entry {
    dataset: Arc<Dataset>,
    channel: Arc<dyn Channel>,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, Entry>,
}

/// Listing entry for a registered dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetSummary {
    pub id: String,
    pub title: String,
    pub row_count: usize,
}

// ═══════════════════════════════════════════════════════════════
//  DataViewerService
// ═══════════════════════════════════════════════════════════════

/// Owns the registered datasets and the channel serving each of them,
/// and answers viewer requests arriving on those channels.
///
/// Dataset id and channel id are the same string. Entries live until
/// [`shutdown`](Self::shutdown); there is no per-dataset removal.
pub struct DataViewerService {
    target_name: String,
    factory: Arc<dyn ChannelFactory>,
    registry: RwLock<Registry>,
}

impl DataViewerService {
    pub fn new(target_name: impl Into<String>, factory: Arc<dyn ChannelFactory>) -> Arc<Self> {
        Arc::new(Self {
            target_name: target_name.into(),
            factory,
            registry: RwLock::new(Registry::default()),
        })
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Cache `dataset` and open a channel for it. Returns the dataset id.
    ///
    /// An empty id is replaced by a fresh UUID. Registering an id again
    /// replaces the dataset and its channel; the old channel is closed.
    pub fn register_dataset(self: &Arc<Self>, mut dataset: Dataset) -> Result<String, RegisterError> {
        if dataset.id.is_empty() {
            dataset.id = uuid::Uuid::new_v4().to_string();
        }
        let id = dataset.id.clone();

        let open = serde_json::json!({ "title": dataset.title });
        let (title, rows, columns) = (dataset.title.clone(), dataset.row_count, dataset.columns.len());

        let replaced = {
            // Held across `create`: a viewer reaching the new channel blocks
            // in dispatch until the entry is in place.
            let mut reg = self.registry.write();
            let channel = self
                .factory
                .create(&self.target_name, &id, open, self.handler())?;
            reg.entries.insert(
                id.clone(),
                Entry {
                    dataset: Arc::new(dataset),
                    channel,
                },
            )
        };

        tracing::info!(dataset = %id, title = %title, rows, columns, "registered dataset");

        if let Some(old) = replaced {
            if let Err(e) = old.channel.close() {
                tracing::warn!(dataset = %id, error = %e, "failed to close replaced channel");
            }
        }

        Ok(id)
    }

    pub fn has_dataset(&self, id: &str) -> bool {
        self.registry.read().entries.contains_key(id)
    }

    pub fn datasets(&self) -> Vec<DatasetSummary> {
        let reg = self.registry.read();
        let mut out: Vec<DatasetSummary> = reg
            .entries
            .values()
            .map(|Entry { dataset: ds, .. }| DatasetSummary {
                id: ds.id.clone(),
                title: ds.title.clone(),
                row_count: ds.row_count,
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    /// Inbound handler installed on every channel. Holds the service weakly
    /// so channels do not keep it alive.
    fn handler(self: &Arc<Self>) -> MessageHandler {
        let service = Arc::downgrade(self);
        Arc::new(move |channel_id: &str, msg: serde_json::Value| {
            match service.upgrade() {
                Some(service) => {
                    let _ = service.dispatch(channel_id, msg);
                }
                None => {
                    tracing::debug!(channel = %channel_id, "service gone, dropping message");
                }
            }
        })
    }

    /// Answer one inbound message received on `channel_id`.
    ///
    /// A missing dataset or a closed channel is logged and the message
    /// dropped (no reply). Unknown tags and bad windows are answered with an
    /// `error` message.
    pub fn dispatch(&self, channel_id: &str, msg: serde_json::Value) -> Result<(), DispatchError> {
        let entry = self.registry.read().entries.get(channel_id).cloned();
        let Some(Entry { dataset, channel }) = entry else {
            tracing::warn!(dataset = %channel_id, "data viewer dataset not found");
            return Err(DispatchError::UnknownDataset(channel_id.to_string()));
        };
        if !channel.is_open() {
            tracing::warn!(channel = %channel_id, "cannot send message, data viewer channel is not open");
            return Err(DispatchError::ChannelUnavailable(channel_id.to_string()));
        }

        let result = match InboundMessage::parse(&msg) {
            Ok(request) => {
                tracing::debug!(
                    dataset = %channel_id,
                    msg_type = %request.tag(),
                    start_row = request.window().start_row,
                    fetch_size = request.window().fetch_size,
                    "data viewer request"
                );
                self.send_data(request.window(), request.tag().response(), &dataset, channel.as_ref())
            }
            Err(e) => {
                tracing::debug!(dataset = %channel_id, error = %e, "rejected data viewer request");
                self.send_message(&OutboundMessage::error(e.to_string()), channel.as_ref())
            }
        };

        if let Err(e) = &result {
            tracing::warn!(dataset = %channel_id, error = %e, "failed to answer data viewer request");
        }
        result
    }

    /// Slice `dataset` to `window` and send it tagged `tag`.
    ///
    /// The payload keeps the dataset's id, title and total row count. A
    /// window outside the dataset is answered with an `error` message.
    pub fn send_data(
        &self,
        window: RowWindow,
        tag: ResponseTag,
        dataset: &Dataset,
        channel: &dyn Channel,
    ) -> Result<(), DispatchError> {
        let msg = match dataset.window(window.start_row, window.fetch_size) {
            Ok(data) => OutboundMessage::data(tag, data, window),
            Err(e) => {
                tracing::debug!(dataset = %dataset.id, start_row = e.start, "row window out of range");
                OutboundMessage::error(e.to_string())
            }
        };
        self.send_message(&msg, channel)
    }

    fn send_message(&self, msg: &OutboundMessage<'_>, channel: &dyn Channel) -> Result<(), DispatchError> {
        let payload = clean(msg)?;
        channel.send(payload)?;
        Ok(())
    }

    /// Close every channel and forget every dataset.
    ///
    /// Close failures are collected, never propagated; the registry is
    /// empty afterwards no matter what. Calling it again is a no-op.
    pub fn shutdown(&self) -> ShutdownReport {
        let channels: Vec<(String, Arc<dyn Channel>)> = {
            let mut reg = self.registry.write();
            reg.entries
                .drain()
                .map(|(id, entry)| (id, entry.channel))
                .collect()
        };

        let mut report = ShutdownReport::default();
        for (channel_id, channel) in channels {
            match channel.close() {
                Ok(()) => report.closed += 1,
                Err(error) => {
                    tracing::warn!(channel = %channel_id, error = %error, "failed to close channel");
                    report.failures.push(CloseFailure { channel_id, error });
                }
            }
        }

        tracing::info!(
            closed = report.closed,
            failed = report.failures.len(),
            "data viewer service shut down"
        );
        report
    }
}
