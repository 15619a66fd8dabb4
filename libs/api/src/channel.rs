use std::sync::Arc;

use crate::error::ChannelError;

/// Callback invoked for every inbound message: `(channel_id, payload)`.
pub type MessageHandler = Arc<dyn Fn(&str, serde_json::Value) + Send + Sync>;

/// Full-duplex named message pipe between the service and one viewer.
///
/// Implementations decide how messages travel (WebSocket, in-memory, ...).
/// The service relies only on these operations.
pub trait Channel: Send + Sync {
    /// Channel identity (the dataset id it serves).
    fn id(&self) -> &str;

    /// Install the inbound handler, replacing any previous one.
    fn on_message(&self, handler: MessageHandler);

    /// Send an already cleaned message to the peer.
    fn send(&self, msg: serde_json::Value) -> Result<(), ChannelError>;

    /// Close the channel. Further sends fail.
    fn close(&self) -> Result<(), ChannelError>;

    /// `false` once the channel has been closed.
    fn is_open(&self) -> bool;
}

/// Opens channels in a target namespace.
pub trait ChannelFactory: Send + Sync {
    /// Open a channel `channel_id` under `target_name`, handing `open` to the
    /// peer as open metadata.
    ///
    /// `handler` must be installed before the channel is reachable by a peer,
    /// so no inbound message can arrive without one.
    fn create(
        &self,
        target_name: &str,
        channel_id: &str,
        open: serde_json::Value,
        handler: MessageHandler,
    ) -> Result<Arc<dyn Channel>, ChannelError>;
}
