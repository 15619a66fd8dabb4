use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::mpsc;

use viewer_api::{Channel, ChannelError, ChannelFactory, MessageHandler};

/// Frame queued for a connection's writer.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Outbound {
    Text(String),
    Close,
}

struct Peer {
    conn: u64,
    tx: mpsc::Sender<Outbound>,
}

// ═══════════════════════════════════════════════════════════════
//  WsChannel
// ═══════════════════════════════════════════════════════════════

/// Channel for one dataset, backed by at most one WebSocket connection.
///
/// The channel exists from registration on; a viewer attaches by
/// connecting to `/ws/{id}`. A newer connection replaces the older one.
pub struct WsChannel {
    id: String,
    target_name: String,
    open: serde_json::Value,
    handler: Mutex<Option<MessageHandler>>,
    peer: Mutex<Option<Peer>>,
    closed: AtomicBool,
    next_conn: AtomicU64,
}

impl WsChannel {
    fn new(target_name: &str, id: &str, open: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            target_name: target_name.to_string(),
            open,
            handler: Mutex::new(None),
            peer: Mutex::new(None),
            closed: AtomicBool::new(false),
            next_conn: AtomicU64::new(1),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn is_attached(&self) -> bool {
        self.peer.lock().is_some()
    }

    /// First frame a connecting viewer receives.
    fn open_frame(&self) -> serde_json::Value {
        serde_json::json!({
            "msg_type": "comm_open",
            "target_name": self.target_name,
            "comm_id": self.id,
            "data": self.open,
        })
    }

    /// Attach a new connection. Returns its id and the writer queue, already
    /// holding the open frame. The previous connection's queue is dropped,
    /// which ends its writer.
    pub(crate) fn attach(&self, buffer: usize) -> Option<(u64, mpsc::Receiver<Outbound>)> {
        if self.is_closed() {
            return None;
        }
        let (tx, rx) = mpsc::channel(buffer.max(1));
        // Fresh queue with capacity >= 1: cannot fail.
        let _ = tx.try_send(Outbound::Text(self.open_frame().to_string()));

        let conn = self.next_conn.fetch_add(1, Ordering::Relaxed);
        let previous = self.peer.lock().replace(Peer { conn, tx });
        if previous.is_some() {
            tracing::info!(channel = %self.id, "viewer connection replaced");
        }
        Some((conn, rx))
    }

    /// Detach `conn` if it is still the current connection.
    pub(crate) fn detach(&self, conn: u64) {
        let mut peer = self.peer.lock();
        if peer.as_ref().is_some_and(|p| p.conn == conn) {
            *peer = None;
        }
    }

    /// Hand an inbound message to the installed handler.
    pub(crate) fn deliver(&self, msg: serde_json::Value) {
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => handler(&self.id, msg),
            None => tracing::debug!(channel = %self.id, "no handler, dropping inbound message"),
        }
    }
}

impl Channel for WsChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn on_message(&self, handler: MessageHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn send(&self, msg: serde_json::Value) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed(self.id.clone()));
        }
        let peer = self.peer.lock();
        let Some(peer) = peer.as_ref() else {
            return Err(ChannelError::Detached(self.id.clone()));
        };
        match peer.tx.try_send(Outbound::Text(msg.to_string())) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => Err(ChannelError::Full(self.id.clone())),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ChannelError::Detached(self.id.clone())),
        }
    }

    fn close(&self) -> Result<(), ChannelError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ChannelError::Closed(self.id.clone()));
        }
        self.handler.lock().take();
        if let Some(peer) = self.peer.lock().take() {
            if peer.tx.try_send(Outbound::Close).is_err() {
                // Writer gone or backed up; dropping the sender still ends it.
                tracing::debug!(channel = %self.id, "close frame not queued");
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

// ═══════════════════════════════════════════════════════════════
//  WsChannelHub
// ═══════════════════════════════════════════════════════════════

/// ChannelFactory for the WebSocket transport: keeps the open channel of
/// every dataset id so connections can find it.
pub struct WsChannelHub {
    channels: Mutex<HashMap<String, Arc<WsChannel>>>,
    buffer: usize,
}

impl WsChannelHub {
    /// `buffer` bounds each connection's outbound queue.
    pub fn new(buffer: usize) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            buffer,
        }
    }

    pub fn buffer(&self) -> usize {
        self.buffer
    }

    /// Open channel for `id`. Closed channels are forgotten on lookup.
    pub fn get(&self, id: &str) -> Option<Arc<WsChannel>> {
        let mut channels = self.channels.lock();
        match channels.get(id) {
            Some(ch) if ch.is_closed() => {
                channels.remove(id);
                None
            }
            Some(ch) => Some(ch.clone()),
            None => None,
        }
    }
}

impl ChannelFactory for WsChannelHub {
    fn create(
        &self,
        target_name: &str,
        channel_id: &str,
        open: serde_json::Value,
        handler: MessageHandler,
    ) -> Result<Arc<dyn Channel>, ChannelError> {
        let channel = Arc::new(WsChannel::new(target_name, channel_id, open));
        channel.on_message(handler);
        self.channels
            .lock()
            .insert(channel_id.to_string(), channel.clone());
        tracing::debug!(target = %target_name, channel = %channel_id, "opened ws channel");
        Ok(channel)
    }
}
