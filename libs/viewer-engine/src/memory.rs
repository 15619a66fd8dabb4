use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use viewer_api::{Channel, ChannelError, ChannelFactory, MessageHandler};

// ═══════════════════════════════════════════════════════════════
//  MemoryChannel
// ═══════════════════════════════════════════════════════════════

/// In-process channel: outbound messages are recorded, inbound messages
/// are injected with [`deliver`](Self::deliver). For embedding the service
/// in a host that pumps messages itself, and for tests.
pub struct MemoryChannel {
    id: String,
    target_name: String,
    open: serde_json::Value,
    handler: Mutex<Option<MessageHandler>>,
    sent: Mutex<Vec<serde_json::Value>>,
    closed: AtomicBool,
    fail_close: AtomicBool,
    fail_send: AtomicBool,
}

impl MemoryChannel {
    pub fn new(target_name: &str, id: &str, open: serde_json::Value) -> Self {
        Self {
            id: id.to_string(),
            target_name: target_name.to_string(),
            open,
            handler: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
        }
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Metadata passed when the channel was opened.
    pub fn open_payload(&self) -> &serde_json::Value {
        &self.open
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    /// Hand an inbound message to the installed handler.
    /// Returns `false` if no handler is installed or the channel is closed.
    pub fn deliver(&self, msg: serde_json::Value) -> bool {
        if self.is_closed() {
            return false;
        }
        // Handler runs without the lock held: it may send on this channel.
        let handler = self.handler.lock().clone();
        match handler {
            Some(handler) => {
                handler(&self.id, msg);
                true
            }
            None => false,
        }
    }

    /// Messages sent so far.
    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.sent.lock().clone()
    }

    /// Drain the recorded messages.
    pub fn take_sent(&self) -> Vec<serde_json::Value> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Make `close` fail with a transport error.
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::Release);
    }

    /// Make `send` fail with a transport error.
    pub fn fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::Release);
    }
}

impl Channel for MemoryChannel {
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
        if self.fail_send.load(Ordering::Acquire) {
            return Err(ChannelError::Transport(format!("send on '{}' refused", self.id)));
        }
        self.sent.lock().push(msg);
        Ok(())
    }

    fn close(&self) -> Result<(), ChannelError> {
        if self.fail_close.load(Ordering::Acquire) {
            return Err(ChannelError::Transport(format!("close of '{}' refused", self.id)));
        }
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(ChannelError::Closed(self.id.clone()));
        }
        self.handler.lock().take();
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.is_closed()
    }
}

// ═══════════════════════════════════════════════════════════════
//  MemoryChannelFactory
// ═══════════════════════════════════════════════════════════════

/// Opens [`MemoryChannel`]s and keeps the latest one per id.
#[derive(Default)]
pub struct MemoryChannelFactory {
    channels: Mutex<HashMap<String, Arc<MemoryChannel>>>,
    fail_create: AtomicBool,
}

impl MemoryChannelFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest channel opened for `id`.
    pub fn channel(&self, id: &str) -> Option<Arc<MemoryChannel>> {
        self.channels.lock().get(id).cloned()
    }

    /// Make `create` fail with a transport error.
    pub fn fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::Release);
    }
}

impl ChannelFactory for MemoryChannelFactory {
    fn create(
        &self,
        target_name: &str,
        channel_id: &str,
        open: serde_json::Value,
        handler: MessageHandler,
    ) -> Result<Arc<dyn Channel>, ChannelError> {
        if self.fail_create.load(Ordering::Acquire) {
            return Err(ChannelError::Transport(format!("cannot open '{channel_id}'")));
        }
        let channel = Arc::new(MemoryChannel::new(target_name, channel_id, open));
        channel.on_message(handler);
        self.channels
            .lock()
            .insert(channel_id.to_string(), channel.clone());
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn closed_channel_rejects_sends_and_second_close() {
        let ch = MemoryChannel::new("t", "c1", json!({}));
        ch.send(json!(1)).unwrap();
        ch.close().unwrap();
        assert_eq!(ch.send(json!(2)), Err(ChannelError::Closed("c1".into())));
        assert_eq!(ch.close(), Err(ChannelError::Closed("c1".into())));
        assert_eq!(ch.sent(), vec![json!(1)]);
    }

    #[test]
    fn deliver_reaches_handler_with_channel_id() {
        let ch = MemoryChannel::new("t", "c1", json!({}));
        assert!(!ch.deliver(json!({})));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        ch.on_message(Arc::new(move |id: &str, msg: serde_json::Value| sink.lock().push((id.to_string(), msg))));
        assert!(ch.deliver(json!({"msg_type": "ready"})));
        assert_eq!(seen.lock().as_slice(), &[("c1".to_string(), json!({"msg_type": "ready"}))]);
    }

    #[test]
    fn factory_installs_handler_before_handing_out_channel() {
        let factory = MemoryChannelFactory::new();
        let handler: MessageHandler = Arc::new(|_: &str, _: serde_json::Value| {});
        let ch = factory.create("t", "c1", json!({}), handler).unwrap();
        assert!(ch.is_open());
        assert!(factory.channel("c1").unwrap().has_handler());
    }
}
