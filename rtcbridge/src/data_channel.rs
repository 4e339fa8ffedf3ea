//! Data channel supervision
//!
//! Each native channel is wrapped in a [`DataChannelWrapper`] and named by a
//! generated tag. Native channel callbacks are handed to the serialized
//! executor and dropped once the wrapper is terminal (it saw `closed`, or
//! its observer was unregistered).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use parking_lot::RwLock;
use rtcbridge_core::{
    BridgeError, BridgeEvent, BridgeResult, DataBuffer, DataChannel, DataChannelInfo,
    DataChannelInit, DataChannelObserver, DataChannelState, DataPayloadKind, EventEmitter,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};
use uuid::Uuid;

/// Consumer options for a locally created channel
///
/// Absent fields take the engine defaults of [`DataChannelInit`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataChannelOptions {
    /// Pre-negotiated stream id
    pub id: Option<i32>,
    /// Ordered delivery
    pub ordered: Option<bool>,
    /// Maximum retransmit time in milliseconds
    pub max_retransmit_time: Option<i32>,
    /// Maximum retransmissions
    pub max_retransmits: Option<i32>,
    /// Sub-protocol
    pub protocol: Option<String>,
    /// Negotiated out of band
    pub negotiated: Option<bool>,
}

impl DataChannelOptions {
    /// Resolve against the engine defaults
    pub fn to_init(&self) -> DataChannelInit {
        let defaults = DataChannelInit::default();
        DataChannelInit {
            id: self.id.unwrap_or(defaults.id),
            ordered: self.ordered.unwrap_or(defaults.ordered),
            max_retransmit_time_ms: self.max_retransmit_time.unwrap_or(defaults.max_retransmit_time_ms),
            max_retransmits: self.max_retransmits.unwrap_or(defaults.max_retransmits),
            protocol: self.protocol.clone().unwrap_or(defaults.protocol),
            negotiated: self.negotiated.unwrap_or(defaults.negotiated),
        }
    }
}

/// A native channel with its tag and owning session
pub struct DataChannelWrapper {
    pc_id: i32,
    react_tag: String,
    channel: Arc<dyn DataChannel>,
    emitter: EventEmitter,
    closed: AtomicBool,
    unregistered: AtomicBool,
}

impl DataChannelWrapper {
    fn new(pc_id: i32, react_tag: String, channel: Arc<dyn DataChannel>, emitter: EventEmitter) -> Arc<Self> {
        let wrapper = Arc::new(Self {
            pc_id,
            react_tag,
            channel,
            emitter,
            closed: AtomicBool::new(false),
            unregistered: AtomicBool::new(false),
        });
        wrapper.channel.register_observer(Arc::new(WrapperObserver {
            wrapper: Arc::downgrade(&wrapper),
        }));
        wrapper
    }

    /// Channel tag
    pub fn react_tag(&self) -> &str {
        &self.react_tag
    }

    /// Native channel
    pub fn channel(&self) -> &Arc<dyn DataChannel> {
        &self.channel
    }

    /// Whether callbacks are being dropped
    pub fn is_terminal(&self) -> bool {
        self.closed.load(Ordering::Acquire) || self.unregistered.load(Ordering::Acquire)
    }

    /// Unregister the native observer; only the first call reaches the channel
    pub fn unregister(&self) {
        if !self.unregistered.swap(true, Ordering::AcqRel) {
            self.channel.unregister_observer();
        }
    }

    fn describe(&self, init: Option<&DataChannelInit>) -> DataChannelInfo {
        // Inbound channels do not expose their init; report the defaults
        let defaults = DataChannelInit::default();
        let init = init.unwrap_or(&defaults);
        DataChannelInfo {
            peer_connection_id: self.pc_id,
            react_tag: self.react_tag.clone(),
            label: self.channel.label(),
            id: self.channel.id(),
            ordered: init.ordered,
            max_packet_life_time: init.max_retransmit_time_ms,
            max_retransmits: init.max_retransmits,
            protocol: init.protocol.clone(),
            negotiated: init.negotiated,
            ready_state: self.channel.state(),
        }
    }

    fn dispatch<F>(self: &Arc<Self>, build: F)
    where
        F: FnOnce(&DataChannelWrapper) -> BridgeEvent + Send + 'static,
    {
        if self.is_terminal() {
            return;
        }
        let wrapper = self.clone();
        self.emitter.executor().execute(move || {
            if wrapper.is_terminal() {
                return;
            }
            let event = build(&wrapper);
            wrapper.emitter.sink().send(event);
        });
    }
}

struct WrapperObserver {
    wrapper: Weak<DataChannelWrapper>,
}

impl DataChannelObserver for WrapperObserver {
    fn on_buffered_amount_change(&self, _previous_amount: u64) {
        let Some(wrapper) = self.wrapper.upgrade() else {
            return;
        };
        let buffered_amount = wrapper.channel.buffered_amount();
        wrapper.dispatch(move |w| BridgeEvent::DataChannelBufferedAmountChanged {
            peer_connection_id: w.pc_id,
            react_tag: w.react_tag.clone(),
            buffered_amount,
        });
    }

    fn on_state_change(&self) {
        let Some(wrapper) = self.wrapper.upgrade() else {
            return;
        };
        let state = wrapper.channel.state();
        wrapper.dispatch(move |w| {
            if state == DataChannelState::Closed {
                w.closed.store(true, Ordering::Release);
                debug!("Data channel {} closed", w.react_tag);
            }
            BridgeEvent::DataChannelStateChanged {
                peer_connection_id: w.pc_id,
                react_tag: w.react_tag.clone(),
                id: w.channel.id(),
                state,
            }
        });
    }

    fn on_message(&self, buffer: DataBuffer) {
        let Some(wrapper) = self.wrapper.upgrade() else {
            return;
        };
        let (kind, data) = if buffer.binary {
            (DataPayloadKind::Binary, BASE64.encode(&buffer.data))
        } else {
            (
                DataPayloadKind::Text,
                String::from_utf8_lossy(&buffer.data).into_owned(),
            )
        };
        wrapper.dispatch(move |w| BridgeEvent::DataChannelMessage {
            peer_connection_id: w.pc_id,
            react_tag: w.react_tag.clone(),
            kind,
            data,
        });
    }
}

/// Data channels of one session, keyed by tag
pub struct DataChannelSupervisor {
    pc_id: i32,
    emitter: EventEmitter,
    channels: RwLock<HashMap<String, Arc<DataChannelWrapper>>>,
}

impl DataChannelSupervisor {
    /// Create an empty supervisor for session `pc_id`
    pub fn new(pc_id: i32, emitter: EventEmitter) -> Self {
        Self {
            pc_id,
            emitter,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Wrap and register a channel
    ///
    /// `init` is the creation config of a local channel; inbound channels
    /// pass `None` and are described with placeholder metadata.
    pub fn register(&self, channel: Arc<dyn DataChannel>, init: Option<&DataChannelInit>) -> DataChannelInfo {
        let react_tag = Uuid::new_v4().to_string();
        let wrapper = DataChannelWrapper::new(self.pc_id, react_tag.clone(), channel, self.emitter.clone());
        let info = wrapper.describe(init);
        self.channels.write().insert(react_tag.clone(), wrapper);
        debug!("Registered data channel {} ({}) on session {}", info.label, react_tag, self.pc_id);
        info
    }

    /// Close a channel; the observer stays registered for the final state events
    pub fn close(&self, react_tag: &str) -> BridgeResult<()> {
        let wrapper = self.get(react_tag).ok_or_else(|| {
            debug!("close: data channel {} not found", react_tag);
            BridgeError::not_found("data channel", react_tag)
        })?;
        wrapper.channel.close();
        Ok(())
    }

    /// Unregister a channel's observer and forget it
    pub fn dispose_channel(&self, react_tag: &str) -> bool {
        let Some(wrapper) = self.channels.write().remove(react_tag) else {
            return false;
        };
        wrapper.unregister();
        debug!("Disposed data channel {}", react_tag);
        true
    }

    /// Send a text or base64-encoded binary payload
    ///
    /// Fails with `InvalidStateError` when the engine refuses the buffer.
    pub fn send(&self, react_tag: &str, data: &str, kind: &str) -> BridgeResult<()> {
        let wrapper = self
            .get(react_tag)
            .ok_or_else(|| BridgeError::not_found("data channel", react_tag))?;

        let kind: DataPayloadKind = kind.parse().map_err(|e| {
            warn!("Refusing to send on {}: {}", react_tag, e);
            e
        })?;

        let buffer = match kind {
            DataPayloadKind::Text => DataBuffer {
                data: Bytes::copy_from_slice(data.as_bytes()),
                binary: false,
            },
            DataPayloadKind::Binary => {
                let decoded = BASE64.decode(data).map_err(|e| {
                    warn!("Invalid base64 payload for {}: {}", react_tag, e);
                    BridgeError::InvalidPayload {
                        reason: e.to_string(),
                    }
                })?;
                DataBuffer {
                    data: Bytes::from(decoded),
                    binary: true,
                }
            }
        };

        if !wrapper.channel.send(buffer) {
            warn!("Data channel {} refused the message", react_tag);
            return Err(BridgeError::invalid_state(format!(
                "data channel {} refused the message",
                react_tag
            )));
        }
        Ok(())
    }

    /// Look up a channel
    pub fn get(&self, react_tag: &str) -> Option<Arc<DataChannelWrapper>> {
        self.channels.read().get(react_tag).cloned()
    }

    /// Number of registered channels
    pub fn len(&self) -> usize {
        self.channels.read().len()
    }

    /// Whether no channel is registered
    pub fn is_empty(&self) -> bool {
        self.channels.read().is_empty()
    }

    /// Unregister every observer and clear the registry
    pub fn dispose_all(&self) {
        let wrappers: Vec<_> = self.channels.write().drain().map(|(_, w)| w).collect();
        for wrapper in wrappers {
            wrapper.unregister();
        }
    }
}
