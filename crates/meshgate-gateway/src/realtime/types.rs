use axum::extract::ws::Message;

use meshgate_core::error::Result;
use meshgate_core::protocol::frame::Frame;

/// Quality-of-Service strategy for outgoing delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QoS {
    /// Best-effort: do not await; if the member's queue is full, drop.
    #[default]
    Lossy,
    /// Await queue capacity, bounded by a timeout.
    Reliable { timeout_ms: u64 },
}

/// Frame serialized once, sent to N sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedMsg(String);

impl PreparedMsg {
    pub fn prepare(frame: &Frame) -> Result<Self> {
        Ok(Self(frame.to_text()?))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to axum::ws::Message for transport.
    pub fn to_ws_message(&self) -> Message {
        Message::Text(self.0.clone())
    }
}
