//! Decode-once codec: WebSocket message -> inbound event.
//!
//! Text frames become `Frame` envelopes; everything the mesh protocol does not
//! define (binary payloads, oversized frames, malformed JSON) is a protocol
//! violation.

use axum::extract::ws::Message;

use meshgate_core::error::{MeshError, Result};
use meshgate_core::protocol::frame::Frame;

#[derive(Debug)]
pub enum Inbound {
    Frame { frame: Frame, bytes_len: usize },
    Ping(Vec<u8>),
    Pong,
    Close,
}

pub fn decode(msg: Message, max_frame_bytes: usize) -> Result<Inbound> {
    match msg {
        Message::Text(s) => {
            let bytes_len = s.len();
            if bytes_len > max_frame_bytes {
                return Err(MeshError::ProtocolViolation(format!(
                    "frame of {bytes_len} bytes exceeds {max_frame_bytes}"
                )));
            }
            let frame = Frame::parse(&s)?;
            if frame.frame_type.is_empty() {
                return Err(MeshError::ProtocolViolation("frame type missing".into()));
            }
            Ok(Inbound::Frame { frame, bytes_len })
        }
        Message::Binary(_) => Err(MeshError::ProtocolViolation("binary frames are not supported".into())),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(_) => Ok(Inbound::Pong),
        Message::Close(_) => Ok(Inbound::Close),
    }
}
