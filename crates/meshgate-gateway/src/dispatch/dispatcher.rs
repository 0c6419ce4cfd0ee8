use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use meshgate_core::error::{MeshError, Result};
use meshgate_core::protocol::frame::Frame;

use crate::realtime::RouteCtx;

/// Handler for one or more post-handshake frame types.
#[async_trait]
pub trait FrameHandler: Send + Sync {
    fn frame_types(&self) -> &'static [&'static str];
    async fn handle(&self, ctx: RouteCtx, frame: Frame) -> Result<()>;
}

/// Registry of frame handlers keyed by frame `type`.
#[derive(Default)]
pub struct Dispatcher {
    handlers: DashMap<&'static str, Arc<dyn FrameHandler>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self { handlers: DashMap::new() }
    }

    pub fn register(&self, handler: Arc<dyn FrameHandler>) {
        for t in handler.frame_types() {
            self.handlers.insert(*t, Arc::clone(&handler));
        }
    }

    pub fn registered_types(&self) -> Vec<&'static str> {
        let mut v: Vec<_> = self.handlers.iter().map(|e| *e.key()).collect();
        v.sort_unstable();
        v
    }

    /// Route one frame. An unregistered `type` is a protocol violation.
    pub async fn dispatch(&self, ctx: RouteCtx, frame: Frame) -> Result<()> {
        let handler = self
            .handlers
            .get(frame.frame_type.as_str())
            .ok_or_else(|| MeshError::ProtocolViolation(format!("unknown frame type: {}", frame.frame_type)))?
            .value()
            .clone();
        handler.handle(ctx, frame).await
    }
}
