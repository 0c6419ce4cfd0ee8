use std::sync::Arc;

use uuid::Uuid;

use meshgate_core::error::{MeshError, Result};
use meshgate_core::protocol::frame::Frame;

use crate::realtime::core::{PendingRequests, Session, SessionRegistry};
use crate::realtime::types::{PreparedMsg, QoS};

/// Session and pending-call tables shared by the routers.
pub struct MeshCore {
    pub sessions: Arc<SessionRegistry>,
    pub pending: Arc<PendingRequests>,
}

impl Default for MeshCore {
    fn default() -> Self {
        Self::new()
    }
}

impl MeshCore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(SessionRegistry::new()),
            pending: Arc::new(PendingRequests::new()),
        }
    }

    /// Deliver only if the member is still bound to `session_id`. Replies to a
    /// superseded connection are never rerouted to its successor.
    pub async fn send_to_session(
        &self,
        member_id: &str,
        session_id: Uuid,
        frame: &Frame,
        qos: QoS,
    ) -> Result<()> {
        let session = self
            .sessions
            .get(member_id)
            .filter(|s| s.id() == session_id)
            .ok_or_else(|| MeshError::TargetOffline(format!("{member_id} session {session_id} is gone")))?;
        let prepared = PreparedMsg::prepare(frame)?;
        session.send(&prepared, qos).await
    }
}

/// Per-frame context handed to handlers: the session the frame arrived on.
#[derive(Clone)]
pub struct RouteCtx {
    session: Arc<Session>,
}

impl RouteCtx {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<Session> { &self.session }
    pub fn member_id(&self) -> &str { self.session.member_id() }
}
