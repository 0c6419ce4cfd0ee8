use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use uuid::Uuid;

use meshgate_core::error::{MeshError, Result};

/// Request ids are chosen by callers, so they are only unique per caller
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub source_session_id: Uuid,
    pub request_id: String,
}

impl CallKey {
    pub fn new(source_session_id: Uuid, request_id: impl Into<String>) -> Self {
        Self { source_session_id, request_id: request_id.into() }
    }
}

/// A forwarded service call awaiting its response.
#[derive(Debug)]
pub struct PendingEntry {
    pub request_id: String,
    pub source_member_id: String,
    pub source_session_id: Uuid,
    pub target_member_id: String,
    pub target_session_id: Uuid,
    pub capability: String,
    pub service_name: String,
    pub deadline: Instant,
    timer: Option<AbortHandle>,
}

impl PendingEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        request_id: impl Into<String>,
        source_member_id: impl Into<String>,
        source_session_id: Uuid,
        target_member_id: impl Into<String>,
        target_session_id: Uuid,
        capability: impl Into<String>,
        service_name: impl Into<String>,
        deadline: Instant,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            source_member_id: source_member_id.into(),
            source_session_id,
            target_member_id: target_member_id.into(),
            target_session_id,
            capability: capability.into(),
            service_name: service_name.into(),
            deadline,
            timer: None,
        }
    }

    fn cancel_timer(&self) {
        if let Some(t) = &self.timer {
            t.abort();
        }
    }

    pub fn key(&self) -> CallKey {
        CallKey::new(self.source_session_id, self.request_id.clone())
    }

    fn route(&self) -> (Uuid, String) {
        (self.target_session_id, self.request_id.clone())
    }

    fn references(&self, session_id: Uuid) -> bool {
        self.source_session_id == session_id || self.target_session_id == session_id
    }
}

/// In-flight calls keyed by `(caller session, requestId)`.
///
/// A provider answers with the bare `requestId`, so `routes` maps
/// `(provider session, requestId)` back to the caller. One provider can
/// therefore hold a given id for only one caller at a time.
///
/// Every exit path (response, deadline, disconnect) goes through a removal
/// from `calls`, so exactly one of them observes a given entry.
#[derive(Default)]
pub struct PendingRequests {
    calls: DashMap<CallKey, PendingEntry>,
    routes: DashMap<(Uuid, String), Uuid>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending call. Rejected when the caller already has the
    /// id in flight, or the provider is already answering that id for
    /// someone else.
    pub fn insert(&self, entry: PendingEntry) -> Result<()> {
        let Entry::Vacant(call) = self.calls.entry(entry.key()) else {
            return Err(MeshError::BadRequest(format!(
                "requestId {} is already in flight",
                entry.request_id
            )));
        };
        match self.routes.entry(entry.route()) {
            Entry::Occupied(_) => Err(MeshError::BadRequest(format!(
                "requestId {} is already in flight at {}",
                entry.request_id, entry.target_member_id
            ))),
            Entry::Vacant(route) => {
                route.insert(entry.source_session_id);
                call.insert(entry);
                Ok(())
            }
        }
    }

    /// Attach the deadline task. If the entry is already gone the task is
    /// aborted straight away.
    pub fn attach_timer(&self, key: &CallKey, timer: AbortHandle) {
        match self.calls.get_mut(key) {
            Some(mut e) => e.timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Remove on response. Only the session the call was forwarded to may
    /// complete it.
    pub fn complete(&self, request_id: &str, responder_session_id: Uuid) -> Option<PendingEntry> {
        let source = *self.routes.get(&(responder_session_id, request_id.to_string()))?;
        let (_, entry) = self.calls.remove_if(&CallKey::new(source, request_id), |_, e| {
            e.target_session_id == responder_session_id
        })?;
        self.unlink(&entry);
        entry.cancel_timer();
        Some(entry)
    }

    /// Remove on deadline. Called from the timer task itself, so the timer
    /// handle is left alone.
    pub fn expire(&self, key: &CallKey) -> Option<PendingEntry> {
        let (_, entry) = self.calls.remove(key)?;
        self.unlink(&entry);
        Some(entry)
    }

    /// Drop every entry that references `session_id` on either side.
    pub fn purge_session(&self, session_id: Uuid) -> Vec<PendingEntry> {
        let keys: Vec<CallKey> = self
            .calls
            .iter()
            .filter(|r| r.value().references(session_id))
            .map(|r| r.key().clone())
            .collect();

        let mut out = Vec::with_capacity(keys.len());
        for k in keys {
            if let Some((_, e)) = self.calls.remove_if(&k, |_, e| e.references(session_id)) {
                self.unlink(&e);
                e.cancel_timer();
                out.push(e);
            }
        }
        out
    }

    fn unlink(&self, entry: &PendingEntry) {
        self.routes.remove_if(&entry.route(), |_, src| *src == entry.source_session_id);
    }

    /// Whether `source_session_id` has `request_id` in flight.
    pub fn contains(&self, source_session_id: Uuid, request_id: &str) -> bool {
        self.calls.contains_key(&CallKey::new(source_session_id, request_id))
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
