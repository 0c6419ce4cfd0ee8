//! Gateway services: admission, handshake, and the two routers.

pub mod admission;
pub mod events;
pub mod handshake;
pub mod rpc;

use std::collections::HashMap;

use crate::store::RecordStore;

pub use admission::{Admission, Admitted};
pub use events::{EventRouter, PublishReport};
pub use handshake::{HandshakeOutcome, HandshakeService};
pub use rpc::{CallOutcome, ServiceRouter};

/// `realm_id -> realm_key` lookups memoized for one routing pass.
///
/// Never outlives a single publish/call, so store changes are picked up on
/// the next one. A failed lookup resolves to `None` for the rest of the pass:
/// one unreadable realm row only takes out the members that live in it.
#[derive(Default)]
pub(crate) struct RealmKeys {
    seen: HashMap<String, Option<String>>,
}

impl RealmKeys {
    pub(crate) async fn resolve(&mut self, store: &dyn RecordStore, realm_id: &str) -> Option<String> {
        if let Some(k) = self.seen.get(realm_id) {
            return k.clone();
        }
        let key = match store.realm_by_id(realm_id).await {
            Ok(realm) => realm.map(|r| r.realm_key),
            Err(e) => {
                tracing::error!(realm_id = %realm_id, error = %e, "realm lookup failed");
                None
            }
        };
        self.seen.insert(realm_id.to_string(), key.clone());
        key
    }
}
