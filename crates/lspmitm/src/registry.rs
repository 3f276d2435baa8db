//! Request/Response correlation registry.
//!
//! Each direction owns a registry of in-flight Requests keyed by id, split
//! into a string-keyed and an integer-keyed map (numeric and string ids live
//! in disjoint spaces). The two directions are linked: a Request is inserted
//! into its own side's maps, while a Response retrieves from the *peer*
//! side's maps.
//!
//! Both sides are views over one mutex-guarded pair, so the two pipelines
//! may run on separate tasks or threads while every insert/retrieve observes
//! a total order.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::message::{Id, Sender};

/// What the registry remembers about an in-flight Request: enough to
/// complete the Response side of the link without touching the emitted
/// message.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PendingRequest {
    pub seq: u64,
    pub method: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Default)]
struct SideMaps {
    by_string: HashMap<String, PendingRequest>,
    by_number: HashMap<i64, PendingRequest>,
}

impl SideMaps {
    fn insert(&mut self, id: &Id, pending: PendingRequest) -> Option<PendingRequest> {
        match id {
            Id::String(s) => self.by_string.insert(s.clone(), pending),
            Id::Number(n) => self.by_number.insert(*n, pending),
        }
    }

    fn remove(&mut self, id: &Id) -> Option<PendingRequest> {
        match id {
            Id::String(s) => self.by_string.remove(s),
            Id::Number(n) => self.by_number.remove(n),
        }
    }

    fn len(&self) -> usize {
        self.by_string.len() + self.by_number.len()
    }
}

#[derive(Debug, Default)]
struct RegistryPair {
    client: SideMaps,
    server: SideMaps,
}

impl RegistryPair {
    fn side_mut(&mut self, sender: Sender) -> &mut SideMaps {
        match sender {
            Sender::Client => &mut self.client,
            Sender::Server => &mut self.server,
        }
    }
}

/// One direction's view of the linked registry pair.
#[derive(Debug, Clone)]
pub struct RegistryHandle {
    shared: Arc<Mutex<RegistryPair>>,
    side: Sender,
}

impl RegistryHandle {
    /// Builds both sides over a fresh shared pair, already linked.
    pub fn linked_pair() -> (RegistryHandle, RegistryHandle) {
        let shared = Arc::new(Mutex::new(RegistryPair::default()));
        (
            RegistryHandle {
                shared: Arc::clone(&shared),
                side: Sender::Client,
            },
            RegistryHandle {
                shared,
                side: Sender::Server,
            },
        )
    }

    pub fn side(&self) -> Sender {
        self.side
    }

    /// Records an in-flight Request under `id` on this side. Returns the
    /// entry it shadowed, if the id was already in use.
    pub fn insert_request(&self, id: &Id, pending: PendingRequest) -> Option<PendingRequest> {
        let mut pair = self.shared.lock().expect("registry mutex poisoned");
        pair.side_mut(self.side).insert(id, pending)
    }

    /// Removes and returns the peer side's in-flight Request under `id`,
    /// if one exists.
    pub fn retrieve_for_response(&self, id: &Id) -> Option<PendingRequest> {
        let mut pair = self.shared.lock().expect("registry mutex poisoned");
        pair.side_mut(self.side.opposite()).remove(id)
    }

    /// Number of Requests currently awaiting a Response on this side.
    pub fn outstanding(&self) -> usize {
        let pair = self.shared.lock().expect("registry mutex poisoned");
        match self.side {
            Sender::Client => pair.client.len(),
            Sender::Server => pair.server.len(),
        }
    }
}
