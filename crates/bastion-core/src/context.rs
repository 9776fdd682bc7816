// crates/bastion-core/src/context.rs
//
// Per-message execution context.
//
// Every mutating operation receives a `Context` explicitly: it carries the
// block header (height and logical time; wall-clock time is never read),
// the consensus parameters in force for the block, a mutable handle to the
// keyed store, and the event sink for structured key/value events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::PubKeyType;
use crate::traits::KvStore;

/// The subset of a block header the engine depends on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub chain_id: String,
    pub height: u64,
    pub time: DateTime<Utc>,
}

impl BlockHeader {
    pub fn new(chain_id: impl Into<String>, height: u64, time: DateTime<Utc>) -> Self {
        Self {
            chain_id: chain_id.into(),
            height,
            time,
        }
    }
}

/// Consensus parameters consumed by the staking engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    /// Public-key algorithms accepted for validator consensus keys.
    pub pub_key_types: Vec<PubKeyType>,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self {
            pub_key_types: vec![PubKeyType::Ed25519],
        }
    }
}

impl ConsensusParams {
    pub fn accepts(&self, key_type: PubKeyType) -> bool {
        self.pub_key_types.contains(&key_type)
    }
}

/// A structured event: a type plus ordered key/value attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub kind: String,
    pub attributes: Vec<(String, String)>,
}

impl Event {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attributes: Vec::new(),
        }
    }

    /// Append an attribute (builder style).
    pub fn attr(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.push((key.into(), value.to_string()));
        self
    }

    /// Look up the first attribute with `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Ordered event sink.
#[derive(Debug, Clone, Default)]
pub struct EventManager {
    events: Vec<Event>,
}

impl EventManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

/// Execution context for one message or one block hook.
pub struct Context<'a> {
    header: BlockHeader,
    consensus_params: ConsensusParams,
    store: &'a mut dyn KvStore,
    events: EventManager,
}

impl<'a> Context<'a> {
    pub fn new(store: &'a mut dyn KvStore, header: BlockHeader) -> Self {
        Self {
            header,
            consensus_params: ConsensusParams::default(),
            store,
            events: EventManager::new(),
        }
    }

    pub fn with_consensus_params(mut self, params: ConsensusParams) -> Self {
        self.consensus_params = params;
        self
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn height(&self) -> u64 {
        self.header.height
    }

    pub fn block_time(&self) -> DateTime<Utc> {
        self.header.time
    }

    pub fn consensus_params(&self) -> &ConsensusParams {
        &self.consensus_params
    }

    pub fn store(&self) -> &dyn KvStore {
        &*self.store
    }

    pub fn store_mut(&mut self) -> &mut dyn KvStore {
        &mut *self.store
    }

    pub fn emit_event(&mut self, event: Event) {
        self.events.emit(event);
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    /// Consume the context, returning the emitted events in order.
    pub fn into_events(self) -> Vec<Event> {
        self.events.into_events()
    }
}
