// crates/bastion-core/src/lib.rs
//
// bastion-core: Core types, traits, and crypto primitives for the Bastion
// staking engine.
//
// This is the leaf crate that all other crates in the workspace depend on.
// It defines addresses and their string codec, coin amounts, consensus
// public keys, the ordered key-value store interface, and the per-message
// execution context (block header, consensus params, event sink).

pub mod address;
pub mod coin;
pub mod context;
pub mod crypto;
pub mod error;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use bastion_core::Address;`

// Address types
pub use address::{Address, AddressCodec, ConsAddress, HexCodec, ADDRESS_LEN};

// Coin types
pub use coin::{Amount, Coin};

// Execution context
pub use context::{BlockHeader, ConsensusParams, Context, Event, EventManager};

// Consensus keys
pub use crypto::{ConsensusPubKey, PubKeyType};

// Error type
pub use error::BastionError;

// Traits
pub use traits::{prefix_end, KvStore, Order};
