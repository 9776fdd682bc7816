// crates/bastion-store/src/lib.rs
//
// bastion-store: Key-value store implementations for the Bastion staking engine.
//
// Provides an ordered in-memory store (tests, ephemeral nodes), a
// transactional overlay that buffers a message's writes and commits them
// only when the message succeeds, and a RocksDB-backed persistent store.
// All three implement `bastion_core::KvStore`.

pub mod cache;
pub mod memory;
pub mod rocks;

// Re-export key types for ergonomic access from downstream crates.
pub use cache::{CacheStore, CacheWrites};
pub use memory::MemStore;
pub use rocks::RocksStore;
