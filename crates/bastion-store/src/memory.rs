// crates/bastion-store/src/memory.rs
//
// Ordered in-memory key-value store backed by a BTreeMap.

use std::collections::BTreeMap;
use std::ops::Bound;

use bastion_core::error::BastionError;
use bastion_core::traits::{KvStore, Order};

/// In-memory `KvStore`. Iteration order is bytewise key order.
#[derive(Debug, Clone, Default)]
pub struct MemStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BastionError> {
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), BastionError> {
        self.data.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), BastionError> {
        self.data.remove(key);
        Ok(())
    }

    fn range(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        order: Order,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BastionError> {
        let upper = match end {
            Some(end) if end <= start => return Ok(Vec::new()),
            Some(end) => Bound::Excluded(end.to_vec()),
            None => Bound::Unbounded,
        };
        let iter = self
            .data
            .range((Bound::Included(start.to_vec()), upper))
            .map(|(k, v)| (k.clone(), v.clone()));
        Ok(match order {
            Order::Ascending => iter.collect(),
            Order::Descending => iter.rev().collect(),
        })
    }
}
