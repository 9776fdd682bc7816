// crates/bastion-store/src/cache.rs
//
// Transactional write overlay.
//
// A `CacheStore` reads through to a parent store and buffers every write
// and delete. Dropping it discards the buffered changes; `into_writes`
// hands them back so the caller can apply them to the parent once the
// message has succeeded. This gives message-level atomicity: an error
// anywhere in a message leaves the parent store untouched.

use std::collections::BTreeMap;
use std::ops::Bound;

use bastion_core::error::BastionError;
use bastion_core::traits::{KvStore, Order};

/// Buffered writes: `Some(value)` for a set, `None` for a delete.
#[derive(Debug, Clone, Default)]
pub struct CacheWrites {
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl CacheWrites {
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Apply the buffered writes to `target` in key order.
    pub fn write_to(self, target: &mut dyn KvStore) -> Result<(), BastionError> {
        let count = self.writes.len();
        for (key, value) in self.writes {
            match value {
                Some(value) => target.set(&key, &value)?,
                None => target.delete(&key)?,
            }
        }
        tracing::trace!("Committed {} cached writes", count);
        Ok(())
    }
}

/// Read-through overlay over a parent store.
pub struct CacheStore<'p> {
    parent: &'p dyn KvStore,
    writes: CacheWrites,
}

impl<'p> CacheStore<'p> {
    pub fn new(parent: &'p dyn KvStore) -> Self {
        Self {
            parent,
            writes: CacheWrites::default(),
        }
    }

    /// Release the parent borrow and return the buffered writes.
    pub fn into_writes(self) -> CacheWrites {
        self.writes
    }
}

impl KvStore for CacheStore<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BastionError> {
        match self.writes.writes.get(key) {
            Some(buffered) => Ok(buffered.clone()),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), BastionError> {
        self.writes.writes.insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), BastionError> {
        self.writes.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn range(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        order: Order,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BastionError> {
        if matches!(end, Some(end) if end <= start) {
            return Ok(Vec::new());
        }
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = self
            .parent
            .range(start, end, Order::Ascending)?
            .into_iter()
            .collect();

        let upper = match end {
            Some(end) => Bound::Excluded(end.to_vec()),
            None => Bound::Unbounded,
        };
        for (key, value) in self
            .writes
            .writes
            .range((Bound::Included(start.to_vec()), upper))
        {
            match value {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        let iter = merged.into_iter();
        Ok(match order {
            Order::Ascending => iter.collect(),
            Order::Descending => iter.rev().collect(),
        })
    }
}
