// crates/bastion-core/src/traits.rs

use crate::error::BastionError;

/// Iteration order for range scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Ascending,
    Descending,
}

/// Ordered, keyed byte store.
///
/// Implemented by bastion-store (in-memory, transactional overlay, RocksDB).
/// Keys compare bytewise; every range scan returns entries in key order, which
/// is what makes queue maturation and power ranking replay-deterministic.
pub trait KvStore {
    /// Read the value stored under `key`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BastionError>;

    /// Write `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), BastionError>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&mut self, key: &[u8]) -> Result<(), BastionError>;

    /// Return all entries with `start <= key < end` (unbounded above when
    /// `end` is `None`) in the requested order.
    fn range(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
        order: Order,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BastionError>;

    /// Whether `key` holds a value.
    fn has(&self, key: &[u8]) -> Result<bool, BastionError> {
        Ok(self.get(key)?.is_some())
    }

    /// All entries whose key starts with `prefix`, ascending.
    fn prefix_scan(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BastionError> {
        let end = prefix_end(prefix);
        self.range(prefix, end.as_deref(), Order::Ascending)
    }
}

/// The smallest key strictly greater than every key starting with `prefix`,
/// or `None` when no such key exists (prefix is empty or all `0xff`).
pub fn prefix_end(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_end_increments_last_byte() {
        assert_eq!(prefix_end(&[0x21, 0x05]), Some(vec![0x21, 0x06]));
    }

    #[test]
    fn test_prefix_end_carries_over_ff() {
        assert_eq!(prefix_end(&[0x21, 0xff]), Some(vec![0x22]));
        assert_eq!(prefix_end(&[0xff, 0xff]), None);
        assert_eq!(prefix_end(&[]), None);
    }
}
