// crates/bastion-store/src/rocks.rs
//
// RocksDB-backed persistent key-value store.
//
// Keys are stored verbatim; RocksDB's default bytewise comparator gives the
// same ordering as `MemStore`, so range scans (maturity queues, power
// index) behave identically on both backends.

use rocksdb::{DBWithThreadMode, Direction, IteratorMode, MultiThreaded, Options};

use bastion_core::error::BastionError;
use bastion_core::traits::{KvStore, Order};

/// RocksDB wrapper implementing the `KvStore` trait.
#[derive(Debug)]
pub struct RocksStore {
    db: DBWithThreadMode<MultiThreaded>,
}

impl RocksStore {
    /// Open a RocksDB database at the given filesystem path.
    ///
    /// Creates the database directory if it does not exist.
    pub fn open(path: &str) -> Result<Self, BastionError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, path).map_err(|e| {
            BastionError::Storage(format!("Failed to open RocksDB at {}: {}", path, e))
        })?;

        tracing::debug!("Opened RocksDB store at {}", path);
        Ok(Self { db })
    }

    fn scan_forward(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BastionError> {
        let mut out = Vec::new();
        for item in self.db.iterator(IteratorMode::From(start, Direction::Forward)) {
            let (key, value) = item
                .map_err(|e| BastionError::Storage(format!("RocksDB iteration error: {}", e)))?;
            if let Some(end) = end {
                if key.as_ref() >= end {
                    break;
                }
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    fn scan_reverse(
        &self,
        start: &[u8],
        end: Option<&[u8]>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, BastionError> {
        let mode = match end {
            Some(end) => IteratorMode::From(end, Direction::Reverse),
            None => IteratorMode::End,
        };
        let mut out = Vec::new();
        for item in self.db.iterator(mode) {
            let (key, value) = item
                .map_err(|e| BastionError::Storage(format!("RocksDB iteration error: {}", e)))?;
            // Reverse seek lands on the last key <= end; the bound is exclusive.
            if let Some(end) = end {
                if key.as_ref() >= end {
                    continue;
                }
            }
            if key.as_ref() < start {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }
}

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BastionError> {
        self.db
            .get(key)
            .map_err(|e| BastionError::Storage(format!("RocksDB get failed: {}", e)))
    }

    fn set(&mut self, key: &[u8], value: &[u8]) -> Result<(), BastionError> {
        self.db
            .put(key, value)
            .map_err(|e| BastionError::Storage(format!("RocksDB put failed: {}", e)))
    }

    fn delete(&mut self, key: &[u8]) -> Result<(), BastionError> {
        self.db
            .delete(key)
            .map_err(|e| BastionError::Storage(format!("RocksDB delete failed: {}", e)))
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
        match order {
            Order::Ascending => self.scan_forward(start, end),
            Order::Descending => self.scan_reverse(start, end),
        }
    }
}
