// crates/bastion-daemon/src/scheduler.rs
//
// Block scheduler for the Bastion staking daemon.
//
// Produces one block per interval: begin_block and end_block run on a
// cache overlay of the state store, which is committed together with the
// new height once both hooks succeed. Validator-set updates are logged.

use std::time::Duration;

use chrono::{DateTime, Utc};

use bastion_core::{BlockHeader, Context, KvStore};
use bastion_staking::{
    begin_block, end_block, init_genesis, GenesisState, Keeper, StakingError, ValidatorUpdate,
};
use bastion_store::CacheStore;

/// Store key holding the last committed block height (big-endian u64).
const LAST_HEIGHT_KEY: &[u8] = &[0xF0];

/// Scheduler that owns the state store and drives the staking block hooks.
pub struct BlockScheduler {
    keeper: Keeper,
    store: Box<dyn KvStore>,
    chain_id: String,
    interval: Duration,
    /// Last committed height; `None` until genesis has run.
    height: Option<u64>,
}

impl BlockScheduler {
    /// Create a scheduler over `store`, resuming from any height it holds.
    pub fn new(
        keeper: Keeper,
        store: Box<dyn KvStore>,
        chain_id: impl Into<String>,
        interval: Duration,
    ) -> Result<Self, StakingError> {
        let height = match store.get(LAST_HEIGHT_KEY)? {
            Some(bytes) => Some(decode_height(&bytes)?),
            None => None,
        };
        Ok(Self {
            keeper,
            store,
            chain_id: chain_id.into(),
            interval,
            height,
        })
    }

    /// Whether genesis has already been applied to the store.
    pub fn is_initialized(&self) -> bool {
        self.height.is_some()
    }

    pub fn height(&self) -> Option<u64> {
        self.height
    }

    /// Apply `genesis` at height 0 and return the initial validator set.
    pub fn init_chain(
        &mut self,
        genesis: &GenesisState,
        time: DateTime<Utc>,
    ) -> Result<Vec<ValidatorUpdate>, StakingError> {
        let updates = self.execute(0, time, |keeper, ctx| init_genesis(keeper, ctx, genesis))?;
        tracing::info!(
            "Genesis applied on chain {}: {} validators in the initial set",
            self.chain_id,
            updates.len()
        );
        log_updates(&updates);
        Ok(updates)
    }

    /// Produce the next block at `time` and return its validator-set updates.
    pub fn produce_block(&mut self, time: DateTime<Utc>) -> Result<Vec<ValidatorUpdate>, StakingError> {
        let height = self.height.map_or(1, |h| h + 1);
        let updates = self.execute(height, time, |keeper, ctx| {
            begin_block(keeper, ctx)?;
            end_block(keeper, ctx)
        })?;

        if updates.is_empty() {
            tracing::trace!("Block {} committed", height);
        } else {
            tracing::info!("Block {} committed with {} validator updates", height, updates.len());
            log_updates(&updates);
        }
        Ok(updates)
    }

    /// Run the scheduler loop until ctrl-c.
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        tracing::info!(
            "Block scheduler started (chain={}, interval={}s, height={:?})",
            self.chain_id,
            self.interval.as_secs(),
            self.height
        );

        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Block scheduler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    self.produce_block(Utc::now())?;
                }
            }
        }

        Ok(())
    }

    /// Run `f` at `height` on a cache overlay; commit it with the new height
    /// only if `f` succeeds.
    fn execute<R>(
        &mut self,
        height: u64,
        time: DateTime<Utc>,
        f: impl FnOnce(&Keeper, &mut Context<'_>) -> Result<R, StakingError>,
    ) -> Result<R, StakingError> {
        let header = BlockHeader::new(self.chain_id.clone(), height, time);
        let mut cache = CacheStore::new(self.store.as_ref());
        let result = {
            let mut ctx = Context::new(&mut cache, header);
            let result = f(&self.keeper, &mut ctx)?;
            ctx.store_mut().set(LAST_HEIGHT_KEY, &height.to_be_bytes())?;
            result
        };
        cache.into_writes().write_to(self.store.as_mut())?;
        self.height = Some(height);
        Ok(result)
    }
}

fn decode_height(bytes: &[u8]) -> Result<u64, StakingError> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| {
        bastion_core::BastionError::Serialization(format!(
            "last height must be 8 bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok(u64::from_be_bytes(arr))
}

fn log_updates(updates: &[ValidatorUpdate]) {
    for update in updates {
        tracing::info!(
            "  validator {} power {}",
            hex::encode(update.pub_key.to_bytes()),
            update.power
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genesis::dev_genesis;
    use bastion_core::HexCodec;
    use bastion_staking::{Params, StoreBank};
    use bastion_store::{MemStore, RocksStore};

    fn keeper() -> Keeper {
        Keeper::new(Box::new(StoreBank::new()), Box::new(HexCodec::default()))
    }

    fn genesis(count: u32) -> GenesisState {
        let mut genesis = dev_genesis(&HexCodec::default(), count);
        genesis.params = Params {
            max_validators: 2,
            ..genesis.params
        };
        genesis
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + chrono::Duration::seconds(secs)
    }

    #[test]
    fn test_genesis_then_blocks_advance_height() {
        let mut scheduler =
            BlockScheduler::new(keeper(), Box::new(MemStore::new()), "bastion-test", Duration::from_secs(1))
                .unwrap();
        assert!(!scheduler.is_initialized());

        let updates = scheduler.init_chain(&genesis(3), at(0)).unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(scheduler.height(), Some(0));

        assert!(scheduler.produce_block(at(5)).unwrap().is_empty());
        assert!(scheduler.produce_block(at(10)).unwrap().is_empty());
        assert_eq!(scheduler.height(), Some(2));
    }

    #[test]
    fn test_failed_genesis_commits_nothing() {
        let mut scheduler =
            BlockScheduler::new(keeper(), Box::new(MemStore::new()), "bastion-test", Duration::from_secs(1))
                .unwrap();
        let mut bad = genesis(1);
        bad.accounts.clear();
        assert!(scheduler.init_chain(&bad, at(0)).is_err());
        assert!(!scheduler.is_initialized());
        assert!(scheduler
            .store
            .range(&[], None, bastion_core::Order::Ascending)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_height_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("bastion-daemon-{}", uuid::Uuid::now_v7()));
        let path = dir.to_string_lossy().to_string();
        {
            let store = RocksStore::open(&path).unwrap();
            let mut scheduler =
                BlockScheduler::new(keeper(), Box::new(store), "bastion-test", Duration::from_secs(1)).unwrap();
            scheduler.init_chain(&genesis(2), at(0)).unwrap();
            scheduler.produce_block(at(5)).unwrap();
        }
        {
            let store = RocksStore::open(&path).unwrap();
            let mut scheduler =
                BlockScheduler::new(keeper(), Box::new(store), "bastion-test", Duration::from_secs(1)).unwrap();
            assert_eq!(scheduler.height(), Some(1));
            scheduler.produce_block(at(10)).unwrap();
            assert_eq!(scheduler.height(), Some(2));
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
