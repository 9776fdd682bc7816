// crates/bastion-staking/src/keeper/historical.rs
//
// Historical info: a rolling window of bonded-set snapshots, one per height,
// used to look up a validator's tokens at an infraction height.

use tracing::debug;

use bastion_core::{Context, Order};

use super::{get_json, set_json, Keeper};
use crate::delegation::{HistoricalInfo, HistoricalValidator};
use crate::error::StakingError;
use crate::keys;

impl Keeper {
    pub fn get_historical_info(
        &self,
        ctx: &Context<'_>,
        height: u64,
    ) -> Result<Option<HistoricalInfo>, StakingError> {
        get_json(ctx.store(), &keys::historical_info_key(height))
    }

    pub fn set_historical_info(
        &self,
        ctx: &mut Context<'_>,
        height: u64,
        info: &HistoricalInfo,
    ) -> Result<(), StakingError> {
        set_json(ctx.store_mut(), &keys::historical_info_key(height), info)
    }

    pub fn delete_historical_info(
        &self,
        ctx: &mut Context<'_>,
        height: u64,
    ) -> Result<(), StakingError> {
        ctx.store_mut().delete(&keys::historical_info_key(height))?;
        Ok(())
    }

    /// Drop snapshots that fell out of the `historical_entries` window and,
    /// unless the window is zero, record the current bonded set.
    pub fn track_historical_info(&self, ctx: &mut Context<'_>) -> Result<(), StakingError> {
        let params = self.params(ctx)?;
        let entries = u64::from(params.historical_entries);
        let height = ctx.height();

        // Heights at or below `height - entries` are stale.
        if height > entries {
            let start = [keys::HISTORICAL_INFO_KEY];
            let end = keys::historical_info_key(height - entries + 1);
            let stale = ctx.store().range(&start, Some(&end), Order::Ascending)?;
            if !stale.is_empty() {
                debug!("Pruning {} historical info entries", stale.len());
            }
            for (key, _) in stale {
                ctx.store_mut().delete(&key)?;
            }
        }

        if entries == 0 {
            return Ok(());
        }

        let valset = self
            .get_last_validators(ctx)?
            .into_iter()
            .map(|v| HistoricalValidator {
                operator_address: v.operator_address,
                tokens: v.tokens,
                power: v.consensus_power(params.power_reduction),
            })
            .collect();
        let info = HistoricalInfo {
            header: ctx.header().clone(),
            valset,
        };
        self.set_historical_info(ctx, height, &info)
    }
}
