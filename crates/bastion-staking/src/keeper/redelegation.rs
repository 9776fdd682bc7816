// crates/bastion-staking/src/keeper/redelegation.rs
//
// Redelegations: immediate stake moves that stay slashable at the source
// until the unbonding period has passed.
//
// Tokens move to the destination validator when the redelegation begins;
// maturity only closes the slashing window. Records are indexed by source
// (for slashing) and by destination (to refuse chained redelegations).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::debug;

use bastion_core::{Address, Amount, Context, Event, ADDRESS_LEN};

use super::{get_json, set_json, Keeper};
use crate::delegation::{DvvTriplet, Redelegation};
use crate::error::StakingError;
use crate::events;
use crate::keys;
use crate::validator::BondStatus;

impl Keeper {
    pub fn get_redelegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        src: &Address,
        dst: &Address,
    ) -> Result<Option<Redelegation>, StakingError> {
        get_json(ctx.store(), &keys::redelegation_key(delegator, src, dst))
    }

    pub fn set_redelegation(&self, ctx: &mut Context<'_>, red: &Redelegation) -> Result<(), StakingError> {
        let (del, src, dst) = (
            &red.delegator_address,
            &red.validator_src_address,
            &red.validator_dst_address,
        );
        set_json(ctx.store_mut(), &keys::redelegation_key(del, src, dst), red)?;
        ctx.store_mut()
            .set(&keys::redelegation_by_src_key(src, del, dst), &[])?;
        ctx.store_mut()
            .set(&keys::redelegation_by_dst_key(dst, del, src), &[])?;
        Ok(())
    }

    pub fn remove_redelegation(&self, ctx: &mut Context<'_>, red: &Redelegation) -> Result<(), StakingError> {
        let (del, src, dst) = (
            &red.delegator_address,
            &red.validator_src_address,
            &red.validator_dst_address,
        );
        ctx.store_mut()
            .delete(&keys::redelegation_key(del, src, dst))?;
        ctx.store_mut()
            .delete(&keys::redelegation_by_src_key(src, del, dst))?;
        ctx.store_mut()
            .delete(&keys::redelegation_by_dst_key(dst, del, src))?;
        Ok(())
    }

    /// Redelegations out of `src`, ordered by (delegator, destination).
    pub fn get_redelegations_from_src_validator(
        &self,
        ctx: &Context<'_>,
        src: &Address,
    ) -> Result<Vec<Redelegation>, StakingError> {
        let mut out = Vec::new();
        for (key, _) in ctx
            .store()
            .prefix_scan(&keys::redelegations_by_src_prefix(src))?
        {
            let delegator = keys::address_at(&key, 1 + ADDRESS_LEN)?;
            let dst = keys::address_at(&key, 1 + 2 * ADDRESS_LEN)?;
            let red = self
                .get_redelegation(ctx, &delegator, src, &dst)?
                .ok_or_else(|| {
                    StakingError::Corrupted(format!(
                        "redelegation index references missing record ({}, {}, {})",
                        delegator, src, dst
                    ))
                })?;
            out.push(red);
        }
        Ok(out)
    }

    /// All redelegations of a delegator, optionally narrowed to one source.
    pub fn get_redelegations(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        src: Option<&Address>,
    ) -> Result<Vec<Redelegation>, StakingError> {
        let prefix = match src {
            Some(src) => keys::redelegations_from_prefix(delegator, src),
            None => keys::redelegations_prefix(delegator),
        };
        ctx.store()
            .prefix_scan(&prefix)?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(StakingError::from))
            .collect()
    }

    pub fn get_all_redelegations(&self, ctx: &Context<'_>) -> Result<Vec<Redelegation>, StakingError> {
        ctx.store()
            .prefix_scan(&[keys::REDELEGATION_KEY])?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(StakingError::from))
            .collect()
    }

    /// Whether `delegator` has an open redelegation into `validator`.
    pub fn has_receiving_redelegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<bool, StakingError> {
        Ok(!ctx
            .store()
            .prefix_scan(&keys::redelegations_by_dst_prefix(validator, delegator))?
            .is_empty())
    }

    pub fn has_max_redelegation_entries(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        src: &Address,
        dst: &Address,
    ) -> Result<bool, StakingError> {
        let max = self.params(ctx)?.max_entries as usize;
        Ok(match self.get_redelegation(ctx, delegator, src, dst)? {
            Some(red) => red.entries.len() >= max,
            None => false,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_redelegation_entry(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        src: &Address,
        dst: &Address,
        creation_height: u64,
        completion_time: DateTime<Utc>,
        balance: Amount,
        shares_dst: Decimal,
    ) -> Result<Redelegation, StakingError> {
        let mut red = self
            .get_redelegation(ctx, delegator, src, dst)?
            .unwrap_or_else(|| Redelegation::new(*delegator, *src, *dst));
        red.add_entry(creation_height, completion_time, balance, shares_dst);
        self.set_redelegation(ctx, &red)?;
        Ok(red)
    }

    pub fn get_red_queue_time_slice(
        &self,
        ctx: &Context<'_>,
        time: DateTime<Utc>,
    ) -> Result<Vec<DvvTriplet>, StakingError> {
        Ok(get_json(ctx.store(), &keys::redelegation_queue_key(time))?.unwrap_or_default())
    }

    pub fn insert_red_queue(
        &self,
        ctx: &mut Context<'_>,
        red: &Redelegation,
        completion_time: DateTime<Utc>,
    ) -> Result<(), StakingError> {
        let mut slice = self.get_red_queue_time_slice(ctx, completion_time)?;
        slice.push(DvvTriplet {
            delegator_address: red.delegator_address,
            validator_src_address: red.validator_src_address,
            validator_dst_address: red.validator_dst_address,
        });
        set_json(ctx.store_mut(), &keys::redelegation_queue_key(completion_time), &slice)
    }

    /// Remove and return every queued triplet whose completion time is at or
    /// before the block time, oldest first.
    pub fn dequeue_all_mature_red_queue(
        &self,
        ctx: &mut Context<'_>,
    ) -> Result<Vec<DvvTriplet>, StakingError> {
        let start = [keys::REDELEGATION_QUEUE_KEY];
        let end = bastion_core::prefix_end(&keys::redelegation_queue_key(ctx.block_time()));
        let slots = ctx.store().range(&start, end.as_deref(), bastion_core::Order::Ascending)?;
        let mut out = Vec::new();
        for (key, value) in slots {
            let triplets: Vec<DvvTriplet> = serde_json::from_slice(&value)?;
            out.extend(triplets);
            ctx.store_mut().delete(&key)?;
        }
        Ok(out)
    }

    /// Completion time and creation height for a redelegation out of a
    /// validator with `status`, and whether it completes immediately.
    fn redelegation_begin_info(
        &self,
        ctx: &Context<'_>,
        status: BondStatus,
        unbonding_height: u64,
        unbonding_time: DateTime<Utc>,
    ) -> Result<(DateTime<Utc>, u64, bool), StakingError> {
        Ok(match status {
            BondStatus::Bonded => (
                self.params(ctx)?.unbonding_completion(ctx.block_time())?,
                ctx.height(),
                false,
            ),
            BondStatus::Unbonding => (unbonding_time, unbonding_height, false),
            BondStatus::Unbonded => (ctx.block_time(), ctx.height(), true),
        })
    }

    /// Move `shares` of a delegation from `src` to `dst`. Returns the
    /// completion time of the slashing window.
    pub fn begin_redelegation(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        src: &Address,
        dst: &Address,
        shares: Decimal,
    ) -> Result<DateTime<Utc>, StakingError> {
        if src == dst {
            return Err(StakingError::SelfRedelegation { validator: *src });
        }
        self.must_get_validator(ctx, dst)?;
        let src_validator = self.must_get_validator(ctx, src)?;

        // Stake that arrived at `src` by redelegation must mature first.
        if self.has_receiving_redelegation(ctx, delegator, src)? {
            return Err(StakingError::TransitiveRedelegation {
                delegator: *delegator,
                src: *src,
            });
        }
        if self.has_max_redelegation_entries(ctx, delegator, src, dst)? {
            return Err(StakingError::MaxRedelegationEntries {
                delegator: *delegator,
                src: *src,
                dst: *dst,
                max: self.params(ctx)?.max_entries,
            });
        }

        let amount = self.unbond(ctx, delegator, src, shares)?;
        if amount == 0 {
            return Err(StakingError::TinyRedelegationAmount);
        }
        let shares_dst = self.delegate(ctx, delegator, amount, src_validator.status, dst, false)?;

        let (completion_time, height, complete_now) = self.redelegation_begin_info(
            ctx,
            src_validator.status,
            src_validator.unbonding_height,
            src_validator.unbonding_time,
        )?;
        if complete_now {
            debug!(
                "Redelegation of {} from unbonded {} to {} completed immediately",
                amount, src, dst
            );
            return Ok(completion_time);
        }

        let red = self.set_redelegation_entry(
            ctx,
            delegator,
            src,
            dst,
            height,
            completion_time,
            amount,
            shares_dst,
        )?;
        self.insert_red_queue(ctx, &red, completion_time)?;
        debug!(
            "Redelegated {} from {} to {} for {}, slashable until {}",
            amount, src, dst, delegator, completion_time
        );
        Ok(completion_time)
    }

    /// Drop matured entries of a redelegation. Returns false when the
    /// record no longer exists.
    pub fn complete_redelegation(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        src: &Address,
        dst: &Address,
    ) -> Result<bool, StakingError> {
        let Some(mut red) = self.get_redelegation(ctx, delegator, src, dst)? else {
            return Ok(false);
        };
        let now = ctx.block_time();
        red.entries.retain(|e| !e.is_mature(now));
        if red.entries.is_empty() {
            self.remove_redelegation(ctx, &red)?;
        } else {
            self.set_redelegation(ctx, &red)?;
        }
        ctx.emit_event(
            Event::new(events::EVENT_TYPE_COMPLETE_REDELEGATION)
                .attr(events::ATTRIBUTE_KEY_DELEGATOR, delegator)
                .attr(events::ATTRIBUTE_KEY_SRC_VALIDATOR, src)
                .attr(events::ATTRIBUTE_KEY_DST_VALIDATOR, dst),
        );
        self.remove_validator_if_unreferenced(ctx, src)?;
        self.remove_validator_if_unreferenced(ctx, dst)?;
        Ok(true)
    }
}
