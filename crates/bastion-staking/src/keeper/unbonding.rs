// crates/bastion-staking/src/keeper/unbonding.rs
//
// Unbonding delegations and their maturity queue.
//
// Each undelegation appends an entry to the (delegator, validator) record
// and a DvPair to the queue slot for its completion time. Slots are
// scanned in key order (completion time) and each slot keeps insertion
// order, so maturation order is fully determined by the message order.

use chrono::{DateTime, Utc};
use tracing::debug;

use bastion_core::{Address, Amount, Coin, Context, Event};

use super::{get_json, set_json, Keeper};
use crate::bank::NOT_BONDED_POOL_NAME;
use crate::delegation::{DvPair, UnbondingDelegation};
use crate::error::StakingError;
use crate::events;
use crate::keys;
use crate::validator::BondStatus;

impl Keeper {
    pub fn get_unbonding_delegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<Option<UnbondingDelegation>, StakingError> {
        get_json(ctx.store(), &keys::unbonding_delegation_key(delegator, validator))
    }

    pub fn set_unbonding_delegation(
        &self,
        ctx: &mut Context<'_>,
        ubd: &UnbondingDelegation,
    ) -> Result<(), StakingError> {
        let (del, val) = (&ubd.delegator_address, &ubd.validator_address);
        set_json(ctx.store_mut(), &keys::unbonding_delegation_key(del, val), ubd)?;
        ctx.store_mut()
            .set(&keys::unbonding_delegation_by_val_key(val, del), &[])?;
        Ok(())
    }

    pub fn remove_unbonding_delegation(
        &self,
        ctx: &mut Context<'_>,
        ubd: &UnbondingDelegation,
    ) -> Result<(), StakingError> {
        let (del, val) = (&ubd.delegator_address, &ubd.validator_address);
        ctx.store_mut()
            .delete(&keys::unbonding_delegation_key(del, val))?;
        ctx.store_mut()
            .delete(&keys::unbonding_delegation_by_val_key(val, del))?;
        Ok(())
    }

    /// Unbonding delegations out of one validator, ordered by delegator.
    pub fn get_unbonding_delegations_from_validator(
        &self,
        ctx: &Context<'_>,
        validator: &Address,
    ) -> Result<Vec<UnbondingDelegation>, StakingError> {
        let mut out = Vec::new();
        for (key, _) in ctx
            .store()
            .prefix_scan(&keys::unbonding_delegations_by_val_prefix(validator))?
        {
            let delegator = keys::address_at(&key, 1 + bastion_core::ADDRESS_LEN)?;
            let ubd = self
                .get_unbonding_delegation(ctx, &delegator, validator)?
                .ok_or_else(|| {
                    StakingError::Corrupted(format!(
                        "unbonding index references missing record ({}, {})",
                        delegator, validator
                    ))
                })?;
            out.push(ubd);
        }
        Ok(out)
    }

    pub fn get_delegator_unbonding_delegations(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
    ) -> Result<Vec<UnbondingDelegation>, StakingError> {
        ctx.store()
            .prefix_scan(&keys::unbonding_delegations_prefix(delegator))?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(StakingError::from))
            .collect()
    }

    pub fn get_all_unbonding_delegations(
        &self,
        ctx: &Context<'_>,
    ) -> Result<Vec<UnbondingDelegation>, StakingError> {
        ctx.store()
            .prefix_scan(&[keys::UNBONDING_DELEGATION_KEY])?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(StakingError::from))
            .collect()
    }

    pub fn has_max_unbonding_delegation_entries(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<bool, StakingError> {
        let max = self.params(ctx)?.max_entries as usize;
        Ok(match self.get_unbonding_delegation(ctx, delegator, validator)? {
            Some(ubd) => ubd.entries.len() >= max,
            None => false,
        })
    }

    /// Append an entry, creating the record if needed.
    pub fn set_unbonding_delegation_entry(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
        creation_height: u64,
        completion_time: DateTime<Utc>,
        balance: Amount,
    ) -> Result<UnbondingDelegation, StakingError> {
        let mut ubd = self
            .get_unbonding_delegation(ctx, delegator, validator)?
            .unwrap_or_else(|| UnbondingDelegation::new(*delegator, *validator));
        ubd.add_entry(creation_height, completion_time, balance);
        self.set_unbonding_delegation(ctx, &ubd)?;
        Ok(ubd)
    }

    pub fn get_ubd_queue_time_slice(
        &self,
        ctx: &Context<'_>,
        time: DateTime<Utc>,
    ) -> Result<Vec<DvPair>, StakingError> {
        Ok(get_json(ctx.store(), &keys::unbonding_queue_key(time))?.unwrap_or_default())
    }

    pub fn insert_ubd_queue(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
        completion_time: DateTime<Utc>,
    ) -> Result<(), StakingError> {
        let mut slice = self.get_ubd_queue_time_slice(ctx, completion_time)?;
        slice.push(DvPair {
            delegator_address: *delegator,
            validator_address: *validator,
        });
        set_json(ctx.store_mut(), &keys::unbonding_queue_key(completion_time), &slice)
    }

    /// Remove and return every queued pair whose completion time is at or
    /// before the block time, oldest first.
    pub fn dequeue_all_mature_ubd_queue(
        &self,
        ctx: &mut Context<'_>,
    ) -> Result<Vec<DvPair>, StakingError> {
        let start = [keys::UNBONDING_QUEUE_KEY];
        let end = bastion_core::prefix_end(&keys::unbonding_queue_key(ctx.block_time()));
        let slots = ctx.store().range(&start, end.as_deref(), bastion_core::Order::Ascending)?;
        let mut out = Vec::new();
        for (key, value) in slots {
            let pairs: Vec<DvPair> = serde_json::from_slice(&value)?;
            out.extend(pairs);
            ctx.store_mut().delete(&key)?;
        }
        Ok(out)
    }

    /// Pay out every matured entry of a record from the not-bonded pool.
    /// Returns the total paid.
    pub fn complete_unbonding(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<Amount, StakingError> {
        let mut ubd = self
            .get_unbonding_delegation(ctx, delegator, validator)?
            .ok_or(StakingError::NoUnbondingDelegation {
                delegator: *delegator,
                validator: *validator,
            })?;
        let denom = self.params(ctx)?.bond_denom;
        let now = ctx.block_time();

        let mut paid: Amount = 0;
        let mut i = 0;
        while i < ubd.entries.len() {
            let entry = &ubd.entries[i];
            if !entry.is_mature(now) {
                i += 1;
                continue;
            }
            let balance = entry.balance;
            ubd.remove_entry(i);
            if balance > 0 {
                self.bank().send_coins_from_module_to_account(
                    ctx,
                    NOT_BONDED_POOL_NAME,
                    delegator,
                    &Coin::new(denom.clone(), balance),
                )?;
                paid = crate::math::checked_add(paid, balance, "unbonding payout")?;
            }
        }

        if ubd.entries.is_empty() {
            self.remove_unbonding_delegation(ctx, &ubd)?;
        } else {
            self.set_unbonding_delegation(ctx, &ubd)?;
        }

        ctx.emit_event(
            Event::new(events::EVENT_TYPE_COMPLETE_UNBONDING)
                .attr(events::ATTRIBUTE_KEY_AMOUNT, Coin::new(denom, paid))
                .attr(events::ATTRIBUTE_KEY_VALIDATOR, validator)
                .attr(events::ATTRIBUTE_KEY_DELEGATOR, delegator),
        );
        debug!("Completed unbonding of {} for {} from {}", paid, delegator, validator);
        self.remove_validator_if_unreferenced(ctx, validator)?;
        Ok(paid)
    }

    /// Return part or all of a pending unbonding entry to the validator.
    /// The entry is found by creation height and must not have matured.
    pub fn cancel_unbonding_delegation(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
        creation_height: u64,
        amount: Amount,
    ) -> Result<(), StakingError> {
        let validator = self.must_get_validator(ctx, operator)?;
        if validator.jailed {
            return Err(StakingError::ValidatorJailed { operator: *operator });
        }
        let mut ubd = self
            .get_unbonding_delegation(ctx, delegator, operator)?
            .ok_or(StakingError::NoUnbondingDelegation {
                delegator: *delegator,
                validator: *operator,
            })?;

        let now = ctx.block_time();
        let index = ubd
            .entries
            .iter()
            .position(|e| e.creation_height == creation_height && !e.is_mature(now))
            .ok_or(StakingError::UnbondingEntryNotFound { creation_height })?;
        let entry_balance = ubd.entries[index].balance;
        if amount == 0 || amount > entry_balance {
            return Err(StakingError::InvalidAmount(format!(
                "cancel amount {} must be within (0, {}]",
                amount, entry_balance
            )));
        }

        // Tokens sit in the not-bonded pool; delegate moves them back.
        self.delegate(ctx, delegator, amount, BondStatus::Unbonding, operator, false)?;

        let entry = &mut ubd.entries[index];
        entry.balance -= amount;
        entry.initial_balance = entry.initial_balance.saturating_sub(amount);
        if entry.balance == 0 {
            ubd.remove_entry(index);
        }
        if ubd.entries.is_empty() {
            self.remove_unbonding_delegation(ctx, &ubd)?;
        } else {
            self.set_unbonding_delegation(ctx, &ubd)?;
        }

        ctx.emit_event(
            Event::new(events::EVENT_TYPE_CANCEL_UNBONDING_DELEGATION)
                .attr(events::ATTRIBUTE_KEY_AMOUNT, amount)
                .attr(events::ATTRIBUTE_KEY_VALIDATOR, operator)
                .attr(events::ATTRIBUTE_KEY_DELEGATOR, delegator)
                .attr(events::ATTRIBUTE_KEY_CREATION_HEIGHT, creation_height),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use bastion_store::MemStore;
    use rust_decimal_macros::dec;

    #[test]
    fn test_max_entries_enforced() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1);
        let params = crate::params::Params {
            max_entries: 2,
            ..unit_params()
        };
        k.set_params(&mut ctx, &params).unwrap();
        let op = create_validator(&k, &mut ctx, 1, 100);

        k.undelegate(&mut ctx, &op, &op, dec!(1)).unwrap();
        k.undelegate(&mut ctx, &op, &op, dec!(1)).unwrap();
        let err = k.undelegate(&mut ctx, &op, &op, dec!(1)).unwrap_err();
        assert!(matches!(err, StakingError::MaxUnbondingDelegationEntries { max: 2, .. }));
    }

    #[test]
    fn test_queue_dequeues_only_mature_slots() {
        let k = keeper();
        let mut store = MemStore::new();
        let t0 = header(1).time;
        {
            let mut c = ctx(&mut store, 1);
            k.insert_ubd_queue(&mut c, &addr(1), &addr(2), t0).unwrap();
            k.insert_ubd_queue(&mut c, &addr(3), &addr(2), t0).unwrap();
            k.insert_ubd_queue(&mut c, &addr(4), &addr(2), t0 + chrono::Duration::days(1))
                .unwrap();
        }
        let mut c = ctx(&mut store, 1);
        let pairs = k.dequeue_all_mature_ubd_queue(&mut c).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].delegator_address, addr(1));
        assert_eq!(pairs[1].delegator_address, addr(3));
        assert!(k.dequeue_all_mature_ubd_queue(&mut c).unwrap().is_empty());
    }

    #[test]
    fn test_cancel_unbonding_restores_delegation() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1);
        k.set_params(&mut ctx, &unit_params()).unwrap();
        let op = create_validator(&k, &mut ctx, 1, 100);
        fund(&mut ctx, &addr(5), 40);
        k.delegate(&mut ctx, &addr(5), 40, BondStatus::Unbonded, &op, true)
            .unwrap();
        k.undelegate(&mut ctx, &addr(5), &op, dec!(20)).unwrap();

        k.cancel_unbonding_delegation(&mut ctx, &addr(5), &op, 1, 5).unwrap();
        let ubd = k.get_unbonding_delegation(&ctx, &addr(5), &op).unwrap().unwrap();
        assert_eq!(ubd.entries[0].balance, 15);
        assert_eq!(
            k.get_delegation(&ctx, &addr(5), &op).unwrap().unwrap().shares,
            dec!(25)
        );

        k.cancel_unbonding_delegation(&mut ctx, &addr(5), &op, 1, 15).unwrap();
        assert!(k.get_unbonding_delegation(&ctx, &addr(5), &op).unwrap().is_none());

        let err = k
            .cancel_unbonding_delegation(&mut ctx, &addr(5), &op, 1, 1)
            .unwrap_err();
        assert!(matches!(err, StakingError::NoUnbondingDelegation { .. }));
    }

    #[test]
    fn test_cancel_unknown_height_fails() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1);
        k.set_params(&mut ctx, &unit_params()).unwrap();
        let op = create_validator(&k, &mut ctx, 1, 100);
        k.undelegate(&mut ctx, &op, &op, dec!(10)).unwrap();
        let err = k
            .cancel_unbonding_delegation(&mut ctx, &op, &op, 99, 1)
            .unwrap_err();
        assert!(matches!(err, StakingError::UnbondingEntryNotFound { creation_height: 99 }));
    }

    #[test]
    fn test_cancel_after_completion_time_fails() {
        let k = keeper();
        let mut store = MemStore::new();
        let op = {
            let mut ctx = ctx(&mut store, 1);
            k.set_params(&mut ctx, &unit_params()).unwrap();
            let op = create_validator(&k, &mut ctx, 1, 100);
            k.undelegate(&mut ctx, &op, &op, dec!(10)).unwrap();
            op
        };

        // Completion is 5s + 100s, reached at height 21 before end block runs.
        let mut ctx = ctx(&mut store, 21);
        let err = k
            .cancel_unbonding_delegation(&mut ctx, &op, &op, 1, 1)
            .unwrap_err();
        assert!(matches!(err, StakingError::UnbondingEntryNotFound { creation_height: 1 }));
        let ubd = k.get_unbonding_delegation(&ctx, &op, &op).unwrap().unwrap();
        assert_eq!(ubd.entries[0].balance, 10);
    }

    #[test]
    fn test_oversized_unbonding_time_refused_before_undelegation() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1);
        k.set_params(&mut ctx, &unit_params()).unwrap();
        let op = create_validator(&k, &mut ctx, 1, 100);

        let oversized = crate::params::Params {
            unbonding_time_secs: 10_000_000_000_000,
            ..unit_params()
        };
        let err = k.set_params(&mut ctx, &oversized).unwrap_err();
        assert!(matches!(err, StakingError::InvalidParams(_)));

        let (completion, amount) = k.undelegate(&mut ctx, &op, &op, dec!(10)).unwrap();
        assert_eq!(amount, 10);
        assert_eq!(completion, header(1).time + chrono::Duration::seconds(100));
    }
}
