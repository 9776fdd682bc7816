// crates/bastion-staking/src/keeper/val_state_change.rs
//
// Validator status transitions and the per-block validator-set diff.
//
// Transitions:
//   Unbonded  -> Bonded     tokens move not-bonded pool -> bonded pool
//   Unbonding -> Bonded     same, and the validator leaves the unbonding queue
//   Bonded    -> Unbonding  tokens move bonded pool -> not-bonded pool, the
//                           validator enters the unbonding queue
//   Unbonding -> Unbonded   when the unbonding queue matures; no transfer
//
// The diff walks the power index in rank order, bonds the top
// `max_validators` candidates with non-zero power, and compares their
// powers against the last reported set. Validators that fell out of the
// top set are unbonded and reported with power zero, in operator order.

use std::collections::BTreeMap;

use tracing::{debug, info};

use bastion_core::{Address, Coin, ConsensusPubKey, Context, Event};

use super::{get_json, set_json, Keeper};
use crate::bank::{BONDED_POOL_NAME, NOT_BONDED_POOL_NAME};
use crate::error::StakingError;
use crate::events;
use crate::hooks::StakingHooks;
use crate::keys;
use crate::validator::{BondStatus, Validator, ValidatorUpdate};

impl Keeper {
    /// Compute the consensus power changes since the last call and make the
    /// new top set the bonded set.
    pub fn apply_and_return_validator_set_updates(
        &self,
        ctx: &mut Context<'_>,
    ) -> Result<Vec<ValidatorUpdate>, StakingError> {
        let params = self.params(ctx)?;
        let max = params.max_validators as usize;
        let pr = params.power_reduction;

        let mut last: BTreeMap<Address, u64> = self.get_last_validator_powers(ctx)?;
        let rotated = self.pending_rotations(ctx)?;
        let mut updates = Vec::new();
        let mut total_power: u64 = 0;
        let mut count = 0usize;

        for operator in self.validators_by_power(ctx)? {
            if count >= max {
                break;
            }
            let mut validator = self.must_get_validator(ctx, &operator)?;
            if validator.jailed {
                return Err(StakingError::Corrupted(format!(
                    "jailed validator {} found in power index",
                    operator
                )));
            }
            // The index is sorted, so everything after a zero is zero too.
            if validator.potential_consensus_power(pr) == 0 {
                break;
            }

            validator = match validator.status {
                BondStatus::Unbonded => self.unbonded_to_bonded(ctx, validator)?,
                BondStatus::Unbonding => self.unbonding_to_bonded(ctx, validator)?,
                BondStatus::Bonded => validator,
            };

            let new_power = validator.consensus_power(pr);
            let old_power = last.remove(&operator);
            match (old_power, rotated.get(&operator)) {
                (Some(_), Some(old_key)) => {
                    updates.push(ValidatorUpdate {
                        pub_key: old_key.clone(),
                        power: 0,
                    });
                    updates.push(ValidatorUpdate {
                        pub_key: validator.consensus_pubkey.clone(),
                        power: new_power,
                    });
                    self.set_last_validator_power(ctx, &operator, new_power)?;
                }
                (old, _) if old != Some(new_power) => {
                    updates.push(ValidatorUpdate {
                        pub_key: validator.consensus_pubkey.clone(),
                        power: new_power,
                    });
                    self.set_last_validator_power(ctx, &operator, new_power)?;
                }
                _ => {}
            }

            count += 1;
            total_power = total_power
                .checked_add(new_power)
                .ok_or(StakingError::ArithmeticOverflow("total power"))?;
        }

        // Whatever is left in `last` was bonded and no longer is.
        for operator in last.keys() {
            let validator = self.must_get_validator(ctx, operator)?;
            let reported_key = rotated
                .get(operator)
                .cloned()
                .unwrap_or_else(|| validator.consensus_pubkey.clone());
            if validator.is_bonded() {
                self.bonded_to_unbonding(ctx, validator)?;
            }
            self.delete_last_validator_power(ctx, operator)?;
            updates.push(ValidatorUpdate {
                pub_key: reported_key,
                power: 0,
            });
        }

        self.set_last_total_power(ctx, total_power)?;
        self.clear_pending_rotations(ctx)?;

        if !updates.is_empty() {
            info!(
                "Validator set updated at height {}: {} changes, total power {}",
                ctx.height(),
                updates.len(),
                total_power
            );
        }
        Ok(updates)
    }

    /// Perform one of the permitted status transitions.
    pub fn set_status(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        to: BondStatus,
    ) -> Result<Validator, StakingError> {
        let validator = self.must_get_validator(ctx, operator)?;
        match (validator.status, to) {
            (BondStatus::Unbonded, BondStatus::Bonded) => self.unbonded_to_bonded(ctx, validator),
            (BondStatus::Unbonding, BondStatus::Bonded) => self.unbonding_to_bonded(ctx, validator),
            (BondStatus::Bonded, BondStatus::Unbonding) => self.bonded_to_unbonding(ctx, validator),
            (BondStatus::Unbonding, BondStatus::Unbonded) => {
                self.unbonding_to_unbonded(ctx, validator)
            }
            (from, to) => Err(StakingError::InvalidStatusTransition {
                operator: *operator,
                from,
                to,
            }),
        }
    }

    fn unbonded_to_bonded(
        &self,
        ctx: &mut Context<'_>,
        validator: Validator,
    ) -> Result<Validator, StakingError> {
        self.expect_status(&validator, BondStatus::Unbonded, BondStatus::Bonded)?;
        self.bond_validator(ctx, validator)
    }

    fn unbonding_to_bonded(
        &self,
        ctx: &mut Context<'_>,
        validator: Validator,
    ) -> Result<Validator, StakingError> {
        self.expect_status(&validator, BondStatus::Unbonding, BondStatus::Bonded)?;
        self.bond_validator(ctx, validator)
    }

    fn bonded_to_unbonding(
        &self,
        ctx: &mut Context<'_>,
        validator: Validator,
    ) -> Result<Validator, StakingError> {
        self.expect_status(&validator, BondStatus::Bonded, BondStatus::Unbonding)?;
        self.begin_unbonding_validator(ctx, validator)
    }

    fn unbonding_to_unbonded(
        &self,
        ctx: &mut Context<'_>,
        mut validator: Validator,
    ) -> Result<Validator, StakingError> {
        self.expect_status(&validator, BondStatus::Unbonding, BondStatus::Unbonded)?;
        self.delete_validator_queue(ctx, &validator)?;
        validator.status = BondStatus::Unbonded;
        self.set_validator(ctx, &validator)?;
        self.emit_status_event(ctx, &validator);
        debug!("Validator {} is now unbonded", validator.operator_address);
        Ok(validator)
    }

    fn expect_status(
        &self,
        validator: &Validator,
        from: BondStatus,
        to: BondStatus,
    ) -> Result<(), StakingError> {
        if validator.status != from {
            return Err(StakingError::InvalidStatusTransition {
                operator: validator.operator_address,
                from: validator.status,
                to,
            });
        }
        Ok(())
    }

    fn bond_validator(
        &self,
        ctx: &mut Context<'_>,
        mut validator: Validator,
    ) -> Result<Validator, StakingError> {
        if validator.is_unbonding() {
            self.delete_validator_queue(ctx, &validator)?;
        }
        self.move_pool_tokens(ctx, validator.tokens, NOT_BONDED_POOL_NAME, BONDED_POOL_NAME)?;
        validator.status = BondStatus::Bonded;
        self.set_validator(ctx, &validator)?;
        self.emit_status_event(ctx, &validator);
        self.hooks().after_validator_bonded(
            ctx,
            &validator.cons_address(),
            &validator.operator_address,
        )?;
        info!(
            "Validator {} bonded with {} tokens",
            validator.operator_address, validator.tokens
        );
        Ok(validator)
    }

    fn begin_unbonding_validator(
        &self,
        ctx: &mut Context<'_>,
        mut validator: Validator,
    ) -> Result<Validator, StakingError> {
        let params = self.params(ctx)?;
        self.move_pool_tokens(ctx, validator.tokens, BONDED_POOL_NAME, NOT_BONDED_POOL_NAME)?;
        validator.status = BondStatus::Unbonding;
        validator.unbonding_height = ctx.height();
        validator.unbonding_time = params.unbonding_completion(ctx.block_time())?;
        self.set_validator(ctx, &validator)?;
        self.insert_unbonding_validator_queue(ctx, &validator)?;
        self.emit_status_event(ctx, &validator);
        self.hooks().after_validator_begin_unbonding(
            ctx,
            &validator.cons_address(),
            &validator.operator_address,
        )?;
        info!(
            "Validator {} began unbonding, matures at {}",
            validator.operator_address, validator.unbonding_time
        );
        Ok(validator)
    }

    fn move_pool_tokens(
        &self,
        ctx: &mut Context<'_>,
        amount: u64,
        from: &str,
        to: &str,
    ) -> Result<(), StakingError> {
        let denom = self.params(ctx)?.bond_denom;
        self.bank()
            .send_coins_from_module_to_module(ctx, from, to, &Coin::new(denom, amount))
    }

    fn emit_status_event(&self, ctx: &mut Context<'_>, validator: &Validator) {
        ctx.emit_event(
            Event::new(events::EVENT_TYPE_VALIDATOR_STATUS)
                .attr(events::ATTRIBUTE_KEY_VALIDATOR, validator.operator_address)
                .attr(events::ATTRIBUTE_KEY_STATUS, validator.status),
        );
    }

    fn insert_unbonding_validator_queue(
        &self,
        ctx: &mut Context<'_>,
        validator: &Validator,
    ) -> Result<(), StakingError> {
        let key = keys::validator_queue_key(validator.unbonding_time, validator.unbonding_height);
        let mut operators: Vec<Address> = get_json(ctx.store(), &key)?.unwrap_or_default();
        operators.push(validator.operator_address);
        set_json(ctx.store_mut(), &key, &operators)
    }

    fn delete_validator_queue(
        &self,
        ctx: &mut Context<'_>,
        validator: &Validator,
    ) -> Result<(), StakingError> {
        let key = keys::validator_queue_key(validator.unbonding_time, validator.unbonding_height);
        let mut operators: Vec<Address> = get_json(ctx.store(), &key)?.unwrap_or_default();
        operators.retain(|op| op != &validator.operator_address);
        if operators.is_empty() {
            ctx.store_mut().delete(&key)?;
            Ok(())
        } else {
            set_json(ctx.store_mut(), &key, &operators)
        }
    }

    /// Finish unbonding for every validator whose unbonding time and height
    /// have both passed, removing those left empty and unreferenced.
    pub fn unbond_all_mature_validators(&self, ctx: &mut Context<'_>) -> Result<(), StakingError> {
        let now = ctx.block_time();
        let height = ctx.height();
        let start = [keys::VALIDATOR_QUEUE_KEY];
        let end = bastion_core::prefix_end(&{
            let mut k = vec![keys::VALIDATOR_QUEUE_KEY];
            k.extend_from_slice(&keys::time_bytes(now));
            k
        });
        let slots = ctx
            .store()
            .range(&start, end.as_deref(), bastion_core::Order::Ascending)?;

        for (key, value) in slots {
            if keys::height_from_validator_queue_key(&key)? > height {
                continue;
            }
            let operators: Vec<Address> = serde_json::from_slice(&value)?;
            for operator in operators {
                let Some(validator) = self.get_validator(ctx, &operator)? else {
                    continue;
                };
                if !validator.is_unbonding()
                    || validator.unbonding_time > now
                    || validator.unbonding_height > height
                {
                    continue;
                }
                self.unbonding_to_unbonded(ctx, validator)?;
                self.remove_validator_if_unreferenced(ctx, &operator)?;
            }
            ctx.store_mut().delete(&key)?;
        }
        Ok(())
    }

    /// Old keys of validators that rotated since the last set update.
    pub(crate) fn pending_rotations(
        &self,
        ctx: &Context<'_>,
    ) -> Result<BTreeMap<Address, ConsensusPubKey>, StakingError> {
        let mut out = BTreeMap::new();
        for (key, value) in ctx
            .store()
            .prefix_scan(&[keys::PENDING_CONS_PUBKEY_ROTATION_KEY])?
        {
            out.insert(keys::address_at(&key, 1)?, serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn clear_pending_rotations(&self, ctx: &mut Context<'_>) -> Result<(), StakingError> {
        for (key, _) in ctx
            .store()
            .prefix_scan(&[keys::PENDING_CONS_PUBKEY_ROTATION_KEY])?
        {
            ctx.store_mut().delete(&key)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use bastion_store::MemStore;

    #[test]
    fn test_first_update_bonds_top_validators() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        k.set_params(&mut c, &unit_params()).unwrap();
        create_validator(&k, &mut c, 1, 100);
        create_validator(&k, &mut c, 2, 50);

        let updates = k.apply_and_return_validator_set_updates(&mut c).unwrap();
        assert_eq!(
            updates,
            vec![
                ValidatorUpdate { pub_key: pubkey(1), power: 100 },
                ValidatorUpdate { pub_key: pubkey(2), power: 50 },
            ]
        );
        assert_eq!(k.get_last_total_power(&c).unwrap(), 150);
        assert_eq!(
            k.bank().get_module_balance(&c, BONDED_POOL_NAME, DENOM).unwrap(),
            150
        );
        assert!(k.apply_and_return_validator_set_updates(&mut c).unwrap().is_empty());
    }

    #[test]
    fn test_displaced_validator_reports_zero_and_unbonds() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        let params = crate::params::Params {
            max_validators: 1,
            ..unit_params()
        };
        k.set_params(&mut c, &params).unwrap();
        create_validator(&k, &mut c, 1, 100);
        k.apply_and_return_validator_set_updates(&mut c).unwrap();

        create_validator(&k, &mut c, 2, 200);
        let updates = k.apply_and_return_validator_set_updates(&mut c).unwrap();
        assert_eq!(
            updates,
            vec![
                ValidatorUpdate { pub_key: pubkey(2), power: 200 },
                ValidatorUpdate { pub_key: pubkey(1), power: 0 },
            ]
        );
        let v1 = k.must_get_validator(&c, &addr(1)).unwrap();
        assert_eq!(v1.status, BondStatus::Unbonding);
        assert_eq!(v1.unbonding_height, 1);
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        k.set_params(&mut c, &unit_params()).unwrap();
        let op = create_validator(&k, &mut c, 1, 10);
        let err = k.set_status(&mut c, &op, BondStatus::Unbonding).unwrap_err();
        assert!(matches!(
            err,
            StakingError::InvalidStatusTransition {
                from: BondStatus::Unbonded,
                to: BondStatus::Unbonding,
                ..
            }
        ));
    }

    #[test]
    fn test_mature_validator_becomes_unbonded() {
        let k = keeper();
        let mut store = MemStore::new();
        {
            let mut c = ctx(&mut store, 1);
            k.set_params(&mut c, &unit_params()).unwrap();
            create_validator(&k, &mut c, 1, 10);
            k.apply_and_return_validator_set_updates(&mut c).unwrap();
            k.set_status(&mut c, &addr(1), BondStatus::Unbonding).unwrap();
        }
        {
            let mut c = ctx(&mut store, 2);
            k.unbond_all_mature_validators(&mut c).unwrap();
            assert!(k.must_get_validator(&c, &addr(1)).unwrap().is_unbonding());
        }
        // 100s unbonding at 5s blocks
        let mut c = ctx(&mut store, 21);
        k.unbond_all_mature_validators(&mut c).unwrap();
        assert!(k.must_get_validator(&c, &addr(1)).unwrap().is_unbonded());
    }
}
