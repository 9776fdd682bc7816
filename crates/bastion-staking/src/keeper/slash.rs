// crates/bastion-staking/src/keeper/slash.rs
//
// Slashing propagation.
//
// A slash destroys `floor(power * factor) * power_reduction` tokens, capped
// at the validator's tokens at the infraction height. In-flight stake that
// was still attached to the validator at that height is charged first:
// unbonding entries and redelegation entries created at or after the
// infraction height and not yet matured each lose `factor` of their initial
// balance, within what remains of the budget. The validator's current
// tokens absorb the rest. Shares are never touched, so the exchange rate
// of every current delegator falls proportionally. A validator slashed to
// zero tokens has its delegations closed instead.
//
// Amounts are charged in the order they are destroyed, so the sum of entry
// reductions and the direct reduction equals the slash amount whenever the
// validator still holds enough tokens to cover the remainder.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use bastion_core::{Amount, Coin, ConsAddress, Context, Event};

use super::{pool_for, Keeper};
use crate::bank::NOT_BONDED_POOL_NAME;
use crate::delegation::{Redelegation, UnbondingDelegation};
use crate::error::StakingError;
use crate::events;
use crate::hooks::StakingHooks;
use crate::math::{floor_amount, mul_div, truncate};
use crate::validator::Validator;

impl Keeper {
    /// Slash the validator bound to `cons` for an infraction committed at
    /// `infraction_height` with `power`. Returns the tokens destroyed.
    pub fn slash(
        &self,
        ctx: &mut Context<'_>,
        cons: &ConsAddress,
        infraction_height: u64,
        power: u64,
        slash_factor: Decimal,
    ) -> Result<Amount, StakingError> {
        if slash_factor.is_sign_negative() || slash_factor > Decimal::ONE {
            return Err(StakingError::InvalidSlash(format!(
                "slash factor {} must be within [0, 1]",
                slash_factor
            )));
        }
        if infraction_height > ctx.height() {
            return Err(StakingError::InvalidSlash(format!(
                "infraction height {} is in the future (current {})",
                infraction_height,
                ctx.height()
            )));
        }

        let params = self.params(ctx)?;
        let Some(validator) = self.get_validator_by_cons_addr(ctx, cons)? else {
            // The validator may have unbonded and been removed since the
            // infraction; there is nothing left to slash.
            warn!(
                "Ignored slash of unknown validator {} at height {}",
                cons, infraction_height
            );
            return Ok(0);
        };
        if validator.is_unbonded() {
            return Err(StakingError::InvalidSlash(format!(
                "validator {} is unbonded",
                validator.operator_address
            )));
        }
        let operator = validator.operator_address;

        let power_slashed = floor_amount(Decimal::from(power) * slash_factor)?;
        let amount = power_slashed
            .checked_mul(params.power_reduction)
            .ok_or(StakingError::ArithmeticOverflow("slash amount"))?;
        let tokens_at_infraction = match self.get_historical_info(ctx, infraction_height)? {
            Some(info) => info.tokens_of(&operator).unwrap_or(validator.tokens),
            None => validator.tokens,
        };
        let slash_amount = amount.min(tokens_at_infraction);

        self.hooks()
            .before_validator_slashed(ctx, &operator, slash_factor)?;

        let mut remaining = slash_amount;
        if infraction_height < ctx.height() {
            for ubd in self.get_unbonding_delegations_from_validator(ctx, &operator)? {
                let charged = self.slash_unbonding_delegation(
                    ctx,
                    ubd,
                    infraction_height,
                    slash_factor,
                    remaining,
                )?;
                remaining -= charged;
            }
            for red in self.get_redelegations_from_src_validator(ctx, &operator)? {
                let charged =
                    self.slash_redelegation(ctx, red, infraction_height, slash_factor, remaining)?;
                remaining -= charged;
            }
        }

        let validator = self.must_get_validator(ctx, &operator)?;
        let direct = remaining.min(validator.tokens);
        let validator = self.remove_validator_tokens(ctx, validator, direct)?;
        let denom = params.bond_denom.clone();
        self.bank().burn_coins(
            ctx,
            pool_for(validator.status),
            &Coin::new(denom.clone(), direct),
        )?;

        // Nothing backs the remaining shares once the tokens are gone.
        let validator = if validator.tokens == 0 && !validator.delegator_shares.is_zero() {
            self.close_share_ledger(ctx, validator)?
        } else {
            validator
        };

        let validator = if validator.is_bonded()
            && !validator.jailed
            && validator.potential_consensus_power(params.power_reduction) == 0
        {
            self.jail_validator(ctx, validator)?
        } else {
            validator
        };

        let burned = slash_amount - remaining + direct;
        ctx.emit_event(
            Event::new(events::EVENT_TYPE_SLASH)
                .attr(events::ATTRIBUTE_KEY_VALIDATOR, operator)
                .attr(events::ATTRIBUTE_KEY_CONS_ADDRESS, cons)
                .attr(events::ATTRIBUTE_KEY_INFRACTION_HEIGHT, infraction_height)
                .attr(events::ATTRIBUTE_KEY_POWER, power)
                .attr(events::ATTRIBUTE_KEY_SLASH_FACTOR, slash_factor)
                .attr(events::ATTRIBUTE_KEY_BURNED, Coin::new(denom, burned)),
        );
        info!(
            "Slashed validator {} by {} at infraction height {}: burned {} ({} direct), tokens now {}",
            operator, slash_factor, infraction_height, burned, direct, validator.tokens
        );
        Ok(burned)
    }

    /// Drop every delegation to a validator whose tokens were slashed to
    /// zero, and zero its delegator shares.
    fn close_share_ledger(
        &self,
        ctx: &mut Context<'_>,
        mut validator: Validator,
    ) -> Result<Validator, StakingError> {
        let operator = validator.operator_address;
        let delegations = self.get_validator_delegations(ctx, &operator)?;
        for delegation in &delegations {
            self.hooks().before_delegation_shares_modified(
                ctx,
                &delegation.delegator_address,
                &operator,
            )?;
            self.remove_delegation(ctx, delegation)?;
        }
        validator.delegator_shares = Decimal::ZERO;
        self.set_validator(ctx, &validator)?;
        info!(
            "Validator {} slashed to zero tokens; closed {} delegations",
            operator,
            delegations.len()
        );
        Ok(validator)
    }

    /// Charge the slashable entries of one unbonding delegation, spending at
    /// most `budget`. Returns the tokens burned.
    pub(crate) fn slash_unbonding_delegation(
        &self,
        ctx: &mut Context<'_>,
        mut ubd: UnbondingDelegation,
        infraction_height: u64,
        slash_factor: Decimal,
        budget: Amount,
    ) -> Result<Amount, StakingError> {
        let now = ctx.block_time();
        let mut burned: Amount = 0;
        for entry in ubd.entries.iter_mut() {
            // Stake that left before the infraction is not liable for it.
            if entry.creation_height < infraction_height || entry.is_mature(now) {
                continue;
            }
            let due = floor_amount(Decimal::from(entry.initial_balance) * slash_factor)?;
            let charge = due.min(entry.balance).min(budget - burned);
            if charge == 0 {
                continue;
            }
            entry.balance -= charge;
            burned += charge;
        }
        if burned == 0 {
            return Ok(0);
        }
        self.set_unbonding_delegation(ctx, &ubd)?;
        let denom = self.params(ctx)?.bond_denom;
        self.bank()
            .burn_coins(ctx, NOT_BONDED_POOL_NAME, &Coin::new(denom, burned))?;
        debug!(
            "Slashed unbonding delegation ({}, {}) by {}",
            ubd.delegator_address, ubd.validator_address, burned
        );
        Ok(burned)
    }

    /// Charge the slashable entries of one redelegation by unbonding the
    /// corresponding destination shares and burning the tokens they redeem.
    /// Returns the tokens burned.
    pub(crate) fn slash_redelegation(
        &self,
        ctx: &mut Context<'_>,
        mut red: Redelegation,
        infraction_height: u64,
        slash_factor: Decimal,
        budget: Amount,
    ) -> Result<Amount, StakingError> {
        let now = ctx.block_time();
        let delegator = red.delegator_address;
        let dst = red.validator_dst_address;
        let denom = self.params(ctx)?.bond_denom;
        let mut burned: Amount = 0;
        let mut modified = false;

        for i in 0..red.entries.len() {
            let entry = red.entries[i].clone();
            if entry.creation_height < infraction_height
                || entry.is_mature(now)
                || entry.initial_balance == 0
            {
                continue;
            }
            let due = floor_amount(Decimal::from(entry.initial_balance) * slash_factor)?;
            let charge = due.min(budget - burned);
            if charge == 0 {
                continue;
            }
            let Some(delegation) = self.get_delegation(ctx, &delegator, &dst)? else {
                continue;
            };
            let shares = truncate(mul_div(
                entry.shares_dst,
                Decimal::from(charge),
                Decimal::from(entry.initial_balance),
            )?)
            .min(delegation.shares);
            if shares.is_zero() {
                continue;
            }

            let dst_validator: Validator = self.must_get_validator(ctx, &dst)?;
            let tokens = self.unbond(ctx, &delegator, &dst, shares)?;
            let tokens = tokens.min(budget - burned);
            self.bank().burn_coins(
                ctx,
                pool_for(dst_validator.status),
                &Coin::new(denom.clone(), tokens),
            )?;
            burned += tokens;

            red.entries[i].shares_dst = (entry.shares_dst - shares).max(Decimal::ZERO);
            modified = true;
        }

        if modified {
            self.set_redelegation(ctx, &red)?;
            debug!(
                "Slashed redelegation ({}, {} -> {}) by {}",
                delegator, red.validator_src_address, dst, burned
            );
        }
        Ok(burned)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::bank::BONDED_POOL_NAME;
    use bastion_store::MemStore;
    use rust_decimal_macros::dec;

    #[test]
    fn test_slash_current_stake_only() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        k.set_params(&mut c, &unit_params()).unwrap();
        let op = create_validator(&k, &mut c, 1, 100);
        k.apply_and_return_validator_set_updates(&mut c).unwrap();

        let burned = k.slash(&mut c, &pubkey(1).address(), 1, 100, dec!(0.1)).unwrap();
        assert_eq!(burned, 10);
        let v = k.must_get_validator(&c, &op).unwrap();
        assert_eq!(v.tokens, 90);
        assert_eq!(v.delegator_shares, dec!(100));
        assert_eq!(
            k.bank().get_module_balance(&c, BONDED_POOL_NAME, DENOM).unwrap(),
            90
        );
    }

    #[test]
    fn test_slash_unknown_validator_is_ignored() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 5);
        k.set_params(&mut c, &unit_params()).unwrap();
        assert_eq!(
            k.slash(&mut c, &pubkey(9).address(), 1, 10, dec!(0.5)).unwrap(),
            0
        );
    }

    #[test]
    fn test_slash_rejects_bad_input() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        k.set_params(&mut c, &unit_params()).unwrap();
        create_validator(&k, &mut c, 1, 100);
        let cons = pubkey(1).address();
        assert!(matches!(
            k.slash(&mut c, &cons, 1, 100, dec!(1.5)),
            Err(StakingError::InvalidSlash(_))
        ));
        assert!(matches!(
            k.slash(&mut c, &cons, 7, 100, dec!(0.5)),
            Err(StakingError::InvalidSlash(_))
        ));
        // Still unbonded: never part of consensus.
        assert!(matches!(
            k.slash(&mut c, &cons, 1, 100, dec!(0.5)),
            Err(StakingError::InvalidSlash(_))
        ));
    }

    #[test]
    fn test_slash_reaches_unbonding_entries_after_infraction() {
        let k = keeper();
        let mut store = MemStore::new();
        {
            let mut c = ctx(&mut store, 1);
            k.set_params(&mut c, &unit_params()).unwrap();
            create_validator(&k, &mut c, 1, 100);
            fund(&mut c, &addr(5), 100);
            k.delegate(&mut c, &addr(5), 100, crate::validator::BondStatus::Unbonded, &addr(1), true)
                .unwrap();
            k.apply_and_return_validator_set_updates(&mut c).unwrap();
        }
        {
            let mut c = ctx(&mut store, 2);
            k.undelegate(&mut c, &addr(5), &addr(1), dec!(40)).unwrap();
        }
        let mut c = ctx(&mut store, 3);
        let burned = k.slash(&mut c, &pubkey(1).address(), 2, 200, dec!(0.5)).unwrap();
        assert_eq!(burned, 100);
        let ubd = k.get_unbonding_delegation(&c, &addr(5), &addr(1)).unwrap().unwrap();
        assert_eq!(ubd.entries[0].balance, 20);
        assert_eq!(k.must_get_validator(&c, &addr(1)).unwrap().tokens, 80);
    }

    #[test]
    fn test_entries_before_infraction_are_not_slashed() {
        let k = keeper();
        let mut store = MemStore::new();
        {
            let mut c = ctx(&mut store, 1);
            k.set_params(&mut c, &unit_params()).unwrap();
            create_validator(&k, &mut c, 1, 100);
            k.apply_and_return_validator_set_updates(&mut c).unwrap();
            k.undelegate(&mut c, &addr(1), &addr(1), dec!(20)).unwrap();
        }
        let mut c = ctx(&mut store, 3);
        k.slash(&mut c, &pubkey(1).address(), 2, 80, dec!(0.5)).unwrap();
        let ubd = k.get_unbonding_delegation(&c, &addr(1), &addr(1)).unwrap().unwrap();
        assert_eq!(ubd.entries[0].balance, 20);
        assert_eq!(k.must_get_validator(&c, &addr(1)).unwrap().tokens, 40);
    }

    #[test]
    fn test_slash_to_zero_power_jails() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        let params = crate::params::Params {
            power_reduction: 10,
            ..unit_params()
        };
        k.set_params(&mut c, &params).unwrap();
        let op = create_validator(&k, &mut c, 1, 15);
        k.apply_and_return_validator_set_updates(&mut c).unwrap();
        k.slash(&mut c, &pubkey(1).address(), 1, 1, dec!(1)).unwrap();
        let v = k.must_get_validator(&c, &op).unwrap();
        assert_eq!(v.tokens, 5);
        assert!(v.jailed);
    }

    #[test]
    fn test_full_slash_closes_share_ledger() {
        let k = keeper();
        let mut store = MemStore::new();
        {
            let mut c = ctx(&mut store, 1);
            k.set_params(&mut c, &unit_params()).unwrap();
            let op = create_validator(&k, &mut c, 1, 100);
            fund(&mut c, &addr(5), 50);
            k.delegate(&mut c, &addr(5), 50, crate::validator::BondStatus::Unbonded, &op, true)
                .unwrap();
            k.apply_and_return_validator_set_updates(&mut c).unwrap();

            let burned = k.slash(&mut c, &pubkey(1).address(), 1, 150, dec!(1)).unwrap();
            assert_eq!(burned, 150);
            let v = k.must_get_validator(&c, &op).unwrap();
            assert_eq!(v.tokens, 0);
            assert!(v.delegator_shares.is_zero());
            assert!(v.jailed);
            assert!(k.get_validator_delegations(&c, &op).unwrap().is_empty());
            assert!(k.tokens_shares_invariant(&c).unwrap().is_empty());
            assert_eq!(k.all_invariants(&c).unwrap(), Vec::<String>::new());

            k.apply_and_return_validator_set_updates(&mut c).unwrap();
            assert!(k.must_get_validator(&c, &op).unwrap().is_unbonding());
        }
        // Unbonding time is 100s and blocks are 5s apart: matures at height 21.
        let mut c = ctx(&mut store, 21);
        k.unbond_all_mature_validators(&mut c).unwrap();
        assert!(k.get_validator(&c, &addr(1)).unwrap().is_none());
    }
}
