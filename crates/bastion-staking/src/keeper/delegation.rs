// crates/bastion-staking/src/keeper/delegation.rs
//
// Delegation ledger: share-based accounting per (delegator, validator).
//
// Token movements between user accounts and the two pools happen here so
// that the pool holding a validator's tokens always matches its status.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};

use bastion_core::{Address, Amount, Coin, Context};

use super::{get_json, pool_for, set_json, Keeper};
use crate::bank::{BONDED_POOL_NAME, NOT_BONDED_POOL_NAME};
use crate::delegation::Delegation;
use crate::error::StakingError;
use crate::hooks::StakingHooks;
use crate::keys;
use crate::math::{self, floor_amount};
use crate::validator::{BondStatus, Validator};

impl Keeper {
    pub fn get_delegation(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        validator: &Address,
    ) -> Result<Option<Delegation>, StakingError> {
        get_json(ctx.store(), &keys::delegation_key(delegator, validator))
    }

    pub fn set_delegation(&self, ctx: &mut Context<'_>, delegation: &Delegation) -> Result<(), StakingError> {
        set_json(
            ctx.store_mut(),
            &keys::delegation_key(&delegation.delegator_address, &delegation.validator_address),
            delegation,
        )
    }

    pub fn remove_delegation(&self, ctx: &mut Context<'_>, delegation: &Delegation) -> Result<(), StakingError> {
        self.hooks().before_delegation_removed(
            ctx,
            &delegation.delegator_address,
            &delegation.validator_address,
        )?;
        ctx.store_mut().delete(&keys::delegation_key(
            &delegation.delegator_address,
            &delegation.validator_address,
        ))?;
        Ok(())
    }

    /// All delegations of one delegator, ordered by validator.
    pub fn get_delegator_delegations(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
    ) -> Result<Vec<Delegation>, StakingError> {
        ctx.store()
            .prefix_scan(&keys::delegations_prefix(delegator))?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(StakingError::from))
            .collect()
    }

    pub fn get_all_delegations(&self, ctx: &Context<'_>) -> Result<Vec<Delegation>, StakingError> {
        ctx.store()
            .prefix_scan(&[keys::DELEGATION_KEY])?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(StakingError::from))
            .collect()
    }

    /// Delegations to one validator, ordered by delegator.
    pub fn get_validator_delegations(
        &self,
        ctx: &Context<'_>,
        validator: &Address,
    ) -> Result<Vec<Delegation>, StakingError> {
        Ok(self
            .get_all_delegations(ctx)?
            .into_iter()
            .filter(|d| &d.validator_address == validator)
            .collect())
    }

    /// Token value of the operator's own delegation.
    pub fn self_delegation_tokens(
        &self,
        ctx: &Context<'_>,
        validator: &Validator,
    ) -> Result<Amount, StakingError> {
        let op = &validator.operator_address;
        match self.get_delegation(ctx, op, op)? {
            Some(del) => floor_amount(validator.tokens_from_shares(del.shares)?),
            None => Ok(0),
        }
    }

    /// Bond `amount` tokens from `delegator` to `operator`, returning the
    /// shares issued.
    ///
    /// With `subtract_account` the tokens come from the delegator's account.
    /// Otherwise they are already held by the pool matching `token_src` and
    /// are moved to the validator's pool if the two differ.
    pub fn delegate(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        amount: Amount,
        token_src: BondStatus,
        operator: &Address,
        subtract_account: bool,
    ) -> Result<Decimal, StakingError> {
        let validator = self.must_get_validator(ctx, operator)?;
        if validator.invalid_ex_rate() {
            return Err(validator.ex_rate_error());
        }

        let mut delegation = match self.get_delegation(ctx, delegator, operator)? {
            Some(existing) => {
                self.hooks()
                    .before_delegation_shares_modified(ctx, delegator, operator)?;
                existing
            }
            None => {
                self.hooks()
                    .before_delegation_created(ctx, delegator, operator)?;
                Delegation::new(*delegator, *operator, Decimal::ZERO)
            }
        };

        let denom = self.params(ctx)?.bond_denom;
        let coin = Coin::new(denom, amount);
        if subtract_account {
            if token_src == BondStatus::Bonded {
                return Err(StakingError::InvalidAmount(
                    "delegation from an account cannot be sourced from bonded tokens".to_string(),
                ));
            }
            self.bank().send_coins_from_account_to_module(
                ctx,
                delegator,
                pool_for(validator.status),
                &coin,
            )?;
        } else {
            match (token_src == BondStatus::Bonded, validator.is_bonded()) {
                (true, false) => self.bank().send_coins_from_module_to_module(
                    ctx,
                    BONDED_POOL_NAME,
                    NOT_BONDED_POOL_NAME,
                    &coin,
                )?,
                (false, true) => self.bank().send_coins_from_module_to_module(
                    ctx,
                    NOT_BONDED_POOL_NAME,
                    BONDED_POOL_NAME,
                    &coin,
                )?,
                _ => {}
            }
        }

        let (validator, new_shares) = self.add_validator_tokens_and_shares(ctx, validator, amount)?;
        delegation.shares = delegation
            .shares
            .checked_add(new_shares)
            .ok_or(StakingError::ArithmeticOverflow("delegation shares"))?;
        self.set_delegation(ctx, &delegation)?;

        if delegator == operator {
            let self_bond = floor_amount(validator.tokens_from_shares(delegation.shares)?)?;
            if self_bond < validator.min_self_delegation {
                return Err(StakingError::SelfDelegationBelowMinimum {
                    operator: *operator,
                    tokens: self_bond,
                    min: validator.min_self_delegation,
                });
            }
        }

        self.hooks()
            .after_delegation_modified(ctx, delegator, operator)?;
        debug!(
            "Delegated {} to {} from {}: {} shares",
            amount, operator, delegator, new_shares
        );
        Ok(new_shares)
    }

    /// Burn `shares` of a delegation, returning the tokens they redeem.
    /// The tokens stay in the validator's pool; the caller decides where
    /// they go.
    pub fn unbond(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
        shares: Decimal,
    ) -> Result<Amount, StakingError> {
        let mut delegation = self
            .get_delegation(ctx, delegator, operator)?
            .ok_or(StakingError::NoDelegation {
                delegator: *delegator,
                validator: *operator,
            })?;
        self.hooks()
            .before_delegation_shares_modified(ctx, delegator, operator)?;
        if delegation.shares < shares {
            return Err(StakingError::InsufficientShares {
                requested: shares,
                available: delegation.shares,
            });
        }

        let mut validator = self.must_get_validator(ctx, operator)?;
        delegation.shares -= shares;

        // An operator dropping under its own floor gets jailed rather than
        // refused.
        if delegator == operator && !validator.jailed {
            let remaining = floor_amount(validator.tokens_from_shares(delegation.shares)?)?;
            if remaining < validator.min_self_delegation {
                info!(
                    "Operator {} self delegation {} below minimum {}; jailing",
                    operator, remaining, validator.min_self_delegation
                );
                validator = self.jail_validator(ctx, validator)?;
            }
        }

        if delegation.shares.is_zero() {
            self.remove_delegation(ctx, &delegation)?;
        } else {
            self.set_delegation(ctx, &delegation)?;
            self.hooks()
                .after_delegation_modified(ctx, delegator, operator)?;
        }

        let (validator, amount) = self.remove_validator_tokens_and_shares(ctx, validator, shares)?;
        if validator.delegator_shares.is_zero() && validator.is_unbonded() {
            self.remove_validator_if_unreferenced(ctx, operator)?;
        }
        Ok(amount)
    }

    /// Convert a token amount to the shares to unbond for it. Fails when the
    /// truncated share count exceeds the delegation; otherwise the result
    /// is capped at the delegation's shares.
    pub fn validate_unbond_amount(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        operator: &Address,
        amount: Amount,
    ) -> Result<Decimal, StakingError> {
        let validator = self.must_get_validator(ctx, operator)?;
        let delegation = self
            .get_delegation(ctx, delegator, operator)?
            .ok_or(StakingError::NoDelegation {
                delegator: *delegator,
                validator: *operator,
            })?;
        let shares = math::round(validator.shares_from_tokens(amount)?);
        let truncated = validator.shares_from_tokens_truncated(amount)?;
        if truncated > delegation.shares {
            return Err(StakingError::InsufficientShares {
                requested: truncated,
                available: delegation.shares,
            });
        }
        Ok(shares.min(delegation.shares))
    }

    /// Unbond `shares` and queue the redeemed tokens for withdrawal after
    /// the unbonding period. Returns the completion time and amount.
    pub fn undelegate(
        &self,
        ctx: &mut Context<'_>,
        delegator: &Address,
        operator: &Address,
        shares: Decimal,
    ) -> Result<(DateTime<Utc>, Amount), StakingError> {
        let validator = self.must_get_validator(ctx, operator)?;
        if self.has_max_unbonding_delegation_entries(ctx, delegator, operator)? {
            return Err(StakingError::MaxUnbondingDelegationEntries {
                delegator: *delegator,
                validator: *operator,
                max: self.params(ctx)?.max_entries,
            });
        }

        let amount = self.unbond(ctx, delegator, operator, shares)?;
        if amount == 0 {
            return Err(StakingError::InvalidAmount(
                "undelegation redeems zero tokens".to_string(),
            ));
        }
        if validator.is_bonded() {
            let denom = self.params(ctx)?.bond_denom;
            self.bank().send_coins_from_module_to_module(
                ctx,
                BONDED_POOL_NAME,
                NOT_BONDED_POOL_NAME,
                &Coin::new(denom, amount),
            )?;
        }

        let completion_time = self.params(ctx)?.unbonding_completion(ctx.block_time())?;
        let height = ctx.height();
        self.set_unbonding_delegation_entry(ctx, delegator, operator, height, completion_time, amount)?;
        self.insert_ubd_queue(ctx, delegator, operator, completion_time)?;
        debug!(
            "Undelegated {} from {} for {}, completes at {}",
            amount, operator, delegator, completion_time
        );
        Ok((completion_time, amount))
    }
}
