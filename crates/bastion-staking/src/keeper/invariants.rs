// crates/bastion-staking/src/keeper/invariants.rs
//
// State consistency checks. Each check returns a description of every
// violation it finds; an empty list means the invariant holds.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use tracing::warn;

use bastion_core::{Address, Amount, Context};

use super::Keeper;
use crate::bank::{BONDED_POOL_NAME, NOT_BONDED_POOL_NAME};
use crate::error::StakingError;
use crate::keys;

impl Keeper {
    /// The bonded pool holds exactly the tokens of bonded validators; the
    /// not-bonded pool holds the tokens of all other validators plus every
    /// pending unbonding balance.
    pub fn module_accounts_invariant(&self, ctx: &Context<'_>) -> Result<Vec<String>, StakingError> {
        let mut bonded: u128 = 0;
        let mut not_bonded: u128 = 0;
        for v in self.get_all_validators(ctx)? {
            if v.is_bonded() {
                bonded += u128::from(v.tokens);
            } else {
                not_bonded += u128::from(v.tokens);
            }
        }
        for ubd in self.get_all_unbonding_delegations(ctx)? {
            for entry in &ubd.entries {
                not_bonded += u128::from(entry.balance);
            }
        }

        let pool = self.pool(ctx)?;
        let mut broken = Vec::new();
        if u128::from(pool.bonded_tokens) != bonded {
            broken.push(format!(
                "{} balance {} != bonded validator tokens {}",
                BONDED_POOL_NAME, pool.bonded_tokens, bonded
            ));
        }
        if u128::from(pool.not_bonded_tokens) != not_bonded {
            broken.push(format!(
                "{} balance {} != non-bonded validator tokens plus unbonding balances {}",
                NOT_BONDED_POOL_NAME, pool.not_bonded_tokens, not_bonded
            ));
        }
        Ok(broken)
    }

    /// Each validator's delegator shares equal the sum of its delegations,
    /// and no delegation holds a non-positive share count.
    pub fn delegator_shares_invariant(&self, ctx: &Context<'_>) -> Result<Vec<String>, StakingError> {
        let mut sums: BTreeMap<Address, Decimal> = BTreeMap::new();
        let mut broken = Vec::new();
        for d in self.get_all_delegations(ctx)? {
            if d.shares <= Decimal::ZERO {
                broken.push(format!(
                    "delegation ({}, {}) has non-positive shares {}",
                    d.delegator_address, d.validator_address, d.shares
                ));
            }
            *sums.entry(d.validator_address).or_default() += d.shares;
        }
        for v in self.get_all_validators(ctx)? {
            let sum = sums.remove(&v.operator_address).unwrap_or_default();
            if sum != v.delegator_shares {
                broken.push(format!(
                    "validator {} delegator shares {} != sum of delegations {}",
                    v.operator_address, v.delegator_shares, sum
                ));
            }
        }
        for (operator, sum) in sums {
            broken.push(format!(
                "delegations worth {} shares point at missing validator {}",
                sum, operator
            ));
        }
        Ok(broken)
    }

    /// `tokens == 0` exactly when `delegator_shares == 0`.
    pub fn tokens_shares_invariant(&self, ctx: &Context<'_>) -> Result<Vec<String>, StakingError> {
        Ok(self
            .get_all_validators(ctx)?
            .into_iter()
            .filter(|v| (v.tokens == 0) != v.delegator_shares.is_zero())
            .map(|v| {
                format!(
                    "validator {} has tokens {} and delegator shares {}",
                    v.operator_address, v.tokens, v.delegator_shares
                )
            })
            .collect())
    }

    /// The power index holds exactly the non-jailed validators, each under
    /// its current power, in non-increasing power order.
    pub fn power_index_invariant(&self, ctx: &Context<'_>) -> Result<Vec<String>, StakingError> {
        let pr = self.params(ctx)?.power_reduction;
        let mut broken = Vec::new();
        let mut indexed = Vec::new();
        let mut last_power: Option<u64> = None;

        for (key, _) in ctx.store().prefix_scan(&[keys::VALIDATORS_BY_POWER_INDEX_KEY])? {
            let operator = keys::operator_from_power_index_key(&key)?;
            let Some(v) = self.get_validator(ctx, &operator)? else {
                broken.push(format!("power index references missing validator {}", operator));
                continue;
            };
            let power = v.potential_consensus_power(pr);
            if key != keys::power_index_key(power, v.creation_height, &operator) {
                broken.push(format!("power index entry of {} is stale", operator));
            }
            if v.jailed {
                broken.push(format!("jailed validator {} is indexed by power", operator));
            }
            if let Some(prev) = last_power {
                if power > prev {
                    broken.push(format!("power index out of order at {}", operator));
                }
            }
            last_power = Some(power);
            indexed.push(operator);
        }

        for v in self.get_all_validators(ctx)? {
            if !v.jailed && !indexed.contains(&v.operator_address) {
                broken.push(format!("validator {} missing from power index", v.operator_address));
            }
        }
        Ok(broken)
    }

    /// Run every check and collect the violations.
    pub fn all_invariants(&self, ctx: &Context<'_>) -> Result<Vec<String>, StakingError> {
        let mut broken = self.module_accounts_invariant(ctx)?;
        broken.extend(self.delegator_shares_invariant(ctx)?);
        broken.extend(self.tokens_shares_invariant(ctx)?);
        broken.extend(self.power_index_invariant(ctx)?);
        for msg in &broken {
            warn!("Broken staking invariant: {}", msg);
        }
        Ok(broken)
    }

    /// Tokens delegated through `delegator` across all validators, at the
    /// current exchange rates.
    pub fn total_delegated(&self, ctx: &Context<'_>, delegator: &Address) -> Result<Amount, StakingError> {
        let mut total: Amount = 0;
        for resp in self.delegator_delegation_responses(ctx, delegator)? {
            total = crate::math::checked_add(total, resp.balance, "delegated total")?;
        }
        Ok(total)
    }
}
