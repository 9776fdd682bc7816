// crates/bastion-staking/src/keeper/validator.rs
//
// Validator registry: records keyed by operator address with a secondary
// index by consensus address.

use rust_decimal::Decimal;
use tracing::{debug, info};

use bastion_core::{Address, Amount, ConsAddress, ConsensusPubKey, Context, Event};

use super::{get_json, set_json, Keeper};
use crate::error::StakingError;
use crate::events;
use crate::hooks::StakingHooks;
use crate::keys;
use crate::validator::{BondStatus, Commission, CommissionRates, Description, Validator};

impl Keeper {
    pub fn get_validator(
        &self,
        ctx: &Context<'_>,
        operator: &Address,
    ) -> Result<Option<Validator>, StakingError> {
        get_json(ctx.store(), &keys::validator_key(operator))
    }

    /// Like `get_validator`, failing with `NoValidatorFound` when absent.
    pub fn must_get_validator(
        &self,
        ctx: &Context<'_>,
        operator: &Address,
    ) -> Result<Validator, StakingError> {
        self.get_validator(ctx, operator)?
            .ok_or_else(|| StakingError::NoValidatorFound {
                address: self.codec().encode(operator.as_bytes()),
            })
    }

    /// Resolve a consensus address to its validator. Addresses of keys
    /// rotated away still resolve, so old evidence can be slashed.
    pub fn get_validator_by_cons_addr(
        &self,
        ctx: &Context<'_>,
        cons: &ConsAddress,
    ) -> Result<Option<Validator>, StakingError> {
        let operator: Option<Address> =
            match get_json(ctx.store(), &keys::validator_by_cons_addr_key(cons))? {
                Some(op) => Some(op),
                None => get_json(ctx.store(), &keys::old_cons_addr_key(cons))?,
            };
        match operator {
            Some(op) => self.get_validator(ctx, &op),
            None => Ok(None),
        }
    }

    /// Whether `cons` is, or once was, the consensus address of any validator.
    pub fn cons_addr_in_use(&self, ctx: &Context<'_>, cons: &ConsAddress) -> Result<bool, StakingError> {
        Ok(ctx.store().has(&keys::validator_by_cons_addr_key(cons))?
            || ctx.store().has(&keys::old_cons_addr_key(cons))?)
    }

    pub fn set_validator(&self, ctx: &mut Context<'_>, validator: &Validator) -> Result<(), StakingError> {
        set_json(
            ctx.store_mut(),
            &keys::validator_key(&validator.operator_address),
            validator,
        )
    }

    pub fn set_validator_by_cons_addr(
        &self,
        ctx: &mut Context<'_>,
        validator: &Validator,
    ) -> Result<(), StakingError> {
        set_json(
            ctx.store_mut(),
            &keys::validator_by_cons_addr_key(&validator.cons_address()),
            &validator.operator_address,
        )
    }

    /// Every validator, ordered by operator address.
    pub fn get_all_validators(&self, ctx: &Context<'_>) -> Result<Vec<Validator>, StakingError> {
        ctx.store()
            .prefix_scan(&[keys::VALIDATORS_KEY])?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(StakingError::from))
            .collect()
    }

    /// Register a new validator with no stake. The caller bonds the initial
    /// self-delegation separately.
    pub fn create_validator(
        &self,
        ctx: &mut Context<'_>,
        operator: Address,
        pubkey: ConsensusPubKey,
        description: Description,
        rates: CommissionRates,
        min_self_delegation: Amount,
    ) -> Result<Validator, StakingError> {
        if self.get_validator(ctx, &operator)?.is_some() {
            return Err(StakingError::ValidatorOwnerExists { operator });
        }
        let key_type = pubkey.key_type();
        if !ctx.consensus_params().accepts(key_type) {
            return Err(StakingError::ValidatorPubKeyTypeNotSupported {
                key_type,
                accepted: ctx.consensus_params().pub_key_types.clone(),
            });
        }
        let cons = pubkey.address();
        if self.cons_addr_in_use(ctx, &cons)? {
            return Err(StakingError::ValidatorPubKeyExists { cons_address: cons });
        }
        description.ensure_length()?;
        rates.validate()?;
        let params = self.params(ctx)?;
        if rates.rate < params.min_commission_rate {
            return Err(StakingError::CommissionBelowMinimumRate {
                rate: rates.rate,
                min: params.min_commission_rate,
            });
        }
        if min_self_delegation == 0 {
            return Err(StakingError::InvalidAmount(
                "minimum self delegation must be positive".to_string(),
            ));
        }

        let validator = Validator::new(
            operator,
            pubkey,
            description,
            Commission::new(rates, ctx.block_time()),
            min_self_delegation,
            ctx.height(),
        );
        self.set_validator(ctx, &validator)?;
        self.set_validator_by_cons_addr(ctx, &validator)?;
        self.set_new_validator_by_power_index(ctx, &validator)?;
        self.hooks().after_validator_created(ctx, &operator)?;

        info!(
            "Created validator {} (cons {}) at height {}",
            operator,
            cons,
            ctx.height()
        );
        Ok(validator)
    }

    /// Delete a validator record and its indexes. The validator must hold no
    /// tokens or shares and must not be bonded.
    pub fn remove_validator(&self, ctx: &mut Context<'_>, operator: &Address) -> Result<(), StakingError> {
        let validator = self.must_get_validator(ctx, operator)?;
        if validator.tokens != 0 || !validator.delegator_shares.is_zero() {
            return Err(StakingError::ValidatorHasTokens {
                operator: *operator,
                tokens: validator.tokens,
                shares: validator.delegator_shares,
            });
        }
        if validator.is_bonded() {
            return Err(StakingError::InvalidStatusTransition {
                operator: *operator,
                from: validator.status,
                to: BondStatus::Unbonded,
            });
        }
        let cons = validator.cons_address();
        ctx.store_mut().delete(&keys::validator_key(operator))?;
        ctx.store_mut()
            .delete(&keys::validator_by_cons_addr_key(&cons))?;
        self.delete_validator_by_power_index(ctx, &validator)?;
        self.hooks().after_validator_removed(ctx, &cons, operator)?;
        info!("Removed validator {}", operator);
        Ok(())
    }

    /// Whether any unbonding delegation or open redelegation names `operator`.
    pub fn validator_is_referenced(&self, ctx: &Context<'_>, operator: &Address) -> Result<bool, StakingError> {
        let store = ctx.store();
        let prefixes = [
            keys::unbonding_delegations_by_val_prefix(operator),
            keys::redelegations_by_src_prefix(operator),
            {
                let mut p = vec![keys::REDELEGATION_BY_VAL_DST_INDEX_KEY];
                p.extend_from_slice(operator.as_bytes());
                p
            },
        ];
        for prefix in prefixes {
            if !store.prefix_scan(&prefix)?.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Remove an empty, unbonded validator once nothing references it.
    /// Returns whether the validator was removed.
    pub fn remove_validator_if_unreferenced(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
    ) -> Result<bool, StakingError> {
        let Some(validator) = self.get_validator(ctx, operator)? else {
            return Ok(false);
        };
        if !validator.is_unbonded()
            || validator.tokens != 0
            || !validator.delegator_shares.is_zero()
            || self.validator_is_referenced(ctx, operator)?
        {
            return Ok(false);
        }
        self.remove_validator(ctx, operator)?;
        Ok(true)
    }

    /// Add delegated tokens to a validator, keeping the power index in step.
    pub(crate) fn add_validator_tokens_and_shares(
        &self,
        ctx: &mut Context<'_>,
        mut validator: Validator,
        amount: Amount,
    ) -> Result<(Validator, Decimal), StakingError> {
        self.delete_validator_by_power_index(ctx, &validator)?;
        let shares = validator.add_tokens_from_del(amount)?;
        self.set_validator(ctx, &validator)?;
        self.set_validator_by_power_index(ctx, &validator)?;
        Ok((validator, shares))
    }

    /// Burn delegator shares, keeping the power index in step.
    pub(crate) fn remove_validator_tokens_and_shares(
        &self,
        ctx: &mut Context<'_>,
        mut validator: Validator,
        shares: Decimal,
    ) -> Result<(Validator, Amount), StakingError> {
        self.delete_validator_by_power_index(ctx, &validator)?;
        let amount = validator.remove_del_shares(shares)?;
        self.set_validator(ctx, &validator)?;
        self.set_validator_by_power_index(ctx, &validator)?;
        Ok((validator, amount))
    }

    /// Remove tokens without touching shares (slashing).
    pub(crate) fn remove_validator_tokens(
        &self,
        ctx: &mut Context<'_>,
        mut validator: Validator,
        amount: Amount,
    ) -> Result<Validator, StakingError> {
        self.delete_validator_by_power_index(ctx, &validator)?;
        validator.remove_tokens(amount)?;
        self.set_validator(ctx, &validator)?;
        self.set_validator_by_power_index(ctx, &validator)?;
        Ok(validator)
    }

    /// Apply a commission rate change after validating it against the
    /// validator's bounds, the chain floor and the daily limit.
    pub fn update_validator_commission(
        &self,
        ctx: &Context<'_>,
        validator: &mut Validator,
        new_rate: Decimal,
    ) -> Result<(), StakingError> {
        let now = ctx.block_time();
        validator.commission.validate_new_rate(new_rate, now)?;
        let min = self.params(ctx)?.min_commission_rate;
        if new_rate < min {
            return Err(StakingError::CommissionBelowMinimumRate { rate: new_rate, min });
        }
        validator.commission.rates.rate = new_rate;
        validator.commission.update_time = now;
        Ok(())
    }

    /// Jail the validator bound to `cons`. Jailed validators leave the power
    /// index and drop out of the bonded set at the next set update.
    pub fn jail(&self, ctx: &mut Context<'_>, cons: &ConsAddress) -> Result<(), StakingError> {
        let validator = self
            .get_validator_by_cons_addr(ctx, cons)?
            .ok_or_else(|| StakingError::NoValidatorFound {
                address: cons.to_string(),
            })?;
        self.jail_validator(ctx, validator)?;
        Ok(())
    }

    pub(crate) fn jail_validator(
        &self,
        ctx: &mut Context<'_>,
        mut validator: Validator,
    ) -> Result<Validator, StakingError> {
        if validator.jailed {
            return Err(StakingError::ValidatorJailed {
                operator: validator.operator_address,
            });
        }
        self.delete_validator_by_power_index(ctx, &validator)?;
        validator.jailed = true;
        self.set_validator(ctx, &validator)?;
        ctx.emit_event(
            Event::new(events::EVENT_TYPE_JAIL)
                .attr(events::ATTRIBUTE_KEY_VALIDATOR, validator.operator_address),
        );
        info!("Jailed validator {}", validator.operator_address);
        Ok(validator)
    }

    /// Release a jailed validator. Its operator must still hold at least the
    /// minimum self-delegation.
    pub fn unjail(&self, ctx: &mut Context<'_>, operator: &Address) -> Result<(), StakingError> {
        let mut validator = self.must_get_validator(ctx, operator)?;
        if !validator.jailed {
            return Err(StakingError::ValidatorNotJailed { operator: *operator });
        }
        let self_bond = match self.get_delegation(ctx, operator, operator)? {
            Some(del) => crate::math::floor_amount(validator.tokens_from_shares(del.shares)?)?,
            None => 0,
        };
        if self_bond < validator.min_self_delegation {
            return Err(StakingError::SelfDelegationBelowMinimum {
                operator: *operator,
                tokens: self_bond,
                min: validator.min_self_delegation,
            });
        }
        validator.jailed = false;
        self.set_validator(ctx, &validator)?;
        self.set_validator_by_power_index(ctx, &validator)?;
        ctx.emit_event(
            Event::new(events::EVENT_TYPE_UNJAIL)
                .attr(events::ATTRIBUTE_KEY_VALIDATOR, operator),
        );
        debug!("Unjailed validator {}", operator);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use bastion_core::{ConsensusParams, PubKeyType};
    use bastion_store::MemStore;

    #[test]
    fn test_create_and_lookup_by_cons_addr() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1);
        let v = k
            .create_validator(&mut ctx, addr(1), pubkey(1), Description::new("a"), rates(), 1)
            .unwrap();
        assert_eq!(v.status, BondStatus::Unbonded);
        let found = k
            .get_validator_by_cons_addr(&ctx, &pubkey(1).address())
            .unwrap()
            .unwrap();
        assert_eq!(found.operator_address, addr(1));
    }

    #[test]
    fn test_duplicate_operator_rejected() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1);
        k.create_validator(&mut ctx, addr(1), pubkey(1), Description::new("a"), rates(), 1)
            .unwrap();
        let err = k
            .create_validator(&mut ctx, addr(1), pubkey(2), Description::new("a"), rates(), 1)
            .unwrap_err();
        assert!(matches!(err, StakingError::ValidatorOwnerExists { .. }));
    }

    #[test]
    fn test_duplicate_pubkey_rejected() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1);
        k.create_validator(&mut ctx, addr(1), pubkey(1), Description::new("a"), rates(), 1)
            .unwrap();
        let err = k
            .create_validator(&mut ctx, addr(2), pubkey(1), Description::new("b"), rates(), 1)
            .unwrap_err();
        assert!(matches!(err, StakingError::ValidatorPubKeyExists { .. }));
    }

    #[test]
    fn test_unsupported_key_type_rejected() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1).with_consensus_params(ConsensusParams {
            pub_key_types: vec![PubKeyType::Secp256k1],
        });
        let err = k
            .create_validator(&mut ctx, addr(1), pubkey(1), Description::new("a"), rates(), 1)
            .unwrap_err();
        assert!(matches!(err, StakingError::ValidatorPubKeyTypeNotSupported { .. }));
    }

    #[test]
    fn test_remove_requires_empty_validator() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1);
        k.set_params(&mut ctx, &unit_params()).unwrap();
        let op = create_validator(&k, &mut ctx, 1, 10);
        assert!(matches!(
            k.remove_validator(&mut ctx, &op),
            Err(StakingError::ValidatorHasTokens { .. })
        ));
    }

    #[test]
    fn test_jail_and_unjail() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1);
        k.set_params(&mut ctx, &unit_params()).unwrap();
        let op = create_validator(&k, &mut ctx, 1, 10);
        k.jail(&mut ctx, &pubkey(1).address()).unwrap();
        assert!(k.must_get_validator(&ctx, &op).unwrap().jailed);
        assert!(k.validators_by_power(&ctx).unwrap().is_empty());

        k.unjail(&mut ctx, &op).unwrap();
        assert_eq!(k.validators_by_power(&ctx).unwrap(), vec![op]);
        assert!(matches!(
            k.unjail(&mut ctx, &op),
            Err(StakingError::ValidatorNotJailed { .. })
        ));
    }
}
