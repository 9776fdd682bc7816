// crates/bastion-staking/src/keeper/power_index.rs
//
// Power ranking index and the last-reported validator powers.
//
// The index holds every non-jailed validator keyed by its potential power
// (see keys::power_index_key), so an ascending scan yields candidates for
// the bonded set in rank order. Entries must be deleted before a
// validator's tokens change and re-inserted afterwards; the key embeds the
// old power.

use std::collections::BTreeMap;

use bastion_core::{Address, Context};

use super::{get_json, set_json, Keeper};
use crate::error::StakingError;
use crate::keys;
use crate::validator::Validator;

impl Keeper {
    fn power_key_of(&self, ctx: &Context<'_>, validator: &Validator) -> Result<Vec<u8>, StakingError> {
        let pr = self.params(ctx)?.power_reduction;
        Ok(keys::power_index_key(
            validator.potential_consensus_power(pr),
            validator.creation_height,
            &validator.operator_address,
        ))
    }

    /// Index a validator by power. Jailed validators are never indexed.
    pub fn set_validator_by_power_index(
        &self,
        ctx: &mut Context<'_>,
        validator: &Validator,
    ) -> Result<(), StakingError> {
        if validator.jailed {
            return Ok(());
        }
        let key = self.power_key_of(ctx, validator)?;
        ctx.store_mut()
            .set(&key, validator.operator_address.as_bytes())?;
        Ok(())
    }

    pub fn set_new_validator_by_power_index(
        &self,
        ctx: &mut Context<'_>,
        validator: &Validator,
    ) -> Result<(), StakingError> {
        self.set_validator_by_power_index(ctx, validator)
    }

    pub fn delete_validator_by_power_index(
        &self,
        ctx: &mut Context<'_>,
        validator: &Validator,
    ) -> Result<(), StakingError> {
        let key = self.power_key_of(ctx, validator)?;
        ctx.store_mut().delete(&key)?;
        Ok(())
    }

    /// Operators in rank order: highest power, then earliest creation
    /// height, then lowest operator bytes.
    pub fn validators_by_power(&self, ctx: &Context<'_>) -> Result<Vec<Address>, StakingError> {
        ctx.store()
            .prefix_scan(&[keys::VALIDATORS_BY_POWER_INDEX_KEY])?
            .into_iter()
            .map(|(key, _)| keys::operator_from_power_index_key(&key).map_err(StakingError::from))
            .collect()
    }

    /// The bonded validators in rank order, at most `max_validators`.
    pub fn get_bonded_validators_by_power(
        &self,
        ctx: &Context<'_>,
    ) -> Result<Vec<Validator>, StakingError> {
        let max = self.params(ctx)?.max_validators as usize;
        let mut out = Vec::with_capacity(max);
        for operator in self.validators_by_power(ctx)? {
            if out.len() >= max {
                break;
            }
            let validator = self.must_get_validator(ctx, &operator)?;
            if validator.is_bonded() {
                out.push(validator);
            }
        }
        Ok(out)
    }

    pub fn get_last_validator_power(
        &self,
        ctx: &Context<'_>,
        operator: &Address,
    ) -> Result<Option<u64>, StakingError> {
        get_json(ctx.store(), &keys::last_validator_power_key(operator))
    }

    pub fn set_last_validator_power(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
        power: u64,
    ) -> Result<(), StakingError> {
        set_json(ctx.store_mut(), &keys::last_validator_power_key(operator), &power)
    }

    pub fn delete_last_validator_power(
        &self,
        ctx: &mut Context<'_>,
        operator: &Address,
    ) -> Result<(), StakingError> {
        ctx.store_mut()
            .delete(&keys::last_validator_power_key(operator))?;
        Ok(())
    }

    /// Powers reported to consensus at the last set update, keyed (and so
    /// ordered) by operator address.
    pub fn get_last_validator_powers(
        &self,
        ctx: &Context<'_>,
    ) -> Result<BTreeMap<Address, u64>, StakingError> {
        let mut out = BTreeMap::new();
        for (key, value) in ctx.store().prefix_scan(&[keys::LAST_VALIDATOR_POWER_KEY])? {
            let operator = keys::address_at(&key, 1)?;
            out.insert(operator, serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    /// Validators reported at the last set update, in operator order.
    pub fn get_last_validators(&self, ctx: &Context<'_>) -> Result<Vec<Validator>, StakingError> {
        self.get_last_validator_powers(ctx)?
            .keys()
            .map(|op| self.must_get_validator(ctx, op))
            .collect()
    }

    pub fn get_last_total_power(&self, ctx: &Context<'_>) -> Result<u64, StakingError> {
        Ok(get_json(ctx.store(), &keys::last_total_power_key())?.unwrap_or(0))
    }

    pub fn set_last_total_power(&self, ctx: &mut Context<'_>, power: u64) -> Result<(), StakingError> {
        set_json(ctx.store_mut(), &keys::last_total_power_key(), &power)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use bastion_store::MemStore;

    #[test]
    fn test_index_follows_token_changes() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1);
        k.set_params(&mut ctx, &unit_params()).unwrap();
        let a = create_validator(&k, &mut ctx, 1, 50);
        let b = create_validator(&k, &mut ctx, 2, 100);
        assert_eq!(k.validators_by_power(&ctx).unwrap(), vec![b, a]);

        fund(&mut ctx, &addr(9), 100);
        k.delegate(&mut ctx, &addr(9), 100, crate::validator::BondStatus::Unbonded, &a, true)
            .unwrap();
        assert_eq!(k.validators_by_power(&ctx).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_equal_power_ranks_earlier_creation_first() {
        let k = keeper();
        let mut store = MemStore::new();
        {
            let mut c = ctx(&mut store, 1);
            k.set_params(&mut c, &unit_params()).unwrap();
            create_validator(&k, &mut c, 9, 100);
        }
        let mut c = ctx(&mut store, 2);
        create_validator(&k, &mut c, 1, 100);
        assert_eq!(k.validators_by_power(&c).unwrap(), vec![addr(9), addr(1)]);
    }

    #[test]
    fn test_last_powers_roundtrip() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut ctx = ctx(&mut store, 1);
        k.set_last_validator_power(&mut ctx, &addr(2), 5).unwrap();
        k.set_last_validator_power(&mut ctx, &addr(1), 7).unwrap();
        let powers = k.get_last_validator_powers(&ctx).unwrap();
        assert_eq!(powers.into_iter().collect::<Vec<_>>(), vec![(addr(1), 7), (addr(2), 5)]);
        k.delete_last_validator_power(&mut ctx, &addr(1)).unwrap();
        assert_eq!(k.get_last_validator_power(&ctx, &addr(1)).unwrap(), None);
    }
}
