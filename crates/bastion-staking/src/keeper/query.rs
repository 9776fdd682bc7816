// crates/bastion-staking/src/keeper/query.rs
//
// Read-only views composed from the keeper's records.

use serde::{Deserialize, Serialize};

use bastion_core::{Address, Amount, Context};

use super::Keeper;
use crate::bank::{BONDED_POOL_NAME, NOT_BONDED_POOL_NAME};
use crate::delegation::{Delegation, DelegationResponse};
use crate::error::StakingError;
use crate::math::floor_amount;
use crate::validator::Validator;

/// Balances of the two staking module accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub bonded_tokens: Amount,
    pub not_bonded_tokens: Amount,
}

impl Keeper {
    pub fn pool(&self, ctx: &Context<'_>) -> Result<Pool, StakingError> {
        let denom = self.params(ctx)?.bond_denom;
        Ok(Pool {
            bonded_tokens: self.bank().get_module_balance(ctx, BONDED_POOL_NAME, &denom)?,
            not_bonded_tokens: self
                .bank()
                .get_module_balance(ctx, NOT_BONDED_POOL_NAME, &denom)?,
        })
    }

    fn to_response(
        &self,
        ctx: &Context<'_>,
        delegation: Delegation,
    ) -> Result<DelegationResponse, StakingError> {
        let validator = self.must_get_validator(ctx, &delegation.validator_address)?;
        let balance = floor_amount(validator.tokens_from_shares(delegation.shares)?)?;
        Ok(DelegationResponse {
            delegation,
            balance,
        })
    }

    /// A delegation with the tokens its shares currently redeem.
    pub fn delegation_response(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
        operator: &Address,
    ) -> Result<DelegationResponse, StakingError> {
        let delegation = self
            .get_delegation(ctx, delegator, operator)?
            .ok_or(StakingError::NoDelegation {
                delegator: *delegator,
                validator: *operator,
            })?;
        self.to_response(ctx, delegation)
    }

    pub fn delegator_delegation_responses(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
    ) -> Result<Vec<DelegationResponse>, StakingError> {
        self.get_delegator_delegations(ctx, delegator)?
            .into_iter()
            .map(|d| self.to_response(ctx, d))
            .collect()
    }

    pub fn validator_delegation_responses(
        &self,
        ctx: &Context<'_>,
        operator: &Address,
    ) -> Result<Vec<DelegationResponse>, StakingError> {
        self.get_validator_delegations(ctx, operator)?
            .into_iter()
            .map(|d| self.to_response(ctx, d))
            .collect()
    }

    /// Validators a delegator currently holds shares in, in operator order.
    pub fn delegator_validators(
        &self,
        ctx: &Context<'_>,
        delegator: &Address,
    ) -> Result<Vec<Validator>, StakingError> {
        self.get_delegator_delegations(ctx, delegator)?
            .iter()
            .map(|d| self.must_get_validator(ctx, &d.validator_address))
            .collect()
    }

    /// Resolve a validator from its encoded operator address.
    pub fn validator_by_encoded_address(
        &self,
        ctx: &Context<'_>,
        encoded: &str,
    ) -> Result<Validator, StakingError> {
        let operator = self.codec().decode_address(encoded)?;
        self.must_get_validator(ctx, &operator)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::*;
    use super::*;
    use crate::validator::BondStatus;
    use bastion_store::MemStore;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pool_tracks_bonding() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        k.set_params(&mut c, &unit_params()).unwrap();
        create_validator(&k, &mut c, 1, 100);
        assert_eq!(
            k.pool(&c).unwrap(),
            Pool { bonded_tokens: 0, not_bonded_tokens: 100 }
        );
        k.apply_and_return_validator_set_updates(&mut c).unwrap();
        assert_eq!(
            k.pool(&c).unwrap(),
            Pool { bonded_tokens: 100, not_bonded_tokens: 0 }
        );
    }

    #[test]
    fn test_delegation_response_reflects_slash() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        k.set_params(&mut c, &unit_params()).unwrap();
        let op = create_validator(&k, &mut c, 1, 100);
        fund(&mut c, &addr(7), 100);
        k.delegate(&mut c, &addr(7), 100, BondStatus::Unbonded, &op, true).unwrap();
        k.apply_and_return_validator_set_updates(&mut c).unwrap();
        k.slash(&mut c, &pubkey(1).address(), 1, 200, dec!(0.5)).unwrap();

        let resp = k.delegation_response(&c, &addr(7), &op).unwrap();
        assert_eq!(resp.delegation.shares, dec!(100));
        assert_eq!(resp.balance, 50);
        assert_eq!(k.delegator_delegation_responses(&c, &addr(7)).unwrap().len(), 1);
        assert_eq!(k.validator_delegation_responses(&c, &op).unwrap().len(), 2);
    }

    #[test]
    fn test_validator_by_encoded_address() {
        let k = keeper();
        let mut store = MemStore::new();
        let mut c = ctx(&mut store, 1);
        k.set_params(&mut c, &unit_params()).unwrap();
        let op = create_validator(&k, &mut c, 1, 10);
        let encoded = k.codec().encode(op.as_bytes());
        let v = k.validator_by_encoded_address(&c, &encoded).unwrap();
        assert_eq!(v.operator_address, op);
        assert!(k.validator_by_encoded_address(&c, "garbage").is_err());
    }
}
