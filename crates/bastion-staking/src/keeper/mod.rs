// crates/bastion-staking/src/keeper/mod.rs
//
// The staking keeper: owns every staking record in the store.
//
// The keeper itself is stateless apart from its collaborators (bank, hooks,
// address codec), which are handed in at construction. All state lives in
// the store reached through the `Context` passed to each operation, so two
// keepers over identical stores behave identically.
//
// Submodules split the keeper by concern:
//   - validator:        registry CRUD, creation, jail/unjail
//   - power_index:      ranking index and last-reported powers
//   - val_state_change: status transitions and the validator-set diff
//   - delegation:       delegate/unbond/undelegate share accounting
//   - unbonding:        unbonding records, maturity queue, cancellation
//   - redelegation:     redelegation records, maturity queue
//   - slash:            slashing propagation
//   - rotation:         consensus key rotation
//   - historical:       per-height bonded-set snapshots
//   - query:            read-only views
//   - invariants:       state consistency checks

pub mod delegation;
pub mod historical;
pub mod invariants;
pub mod power_index;
pub mod query;
pub mod redelegation;
pub mod rotation;
pub mod slash;
pub mod unbonding;
pub mod val_state_change;
pub mod validator;

use serde::de::DeserializeOwned;
use serde::Serialize;

use bastion_core::{AddressCodec, Context, KvStore};

use crate::bank::{BankKeeper, BONDED_POOL_NAME, NOT_BONDED_POOL_NAME};
use crate::error::StakingError;
use crate::hooks::MultiStakingHooks;
use crate::keys;
use crate::params::Params;
use crate::validator::BondStatus;

/// Staking state owner.
pub struct Keeper {
    bank: Box<dyn BankKeeper>,
    hooks: MultiStakingHooks,
    codec: Box<dyn AddressCodec>,
}

impl Keeper {
    pub fn new(bank: Box<dyn BankKeeper>, codec: Box<dyn AddressCodec>) -> Self {
        Self {
            bank,
            hooks: MultiStakingHooks::default(),
            codec,
        }
    }

    /// Register the ordered hook list. Hooks are fixed for the keeper's
    /// lifetime.
    pub fn with_hooks(mut self, hooks: MultiStakingHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn bank(&self) -> &dyn BankKeeper {
        self.bank.as_ref()
    }

    pub fn hooks(&self) -> &MultiStakingHooks {
        &self.hooks
    }

    pub fn codec(&self) -> &dyn AddressCodec {
        self.codec.as_ref()
    }

    /// Stored params, or the defaults before genesis has written any.
    pub fn params(&self, ctx: &Context<'_>) -> Result<Params, StakingError> {
        Ok(get_json(ctx.store(), &keys::params_key())?.unwrap_or_default())
    }

    pub fn has_params(&self, ctx: &Context<'_>) -> Result<bool, StakingError> {
        Ok(ctx.store().has(&keys::params_key())?)
    }

    pub fn set_params(&self, ctx: &mut Context<'_>, params: &Params) -> Result<(), StakingError> {
        params.validate()?;
        set_json(ctx.store_mut(), &keys::params_key(), params)
    }
}

/// Module account holding the tokens of validators in `status`.
pub(crate) fn pool_for(status: BondStatus) -> &'static str {
    match status {
        BondStatus::Bonded => BONDED_POOL_NAME,
        BondStatus::Unbonding | BondStatus::Unbonded => NOT_BONDED_POOL_NAME,
    }
}

pub(crate) fn get_json<T: DeserializeOwned>(
    store: &dyn KvStore,
    key: &[u8],
) -> Result<Option<T>, StakingError> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

pub(crate) fn set_json<T: Serialize>(
    store: &mut dyn KvStore,
    key: &[u8],
    value: &T,
) -> Result<(), StakingError> {
    store.set(key, &serde_json::to_vec(value)?)?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared fixtures for keeper unit tests.

    use chrono::{DateTime, Duration, Utc};
    use rust_decimal::Decimal;

    use bastion_core::{
        Address, BlockHeader, Coin, ConsensusPubKey, Context, HexCodec, KvStore,
    };
    use bastion_store::MemStore;

    use super::Keeper;
    use crate::bank::{BankKeeper, StoreBank};
    use crate::params::Params;
    use crate::validator::{CommissionRates, Description};

    pub const DENOM: &str = "ubstn";

    pub fn keeper() -> Keeper {
        Keeper::new(Box::new(StoreBank::new()), Box::new(HexCodec::default()))
    }

    pub fn header(height: u64) -> BlockHeader {
        BlockHeader::new(
            "bastion-test",
            height,
            DateTime::<Utc>::UNIX_EPOCH + Duration::seconds(height as i64 * 5),
        )
    }

    pub fn ctx(store: &mut MemStore, height: u64) -> Context<'_> {
        Context::new(store as &mut dyn KvStore, header(height))
    }

    /// Params with a power reduction of one, so tokens equal power.
    pub fn unit_params() -> Params {
        Params {
            power_reduction: 1,
            unbonding_time_secs: 100,
            ..Params::default()
        }
    }

    pub fn addr(n: u8) -> Address {
        Address([n; 20])
    }

    pub fn pubkey(n: u8) -> ConsensusPubKey {
        ConsensusPubKey::ed25519([n; 32])
    }

    pub fn rates() -> CommissionRates {
        CommissionRates::new(Decimal::new(1, 1), Decimal::new(2, 1), Decimal::new(1, 2))
    }

    pub fn fund(ctx: &mut Context<'_>, who: &Address, amount: u64) {
        StoreBank::new()
            .fund_account(ctx, who, &Coin::new(DENOM, amount))
            .unwrap();
    }

    /// Create a validator operated by `addr(n)` with a self-bond of `bond`.
    pub fn create_validator(keeper: &Keeper, ctx: &mut Context<'_>, n: u8, bond: u64) -> Address {
        let op = addr(n);
        fund(ctx, &op, bond);
        keeper
            .create_validator(ctx, op, pubkey(n), Description::new(format!("val-{}", n)), rates(), 1)
            .unwrap();
        keeper
            .delegate(ctx, &op, bond, crate::validator::BondStatus::Unbonded, &op, true)
            .unwrap();
        op
    }

    pub fn balance(ctx: &Context<'_>, who: &Address) -> u64 {
        StoreBank::new().get_balance(ctx, who, DENOM).unwrap()
    }
}
