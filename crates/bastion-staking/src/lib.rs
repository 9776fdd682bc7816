// crates/bastion-staking/src/lib.rs
//
// bastion-staking: validator registry, delegation ledger, unbonding and
// redelegation queues, slashing propagation and validator-set updates for
// the Bastion staking engine.
//
// Token amounts are whole base units (`Amount`); delegator shares are
// `rust_decimal::Decimal`s truncated to 18 fractional digits. All time is
// block time taken from the execution context.

pub mod abci;
pub mod bank;
pub mod delegation;
pub mod error;
pub mod events;
pub mod genesis;
pub mod hooks;
pub mod keeper;
pub mod keys;
pub mod math;
pub mod msg_server;
pub mod params;
pub mod validator;

// Re-export key types for ergonomic access from downstream crates.
pub use abci::{begin_block, end_block};
pub use bank::{BankKeeper, StoreBank, BONDED_POOL_NAME, MINT_MODULE_NAME, NOT_BONDED_POOL_NAME};
pub use delegation::{
    Delegation, DelegationResponse, HistoricalInfo, Redelegation, RedelegationEntry,
    UnbondingDelegation, UnbondingDelegationEntry,
};
pub use error::StakingError;
pub use genesis::{init_genesis, GenesisAccount, GenesisState, GenesisValidator};
pub use hooks::{MultiStakingHooks, StakingHooks};
pub use keeper::query::Pool;
pub use keeper::Keeper;
pub use msg_server::{Evidence, Msg, MsgResponse, MsgServer, SlashResult, TxResult};
pub use params::Params;
pub use validator::{
    BondStatus, Commission, CommissionRates, Description, Validator, ValidatorUpdate,
};
