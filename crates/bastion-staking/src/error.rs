// crates/bastion-staking/src/error.rs
//
// Error taxonomy of the staking engine.
//
// Every variant is a deterministic rejection: the message that produced it
// is rolled back and never retried. `DelegatorShareExRateInvalid` and
// `Corrupted` signal broken invariants rather than user mistakes.

use rust_decimal::Decimal;
use thiserror::Error;

use bastion_core::{Address, Amount, BastionError, ConsAddress, PubKeyType};

use crate::validator::BondStatus;

#[derive(Debug, Error)]
pub enum StakingError {
    #[error("validator already exist for this operator address {operator}")]
    ValidatorOwnerExists { operator: Address },

    #[error("validator {address} does not exist")]
    NoValidatorFound { address: String },

    #[error("validator {operator} is jailed")]
    ValidatorJailed { operator: Address },

    #[error("validator {operator} is not jailed")]
    ValidatorNotJailed { operator: Address },

    #[error("validator already exist for this pubkey (consensus address {cons_address})")]
    ValidatorPubKeyExists { cons_address: ConsAddress },

    #[error("validator pubkey type {key_type} is not supported (accepted: {accepted:?})")]
    ValidatorPubKeyTypeNotSupported {
        key_type: PubKeyType,
        accepted: Vec<PubKeyType>,
    },

    #[error("validator {operator} has invalid exchange rate: tokens {tokens}, delegator shares {shares}")]
    DelegatorShareExRateInvalid {
        operator: Address,
        tokens: Amount,
        shares: Decimal,
    },

    #[error("insufficient delegation shares: requested {requested}, available {available}")]
    InsufficientShares { requested: Decimal, available: Decimal },

    #[error("no delegation for ({delegator}, {validator}) tuple")]
    NoDelegation { delegator: Address, validator: Address },

    #[error("no unbonding delegation found for ({delegator}, {validator})")]
    NoUnbondingDelegation { delegator: Address, validator: Address },

    #[error("unbonding delegation entry at creation height {creation_height} not found or already matured")]
    UnbondingEntryNotFound { creation_height: u64 },

    #[error("too many unbonding delegation entries for ({delegator}, {validator}); max is {max}")]
    MaxUnbondingDelegationEntries {
        delegator: Address,
        validator: Address,
        max: u32,
    },

    #[error("too many redelegation entries for ({delegator}, {src} -> {dst}); max is {max}")]
    MaxRedelegationEntries {
        delegator: Address,
        src: Address,
        dst: Address,
        max: u32,
    },

    #[error("redelegation from {src} is transitive: stake was redelegated into it and has not matured")]
    TransitiveRedelegation { delegator: Address, src: Address },

    #[error("cannot redelegate to the same validator {validator}")]
    SelfRedelegation { validator: Address },

    #[error("too few tokens to redelegate (truncates to zero tokens)")]
    TinyRedelegationAmount,

    #[error("validator {operator} self delegation {tokens} is below its minimum {min}")]
    SelfDelegationBelowMinimum {
        operator: Address,
        tokens: Amount,
        min: Amount,
    },

    #[error("minimum self delegation cannot be decreased (current {current}, requested {requested})")]
    MinSelfDelegationDecreased { current: Amount, requested: Amount },

    #[error("invalid coin denomination: got {got}, expected {expected}")]
    InvalidDenomination { expected: String, got: String },

    #[error("commission rate {rate} is below the minimum rate {min}")]
    CommissionBelowMinimumRate { rate: Decimal, min: Decimal },

    #[error("invalid commission: {0}")]
    CommissionInvalid(String),

    #[error("commission cannot be changed more than once in 24h")]
    CommissionUpdateTooFrequent,

    #[error("invalid description: {0}")]
    InvalidDescription(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid validator status transition {from} -> {to} for {operator}")]
    InvalidStatusTransition {
        operator: Address,
        from: BondStatus,
        to: BondStatus,
    },

    #[error("validator {operator} still holds tokens ({tokens}) or shares ({shares})")]
    ValidatorHasTokens {
        operator: Address,
        tokens: Amount,
        shares: Decimal,
    },

    #[error("validator {operator} already rotated its consensus key within the unbonding period")]
    ConsensusPubKeyRotationLimit { operator: Address },

    #[error("insufficient funds: {address} holds {available}, needs {required}")]
    InsufficientFunds {
        address: Address,
        available: Amount,
        required: Amount,
    },

    #[error("invalid slash: {0}")]
    InvalidSlash(String),

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error("arithmetic overflow in {0}")]
    ArithmeticOverflow(&'static str),

    #[error("corrupted staking state: {0}")]
    Corrupted(String),

    #[error(transparent)]
    Core(#[from] BastionError),
}

impl From<serde_json::Error> for StakingError {
    fn from(e: serde_json::Error) -> Self {
        StakingError::Core(BastionError::from(e))
    }
}
