// crates/bastion-staking/src/params.rs
//
// Staking parameters.
//
// Parameters are persisted in the store (so every replica reads the same
// values) and deserialisable from configuration with per-field defaults:
//   - unbonding_time_secs:  1,814,400 (21 days)
//   - max_validators:       100
//   - max_entries:          7 per (delegator, validator[, dst]) queue record
//   - historical_entries:   10,000 heights of retained power snapshots
//   - bond_denom:           "ubstn"
//   - min_commission_rate:  0
//   - power_reduction:      1,000,000 base units per unit of consensus power

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bastion_core::Amount;

use crate::error::StakingError;

/// Default unbonding period: 21 days in seconds.
pub const DEFAULT_UNBONDING_TIME_SECS: u64 = 21 * 24 * 60 * 60;

/// Default size of the active validator set.
pub const DEFAULT_MAX_VALIDATORS: u32 = 100;

/// Default cap on pending entries per unbonding/redelegation record.
pub const DEFAULT_MAX_ENTRIES: u32 = 7;

/// Default number of heights of historical info retained.
pub const DEFAULT_HISTORICAL_ENTRIES: u32 = 10_000;

/// Default staking denomination.
pub const DEFAULT_BOND_DENOM: &str = "ubstn";

/// Base units per unit of consensus power.
pub const DEFAULT_POWER_REDUCTION: Amount = 1_000_000;

/// Longest accepted unbonding window: one hundred years.
pub const MAX_UNBONDING_TIME_SECS: u64 = 100 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Params {
    /// Duration of unbonding, redelegation and validator unbonding windows.
    #[serde(default = "default_unbonding_time_secs")]
    pub unbonding_time_secs: u64,

    /// Maximum number of bonded validators.
    #[serde(default = "default_max_validators")]
    pub max_validators: u32,

    /// Maximum pending entries per unbonding delegation or redelegation.
    #[serde(default = "default_max_entries")]
    pub max_entries: u32,

    /// Number of heights of historical info to keep (0 disables tracking).
    #[serde(default = "default_historical_entries")]
    pub historical_entries: u32,

    /// The only denomination accepted for bonding.
    #[serde(default = "default_bond_denom")]
    pub bond_denom: String,

    /// Chain-wide floor on validator commission rates.
    #[serde(default)]
    pub min_commission_rate: Decimal,

    /// Base units per unit of consensus power.
    #[serde(default = "default_power_reduction")]
    pub power_reduction: Amount,
}

fn default_unbonding_time_secs() -> u64 {
    DEFAULT_UNBONDING_TIME_SECS
}

fn default_max_validators() -> u32 {
    DEFAULT_MAX_VALIDATORS
}

fn default_max_entries() -> u32 {
    DEFAULT_MAX_ENTRIES
}

fn default_historical_entries() -> u32 {
    DEFAULT_HISTORICAL_ENTRIES
}

fn default_bond_denom() -> String {
    DEFAULT_BOND_DENOM.to_string()
}

fn default_power_reduction() -> Amount {
    DEFAULT_POWER_REDUCTION
}

impl Default for Params {
    fn default() -> Self {
        Self {
            unbonding_time_secs: default_unbonding_time_secs(),
            max_validators: default_max_validators(),
            max_entries: default_max_entries(),
            historical_entries: default_historical_entries(),
            bond_denom: default_bond_denom(),
            min_commission_rate: Decimal::ZERO,
            power_reduction: default_power_reduction(),
        }
    }
}

impl Params {
    /// The unbonding window as a `chrono::Duration`.
    pub fn unbonding_time(&self) -> Result<Duration, StakingError> {
        i64::try_from(self.unbonding_time_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or(StakingError::ArithmeticOverflow("unbonding time"))
    }

    /// The moment an unbonding that starts at `from` completes.
    pub fn unbonding_completion(&self, from: DateTime<Utc>) -> Result<DateTime<Utc>, StakingError> {
        from.checked_add_signed(self.unbonding_time()?)
            .ok_or(StakingError::ArithmeticOverflow("unbonding completion time"))
    }

    /// Reject parameter sets the engine cannot operate with.
    pub fn validate(&self) -> Result<(), StakingError> {
        if self.unbonding_time_secs == 0 {
            return Err(StakingError::InvalidParams(
                "unbonding time must be positive".to_string(),
            ));
        }
        if self.unbonding_time_secs > MAX_UNBONDING_TIME_SECS {
            return Err(StakingError::InvalidParams(format!(
                "unbonding time {}s exceeds the maximum of {}s",
                self.unbonding_time_secs, MAX_UNBONDING_TIME_SECS
            )));
        }
        if self.max_validators == 0 {
            return Err(StakingError::InvalidParams(
                "max validators must be positive".to_string(),
            ));
        }
        if self.max_entries == 0 {
            return Err(StakingError::InvalidParams(
                "max entries must be positive".to_string(),
            ));
        }
        if self.bond_denom.trim().is_empty() {
            return Err(StakingError::InvalidParams(
                "bond denom cannot be blank".to_string(),
            ));
        }
        if self.min_commission_rate.is_sign_negative() || self.min_commission_rate > Decimal::ONE {
            return Err(StakingError::InvalidParams(format!(
                "minimum commission rate {} must be within [0, 1]",
                self.min_commission_rate
            )));
        }
        if self.power_reduction == 0 {
            return Err(StakingError::InvalidParams(
                "power reduction must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
