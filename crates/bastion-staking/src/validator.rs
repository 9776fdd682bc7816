// crates/bastion-staking/src/validator.rs
//
// Validator records and their share exchange rate.
//
// A validator pools `tokens` backing its consensus power and issues
// `delegator_shares` as claims on that pool. Delegation mints shares at
// the current rate (truncated), undelegation burns shares for tokens at the
// current rate (truncated), and a slash removes tokens without touching
// shares. The rate `tokens / delegator_shares` therefore only falls via
// slashing. When the last shares are burned, the withdrawer receives every
// remaining token, so truncation dust never outlives the shares.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bastion_core::{Address, Amount, ConsAddress, ConsensusPubKey};

use crate::error::StakingError;
use crate::math::{self, mul_div, truncate};

/// Description fields left untouched by an edit when set to this value.
pub const DO_NOT_MODIFY_DESCRIPTION: &str = "[do-not-modify]";

pub const MAX_MONIKER_LENGTH: usize = 70;
pub const MAX_IDENTITY_LENGTH: usize = 3_000;
pub const MAX_WEBSITE_LENGTH: usize = 140;
pub const MAX_SECURITY_CONTACT_LENGTH: usize = 140;
pub const MAX_DETAILS_LENGTH: usize = 280;

/// Minimum interval between two commission rate changes.
pub fn commission_update_interval() -> Duration {
    Duration::hours(24)
}

/// Lifecycle state of a validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondStatus {
    Unbonded,
    Unbonding,
    Bonded,
}

impl fmt::Display for BondStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unbonded => "unbonded",
            Self::Unbonding => "unbonding",
            Self::Bonded => "bonded",
        };
        f.write_str(s)
    }
}

/// Human-readable validator metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub moniker: String,
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub security_contact: String,
    #[serde(default)]
    pub details: String,
}

impl Description {
    pub fn new(moniker: impl Into<String>) -> Self {
        Self {
            moniker: moniker.into(),
            ..Self::default()
        }
    }

    /// Merge an edit into this description. Fields equal to
    /// `DO_NOT_MODIFY_DESCRIPTION` keep their current value.
    pub fn update(&self, edit: &Description) -> Result<Description, StakingError> {
        let pick = |current: &String, new: &String| {
            if new == DO_NOT_MODIFY_DESCRIPTION {
                current.clone()
            } else {
                new.clone()
            }
        };
        let merged = Description {
            moniker: pick(&self.moniker, &edit.moniker),
            identity: pick(&self.identity, &edit.identity),
            website: pick(&self.website, &edit.website),
            security_contact: pick(&self.security_contact, &edit.security_contact),
            details: pick(&self.details, &edit.details),
        };
        merged.ensure_length()?;
        Ok(merged)
    }

    /// Reject fields exceeding their length limits.
    pub fn ensure_length(&self) -> Result<(), StakingError> {
        let checks = [
            ("moniker", &self.moniker, MAX_MONIKER_LENGTH),
            ("identity", &self.identity, MAX_IDENTITY_LENGTH),
            ("website", &self.website, MAX_WEBSITE_LENGTH),
            ("security contact", &self.security_contact, MAX_SECURITY_CONTACT_LENGTH),
            ("details", &self.details, MAX_DETAILS_LENGTH),
        ];
        for (field, value, max) in checks {
            if value.len() > max {
                return Err(StakingError::InvalidDescription(format!(
                    "{} is {} bytes, max is {}",
                    field,
                    value.len(),
                    max
                )));
            }
        }
        Ok(())
    }
}

/// Commission rates chosen at creation. `max_rate` and `max_change_rate`
/// are fixed for the validator's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionRates {
    pub rate: Decimal,
    pub max_rate: Decimal,
    pub max_change_rate: Decimal,
}

impl CommissionRates {
    pub fn new(rate: Decimal, max_rate: Decimal, max_change_rate: Decimal) -> Self {
        Self {
            rate,
            max_rate,
            max_change_rate,
        }
    }

    pub fn validate(&self) -> Result<(), StakingError> {
        if self.max_rate.is_sign_negative() || self.max_rate > Decimal::ONE {
            return Err(StakingError::CommissionInvalid(format!(
                "max rate {} must be within [0, 1]",
                self.max_rate
            )));
        }
        if self.rate.is_sign_negative() {
            return Err(StakingError::CommissionInvalid(format!(
                "rate {} is negative",
                self.rate
            )));
        }
        if self.rate > self.max_rate {
            return Err(StakingError::CommissionInvalid(format!(
                "rate {} exceeds max rate {}",
                self.rate, self.max_rate
            )));
        }
        if self.max_change_rate.is_sign_negative() || self.max_change_rate > self.max_rate {
            return Err(StakingError::CommissionInvalid(format!(
                "max change rate {} must be within [0, max rate {}]",
                self.max_change_rate, self.max_rate
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commission {
    pub rates: CommissionRates,
    /// Block time of the last rate change.
    pub update_time: DateTime<Utc>,
}

impl Commission {
    pub fn new(rates: CommissionRates, update_time: DateTime<Utc>) -> Self {
        Self { rates, update_time }
    }

    /// Check a requested rate change against the fixed bounds and the
    /// once-per-day limit.
    pub fn validate_new_rate(
        &self,
        new_rate: Decimal,
        block_time: DateTime<Utc>,
    ) -> Result<(), StakingError> {
        if block_time.signed_duration_since(self.update_time) < commission_update_interval() {
            return Err(StakingError::CommissionUpdateTooFrequent);
        }
        if new_rate.is_sign_negative() {
            return Err(StakingError::CommissionInvalid(format!(
                "rate {} is negative",
                new_rate
            )));
        }
        if new_rate > self.rates.max_rate {
            return Err(StakingError::CommissionInvalid(format!(
                "rate {} exceeds max rate {}",
                new_rate, self.rates.max_rate
            )));
        }
        if (new_rate - self.rates.rate).abs() > self.rates.max_change_rate {
            return Err(StakingError::CommissionInvalid(format!(
                "change from {} to {} exceeds max change rate {}",
                self.rates.rate, new_rate, self.rates.max_change_rate
            )));
        }
        Ok(())
    }
}

/// A validator record, keyed by operator address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub operator_address: Address,
    pub consensus_pubkey: ConsensusPubKey,
    pub jailed: bool,
    pub status: BondStatus,
    pub tokens: Amount,
    pub delegator_shares: Decimal,
    pub description: Description,
    /// Height at which the validator last left the bonded set.
    pub unbonding_height: u64,
    /// Time at which the validator's current unbonding window matures.
    pub unbonding_time: DateTime<Utc>,
    pub commission: Commission,
    pub min_self_delegation: Amount,
    /// Height of the create-validator message; secondary key of the power
    /// ranking.
    pub creation_height: u64,
}

impl Validator {
    pub fn new(
        operator_address: Address,
        consensus_pubkey: ConsensusPubKey,
        description: Description,
        commission: Commission,
        min_self_delegation: Amount,
        creation_height: u64,
    ) -> Self {
        Self {
            operator_address,
            consensus_pubkey,
            jailed: false,
            status: BondStatus::Unbonded,
            tokens: 0,
            delegator_shares: Decimal::ZERO,
            description,
            unbonding_height: 0,
            unbonding_time: DateTime::<Utc>::UNIX_EPOCH,
            commission,
            min_self_delegation,
            creation_height,
        }
    }

    pub fn cons_address(&self) -> ConsAddress {
        self.consensus_pubkey.address()
    }

    pub fn is_bonded(&self) -> bool {
        self.status == BondStatus::Bonded
    }

    pub fn is_unbonding(&self) -> bool {
        self.status == BondStatus::Unbonding
    }

    pub fn is_unbonded(&self) -> bool {
        self.status == BondStatus::Unbonded
    }

    /// Shares outstanding with no tokens behind them. Further delegation
    /// at this rate is undefined, so the validator is closed to it.
    pub fn invalid_ex_rate(&self) -> bool {
        self.tokens == 0 && !self.delegator_shares.is_zero()
    }

    /// Consensus power counted by the consensus engine: zero unless bonded.
    pub fn consensus_power(&self, power_reduction: Amount) -> u64 {
        if self.is_bonded() {
            self.potential_consensus_power(power_reduction)
        } else {
            0
        }
    }

    /// Power the validator would have if bonded.
    pub fn potential_consensus_power(&self, power_reduction: Amount) -> u64 {
        if power_reduction == 0 {
            return 0;
        }
        self.tokens / power_reduction
    }

    /// Token value of `shares` at the current rate, untruncated.
    pub fn tokens_from_shares(&self, shares: Decimal) -> Result<Decimal, StakingError> {
        if self.delegator_shares.is_zero() {
            return Ok(Decimal::ZERO);
        }
        mul_div(shares, Decimal::from(self.tokens), self.delegator_shares)
    }

    /// Shares equivalent to `amount` tokens at the current rate, untruncated.
    pub fn shares_from_tokens(&self, amount: Amount) -> Result<Decimal, StakingError> {
        if self.tokens == 0 {
            return Err(StakingError::InsufficientShares {
                requested: Decimal::from(amount),
                available: Decimal::ZERO,
            });
        }
        mul_div(
            self.delegator_shares,
            Decimal::from(amount),
            Decimal::from(self.tokens),
        )
    }

    /// `shares_from_tokens`, truncated to share precision.
    pub fn shares_from_tokens_truncated(&self, amount: Amount) -> Result<Decimal, StakingError> {
        self.shares_from_tokens(amount).map(truncate)
    }

    /// Add delegated tokens, returning the shares issued for them.
    pub fn add_tokens_from_del(&mut self, amount: Amount) -> Result<Decimal, StakingError> {
        if self.invalid_ex_rate() {
            return Err(self.ex_rate_error());
        }
        let issued = if self.delegator_shares.is_zero() {
            Decimal::from(amount)
        } else {
            self.shares_from_tokens_truncated(amount)?
        };
        self.tokens = math::checked_add(self.tokens, amount, "validator tokens")?;
        self.delegator_shares = self
            .delegator_shares
            .checked_add(issued)
            .ok_or(StakingError::ArithmeticOverflow("delegator shares"))?;
        Ok(issued)
    }

    /// Burn `shares`, returning the tokens they redeem. Burning the final
    /// shares redeems every remaining token.
    pub fn remove_del_shares(&mut self, shares: Decimal) -> Result<Amount, StakingError> {
        if shares > self.delegator_shares {
            return Err(StakingError::InsufficientShares {
                requested: shares,
                available: self.delegator_shares,
            });
        }
        let remaining = self.delegator_shares - shares;
        let issued = if remaining.is_zero() {
            self.tokens
        } else {
            math::floor_amount(self.tokens_from_shares(shares)?)?.min(self.tokens)
        };
        self.tokens -= issued;
        self.delegator_shares = remaining;
        Ok(issued)
    }

    /// Remove tokens without burning shares (slashing).
    pub fn remove_tokens(&mut self, amount: Amount) -> Result<(), StakingError> {
        self.tokens = math::checked_sub(self.tokens, amount, "validator tokens")?;
        Ok(())
    }

    pub(crate) fn ex_rate_error(&self) -> StakingError {
        StakingError::DelegatorShareExRateInvalid {
            operator: self.operator_address,
            tokens: self.tokens,
            shares: self.delegator_shares,
        }
    }
}

/// A power change reported to the consensus engine. Power zero removes the
/// key from the consensus set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub pub_key: ConsensusPubKey,
    pub power: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample() -> Validator {
        Validator::new(
            Address([1u8; 20]),
            ConsensusPubKey::ed25519([7u8; 32]),
            Description::new("alpha"),
            Commission::new(
                CommissionRates::new(dec!(0.1), dec!(0.2), dec!(0.01)),
                DateTime::<Utc>::UNIX_EPOCH,
            ),
            1,
            0,
        )
    }

    #[test]
    fn test_first_delegation_is_one_to_one() {
        let mut v = sample();
        let shares = v.add_tokens_from_del(100).unwrap();
        assert_eq!(shares, dec!(100));
        assert_eq!(v.tokens, 100);
        assert_eq!(v.delegator_shares, dec!(100));
    }

    #[test]
    fn test_delegation_after_slash_issues_more_shares() {
        let mut v = sample();
        v.add_tokens_from_del(100).unwrap();
        v.remove_tokens(50).unwrap();
        let shares = v.add_tokens_from_del(50).unwrap();
        assert_eq!(shares, dec!(100));
        assert_eq!(v.delegator_shares, dec!(200));
    }

    #[test]
    fn test_remove_shares_truncates_tokens() {
        let mut v = sample();
        v.add_tokens_from_del(100).unwrap();
        v.remove_tokens(1).unwrap(); // rate 0.99
        let tokens = v.remove_del_shares(dec!(50)).unwrap();
        assert_eq!(tokens, 49); // 49.5 truncated
        assert_eq!(v.tokens, 50);
    }

    #[test]
    fn test_last_shares_sweep_dust() {
        let mut v = sample();
        v.add_tokens_from_del(10).unwrap();
        v.remove_tokens(1).unwrap();
        v.remove_del_shares(dec!(5)).unwrap(); // 4.5 -> 4
        let rest = v.remove_del_shares(dec!(5)).unwrap();
        assert_eq!(rest, 5);
        assert_eq!(v.tokens, 0);
        assert!(v.delegator_shares.is_zero());
    }

    #[test]
    fn test_over_removal_rejected() {
        let mut v = sample();
        v.add_tokens_from_del(10).unwrap();
        assert!(matches!(
            v.remove_del_shares(dec!(11)),
            Err(StakingError::InsufficientShares { .. })
        ));
    }

    #[test]
    fn test_invalid_ex_rate_blocks_delegation() {
        let mut v = sample();
        v.add_tokens_from_del(10).unwrap();
        v.remove_tokens(10).unwrap();
        assert!(v.invalid_ex_rate());
        assert!(matches!(
            v.add_tokens_from_del(5),
            Err(StakingError::DelegatorShareExRateInvalid { .. })
        ));
    }

    #[test]
    fn test_consensus_power_only_when_bonded() {
        let mut v = sample();
        v.add_tokens_from_del(5_000_000).unwrap();
        assert_eq!(v.consensus_power(1_000_000), 0);
        assert_eq!(v.potential_consensus_power(1_000_000), 5);
        v.status = BondStatus::Bonded;
        assert_eq!(v.consensus_power(1_000_000), 5);
    }

    #[test]
    fn test_commission_rates_validation() {
        assert!(CommissionRates::new(dec!(0.1), dec!(0.2), dec!(0.01)).validate().is_ok());
        assert!(CommissionRates::new(dec!(0.3), dec!(0.2), dec!(0.01)).validate().is_err());
        assert!(CommissionRates::new(dec!(0.1), dec!(1.1), dec!(0.01)).validate().is_err());
        assert!(CommissionRates::new(dec!(0.1), dec!(0.2), dec!(0.3)).validate().is_err());
    }

    #[test]
    fn test_commission_change_limits() {
        let v = sample();
        let day = DateTime::<Utc>::UNIX_EPOCH + Duration::hours(25);
        assert!(v.commission.validate_new_rate(dec!(0.105), day).is_ok());
        assert!(v.commission.validate_new_rate(dec!(0.12), day).is_err());
        assert!(matches!(
            v.commission
                .validate_new_rate(dec!(0.105), DateTime::<Utc>::UNIX_EPOCH + Duration::hours(1)),
            Err(StakingError::CommissionUpdateTooFrequent)
        ));
    }

    #[test]
    fn test_description_update_keeps_sentinel_fields() {
        let current = Description {
            moniker: "alpha".into(),
            website: "https://alpha.example".into(),
            ..Description::default()
        };
        let edit = Description {
            moniker: DO_NOT_MODIFY_DESCRIPTION.into(),
            identity: DO_NOT_MODIFY_DESCRIPTION.into(),
            website: "https://beta.example".into(),
            security_contact: DO_NOT_MODIFY_DESCRIPTION.into(),
            details: DO_NOT_MODIFY_DESCRIPTION.into(),
        };
        let merged = current.update(&edit).unwrap();
        assert_eq!(merged.moniker, "alpha");
        assert_eq!(merged.website, "https://beta.example");
    }

    #[test]
    fn test_description_length_limit() {
        let d = Description::new("m".repeat(MAX_MONIKER_LENGTH + 1));
        assert!(matches!(
            d.ensure_length(),
            Err(StakingError::InvalidDescription(_))
        ));
    }
}
