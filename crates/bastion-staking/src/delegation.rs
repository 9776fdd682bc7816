// crates/bastion-staking/src/delegation.rs
//
// Delegation ledger records and in-flight queue entries.
//
// Records reference validators and delegators only by address; nothing
// here embeds a copy of a validator. Queue entries are appended in message
// order and never merged, so the entry list of a record is ordered by
// creation and each entry keeps its own initial balance for slashing.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use bastion_core::{Address, Amount, BlockHeader};

/// Shares held by one delegator in one validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator_address: Address,
    pub validator_address: Address,
    pub shares: Decimal,
}

impl Delegation {
    pub fn new(delegator_address: Address, validator_address: Address, shares: Decimal) -> Self {
        Self {
            delegator_address,
            validator_address,
            shares,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegationEntry {
    pub creation_height: u64,
    pub completion_time: DateTime<Utc>,
    /// Tokens at creation; the base for proportional slashing.
    pub initial_balance: Amount,
    /// Tokens still to be paid out at maturity.
    pub balance: Amount,
}

impl UnbondingDelegationEntry {
    pub fn is_mature(&self, now: DateTime<Utc>) -> bool {
        self.completion_time <= now
    }
}

/// Pending withdrawals for one (delegator, validator) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    pub delegator_address: Address,
    pub validator_address: Address,
    pub entries: Vec<UnbondingDelegationEntry>,
}

impl UnbondingDelegation {
    pub fn new(delegator_address: Address, validator_address: Address) -> Self {
        Self {
            delegator_address,
            validator_address,
            entries: Vec::new(),
        }
    }

    pub fn add_entry(
        &mut self,
        creation_height: u64,
        completion_time: DateTime<Utc>,
        balance: Amount,
    ) {
        self.entries.push(UnbondingDelegationEntry {
            creation_height,
            completion_time,
            initial_balance: balance,
            balance,
        });
    }

    pub fn remove_entry(&mut self, index: usize) {
        if index < self.entries.len() {
            self.entries.remove(index);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedelegationEntry {
    pub creation_height: u64,
    pub completion_time: DateTime<Utc>,
    /// Tokens moved at creation; the base for proportional slashing.
    pub initial_balance: Amount,
    /// Destination shares minted for this move and not yet slashed away.
    pub shares_dst: Decimal,
}

impl RedelegationEntry {
    pub fn is_mature(&self, now: DateTime<Utc>) -> bool {
        self.completion_time <= now
    }
}

/// Open stake moves for one (delegator, source, destination) triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redelegation {
    pub delegator_address: Address,
    pub validator_src_address: Address,
    pub validator_dst_address: Address,
    pub entries: Vec<RedelegationEntry>,
}

impl Redelegation {
    pub fn new(delegator: Address, src: Address, dst: Address) -> Self {
        Self {
            delegator_address: delegator,
            validator_src_address: src,
            validator_dst_address: dst,
            entries: Vec::new(),
        }
    }

    pub fn add_entry(
        &mut self,
        creation_height: u64,
        completion_time: DateTime<Utc>,
        balance: Amount,
        shares_dst: Decimal,
    ) {
        self.entries.push(RedelegationEntry {
            creation_height,
            completion_time,
            initial_balance: balance,
            shares_dst,
        });
    }

    pub fn remove_entry(&mut self, index: usize) {
        if index < self.entries.len() {
            self.entries.remove(index);
        }
    }
}

/// Queue reference to an unbonding delegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvPair {
    pub delegator_address: Address,
    pub validator_address: Address,
}

/// Queue reference to a redelegation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DvvTriplet {
    pub delegator_address: Address,
    pub validator_src_address: Address,
    pub validator_dst_address: Address,
}

/// One bonded validator as recorded in a historical snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalValidator {
    pub operator_address: Address,
    pub tokens: Amount,
    pub power: u64,
}

/// The bonded set at a past height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalInfo {
    pub header: BlockHeader,
    pub valset: Vec<HistoricalValidator>,
}

impl HistoricalInfo {
    pub fn tokens_of(&self, operator: &Address) -> Option<Amount> {
        self.valset
            .iter()
            .find(|v| &v.operator_address == operator)
            .map(|v| v.tokens)
    }
}

/// A delegation together with its current token value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationResponse {
    pub delegation: Delegation,
    pub balance: Amount,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_unbonding_entries_append_in_order() {
        let t0 = DateTime::<Utc>::UNIX_EPOCH;
        let mut ubd = UnbondingDelegation::new(Address([1; 20]), Address([2; 20]));
        ubd.add_entry(5, t0 + Duration::days(1), 10);
        ubd.add_entry(5, t0 + Duration::days(1), 20);
        assert_eq!(ubd.entries.len(), 2);
        assert_eq!(ubd.entries[1].initial_balance, 20);
        ubd.remove_entry(0);
        assert_eq!(ubd.entries[0].balance, 20);
        ubd.remove_entry(9);
        assert_eq!(ubd.entries.len(), 1);
    }

    #[test]
    fn test_entry_maturity_is_inclusive() {
        let t0 = DateTime::<Utc>::UNIX_EPOCH;
        let entry = RedelegationEntry {
            creation_height: 1,
            completion_time: t0,
            initial_balance: 1,
            shares_dst: Decimal::ONE,
        };
        assert!(entry.is_mature(t0));
        assert!(!entry.is_mature(t0 - Duration::seconds(1)));
    }
}
