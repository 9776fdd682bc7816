// crates/bastion-core/src/coin.rs
//
// Token amounts and denominated coins.
//
// All accounting is done in integer base units (`Amount`). Fractional
// quantities only exist on the share side of the ledger; token balances,
// pool balances and slash amounts are always whole base units.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Integer token amount in the smallest denomination.
pub type Amount = u64;

/// An amount of a single denomination.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coin {
    /// Denomination, e.g. `ubstn`.
    pub denom: String,
    /// Amount in base units.
    pub amount: Amount,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: Amount) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    /// A zero amount of `denom`.
    pub fn zero(denom: impl Into<String>) -> Self {
        Self::new(denom, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    /// Add two coins of the same denomination. Returns `None` on denomination
    /// mismatch or overflow.
    pub fn checked_add(&self, other: &Coin) -> Option<Coin> {
        if self.denom != other.denom {
            return None;
        }
        Some(Coin::new(self.denom.clone(), self.amount.checked_add(other.amount)?))
    }

    /// Subtract two coins of the same denomination. Returns `None` on
    /// denomination mismatch or underflow.
    pub fn checked_sub(&self, other: &Coin) -> Option<Coin> {
        if self.denom != other.denom {
            return None;
        }
        Some(Coin::new(self.denom.clone(), self.amount.checked_sub(other.amount)?))
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}
