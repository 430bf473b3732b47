use serde::{Deserialize, Serialize};
use std::fmt;

/// A monetary amount in indivisible base units ("satoshi").
///
/// Amounts are unsigned by construction: no balance, escrow, or transaction
/// ever holds a negative quantity. Arithmetic that could underflow or
/// overflow is exposed only through checked or saturating operations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn from_sats(sats: u64) -> Self {
        Self(sats)
    }

    pub fn to_sats(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(&self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(&self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(&self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Integer percentage of this amount, truncating toward zero.
    ///
    /// Widens through u128 so the intermediate product cannot overflow.
    pub fn percent(&self, percent: u8) -> Self {
        Self((self.0 as u128 * percent as u128 / 100) as u64)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sat", self.0)
    }
}
