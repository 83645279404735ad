//! Monetary amount types.
//!
//! All persisted values are integers in atomic units (the smallest
//! indivisible denomination of the ledger's native asset). Intermediate
//! share ratios are `f64`, but every final amount is floored back into an
//! integer before it is stored or compared — no float is ever persisted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub};

/// An unsigned amount in atomic units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(u64);

impl Amount {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    pub fn min(self, other: Self) -> Self {
        Self(self.0.min(other.0))
    }

    /// Floor of `rate_percent/100 × self`, computed in integer arithmetic.
    pub fn percent_floor(self, rate_percent: u8) -> Self {
        Self((u128::from(self.0) * u128::from(rate_percent) / 100) as u64)
    }

    /// Floor of `ratio × self` where `ratio` is an intermediate f64 share
    /// weight in `[0, 1]`. The only place floats touch money; the result is
    /// immediately floored into atomic units.
    pub fn ratio_floor(self, ratio: f64) -> Self {
        Self((ratio * self.0 as f64) as u64)
    }

    pub fn as_signed(self) -> SignedAmount {
        SignedAmount(i128::from(self.0))
    }
}

impl Add for Amount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|a| a.0).sum())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A signed amount in atomic units.
///
/// Used only where a balance is allowed to dip below zero: the reserve
/// account's unpaid ledger, which custom share rates above the standard rate
/// debit and later block income repays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SignedAmount(i128);

impl SignedAmount {
    pub const ZERO: Self = Self(0);

    pub fn new(raw: i128) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> i128 {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Convert to an unsigned amount; `None` when negative or out of range.
    pub fn to_amount(self) -> Option<Amount> {
        u64::try_from(self.0).ok().map(Amount::new)
    }
}

impl Add for SignedAmount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for SignedAmount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for SignedAmount {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 - rhs.0)
    }
}

impl fmt::Display for SignedAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
