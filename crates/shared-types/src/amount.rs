//! # Amounts
//!
//! Value is carried in the smallest indivisible unit (satoshi-equivalent)
//! everywhere inside the connector. Conversion to and from decimal coin
//! strings happens only at the edges: caller input, daemon JSON floats and
//! log output.

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::AmountError;

/// Number of smallest units in one coin.
pub const SATOSHI_PER_COIN: i64 = 100_000_000;

/// Decimal places of the smallest unit.
const COIN_SCALE: u32 = 8;

/// Signed amount in satoshi-equivalent units.
///
/// Signed because wallet transaction details report sends as negative
/// values; stored payments always carry the absolute value.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Amount(i64);

impl Amount {
    /// Zero value.
    pub const ZERO: Amount = Amount(0);

    /// Create from smallest units.
    pub const fn from_sat(sat: i64) -> Self {
        Self(sat)
    }

    /// Value in smallest units.
    pub const fn as_sat(&self) -> i64 {
        self.0
    }

    /// Absolute value.
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// True when the value is strictly above zero.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// True when the value is below zero.
    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Checked addition.
    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Multiply by an unsigned factor, saturating on overflow.
    pub fn saturating_mul(self, factor: u64) -> Amount {
        let factor = i64::try_from(factor).unwrap_or(i64::MAX);
        Amount(self.0.saturating_mul(factor))
    }

    /// Parse a decimal coin string such as `"0.015"`.
    ///
    /// Rejects values with more than eight decimal places instead of
    /// silently truncating them.
    pub fn from_coins_str(s: &str) -> Result<Self, AmountError> {
        let value = Decimal::from_str(s.trim()).map_err(|_| AmountError::Invalid(s.to_string()))?;
        Self::from_coins(value).map_err(|e| match e {
            AmountError::Invalid(_) => AmountError::Invalid(s.to_string()),
            AmountError::TooPrecise(_) => AmountError::TooPrecise(s.to_string()),
            AmountError::OutOfRange(_) => AmountError::OutOfRange(s.to_string()),
            AmountError::NotPositive(_) => AmountError::NotPositive(s.to_string()),
        })
    }

    /// Convert an exact decimal coin value.
    pub fn from_coins(value: Decimal) -> Result<Self, AmountError> {
        if value.normalize().scale() > COIN_SCALE {
            return Err(AmountError::TooPrecise(value.to_string()));
        }

        value
            .checked_mul(Decimal::from(SATOSHI_PER_COIN))
            .and_then(|sat| sat.to_i64())
            .map(Amount)
            .ok_or_else(|| AmountError::OutOfRange(value.to_string()))
    }

    /// Convert a daemon JSON float (coins), rounding to the nearest unit.
    pub fn from_coins_f64(value: f64) -> Result<Self, AmountError> {
        let decimal = Decimal::from_f64(value)
            .ok_or_else(|| AmountError::Invalid(value.to_string()))?
            .round_dp(COIN_SCALE);
        Self::from_coins(decimal)
    }

    /// Value in coins as an exact decimal.
    pub fn to_coins(&self) -> Decimal {
        Decimal::new(self.0, COIN_SCALE)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_coins().normalize())
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Amount) -> Amount {
        Amount(self.0 + rhs.0)
    }
}

impl AddAssign for Amount {
    fn add_assign(&mut self, rhs: Amount) {
        self.0 += rhs.0;
    }
}

impl Sub for Amount {
    type Output = Amount;

    fn sub(self, rhs: Amount) -> Amount {
        Amount(self.0 - rhs.0)
    }
}

impl SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Amount) {
        self.0 -= rhs.0;
    }
}

impl Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        Amount(-self.0)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Amount>>(iter: I) -> Amount {
        iter.fold(Amount::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Amount> for Amount {
    fn sum<I: Iterator<Item = &'a Amount>>(iter: I) -> Amount {
        iter.copied().sum()
    }
}
