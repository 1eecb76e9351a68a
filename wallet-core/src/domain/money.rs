//! Fixed-point money amounts
//!
//! Every amount carries exactly two fractional digits. Input with more
//! precision is rejected instead of rounded, so sums never drift.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Number of fractional digits kept for every monetary value
pub const SCALE: u32 = 2;

/// Largest amount accepted from input: ten digits, two of them fractional
pub const MAX_INPUT: Decimal = Decimal::from_parts(1_410_065_407, 2, 0, false, 2); // 99_999_999.99

/// A monetary value with exactly two decimal places
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::from_parts(0, 0, 0, false, SCALE));

    /// Build an amount from integer cents (`1234` is `12.34`)
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, SCALE))
    }

    /// Wrap a decimal, rejecting anything finer than a cent
    pub fn try_from_decimal(value: Decimal) -> Result<Self> {
        if value.normalize().scale() > SCALE {
            return Err(Error::validation(format!(
                "amount {} has more than {} decimal places",
                value, SCALE
            )));
        }
        let mut value = value;
        value.rescale(SCALE);
        Ok(Self(value))
    }

    /// Parse user input such as `"30"`, `"30.5"` or `"30.50"`
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let value = Decimal::from_str(trimmed)
            .map_err(|_| Error::validation(format!("invalid amount: '{}'", trimmed)))?;
        if value.abs() > MAX_INPUT {
            return Err(Error::validation(format!(
                "amount {} exceeds the maximum of {}",
                trimmed, MAX_INPUT
            )));
        }
        Self::try_from_decimal(value)
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn is_negative(&self) -> bool {
        self.0 < Decimal::ZERO
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        self.0.checked_add(other.0).map(Amount)
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Amount::parse(s)
    }
}

impl TryFrom<String> for Amount {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        // Stored values may exceed the input ceiling (accumulated balances)
        let decimal = Decimal::from_str(value.trim())
            .map_err(|_| Error::validation(format!("invalid amount: '{}'", value)))?;
        Amount::try_from_decimal(decimal)
    }
}

impl From<Amount> for String {
    fn from(value: Amount) -> Self {
        value.to_string()
    }
}
