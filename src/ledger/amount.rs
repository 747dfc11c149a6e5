//! Fixed-point ledger amounts
//!
//! Stored as integer stroops; 1 XLM = 10^7 stroops. Decimal strings use at
//! most seven fractional digits, matching the ledger's own precision.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const STROOPS_PER_UNIT: i64 = 10_000_000;
const DECIMALS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    pub const fn from_stroops(stroops: i64) -> Self {
        Self(stroops)
    }

    /// Whole units, e.g. `Amount::units(100)` is 100 XLM
    pub fn units(units: i64) -> Result<Self> {
        units
            .checked_mul(STROOPS_PER_UNIT)
            .map(Self)
            .ok_or(Error::AmountOverflow)
    }

    pub const fn stroops(self) -> i64 {
        self.0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: Amount) -> Result<Amount> {
        self.0.checked_add(other.0).map(Amount).ok_or(Error::AmountOverflow)
    }

    pub fn checked_sub(self, other: Amount) -> Result<Amount> {
        self.0.checked_sub(other.0).map(Amount).ok_or(Error::AmountOverflow)
    }

    /// Parse a decimal string such as `"12.5"` or `"-0.0000001"`
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };

        let (whole, frac) = match digits.split_once('.') {
            Some((whole, frac)) => (whole, frac),
            None => (digits, ""),
        };

        let invalid = || Error::InvalidAmount(input.to_string());
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if frac.len() > DECIMALS {
            return Err(Error::InvalidAmount(format!(
                "{} has more than {} decimal places",
                input, DECIMALS
            )));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| Error::AmountOverflow)?
        };
        let frac_stroops: i64 = if frac.is_empty() {
            0
        } else {
            // Right-pad to seven digits: "5" -> 5000000
            format!("{:0<width$}", frac, width = DECIMALS)
                .parse()
                .map_err(|_| invalid())?
        };

        let stroops = whole
            .checked_mul(STROOPS_PER_UNIT)
            .and_then(|w| w.checked_add(frac_stroops))
            .ok_or(Error::AmountOverflow)?;
        Ok(Self(if negative { -stroops } else { stroops }))
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_unit = STROOPS_PER_UNIT as u64;
        let whole = abs / per_unit;
        let frac = abs % per_unit;
        if frac == 0 {
            write!(f, "{}{}", sign, whole)
        } else {
            let frac = format!("{:0width$}", frac, width = DECIMALS);
            write!(f, "{}{}.{}", sign, whole, frac.trim_end_matches('0'))
        }
    }
}
