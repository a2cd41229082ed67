use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul},
    str::FromStr,
};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::Type;
use thiserror::Error;

use crate::op;

/// Number of minor units in one major currency unit. All currencies handled by the engine are settled with two
/// decimal places.
pub const MINOR_UNITS: i64 = 100;

//--------------------------------------       Amount        ---------------------------------------------------------
/// A monetary amount, stored as an integer number of minor units (e.g. kopecks or cents).
///
/// Amounts travel over the wire as decimal numbers in major units (`100.5` is 100 roubles and 50 kopecks), but are
/// never represented as floats internally.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, PartialEq, Eq, Hash)]
#[sqlx(transparent)]
pub struct Amount(i64);

op!(binary Amount, Add, add);
op!(binary Amount, Sub, sub);
op!(inplace Amount, AddAssign, add_assign);
op!(inplace Amount, SubAssign, sub_assign);
op!(unary Amount, Neg, neg);

impl Mul<i64> for Amount {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Value cannot be represented as a monetary amount: {0}")]
pub struct AmountConversionError(String);

impl From<i64> for Amount {
    fn from(minor: i64) -> Self {
        Self(minor)
    }
}

impl Amount {
    pub fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    pub fn from_major(major: i64) -> Self {
        Self(major * MINOR_UNITS)
    }

    /// Converts a decimal value in major units, rounding half away from zero to the nearest minor unit.
    pub fn try_from_f64(value: f64) -> Result<Self, AmountConversionError> {
        if !value.is_finite() {
            return Err(AmountConversionError(value.to_string()));
        }
        let minor = (value * MINOR_UNITS as f64).round();
        if minor.abs() > i64::MAX as f64 {
            return Err(AmountConversionError(value.to_string()));
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Self(minor as i64))
    }

    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / MINOR_UNITS as f64
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Multiplies by a rational rate expressed in parts-per-million, rounding to the nearest minor unit.
    pub fn scale_ppm(&self, rate_ppm: i64) -> Self {
        let scaled = (i128::from(self.0) * i128::from(rate_ppm) + 500_000) / 1_000_000;
        #[allow(clippy::cast_possible_truncation)]
        Self(scaled as i64)
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = MINOR_UNITS.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / units, abs % units)
    }
}

impl FromStr for Amount {
    type Err = AmountConversionError;

    /// Parses a plain decimal string such as `"100"`, `"99.9"` or `"-12.05"`. At most two fractional digits are
    /// accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || AmountConversionError(s.to_string());
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() || frac.len() > 2 || !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(err());
        }
        let whole = whole.parse::<i64>().map_err(|_| err())?;
        let frac = format!("{frac:0<2}").parse::<i64>().map_err(|_| err())?;
        let minor = whole.checked_mul(MINOR_UNITS).and_then(|w| w.checked_add(frac)).ok_or_else(err)?;
        Ok(Self(if negative { -minor } else { minor }))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_f64())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = f64::deserialize(deserializer)?;
        Amount::try_from_f64(value).map_err(serde::de::Error::custom)
    }
}
