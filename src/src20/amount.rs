//! Fixed-point token amounts
//!
//! Balances and supplies are exact decimals with up to 18 fractional
//! digits, stored as scaled `u128`. Parsing works from the exact textual
//! literal of the source JSON, so `"1.00"` and `1.00` are the same value
//! and `"1e3"` is rejected rather than expanded.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Fractional digits carried by every amount
pub const SCALE: u32 = 18;

const ONE: u128 = 1_000_000_000_000_000_000;

/// Largest representable value: `u64::MAX` whole units
const MAX_RAW: u128 = (u64::MAX as u128) * ONE + (ONE - 1);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("empty amount literal")]
    Empty,
    #[error("invalid character in amount literal")]
    InvalidChar,
    #[error("more than {SCALE} fractional digits")]
    TooManyDecimals,
    #[error("amount exceeds the representable range")]
    TooLarge,
    #[error("amount is not a string or number")]
    NotANumber,
}

/// An exact token amount in the range `[0, u64::MAX]` whole units
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Amount(u128);

impl Amount {
    pub const ZERO: Amount = Amount(0);

    /// Whole-unit constructor
    pub fn from_units(units: u64) -> Amount {
        Amount(units as u128 * ONE)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Amount) -> Option<Amount> {
        let raw = self.0.checked_add(other.0)?;
        (raw <= MAX_RAW).then_some(Amount(raw))
    }

    pub fn checked_sub(self, other: Amount) -> Option<Amount> {
        self.0.checked_sub(other.0).map(Amount)
    }

    /// Number of significant fractional digits
    pub fn decimal_places(&self) -> u32 {
        let mut frac = self.0 % ONE;
        let mut places = SCALE;
        while places > 0 && frac % 10 == 0 {
            frac /= 10;
            places -= 1;
        }
        places
    }

    /// Parse an amount from a JSON value, preserving the exact literal
    ///
    /// Requires `serde_json`'s `arbitrary_precision` feature so numeric
    /// literals survive verbatim instead of passing through an `f64`.
    pub fn from_json(value: &serde_json::Value) -> Result<Amount, AmountError> {
        match value {
            serde_json::Value::String(s) => s.trim().parse(),
            serde_json::Value::Number(n) => n.to_string().parse(),
            _ => Err(AmountError::NotANumber),
        }
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Amount, AmountError> {
        if s.is_empty() {
            return Err(AmountError::Empty);
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(AmountError::Empty);
        }
        if !whole.bytes().all(|b| b.is_ascii_digit())
            || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(AmountError::InvalidChar);
        }
        if frac.len() as u32 > SCALE {
            return Err(AmountError::TooManyDecimals);
        }

        let whole_units: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| AmountError::TooLarge)?
        };
        if whole_units > u64::MAX as u128 {
            return Err(AmountError::TooLarge);
        }

        let mut frac_raw: u128 = 0;
        for b in frac.bytes() {
            frac_raw = frac_raw * 10 + (b - b'0') as u128;
        }
        frac_raw *= 10u128.pow(SCALE - frac.len() as u32);

        Ok(Amount(whole_units * ONE + frac_raw))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / ONE;
        let frac = self.0 % ONE;
        if frac == 0 {
            return write!(f, "{}", whole);
        }
        let digits = format!("{:018}", frac);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amt(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_whole_and_fractional() {
        assert_eq!(amt("1"), Amount::from_units(1));
        assert_eq!(amt("1.00"), Amount::from_units(1));
        assert_eq!(amt("0.5").checked_add(amt("0.5")).unwrap(), amt("1"));
        assert_eq!(amt(".5"), amt("0.5"));
        assert_eq!(amt("1."), amt("1"));
    }

    #[test]
    fn test_string_and_number_literals_agree() {
        let from_string = Amount::from_json(&serde_json::json!("1.50")).unwrap();
        let number: serde_json::Value = serde_json::from_str("1.50").unwrap();
        assert_eq!(from_string, Amount::from_json(&number).unwrap());
    }

    #[test]
    fn test_rejects_malformed_literals() {
        assert!("".parse::<Amount>().is_err());
        assert!(".".parse::<Amount>().is_err());
        assert!("-1".parse::<Amount>().is_err());
        assert!("1e3".parse::<Amount>().is_err());
        assert!("1,000".parse::<Amount>().is_err());
        assert!("0.0000000000000000001".parse::<Amount>().is_err());
    }

    #[test]
    fn test_range_limits() {
        assert_eq!(
            amt("18446744073709551615"),
            Amount::from_units(u64::MAX)
        );
        assert!("18446744073709551616".parse::<Amount>().is_err());
        assert!(Amount::from_units(u64::MAX)
            .checked_add(Amount::from_units(1))
            .is_none());
    }

    #[test]
    fn test_decimal_places() {
        assert_eq!(amt("1").decimal_places(), 0);
        assert_eq!(amt("1.50").decimal_places(), 1);
        assert_eq!(amt("0.000000000000000001").decimal_places(), 18);
    }

    #[test]
    fn test_display_trims_trailing_zeros() {
        assert_eq!(amt("1.500").to_string(), "1.5");
        assert_eq!(amt("42").to_string(), "42");
        assert_eq!(amt("0.001").to_string(), "0.001");
    }

    #[test]
    fn test_serde_round_trip() {
        let a = amt("123.456");
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, "\"123.456\"");
        assert_eq!(serde_json::from_str::<Amount>(&json).unwrap(), a);
    }
}
