use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Fixed-point currency amount with 2 decimal places, stored as a scaled
/// integer count of minor units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Amount(i64);

/// Error returned when a decimal string does not describe a valid [`Amount`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid amount {input:?}")]
pub struct ParseAmountError {
    input: String,
}

impl Amount {
    const SCALE: i64 = 100;
    const FRAC_DIGITS: usize = 2;

    pub const ZERO: Amount = Amount(0);

    pub fn from_scaled(value: i64) -> Self {
        Amount(value)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Amount)
    }

    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.0.checked_sub(rhs.0).map(Amount)
    }

    fn parse_scaled(s: &str) -> Option<i64> {
        let s = s.trim();
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (whole, frac) = match body.split_once('.') {
            Some((whole, frac)) => (whole, Some(frac)),
            None => (body, None),
        };
        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let mut scaled = whole.parse::<i64>().ok()?.checked_mul(Self::SCALE)?;
        if let Some(frac) = frac {
            if frac.is_empty()
                || frac.len() > Self::FRAC_DIGITS
                || !frac.bytes().all(|b| b.is_ascii_digit())
            {
                return None;
            }
            let minor =
                frac.parse::<i64>().ok()? * 10_i64.pow((Self::FRAC_DIGITS - frac.len()) as u32);
            scaled = scaled.checked_add(minor)?;
        }
        Some(if negative { -scaled } else { scaled })
    }
}

impl FromStr for Amount {
    type Err = ParseAmountError;

    /// Parses a strict decimal string: optional sign, digits, and at most
    /// two fraction digits. No exponents, separators, or bare dots.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_scaled(s)
            .map(Amount)
            .ok_or_else(|| ParseAmountError { input: s.to_owned() })
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let scale = Self::SCALE as u64;
        let whole = abs / scale;
        let frac = abs % scale;
        write!(f, "{sign}{whole}.{frac:02}")
    }
}

impl std::ops::Add for Amount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Amount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Amount(self.0 - rhs.0)
    }
}

impl std::ops::AddAssign for Amount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::ops::SubAssign for Amount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_scaled_preserves_value() {
        let amount = Amount::from_scaled(123_456);
        assert_eq!(amount, Amount(123_456));
    }

    #[test]
    fn parses_whole_and_fractional_strings() {
        assert_eq!("100".parse::<Amount>(), Ok(Amount::from_scaled(10_000)));
        assert_eq!("1.5".parse::<Amount>(), Ok(Amount::from_scaled(150)));
        assert_eq!("2.50".parse::<Amount>(), Ok(Amount::from_scaled(250)));
        assert_eq!("0.01".parse::<Amount>(), Ok(Amount::from_scaled(1)));
        assert_eq!("0".parse::<Amount>(), Ok(Amount::ZERO));
    }

    #[test]
    fn parses_negative_strings() {
        assert_eq!("-50.25".parse::<Amount>(), Ok(Amount::from_scaled(-5_025)));
        assert_eq!("-0.01".parse::<Amount>(), Ok(Amount::from_scaled(-1)));
    }

    #[test]
    fn parses_surrounding_whitespace() {
        assert_eq!(" 3.25 ".parse::<Amount>(), Ok(Amount::from_scaled(325)));
    }

    #[test]
    fn rejects_malformed_strings() {
        for input in ["", " ", ".", "5.", ".5", "1.234", "1,5", "1e2", "--1", "1.2.3", "abc"] {
            assert!(input.parse::<Amount>().is_err(), "accepted {input:?}");
        }
    }

    #[test]
    fn rejects_out_of_range_strings() {
        assert!("92233720368547758.08".parse::<Amount>().is_err());
        assert!("99999999999999999999".parse::<Amount>().is_err());
    }

    #[test]
    fn display_formats_positive() {
        assert_eq!(Amount::from_scaled(10_000).to_string(), "100.00");
        assert_eq!(Amount::from_scaled(150).to_string(), "1.50");
        assert_eq!(Amount::from_scaled(1).to_string(), "0.01");
        assert_eq!(Amount::from_scaled(0).to_string(), "0.00");
    }

    #[test]
    fn display_formats_negative() {
        assert_eq!(Amount::from_scaled(-5_025).to_string(), "-50.25");
        assert_eq!(Amount::from_scaled(-1).to_string(), "-0.01");
    }

    #[test]
    fn display_round_trips_through_parse() {
        for scaled in [0, 1, 99, 100, 12_345, -1, -5_025] {
            let amount = Amount::from_scaled(scaled);
            assert_eq!(amount.to_string().parse::<Amount>(), Ok(amount));
        }
    }

    #[test]
    fn default_is_zero() {
        assert_eq!(Amount::default(), Amount::ZERO);
    }

    #[test]
    fn is_positive_excludes_zero_and_negative() {
        assert!(Amount::from_scaled(1).is_positive());
        assert!(!Amount::ZERO.is_positive());
        assert!(!Amount::from_scaled(-1).is_positive());
    }

    #[test]
    fn checked_add_detects_overflow() {
        let max = Amount::from_scaled(i64::MAX);
        assert_eq!(max.checked_add(Amount::from_scaled(1)), None);
        assert_eq!(
            Amount::from_scaled(100).checked_add(Amount::from_scaled(50)),
            Some(Amount::from_scaled(150))
        );
    }

    #[test]
    fn checked_sub_detects_overflow() {
        let min = Amount::from_scaled(i64::MIN);
        assert_eq!(min.checked_sub(Amount::from_scaled(1)), None);
        assert_eq!(
            Amount::from_scaled(100).checked_sub(Amount::from_scaled(30)),
            Some(Amount::from_scaled(70))
        );
    }

    #[test]
    fn arithmetic_operators() {
        let mut a = Amount::from_scaled(100);
        a += Amount::from_scaled(50);
        assert_eq!(a, Amount::from_scaled(150));
        a -= Amount::from_scaled(30);
        assert_eq!(a, Amount::from_scaled(120));
        assert_eq!(a + Amount::from_scaled(5), Amount::from_scaled(125));
        assert_eq!(a - Amount::from_scaled(20), Amount::from_scaled(100));
    }

    #[test]
    fn ordering() {
        let small = Amount::from_scaled(100);
        let large = Amount::from_scaled(200);
        assert!(small < large);
        assert!(Amount::from_scaled(-100) < Amount::ZERO);
    }
}
