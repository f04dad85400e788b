//! Governance token amount scaling
//!
//! Amounts cross the contract boundary in the token's smallest unit
//! (10^-18 of a token). Callers work with decimal strings such as `"1.5"`.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::GovernanceError;

/// Decimals of the governance token
pub const TOKEN_DECIMALS: u32 = 18;

const UNIT: u128 = 10u128.pow(TOKEN_DECIMALS);

/// Token amount in smallest units
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub const fn from_base_units(units: u128) -> Self {
        Self(units)
    }

    pub const fn base_units(&self) -> u128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Whole tokens, scaled up to base units
    pub fn from_tokens(tokens: u64) -> Self {
        Self(tokens as u128 * UNIT)
    }

    /// Parse a human decimal amount into base units
    ///
    /// Accepts `"1"`, `"1.5"`, `".5"`, `"1."`. Rejects signs, exponents,
    /// separators, more than 18 fractional digits and values that overflow.
    pub fn parse_decimal(input: &str) -> Result<Self, GovernanceError> {
        let s = input.trim();
        if s.is_empty() {
            return Err(GovernanceError::invalid_amount("amount is empty"));
        }
        if s.starts_with('-') {
            return Err(GovernanceError::invalid_amount(format!(
                "amount must be positive: {}",
                s
            )));
        }

        let (whole, fraction) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };

        if whole.is_empty() && fraction.is_empty() {
            return Err(GovernanceError::invalid_amount(format!("not a number: {}", s)));
        }
        if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(GovernanceError::invalid_amount(format!("not a number: {}", s)));
        }
        if fraction.len() > TOKEN_DECIMALS as usize {
            return Err(GovernanceError::invalid_amount(format!(
                "more than {} decimal places: {}",
                TOKEN_DECIMALS, s
            )));
        }

        let overflow = || GovernanceError::invalid_amount(format!("amount too large: {}", s));

        let whole_units = if whole.is_empty() {
            0u128
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| overflow())?
                .checked_mul(UNIT)
                .ok_or_else(overflow)?
        };

        let fraction_units = if fraction.is_empty() {
            0u128
        } else {
            let padding = TOKEN_DECIMALS - fraction.len() as u32;
            fraction.parse::<u128>().map_err(|_| overflow())? * 10u128.pow(padding)
        };

        whole_units
            .checked_add(fraction_units)
            .map(Self)
            .ok_or_else(overflow)
    }

    /// Parse an amount that must be strictly greater than zero
    pub fn parse_positive(input: &str) -> Result<Self, GovernanceError> {
        let amount = Self::parse_decimal(input)?;
        if amount.is_zero() {
            return Err(GovernanceError::invalid_amount(format!(
                "amount must be positive: {}",
                input.trim()
            )));
        }
        Ok(amount)
    }

    pub fn checked_add(self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_add(other.0).map(Self)
    }

    pub fn checked_sub(self, other: TokenAmount) -> Option<TokenAmount> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Lossy conversion for display ratios
    pub fn as_f64(&self) -> f64 {
        self.0 as f64 / UNIT as f64
    }
}

impl fmt::Display for TokenAmount {
    /// Renders like ethers' `formatEther`: `"1.5"`, `"1.0"`, `"0.0"`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / UNIT;
        let fraction = self.0 % UNIT;
        if fraction == 0 {
            return write!(f, "{}.0", whole);
        }
        let digits = format!("{:018}", fraction);
        write!(f, "{}.{}", whole, digits.trim_end_matches('0'))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TokenAmount::parse_decimal(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scales_to_base_units() {
        assert_eq!(
            TokenAmount::parse_decimal("1.5").unwrap().base_units(),
            1_500_000_000_000_000_000
        );
        assert_eq!(TokenAmount::parse_decimal("2").unwrap(), TokenAmount::from_tokens(2));
        assert_eq!(
            TokenAmount::parse_decimal(".25").unwrap().base_units(),
            250_000_000_000_000_000
        );
        assert_eq!(TokenAmount::parse_decimal("0.000000000000000001").unwrap().base_units(), 1);
        assert_eq!(TokenAmount::parse_decimal(" 3. ").unwrap(), TokenAmount::from_tokens(3));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for input in ["", "   ", ".", "-1", "+1", "1.2.3", "abc", "1e18", "1,5", "0.0000000000000000001"] {
            let err = TokenAmount::parse_decimal(input).unwrap_err();
            assert!(
                matches!(err, GovernanceError::InvalidAmount(_)),
                "{:?} should be invalid, got {:?}",
                input,
                err
            );
        }
    }

    #[test]
    fn test_parse_rejects_overflow() {
        let huge = "1".repeat(40);
        assert!(matches!(
            TokenAmount::parse_decimal(&huge),
            Err(GovernanceError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_parse_positive_rejects_zero() {
        assert!(TokenAmount::parse_positive("0").is_err());
        assert!(TokenAmount::parse_positive("0.000").is_err());
        assert!(TokenAmount::parse_positive("-0.5").is_err());
        assert!(TokenAmount::parse_positive("0.1").is_ok());
    }

    #[test]
    fn test_display_matches_format_ether() {
        assert_eq!(TokenAmount::ZERO.to_string(), "0.0");
        assert_eq!(TokenAmount::from_tokens(1).to_string(), "1.0");
        assert_eq!(TokenAmount::from_base_units(1_500_000_000_000_000_000).to_string(), "1.5");
        assert_eq!(TokenAmount::from_base_units(1).to_string(), "0.000000000000000001");
    }

    #[test]
    fn test_display_parse_agree() {
        for input in ["1.5", "0.0", "42.0", "0.125"] {
            assert_eq!(TokenAmount::parse_decimal(input).unwrap().to_string(), input);
        }
    }
}
