//! Decimal amount parsing and formatting
//!
//! Amounts travel as decimal strings in whole units ("0.01") and are scaled
//! to the token's smallest unit as a `U256`. No floating point is involved.

use ethers::types::U256;
use ethers::utils::{format_units, parse_units, ParseUnits};

use crate::error::{Error, Result};

/// Scale a positive decimal amount by `decimals`
pub fn parse_amount(amount: &str, decimals: u8) -> Result<U256> {
    let amount = amount.trim();
    if amount.is_empty() || amount.starts_with('-') {
        return Err(Error::InvalidInput(format!("Invalid amount: {:?}", amount)));
    }

    // Reject precision the token cannot represent instead of truncating it
    if let Some((_, fraction)) = amount.split_once('.') {
        if fraction.len() > usize::from(decimals) {
            return Err(Error::InvalidInput(format!(
                "Amount {} has more than {} decimal places",
                amount, decimals
            )));
        }
    }

    let value = match parse_units(amount, i32::from(decimals)) {
        Ok(ParseUnits::U256(value)) => value,
        Ok(ParseUnits::I256(_)) => {
            return Err(Error::InvalidInput(format!("Amount must be positive: {}", amount)))
        }
        Err(e) => return Err(Error::InvalidInput(format!("Invalid amount {}: {}", amount, e))),
    };

    if value.is_zero() {
        return Err(Error::InvalidInput("Amount must be greater than zero".to_string()));
    }

    Ok(value)
}

/// Render a smallest-unit amount as a decimal string
pub fn format_amount(amount: U256, decimals: u8) -> String {
    format_units(amount, i32::from(decimals)).unwrap_or_else(|_| amount.to_string())
}

/// Narrow an amount to satoshis
pub fn to_satoshis(amount: U256) -> Result<u64> {
    if amount > U256::from(u64::MAX) {
        return Err(Error::InvalidInput(format!("Amount {} exceeds the Bitcoin range", amount)));
    }
    Ok(amount.low_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_amount() {
        assert_eq!(
            parse_amount("0.01", 18).unwrap(),
            U256::from(10_000_000_000_000_000u64)
        );
        assert_eq!(parse_amount("1", 8).unwrap(), U256::from(100_000_000u64));
        assert_eq!(parse_amount("0.00000001", 8).unwrap(), U256::one());
        assert_eq!(parse_amount(" 2.5 ", 6).unwrap(), U256::from(2_500_000u64));
    }

    #[test]
    fn test_parse_amount_rejects_bad_input() {
        for bad in ["", "-1", "0", "0.000", "abc", "1.2.3"] {
            assert!(
                matches!(parse_amount(bad, 18), Err(Error::InvalidInput(_))),
                "accepted {:?}",
                bad
            );
        }
        assert!(parse_amount("0.000000001", 8).is_err());
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(U256::from(150_000_000u64), 8), "1.50000000");
        assert_eq!(format_amount(U256::zero(), 18), "0.000000000000000000");
    }

    #[test]
    fn test_to_satoshis() {
        assert_eq!(to_satoshis(U256::from(546u64)).unwrap(), 546);
        assert!(to_satoshis(U256::from(u64::MAX) + 1).is_err());
    }
}
