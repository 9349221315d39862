use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{BridgeError, Result};
use crate::identity::{AccountIdentifier, Identity, Subaccount};

/// Number of e8s in one whole token.
pub const E8S_PER_TOKEN: u64 = 100_000_000;
/// Fee attached to every transfer, in e8s.
pub const TRANSFER_FEE_E8S: u64 = 10_000;

const DECIMALS: usize = 8;

pub type BlockHeight = u64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tokens {
    pub e8s: u64,
}

impl Tokens {
    pub const fn from_e8s(e8s: u64) -> Self {
        Self { e8s }
    }
}

/// Arguments of a ledger transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferArgs {
    pub to: AccountIdentifier,
    pub fee: Tokens,
    pub memo: u64,
    pub from_subaccount: Option<Subaccount>,
    /// Nanoseconds since the epoch.
    pub created_at_time: Option<u64>,
    pub amount: Tokens,
}

impl TransferArgs {
    pub fn new(to: AccountIdentifier, amount: Tokens, fee: Tokens) -> Self {
        Self {
            to,
            fee,
            memo: 0,
            from_subaccount: None,
            created_at_time: None,
            amount,
        }
    }
}

/// Error returned by a [`LedgerClient`].
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("ledger unreachable: {0}")]
    Transport(String),
    #[error("ledger rejected the call: {0}")]
    Rejected(String),
    /// The call went through but its reply could not be decoded.
    #[error("failed to decode ledger reply: {0}")]
    Decode(String),
}

impl LedgerError {
    /// Decoding failures happen after the ledger has accepted the call, so a
    /// transfer reporting one is presumed to have gone through.
    pub fn is_decode(&self) -> bool {
        matches!(self, LedgerError::Decode(_))
    }
}

/// Client for the token ledger.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn account_balance(&self, account: &AccountIdentifier) -> std::result::Result<Tokens, LedgerError>;

    async fn transfer(
        &self,
        from: &Identity,
        args: TransferArgs,
    ) -> std::result::Result<BlockHeight, LedgerError>;
}

/// Renders e8s as a decimal string with exactly eight fractional digits.
pub fn format_e8s(e8s: u64) -> String {
    format!("{}.{:08}", e8s / E8S_PER_TOKEN, e8s % E8S_PER_TOKEN)
}

/// Parses a decimal token amount into e8s. Digits past the eighth decimal
/// place are truncated.
pub fn parse_amount(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    let invalid = || BridgeError::InvalidAmount(text.to_string());

    let (whole, fraction) = match trimmed.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (trimmed, ""),
    };
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }

    let whole_e8s = if whole.is_empty() {
        0
    } else {
        whole
            .parse::<u64>()
            .ok()
            .and_then(|value| value.checked_mul(E8S_PER_TOKEN))
            .ok_or_else(invalid)?
    };

    let mut digits: String = fraction.chars().take(DECIMALS).collect();
    while digits.len() < DECIMALS {
        digits.push('0');
    }
    let fraction_e8s = digits.parse::<u64>().map_err(|_| invalid())?;

    whole_e8s.checked_add(fraction_e8s).ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_balances_with_eight_decimals() {
        assert_eq!(format_e8s(123_456_789), "1.23456789");
        assert_eq!(format_e8s(0), "0.00000000");
        assert_eq!(format_e8s(10_000), "0.00010000");
        assert_eq!(format_e8s(5 * E8S_PER_TOKEN), "5.00000000");
    }

    #[test]
    fn parses_decimal_amounts() {
        assert_eq!(parse_amount("1.5").unwrap(), 150_000_000);
        assert_eq!(parse_amount("0.00000001").unwrap(), 1);
        assert_eq!(parse_amount(".25").unwrap(), 25_000_000);
        assert_eq!(parse_amount("3.").unwrap(), 300_000_000);
        assert_eq!(parse_amount(" 2 ").unwrap(), 200_000_000);
    }

    #[test]
    fn truncates_past_eight_decimals() {
        assert_eq!(parse_amount("1.123456789").unwrap(), 112_345_678);
    }

    #[test]
    fn rejects_invalid_amounts() {
        for input in ["", ".", "-1", "abc", "1.2.3", "1e8", "184467440738"] {
            assert!(
                matches!(parse_amount(input), Err(BridgeError::InvalidAmount(_))),
                "{input} should be rejected"
            );
        }
    }

    #[test]
    fn only_decode_errors_count_as_delivered() {
        assert!(LedgerError::Decode("bad candid".into()).is_decode());
        assert!(!LedgerError::Rejected("insufficient funds".into()).is_decode());
        assert!(!LedgerError::Transport("timeout".into()).is_decode());
    }
}
