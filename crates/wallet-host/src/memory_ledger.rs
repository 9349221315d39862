//! Ledger kept in process memory, for development sessions and tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bridge_core::{AccountIdentifier, BlockHeight, Identity, LedgerClient, LedgerError, Tokens, TransferArgs};

/// Transfer recorded by [`MemoryLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransfer {
    pub height: BlockHeight,
    pub from: AccountIdentifier,
    pub args: TransferArgs,
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<AccountIdentifier, u64>,
    transfers: Vec<RecordedTransfer>,
    next_transfer_error: Option<LedgerError>,
    fail_balance_queries: bool,
}

#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn credit(&self, account: &AccountIdentifier, e8s: u64) {
        let mut state = self.lock();
        let balance = state.balances.entry(*account).or_default();
        *balance = balance.saturating_add(e8s);
    }

    pub fn balance_of(&self, account: &AccountIdentifier) -> u64 {
        self.lock().balances.get(account).copied().unwrap_or(0)
    }

    pub fn transfers(&self) -> Vec<RecordedTransfer> {
        self.lock().transfers.clone()
    }

    /// Makes the next transfer fail with `error` after applying it when the
    /// error is a decode failure, before applying it otherwise.
    pub fn fail_next_transfer(&self, error: LedgerError) {
        self.lock().next_transfer_error = Some(error);
    }

    pub fn fail_balance_queries(&self, fail: bool) {
        self.lock().fail_balance_queries = fail;
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn account_balance(&self, account: &AccountIdentifier) -> Result<Tokens, LedgerError> {
        let state = self.lock();
        if state.fail_balance_queries {
            return Err(LedgerError::Transport("balance queries disabled".into()));
        }
        Ok(Tokens::from_e8s(state.balances.get(account).copied().unwrap_or(0)))
    }

    async fn transfer(&self, from: &Identity, args: TransferArgs) -> Result<BlockHeight, LedgerError> {
        let mut state = self.lock();
        let injected = state.next_transfer_error.take();
        if let Some(err) = &injected {
            if !err.is_decode() {
                return Err(err.clone());
            }
        }

        let source = from.account_identifier();
        let debit = args
            .amount
            .e8s
            .checked_add(args.fee.e8s)
            .ok_or_else(|| LedgerError::Rejected("amount overflow".into()))?;
        let available = state.balances.get(&source).copied().unwrap_or(0);
        if available < debit {
            return Err(LedgerError::Rejected(format!(
                "insufficient funds: balance {}, needed {}",
                available, debit
            )));
        }
        state.balances.insert(source, available - debit);
        let credited = state.balances.entry(args.to).or_default();
        *credited = credited.saturating_add(args.amount.e8s);

        let height = state.transfers.len() as BlockHeight;
        state.transfers.push(RecordedTransfer {
            height,
            from: source,
            args,
        });

        match injected {
            Some(err) => Err(err),
            None => Ok(height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::{Principal, TRANSFER_FEE_E8S};

    #[tokio::test]
    async fn transfer_moves_amount_and_burns_fee() {
        let ledger = MemoryLedger::new();
        let from = Identity::from_seed(&[7u8; 32]);
        let to = AccountIdentifier::from_principal(&Principal::anonymous(), None);
        ledger.credit(&from.account_identifier(), 100_000);

        let args = TransferArgs::new(to, Tokens::from_e8s(50_000), Tokens::from_e8s(TRANSFER_FEE_E8S));
        let height = ledger.transfer(&from, args).await.unwrap();

        assert_eq!(height, 0);
        assert_eq!(ledger.balance_of(&from.account_identifier()), 40_000);
        assert_eq!(ledger.balance_of(&to), 50_000);
    }

    #[tokio::test]
    async fn rejects_overdraft() {
        let ledger = MemoryLedger::new();
        let from = Identity::from_seed(&[7u8; 32]);
        let to = AccountIdentifier::from_principal(&Principal::anonymous(), None);
        let args = TransferArgs::new(to, Tokens::from_e8s(1), Tokens::from_e8s(TRANSFER_FEE_E8S));
        let err = ledger.transfer(&from, args).await.unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
        assert!(ledger.transfers().is_empty());
    }
}
