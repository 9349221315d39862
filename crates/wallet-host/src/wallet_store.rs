use std::sync::{Mutex, PoisonError};

use anyhow::{anyhow, Result};
use bridge_core::{
    format_e8s, parse_amount, AccountIdentifier, BlockHeight, BridgeError, Identity,
    LedgerClient, Principal, Tokens, TransferArgs,
};
use serde::Serialize;
use tracing::{info, warn};

/// Balance shown for an account whose balance query failed.
pub const UNKNOWN_BALANCE: &str = "0.00000000";

/// Snapshot of one account exposed to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct AccountSnapshot {
    pub index: usize,
    pub label: String,
    pub principal: String,
    pub address: String,
    pub balance: Option<String>,
    pub is_current: bool,
}

struct WalletAccount {
    identity: Identity,
    balance: Option<String>,
}

/// In-memory list of wallet identities with a current selection.
#[derive(Default)]
pub struct WalletStore {
    accounts: Vec<WalletAccount>,
    current: usize,
}

impl WalletStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Adds a freshly generated account and makes it current.
    pub fn create_account(&mut self) -> AccountSnapshot {
        self.push(Identity::generate())
    }

    /// Adds an account from a hex-encoded 32-byte seed and makes it current.
    pub fn import_seed(&mut self, seed_hex: &str) -> Result<AccountSnapshot> {
        let bytes = hex::decode(seed_hex.trim()).map_err(|e| anyhow!("invalid seed: {}", e))?;
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| anyhow!("invalid seed: expected 32 bytes"))?;
        Ok(self.push(Identity::from_seed(&seed)))
    }

    pub fn add_identity(&mut self, identity: Identity) -> AccountSnapshot {
        self.push(identity)
    }

    pub fn switch_account(&mut self, index: usize) -> Result<AccountSnapshot> {
        if index >= self.accounts.len() {
            return Err(anyhow!("account not found: {}", index));
        }
        self.current = index;
        info!(index, "switched wallet account");
        Ok(self.snapshot(index))
    }

    /// The identity pages act as when connected.
    pub fn current(&self) -> Option<&Identity> {
        self.accounts.get(self.current).map(|account| &account.identity)
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.accounts.is_empty()).then_some(self.current)
    }

    pub fn current_snapshot(&self) -> Option<AccountSnapshot> {
        self.current_index().map(|index| self.snapshot(index))
    }

    pub fn snapshots(&self) -> Vec<AccountSnapshot> {
        (0..self.accounts.len()).map(|index| self.snapshot(index)).collect()
    }

    pub fn identities(&self) -> impl Iterator<Item = &Identity> {
        self.accounts.iter().map(|account| &account.identity)
    }

    pub fn account_identifiers(&self) -> Vec<AccountIdentifier> {
        self.accounts
            .iter()
            .map(|account| account.identity.account_identifier())
            .collect()
    }

    pub fn set_balance(&mut self, index: usize, balance: String) {
        if let Some(account) = self.accounts.get_mut(index) {
            account.balance = Some(balance);
        }
    }

    fn push(&mut self, identity: Identity) -> AccountSnapshot {
        self.accounts.push(WalletAccount {
            identity,
            balance: None,
        });
        self.current = self.accounts.len() - 1;
        let snapshot = self.snapshot(self.current);
        info!(index = snapshot.index, principal = %snapshot.principal, "wallet account added");
        snapshot
    }

    fn snapshot(&self, index: usize) -> AccountSnapshot {
        let account = &self.accounts[index];
        AccountSnapshot {
            index,
            label: format!("Account {}", index + 1),
            principal: account.identity.principal().to_text(),
            address: account.identity.account_identifier().to_hex(),
            balance: account.balance.clone(),
            is_current: index == self.current,
        }
    }
}

/// Queries every account's balance and stores the formatted result. A failed
/// query records [`UNKNOWN_BALANCE`].
pub async fn refresh_balances(wallet: &Mutex<WalletStore>, ledger: &dyn LedgerClient) {
    let accounts = wallet
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .account_identifiers();

    let mut balances = Vec::with_capacity(accounts.len());
    for account in &accounts {
        balances.push(fetch_balance(ledger, account).await);
    }

    let mut store = wallet.lock().unwrap_or_else(PoisonError::into_inner);
    for (index, balance) in balances.into_iter().enumerate() {
        store.set_balance(index, balance);
    }
}

/// Formatted balance of `account`, or [`UNKNOWN_BALANCE`] when the ledger
/// cannot be queried.
pub async fn fetch_balance(ledger: &dyn LedgerClient, account: &AccountIdentifier) -> String {
    match ledger.account_balance(account).await {
        Ok(tokens) => format_e8s(tokens.e8s),
        Err(err) => {
            warn!(account = %account, error = %err, "balance query failed");
            UNKNOWN_BALANCE.to_string()
        }
    }
}

/// Validates and submits a transfer from `from`. Returns the block height, or
/// `None` when the ledger accepted the call but its reply did not decode.
pub async fn submit_transfer(
    ledger: &dyn LedgerClient,
    from: &Identity,
    recipient: &str,
    amount: &str,
    fee: Tokens,
) -> Result<Option<BlockHeight>, BridgeError> {
    if recipient.trim().is_empty() {
        return Err(BridgeError::InvalidPrincipal("recipient is required".to_string()));
    }
    let recipient = Principal::from_text(recipient.trim())?;
    let amount = Tokens::from_e8s(parse_amount(amount)?);
    let to = AccountIdentifier::from_principal(&recipient, None);

    match ledger.transfer(from, TransferArgs::new(to, amount, fee)).await {
        Ok(height) => {
            info!(to = %to, amount = amount.e8s, height, "transfer submitted");
            Ok(Some(height))
        }
        Err(err) if err.is_decode() => {
            warn!(to = %to, amount = amount.e8s, error = %err, "transfer reply undecodable; treating as delivered");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_ledger::MemoryLedger;
    use bridge_core::{LedgerError, TRANSFER_FEE_E8S};

    const ZERO_SEED: &str = "0000000000000000000000000000000000000000000000000000000000000000";

    #[test]
    fn new_accounts_become_current() {
        let mut store = WalletStore::new();
        assert!(store.current().is_none());

        store.create_account();
        let second = store.import_seed(ZERO_SEED).unwrap();
        assert_eq!(second.index, 1);
        assert_eq!(second.label, "Account 2");
        assert_eq!(
            second.principal,
            "535yc-uxytb-gfk7h-tny7p-vjkoe-i4krp-3qmcl-uqfgr-cpgej-yqtjq-rqe"
        );
        assert_eq!(store.current_index(), Some(1));

        store.switch_account(0).unwrap();
        assert!(store.snapshots()[0].is_current);
        assert!(store.switch_account(7).is_err());
    }

    #[test]
    fn rejects_short_seeds() {
        let mut store = WalletStore::new();
        assert!(store.import_seed("abcd").is_err());
        assert!(store.import_seed("zz").is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn refresh_formats_balances_and_tolerates_failures() {
        let ledger = MemoryLedger::new();
        let wallet = Mutex::new(WalletStore::new());
        let funded = wallet.lock().unwrap().import_seed(ZERO_SEED).unwrap();
        wallet.lock().unwrap().create_account();
        ledger.credit(&AccountIdentifier::from_hex(&funded.address).unwrap(), 123_456_789);

        refresh_balances(&wallet, &ledger).await;
        let snapshots = wallet.lock().unwrap().snapshots();
        assert_eq!(snapshots[0].balance.as_deref(), Some("1.23456789"));
        assert_eq!(snapshots[1].balance.as_deref(), Some("0.00000000"));

        ledger.fail_balance_queries(true);
        refresh_balances(&wallet, &ledger).await;
        let snapshots = wallet.lock().unwrap().snapshots();
        assert_eq!(snapshots[0].balance.as_deref(), Some(UNKNOWN_BALANCE));
    }

    #[tokio::test]
    async fn transfer_validates_before_calling_ledger() {
        let ledger = MemoryLedger::new();
        let from = Identity::from_seed(&[0u8; 32]);
        let fee = Tokens::from_e8s(TRANSFER_FEE_E8S);

        assert!(matches!(
            submit_transfer(&ledger, &from, "", "1", fee).await,
            Err(BridgeError::InvalidPrincipal(_))
        ));
        assert!(matches!(
            submit_transfer(&ledger, &from, "aaaaa-aa", "lots", fee).await,
            Err(BridgeError::InvalidAmount(_))
        ));
        assert!(ledger.transfers().is_empty());
    }

    #[tokio::test]
    async fn decode_failures_count_as_delivered() {
        let ledger = MemoryLedger::new();
        let from = Identity::from_seed(&[0u8; 32]);
        ledger.credit(&from.account_identifier(), 10 * bridge_core::E8S_PER_TOKEN);
        ledger.fail_next_transfer(LedgerError::Decode("reply type mismatch".into()));

        let outcome = submit_transfer(&ledger, &from, "2vxsx-fae", "1", Tokens::from_e8s(TRANSFER_FEE_E8S))
            .await
            .unwrap();
        assert_eq!(outcome, None);

        ledger.fail_next_transfer(LedgerError::Rejected("insufficient funds".into()));
        let err = submit_transfer(&ledger, &from, "2vxsx-fae", "1", Tokens::from_e8s(TRANSFER_FEE_E8S))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::LedgerCallFailure(_)));
    }
}
