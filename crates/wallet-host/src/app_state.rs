use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use bridge_core::{BlockHeight, LedgerClient};
use tracing::info;

use crate::bridge_host::BridgeHost;
use crate::browser_tab::BrowserTab;
use crate::config::HostConfig;
use crate::dialogs::DialogSurface;
use crate::injector::ScriptInjector;
use crate::wallet_store::{refresh_balances, submit_transfer, WalletStore};

/// Everything the host keeps for one running wallet.
pub struct AppState {
    pub config: HostConfig,
    pub tab: Mutex<BrowserTab>,
    pub wallet_store: Arc<Mutex<WalletStore>>,
    pub bridge: BridgeHost,
    ledger: Arc<dyn LedgerClient>,
}

impl AppState {
    pub fn new(
        config: HostConfig,
        ledger: Arc<dyn LedgerClient>,
        injector: Arc<dyn ScriptInjector>,
        dialogs: Arc<dyn DialogSurface>,
    ) -> Result<Self> {
        let tab = BrowserTab::new(&config.home_url)?;
        let wallet_store = Arc::new(Mutex::new(WalletStore::new()));
        let bridge = BridgeHost::new(
            wallet_store.clone(),
            ledger.clone(),
            injector,
            dialogs,
            config.transfer_fee(),
        );
        Ok(Self {
            config,
            tab: Mutex::new(tab),
            wallet_store,
            bridge,
            ledger,
        })
    }

    /// Handles a message posted by the page currently loaded in the tab.
    pub async fn on_page_message(&self, raw: &str) {
        let origin = self.tab().origin().to_string();
        self.bridge.handle_message(raw, &origin).await;
    }

    pub fn navigate(&self, input: &str) -> Result<String> {
        let url = self.tab().navigate(input)?.to_string();
        self.bridge.on_page_reload();
        Ok(url)
    }

    pub fn reload(&self) -> u64 {
        let key = self.tab().reload();
        self.bridge.on_page_reload();
        key
    }

    pub fn current_url(&self) -> String {
        self.tab().current_url().to_string()
    }

    pub fn wallet(&self) -> MutexGuard<'_, WalletStore> {
        self.wallet_store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub async fn refresh_balances(&self) {
        refresh_balances(&self.wallet_store, self.ledger.as_ref()).await;
    }

    /// Transfer started from the wallet screen rather than a page. No
    /// approval is involved; balances are refreshed afterwards.
    pub async fn send_transfer(&self, recipient: &str, amount: &str) -> Result<Option<BlockHeight>> {
        let identity = self
            .wallet()
            .current()
            .cloned()
            .ok_or_else(|| anyhow!("no wallet account selected"))?;
        let height = submit_transfer(
            self.ledger.as_ref(),
            &identity,
            recipient,
            amount,
            self.config.transfer_fee(),
        )
        .await?;
        info!(%recipient, %amount, ?height, "wallet transfer sent");
        self.refresh_balances().await;
        Ok(height)
    }

    fn tab(&self) -> MutexGuard<'_, BrowserTab> {
        self.tab.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
