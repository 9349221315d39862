pub mod app_state;
pub mod bridge_host;
pub mod browser_tab;
pub mod config;
pub mod dialogs;
pub mod injector;
pub mod memory_ledger;
pub mod wallet_store;

// Re-export commonly used items at the crate root
pub use app_state::AppState;
pub use bridge_host::{BridgeHost, PLACEHOLDER_SIGNATURE};
pub use browser_tab::{normalize_url, BrowserTab, TabError};
pub use config::HostConfig;
pub use dialogs::{DialogSurface, HeadlessDialogs};
pub use injector::ScriptInjector;
pub use memory_ledger::MemoryLedger;
pub use wallet_store::{AccountSnapshot, WalletStore};
