use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bridge_core::{
    AccountIdentifier, ApprovalKind, HostChannel, Identity, Injection, LedgerError, Principal,
    Provider, E8S_PER_TOKEN, TRANSFER_FEE_E8S,
};
use tokio::sync::mpsc;
use wallet_host::{
    BridgeHost, DialogSurface, MemoryLedger, ScriptInjector, WalletStore, PLACEHOLDER_SIGNATURE,
};

const ORIGIN: &str = "https://a";

/// Page-side outbound channel feeding the host's message loop.
struct PageChannel {
    tx: mpsc::UnboundedSender<String>,
}

impl HostChannel for PageChannel {
    fn post_message(&self, message: String) {
        let _ = self.tx.send(message);
    }
}

/// Delivers host injections straight into the page's provider.
struct PageInjector {
    provider: Arc<Provider>,
    delivered: Mutex<Vec<Injection>>,
}

impl ScriptInjector for PageInjector {
    fn inject_javascript(&self, _script: &str) {}

    fn deliver(&self, injection: Injection) {
        self.delivered.lock().unwrap().push(injection.clone());
        self.provider.receive(injection);
    }
}

#[derive(Default)]
struct ScriptedDialogs {
    alerts: Mutex<Vec<String>>,
}

#[async_trait]
impl DialogSurface for ScriptedDialogs {
    async fn alert(&self, _origin: &str, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }

    async fn confirm(&self, _origin: &str, message: &str) -> bool {
        message == "proceed?"
    }

    async fn prompt(&self, _origin: &str, _message: &str) -> Option<String> {
        Some("typed".to_string())
    }
}

struct Harness {
    provider: Arc<Provider>,
    host: BridgeHost,
    ledger: Arc<MemoryLedger>,
    wallet: Arc<Mutex<WalletStore>>,
    dialogs: Arc<ScriptedDialogs>,
    injector: Arc<PageInjector>,
}

impl Harness {
    fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let provider = Provider::new(Arc::new(PageChannel { tx }));
        let injector = Arc::new(PageInjector {
            provider: provider.clone(),
            delivered: Mutex::new(Vec::new()),
        });
        let ledger = Arc::new(MemoryLedger::new());
        let wallet = Arc::new(Mutex::new(WalletStore::new()));
        let dialogs = Arc::new(ScriptedDialogs::default());
        let host = BridgeHost::new(
            wallet.clone(),
            ledger.clone(),
            injector.clone(),
            dialogs.clone(),
            bridge_core::Tokens::from_e8s(TRANSFER_FEE_E8S),
        );

        let pump = host.clone();
        tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                pump.handle_message(&raw, ORIGIN).await;
            }
        });

        Self {
            provider,
            host,
            ledger,
            wallet,
            dialogs,
            injector,
        }
    }

    fn with_funded_account(self, e8s: u64) -> Self {
        let identity = Identity::from_seed(&[0u8; 32]);
        self.ledger.credit(&identity.account_identifier(), e8s);
        self.wallet.lock().unwrap().add_identity(identity);
        self
    }

    async fn wait_for_approvals(&self, count: usize) {
        wait_until(|| self.host.pending_approvals() == count).await;
    }

    async fn connect(&self) {
        let provider = self.provider.clone();
        let call = tokio::spawn(async move { provider.request_connect().await });
        self.wait_for_approvals(1).await;
        let head = self.host.current_approval().unwrap();
        assert!(self.host.resolve_approval(&head.id, true));
        assert!(call.await.unwrap().unwrap().connected);
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn connect_without_wallet_resolves_immediately() -> Result<()> {
    let harness = Harness::new();

    let outcome = harness.provider.request_connect().await?;
    assert!(!outcome.connected);
    assert_eq!(outcome.message.as_deref(), Some("No wallet available"));
    assert_eq!(harness.host.pending_approvals(), 0);
    assert!(!harness.provider.is_connected());
    Ok(())
}

#[tokio::test]
async fn approved_connect_shares_principal() -> Result<()> {
    let harness = Harness::new().with_funded_account(0);
    let provider = harness.provider.clone();
    let call = tokio::spawn(async move { provider.request_connect().await });

    harness.wait_for_approvals(1).await;
    let view = harness.host.current_approval().unwrap();
    assert_eq!(view.kind, ApprovalKind::Connect);
    assert_eq!(view.description, "https://a is requesting to connect to your wallet");
    harness.host.resolve_approval(&view.id, true);

    let outcome = call.await??;
    let expected = "535yc-uxytb-gfk7h-tny7p-vjkoe-i4krp-3qmcl-uqfgr-cpgej-yqtjq-rqe";
    assert_eq!(outcome.principal.as_deref(), Some(expected));
    assert_eq!(harness.provider.principal()?, expected);
    assert_eq!(harness.host.session().principal(), Some(expected));
    assert!(harness.host.current_approval().is_none());
    Ok(())
}

#[tokio::test]
async fn rejected_connect_stays_disconnected() -> Result<()> {
    let harness = Harness::new().with_funded_account(0);
    let provider = harness.provider.clone();
    let call = tokio::spawn(async move { provider.request_connect().await });

    harness.wait_for_approvals(1).await;
    let id = harness.host.current_approval().unwrap().id;
    harness.host.resolve_approval(&id, false);
    assert!(!harness.host.resolve_approval(&id, true));

    let outcome = call.await??;
    assert!(!outcome.connected);
    assert!(outcome.message.is_some());
    assert!(!harness.provider.is_connected());
    assert!(!harness.host.session().is_connected());
    Ok(())
}

#[tokio::test]
async fn approvals_are_presented_in_arrival_order() -> Result<()> {
    let harness = Harness::new().with_funded_account(10 * E8S_PER_TOKEN);
    harness.connect().await;

    let provider = harness.provider.clone();
    let transfer = tokio::spawn(async move { provider.request_transfer("2vxsx-fae", "1.5").await });
    harness.wait_for_approvals(1).await;
    let provider = harness.provider.clone();
    let sign = tokio::spawn(async move { provider.request_sign_message("gm").await });
    harness.wait_for_approvals(2).await;

    let head = harness.host.current_approval().unwrap();
    assert_eq!(head.kind, ApprovalKind::Transfer);
    assert_eq!(head.amount.as_deref(), Some("1.5"));
    harness.host.resolve_approval(&head.id, true);

    let outcome = transfer.await??;
    assert!(outcome.success);
    assert_eq!(outcome.message, "Transfer completed");

    let head = harness.host.current_approval().unwrap();
    assert_eq!(head.kind, ApprovalKind::Sign);
    assert_eq!(head.message.as_deref(), Some("gm"));
    harness.host.resolve_approval(&head.id, false);
    assert!(!sign.await??.success);

    let recipient = AccountIdentifier::from_principal(&Principal::anonymous(), None);
    assert_eq!(harness.ledger.balance_of(&recipient), 150_000_000);
    let transfers = harness.ledger.transfers();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].args.fee.e8s, TRANSFER_FEE_E8S);
    assert_eq!(transfers[0].args.memo, 0);
    Ok(())
}

#[tokio::test]
async fn approved_transfer_refreshes_wallet_balance() -> Result<()> {
    let harness = Harness::new().with_funded_account(2 * E8S_PER_TOKEN);
    harness.connect().await;

    let provider = harness.provider.clone();
    let transfer = tokio::spawn(async move { provider.request_transfer("2vxsx-fae", "1").await });
    harness.wait_for_approvals(1).await;
    let id = harness.host.current_approval().unwrap().id;
    harness.host.resolve_approval(&id, true);
    assert!(transfer.await??.success);

    wait_until(|| {
        harness.wallet.lock().unwrap().snapshots()[0].balance.as_deref() == Some("0.99990000")
    })
    .await;
    Ok(())
}

#[tokio::test]
async fn rejected_transfer_skips_ledger() -> Result<()> {
    let harness = Harness::new().with_funded_account(E8S_PER_TOKEN);
    harness.connect().await;

    let provider = harness.provider.clone();
    let transfer = tokio::spawn(async move { provider.request_transfer("2vxsx-fae", "0.1").await });
    harness.wait_for_approvals(1).await;
    let id = harness.host.current_approval().unwrap().id;
    harness.host.resolve_approval(&id, false);

    let outcome = transfer.await??;
    assert!(!outcome.success);
    assert!(harness.ledger.transfers().is_empty());
    Ok(())
}

#[tokio::test]
async fn transfer_setup_failure_reports_failure() -> Result<()> {
    let harness = Harness::new().with_funded_account(E8S_PER_TOKEN);
    harness.connect().await;

    let provider = harness.provider.clone();
    let transfer = tokio::spawn(async move { provider.request_transfer("not-a-principal", "1").await });
    harness.wait_for_approvals(1).await;
    let id = harness.host.current_approval().unwrap().id;
    harness.host.resolve_approval(&id, true);

    let outcome = transfer.await??;
    assert!(!outcome.success);
    assert_eq!(outcome.message, "Transfer failed. Please check the details and try again.");
    assert!(harness.provider.is_connected());
    Ok(())
}

#[tokio::test]
async fn undecodable_transfer_reply_counts_as_success() -> Result<()> {
    let harness = Harness::new().with_funded_account(E8S_PER_TOKEN);
    harness.connect().await;
    harness
        .ledger
        .fail_next_transfer(LedgerError::Decode("unexpected reply".into()));

    let provider = harness.provider.clone();
    let transfer = tokio::spawn(async move { provider.request_transfer("2vxsx-fae", "0.5").await });
    harness.wait_for_approvals(1).await;
    let id = harness.host.current_approval().unwrap().id;
    harness.host.resolve_approval(&id, true);

    assert!(transfer.await??.success);
    Ok(())
}

#[tokio::test]
async fn approved_sign_returns_placeholder() -> Result<()> {
    let harness = Harness::new().with_funded_account(0);
    harness.connect().await;

    let provider = harness.provider.clone();
    let sign = tokio::spawn(async move { provider.request_sign_message("hello").await });
    harness.wait_for_approvals(1).await;
    let id = harness.host.current_approval().unwrap().id;
    harness.host.resolve_approval(&id, true);

    let outcome = sign.await??;
    assert!(outcome.success);
    assert_eq!(outcome.signature.as_deref(), Some(PLACEHOLDER_SIGNATURE));
    Ok(())
}

#[tokio::test]
async fn balance_renders_eight_decimals() -> Result<()> {
    let harness = Harness::new().with_funded_account(123_456_789);
    harness.connect().await;

    assert_eq!(harness.provider.balance().await?, "1.23456789");
    assert_eq!(harness.host.pending_approvals(), 0);
    Ok(())
}

#[tokio::test]
async fn malformed_message_fails_every_outstanding_call() -> Result<()> {
    let harness = Harness::new().with_funded_account(E8S_PER_TOKEN);
    harness.connect().await;

    let provider = harness.provider.clone();
    let transfer = tokio::spawn(async move { provider.request_transfer("2vxsx-fae", "0.1").await });
    harness.wait_for_approvals(1).await;
    let provider = harness.provider.clone();
    let sign = tokio::spawn(async move { provider.request_sign_message("gm").await });
    harness.wait_for_approvals(2).await;
    let provider = harness.provider.clone();
    let reconnect = tokio::spawn(async move { provider.request_connect().await });
    harness.wait_for_approvals(3).await;

    harness.host.handle_message("{this is not json", ORIGIN).await;

    assert!(!transfer.await??.success);
    assert!(!sign.await??.success);
    let reconnect = reconnect.await??;
    assert!(!reconnect.connected);
    assert_eq!(reconnect.message.as_deref(), Some("Connection failed"));
    assert!(!harness.provider.is_connected());
    assert!(!harness.host.session().is_connected());
    assert_eq!(harness.provider.outstanding(), 0);
    Ok(())
}

#[tokio::test]
async fn balance_without_wallet_triggers_fail_safe() -> Result<()> {
    let harness = Harness::new();
    harness.provider.receive(Injection::Session {
        connected: true,
        principal: Some("2vxsx-fae".into()),
    });

    assert_eq!(harness.provider.balance().await?, "0");
    assert!(!harness.provider.is_connected());
    Ok(())
}

#[tokio::test]
async fn foreign_messages_are_ignored() -> Result<()> {
    let harness = Harness::new();
    harness
        .host
        .handle_message(r#"{"type":"CONNECT_WALLET","source":"other","id":"x"}"#, ORIGIN)
        .await;
    assert!(harness.injector.delivered.lock().unwrap().is_empty());
    assert_eq!(harness.host.pending_approvals(), 0);
    Ok(())
}

#[tokio::test]
async fn page_disconnect_clears_both_sides() -> Result<()> {
    let harness = Harness::new().with_funded_account(0);
    harness.connect().await;
    assert!(harness.host.session().is_connected());

    harness.provider.disconnect();
    assert!(!harness.provider.is_connected());
    wait_until(|| !harness.host.session().is_connected()).await;
    Ok(())
}

#[tokio::test]
async fn dialogs_round_trip() -> Result<()> {
    let harness = Harness::new();

    harness.provider.alert("heads up");
    assert!(harness.provider.confirm("proceed?").await?);
    assert!(!harness.provider.confirm("other").await?);
    assert_eq!(harness.provider.prompt("name?").await?.as_deref(), Some("typed"));
    wait_until(|| harness.dialogs.alerts.lock().unwrap().as_slice() == ["heads up".to_string()]).await;
    Ok(())
}

#[tokio::test]
async fn rejected_reconnect_disconnects_host_too() -> Result<()> {
    let harness = Harness::new().with_funded_account(0);
    harness.connect().await;

    let provider = harness.provider.clone();
    let call = tokio::spawn(async move { provider.request_connect().await });
    harness.wait_for_approvals(1).await;
    let id = harness.host.current_approval().unwrap().id;
    harness.host.resolve_approval(&id, false);

    assert!(!call.await??.connected);
    assert!(!harness.provider.is_connected());
    assert!(!harness.host.session().is_connected());
    Ok(())
}

#[tokio::test]
async fn connect_decided_after_reload_is_dropped() -> Result<()> {
    let harness = Harness::new().with_funded_account(0);
    let provider = harness.provider.clone();
    let call = tokio::spawn(async move { provider.request_connect().await });
    harness.wait_for_approvals(1).await;

    // The page is replaced; its provider starts over with nothing pending.
    harness.host.on_page_reload();
    harness.provider.receive(Injection::FailAll);
    assert!(!call.await??.connected);

    let id = harness.host.current_approval().unwrap().id;
    assert!(harness.host.resolve_approval(&id, true));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!harness.host.session().is_connected());
    assert!(!harness.provider.is_connected());
    assert!(!harness
        .injector
        .delivered
        .lock()
        .unwrap()
        .iter()
        .any(|injection| matches!(injection, Injection::Resolve { .. })));
    Ok(())
}
