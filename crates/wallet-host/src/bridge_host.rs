//! Host-side handling of bridge messages.
//!
//! Inbound envelopes are parsed and dispatched by kind. Connect, transfer and
//! sign requests go through the [`ApprovalBroker`]; the decision is picked up
//! on a spawned task that performs the privileged work and injects the answer
//! back into the page. Any error while handling a message fails every
//! outstanding page call and drops the page session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bridge_core::error::Result;
use bridge_core::{
    ApprovalBroker, ApprovalPayload, ApprovalView, BridgeEnvelope, BridgeError, ConfirmResult,
    ConnectResult, Identity, Injection, LedgerClient, MessageType, PromptResult, ResolverSlot,
    SessionState, SignResult, Tokens, TransferResult,
};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::dialogs::DialogSurface;
use crate::injector::ScriptInjector;
use crate::wallet_store::{fetch_balance, refresh_balances, submit_transfer, WalletStore};

/// Signature returned for approved sign requests; message signing is not
/// wired to the wallet keys.
pub const PLACEHOLDER_SIGNATURE: &str = "unsupported";

const NO_WALLET_MESSAGE: &str = "No wallet available";
const TRANSFER_FAILED_MESSAGE: &str = "Transfer failed. Please check the details and try again.";

#[derive(Clone)]
pub struct BridgeHost {
    broker: Arc<Mutex<ApprovalBroker>>,
    wallet: Arc<Mutex<WalletStore>>,
    session: Arc<Mutex<SessionState>>,
    /// Bumped whenever the page is replaced; connects raised by an earlier
    /// page are not applied.
    page_generation: Arc<AtomicU64>,
    ledger: Arc<dyn LedgerClient>,
    injector: Arc<dyn ScriptInjector>,
    dialogs: Arc<dyn DialogSurface>,
    transfer_fee: Tokens,
}

impl BridgeHost {
    pub fn new(
        wallet: Arc<Mutex<WalletStore>>,
        ledger: Arc<dyn LedgerClient>,
        injector: Arc<dyn ScriptInjector>,
        dialogs: Arc<dyn DialogSurface>,
        transfer_fee: Tokens,
    ) -> Self {
        Self {
            broker: Arc::new(Mutex::new(ApprovalBroker::new())),
            wallet,
            session: Arc::new(Mutex::new(SessionState::new())),
            page_generation: Arc::new(AtomicU64::new(0)),
            ledger,
            injector,
            dialogs,
            transfer_fee,
        }
    }

    /// Entry point for raw page messages. Never fails: errors trigger the
    /// fail-safe broadcast.
    pub async fn handle_message(&self, raw: &str, origin: &str) {
        if let Err(err) = self.dispatch(raw, origin).await {
            error!(%origin, error = %err, "bridge message failed; failing outstanding calls");
            self.fail_all();
        }
    }

    /// The request the user is asked to decide on, if any.
    pub fn current_approval(&self) -> Option<ApprovalView> {
        self.broker().head_view()
    }

    pub fn pending_approvals(&self) -> usize {
        self.broker().len()
    }

    /// Records the user's decision. Unknown or already-resolved ids are
    /// ignored.
    pub fn resolve_approval(&self, id: &str, approved: bool) -> bool {
        self.broker().resolve(id, approved)
    }

    /// Host-side view of the page session.
    pub fn session(&self) -> SessionState {
        self.session_state().clone()
    }

    /// Disconnects the page from the host side.
    pub fn disconnect_page(&self) {
        self.session_state().disconnect();
        self.injector.deliver(Injection::disconnected());
    }

    /// The page was reloaded or navigated; its provider starts disconnected.
    pub fn on_page_reload(&self) {
        self.page_generation.fetch_add(1, Ordering::SeqCst);
        self.session_state().disconnect();
    }

    /// Resolves every outstanding page call with a failure payload and
    /// forces the session to disconnected.
    pub fn fail_all(&self) {
        self.session_state().disconnect();
        self.injector.deliver(Injection::FailAll);
    }

    async fn dispatch(&self, raw: &str, origin: &str) -> Result<()> {
        let Some(envelope) = BridgeEnvelope::parse(raw)? else {
            debug!(%origin, "ignoring message from foreign source");
            return Ok(());
        };
        debug!(%origin, kind = envelope.kind.as_str(), id = ?envelope.id, "bridge message");
        let id = envelope.id.clone().unwrap_or_default();
        let data = envelope.data();

        match envelope.kind {
            MessageType::ConnectWallet => self.on_connect(id, origin),
            MessageType::GetBalance => self.on_balance(id).await?,
            MessageType::RequestTransfer => match (data.recipient, data.amount) {
                (Some(recipient), Some(amount)) => self.on_transfer(id, origin, recipient, amount),
                _ => self.answer(
                    &id,
                    ResolverSlot::Transfer,
                    &TransferResult::failed("Recipient and amount are required"),
                ),
            },
            MessageType::RequestSign => match data.message {
                Some(message) => self.on_sign(id, origin, message),
                None => self.answer(&id, ResolverSlot::Sign, &SignResult::failed("Message is required")),
            },
            MessageType::DisconnectWallet => {
                info!(%origin, "page disconnected");
                self.disconnect_page();
            }
            MessageType::Alert => {
                let message = data.message.unwrap_or_default();
                self.dialogs.alert(origin, &message).await;
            }
            MessageType::Confirm => self.on_confirm(id, origin, data.message.unwrap_or_default()),
            MessageType::Prompt => self.on_prompt(id, origin, data.message.unwrap_or_default()),
        }
        Ok(())
    }

    fn on_connect(&self, id: String, origin: &str) {
        if self.wallet().is_empty() {
            info!(%origin, "connect requested with no wallet");
            self.session_state().disconnect();
            self.answer(&id, ResolverSlot::Connect, &ConnectResult::refused(NO_WALLET_MESSAGE));
            return;
        }

        let generation = self.page_generation.load(Ordering::SeqCst);
        let decision = self.request_approval(ApprovalPayload::Connect, origin);
        let host = self.clone();
        tokio::spawn(async move {
            let approved = decision.await.unwrap_or(false);
            host.finish_connect(&id, generation, approved);
        });
    }

    fn finish_connect(&self, id: &str, generation: u64, approved: bool) {
        if self.page_generation.load(Ordering::SeqCst) != generation {
            info!(request_id = %id, approved, "page replaced before connect was decided; dropping");
            return;
        }
        if !approved {
            self.session_state().disconnect();
            self.answer(
                id,
                ResolverSlot::Connect,
                &ConnectResult::refused("User rejected the connection request"),
            );
            return;
        }
        let Some(identity) = self.current_identity() else {
            self.session_state().disconnect();
            self.answer(id, ResolverSlot::Connect, &ConnectResult::refused(NO_WALLET_MESSAGE));
            return;
        };

        let principal = identity.principal().to_text();
        info!(%principal, "page connected");
        self.session_state().connect(principal.clone());
        self.answer(id, ResolverSlot::Connect, &ConnectResult::connected(principal));
    }

    async fn on_balance(&self, id: String) -> Result<()> {
        let identity = self.current_identity().ok_or(BridgeError::NoIdentityAvailable)?;
        let balance = fetch_balance(self.ledger.as_ref(), &identity.account_identifier()).await;
        self.answer(&id, ResolverSlot::Balance, &Value::String(balance));
        Ok(())
    }

    fn on_transfer(&self, id: String, origin: &str, recipient: String, amount: String) {
        let payload = ApprovalPayload::Transfer {
            recipient: recipient.clone(),
            amount: amount.clone(),
        };
        let decision = self.request_approval(payload, origin);
        let host = self.clone();
        tokio::spawn(async move {
            let approved = decision.await.unwrap_or(false);
            host.finish_transfer(&id, approved, &recipient, &amount).await;
        });
    }

    async fn finish_transfer(&self, id: &str, approved: bool, recipient: &str, amount: &str) {
        if !approved {
            self.answer(
                id,
                ResolverSlot::Transfer,
                &TransferResult::failed("User rejected the transfer"),
            );
            return;
        }
        let Some(identity) = self.current_identity() else {
            self.answer(id, ResolverSlot::Transfer, &TransferResult::failed(NO_WALLET_MESSAGE));
            return;
        };

        match submit_transfer(self.ledger.as_ref(), &identity, recipient, amount, self.transfer_fee).await {
            Ok(_) => {
                self.answer(id, ResolverSlot::Transfer, &TransferResult::succeeded("Transfer completed"));
                refresh_balances(&self.wallet, self.ledger.as_ref()).await;
            }
            Err(err) => {
                warn!(request_id = %id, error = %err, "transfer failed");
                self.answer(id, ResolverSlot::Transfer, &TransferResult::failed(TRANSFER_FAILED_MESSAGE));
            }
        }
    }

    fn on_sign(&self, id: String, origin: &str, message: String) {
        let decision = self.request_approval(ApprovalPayload::Sign { message }, origin);
        let host = self.clone();
        tokio::spawn(async move {
            let result = if decision.await.unwrap_or(false) {
                SignResult::signed("Message signed", PLACEHOLDER_SIGNATURE)
            } else {
                SignResult::failed("User rejected the signature request")
            };
            host.answer(&id, ResolverSlot::Sign, &result);
        });
    }

    fn on_confirm(&self, id: String, origin: &str, message: String) {
        let host = self.clone();
        let origin = origin.to_string();
        tokio::spawn(async move {
            let value = host.dialogs.confirm(&origin, &message).await;
            host.answer(&id, ResolverSlot::Confirm, &ConfirmResult { value });
        });
    }

    fn on_prompt(&self, id: String, origin: &str, message: String) {
        let host = self.clone();
        let origin = origin.to_string();
        tokio::spawn(async move {
            let value = host.dialogs.prompt(&origin, &message).await;
            host.answer(&id, ResolverSlot::Prompt, &PromptResult { value });
        });
    }

    fn request_approval(&self, payload: ApprovalPayload, origin: &str) -> oneshot::Receiver<bool> {
        let (_, decision) = self.broker().register(payload, origin);
        decision
    }

    fn answer<T: serde::Serialize>(&self, id: &str, slot: ResolverSlot, result: &T) {
        self.injector.deliver(Injection::resolve(id, slot, result));
    }

    fn current_identity(&self) -> Option<Identity> {
        self.wallet().current().cloned()
    }

    fn broker(&self) -> MutexGuard<'_, ApprovalBroker> {
        self.broker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wallet(&self) -> MutexGuard<'_, WalletStore> {
        self.wallet.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session_state(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
