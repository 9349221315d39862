//! Page-side provider runtime.
//!
//! Every capability call posts one envelope to the host and parks a
//! continuation under a fresh id. The host answers through
//! [`Provider::receive`]; calls of the same kind may overlap, each waits on
//! its own id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BridgeError, Result};
use crate::protocol::{
    BridgeEnvelope, ConfirmResult, ConnectResult, Injection, MessageType, PromptResult,
    RequestData, ResolverSlot, SignResult, TransferResult,
};
use crate::session::SessionState;

/// Outbound half of the page/host channel.
pub trait HostChannel: Send + Sync {
    fn post_message(&self, message: String);
}

struct PendingCall {
    slot: ResolverSlot,
    sender: oneshot::Sender<Value>,
}

#[derive(Default)]
struct ProviderState {
    session: SessionState,
    pending: HashMap<String, PendingCall>,
}

pub struct Provider {
    channel: Arc<dyn HostChannel>,
    state: Mutex<ProviderState>,
}

impl Provider {
    pub fn new(channel: Arc<dyn HostChannel>) -> Arc<Self> {
        Arc::new(Self {
            channel,
            state: Mutex::new(ProviderState::default()),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.lock().session.is_connected()
    }

    pub fn session(&self) -> SessionState {
        self.lock().session.clone()
    }

    /// Number of calls still waiting on the host.
    pub fn outstanding(&self) -> usize {
        self.lock().pending.len()
    }

    pub async fn request_connect(&self) -> Result<ConnectResult> {
        let reply = self.dispatch(MessageType::ConnectWallet, None)?;
        await_result(reply).await
    }

    /// Drops the local session and tells the host; nothing comes back.
    pub fn disconnect(&self) {
        self.lock().session.disconnect();
        self.notify(MessageType::DisconnectWallet, None);
    }

    pub fn principal(&self) -> Result<String> {
        self.lock().session.require_principal().map(str::to_string)
    }

    pub async fn balance(&self) -> Result<String> {
        self.require_connected()?;
        let value = self.dispatch(MessageType::GetBalance, None)?.wait().await?;
        match value {
            Value::String(balance) => Ok(balance),
            Value::Number(number) => Ok(number.to_string()),
            other => Err(BridgeError::malformed(format!("unexpected balance payload: {other}"))),
        }
    }

    pub async fn request_transfer(
        &self,
        recipient: impl Into<String>,
        amount: impl Into<String>,
    ) -> Result<TransferResult> {
        self.require_connected()?;
        let data = RequestData {
            recipient: Some(recipient.into()),
            amount: Some(amount.into()),
            message: None,
        };
        let reply = self.dispatch(MessageType::RequestTransfer, Some(data))?;
        await_result(reply).await
    }

    pub async fn request_sign_message(&self, message: impl Into<String>) -> Result<SignResult> {
        self.require_connected()?;
        let reply = self.dispatch(MessageType::RequestSign, Some(message_data(message)))?;
        await_result(reply).await
    }

    pub fn alert(&self, message: impl Into<String>) {
        self.notify(MessageType::Alert, Some(message_data(message)));
    }

    pub async fn confirm(&self, message: impl Into<String>) -> Result<bool> {
        let reply = self.dispatch(MessageType::Confirm, Some(message_data(message)))?;
        let result: ConfirmResult = await_result(reply).await?;
        Ok(result.value)
    }

    pub async fn prompt(&self, message: impl Into<String>) -> Result<Option<String>> {
        let reply = self.dispatch(MessageType::Prompt, Some(message_data(message)))?;
        let result: PromptResult = await_result(reply).await?;
        Ok(result.value)
    }

    /// Host re-entry point.
    pub fn receive(&self, injection: Injection) {
        let mut state = self.lock();
        match injection {
            Injection::Resolve { id, slot, result } => {
                let Some(call) = state.pending.remove(&id) else {
                    debug!(request_id = %id, ?slot, "no outstanding call for resolution");
                    return;
                };
                if call.slot != slot {
                    warn!(request_id = %id, expected = ?call.slot, got = ?slot, "resolution slot mismatch");
                }
                if call.slot == ResolverSlot::Connect {
                    match serde_json::from_value::<ConnectResult>(result.clone()) {
                        Ok(outcome) => state.session.apply(outcome.connected, outcome.principal),
                        Err(_) => state.session.disconnect(),
                    }
                }
                let _ = call.sender.send(result);
            }
            Injection::Session {
                connected,
                principal,
            } => state.session.apply(connected, principal),
            Injection::FailAll => {
                state.session.disconnect();
                for (id, call) in state.pending.drain() {
                    debug!(request_id = %id, slot = ?call.slot, "failing outstanding call");
                    let _ = call.sender.send(call.slot.failure_payload());
                }
            }
        }
    }

    /// Parses and applies an injection produced by [`Injection::to_script`]'s
    /// JSON payload.
    pub fn receive_json(&self, payload: &str) -> Result<()> {
        let injection: Injection = serde_json::from_str(payload)
            .map_err(|err| BridgeError::malformed(format!("invalid injection: {err}")))?;
        self.receive(injection);
        Ok(())
    }

    fn require_connected(&self) -> Result<()> {
        if self.lock().session.is_connected() {
            Ok(())
        } else {
            Err(BridgeError::NotConnected)
        }
    }

    fn dispatch(&self, kind: MessageType, data: Option<RequestData>) -> Result<PendingReply<'_>> {
        let slot = kind
            .slot()
            .ok_or_else(|| BridgeError::malformed(format!("{} expects no answer", kind.as_str())))?;
        let id = Uuid::new_v4().to_string();
        let (sender, receiver) = oneshot::channel();
        self.lock()
            .pending
            .insert(id.clone(), PendingCall { slot, sender });

        // Lock is released before posting: a synchronous host may answer inline.
        let envelope = BridgeEnvelope::new(kind, Some(id.clone()), data);
        self.channel.post_message(envelope.to_json());
        Ok(PendingReply {
            provider: self,
            id,
            receiver,
        })
    }

    fn notify(&self, kind: MessageType, data: Option<RequestData>) {
        let envelope = BridgeEnvelope::new(kind, None, data);
        self.channel.post_message(envelope.to_json());
    }

    fn lock(&self) -> MutexGuard<'_, ProviderState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn message_data(message: impl Into<String>) -> RequestData {
    RequestData {
        message: Some(message.into()),
        ..RequestData::default()
    }
}

/// Answer to one outbound call. Dropping it before the host answers
/// forgets the call, so abandoned callers do not accumulate.
struct PendingReply<'a> {
    provider: &'a Provider,
    id: String,
    receiver: oneshot::Receiver<Value>,
}

impl PendingReply<'_> {
    async fn wait(mut self) -> Result<Value> {
        (&mut self.receiver)
            .await
            .map_err(|_| BridgeError::ResolverDropped)
    }
}

impl Drop for PendingReply<'_> {
    fn drop(&mut self) {
        if self.provider.lock().pending.remove(&self.id).is_some() {
            debug!(request_id = %self.id, "caller went away before the host answered");
        }
    }
}

async fn await_result<T: DeserializeOwned>(reply: PendingReply<'_>) -> Result<T> {
    let value = reply.wait().await?;
    serde_json::from_value(value)
        .map_err(|err| BridgeError::malformed(format!("unexpected result payload: {err}")))
}
