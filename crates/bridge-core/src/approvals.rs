use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

/// Continuation run with the user's decision.
pub type ApprovalCallback = Box<dyn FnOnce(bool) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    Connect,
    Transfer,
    Sign,
}

impl ApprovalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Transfer => "transfer",
            Self::Sign => "sign",
        }
    }
}

impl fmt::Display for ApprovalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific data carried by an approval request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ApprovalPayload {
    Connect,
    Transfer { recipient: String, amount: String },
    Sign { message: String },
}

impl ApprovalPayload {
    pub fn kind(&self) -> ApprovalKind {
        match self {
            Self::Connect => ApprovalKind::Connect,
            Self::Transfer { .. } => ApprovalKind::Transfer,
            Self::Sign { .. } => ApprovalKind::Sign,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalRequest {
    pub id: String,
    #[serde(flatten)]
    pub payload: ApprovalPayload,
    pub origin: String,
    pub created_at_ms: u64,
}

impl ApprovalRequest {
    pub fn kind(&self) -> ApprovalKind {
        self.payload.kind()
    }

    /// What the decision surface shows for this request.
    pub fn view(&self) -> ApprovalView {
        let mut view = ApprovalView {
            id: self.id.clone(),
            kind: self.kind(),
            origin: self.origin.clone(),
            title: String::new(),
            description: String::new(),
            amount: None,
            recipient: None,
            message: None,
        };
        match &self.payload {
            ApprovalPayload::Connect => {
                view.title = "Connection Request".to_string();
                view.description = format!("{} is requesting to connect to your wallet", self.origin);
            }
            ApprovalPayload::Transfer { recipient, amount } => {
                view.title = "Transfer Request".to_string();
                view.description = format!("{} is requesting to transfer:", self.origin);
                view.amount = Some(amount.clone());
                view.recipient = Some(recipient.clone());
            }
            ApprovalPayload::Sign { message } => {
                view.title = "Signature Request".to_string();
                view.description = format!("{} is requesting to sign a message:", self.origin);
                view.message = Some(message.clone());
            }
        }
        view
    }
}

/// Snapshot of the head request handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalView {
    pub id: String,
    pub kind: ApprovalKind,
    pub origin: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// FIFO queue of requests awaiting a user decision. Only the head is ever
/// presented; each id resolves at most once.
#[derive(Default)]
pub struct ApprovalBroker {
    queue: VecDeque<ApprovalRequest>,
    callbacks: HashMap<String, ApprovalCallback>,
}

impl ApprovalBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request and stores its continuation. Returns the new id.
    pub fn enqueue(
        &mut self,
        payload: ApprovalPayload,
        origin: impl Into<String>,
        callback: ApprovalCallback,
    ) -> String {
        let id = Uuid::new_v4().to_string();
        let request = ApprovalRequest {
            id: id.clone(),
            payload,
            origin: origin.into(),
            created_at_ms: current_timestamp_ms(),
        };
        info!(
            request_id = %id,
            kind = %request.kind(),
            origin = %request.origin,
            depth = self.queue.len() + 1,
            "approval request queued"
        );
        self.callbacks.insert(id.clone(), callback);
        self.queue.push_back(request);
        id
    }

    /// Like [`ApprovalBroker::enqueue`] but hands the decision back through a
    /// channel.
    pub fn register(
        &mut self,
        payload: ApprovalPayload,
        origin: impl Into<String>,
    ) -> (String, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        let id = self.enqueue(
            payload,
            origin,
            Box::new(move |approved| {
                let _ = tx.send(approved);
            }),
        );
        (id, rx)
    }

    /// Runs the continuation for `id` and drops the request from the queue,
    /// wherever it sits. Unknown or already-resolved ids are ignored. Returns
    /// whether a continuation ran.
    pub fn resolve(&mut self, id: &str, approved: bool) -> bool {
        let Some(callback) = self.callbacks.remove(id) else {
            debug!(request_id = %id, "ignoring resolution for unknown approval");
            return false;
        };
        self.queue.retain(|request| request.id != id);
        info!(request_id = %id, approved, remaining = self.queue.len(), "approval resolved");
        callback(approved);
        true
    }

    /// The request currently presented to the user.
    pub fn head(&self) -> Option<&ApprovalRequest> {
        self.queue.front()
    }

    pub fn head_view(&self) -> Option<ApprovalView> {
        self.head().map(ApprovalRequest::view)
    }

    pub fn pending(&self) -> impl Iterator<Item = &ApprovalRequest> {
        self.queue.iter()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl fmt::Debug for ApprovalBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalBroker")
            .field("queue", &self.queue)
            .field("callbacks", &self.callbacks.len())
            .finish()
    }
}

fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
