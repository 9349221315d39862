//! Core of the in-page wallet provider bridge: the wire protocol spoken
//! between an embedded page and the host, the page-side provider runtime,
//! the host-side approval broker, and the ledger/identity primitives both
//! sides share.

pub mod approvals;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod protocol;
pub mod provider;
pub mod script;
pub mod session;

pub use approvals::{ApprovalBroker, ApprovalCallback, ApprovalKind, ApprovalPayload, ApprovalRequest, ApprovalView};
pub use error::BridgeError;
pub use identity::{AccountIdentifier, Identity, Principal, Subaccount};
pub use ledger::{
    format_e8s, parse_amount, BlockHeight, LedgerClient, LedgerError, Tokens, TransferArgs,
    E8S_PER_TOKEN, TRANSFER_FEE_E8S,
};
pub use protocol::{
    BridgeEnvelope, ConfirmResult, ConnectResult, Injection, MessageType, PromptResult,
    RequestData, ResolverSlot, SignResult, TransferResult, BRIDGE_SOURCE,
};
pub use provider::{HostChannel, Provider};
pub use script::PROVIDER_BOOTSTRAP;
pub use session::SessionState;
