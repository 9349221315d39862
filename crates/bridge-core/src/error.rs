use crate::ledger::LedgerError;

/// Convenient result alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Errors raised by the provider runtime and the host message handler.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    /// A capability that needs a session was invoked while disconnected.
    #[error("Wallet not connected")]
    NotConnected,
    /// A connect request arrived while the wallet holds no identities.
    #[error("No wallet available")]
    NoIdentityAvailable,
    /// The inbound envelope could not be parsed or is missing required fields.
    #[error("malformed bridge message: {0}")]
    MalformedMessage(String),
    /// A call into the ledger failed.
    #[error("ledger call failed: {0}")]
    LedgerCallFailure(#[from] LedgerError),
    /// A principal in textual form did not decode.
    #[error("invalid principal: {0}")]
    InvalidPrincipal(String),
    /// An account identifier in hex form did not decode.
    #[error("invalid account identifier: {0}")]
    InvalidAccountIdentifier(String),
    /// A decimal token amount did not parse.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    /// The continuation for an outstanding call was dropped before it resolved.
    #[error("resolver dropped before the host answered")]
    ResolverDropped,
}

impl BridgeError {
    /// Helper for wrapping envelope validation failures.
    pub fn malformed(msg: impl Into<String>) -> Self {
        BridgeError::MalformedMessage(msg.into())
    }
}
