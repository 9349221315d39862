use serde::Serialize;

use crate::error::{BridgeError, Result};

/// Connection state of a page's provider. The principal is only held while
/// connected; both fields change together through [`SessionState::connect`]
/// and [`SessionState::disconnect`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    connected: bool,
    principal: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, principal: impl Into<String>) {
        self.connected = true;
        self.principal = Some(principal.into());
    }

    pub fn disconnect(&mut self) {
        self.connected = false;
        self.principal = None;
    }

    /// Applies a `(connected, principal)` pair coming from the host. A
    /// connected flag without a principal is treated as a disconnect.
    pub fn apply(&mut self, connected: bool, principal: Option<String>) {
        match (connected, principal) {
            (true, Some(principal)) => self.connect(principal),
            _ => self.disconnect(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    pub fn require_principal(&self) -> Result<&str> {
        match (&self.connected, &self.principal) {
            (true, Some(principal)) => Ok(principal),
            _ => Err(BridgeError::NotConnected),
        }
    }
}
