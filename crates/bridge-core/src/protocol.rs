//! Wire format of the bridge. Pages post [`BridgeEnvelope`]s to the host; the
//! host answers by injecting an [`Injection`] back into the page.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

use crate::error::{BridgeError, Result};

/// Value of the `source` field on every envelope the provider emits.
pub const BRIDGE_SOURCE: &str = "paca";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    ConnectWallet,
    GetBalance,
    RequestTransfer,
    RequestSign,
    DisconnectWallet,
    Alert,
    Prompt,
    Confirm,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectWallet => "CONNECT_WALLET",
            Self::GetBalance => "GET_BALANCE",
            Self::RequestTransfer => "REQUEST_TRANSFER",
            Self::RequestSign => "REQUEST_SIGN",
            Self::DisconnectWallet => "DISCONNECT_WALLET",
            Self::Alert => "ALERT",
            Self::Prompt => "PROMPT",
            Self::Confirm => "CONFIRM",
        }
    }

    /// Resolver slot answered for this message, or `None` for fire-and-forget
    /// notifications.
    pub fn slot(&self) -> Option<ResolverSlot> {
        match self {
            Self::ConnectWallet => Some(ResolverSlot::Connect),
            Self::GetBalance => Some(ResolverSlot::Balance),
            Self::RequestTransfer => Some(ResolverSlot::Transfer),
            Self::RequestSign => Some(ResolverSlot::Sign),
            Self::Prompt => Some(ResolverSlot::Prompt),
            Self::Confirm => Some(ResolverSlot::Confirm),
            Self::DisconnectWallet | Self::Alert => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "string_or_number"
    )]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Message posted from the page to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeEnvelope {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub source: String,
    /// Continuation id; present on every message that expects an answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RequestData>,
}

impl BridgeEnvelope {
    pub fn new(kind: MessageType, id: Option<String>, data: Option<RequestData>) -> Self {
        Self {
            kind,
            source: BRIDGE_SOURCE.to_string(),
            id,
            data,
        }
    }

    /// Parses a raw page message. Messages from any other source yield
    /// `Ok(None)`; anything claiming to be ours that does not decode is
    /// [`BridgeError::MalformedMessage`].
    pub fn parse(raw: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|err| BridgeError::malformed(format!("invalid json: {err}")))?;
        if value.get("source").and_then(Value::as_str) != Some(BRIDGE_SOURCE) {
            return Ok(None);
        }
        let envelope: Self = serde_json::from_value(value)
            .map_err(|err| BridgeError::malformed(err.to_string()))?;
        if envelope.kind.slot().is_some() && envelope.id.as_deref().map_or(true, str::is_empty) {
            return Err(BridgeError::malformed(format!(
                "{} requires an id",
                envelope.kind.as_str()
            )));
        }
        Ok(Some(envelope))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn data(&self) -> RequestData {
        self.data.clone().unwrap_or_default()
    }
}

/// Page-side continuation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverSlot {
    Connect,
    Balance,
    Transfer,
    Sign,
    Confirm,
    Prompt,
}

impl ResolverSlot {
    /// Payload used when the host fails every outstanding call at once.
    pub fn failure_payload(&self) -> Value {
        match self {
            Self::Connect => to_value(&ConnectResult::refused("Connection failed")),
            Self::Balance => Value::String("0".to_string()),
            Self::Transfer => to_value(&TransferResult::failed("Request failed")),
            Self::Sign => to_value(&SignResult::failed("Request failed")),
            Self::Confirm => to_value(&ConfirmResult { value: false }),
            Self::Prompt => to_value(&PromptResult { value: None }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResult {
    pub connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConnectResult {
    pub fn connected(principal: impl Into<String>) -> Self {
        Self {
            connected: true,
            principal: Some(principal.into()),
            message: None,
        }
    }

    pub fn refused(message: impl Into<String>) -> Self {
        Self {
            connected: false,
            principal: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferResult {
    pub success: bool,
    pub message: String,
}

impl TransferResult {
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl SignResult {
    pub fn signed(message: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            signature: Some(signature.into()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            signature: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmResult {
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptResult {
    pub value: Option<String>,
}

/// Re-entry from the host into the page's script context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Injection {
    /// Completes one outstanding call.
    Resolve {
        id: String,
        slot: ResolverSlot,
        result: Value,
    },
    /// Overwrites the page's session state.
    Session {
        connected: bool,
        principal: Option<String>,
    },
    /// Fails every outstanding call and drops the session.
    FailAll,
}

impl Injection {
    pub fn resolve<T: Serialize>(id: impl Into<String>, slot: ResolverSlot, result: &T) -> Self {
        Self::Resolve {
            id: id.into(),
            slot,
            result: to_value(result),
        }
    }

    pub fn disconnected() -> Self {
        Self::Session {
            connected: false,
            principal: None,
        }
    }

    /// Script evaluated in the page to deliver this injection to the
    /// provider installed by [`crate::script::PROVIDER_BOOTSTRAP`].
    pub fn to_script(&self) -> String {
        let payload = serde_json::to_string(self)
            .unwrap_or_else(|_| json!({ "op": "fail_all" }).to_string())
            .replace('\u{2028}', "\\u2028")
            .replace('\u{2029}', "\\u2029");
        format!("window.paca && window.paca.__receive({payload});\ntrue;")
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "amount must be a string or number, got {other}"
        ))),
    }
}
