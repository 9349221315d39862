//! Principals, account identifiers, and Ed25519 signing identities.

use std::fmt;
use std::str::FromStr;

use data_encoding::BASE32_NOPAD;
use ed25519_dalek::SigningKey;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};

use crate::error::{BridgeError, Result};

/// DER prefix of an Ed25519 SubjectPublicKeyInfo (OID 1.3.101.112).
const ED25519_DER_PREFIX: [u8; 12] = [
    0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00,
];
const SELF_AUTHENTICATING_TAG: u8 = 0x02;
const ACCOUNT_DOMAIN_SEPARATOR: &[u8] = b"\x0Aaccount-id";
const MAX_PRINCIPAL_LEN: usize = 29;

pub type Subaccount = [u8; 32];

/// Network-wide identity handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Principal(Vec<u8>);

impl Principal {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_PRINCIPAL_LEN {
            return Err(BridgeError::InvalidPrincipal(format!(
                "principal is {} bytes, at most {} allowed",
                bytes.len(),
                MAX_PRINCIPAL_LEN
            )));
        }
        Ok(Self(bytes.to_vec()))
    }

    pub fn anonymous() -> Self {
        Self(vec![0x04])
    }

    /// Principal derived from an Ed25519 public key.
    pub fn self_authenticating(public_key: &[u8; 32]) -> Self {
        let mut hasher = Sha224::new();
        hasher.update(ED25519_DER_PREFIX);
        hasher.update(public_key);
        let mut bytes = hasher.finalize().to_vec();
        bytes.push(SELF_AUTHENTICATING_TAG);
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_text(&self) -> String {
        let mut buf = Vec::with_capacity(4 + self.0.len());
        buf.extend_from_slice(&crc32fast::hash(&self.0).to_be_bytes());
        buf.extend_from_slice(&self.0);
        let encoded: Vec<char> = BASE32_NOPAD
            .encode(&buf)
            .to_ascii_lowercase()
            .chars()
            .collect();
        encoded
            .chunks(5)
            .map(|group| group.iter().collect::<String>())
            .collect::<Vec<_>>()
            .join("-")
    }

    pub fn from_text(text: &str) -> Result<Self> {
        let compact: String = text
            .chars()
            .filter(|c| *c != '-')
            .collect::<String>()
            .to_ascii_uppercase();
        let decoded = BASE32_NOPAD
            .decode(compact.as_bytes())
            .map_err(|err| BridgeError::InvalidPrincipal(format!("{text}: {err}")))?;
        if decoded.len() < 4 {
            return Err(BridgeError::InvalidPrincipal(format!("{text}: too short")));
        }
        let (checksum, bytes) = decoded.split_at(4);
        if checksum != crc32fast::hash(bytes).to_be_bytes() {
            return Err(BridgeError::InvalidPrincipal(format!("{text}: checksum mismatch")));
        }
        let principal = Self::from_slice(bytes)?;
        if principal.to_text() != text.to_ascii_lowercase() {
            return Err(BridgeError::InvalidPrincipal(format!(
                "{text}: not in canonical form"
            )));
        }
        Ok(principal)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Principal {
    type Err = BridgeError;

    fn from_str(value: &str) -> Result<Self> {
        Self::from_text(value)
    }
}

impl Serialize for Principal {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_text())
    }
}

impl<'de> Deserialize<'de> for Principal {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_text(&text).map_err(serde::de::Error::custom)
    }
}

/// Ledger address derived from a principal and a subaccount: a CRC-32 of the
/// hash followed by the 28-byte SHA-224 hash itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccountIdentifier([u8; 32]);

impl AccountIdentifier {
    pub fn from_principal(principal: &Principal, subaccount: Option<&Subaccount>) -> Self {
        let mut hasher = Sha224::new();
        hasher.update(ACCOUNT_DOMAIN_SEPARATOR);
        hasher.update(principal.as_slice());
        hasher.update(subaccount.copied().unwrap_or([0u8; 32]));
        let hash = hasher.finalize();

        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&crc32fast::hash(&hash).to_be_bytes());
        bytes[4..].copy_from_slice(&hash);
        Self(bytes)
    }

    pub fn from_hex(value: &str) -> Result<Self> {
        let decoded = hex::decode(value)
            .map_err(|err| BridgeError::InvalidAccountIdentifier(format!("{value}: {err}")))?;
        let bytes: [u8; 32] = decoded.try_into().map_err(|_| {
            BridgeError::InvalidAccountIdentifier(format!("{value}: expected 32 bytes"))
        })?;
        if bytes[..4] != crc32fast::hash(&bytes[4..]).to_be_bytes() {
            return Err(BridgeError::InvalidAccountIdentifier(format!(
                "{value}: checksum mismatch"
            )));
        }
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for AccountIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for AccountIdentifier {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Ed25519 signing identity backing one wallet account.
#[derive(Clone)]
pub struct Identity {
    signing_key: SigningKey,
}

impl Identity {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_seed(&seed)
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn principal(&self) -> Principal {
        Principal::self_authenticating(&self.public_key())
    }

    pub fn account_identifier(&self) -> AccountIdentifier {
        AccountIdentifier::from_principal(&self.principal(), None)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("principal", &self.principal().to_text())
            .finish()
    }
}
