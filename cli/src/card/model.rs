use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ROLE_PEER_ADMIN: &str = "PeerAdmin";
pub const ROLE_CHANNEL_ADMIN: &str = "ChannelAdmin";

/// Profile type that marks the well-known local connection profile.
pub const WEB_PROFILE_TYPE: &str = "web";

/// A connection profile as carried on a card.
///
/// Only `name` and `type` are interpreted; every other field is kept
/// verbatim so the profile can be handed back to the profile service unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionProfile {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConnectionProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: None,
            extra: Map::new(),
        }
    }

    pub fn web(name: impl Into<String>) -> Self {
        Self {
            kind: Some(WEB_PROFILE_TYPE.to_string()),
            ..Self::new(name)
        }
    }

    pub fn is_web(&self) -> bool {
        self.kind.as_deref() == Some(WEB_PROFILE_TYPE)
    }

    /// Deterministic identifier used to detect cards sharing a profile.
    pub fn qualified_name(&self) -> anyhow::Result<String> {
        if self.is_web() {
            return Ok(format!("web-{}", self.name));
        }
        let value = serde_json::to_value(self)?;
        let canonical = serde_jcs::to_string(&value)?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(canonical.as_bytes());
        Ok(format!("{}-{}", hasher.finalize().to_hex(), self.name))
    }
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self::web("$default")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
}

impl Credentials {
    pub fn new(certificate: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            certificate: Some(certificate.into()),
            private_key: Some(private_key.into()),
        }
    }

    /// Both halves present and non-empty.
    pub fn pair(&self) -> Option<(&str, &str)> {
        match (self.certificate.as_deref(), self.private_key.as_deref()) {
            (Some(cert), Some(key)) if !cert.is_empty() && !key.is_empty() => Some((cert, key)),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.certificate.is_none() && self.private_key.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CardMetadata {
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
}

/// An identity card: who, on which network, through which profile, and with
/// what proof of identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IdCard {
    pub metadata: CardMetadata,
    pub connection_profile: ConnectionProfile,
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl IdCard {
    pub fn new(metadata: CardMetadata, connection_profile: ConnectionProfile) -> Self {
        Self {
            metadata,
            connection_profile,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn user_name(&self) -> &str {
        &self.metadata.user_name
    }

    pub fn business_network_name(&self) -> Option<&str> {
        self.metadata.business_network.as_deref()
    }

    pub fn roles(&self) -> &[String] {
        &self.metadata.roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.metadata.roles.iter().any(|r| r == role)
    }

    pub fn enrollment_secret(&self) -> Option<&str> {
        self.metadata
            .enrollment_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
    }

    /// Certificate and private key, when the card carries a usable pair.
    pub fn credential_pair(&self) -> Option<(&str, &str)> {
        self.credentials.as_ref().and_then(Credentials::pair)
    }
}

/// Per-card bookkeeping persisted beside the card under `<ref>-pd`.
///
/// Cleared flags are dropped from the JSON rather than written as `false`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub indestructible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<bool>,
}

impl CardState {
    pub fn fresh(indestructible: bool) -> Self {
        Self {
            unused: Some(true),
            indestructible: Some(indestructible),
            current: None,
        }
    }

    pub fn is_unused(&self) -> bool {
        self.unused.unwrap_or(false)
    }

    pub fn is_indestructible(&self) -> bool {
        self.indestructible.unwrap_or(false)
    }

    pub fn is_current(&self) -> bool {
        self.current.unwrap_or(false)
    }
}
