//! Identifiers shared by every swarmlink crate.
//!
//! All three are opaque strings issued by someone else: topics by the
//! transfer engine, peer and offer ids by the signaling service.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// A distributed resource, as named by the transfer engine.
///
/// Every participant interested in the same content uses the same topic,
/// so it doubles as the discovery key at the signaling service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(String);

impl Topic {
    pub fn new(topic: impl Into<String>) -> Self {
        Self(topic.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identity of a participant at the signaling service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bytes fed to the dedup filter.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// First few characters, for log lines.
    pub fn short(&self) -> &str {
        let end = self
            .0
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Identifier of one published advertisement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OfferId(String);

impl OfferId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OfferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Credential ────────────────────────────────────────────────────────────────

/// Rendezvous identity plus the secret proving it.
///
/// Issued by the signaling service on first registration. Hosts persist it
/// so the process keeps the same identity across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub peer_id: PeerId,
    /// Hex-encoded secret, opaque to swarmlink.
    pub secret: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to read credential {0}: {1}")]
    ReadFailed(std::path::PathBuf, std::io::Error),
    #[error("failed to parse credential {0}: {1}")]
    ParseFailed(std::path::PathBuf, serde_json::Error),
    #[error("failed to write credential {0}: {1}")]
    WriteFailed(std::path::PathBuf, std::io::Error),
    #[error("failed to serialize credential: {0}")]
    SerializeFailed(serde_json::Error),
}

impl Credential {
    pub fn new(peer_id: PeerId, secret: &[u8]) -> Self {
        Self {
            peer_id,
            secret: hex::encode(secret),
        }
    }

    /// Load a credential written by [`Credential::save`].
    /// Returns `Ok(None)` if the file does not exist yet.
    pub fn load(path: &Path) -> Result<Option<Self>, CredentialError> {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CredentialError::ReadFailed(path.to_path_buf(), e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| CredentialError::ParseFailed(path.to_path_buf(), e))
    }

    /// Write the credential as JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), CredentialError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| CredentialError::WriteFailed(path.to_path_buf(), e))?;
        }
        let json = serde_json::to_string_pretty(self).map_err(CredentialError::SerializeFailed)?;
        std::fs::write(path, json).map_err(|e| CredentialError::WriteFailed(path.to_path_buf(), e))
    }
}
