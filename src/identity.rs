//! Durable session identity.
//!
//! The session identifier is created once per installation and persisted as
//! JSON (see [`crate::client_dirs::identity_file`]). It is sent with every
//! authenticated API call. The last-known wallet display info is stored
//! alongside it so front-ends can render the wallet badge before the wallet
//! layer reconnects.

use crate::error::{ClientError, Result};
use crate::wallet::WalletInfo;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Runtime identity of the session: durable id plus the connected wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionIdentity {
    /// Durable per-installation identifier.
    pub session_id: String,
    /// Connected wallet address; `None` unless a wallet is connected.
    pub wallet_address: Option<String>,
}

impl SessionIdentity {
    /// Identity with no wallet connected.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            wallet_address: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IdentityRecord {
    session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    wallet_info: Option<WalletInfo>,
}

/// File-backed store for the durable session identifier.
#[derive(Debug)]
pub struct IdentityStore {
    path: PathBuf,
    record: IdentityRecord,
}

impl IdentityStore {
    /// Load the identity at `path`, creating and persisting a fresh UUID on
    /// first use.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Storage`] if an existing file cannot be parsed
    /// (the identifier is never silently regenerated), or an I/O error if the
    /// file cannot be read or written.
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let record: IdentityRecord = serde_json::from_str(&content).map_err(|e| {
                ClientError::Storage(format!("corrupt identity file {}: {e}", path.display()))
            })?;
            if record.session_id.trim().is_empty() {
                return Err(ClientError::Storage(format!(
                    "identity file {} has an empty session id",
                    path.display()
                )));
            }
            return Ok(Self {
                path: path.to_path_buf(),
                record,
            });
        }

        let record = IdentityRecord {
            session_id: uuid::Uuid::new_v4().to_string(),
            wallet_info: None,
        };
        let store = Self {
            path: path.to_path_buf(),
            record,
        };
        store.persist()?;
        info!(session_id = %store.record.session_id, "created new session identity");
        Ok(store)
    }

    /// Load or create the identity at the default location.
    ///
    /// # Errors
    ///
    /// Same as [`load_or_create`](Self::load_or_create).
    pub fn load_default() -> Result<Self> {
        Self::load_or_create(&crate::client_dirs::identity_file())
    }

    /// The durable session identifier.
    pub fn session_id(&self) -> &str {
        &self.record.session_id
    }

    /// Last-known wallet display info, if any.
    pub fn wallet_info(&self) -> Option<&WalletInfo> {
        self.record.wallet_info.as_ref()
    }

    /// Remember the wallet display info.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity file cannot be written.
    pub fn set_wallet_info(&mut self, info: WalletInfo) -> Result<()> {
        self.record.wallet_info = Some(info);
        self.persist()
    }

    /// Forget the wallet display info (on disconnect).
    ///
    /// # Errors
    ///
    /// Returns an error if the identity file cannot be written.
    pub fn clear_wallet_info(&mut self) -> Result<()> {
        if self.record.wallet_info.take().is_none() {
            return Ok(());
        }
        self.persist()
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.record)
            .map_err(|e| ClientError::Storage(format!("identity serialization failed: {e}")))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &content)?;
        if let Err(e) = std::fs::rename(&tmp, &self.path) {
            warn!(error = %e, "atomic identity rename failed, writing in place");
            let _ = std::fs::remove_file(&tmp);
            std::fs::write(&self.path, &content)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn creates_identity_once_and_reuses_it() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let first = IdentityStore::load_or_create(&path).unwrap();
        let id = first.session_id().to_owned();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
        assert!(path.exists());

        let second = IdentityStore::load_or_create(&path).unwrap();
        assert_eq!(second.session_id(), id);
    }

    #[test]
    fn wallet_info_survives_reload_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let mut store = IdentityStore::load_or_create(&path).unwrap();
        store
            .set_wallet_info(WalletInfo {
                name: "MetaMask".to_owned(),
                icon: "https://icons.example/metamask.png".to_owned(),
            })
            .unwrap();

        let mut reloaded = IdentityStore::load_or_create(&path).unwrap();
        assert_eq!(reloaded.wallet_info().map(|w| w.name.as_str()), Some("MetaMask"));

        reloaded.clear_wallet_info().unwrap();
        let again = IdentityStore::load_or_create(&path).unwrap();
        assert!(again.wallet_info().is_none());
        assert_eq!(again.session_id(), reloaded.session_id());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = IdentityStore::load_or_create(&path).unwrap_err();
        assert!(matches!(err, ClientError::Storage(_)));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{not json");
    }

    #[test]
    fn empty_session_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(&path, r#"{"session_id":"  "}"#).unwrap();
        assert!(IdentityStore::load_or_create(&path).is_err());
    }

    #[test]
    fn session_identity_starts_without_wallet() {
        let identity = SessionIdentity::new("abc");
        assert_eq!(identity.session_id, "abc");
        assert!(identity.wallet_address.is_none());
    }
}
