use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{AdminService, ConnectionProfileService, IdentityService};
use crate::card::storage::{read_json, write_json};
use crate::card::{ConnectionProfile, Credentials, IdCard};
use crate::home::ensure_subdir;

const PROFILES_DIR: &str = "profiles";
const WALLETS_DIR: &str = "wallets";
const ACTIVE_FILE: &str = "active.json";

/// Connection profiles stored as `profiles/<qualified name>.json`.
#[derive(Clone)]
pub struct LocalProfileService {
    root: PathBuf,
}

impl LocalProfileService {
    pub fn new(home: &Path) -> Result<Self> {
        let root = ensure_subdir(home, PROFILES_DIR)?;
        Ok(Self { root })
    }

    pub fn load_profile(&self, profile_name: &str) -> Result<Option<ConnectionProfile>> {
        let path = entry_path(&self.root, profile_name)?;
        if !path.exists() {
            return Ok(None);
        }
        read_json(&path).map(Some)
    }
}

#[async_trait]
impl ConnectionProfileService for LocalProfileService {
    async fn create_profile(&self, profile_name: &str, profile: &ConnectionProfile) -> Result<()> {
        let path = entry_path(&self.root, profile_name)?;
        write_json(&path, profile)?;
        info!(profile = profile_name, "stored connection profile");
        Ok(())
    }

    async fn delete_profile(&self, profile_name: &str) -> Result<()> {
        let path = entry_path(&self.root, profile_name)?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to delete {}", path.display()))?;
            info!(profile = profile_name, "deleted connection profile");
        }
        Ok(())
    }
}

/// Imported certificate/key pairs, one `wallets/<qualified name>.json` map
/// of user id to credentials per profile.
#[derive(Clone)]
pub struct LocalAdminService {
    root: PathBuf,
}

type Wallet = BTreeMap<String, Credentials>;

impl LocalAdminService {
    pub fn new(home: &Path) -> Result<Self> {
        let root = ensure_subdir(home, WALLETS_DIR)?;
        Ok(Self { root })
    }

    fn load_wallet(&self, path: &Path) -> Result<Wallet> {
        if !path.exists() {
            return Ok(Wallet::new());
        }
        read_json(path)
    }
}

#[async_trait]
impl AdminService for LocalAdminService {
    async fn import_identity(
        &self,
        profile_name: &str,
        user_id: &str,
        certificate: &str,
        private_key: &str,
    ) -> Result<()> {
        let path = entry_path(&self.root, profile_name)?;
        let mut wallet = self.load_wallet(&path)?;
        wallet.insert(
            user_id.to_string(),
            Credentials::new(certificate, private_key),
        );
        write_json(&path, &wallet)?;
        debug!(profile = profile_name, user = user_id, "imported identity");
        Ok(())
    }

    /// Users enrolled with a secret never had a pair imported and export an
    /// empty set.
    async fn export_identity(&self, profile_name: &str, user_id: &str) -> Result<Credentials> {
        let path = entry_path(&self.root, profile_name)?;
        let wallet = self.load_wallet(&path)?;
        match wallet.get(user_id) {
            Some(credentials) => Ok(credentials.clone()),
            None => {
                debug!(profile = profile_name, user = user_id, "no imported identity");
                Ok(Credentials::default())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActiveIdentity {
    pub profile_name: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_network: Option<String>,
}

/// Records the active identity in `active.json` under the wallet home.
#[derive(Clone)]
pub struct ActiveIdentityFile {
    path: PathBuf,
}

impl ActiveIdentityFile {
    pub fn new(home: &Path) -> Self {
        Self {
            path: home.join(ACTIVE_FILE),
        }
    }

    pub fn load(&self) -> Result<Option<ActiveIdentity>> {
        if !self.path.exists() {
            return Ok(None);
        }
        read_json(&self.path).map(Some)
    }
}

#[async_trait]
impl IdentityService for ActiveIdentityFile {
    async fn set_current_identity(&self, profile_name: &str, card: &IdCard) -> Result<()> {
        let active = ActiveIdentity {
            profile_name: profile_name.to_string(),
            user_name: card.user_name().to_string(),
            business_network: card.business_network_name().map(str::to_string),
        };
        write_json(&self.path, &active)?;
        info!(
            profile = profile_name,
            user = card.user_name(),
            "switched active identity"
        );
        Ok(())
    }

    async fn clear_current_identity(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("failed to delete {}", self.path.display()))?;
            info!("cleared active identity");
        }
        Ok(())
    }
}

fn entry_path(root: &Path, profile_name: &str) -> Result<PathBuf> {
    if profile_name.is_empty() || profile_name.contains(['/', '\\']) || profile_name.starts_with('.')
    {
        return Err(anyhow!("invalid profile name '{profile_name}'"));
    }
    Ok(root.join(format!("{profile_name}.json")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CardMetadata;
    use tempfile::tempdir;

    #[tokio::test]
    async fn imported_identity_can_be_exported() -> Result<()> {
        let home = tempdir()?;
        let admin = LocalAdminService::new(home.path())?;
        admin
            .import_identity("web-$default", "alice", "CERT", "KEY")
            .await?;
        admin
            .import_identity("web-$default", "bob", "CERT2", "KEY2")
            .await?;

        let exported = admin.export_identity("web-$default", "alice").await?;
        assert_eq!(exported, Credentials::new("CERT", "KEY"));
        assert_eq!(
            admin.export_identity("web-$default", "carol").await?,
            Credentials::default()
        );
        assert_eq!(
            admin.export_identity("hlfv1", "alice").await?,
            Credentials::default()
        );
        Ok(())
    }

    #[tokio::test]
    async fn profiles_are_created_and_deleted_by_name() -> Result<()> {
        let home = tempdir()?;
        let profiles = LocalProfileService::new(home.path())?;
        let profile = ConnectionProfile::new("hlfv1");
        profiles.create_profile("abc-hlfv1", &profile).await?;
        assert_eq!(profiles.load_profile("abc-hlfv1")?, Some(profile));

        profiles.delete_profile("abc-hlfv1").await?;
        assert_eq!(profiles.load_profile("abc-hlfv1")?, None);
        profiles.delete_profile("abc-hlfv1").await?;
        Ok(())
    }

    #[tokio::test]
    async fn active_identity_file_tracks_last_card() -> Result<()> {
        let home = tempdir()?;
        let active = ActiveIdentityFile::new(home.path());
        assert_eq!(active.load()?, None);

        let card = IdCard::new(
            CardMetadata {
                user_name: "alice".to_string(),
                business_network: Some("net".to_string()),
                ..CardMetadata::default()
            },
            ConnectionProfile::default(),
        );
        active.set_current_identity("web-$default", &card).await?;
        let loaded = active.load()?.expect("active identity written");
        assert_eq!(loaded.user_name, "alice");
        assert_eq!(loaded.business_network.as_deref(), Some("net"));

        active.clear_current_identity().await?;
        assert_eq!(active.load()?, None);
        active.clear_current_identity().await?;
        Ok(())
    }
}
