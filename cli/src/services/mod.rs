//! Collaborators the card lifecycle delegates to.
//!
//! The lifecycle manager never talks to a network directly: profiles,
//! credential import/export and the "who am I" pointer all sit behind these
//! traits. `local` provides file-backed implementations rooted in the wallet
//! home.

use anyhow::Result;
use async_trait::async_trait;

use crate::card::{ConnectionProfile, Credentials, IdCard};

pub mod local;

pub use local::{ActiveIdentity, ActiveIdentityFile, LocalAdminService, LocalProfileService};

/// Imports and exports certificate/key pairs for an identity on a profile.
#[async_trait]
pub trait AdminService: Send + Sync {
    async fn import_identity(
        &self,
        profile_name: &str,
        user_id: &str,
        certificate: &str,
        private_key: &str,
    ) -> Result<()>;

    async fn export_identity(&self, profile_name: &str, user_id: &str) -> Result<Credentials>;
}

/// Creates and deletes connection profiles keyed by qualified profile name.
#[async_trait]
pub trait ConnectionProfileService: Send + Sync {
    async fn create_profile(&self, profile_name: &str, profile: &ConnectionProfile) -> Result<()>;

    async fn delete_profile(&self, profile_name: &str) -> Result<()>;
}

/// Receives the identity that subsequent admin operations should act as.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn set_current_identity(&self, profile_name: &str, card: &IdCard) -> Result<()>;

    /// Called when the current card is deleted and no identity is active.
    async fn clear_current_identity(&self) -> Result<()> {
        Ok(())
    }
}
