use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::CardError;
use super::model::{
    CardMetadata, CardState, ConnectionProfile, Credentials, IdCard, ROLE_CHANNEL_ADMIN,
    ROLE_PEER_ADMIN,
};
use super::storage::CardStorage;
use crate::services::{AdminService, ConnectionProfileService, IdentityService};

/// Suffix of the storage key holding a card's [`CardState`].
pub const STATE_KEY_SUFFIX: &str = "-pd";

const DEFAULT_USER: &str = "admin";
const DEFAULT_SECRET: &str = "adminpw";

pub fn state_key(reference: &str) -> String {
    format!("{reference}{STATE_KEY_SUFFIX}")
}

/// Owns the identity cards of one wallet and drives their lifecycle.
///
/// Cards start out unused, become active on first activation, and at most one
/// of them is current at a time. Profile provisioning and credential
/// import/export are delegated to the injected services.
pub struct IdentityCardService {
    storage: Arc<dyn CardStorage>,
    admin: Arc<dyn AdminService>,
    profiles: Arc<dyn ConnectionProfileService>,
    identity: Arc<dyn IdentityService>,
    cards: BTreeMap<String, IdCard>,
    current: Option<String>,
    indestructible: Vec<String>,
    local_only: bool,
}

impl IdentityCardService {
    pub fn new(
        storage: Arc<dyn CardStorage>,
        admin: Arc<dyn AdminService>,
        profiles: Arc<dyn ConnectionProfileService>,
        identity: Arc<dyn IdentityService>,
    ) -> Self {
        Self {
            storage,
            admin,
            profiles,
            identity,
            cards: BTreeMap::new(),
            current: None,
            indestructible: Vec::new(),
            local_only: false,
        }
    }

    /// Replace the in-memory cards with what the store holds.
    ///
    /// With `local_only`, cards whose profile is not the local `web` type are
    /// left in storage but not loaded.
    pub async fn load_identity_cards(&mut self, local_only: bool) -> Result<usize> {
        self.local_only = local_only;
        self.cards.clear();
        self.current = None;
        self.indestructible.clear();

        let mut current = None;
        for reference in self.storage.keys()? {
            if reference.ends_with(STATE_KEY_SUFFIX) {
                continue;
            }
            let raw = self.storage.get(&reference)?.unwrap_or_default();
            let card: IdCard =
                serde_json::from_value(raw).map_err(|err| CardError::InvalidCard {
                    reference: reference.clone(),
                    reason: err.to_string(),
                })?;
            if local_only && !card.connection_profile.is_web() {
                warn!(card = %reference, profile = %card.connection_profile.name, "skipping non-local card");
                continue;
            }

            let state = self.card_state(&reference)?;
            if state.is_indestructible() {
                self.indestructible.push(reference.clone());
            }
            if state.is_current() {
                current = Some(reference.clone());
            }
            self.cards.insert(reference, card);
        }

        if let Some(reference) = current {
            self.set_current_identity_card(&reference).await?;
        }

        info!(count = self.cards.len(), local_only, "loaded identity cards");
        Ok(self.cards.len())
    }

    pub async fn identity_cards(&mut self, reload: bool) -> Result<&BTreeMap<String, IdCard>> {
        if reload {
            self.load_identity_cards(self.local_only).await?;
        }
        Ok(&self.cards)
    }

    pub fn cards(&self) -> &BTreeMap<String, IdCard> {
        &self.cards
    }

    pub fn identity_card(&self, reference: &str) -> Option<&IdCard> {
        self.cards.get(reference)
    }

    pub fn current_card_ref(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn current_identity_card(&self) -> Option<&IdCard> {
        self.current
            .as_deref()
            .and_then(|reference| self.cards.get(reference))
    }

    pub fn indestructible_identity_cards(&self) -> &[String] {
        &self.indestructible
    }

    pub fn is_indestructible(&self, reference: &str) -> bool {
        self.indestructible.iter().any(|r| r == reference)
    }

    /// Persisted state for `reference`; a missing record reads as all flags clear.
    pub fn card_state(&self, reference: &str) -> Result<CardState> {
        let key = state_key(reference);
        match self.storage.get(&key)? {
            Some(raw) => serde_json::from_value(raw)
                .with_context(|| format!("failed to parse card state '{key}'")),
            None => Ok(CardState::default()),
        }
    }

    fn store_state(&self, reference: &str, state: &CardState) -> Result<()> {
        self.storage
            .set(&state_key(reference), &serde_json::to_value(state)?)
    }

    /// Seed an empty wallet with the default admin card followed by `initial`.
    ///
    /// Returns `None` without touching anything when cards already exist.
    pub async fn add_initial_identity_cards(
        &mut self,
        initial: Option<Vec<IdCard>>,
    ) -> Result<Option<Vec<String>>> {
        if !self.cards.is_empty() {
            return Ok(None);
        }

        let default_card = IdCard::new(
            CardMetadata {
                user_name: DEFAULT_USER.to_string(),
                enrollment_secret: Some(DEFAULT_SECRET.to_string()),
                roles: vec![ROLE_PEER_ADMIN.to_string(), ROLE_CHANNEL_ADMIN.to_string()],
                ..CardMetadata::default()
            },
            ConnectionProfile::default(),
        );

        let mut refs = Vec::new();
        for card in std::iter::once(default_card).chain(initial.unwrap_or_default()) {
            refs.push(self.add_identity_card(card, true).await?);
        }
        Ok(Some(refs))
    }

    pub async fn create_identity_card(
        &mut self,
        user_id: &str,
        business_network: Option<&str>,
        enrollment_secret: Option<&str>,
        connection_profile: ConnectionProfile,
        credentials: Option<Credentials>,
        roles: Vec<String>,
    ) -> Result<String> {
        let metadata = CardMetadata {
            user_name: user_id.to_string(),
            business_network: business_network.map(str::to_string),
            enrollment_secret: enrollment_secret.map(str::to_string),
            roles,
            ..CardMetadata::default()
        };
        let mut card = IdCard::new(metadata, connection_profile);
        if let Some(credentials) = credentials {
            card = card.with_credentials(credentials);
        }
        self.add_identity_card(card, false).await
    }

    /// Store a card under a fresh reference, activating it straight away when
    /// it already carries a certificate and key.
    pub async fn add_identity_card(&mut self, card: IdCard, indestructible: bool) -> Result<String> {
        let reference = Uuid::new_v4().to_string();
        self.storage.set(&reference, &serde_json::to_value(&card)?)?;
        self.store_state(&reference, &CardState::fresh(indestructible))?;

        let activate = card.credential_pair().is_some();
        self.cards.insert(reference.clone(), card);
        if indestructible {
            self.indestructible.push(reference.clone());
        }
        info!(card = %reference, indestructible, "added identity card");

        if activate {
            self.activate_identity_card(&reference).await?;
        }
        Ok(reference)
    }

    /// Provision the card's connection profile and credentials on first use.
    ///
    /// Returns `None` when the card has already been activated.
    pub async fn activate_identity_card(&mut self, reference: &str) -> Result<Option<String>> {
        let card = self
            .cards
            .get(reference)
            .ok_or_else(|| CardError::not_found(reference))?;
        let mut state = self.card_state(reference)?;
        if !state.is_unused() {
            return Ok(None);
        }
        let profile_name = card.connection_profile.qualified_name()?;

        if let Some((certificate, private_key)) = card.credential_pair() {
            self.profiles
                .create_profile(&profile_name, &card.connection_profile)
                .await?;
            self.admin
                .import_identity(&profile_name, card.user_name(), certificate, private_key)
                .await?;
        } else if card.enrollment_secret().is_some() {
            self.profiles
                .create_profile(&profile_name, &card.connection_profile)
                .await?;
        } else {
            return Err(CardError::MissingCredentials {
                reference: reference.to_string(),
            }
            .into());
        }

        state.unused = None;
        self.store_state(reference, &state)?;
        info!(card = %reference, profile = %profile_name, "activated identity card");
        Ok(Some(reference.to_string()))
    }

    pub async fn set_current_identity_card(&mut self, reference: &str) -> Result<()> {
        if !self.cards.contains_key(reference) {
            return Err(CardError::not_found(reference).into());
        }
        self.activate_identity_card(reference).await?;

        if let Some(previous) = self.current.take() {
            let mut state = self.card_state(&previous)?;
            state.current = None;
            self.store_state(&previous, &state)?;
        }

        let mut state = self.card_state(reference)?;
        state.current = Some(true);
        self.store_state(reference, &state)?;
        self.current = Some(reference.to_string());

        let card = self
            .cards
            .get(reference)
            .ok_or_else(|| CardError::not_found(reference))?;
        let profile_name = card.connection_profile.qualified_name()?;
        self.identity
            .set_current_identity(&profile_name, card)
            .await?;
        info!(card = %reference, "current identity card changed");
        Ok(())
    }

    /// Remove a card, dropping its connection profile once nothing else uses it.
    pub async fn delete_identity_card(&mut self, reference: &str) -> Result<()> {
        let card = self
            .cards
            .get(reference)
            .ok_or_else(|| CardError::not_found(reference))?;
        let profile_name = card.connection_profile.qualified_name()?;

        let shared = self
            .all_card_refs_for_profile(&profile_name)?
            .iter()
            .any(|other| other != reference);
        if !shared {
            self.profiles.delete_profile(&profile_name).await?;
        } else {
            debug!(profile = %profile_name, "connection profile still in use");
        }

        self.storage.remove(reference)?;
        self.storage.remove(&state_key(reference))?;
        self.cards.remove(reference);
        self.indestructible.retain(|r| r != reference);
        if self.current.as_deref() == Some(reference) {
            self.current = None;
            self.identity.clear_current_identity().await?;
        }
        info!(card = %reference, "deleted identity card");
        Ok(())
    }

    /// Copy of the card fit for export. Used cards carry the live credentials
    /// held by the admin service; unused cards carry an empty set.
    pub async fn identity_card_for_export(&self, reference: &str) -> Result<IdCard> {
        let card = self
            .cards
            .get(reference)
            .ok_or_else(|| CardError::not_found(reference))?;
        let state = self.card_state(reference)?;

        let credentials = if state.is_unused() {
            Credentials::default()
        } else {
            let profile_name = card.connection_profile.qualified_name()?;
            self.admin
                .export_identity(&profile_name, card.user_name())
                .await?
        };

        Ok(IdCard {
            metadata: card.metadata.clone(),
            connection_profile: card.connection_profile.clone(),
            credentials: Some(credentials),
        })
    }

    pub fn qualified_profile_name(&self, profile: &ConnectionProfile) -> Result<String> {
        profile.qualified_name()
    }

    pub fn identity_card_refs_with_profile_and_role(
        &self,
        profile_name: &str,
        role: &str,
    ) -> Result<Vec<String>> {
        let mut refs = Vec::new();
        for (reference, card) in &self.cards {
            if card.has_role(role) && card.connection_profile.qualified_name()? == profile_name {
                refs.push(reference.clone());
            }
        }
        Ok(refs)
    }

    /// Reference of the card for `user_id` on `business_network` via
    /// `profile_name`. When several match, the last one in reference order wins.
    pub fn card_ref_from_identity(
        &self,
        user_id: &str,
        business_network: &str,
        profile_name: &str,
    ) -> Result<Option<String>> {
        let mut found = None;
        for (reference, card) in &self.cards {
            if card.user_name() == user_id
                && card.business_network_name() == Some(business_network)
                && card.connection_profile.qualified_name()? == profile_name
            {
                found = Some(reference.clone());
            }
        }
        Ok(found)
    }

    pub fn all_cards_for_business_network(
        &self,
        business_network: &str,
        profile_name: &str,
    ) -> Result<BTreeMap<String, IdCard>> {
        let mut cards = BTreeMap::new();
        for (reference, card) in &self.cards {
            if card.business_network_name() == Some(business_network)
                && card.connection_profile.qualified_name()? == profile_name
            {
                cards.insert(reference.clone(), card.clone());
            }
        }
        Ok(cards)
    }

    pub fn all_card_refs_for_profile(&self, profile_name: &str) -> Result<Vec<String>> {
        let mut refs = Vec::new();
        for (reference, card) in &self.cards {
            if card.connection_profile.qualified_name()? == profile_name {
                refs.push(reference.clone());
            }
        }
        Ok(refs)
    }
}
