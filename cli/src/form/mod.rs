//! Credential entry form.
//!
//! Holds what the user typed, decides whether it is complete enough to submit,
//! and hands it to [`IdentityCardService::create_identity_card`]. Outcomes are
//! reported as [`FormEvent`]s on a channel; submission itself never fails.

use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::card::{
    ConnectionProfile, Credentials, IdentityCardService, ROLE_CHANNEL_ADMIN, ROLE_PEER_ADMIN,
};

pub const ENTER_KEY_CODE: u32 = 13;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormEvent {
    Busy { title: String, text: String },
    BusyCleared,
    Success { title: String, text: String },
    Error(String),
    /// Sent to the container when the form is done, with whether a card was added.
    CardAdded(bool),
}

pub struct CardForm {
    pub connection_profile: ConnectionProfile,
    pub user_id: Option<String>,
    pub user_secret: Option<String>,
    pub business_network: Option<String>,
    pub certificate: Option<String>,
    pub private_key: Option<String>,
    pub peer_admin: bool,
    pub channel_admin: bool,
    use_certificates: bool,
    use_participant_card: bool,
    add_in_progress: bool,
    events: UnboundedSender<FormEvent>,
}

impl CardForm {
    pub fn new(connection_profile: ConnectionProfile, events: UnboundedSender<FormEvent>) -> Self {
        Self {
            connection_profile,
            user_id: None,
            user_secret: None,
            business_network: None,
            certificate: None,
            private_key: None,
            peer_admin: false,
            channel_admin: false,
            use_certificates: true,
            use_participant_card: true,
            add_in_progress: false,
            events,
        }
    }

    pub fn use_certificates(&mut self, option: bool) {
        self.use_certificates = option;
    }

    pub fn use_participant_card_type(&mut self, option: bool) {
        self.use_participant_card = option;
    }

    pub fn add_in_progress(&self) -> bool {
        self.add_in_progress
    }

    pub fn close(&self) {
        self.emit(FormEvent::CardAdded(false));
    }

    pub fn valid_contents(&self) -> bool {
        if self.add_in_progress || !filled(&self.user_id) {
            return false;
        }
        let credentials_ready = if self.use_certificates {
            filled(&self.certificate) && filled(&self.private_key)
        } else {
            filled(&self.user_secret)
        };
        if !credentials_ready {
            return false;
        }

        if self.use_participant_card {
            filled(&self.business_network)
        } else {
            self.peer_admin || self.channel_admin
        }
    }

    /// Keyboard submission: only Enter on a complete form adds the card.
    pub async fn submit_key(
        &mut self,
        key_code: u32,
        service: &mut IdentityCardService,
    ) -> Option<String> {
        if key_code != ENTER_KEY_CODE || !self.valid_contents() {
            return None;
        }
        self.add_identity_card(service).await
    }

    /// Create the card and report the outcome; returns the new reference when
    /// it was added.
    pub async fn add_identity_card(&mut self, service: &mut IdentityCardService) -> Option<String> {
        self.add_in_progress = true;
        self.emit(FormEvent::Busy {
            title: "Adding ID card".to_string(),
            text: "Adding ID card".to_string(),
        });

        let credentials = if self.use_certificates {
            Some(Credentials {
                certificate: self.certificate.clone(),
                private_key: self.private_key.clone(),
            })
        } else {
            None
        };

        let mut roles = Vec::new();
        if self.peer_admin {
            roles.push(ROLE_PEER_ADMIN.to_string());
        }
        if self.channel_admin {
            roles.push(ROLE_CHANNEL_ADMIN.to_string());
        }

        let user_id = self.user_id.clone().unwrap_or_default();
        let result = service
            .create_identity_card(
                &user_id,
                self.business_network.as_deref(),
                self.user_secret.as_deref(),
                self.connection_profile.clone(),
                credentials,
                roles,
            )
            .await;

        self.emit(FormEvent::BusyCleared);
        self.add_in_progress = false;
        match result {
            Ok(reference) => {
                debug!(card = %reference, "form added identity card");
                self.emit(FormEvent::Success {
                    title: "ID Card Added".to_string(),
                    text: "The ID card was successfully added to My Wallet.".to_string(),
                });
                self.emit(FormEvent::CardAdded(true));
                Some(reference)
            }
            Err(err) => {
                self.emit(FormEvent::Error(format!("{err:#}")));
                self.emit(FormEvent::CardAdded(false));
                None
            }
        }
    }

    fn emit(&self, event: FormEvent) {
        // Receiver dropped with the container.
        let _ = self.events.send(event);
    }
}

fn filled(value: &Option<String>) -> bool {
    value.as_deref().map(|v| !v.is_empty()).unwrap_or(false)
}
