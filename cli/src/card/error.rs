use thiserror::Error;

/// Failures the card lifecycle reports by name. Everything else (storage,
/// collaborator calls) travels as a plain `anyhow::Error`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CardError {
    #[error("Identity card does not exist")]
    NotFound { reference: String },

    #[error(
        "No credentials or enrollment secret available. An identity card must contain either a certificate and private key, or an enrollment secret"
    )]
    MissingCredentials { reference: String },

    #[error("failed to parse identity card '{reference}': {reason}")]
    InvalidCard { reference: String, reason: String },
}

impl CardError {
    pub fn not_found(reference: &str) -> Self {
        Self::NotFound {
            reference: reference.to_string(),
        }
    }
}
