mod error;
mod model;
mod service;
pub mod storage;

pub use error::CardError;
pub use model::{
    CardMetadata, CardState, ConnectionProfile, Credentials, IdCard, ROLE_CHANNEL_ADMIN,
    ROLE_PEER_ADMIN, WEB_PROFILE_TYPE,
};
pub use service::{state_key, IdentityCardService, STATE_KEY_SUFFIX};
pub use storage::{CardStorage, FileCardStorage, MemoryCardStorage};
