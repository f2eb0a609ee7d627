//! Identity card wallet.
//!
//! Stores identity cards (user, business network, connection profile and
//! credentials) in a key-value store, and manages their lifecycle: adding,
//! activating against a connection profile, switching the current card,
//! exporting and deleting.

pub mod card;
pub mod config;
pub mod form;
pub mod home;
pub mod output;
pub mod services;
