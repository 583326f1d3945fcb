//! # Keyrelay
//!
//! `keyrelay` is a small HTTP service that proves control of a forum account.
//! It issues one-time numeric secrets, delivers them as private messages on
//! the forum, and stores a long-lived public key per username once the secret
//! is confirmed.
//!
//! ## Storage & replication
//!
//! State lives in a single local `SQLite` file owned by
//! [`store::CredentialStore`]. Every mutation marks a dirty flag consumed by
//! one background replication task ([`replicate`]) that mirrors the whole file
//! to a remote blob store, coalescing bursts of mutations into as few uploads
//! as possible. The remote copy exists only for disaster recovery: on startup
//! with no local file, the last snapshot is downloaded before the store opens.
//!
//! The service assumes a single active process instance; the local file is
//! always authoritative.

pub mod cli;
pub mod delivery;
pub mod relay;
pub mod replicate;
pub mod store;

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Commit hash stamped at build time via `KEYRELAY_BUILD_COMMIT`.
pub const GIT_COMMIT_HASH: &str = match option_env!("KEYRELAY_BUILD_COMMIT") {
    Some(commit) => commit,
    None => "unknown",
};
