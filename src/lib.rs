//! Turns mail from IMAP folders into Atom feeds.
//!
//! Each configured feed reads one account folder, keeps the mail that passes
//! its filters, and accumulates one entry per new message. State lives in a
//! SQLite key-value store; output is written as static files.

pub mod config;
pub mod daemon;
pub mod domain;
pub mod error;
pub mod feed;
pub mod mail;
pub mod secrets;
pub mod store;

pub use config::{Config, Paths};
pub use error::{ArtifactError, ConfigError, CycleError, FetchError, StoreError};
