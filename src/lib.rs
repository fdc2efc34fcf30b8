//! hpss-client - synchronous client for HPSS tiered disk/tape archives
//!
//! Module structure:
//! - config: explicit connection configuration (binary, keytab, identity)
//! - session: persistent hsi child process, handshake, staleness, retry
//! - channel: sentinel-framed request/response, benign-error filtering
//! - listing: `ls` output parsing into typed Stat/StorageTier records
//! - path: remote path normalization
//! - client: the public operations facade

pub mod client;
pub mod config;
pub mod error;
pub mod listing;
pub mod path;

mod channel;
mod session;

pub use client::{ByteStream, HpssClient};
pub use config::HpssConfig;
pub use error::{HpssError, Result};
pub use listing::{EntryKind, Medium, Stat, StorageTier, TapePosition};
