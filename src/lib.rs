//! Roster Mail: templated, per-contact notification mail with deterministic
//! client identities and an all-or-nothing confirmation step.

pub mod attachment;
pub mod cli;
pub mod compose;
pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod document;
pub mod error;
pub mod identity;
pub mod message;
pub mod qr;
pub mod template;
pub mod transport;
pub mod usage;

pub use error::{Error, Result};
