//! # Stash Core
//!
//! Shared vocabulary for the Stash line-oriented file session protocol:
//! the error taxonomy, user roles, wire-protocol constants, and the
//! sentinel-framing accumulator used on both sides of a transfer.
//!
//! The wire protocol is newline-terminated UTF-8 text over plain TCP.
//! File payloads are delimited by literal begin/end marker tokens rather
//! than a length prefix; the accumulator in [`framing`] reassembles a
//! payload that arrives split across any number of socket reads.

pub mod error;
pub mod framing;
pub mod protocol;
pub mod types;

pub use error::{Result, StashError};
pub use framing::SentinelAccumulator;
pub use types::{Role, UserRecord};
