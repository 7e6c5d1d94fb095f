//! # Stash Server
//!
//! Line-oriented TCP file session server. Clients authenticate against a
//! static user table, then issue commands to list, read, search, inspect,
//! upload, download, and delete files on a shared server-side store, plus
//! a free-form echo channel.
//!
//! ## Features
//!
//! - Async/await with Tokio, one task per connection
//! - Connection admission control (hard ceiling on concurrent sessions)
//! - Idle-connection eviction with a per-connection inactivity window
//! - Role-based authorization (`admin` / `read`)
//! - Sentinel-framed whole-file uploads tolerant of arbitrary TCP segmentation
//! - Cross-reconnect statistics accounting per username

pub mod auth;
pub mod client;
pub mod command;
pub mod config;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;

pub use client::Client;
pub use config::ServerConfig;
pub use server::Server;
pub use stash_core::{Result, Role, StashError, UserRecord};
