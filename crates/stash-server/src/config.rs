//! Configuration for the Stash server

use serde::{Deserialize, Serialize};
use stash_core::{Role, StashError, UserRecord};
use std::collections::HashMap;
use std::path::PathBuf;

/// Server configuration, loadable from a TOML file with every field
/// defaulting to the stock deployment values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Root directory for the shared file store
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Append-only log receiving every chat message
    #[serde(default = "default_message_log")]
    pub message_log: PathBuf,

    /// Maximum concurrent connections (NIST 800-53: AC-10)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Idle window in milliseconds before a connection is evicted
    #[serde(default = "default_inactivity_timeout_ms")]
    pub inactivity_timeout_ms: u64,

    /// Upper bound on a buffered upload payload, markers included
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Static credential table: username -> password + role
    #[serde(default = "default_users")]
    pub users: HashMap<String, UserRecord>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            root_dir: default_root_dir(),
            message_log: default_message_log(),
            max_connections: default_max_connections(),
            inactivity_timeout_ms: default_inactivity_timeout_ms(),
            max_upload_bytes: default_max_upload_bytes(),
            users: default_users(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> stash_core::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StashError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| StashError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Write the configuration out as TOML (used by `--init-config`)
    pub fn write_file(&self, path: &std::path::Path) -> stash_core::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StashError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| StashError::Config(format!("Failed to write config file: {}", e)))?;
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> stash_core::Result<()> {
        if !self.root_dir.exists() {
            return Err(StashError::Config(format!(
                "Root directory does not exist: {:?}",
                self.root_dir
            )));
        }

        if !self.root_dir.is_dir() {
            return Err(StashError::Config(format!(
                "Root path is not a directory: {:?}",
                self.root_dir
            )));
        }

        if self.max_connections == 0 {
            return Err(StashError::Config(
                "max_connections must be at least 1".to_string(),
            ));
        }

        if self.inactivity_timeout_ms == 0 {
            return Err(StashError::Config(
                "inactivity_timeout_ms must be at least 1".to_string(),
            ));
        }

        if self.users.is_empty() {
            return Err(StashError::Config(
                "user table must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9000
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("server_files")
}

fn default_message_log() -> PathBuf {
    PathBuf::from("server_messages.log")
}

// NIST 800-53: AC-10 (Concurrent Session Control)
fn default_max_connections() -> usize {
    6
}

fn default_inactivity_timeout_ms() -> u64 {
    120_000 // 2 minutes
}

fn default_max_upload_bytes() -> usize {
    8 * 1024 * 1024 // 8 MiB
}

/// Stock credential table matching the original deployment.
fn default_users() -> HashMap<String, UserRecord> {
    let mut users = HashMap::new();
    users.insert(
        "admin".to_string(),
        UserRecord {
            password: "adminpass".to_string(),
            role: Role::Admin,
        },
    );
    for name in ["user1", "user2", "user3"] {
        users.insert(
            name.to_string(),
            UserRecord {
                password: format!("{name}pass"),
                role: Role::Read,
            },
        );
    }
    users
}
