use serde::{Deserialize, Serialize};

/// Authorization level granted at authentication. Set once per session,
/// never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Full access, including upload and delete
    Admin,
    /// Read-only access to the store
    Read,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Read => write!(f, "read"),
        }
    }
}

/// Static credential entry: username maps to password and role.
/// The table is read-only for the lifetime of the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub password: String,
    pub role: Role,
}
