//! Authentication gate
//!
//! Validates `AUTH <username> <password>` lines against the static user
//! table and hands out the role assigned to the account. Failures leave
//! the connection open for further attempts; there is no retry limit and
//! no lockout.
//!
//! NIST 800-53: IA-2 (Identification and Authentication)

use stash_core::{Result, Role, StashError, UserRecord};
use std::collections::HashMap;
use tracing::{info, warn};

/// Credentials accepted for a session, produced by a successful AUTH line.
#[derive(Debug, Clone)]
pub struct AuthInfo {
    pub username: String,
    pub role: Role,
}

/// Validates credential lines against the static user table.
pub struct AuthGate {
    users: HashMap<String, UserRecord>,
}

impl AuthGate {
    pub fn new(users: HashMap<String, UserRecord>) -> Self {
        Self { users }
    }

    /// Process one line from an unauthenticated session.
    ///
    /// Only `AUTH <username> <password>` is legal in this state. Passwords
    /// are compared exactly, case-sensitive. Errors carry the reason used
    /// in the `AUTH_FAIL` reply.
    pub fn authenticate(&self, line: &str) -> Result<AuthInfo> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        if tokens.first().copied() != Some("AUTH") {
            return Err(StashError::Protocol(line.to_string()));
        }

        if tokens.len() < 3 {
            return Err(StashError::Authentication(
                "Usage: AUTH <username> <password>".to_string(),
            ));
        }

        let username = tokens[1];
        let password = tokens[2];

        match self.users.get(username) {
            Some(record) if record.password == password => {
                info!("Authentication succeeded for user '{}'", username);
                Ok(AuthInfo {
                    username: username.to_string(),
                    role: record.role,
                })
            }
            Some(_) => {
                warn!("Authentication failed for user '{}': wrong password", username);
                Err(StashError::Authentication("Invalid credentials".to_string()))
            }
            None => {
                warn!("Authentication failed: unknown user '{}'", username);
                Err(StashError::Authentication("Invalid credentials".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AuthGate {
        let mut users = HashMap::new();
        users.insert(
            "admin".to_string(),
            UserRecord {
                password: "adminpass".to_string(),
                role: Role::Admin,
            },
        );
        users.insert(
            "user1".to_string(),
            UserRecord {
                password: "user1pass".to_string(),
                role: Role::Read,
            },
        );
        AuthGate::new(users)
    }

    #[test]
    fn test_valid_credentials() {
        let info = gate().authenticate("AUTH admin adminpass").unwrap();
        assert_eq!(info.username, "admin");
        assert_eq!(info.role, Role::Admin);

        let info = gate().authenticate("AUTH user1 user1pass").unwrap();
        assert_eq!(info.role, Role::Read);
    }

    #[test]
    fn test_wrong_password() {
        let err = gate().authenticate("AUTH admin wrongpass").unwrap_err();
        assert!(matches!(err, StashError::Authentication(_)));
    }

    #[test]
    fn test_unknown_user() {
        let err = gate().authenticate("AUTH nobody secret").unwrap_err();
        assert!(matches!(err, StashError::Authentication(_)));
    }

    #[test]
    fn test_password_is_case_sensitive() {
        let err = gate().authenticate("AUTH admin AdminPass").unwrap_err();
        assert!(matches!(err, StashError::Authentication(_)));
    }

    #[test]
    fn test_malformed_auth_line() {
        let err = gate().authenticate("AUTH admin").unwrap_err();
        assert!(matches!(err, StashError::Authentication(_)));
    }

    #[test]
    fn test_non_auth_line_is_protocol_error() {
        let err = gate().authenticate("/list").unwrap_err();
        assert!(matches!(err, StashError::Protocol(_)));
    }
}
