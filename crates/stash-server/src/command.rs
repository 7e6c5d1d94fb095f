//! Command parsing and dispatch.
//!
//! Commands form a closed enum with one exhaustive dispatch function, so
//! adding a command is a compile-time-checked change. Dispatch requires an
//! authenticated session; the connection loop enforces that before any
//! line reaches this module. Every error raised by a command is caught at
//! this boundary and surfaced as a single `ERROR <message>` line; no
//! command error ever tears down the connection.

use crate::server::ServerState;
use crate::session::Session;
use stash_core::protocol::{
    AVAILABLE_COMMANDS, DOWNLOAD_BEGIN, DOWNLOAD_END, FILE_CONTENT_BEGIN, FILE_CONTENT_END,
    frame_content,
};
use stash_core::{Result, Role, StashError};
use tracing::debug;

/// A parsed, authenticated command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List(Option<String>),
    Read(String),
    Download(String),
    Search(String),
    Info(String),
    Upload(String),
    Delete(String),
    Stats,
    Chat(String),
    Unknown(String),
}

impl Command {
    /// Parse a trimmed, non-empty line. The first whitespace-separated
    /// token selects the command, case-insensitive for slash commands.
    /// `STATS` and plain chat are checked before slash dispatch.
    pub fn parse(line: &str) -> Result<Command> {
        if line == "STATS" {
            return Ok(Command::Stats);
        }
        if !line.starts_with('/') {
            return Ok(Command::Chat(line.to_string()));
        }

        let mut tokens = line.split_whitespace();
        let name = tokens.next().unwrap_or_default().to_lowercase();
        let arg = tokens.next().map(str::to_string);

        let require = |arg: Option<String>, usage: &str| {
            arg.ok_or_else(|| StashError::Protocol(format!("Usage: {}", usage)))
        };

        match name.as_str() {
            "/list" => Ok(Command::List(arg)),
            "/read" => Ok(Command::Read(require(arg, "/read <file>")?)),
            "/download" => Ok(Command::Download(require(arg, "/download <file>")?)),
            "/search" => Ok(Command::Search(require(arg, "/search <keyword>")?)),
            "/info" => Ok(Command::Info(require(arg, "/info <file>")?)),
            "/upload" => Ok(Command::Upload(require(arg, "/upload <file>")?)),
            "/delete" => Ok(Command::Delete(require(arg, "/delete <file>")?)),
            _ => Ok(Command::Unknown(name)),
        }
    }
}

/// Execute one command against the store and stats state, producing the
/// full response text (the connection loop appends the terminating
/// newline).
pub async fn dispatch(state: &ServerState, session: &mut Session, cmd: Command) -> Result<String> {
    match cmd {
        Command::List(dir) => {
            let dir = dir.as_deref().unwrap_or(".");
            let entries = state.store.list(dir).await?;
            let mut out = format!("LIST_OK {} entries", entries.len());
            for entry in entries {
                out.push('\n');
                if entry.is_dir {
                    out.push_str("[DIR] ");
                }
                out.push_str(&entry.name);
            }
            Ok(out)
        }

        Command::Read(file) => {
            let content = state.store.read(&file).await?;
            let name = basename(&file);
            Ok(frame_content(FILE_CONTENT_BEGIN, name, &content, FILE_CONTENT_END))
        }

        Command::Download(file) => {
            let content = state.store.read(&file).await?;
            let name = basename(&file);
            Ok(frame_content(DOWNLOAD_BEGIN, name, &content, DOWNLOAD_END))
        }

        Command::Search(keyword) => {
            let hits = state.store.search(&keyword).await?;
            let mut out = format!("SEARCH_OK {} match(es) for '{}'", hits.len(), keyword);
            for name in hits {
                out.push('\n');
                out.push_str(&name);
            }
            Ok(out)
        }

        Command::Info(file) => {
            let info = state.store.stat(&file).await?;
            let kind = if info.is_dir { "directory" } else { "file" };
            Ok(format!(
                "INFO_OK {}\ntype: {}\nsize: {} bytes\ncreated: {}\nmodified: {}",
                info.name,
                kind,
                info.size,
                format_time(info.created),
                format_time(info.modified),
            ))
        }

        Command::Upload(file) => {
            require_admin(session, "/upload").await?;
            // Reject bad targets before arming the sub-protocol; the store
            // re-checks at write time as well.
            crate::store::resolve(state.store.root(), &file)?;
            session.begin_upload(file.clone(), state.config.max_upload_bytes)?;
            debug!("Session {} armed upload for '{}'", session.handle.id, file);
            Ok(format!(
                "READY_FOR_UPLOAD Send {} between CONTENT_BEGIN and CONTENT_END",
                file
            ))
        }

        Command::Delete(file) => {
            require_admin(session, "/delete").await?;
            state.store.delete(&file).await?;
            Ok(format!("DELETE_OK {}", file))
        }

        Command::Stats => {
            let live = state.live_sessions().await;
            let report = state.stats.snapshot(&live).await;
            serde_json::to_string_pretty(&report)
                .map_err(|e| StashError::Protocol(format!("Failed to build stats: {}", e)))
        }

        Command::Chat(line) => {
            let username = session.handle.username().await;
            state
                .append_message(username.as_deref().unwrap_or("?"), &line)
                .await?;
            Ok(format!("ECHO {}", line))
        }

        Command::Unknown(name) => Err(StashError::Protocol(format!(
            "Unknown command {}. Available: {}",
            name, AVAILABLE_COMMANDS
        ))),
    }
}

async fn require_admin(session: &Session, what: &str) -> Result<()> {
    match session.handle.role().await {
        Some(Role::Admin) => Ok(()),
        _ => Err(StashError::PermissionDenied(format!(
            "{} requires the admin role",
            what
        ))),
    }
}

fn basename(file: &str) -> &str {
    file.rsplit('/').next().unwrap_or(file)
}

fn format_time(time: Option<chrono::DateTime<chrono::Utc>>) -> String {
    time.map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_slash_commands() {
        assert_eq!(Command::parse("/list").unwrap(), Command::List(None));
        assert_eq!(
            Command::parse("/list docs").unwrap(),
            Command::List(Some("docs".into()))
        );
        assert_eq!(
            Command::parse("/read a.txt").unwrap(),
            Command::Read("a.txt".into())
        );
        assert_eq!(
            Command::parse("/UPLOAD report.txt").unwrap(),
            Command::Upload("report.txt".into())
        );
    }

    #[test]
    fn test_parse_missing_argument() {
        assert!(Command::parse("/read").is_err());
        assert!(Command::parse("/delete").is_err());
        assert!(Command::parse("/search").is_err());
    }

    #[test]
    fn test_parse_stats_is_exact() {
        assert_eq!(Command::parse("STATS").unwrap(), Command::Stats);
        // Anything else without a slash is chat, including lowercase stats.
        assert_eq!(
            Command::parse("stats").unwrap(),
            Command::Chat("stats".into())
        );
    }

    #[test]
    fn test_parse_chat_line() {
        assert_eq!(
            Command::parse("hello there").unwrap(),
            Command::Chat("hello there".into())
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            Command::parse("/frobnicate x").unwrap(),
            Command::Unknown("/frobnicate".into())
        );
    }

    #[test]
    fn test_basename() {
        assert_eq!(basename("a.txt"), "a.txt");
        assert_eq!(basename("sub/dir/a.txt"), "a.txt");
    }
}
