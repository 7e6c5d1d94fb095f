//! Wire-protocol constants and reply builders.
//!
//! Every exchange is a newline-terminated UTF-8 text line. The only
//! framing beyond line termination is the sentinel marker pairs below,
//! which delimit whole-file payloads in either direction.

/// Client -> server upload payload markers
pub const CONTENT_BEGIN: &str = "CONTENT_BEGIN";
pub const CONTENT_END: &str = "CONTENT_END";

/// Server -> client `/read` response markers
pub const FILE_CONTENT_BEGIN: &str = "FILE_CONTENT_BEGIN";
pub const FILE_CONTENT_END: &str = "FILE_CONTENT_END";

/// Server -> client `/download` response markers
pub const DOWNLOAD_BEGIN: &str = "DOWNLOAD_BEGIN";
pub const DOWNLOAD_END: &str = "DOWNLOAD_END";

/// Commands listed in the unknown-command reply
pub const AVAILABLE_COMMANDS: &str =
    "/list [dir], /read <file>, /download <file>, /search <keyword>, /info <file>, /upload <file>, /delete <file>, STATS";

/// Reply sent for any non-AUTH line while unauthenticated
pub const NOT_AUTHENTICATED: &str =
    "ERROR Not authenticated. Please authenticate with: AUTH <username> <password>";

/// Admission-control rejection, written before the socket is closed
pub const SERVER_BUSY: &str = "ERROR:SERVER_BUSY Too many active connections. Try again later.";

/// Idle-eviction notice, written before the socket is closed
pub const INACTIVITY_CLOSING: &str = "NOTICE:INACTIVITY_CLOSING Closing connection due to inactivity.";

/// Wrap file content in a sentinel-delimited response block.
///
/// The whole block is one logical message; the transport may still split
/// it across reads, so receivers reassemble with [`crate::SentinelAccumulator`].
pub fn frame_content(begin: &str, name: &str, content: &str, end: &str) -> String {
    format!("{begin}\n{name}\n{content}\n{end}")
}
