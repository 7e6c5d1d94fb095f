//! Protocol client.
//!
//! A thin, non-interactive client for the Stash wire protocol: connect,
//! authenticate, issue commands. For `/read` and `/download` responses the
//! server sends one logical sentinel-framed block which the transport may
//! still split across reads, so the client reassembles it with the same
//! accumulator the server uses for uploads.

use stash_core::protocol::{
    CONTENT_BEGIN, CONTENT_END, DOWNLOAD_BEGIN, DOWNLOAD_END, FILE_CONTENT_BEGIN,
    FILE_CONTENT_END,
};
use stash_core::{Result, SentinelAccumulator, StashError};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;

/// Upper bound on a reassembled `/read` or `/download` response.
const MAX_TRANSFER_BYTES: usize = 64 * 1024 * 1024;

/// Connected protocol client.
pub struct Client {
    stream: BufReader<TcpStream>,
}

impl Client {
    /// Connect to a Stash server.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| StashError::Connection(format!("Failed to connect to {}: {}", addr, e)))?;
        debug!("Connected to {}", addr);
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    /// Send `AUTH <username> <password>` and return the welcome line.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<String> {
        self.send_line(&format!("AUTH {} {}", username, password))
            .await?;
        let reply = self.read_line().await?;
        if reply.starts_with("AUTH_OK") {
            Ok(reply)
        } else {
            Err(StashError::Authentication(reply))
        }
    }

    /// Send one raw command line.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stream
            .get_mut()
            .write_all(format!("{}\n", line).as_bytes())
            .await?;
        Ok(())
    }

    /// Read one reply line (trailing CR/LF stripped). An empty read means
    /// the server closed the connection.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let n = self.stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(StashError::Connection("Server closed connection".to_string()));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// `/read <file>`: returns the basename and content from the framed
    /// response.
    pub async fn read_file(&mut self, file: &str) -> Result<(String, String)> {
        self.send_line(&format!("/read {}", file)).await?;
        self.read_framed(FILE_CONTENT_BEGIN, FILE_CONTENT_END).await
    }

    /// `/download <file>`: same as [`read_file`](Self::read_file) with the
    /// download marker pair.
    pub async fn download(&mut self, file: &str) -> Result<(String, String)> {
        self.send_line(&format!("/download {}", file)).await?;
        self.read_framed(DOWNLOAD_BEGIN, DOWNLOAD_END).await
    }

    /// `/upload <file>`: arm the upload, send the sentinel-framed payload,
    /// and return the final server reply.
    pub async fn upload(&mut self, file: &str, content: &str) -> Result<String> {
        self.send_line(&format!("/upload {}", file)).await?;
        let ready = self.read_line().await?;
        if !ready.starts_with("READY_FOR_UPLOAD") {
            return Err(StashError::Protocol(ready));
        }

        self.send_line(&format!("{}\n{}\n{}", CONTENT_BEGIN, content, CONTENT_END))
            .await?;
        self.read_line().await
    }

    /// Accumulate raw reads until the marker pair encloses a complete
    /// block, then split it into basename and content.
    async fn read_framed(&mut self, begin: &'static str, end: &'static str) -> Result<(String, String)> {
        let mut acc = SentinelAccumulator::new(begin, end, MAX_TRANSFER_BYTES);
        let mut chunk = [0u8; 4 * 1024];

        loop {
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(StashError::Connection(
                    "Server closed connection mid-transfer".to_string(),
                ));
            }

            // An ERROR line in place of the frame means the command failed.
            if acc.buffered() == 0 && chunk.starts_with(b"ERROR ") {
                let text = String::from_utf8_lossy(&chunk[..n]);
                return Err(StashError::Protocol(text.trim().to_string()));
            }

            if let Some(block) = acc.push(&chunk[..n])? {
                let (name, content) = match block.split_once('\n') {
                    Some((name, content)) => (name.to_string(), content.to_string()),
                    None => (block, String::new()),
                };
                return Ok((name, content));
            }
        }
    }
}
