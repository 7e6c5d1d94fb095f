//! File command tests over a live TCP server: list, read, download,
//! search, info, delete, and the upload/read round trip.

use stash_server::{Client, Server, ServerConfig};
use std::net::SocketAddr;
use tempfile::TempDir;

async fn spawn_server() -> (SocketAddr, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        bind_address: "127.0.0.1".to_string(),
        port: 0,
        root_dir: dir.path().join("store"),
        message_log: dir.path().join("messages.log"),
        ..Default::default()
    };
    std::fs::create_dir_all(&config.root_dir).unwrap();

    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    (addr, dir)
}

async fn admin_client(addr: SocketAddr) -> Client {
    let mut client = Client::connect(&addr.to_string()).await.unwrap();
    client.authenticate("admin", "adminpass").await.unwrap();
    client
}

#[tokio::test]
async fn test_upload_then_read_round_trip() {
    let (addr, _dir) = spawn_server().await;
    let mut client = admin_client(addr).await;

    let reply = client.upload("report.txt", "hello world").await.unwrap();
    assert_eq!(reply, "UPLOAD_OK report.txt");

    let (name, content) = client.read_file("report.txt").await.unwrap();
    assert_eq!(name, "report.txt");
    assert_eq!(content, "hello world");
}

#[tokio::test]
async fn test_download_uses_download_markers() {
    let (addr, dir) = spawn_server().await;
    std::fs::write(dir.path().join("store/data.txt"), "payload bytes").unwrap();

    let mut client = admin_client(addr).await;
    let (name, content) = client.download("data.txt").await.unwrap();
    assert_eq!(name, "data.txt");
    assert_eq!(content, "payload bytes");
}

#[tokio::test]
async fn test_list_marks_directories() {
    let (addr, dir) = spawn_server().await;
    std::fs::create_dir(dir.path().join("store/docs")).unwrap();
    std::fs::write(dir.path().join("store/a.txt"), "x").unwrap();

    let mut client = admin_client(addr).await;
    client.send_line("/list").await.unwrap();

    let header = client.read_line().await.unwrap();
    assert_eq!(header, "LIST_OK 2 entries");
    // Entries come back name-sorted, directories prefixed.
    let first = client.read_line().await.unwrap();
    let second = client.read_line().await.unwrap();
    assert_eq!(first, "a.txt");
    assert_eq!(second, "[DIR] docs");
}

#[tokio::test]
async fn test_search_is_case_insensitive() {
    let (addr, dir) = spawn_server().await;
    std::fs::write(dir.path().join("store/Quarterly-Report.txt"), "x").unwrap();
    std::fs::write(dir.path().join("store/notes.md"), "x").unwrap();

    let mut client = admin_client(addr).await;
    client.send_line("/search report").await.unwrap();

    let header = client.read_line().await.unwrap();
    assert_eq!(header, "SEARCH_OK 1 match(es) for 'report'");
    let hit = client.read_line().await.unwrap();
    assert_eq!(hit, "Quarterly-Report.txt");
}

#[tokio::test]
async fn test_info_reports_metadata() {
    let (addr, dir) = spawn_server().await;
    std::fs::write(dir.path().join("store/data.bin"), "12345").unwrap();

    let mut client = admin_client(addr).await;
    client.send_line("/info data.bin").await.unwrap();

    assert_eq!(client.read_line().await.unwrap(), "INFO_OK data.bin");
    assert_eq!(client.read_line().await.unwrap(), "type: file");
    assert_eq!(client.read_line().await.unwrap(), "size: 5 bytes");
    assert!(client.read_line().await.unwrap().starts_with("created: "));
    assert!(client.read_line().await.unwrap().starts_with("modified: "));
}

#[tokio::test]
async fn test_read_missing_file_is_error_not_disconnect() {
    let (addr, _dir) = spawn_server().await;
    let mut client = admin_client(addr).await;

    client.send_line("/read nope.txt").await.unwrap();
    let reply = client.read_line().await.unwrap();
    assert!(reply.starts_with("ERROR"), "got: {}", reply);
    assert!(reply.contains("nope.txt"));

    // Connection survives the command error.
    client.send_line("still here").await.unwrap();
    assert_eq!(client.read_line().await.unwrap(), "ECHO still here");
}

#[tokio::test]
async fn test_read_directory_is_rejected() {
    let (addr, dir) = spawn_server().await;
    std::fs::create_dir(dir.path().join("store/docs")).unwrap();

    let mut client = admin_client(addr).await;
    client.send_line("/read docs").await.unwrap();
    let reply = client.read_line().await.unwrap();
    assert!(reply.starts_with("ERROR"), "got: {}", reply);
}

#[tokio::test]
async fn test_delete_removes_file() {
    let (addr, dir) = spawn_server().await;
    let path = dir.path().join("store/old.txt");
    std::fs::write(&path, "x").unwrap();

    let mut client = admin_client(addr).await;
    client.send_line("/delete old.txt").await.unwrap();
    assert_eq!(client.read_line().await.unwrap(), "DELETE_OK old.txt");
    assert!(!path.exists());

    // Deleting again reports the missing file.
    client.send_line("/delete old.txt").await.unwrap();
    let reply = client.read_line().await.unwrap();
    assert!(reply.starts_with("ERROR"), "got: {}", reply);
}

#[tokio::test]
async fn test_traversal_paths_are_rejected_generically() {
    let (addr, dir) = spawn_server().await;
    std::fs::write(dir.path().join("secret.txt"), "outside the store").unwrap();

    let mut client = admin_client(addr).await;
    client.send_line("/read ../secret.txt").await.unwrap();
    let reply = client.read_line().await.unwrap();
    assert_eq!(reply, "ERROR Invalid path");

    client.send_line("/read a/../../secret.txt").await.unwrap();
    assert_eq!(client.read_line().await.unwrap(), "ERROR Invalid path");
}

#[tokio::test]
async fn test_unknown_command_lists_available() {
    let (addr, _dir) = spawn_server().await;
    let mut client = admin_client(addr).await;

    client.send_line("/teleport here").await.unwrap();
    let reply = client.read_line().await.unwrap();
    assert!(reply.starts_with("ERROR"), "got: {}", reply);
    assert!(reply.contains("Unknown command"));
    assert!(reply.contains("/list"));
}

#[tokio::test]
async fn test_chat_lines_are_echoed_and_logged() {
    let (addr, dir) = spawn_server().await;
    let mut client = admin_client(addr).await;

    client.send_line("hello everyone").await.unwrap();
    assert_eq!(client.read_line().await.unwrap(), "ECHO hello everyone");

    // The append-only message log records the line with the username.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let log = std::fs::read_to_string(dir.path().join("messages.log")).unwrap();
    assert!(log.contains("admin: hello everyone"));
}
