//! Client against a real server on an ephemeral port.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::thread;

use rand::RngCore;

use nioftp_client::{Client, ClientError, RemoteEntry};
use nioftp_protocol::frame::{PREFIX_LEN, encode_frame};
use nioftp_protocol::{MAX_FRAME_LEN, Message, ProtocolError, TRANSFER_UNIT};
use nioftp_server::{Server, ServerConfig};

struct Fixture {
    root: tempfile::TempDir,
    server: Server,
}

impl Fixture {
    /// A root holding one file and one subdirectory.
    fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join("file.txt"), "hello").unwrap();
        std::fs::create_dir(root.path().join("subdir")).unwrap();

        let mut server = Server::new(ServerConfig::ephemeral());
        server.start(root.path()).unwrap();
        Self { root, server }
    }

    fn addr(&self) -> SocketAddr {
        self.server.local_addr().unwrap()
    }

    fn client(&self) -> Client {
        let mut client = Client::default();
        assert!(client.connect(&self.addr().to_string()));
        client
    }
}

fn expected_listing() -> Vec<RemoteEntry> {
    vec![
        RemoteEntry {
            name: "subdir".into(),
            is_dir: true,
        },
        RemoteEntry {
            name: "file.txt".into(),
            is_dir: false,
        },
    ]
}

fn random_file(path: &Path, size: usize) -> Vec<u8> {
    let mut data = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut data);
    std::fs::write(path, &data).unwrap();
    data
}

#[test]
fn list_then_list_again() {
    let fx = Fixture::new();
    let mut client = fx.client();

    assert_eq!(client.execute_list(".").unwrap(), expected_listing());
    assert_eq!(client.execute_list(".").unwrap(), expected_listing());
    assert_eq!(client.last_listing(), expected_listing().as_slice());

    assert_eq!(client.execute_list("subdir").unwrap(), vec![]);
    client.disconnect().unwrap();
}

#[test]
fn list_by_absolute_path_inside_root() {
    let fx = Fixture::new();
    let mut client = fx.client();
    let abs = fx.root.path().to_str().unwrap().to_owned();
    assert_eq!(client.execute_list(&abs).unwrap(), expected_listing());
}

#[test]
fn list_errors_keep_session_usable() {
    let fx = Fixture::new();
    let mut client = fx.client();

    assert!(matches!(
        client.execute_list("missing"),
        Err(ClientError::NotFound(p)) if p == "missing"
    ));
    assert!(matches!(
        client.execute_list("file.txt"),
        Err(ClientError::NotADirectory(_))
    ));
    assert!(client.is_connected());
    assert_eq!(client.execute_list(".").unwrap(), expected_listing());
    // A failed listing does not replace the last good one.
    assert_eq!(client.last_listing(), expected_listing().as_slice());
}

#[test]
fn traversal_is_denied() {
    let fx = Fixture::new();
    let mut client = fx.client();
    let dst = tempfile::tempdir().unwrap();

    for path in ["..", "../", "subdir/../..", "/", "/etc"] {
        assert!(
            matches!(client.execute_list(path), Err(ClientError::AccessDenied(_))),
            "{path}"
        );
    }
    for path in ["../file.txt", "/etc/passwd"] {
        assert!(
            matches!(
                client.execute_get(path, dst.path().join("x")),
                Err(ClientError::AccessDenied(_))
            ),
            "{path}"
        );
    }
    assert!(!dst.path().join("x").exists());
    assert!(client.is_connected());
}

#[test]
fn downloads_are_byte_identical() {
    let fx = Fixture::new();
    let dst = tempfile::tempdir().unwrap();
    let mut client = fx.client();

    let sizes = [
        0,
        1,
        TRANSFER_UNIT - 1,
        TRANSFER_UNIT,
        TRANSFER_UNIT + 1,
        10_000,
        1 << 20,
    ];
    for size in sizes {
        let name = format!("blob-{size}");
        let data = random_file(&fx.root.path().join(&name), size);
        let out = dst.path().join(&name);

        let written = client.execute_get(&name, &out).unwrap();
        assert_eq!(written, size as u64);
        assert_eq!(std::fs::read(&out).unwrap(), data, "size {size}");
    }
}

#[test]
fn get_missing_leaves_destination_untouched() {
    let fx = Fixture::new();
    let dst = tempfile::tempdir().unwrap();
    let out = dst.path().join("keep");
    std::fs::write(&out, "previous").unwrap();
    let mut client = fx.client();

    assert!(matches!(
        client.execute_get("nope", &out),
        Err(ClientError::NotFound(_))
    ));
    assert!(matches!(
        client.execute_get("subdir", &out),
        Err(ClientError::NotFound(_))
    ));
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "previous");

    client.execute_get("file.txt", &out).unwrap();
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "hello");
}

#[test]
fn double_disconnect_fails() {
    let fx = Fixture::new();
    let mut client = fx.client();
    client.disconnect().unwrap();
    assert!(matches!(client.disconnect(), Err(ClientError::NotConnected)));
    assert!(matches!(
        client.execute_list("."),
        Err(ClientError::NotConnected)
    ));
}

#[test]
fn reconnect_after_disconnect() {
    let fx = Fixture::new();
    let mut client = fx.client();
    client.disconnect().unwrap();
    assert!(client.connect(&fx.addr().to_string()));
    assert_eq!(client.execute_list(".").unwrap(), expected_listing());
}

#[test]
fn connect_to_bad_address_returns_false() {
    let mut client = Client::default();
    assert!(!client.connect("definitely-not-a-host.invalid"));
    assert!(!client.connect("127.0.0.1:notaport"));
    assert!(!client.is_connected());
}

#[test]
fn concurrent_listings() {
    let fx = Fixture::new();
    let addr = fx.addr().to_string();

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let addr = addr.clone();
            thread::spawn(move || {
                let mut client = Client::default();
                assert!(client.connect(&addr));
                let listing = client.execute_list(".").unwrap();
                client.disconnect().unwrap();
                listing
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), expected_listing());
    }
}

#[test]
fn concurrent_downloads() {
    let fx = Fixture::new();
    let data = random_file(&fx.root.path().join("shared.bin"), 100_000);
    let dst = tempfile::tempdir().unwrap();
    let addr = fx.addr().to_string();

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let addr = addr.clone();
            let out = dst.path().join(format!("copy-{i}"));
            thread::spawn(move || {
                let mut client = Client::default();
                assert!(client.connect(&addr));
                client.execute_get("shared.bin", &out).unwrap();
                client.disconnect().unwrap();
                std::fs::read(&out).unwrap()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), data);
    }
}

#[test]
fn server_stop_ends_client_session() {
    let mut fx = Fixture::new();
    let mut client = fx.client();
    assert_eq!(client.execute_list(".").unwrap(), expected_listing());

    fx.server.stop();

    assert!(client.execute_list(".").is_err());
    assert!(!client.is_connected());
}

/// Serves exactly one `GetRequest` with more data than its header declares.
fn oversized_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut prefix = [0u8; PREFIX_LEN];
        stream.read_exact(&mut prefix).unwrap();
        let mut payload = vec![0u8; u32::from_be_bytes(prefix) as usize];
        stream.read_exact(&mut payload).unwrap();
        let Ok(Message::GetRequest { path }) = nioftp_protocol::decode(&payload) else {
            return;
        };

        let replies = [
            Message::GetHeader { path, size: 4 },
            Message::GetData {
                bytes: b"abc".to_vec(),
            },
            Message::GetData {
                bytes: b"defg".to_vec(),
            },
        ];
        for reply in &replies {
            // The client may hang up before reading everything.
            if stream
                .write_all(&encode_frame(reply, MAX_FRAME_LEN).unwrap())
                .is_err()
            {
                return;
            }
        }
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    addr
}

#[test]
fn oversized_transfer_is_a_protocol_error() {
    let addr = oversized_server();
    let dst = tempfile::tempdir().unwrap();
    let out = dst.path().join("out");

    let mut client = Client::default();
    assert!(client.connect(&addr.to_string()));
    let err = client.execute_get("anything", &out).unwrap_err();

    assert!(matches!(
        err,
        ClientError::Protocol(ProtocolError::Violation(_))
    ));
    assert!(!client.is_connected());
    assert!(!out.exists());
}
