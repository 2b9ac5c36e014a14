use std::net::SocketAddr;
use std::thread;

use tamarack::{server, Client, Server, TransferError};

/// Deterministic non-repeating payload so misplaced segments are visible.
pub fn pattern_bytes(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Binds a server on an ephemeral port, then serves `sessions` transfers of
/// `data` on a background thread. Binding happens on the caller's thread so
/// the address is known before any client starts.
pub fn spawn_server(
    config: server::Config,
    data: Vec<u8>,
    sessions: usize,
) -> (
    SocketAddr,
    thread::JoinHandle<Vec<Result<server::TransferSummary, TransferError>>>,
) {
    let mut server = Server::bind_with_config(("127.0.0.1", 0), config).unwrap();
    let addr = server.local_addr();

    let handle = thread::spawn(move || {
        (0..sessions)
            .map(|_| {
                let mut source = std::io::Cursor::new(data.clone());
                server.serve(&mut source)
            })
            .collect()
    });

    (addr, handle)
}

/// Client config tuned for test turnaround: short idle timeout, but enough
/// retries to sit out a full server-side RTO recovery.
pub fn test_client(server_addr: SocketAddr) -> Client {
    let config = {
        let mut config = tamarack::client::Config::default();
        config.idle_timeout_ms = 500;
        config.idle_retry_limit = 10;
        config
    };

    Client::connect_with_config(server_addr, config).unwrap()
}

/// Downloads once, returning the received bytes and the client's summary.
pub fn download(
    server_addr: SocketAddr,
) -> (Vec<u8>, tamarack::client::TransferSummary) {
    let mut client = test_client(server_addr);
    let mut output = Vec::new();

    let summary = client.download(&mut output).unwrap();

    (output, summary)
}

pub fn assert_payload_eq(received: &[u8], expected: &[u8]) {
    assert_eq!(
        md5::compute(received),
        md5::compute(expected),
        "received stream differs from source"
    );
    assert_eq!(received, expected);
}
