use std::io::Write;
use std::net;
use std::time;

use crate::frame;
use crate::frame::serial;
use crate::session::ReorderBuffer;
use crate::socket;
use crate::TransferError;

const MSS_DEFAULT: usize = 1400;
const IDLE_TIMEOUT_DEFAULT_MS: u64 = 2000;
const IDLE_RETRY_LIMIT_DEFAULT: u32 = 10;

/// Configuration for a [`Client`] object.
#[derive(Clone)]
pub struct Config {
    /// Largest payload the client is prepared to receive in one segment.
    /// Must be at least the server's configured MSS.
    ///
    /// Default value: 1400
    pub mss: usize,

    /// Timeout while waiting for the next datagram, in milliseconds. Also
    /// the resend interval for the initial request.
    ///
    /// Default value: 2000
    pub idle_timeout_ms: u64,

    /// Consecutive idle timeouts tolerated mid-transfer before the session
    /// is abandoned.
    ///
    /// Minimum value: 1 \
    /// Default value: 10
    pub idle_retry_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mss: MSS_DEFAULT,
            idle_timeout_ms: IDLE_TIMEOUT_DEFAULT_MS,
            idle_retry_limit: IDLE_RETRY_LIMIT_DEFAULT,
        }
    }
}

impl Config {
    fn validate(&self) {
        assert!(self.mss > 0, "invalid client configuration: mss == 0");
        assert!(
            self.idle_timeout_ms > 0,
            "invalid client configuration: idle_timeout_ms == 0"
        );
        assert!(
            self.idle_retry_limit > 0,
            "invalid client configuration: idle_retry_limit == 0"
        );
    }
}

/// Outcome of one completed download.
#[derive(Clone, Debug)]
pub struct TransferSummary {
    /// In-order payload bytes written to the sink.
    pub bytes_written: u64,
    /// Data segments that decoded successfully.
    pub segments_received: u64,
    /// Segments held in the reorder buffer on arrival.
    pub out_of_order_buffered: u64,
    /// Segments dropped as already delivered or already buffered.
    pub duplicates_dropped: u64,
    /// Cumulative ACKs sent, including idle re-ACKs.
    pub acks_sent: u64,
}

/// A tamarack download client: requests a file from a server and writes the
/// reassembled byte stream to a sink.
pub struct Client {
    config: Config,
    // Socket handles
    socket_tx: socket::SocketTx,
    socket_rx: socket::SocketRx,
    // Server address, fixed at connect time; datagrams from anyone else are
    // discarded
    server_addr: net::SocketAddr,
}

impl Client {
    /// Equivalent to calling [`Client::connect_with_config`] with default
    /// configuration.
    pub fn connect<A>(server_addr: A) -> std::io::Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        Self::connect_with_config(server_addr, Default::default())
    }

    /// Binds a UDP socket to an ephemeral address and returns a new client
    /// object addressing the given server. Errors encountered during socket
    /// initialization are forwarded to the caller.
    pub fn connect_with_config<A>(server_addr: A, config: Config) -> std::io::Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        config.validate();

        let server_addr = server_addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::AddrNotAvailable))?;

        let bind_address = (net::Ipv4Addr::UNSPECIFIED, 0);
        let frame_size_max = serial::SEGMENT_OVERHEAD_MAX + config.mss;

        let (socket_tx, socket_rx) = socket::new(bind_address, frame_size_max)?;

        Ok(Self {
            config,
            socket_tx,
            socket_rx,
            server_addr,
        })
    }

    /// Returns the local address of the internal UDP socket.
    pub fn local_addr(&self) -> net::SocketAddr {
        self.socket_rx.local_addr()
    }

    /// Returns the server address for this client.
    pub fn server_addr(&self) -> net::SocketAddr {
        self.server_addr
    }

    fn send_ack(&self, value: u32, summary: &mut TransferSummary) {
        let bytes = serial::write_ack(frame::Ack { value });
        self.socket_tx.send(&bytes, &self.server_addr);

        summary.acks_sent += 1;
    }

    /// Downloads one file into `sink`: sends the request until the server
    /// responds, acknowledges every datagram cumulatively, and returns once
    /// the terminal segment has been consumed in order.
    ///
    /// Returns [`TransferError::Timeout`] if the server goes silent for more
    /// than `idle_retry_limit` consecutive idle timeouts mid-transfer.
    pub fn download<W: Write>(&mut self, sink: &mut W) -> Result<TransferSummary, TransferError> {
        let idle_timeout = time::Duration::from_millis(self.config.idle_timeout_ms);

        let mut reorder = ReorderBuffer::new(1);
        let mut summary = TransferSummary {
            bytes_written: 0,
            segments_received: 0,
            out_of_order_buffered: 0,
            duplicates_dropped: 0,
            acks_sent: 0,
        };

        // Request phase: retried without bound — no transfer state exists
        // yet, so there is nothing to abandon. The first response is already
        // the first data (or terminal) segment.
        let mut pending: Option<Vec<u8>> = None;

        while pending.is_none() {
            self.socket_tx.send(frame::REQUEST_TOKEN, &self.server_addr);

            if let Some((bytes, sender_addr)) = self.socket_rx.wait_for_frame(Some(idle_timeout))? {
                if sender_addr == self.server_addr {
                    pending = Some(bytes.to_vec());
                }
            }
        }

        // Receive phase
        let mut idle_count = 0;

        let final_ack = loop {
            let datagram = match pending.take() {
                Some(bytes) => Some(bytes),
                None => match self.socket_rx.wait_for_frame(Some(idle_timeout))? {
                    Some((bytes, sender_addr)) if sender_addr == self.server_addr => {
                        Some(bytes.to_vec())
                    }
                    // Cross-talk from unrelated sources neither delivers nor
                    // counts as server silence
                    Some(_) => continue,
                    None => None,
                },
            };

            match datagram {
                Some(bytes) => {
                    idle_count = 0;

                    // An undecodable datagram is equivalent to a drop: no
                    // state change, no ACK, recovery via retransmission
                    if let Some(delivery) = apply(&mut reorder, sink, &bytes, &mut summary)? {
                        self.send_ack(delivery.ack, &mut summary);

                        if delivery.reached_terminal {
                            break delivery.ack;
                        }
                    }
                }
                None => {
                    idle_count += 1;

                    if idle_count > self.config.idle_retry_limit {
                        return Err(TransferError::Timeout);
                    }

                    // Re-assert the cumulative position; repairs a lost ACK
                    self.send_ack(reorder.next_expected(), &mut summary);
                }
            }
        };

        sink.flush()?;

        // The final ACK may be lost; keep answering retransmitted terminal
        // segments until the server has been quiet for one idle timeout
        for _ in 0..self.config.idle_retry_limit {
            let sender = self
                .socket_rx
                .wait_for_frame(Some(idle_timeout))?
                .map(|(_, sender_addr)| sender_addr);

            match sender {
                Some(sender_addr) if sender_addr == self.server_addr => {
                    self.send_ack(final_ack, &mut summary);
                }
                Some(_) => {}
                None => break,
            }
        }

        Ok(summary)
    }
}

/// Feeds one datagram through the reorder buffer, writing whatever became
/// deliverable. Returns None for undecodable input.
fn apply<W: Write>(
    reorder: &mut ReorderBuffer,
    sink: &mut W,
    bytes: &[u8],
    summary: &mut TransferSummary,
) -> Result<Option<crate::session::Delivery>, TransferError> {
    let segment = match serial::read_segment(bytes) {
        Ok(segment) => segment,
        Err(_) => return Ok(None),
    };

    summary.segments_received += 1;

    let expected_before = reorder.next_expected();
    let buffered_before = reorder.buffered_count();

    let mut write_result = Ok(());
    let mut bytes_written = 0u64;

    let delivery = reorder.on_segment(segment.seq, segment.payload, |payload| {
        if write_result.is_ok() {
            write_result = sink.write_all(payload);
            if write_result.is_ok() {
                bytes_written += payload.len() as u64;
            }
        }
    });

    write_result?;
    summary.bytes_written += bytes_written;

    if delivery.ack == expected_before && !delivery.reached_terminal {
        if reorder.buffered_count() > buffered_before {
            summary.out_of_order_buffered += 1;
        } else {
            summary.duplicates_dropped += 1;
        }
    }

    Ok(Some(delivery))
}
