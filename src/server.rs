use std::io::Read;
use std::net;
use std::time;

use crate::frame;
use crate::frame::serial;
use crate::session;
use crate::socket;
use crate::TransferError;

const EOF_RETRY_LIMIT_DEFAULT: u32 = 10;

/// Configuration for a [`Server`] object.
#[derive(Clone)]
pub struct Config {
    /// Protocol parameters applied to every session.
    pub session: session::Config,

    /// Number of terminal-segment transmissions attempted before the
    /// transfer is reported incomplete.
    ///
    /// Minimum value: 1 \
    /// Default value: 10
    pub eof_retry_limit: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: Default::default(),
            eof_retry_limit: EOF_RETRY_LIMIT_DEFAULT,
        }
    }
}

impl Config {
    fn validate(&self) {
        assert!(
            self.eof_retry_limit > 0,
            "invalid server configuration: eof_retry_limit == 0"
        );

        self.session.validate();
    }
}

/// Outcome of one completed transfer.
#[derive(Clone, Debug)]
pub struct TransferSummary {
    /// Address the file was served to.
    pub peer: net::SocketAddr,
    /// Payload bytes read from the source and put on the wire.
    pub bytes_sent: u64,
    /// Distinct data segments transmitted (first transmissions only).
    pub segments_sent: u64,
    /// Segments re-sent by the timeout path.
    pub retransmits_timeout: u64,
    /// Segments re-sent by the fast-retransmit path.
    pub retransmits_fast: u64,
    /// Retransmission-timeout events (each one a congestion reset).
    pub timeout_events: u64,
    /// Duplicate cumulative ACKs observed.
    pub duplicate_acks: u64,
    /// Terminal-segment transmissions needed to finish the handshake.
    pub eof_attempts: u32,
}

/// A tamarack file server. Sessions are served one at a time; each begins
/// with a request datagram and ends when the terminal handshake completes.
pub struct Server {
    config: Config,
    // Socket handles
    socket_tx: socket::SocketTx,
    socket_rx: socket::SocketRx,
    // Always-allocated segment encode buffer
    tx_buffer: Box<[u8]>,
    // Timestamps are computed relative to this instant
    time_ref: time::Instant,
}

impl Server {
    /// Equivalent to calling [`Server::bind_with_config`] with default
    /// configuration.
    pub fn bind<A>(bind_addr: A) -> std::io::Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        Self::bind_with_config(bind_addr, Default::default())
    }

    /// Binds a UDP socket to the provided address and returns a new server
    /// object. Errors encountered during socket initialization are forwarded
    /// to the caller.
    pub fn bind_with_config<A>(bind_addr: A, config: Config) -> std::io::Result<Self>
    where
        A: net::ToSocketAddrs,
    {
        config.validate();

        let frame_size_max = serial::SEGMENT_OVERHEAD_MAX + config.session.mss;

        let (socket_tx, socket_rx) = socket::new(bind_addr, frame_size_max)?;

        Ok(Self {
            config,
            socket_tx,
            socket_rx,
            tx_buffer: vec![0; frame_size_max].into_boxed_slice(),
            time_ref: time::Instant::now(),
        })
    }

    /// Returns the local address of the internal UDP socket.
    pub fn local_addr(&self) -> net::SocketAddr {
        self.socket_rx.local_addr()
    }

    /// Returns the number of whole milliseconds elapsed since the server
    /// object was created.
    fn time_now_ms(&self) -> u64 {
        (time::Instant::now() - self.time_ref).as_millis() as u64
    }

    /// Serves one complete session: blocks until a request arrives, streams
    /// the source to the requester, and completes the terminal handshake.
    ///
    /// Session state is constructed fresh per call, so nothing carries over
    /// between transfers. Returns [`TransferError::Timeout`] if the terminal
    /// handshake exhausts its bounded retries (incomplete transfer).
    pub fn serve(&mut self, source: &mut impl Read) -> Result<TransferSummary, TransferError> {
        let peer = self.await_request()?;

        let mut session = session::Session::new(&self.config.session);

        self.run_sending(&mut session, source, &peer)?;
        let eof_attempts = self.finish_eof_handshake(&session, &peer)?;

        let stats = session.stats();

        Ok(TransferSummary {
            peer,
            bytes_sent: stats.bytes_sent,
            segments_sent: stats.segments_sent,
            retransmits_timeout: stats.retransmits_timeout,
            retransmits_fast: stats.retransmits_fast,
            timeout_events: stats.timeout_events,
            duplicate_acks: stats.duplicate_acks,
            eof_attempts,
        })
    }

    /// Blocks until a datagram containing the request token arrives and
    /// returns the requester's address. Anything else is ignored.
    fn await_request(&mut self) -> Result<net::SocketAddr, TransferError> {
        loop {
            if let Some((bytes, sender_addr)) = self.socket_rx.wait_for_frame(None)? {
                if bytes == frame::REQUEST_TOKEN {
                    return Ok(sender_addr);
                }
            }
        }
    }

    fn transmit(&mut self, session: &session::Session, seq: u32, peer: &net::SocketAddr) {
        if let Some(payload) = session.payload(seq) {
            let segment = frame::Segment { seq, payload };
            let frame_len = serial::write_segment(&mut self.tx_buffer, &segment);

            self.socket_tx.send(&self.tx_buffer[..frame_len], peer);
        }
    }

    /// The data phase: fill the window, transmit, block up to the next
    /// per-segment deadline for one ACK, retransmit whatever is overdue.
    /// Ends once the source is exhausted and every data segment is
    /// acknowledged.
    fn run_sending(
        &mut self,
        session: &mut session::Session,
        source: &mut impl Read,
        peer: &net::SocketAddr,
    ) -> Result<(), TransferError> {
        loop {
            let now_ms = self.time_now_ms();

            for seq in session.fill(source, now_ms)? {
                self.transmit(session, seq, peer);
            }

            if session.is_drained() {
                return Ok(());
            }

            // The bounded receive wait doubles as the retransmission tick
            let now_ms = self.time_now_ms();
            let wait_ms = session
                .next_deadline_in_ms(now_ms)
                .unwrap_or_else(|| session.rto_ms());

            let received = self
                .socket_rx
                .wait_for_frame(Some(time::Duration::from_millis(wait_ms)))?
                .map(|(bytes, sender_addr)| (serial::read_ack(bytes), sender_addr));

            if let Some((decoded, sender_addr)) = received {
                // Frames from other addresses are ignored: sessions are
                // single-flight and a stray ACK must not move this window.
                // Undecodable frames are equivalent to drops.
                if sender_addr == *peer {
                    if let Ok(ack) = decoded {
                        let now_ms = self.time_now_ms();

                        if let Some(seq) = session.on_ack(ack.value, now_ms) {
                            self.transmit(session, seq, peer);
                        }
                    }
                }
            }

            // Per-segment overdue check, every cycle; several segments can
            // be in flight at different ages
            let now_ms = self.time_now_ms();
            for seq in session.handle_due_retransmits(now_ms) {
                self.transmit(session, seq, peer);
            }
        }
    }

    /// The terminal handshake: send the terminal segment, wait one RTO for
    /// the final ACK, retry up to the configured bound.
    fn finish_eof_handshake(
        &mut self,
        session: &session::Session,
        peer: &net::SocketAddr,
    ) -> Result<u32, TransferError> {
        let terminal_seq = session.terminal_seq();
        let final_ack = terminal_seq + 1;

        for attempt in 1..=self.config.eof_retry_limit {
            let segment = frame::Segment::terminal(terminal_seq);
            let frame_len = serial::write_segment(&mut self.tx_buffer, &segment);
            self.socket_tx.send(&self.tx_buffer[..frame_len], peer);

            let deadline_ms = self.time_now_ms() + session.rto_ms();

            loop {
                let now_ms = self.time_now_ms();

                if now_ms >= deadline_ms {
                    break;
                }

                let received = self
                    .socket_rx
                    .wait_for_frame(Some(time::Duration::from_millis(deadline_ms - now_ms)))?
                    .map(|(bytes, sender_addr)| (serial::read_ack(bytes), sender_addr));

                if let Some((Ok(ack), sender_addr)) = received {
                    if sender_addr == *peer && ack.value == final_ack {
                        return Ok(attempt);
                    }
                    // Late cumulative ACKs from the data phase keep arriving
                    // here; wait out the attempt
                }
            }
        }

        Err(TransferError::Timeout)
    }
}
