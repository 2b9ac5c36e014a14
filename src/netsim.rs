//! Lossy-link emulation for exercising the reliability mechanisms without
//! depending on actual network conditions.
//!
//! A [`Relay`] sits between client and server as a plain UDP forwarder: the
//! client addresses the relay instead of the server, the relay learns the
//! client's address from its first datagram, and every forwarded datagram is
//! subject to a fault model — a seeded loss probability, a fixed propagation
//! delay, and an exact drop schedule for deterministic scenario tests. The
//! protocol endpoints cannot tell the relay from a misbehaving network.

use std::collections::VecDeque;
use std::net;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::socket;

const FRAME_SIZE_MAX_DEFAULT: usize = 1472;

// Upper bound on one blocking step, so a spawned relay notices shutdown
const STEP_SLICE_MS: u64 = 25;

/// Fault model for a [`Relay`].
#[derive(Clone)]
pub struct Config {
    /// Probability in [0, 1] that any forwarded datagram is silently
    /// dropped, both directions.
    ///
    /// Default value: 0.0
    pub loss_rate: f64,

    /// Fixed propagation delay applied to every forwarded datagram, in
    /// milliseconds.
    ///
    /// Default value: 0
    pub delay_ms: u64,

    /// Seed for the loss process, so failures reproduce.
    ///
    /// Default value: 0
    pub seed: u64,

    /// 1-based indices of server→client datagrams to drop exactly once,
    /// independent of `loss_rate`. Pins loss patterns in scenario tests.
    ///
    /// Default value: empty
    pub drop_schedule: Vec<u64>,

    /// Largest datagram forwarded in either direction.
    ///
    /// Default value: 1472
    pub frame_size_max: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            delay_ms: 0,
            seed: 0,
            drop_schedule: Vec::new(),
            frame_size_max: FRAME_SIZE_MAX_DEFAULT,
        }
    }
}

impl Config {
    fn validate(&self) {
        assert!(
            (0.0..=1.0).contains(&self.loss_rate),
            "invalid relay configuration: loss_rate outside [0, 1]"
        );
        assert!(
            self.frame_size_max > 0,
            "invalid relay configuration: frame_size_max == 0"
        );
    }
}

struct DelayedFrame {
    due_ms: u64,
    dest: net::SocketAddr,
    bytes: Vec<u8>,
}

/// A fault-injecting UDP forwarder between one client and one server.
pub struct Relay {
    config: Config,
    // Socket handles
    socket_tx: socket::SocketTx,
    socket_rx: socket::SocketRx,
    // Fixed upstream (server) address
    upstream_addr: net::SocketAddr,
    // Learned from the first client datagram
    client_addr: Option<net::SocketAddr>,
    // In-flight delayed frames; the delay is constant, so arrival order is
    // due order and a queue suffices
    delayed: VecDeque<DelayedFrame>,
    // Loss process
    rng: StdRng,
    // Count of server→client datagrams seen, for the drop schedule
    downstream_count: u64,
    // Timestamps are computed relative to this instant
    time_ref: time::Instant,
}

impl Relay {
    /// Binds the relay's socket and returns it ready to forward between
    /// whoever sends first and the server at `upstream_addr`.
    pub fn bind<A, B>(bind_addr: A, upstream_addr: B, config: Config) -> std::io::Result<Self>
    where
        A: net::ToSocketAddrs,
        B: net::ToSocketAddrs,
    {
        config.validate();

        let upstream_addr = upstream_addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::AddrNotAvailable))?;

        let (socket_tx, socket_rx) = socket::new(bind_addr, config.frame_size_max)?;

        let rng = StdRng::seed_from_u64(config.seed);

        Ok(Self {
            config,
            socket_tx,
            socket_rx,
            upstream_addr,
            client_addr: None,
            delayed: VecDeque::new(),
            rng,
            downstream_count: 0,
            time_ref: time::Instant::now(),
        })
    }

    /// Returns the address clients should send to.
    pub fn local_addr(&self) -> net::SocketAddr {
        self.socket_rx.local_addr()
    }

    fn time_now_ms(&self) -> u64 {
        (time::Instant::now() - self.time_ref).as_millis() as u64
    }

    fn flush_delayed(&mut self, now_ms: u64) {
        while let Some(frame) = self.delayed.front() {
            if frame.due_ms > now_ms {
                break;
            }

            let frame = self.delayed.pop_front().unwrap();
            self.socket_tx.send(&frame.bytes, &frame.dest);
        }
    }

    fn route(&mut self, bytes: Vec<u8>, sender_addr: net::SocketAddr, now_ms: u64) {
        let dest = if sender_addr == self.upstream_addr {
            self.downstream_count += 1;

            if self.config.drop_schedule.contains(&self.downstream_count) {
                return;
            }

            match self.client_addr {
                Some(client_addr) => client_addr,
                // Server traffic before any client is known has nowhere to go
                None => return,
            }
        } else {
            self.client_addr = Some(sender_addr);
            self.upstream_addr
        };

        if self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate {
            return;
        }

        if self.config.delay_ms > 0 {
            self.delayed.push_back(DelayedFrame {
                due_ms: now_ms + self.config.delay_ms,
                dest,
                bytes,
            });
        } else {
            self.socket_tx.send(&bytes, &dest);
        }
    }

    /// One forwarding step: releases due delayed frames, then blocks briefly
    /// for the next datagram and routes it.
    pub fn step(&mut self) -> std::io::Result<()> {
        let now_ms = self.time_now_ms();

        self.flush_delayed(now_ms);

        let wait_ms = match self.delayed.front() {
            Some(frame) => frame.due_ms.saturating_sub(now_ms).min(STEP_SLICE_MS),
            None => STEP_SLICE_MS,
        };

        let received = self
            .socket_rx
            .wait_for_frame(Some(time::Duration::from_millis(wait_ms)))?
            .map(|(bytes, sender_addr)| (bytes.to_vec(), sender_addr));

        if let Some((bytes, sender_addr)) = received {
            let now_ms = self.time_now_ms();
            self.route(bytes, sender_addr, now_ms);
        }

        Ok(())
    }

    /// Moves the relay onto its own thread, stepping until shut down.
    pub fn spawn(mut self) -> RelayHandle {
        let local_addr = self.local_addr();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        let thread = std::thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                if self.step().is_err() {
                    break;
                }
            }
        });

        RelayHandle {
            local_addr,
            stop,
            thread: Some(thread),
        }
    }
}

/// Owner handle for a spawned [`Relay`]; shuts the relay down when dropped.
pub struct RelayHandle {
    local_addr: net::SocketAddr,
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl RelayHandle {
    /// Returns the address clients should send to.
    pub fn local_addr(&self) -> net::SocketAddr {
        self.local_addr
    }

    /// Stops forwarding and joins the relay thread.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Relaxed);

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
