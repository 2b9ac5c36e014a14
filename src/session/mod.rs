mod cc;
mod reorder;
mod send_window;

pub use reorder::{Delivery, ReorderBuffer};
pub use send_window::AckSignal;

use std::io::Read;

use crate::rtt::RttEstimator;
use cc::CongestionController;
use send_window::SendWindow;

use crate::frame::serial::SEGMENT_OVERHEAD_MAX;

const DUP_ACK_THRESHOLD: u32 = 3;

// Largest UDP payload minus the segment header.
pub const MSS_MAX: usize = 65507 - SEGMENT_OVERHEAD_MAX;

/// Protocol knobs for one transfer session.
#[derive(Clone)]
pub struct Config {
    /// Maximum segment size: the largest payload carried by one datagram.
    ///
    /// Default value: 1400
    pub mss: usize,

    /// Fixed cap on in-flight segments.
    ///
    /// Default value: 4
    pub window_size: u32,

    /// Retransmit on the third duplicate ACK instead of waiting for the
    /// retransmission timeout.
    ///
    /// Default value: true
    pub fast_retransmit: bool,

    /// Bound the window by a TCP-Reno-like congestion window in addition to
    /// `window_size`; the effective window is the minimum of the two.
    ///
    /// Default value: true
    pub congestion_control: bool,

    /// Retransmission timeout before the first RTT sample, in milliseconds.
    ///
    /// Default value: 1000
    pub initial_timeout_ms: u64,

    /// Lower bound on the adaptive retransmission timeout, in milliseconds.
    ///
    /// Default value: 100
    pub timeout_floor_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mss: 1400,
            window_size: 4,
            fast_retransmit: true,
            congestion_control: true,
            initial_timeout_ms: 1000,
            timeout_floor_ms: 100,
        }
    }
}

impl Config {
    pub fn validate(&self) {
        assert!(
            self.mss > 0 && self.mss <= MSS_MAX,
            "invalid session configuration: mss out of range"
        );
        assert!(
            self.window_size > 0,
            "invalid session configuration: window_size == 0"
        );
        assert!(
            self.timeout_floor_ms > 0,
            "invalid session configuration: timeout_floor_ms == 0"
        );
        assert!(
            self.initial_timeout_ms >= self.timeout_floor_ms,
            "invalid session configuration: initial_timeout_ms < timeout_floor_ms"
        );
    }
}

/// Counters accumulated over one session; the drivers surface them in their
/// transfer summaries.
#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub segments_sent: u64,
    pub bytes_sent: u64,
    pub retransmits_timeout: u64,
    pub retransmits_fast: u64,
    pub timeout_events: u64,
    pub duplicate_acks: u64,
}

/// Sender-side state of one transfer: sliding window, RTT estimation, and
/// congestion control composed behind one aggregate, so constructing a fresh
/// `Session` is a full reset and nothing leaks between transfers.
pub struct Session {
    window: SendWindow,
    rtt: RttEstimator,
    cc: Option<CongestionController>,
    fast_retransmit: bool,
    fixed_window: u32,
    stats: Stats,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self {
            window: SendWindow::new(config.mss),
            rtt: RttEstimator::new(config.initial_timeout_ms, config.timeout_floor_ms),
            cc: config
                .congestion_control
                .then(|| CongestionController::new(config.mss)),
            fast_retransmit: config.fast_retransmit,
            fixed_window: config.window_size,
            stats: Stats::default(),
        }
    }

    pub fn rto_ms(&self) -> u64 {
        self.rtt.timeout_ms()
    }

    /// Current window bound in segments: the fixed cap, clamped by the
    /// congestion window when congestion control is enabled.
    pub fn effective_window(&self) -> u32 {
        match &self.cc {
            Some(cc) => cc.window_segments(self.fixed_window),
            None => self.fixed_window,
        }
    }

    /// Reads fresh segments from the source up to the effective window.
    pub fn fill(&mut self, source: &mut impl Read, now_ms: u64) -> std::io::Result<Vec<u32>> {
        let limit = self.effective_window();
        let fresh = self.window.fill(source, limit, now_ms)?;

        self.stats.segments_sent += fresh.len() as u64;
        for &seq in &fresh {
            if let Some(payload) = self.window.payload(seq) {
                self.stats.bytes_sent += payload.len() as u64;
            }
        }

        Ok(fresh)
    }

    /// Applies one cumulative ACK. Returns the sequence number to fast-
    /// retransmit immediately, if the duplicate threshold was just crossed.
    pub fn on_ack(&mut self, ack_value: u32, now_ms: u64) -> Option<u32> {
        match self.window.on_ack(ack_value, now_ms) {
            AckSignal::Advanced {
                newly_acked,
                rtt_sample_ms,
            } => {
                if let Some(sample_ms) = rtt_sample_ms {
                    self.rtt.record_sample(sample_ms);
                }

                if let Some(cc) = &mut self.cc {
                    for _ in 0..newly_acked {
                        cc.on_new_ack();
                    }
                }

                None
            }
            AckSignal::Duplicate {
                count,
                refers_in_flight,
            } => {
                self.stats.duplicate_acks += 1;

                if count == DUP_ACK_THRESHOLD && self.fast_retransmit && refers_in_flight {
                    // The counter passes the threshold once per hole, so the
                    // fast retransmission fires exactly once
                    if let Some(cc) = &mut self.cc {
                        cc.enter_fast_recovery();
                    }

                    self.window.mark_retransmitted(ack_value, now_ms);
                    self.stats.retransmits_fast += 1;

                    return Some(ack_value);
                }

                if let Some(cc) = &mut self.cc {
                    cc.on_duplicate_ack();
                }

                None
            }
            AckSignal::Ignored => None,
        }
    }

    /// Collects segments whose age exceeds the current RTO and applies the
    /// timeout penalty when at least one fires: congestion window collapses
    /// and the duplicate-ACK bookkeeping clears.
    pub fn handle_due_retransmits(&mut self, now_ms: u64) -> Vec<u32> {
        let due = self.window.due_for_retransmit(now_ms, self.rto_ms());

        if !due.is_empty() {
            if let Some(cc) = &mut self.cc {
                cc.on_timeout();
            }
            self.window.clear_ack_counts();

            self.stats.timeout_events += 1;
            self.stats.retransmits_timeout += due.len() as u64;
        }

        due
    }

    /// Milliseconds until the oldest in-flight segment comes due, if any.
    pub fn next_deadline_in_ms(&self, now_ms: u64) -> Option<u64> {
        self.window
            .oldest_sent_at_ms()
            .map(|sent_at_ms| (sent_at_ms + self.rto_ms()).saturating_sub(now_ms))
    }

    pub fn payload(&self, seq: u32) -> Option<&[u8]> {
        self.window.payload(seq)
    }

    pub fn all_data_read(&self) -> bool {
        self.window.all_data_read()
    }

    pub fn is_drained(&self) -> bool {
        self.window.is_drained()
    }

    pub fn terminal_seq(&self) -> u32 {
        self.window.terminal_seq()
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}
