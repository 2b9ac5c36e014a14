// EWMA retransmission-timeout estimation over millisecond counts, kept in
// Q16 so the 1/8 and 1/4 gains stay exact in integer arithmetic.

const ALPHA_SHIFT: u32 = 3; // alpha = 1/8
const BETA_SHIFT: u32 = 2; // beta = 1/4

pub struct RttEstimator {
    srtt_q16: u64,
    dev_q16: u64,
    floor_ms: u64,
}

impl RttEstimator {
    /// Seeding srtt with the configured initial timeout makes `timeout_ms`
    /// return it verbatim until the first sample blends in.
    pub fn new(initial_timeout_ms: u64, floor_ms: u64) -> Self {
        assert!(initial_timeout_ms > 0);

        Self {
            srtt_q16: initial_timeout_ms << 16,
            dev_q16: 0,
            floor_ms,
        }
    }

    /// Records one round-trip sample.
    ///
    /// Callers must never derive a sample from a retransmitted segment; its
    /// ACK cannot be attributed to a single transmission (Karn's rule). The
    /// send window enforces this via its per-entry retransmission flag.
    pub fn record_sample(&mut self, sample_ms: u64) {
        let sample_q16 = sample_ms << 16;

        // srtt <- (1-alpha)*srtt + alpha*sample
        self.srtt_q16 =
            self.srtt_q16 - (self.srtt_q16 >> ALPHA_SHIFT) + (sample_q16 >> ALPHA_SHIFT);

        // dev <- (1-beta)*dev + beta*|sample - srtt|, against the new srtt
        let delta_q16 = self.srtt_q16.abs_diff(sample_q16);
        self.dev_q16 = self.dev_q16 - (self.dev_q16 >> BETA_SHIFT) + (delta_q16 >> BETA_SHIFT);
    }

    /// Current retransmission timeout: srtt + 4*dev, floored to avoid
    /// busy-retransmission when the link RTT collapses toward zero.
    pub fn timeout_ms(&self) -> u64 {
        let rto_q16 = self.srtt_q16 + 4 * self.dev_q16;

        (rto_q16 >> 16).max(self.floor_ms)
    }
}
