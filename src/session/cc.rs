// This implementation of TCP-Reno-like congestion control has been informed
// by: https://intronetworks.cs.luc.edu/current/html/reno.html
//
// Values are Q16 fixed-point byte counts so the congestion-avoidance
// increment mss*mss/cwnd stays exact in integer arithmetic.

// Before any loss signal, slow start runs until a generous threshold [19.2.2]
const INITIAL_SSTHRESH_MSS: u64 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    SlowStart,
    CongestionAvoidance,
    FastRecovery,
}

pub struct CongestionController {
    state: State,
    mss_q16: u64,
    cwnd_q16: u64,
    ssthresh_q16: u64,
}

impl CongestionController {
    pub fn new(mss: usize) -> Self {
        // (mss * mss) << 32 must be a valid u64
        assert!(mss > 0 && mss <= u16::MAX.into());

        let mss_q16 = (mss as u64) << 16;

        Self {
            state: State::SlowStart,
            mss_q16,
            cwnd_q16: mss_q16,
            ssthresh_q16: INITIAL_SSTHRESH_MSS * mss_q16,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// One segment newly acknowledged by an advancing cumulative ACK.
    pub fn on_new_ack(&mut self) {
        match self.state {
            State::SlowStart => {
                // One MSS per ack doubles cwnd each RTT [19.2]
                self.cwnd_q16 = self.cwnd_q16.saturating_add(self.mss_q16);

                if self.cwnd_q16 >= self.ssthresh_q16 {
                    self.state = State::CongestionAvoidance;
                }
            }
            State::CongestionAvoidance => {
                // mss*mss/cwnd per ack approximates one MSS per RTT [19.2.1]
                let mss_q16 = self.mss_q16;
                let cwnd_q16 = self.cwnd_q16;
                let increment_q16 = (mss_q16 * mss_q16 + cwnd_q16 / 2) / cwnd_q16;
                self.cwnd_q16 = cwnd_q16.saturating_add(increment_q16);
            }
            State::FastRecovery => {
                // First new ack deflates the window and resumes additive
                // growth [19.4]
                self.cwnd_q16 = self.ssthresh_q16;
                self.state = State::CongestionAvoidance;
            }
        }
    }

    /// A repeated cumulative ACK while in fast recovery inflates the window
    /// by the segment that has evidently left the network.
    pub fn on_duplicate_ack(&mut self) {
        if self.state == State::FastRecovery {
            self.cwnd_q16 = self.cwnd_q16.saturating_add(self.mss_q16);
        }
    }

    /// Entered on the third duplicate ACK, alongside the fast retransmit.
    pub fn enter_fast_recovery(&mut self) {
        self.ssthresh_q16 = (self.cwnd_q16 / 2).max(self.mss_q16);
        self.cwnd_q16 = self.ssthresh_q16 + 3 * self.mss_q16;
        self.state = State::FastRecovery;
    }

    /// The punitive transition: fires on every retransmission-timeout event,
    /// from any state.
    pub fn on_timeout(&mut self) {
        self.ssthresh_q16 = (self.cwnd_q16 / 2).max(self.mss_q16);
        self.cwnd_q16 = self.mss_q16;
        self.state = State::SlowStart;
    }

    pub fn cwnd(&self) -> usize {
        let cwnd_int = self.cwnd_q16 >> 16;

        cwnd_int.try_into().unwrap_or(usize::MAX)
    }

    /// Effective window in segments: the fixed cap and the congestion window
    /// clamped to their minimum, never below one segment.
    pub fn window_segments(&self, fixed_window: u32) -> u32 {
        let cwnd_segments = (self.cwnd_q16 / self.mss_q16).max(1);
        let cwnd_segments = u32::try_from(cwnd_segments).unwrap_or(u32::MAX);

        fixed_window.min(cwnd_segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_cwnd_near(cwnd: usize, expected: f64) {
        let cwnd_f64 = cwnd as f64;

        if (cwnd_f64 - expected).abs() > 1.0 {
            panic!("expected cwnd near {}, found {}", expected, cwnd);
        }
    }

    #[test]
    fn slow_start_grows_linearly_per_ack() {
        let mss = 100;
        let mut cc = CongestionController::new(mss);

        assert_eq!(cc.state(), State::SlowStart);
        assert_cwnd_near(cc.cwnd(), 100.0);

        for i in 1..=10 {
            cc.on_new_ack();
            assert_cwnd_near(cc.cwnd(), 100.0 * (i + 1) as f64);
        }

        assert_eq!(cc.state(), State::SlowStart);
    }

    #[test]
    fn slow_start_hands_over_at_threshold() {
        let mss = 100;
        let mut cc = CongestionController::new(mss);

        // cwnd reaches 64 * mss after 63 acks
        for _ in 0..62 {
            cc.on_new_ack();
            assert_eq!(cc.state(), State::SlowStart);
        }

        cc.on_new_ack();
        assert_eq!(cc.state(), State::CongestionAvoidance);
        assert_cwnd_near(cc.cwnd(), 6400.0);
    }

    #[test]
    fn congestion_avoidance_is_additive() {
        let mss = 100;
        let mut cc = CongestionController::new(mss);

        cc.enter_fast_recovery();
        cc.on_new_ack();
        assert_eq!(cc.state(), State::CongestionAvoidance);

        let mut expected = cc.cwnd() as f64;

        for _ in 0..30 {
            cc.on_new_ack();
            expected += 100.0 * 100.0 / expected;
            assert_cwnd_near(cc.cwnd(), expected);
        }
    }

    #[test]
    fn fast_recovery_halves_then_inflates() {
        let mss = 100;
        let mut cc = CongestionController::new(mss);

        for _ in 0..9 {
            cc.on_new_ack();
        }
        assert_cwnd_near(cc.cwnd(), 1000.0);

        cc.enter_fast_recovery();
        assert_eq!(cc.state(), State::FastRecovery);
        assert_cwnd_near(cc.cwnd(), 500.0 + 300.0);

        // Each further duplicate inflates by one MSS
        cc.on_duplicate_ack();
        cc.on_duplicate_ack();
        assert_cwnd_near(cc.cwnd(), 1000.0);

        // First new ack exits with cwnd = ssthresh
        cc.on_new_ack();
        assert_eq!(cc.state(), State::CongestionAvoidance);
        assert_cwnd_near(cc.cwnd(), 500.0);
    }

    #[test]
    fn duplicate_acks_outside_fast_recovery_are_inert() {
        let mut cc = CongestionController::new(100);

        cc.on_duplicate_ack();
        cc.on_duplicate_ack();
        assert_cwnd_near(cc.cwnd(), 100.0);
        assert_eq!(cc.state(), State::SlowStart);
    }

    #[test]
    fn timeout_resets_from_every_state() {
        let mss = 100;

        // From slow start
        let mut cc = CongestionController::new(mss);
        for _ in 0..9 {
            cc.on_new_ack();
        }
        cc.on_timeout();
        assert_eq!(cc.state(), State::SlowStart);
        assert_cwnd_near(cc.cwnd(), 100.0);

        // ssthresh was halved: slow start now hands over at 5 * mss
        for _ in 0..3 {
            cc.on_new_ack();
            assert_eq!(cc.state(), State::SlowStart);
        }
        cc.on_new_ack();
        assert_eq!(cc.state(), State::CongestionAvoidance);
        assert_cwnd_near(cc.cwnd(), 500.0);

        // From fast recovery
        let mut cc = CongestionController::new(mss);
        for _ in 0..9 {
            cc.on_new_ack();
        }
        cc.enter_fast_recovery();
        cc.on_timeout();
        assert_eq!(cc.state(), State::SlowStart);
        assert_cwnd_near(cc.cwnd(), 100.0);

        // Repeated timeouts keep firing, and cwnd never drops below one MSS
        cc.on_timeout();
        cc.on_timeout();
        assert_cwnd_near(cc.cwnd(), 100.0);
    }

    #[test]
    fn effective_window_clamps_to_minimum() {
        let mut cc = CongestionController::new(100);

        // cwnd = 1 MSS: congestion-limited
        assert_eq!(cc.window_segments(4), 1);

        for _ in 0..9 {
            cc.on_new_ack();
        }

        // cwnd = 10 MSS: fixed-cap-limited
        assert_eq!(cc.window_segments(4), 4);
        assert_eq!(cc.window_segments(16), 10);
    }
}
