use std::collections::{BTreeMap, HashMap};
use std::io::Read;

//   laf     lfs
//   v       v
// --#########________> sequence numbers
//
// #: in flight, unacknowledged
// _: not yet read from the source
//
// The in-flight table holds exactly (laf, lfs]; sequence numbers start at 1
// so both watermarks begin at 0.

pub struct InFlight {
    pub payload: Box<[u8]>,
    pub sent_at_ms: u64,
    pub retransmitted: bool,
}

/// Outcome of feeding one cumulative ACK to the window.
#[derive(Debug, PartialEq, Eq)]
pub enum AckSignal {
    /// LAF advanced. `rtt_sample_ms` is present iff the newest acknowledged
    /// segment was never retransmitted (Karn's rule).
    Advanced {
        newly_acked: u32,
        rtt_sample_ms: Option<u64>,
    },
    /// The value repeats the current LAF. `count` is the total number of
    /// times this value has been seen; `refers_in_flight` is true while the
    /// segment it names is still outstanding.
    Duplicate { count: u32, refers_in_flight: bool },
    /// Stale, zero, or referencing a sequence never sent.
    Ignored,
}

pub struct SendWindow {
    laf: u32,
    lfs: u32,
    in_flight: BTreeMap<u32, InFlight>,
    ack_counts: HashMap<u32, u32>,
    all_data_read: bool,
    mss: usize,
}

impl SendWindow {
    pub fn new(mss: usize) -> Self {
        assert!(mss > 0);

        Self {
            laf: 0,
            lfs: 0,
            in_flight: BTreeMap::new(),
            ack_counts: HashMap::new(),
            all_data_read: false,
            mss,
        }
    }

    pub fn laf(&self) -> u32 {
        self.laf
    }

    pub fn lfs(&self) -> u32 {
        self.lfs
    }

    pub fn in_flight_count(&self) -> u32 {
        self.lfs - self.laf
    }

    pub fn all_data_read(&self) -> bool {
        self.all_data_read
    }

    /// True once every data segment has been read and acknowledged.
    pub fn is_drained(&self) -> bool {
        self.all_data_read && self.laf == self.lfs
    }

    /// Sequence number of the terminal segment, one past the last data
    /// segment. Meaningful once the source is exhausted.
    pub fn terminal_seq(&self) -> u32 {
        debug_assert!(self.all_data_read);

        self.lfs + 1
    }

    pub fn payload(&self, seq: u32) -> Option<&[u8]> {
        self.in_flight.get(&seq).map(|entry| &*entry.payload)
    }

    /// Reads fresh MSS-sized segments from the source while the in-flight
    /// count stays below `limit`, assigning sequence numbers `lfs+1..`.
    /// Returns the fresh sequence numbers for immediate transmission; the
    /// source is exhausted once a read returns no bytes.
    pub fn fill(
        &mut self,
        source: &mut impl Read,
        limit: u32,
        now_ms: u64,
    ) -> std::io::Result<Vec<u32>> {
        let mut fresh = Vec::new();

        while self.in_flight_count() < limit && !self.all_data_read {
            let chunk = read_chunk(source, self.mss)?;

            if chunk.is_empty() {
                self.all_data_read = true;
                break;
            }

            self.lfs += 1;
            self.in_flight.insert(
                self.lfs,
                InFlight {
                    payload: chunk.into_boxed_slice(),
                    sent_at_ms: now_ms,
                    retransmitted: false,
                },
            );
            fresh.push(self.lfs);
        }

        Ok(fresh)
    }

    /// Per-segment overdue check against recorded send timestamps. Returned
    /// segments are restamped and marked retransmitted; the caller puts them
    /// back on the wire.
    pub fn due_for_retransmit(&mut self, now_ms: u64, timeout_ms: u64) -> Vec<u32> {
        let mut due = Vec::new();

        for (&seq, entry) in self.in_flight.iter_mut() {
            if now_ms.saturating_sub(entry.sent_at_ms) >= timeout_ms {
                entry.retransmitted = true;
                entry.sent_at_ms = now_ms;
                due.push(seq);
            }
        }

        due
    }

    /// Earliest send timestamp among in-flight segments; the driver derives
    /// its blocking-wait bound from this.
    pub fn oldest_sent_at_ms(&self) -> Option<u64> {
        self.in_flight.values().map(|entry| entry.sent_at_ms).min()
    }

    /// Marks a single segment retransmitted (fast-retransmit path).
    /// Returns false if the segment is no longer in flight.
    pub fn mark_retransmitted(&mut self, seq: u32, now_ms: u64) -> bool {
        if let Some(entry) = self.in_flight.get_mut(&seq) {
            entry.retransmitted = true;
            entry.sent_at_ms = now_ms;
            true
        } else {
            false
        }
    }

    pub fn on_ack(&mut self, ack_value: u32, now_ms: u64) -> AckSignal {
        if ack_value == 0 {
            return AckSignal::Ignored;
        }

        // The ACK names the next expected sequence; everything below it is
        // confirmed.
        let newest = ack_value - 1;

        if newest > self.lfs {
            // References a sequence never sent; protects against spoofed or
            // garbled ACKs and cross-session leakage
            return AckSignal::Ignored;
        }

        if newest > self.laf {
            // Every accepted occurrence of a value is counted, so a later
            // repeat of this same value starts from the occurrence seen here
            *self.ack_counts.entry(ack_value).or_insert(0) += 1;

            let rtt_sample_ms = self.in_flight.get(&newest).and_then(|entry| {
                (!entry.retransmitted).then(|| now_ms.saturating_sub(entry.sent_at_ms))
            });

            let newly_acked = newest - self.laf;

            self.in_flight = self.in_flight.split_off(&(newest + 1));
            self.laf = newest;
            self.ack_counts.retain(|&value, _| value > newest);

            return AckSignal::Advanced {
                newly_acked,
                rtt_sample_ms,
            };
        }

        if ack_value == self.laf + 1 {
            let count = {
                let count = self.ack_counts.entry(ack_value).or_insert(0);
                *count += 1;
                *count
            };

            return AckSignal::Duplicate {
                count,
                refers_in_flight: self.in_flight.contains_key(&ack_value),
            };
        }

        // Below the current watermark; already confirmed
        AckSignal::Ignored
    }

    /// Clears the duplicate-ACK bookkeeping. Invoked on every
    /// retransmission-timeout event alongside the congestion reset.
    pub fn clear_ack_counts(&mut self) {
        self.ack_counts.clear();
    }

    #[cfg(test)]
    fn assert_invariant(&self) {
        assert!(self.laf <= self.lfs);
        assert_eq!(self.in_flight.len() as u32, self.lfs - self.laf);
        assert_eq!(
            self.in_flight.keys().copied().collect::<Vec<_>>(),
            (self.laf + 1..=self.lfs).collect::<Vec<_>>()
        );
    }
}

fn read_chunk(source: &mut impl Read, mss: usize) -> std::io::Result<Vec<u8>> {
    let mut chunk = vec![0u8; mss];
    let mut filled = 0;

    while filled < mss {
        match source.read(&mut chunk[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    chunk.truncate(filled);
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled_window(data: &[u8], mss: usize, limit: u32) -> (SendWindow, Vec<u32>) {
        let mut window = SendWindow::new(mss);
        let fresh = window.fill(&mut &data[..], limit, 0).unwrap();
        window.assert_invariant();
        (window, fresh)
    }

    #[test]
    fn fill_respects_window_limit() {
        let (window, fresh) = filled_window(&[7u8; 10], 1, 4);

        assert_eq!(fresh, vec![1, 2, 3, 4]);
        assert_eq!(window.laf(), 0);
        assert_eq!(window.lfs(), 4);
        assert!(!window.all_data_read());
    }

    #[test]
    fn fill_marks_source_exhaustion() {
        // 3 bytes at mss 2: one full chunk, one partial, then EOF
        let (mut window, fresh) = filled_window(&[1, 2, 3], 2, 8);

        assert_eq!(fresh, vec![1, 2]);
        assert!(window.all_data_read());
        assert_eq!(window.payload(1), Some(&[1u8, 2][..]));
        assert_eq!(window.payload(2), Some(&[3u8][..]));
        assert_eq!(window.terminal_seq(), 3);

        assert_eq!(
            window.on_ack(3, 10),
            AckSignal::Advanced {
                newly_acked: 2,
                rtt_sample_ms: Some(10),
            }
        );
        assert!(window.is_drained());
    }

    #[test]
    fn cumulative_ack_advances_and_purges() {
        let (mut window, _) = filled_window(&[7u8; 10], 1, 4);

        assert_eq!(
            window.on_ack(3, 50),
            AckSignal::Advanced {
                newly_acked: 2,
                rtt_sample_ms: Some(50),
            }
        );
        window.assert_invariant();
        assert_eq!(window.laf(), 2);
        assert_eq!(window.lfs(), 4);
        assert_eq!(window.payload(2), None);
        assert_eq!(window.payload(3), Some(&[7u8][..]));

        // Window reopened; fill resumes at lfs+1
        let fresh = window.fill(&mut &[7u8; 2][..], 4, 60).unwrap();
        assert_eq!(fresh, vec![5, 6]);
        window.assert_invariant();
    }

    #[test]
    fn unsent_zero_and_stale_acks_ignored() {
        let (mut window, _) = filled_window(&[7u8; 10], 1, 4);

        assert_eq!(window.on_ack(0, 0), AckSignal::Ignored);
        assert_eq!(window.on_ack(6, 0), AckSignal::Ignored);

        window.on_ack(4, 0);
        assert_eq!(window.laf(), 3);

        // Anything at or below the watermark is already confirmed
        assert_eq!(window.on_ack(2, 0), AckSignal::Ignored);
        window.assert_invariant();
    }

    #[test]
    fn duplicate_acks_count_total_occurrences() {
        let (mut window, _) = filled_window(&[7u8; 10], 1, 4);

        // The advancing occurrence is counted too, so two repeats reach 3
        window.on_ack(2, 0);
        assert_eq!(
            window.on_ack(2, 0),
            AckSignal::Duplicate {
                count: 2,
                refers_in_flight: true,
            }
        );
        assert_eq!(
            window.on_ack(2, 0),
            AckSignal::Duplicate {
                count: 3,
                refers_in_flight: true,
            }
        );
        assert_eq!(
            window.on_ack(2, 0),
            AckSignal::Duplicate {
                count: 4,
                refers_in_flight: true,
            }
        );

        // Advancing past the value resets its bookkeeping
        window.on_ack(4, 0);
        assert_eq!(
            window.on_ack(4, 0),
            AckSignal::Duplicate {
                count: 2,
                refers_in_flight: true,
            }
        );
    }

    #[test]
    fn rtt_sample_skips_retransmitted_segments() {
        let (mut window, _) = filled_window(&[7u8; 10], 1, 4);

        assert!(window.mark_retransmitted(2, 100));

        // Newest acknowledged segment (2) was retransmitted: no sample
        assert_eq!(
            window.on_ack(3, 150),
            AckSignal::Advanced {
                newly_acked: 2,
                rtt_sample_ms: None,
            }
        );

        // Segment 3 was never retransmitted: sample resumes
        assert_eq!(
            window.on_ack(4, 200),
            AckSignal::Advanced {
                newly_acked: 1,
                rtt_sample_ms: Some(200),
            }
        );
    }

    #[test]
    fn mark_retransmitted_requires_in_flight() {
        let (mut window, _) = filled_window(&[7u8; 10], 1, 4);

        window.on_ack(3, 0);
        assert!(!window.mark_retransmitted(1, 0));
        assert!(window.mark_retransmitted(3, 0));
    }

    #[test]
    fn overdue_segments_age_individually() {
        let mut window = SendWindow::new(1);
        let mut source = &[7u8; 10][..];

        assert_eq!(window.fill(&mut source, 2, 0).unwrap(), vec![1, 2]);
        assert_eq!(window.fill(&mut source, 4, 600).unwrap(), vec![3, 4]);

        assert_eq!(window.due_for_retransmit(500, 1000), Vec::<u32>::new());
        assert_eq!(window.due_for_retransmit(1100, 1000), vec![1, 2]);

        // Restamped at 1100; the younger pair follows at its own deadline
        assert_eq!(window.due_for_retransmit(1700, 1000), vec![3, 4]);
        assert_eq!(window.due_for_retransmit(2200, 1000), vec![1, 2]);
    }
}
