use std::collections::BTreeMap;

use crate::frame::EOF_MARKER;

/// Result of accepting one datagram on the receive side.
#[derive(Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Cumulative ACK to send back: the next sequence number expected.
    pub ack: u32,
    /// True once the terminal marker has been consumed in order.
    pub reached_terminal: bool,
}

// Case 0:   v              v
//           a _ c _ _ => _ _ c _ _   deliver a
//
// Case 1:   v                  v
//           _ b c _ _ => _ _ _ _ _   (b arrives) deliver b, c
//
// Case 2:   v            v
//           _ _ c _ _ => _ _ c _ _   (c again) duplicate, no effect
//
// The cursor only moves forward, so the returned ACK is non-decreasing and
// no sequence number is ever emitted twice.

pub struct ReorderBuffer {
    expected: u32,
    buffered: BTreeMap<u32, Box<[u8]>>,
    reached_terminal: bool,
}

impl ReorderBuffer {
    pub fn new(base_seq: u32) -> Self {
        Self {
            expected: base_seq,
            buffered: BTreeMap::new(),
            reached_terminal: false,
        }
    }

    pub fn next_expected(&self) -> u32 {
        self.expected
    }

    pub fn buffered_count(&self) -> usize {
        self.buffered.len()
    }

    /// Accepts one segment, invoking `emit` for every payload that becomes
    /// deliverable in order. The terminal marker is consumed at the cursor
    /// and emits nothing.
    pub fn on_segment<F>(&mut self, seq: u32, payload: &[u8], mut emit: F) -> Delivery
    where
        F: FnMut(&[u8]),
    {
        if self.reached_terminal {
            // Stream already complete; re-ack so a retransmitted terminal
            // stops the peer's retries
            return self.delivery();
        }

        if seq == self.expected {
            if payload == EOF_MARKER {
                self.finish();
            } else {
                emit(payload);
                self.expected += 1;

                // Drain buffered successors the cursor has caught up with
                while let Some(buffered_payload) = self.buffered.remove(&self.expected) {
                    if &*buffered_payload == EOF_MARKER {
                        self.finish();
                        break;
                    }

                    emit(&buffered_payload);
                    self.expected += 1;
                }
            }
        } else if seq > self.expected {
            // Ahead of the cursor: hold it. Duplicates never overwrite, so a
            // retransmission racing its original is harmless
            self.buffered.entry(seq).or_insert_with(|| payload.into());
        }
        // seq < expected: already delivered, drop; the unchanged ACK below
        // repairs a lost acknowledgment

        self.delivery()
    }

    fn finish(&mut self) {
        self.reached_terminal = true;
        self.expected += 1;
        self.buffered.clear();
    }

    fn delivery(&self) -> Delivery {
        Delivery {
            ack: self.expected,
            reached_terminal: self.reached_terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each round: (seq, payload, expected emitted bytes, expected ack).
    // Data payloads are the single byte of their sequence number.
    fn run(rounds: &[(u32, &[u8], &[u8], u32)]) {
        let mut rx = ReorderBuffer::new(1);
        let mut last_ack = 0;

        for &(seq, payload, expected_emitted, expected_ack) in rounds {
            let mut emitted = Vec::new();

            let delivery = rx.on_segment(seq, payload, |bytes| emitted.extend_from_slice(bytes));

            assert_eq!(emitted, expected_emitted, "seq {}", seq);
            assert_eq!(delivery.ack, expected_ack, "seq {}", seq);

            // Cumulative ACK monotonicity
            assert!(delivery.ack >= last_ack);
            last_ack = delivery.ack;
        }
    }

    #[test]
    fn sequential_receive() {
        run(&[
            (1, &[1], &[1], 2),
            (2, &[2], &[2], 3),
            (3, &[3], &[3], 4),
            (4, &[4], &[4], 5),
        ]);
    }

    #[test]
    fn gap_buffers_until_hole_fills() {
        run(&[
            (1, &[1], &[1], 2),
            (3, &[3], &[], 2),
            (4, &[4], &[], 2),
            (2, &[2], &[2, 3, 4], 5),
            (5, &[5], &[5], 6),
        ]);
    }

    #[test]
    fn midstream_loss_flushes_on_retransmission() {
        // Segments 1-4 delivered, 5 lost, 6-9 held; 5's retransmission
        // flushes the run with no duplicate bytes
        run(&[
            (1, &[1], &[1], 2),
            (2, &[2], &[2], 3),
            (3, &[3], &[3], 4),
            (4, &[4], &[4], 5),
            (6, &[6], &[], 5),
            (7, &[7], &[], 5),
            (8, &[8], &[], 5),
            (9, &[9], &[], 5),
            (5, &[5], &[5, 6, 7, 8, 9], 10),
        ]);
    }

    #[test]
    fn duplicates_are_dropped() {
        run(&[
            (1, &[1], &[1], 2),
            (1, &[1], &[], 2),
            (3, &[3], &[], 2),
            (3, &[3], &[], 2),
            (2, &[2], &[2, 3], 4),
            (2, &[2], &[], 4),
            (3, &[3], &[], 4),
        ]);
    }

    #[test]
    fn buffered_duplicate_keeps_first_payload() {
        let mut rx = ReorderBuffer::new(1);

        rx.on_segment(2, b"first", |_| {});
        rx.on_segment(2, b"second", |_| {});

        let mut emitted = Vec::new();
        rx.on_segment(1, &[1], |bytes| emitted.extend_from_slice(bytes));

        assert_eq!(emitted, b"\x01first");
    }

    #[test]
    fn terminal_in_order() {
        run(&[
            (1, &[1], &[1], 2),
            (2, &[2], &[2], 3),
            (3, EOF_MARKER, &[], 4),
            // Retransmitted terminal: re-ack, emit nothing
            (3, EOF_MARKER, &[], 4),
        ]);
    }

    #[test]
    fn terminal_ahead_of_cursor_waits_its_turn() {
        let mut rx = ReorderBuffer::new(1);

        let delivery = rx.on_segment(3, EOF_MARKER, |_| panic!("nothing deliverable"));
        assert_eq!(delivery.ack, 1);
        assert!(!delivery.reached_terminal);

        rx.on_segment(1, &[1], |_| {});

        let mut emitted = Vec::new();
        let delivery = rx.on_segment(2, &[2], |bytes| emitted.extend_from_slice(bytes));

        assert_eq!(emitted, vec![2]);
        assert_eq!(delivery.ack, 4);
        assert!(delivery.reached_terminal);
    }

    #[test]
    fn terminal_flag_reported_once_set() {
        let mut rx = ReorderBuffer::new(1);

        let delivery = rx.on_segment(1, EOF_MARKER, |_| panic!("terminal emits nothing"));
        assert_eq!(
            delivery,
            Delivery {
                ack: 2,
                reached_terminal: true,
            }
        );

        // Stray data after completion is stale
        let delivery = rx.on_segment(1, &[1], |_| panic!("stream is closed"));
        assert_eq!(
            delivery,
            Delivery {
                ack: 2,
                reached_terminal: true,
            }
        );
    }
}
