/*

Tamarack transfers one file per session over plain UDP datagrams, reliably.

# Session shape

A session is asymmetric: the client requests, the server streams. The client
opens a session by sending a bare request token ("GET") and retries it until
the first response arrives — there is no separate handshake ACK, so the first
response is already the first data segment. The server slices the file into
MSS-sized segments numbered densely from 1 and streams them inside a sliding
window; the client acknowledges cumulatively with the next sequence number it
expects. After the last data segment is acknowledged, the server sends a
terminal segment (reserved payload, sequence one past the last data segment)
and retries it a bounded number of times until the final ACK arrives.

# Sliding window

The sender tracks LAF (last acknowledged frame) and LFS (last frame sent);
the in-flight set is exactly (LAF, LFS]. Each in-flight segment records its
own send timestamp, and overdue segments are retransmitted individually —
multiple segments can be in flight at different ages, so there is no single
global retransmission timer. The receive side of the socket blocks with a
bounded timeout which doubles as the retransmission tick.

# Acknowledgment and recovery

ACK values are cumulative. A repeated ACK value signals a hole at that
sequence number; the third occurrence of the same value triggers an immediate
retransmission of the missing segment (fast retransmit), without waiting for
its timeout. The retransmission timeout itself derives from an EWMA RTT
estimator (alpha 1/8, beta 1/4, RTO = srtt + 4*dev, floored); samples are
never taken from retransmitted segments, since their ACKs are ambiguous.

# Congestion control

An optional TCP-Reno-like controller bounds the window in addition to the
fixed segment cap; the effective window is the minimum of the two. Slow start
grows the window by one MSS per acknowledged segment, congestion avoidance by
MSS*MSS/cwnd, and three duplicate ACKs enter fast recovery (ssthresh =
cwnd/2, cwnd = ssthresh + 3 MSS, inflating by one MSS per further duplicate).
A retransmission timeout is the punitive path: cwnd collapses to one MSS,
ssthresh halves, and the controller restarts in slow start — on every
timeout event, not only the first.

# Receive path

The client writes in-order payloads straight through and buffers segments
that arrive ahead of the expected cursor, draining them as the cursor
catches up. Duplicates and stale segments are dropped and re-acknowledged;
nothing below the cursor is ever written twice. Undecodable datagrams are
indistinguishable from drops and are ignored outright.

*/

pub mod client;
mod frame;
pub mod netsim;
mod rtt;
pub mod server;
mod session;
mod socket;

pub use client::Client;
pub use server::Server;
pub use session::Config as SessionConfig;

/// Terminal failure of a transfer session.
#[derive(Debug)]
pub enum TransferError {
    /// The underlying socket or file I/O failed.
    Io(std::io::Error),
    /// The peer stopped responding past the bounded retry count.
    Timeout,
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferError::Io(err) => write!(f, "i/o error: {}", err),
            TransferError::Timeout => write!(f, "peer unresponsive, transfer incomplete"),
        }
    }
}

impl std::error::Error for TransferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransferError::Io(err) => Some(err),
            TransferError::Timeout => None,
        }
    }
}

impl From<std::io::Error> for TransferError {
    fn from(err: std::io::Error) -> Self {
        TransferError::Io(err)
    }
}
