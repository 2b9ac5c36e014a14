use std::net;
use std::sync::Arc;
use std::time;

const SOCKET_POLLING_KEY: usize = 0;

// Both halves share one non-blocking UDP socket; the rx half owns the poller
// so receive calls can block with a bounded timeout. That bounded wait is the
// protocol's retransmission tick — there is no separate timer thread.

pub struct SocketTx {
    socket: Arc<net::UdpSocket>,
}

pub struct SocketRx {
    socket: Arc<net::UdpSocket>,
    // Cached from socket initialization
    local_addr: net::SocketAddr,
    // Polling objects
    poller: polling::Poller,
    poller_events: polling::Events,
    // Always-allocated receive buffer
    recv_buffer: Box<[u8]>,
}

impl SocketTx {
    /// Best-effort datagram send; the protocol treats a failed send exactly
    /// like a lost datagram.
    pub fn send(&self, frame: &[u8], addr: &net::SocketAddr) {
        let _ = self.socket.send_to(frame, addr);
    }
}

impl SocketRx {
    fn recv_len(&mut self) -> std::io::Result<Option<(usize, net::SocketAddr)>> {
        match self.socket.recv_from(&mut self.recv_buffer) {
            Ok((frame_len, sender_addr)) => Ok(Some((frame_len, sender_addr))),
            Err(err) => match err.kind() {
                // The only acceptable error is WouldBlock, indicating no packet
                std::io::ErrorKind::WouldBlock => Ok(None),
                _ => Err(err),
            },
        }
    }

    /// If a datagram can be read from the socket without blocking, returns
    /// it with its sender address. Returns Ok(None) otherwise.
    pub fn try_read_frame(&mut self) -> std::io::Result<Option<(&[u8], net::SocketAddr)>> {
        match self.recv_len()? {
            Some((frame_len, sender_addr)) => {
                Ok(Some((&self.recv_buffer[..frame_len], sender_addr)))
            }
            None => Ok(None),
        }
    }

    /// Blocks for up to `timeout` for an incoming datagram and returns it
    /// with its sender address; `None` blocks indefinitely. Returns Ok(None)
    /// if nothing arrived in the allotted time, or if polling awoke
    /// spuriously.
    pub fn wait_for_frame(
        &mut self,
        timeout: Option<time::Duration>,
    ) -> std::io::Result<Option<(&[u8], net::SocketAddr)>> {
        // A datagram may already be queued; the poller only reports edges on
        // a readable socket, so drain before waiting
        let mut received = self.recv_len()?;

        if received.is_none() {
            // Wait for a readable event (must be re-armed prior to each wait)
            self.poller
                .modify(&*self.socket, polling::Event::readable(SOCKET_POLLING_KEY))?;

            self.poller_events.clear();

            let n = self.poller.wait(&mut self.poller_events, timeout)?;

            if n > 0 {
                received = self.recv_len()?;
            }
        }

        match received {
            Some((frame_len, sender_addr)) => {
                Ok(Some((&self.recv_buffer[..frame_len], sender_addr)))
            }
            None => Ok(None),
        }
    }

    pub fn local_addr(&self) -> net::SocketAddr {
        self.local_addr
    }
}

pub fn new<A>(bind_address: A, frame_size_max: usize) -> std::io::Result<(SocketTx, SocketRx)>
where
    A: net::ToSocketAddrs,
{
    let socket = net::UdpSocket::bind(bind_address)?;
    socket.set_nonblocking(true)?;

    let local_addr = socket.local_addr()?;

    let poller = polling::Poller::new()?;

    unsafe {
        poller.add(&socket, polling::Event::readable(SOCKET_POLLING_KEY))?;
    }

    let socket_rc = Arc::new(socket);

    let tx = SocketTx {
        socket: Arc::clone(&socket_rc),
    };

    let rx = SocketRx {
        socket: socket_rc,
        local_addr,
        poller,
        poller_events: polling::Events::new(),
        recv_buffer: vec![0; frame_size_max].into_boxed_slice(),
    };

    Ok((tx, rx))
}
