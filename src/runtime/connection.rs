//! Connection state machine and connection table.
//!
//! Each connection owns its socket and a fixed-size buffer and is always in
//! exactly one of two states: reading into the buffer, or draining the
//! echoed bytes back out. The table is a dense, capacity-bounded collection;
//! removal swaps with the last entry, so table order is not stable.

use std::net::TcpStream;

/// Current state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    /// Waiting for data from the peer.
    Reading,
    /// Draining echoed bytes back to the peer.
    Writing {
        /// Bytes already written back.
        written: usize,
        /// Total bytes captured by the read, i.e. the drain target.
        total: usize,
    },
}

/// A single client connection.
///
/// The socket and buffer are owned exclusively by this entry; dropping the
/// `Connection` closes the socket and releases the buffer, exactly once.
#[derive(Debug)]
pub struct Connection {
    /// Non-blocking client socket.
    pub stream: TcpStream,
    /// Fixed-capacity echo buffer. Contents are meaningful only up to the
    /// `total` of the current `Writing` state.
    pub buffer: Box<[u8]>,
    /// Current connection state.
    pub state: ConnState,
}

impl Connection {
    /// Create a new connection in initial reading state.
    pub fn new(stream: TcpStream, buffer_size: usize) -> Self {
        Self {
            stream,
            buffer: vec![0u8; buffer_size].into_boxed_slice(),
            state: ConnState::Reading,
        }
    }

    /// Transition to writing state with `total` bytes pending at offset 0.
    pub fn start_writing(&mut self, total: usize) {
        debug_assert!(total <= self.buffer.len());
        self.state = ConnState::Writing { written: 0, total };
    }

    /// Record `n` more bytes flushed.
    ///
    /// Returns true when the write fully drained, in which case the state
    /// collapses back to `Reading`. Invariant: `written <= total` always
    /// holds, and `written == total` never persists across a step.
    pub fn advance(&mut self, n: usize) -> bool {
        match self.state {
            ConnState::Writing { written, total } => {
                let written = written + n;
                debug_assert!(written <= total);
                if written == total {
                    self.state = ConnState::Reading;
                    true
                } else {
                    self.state = ConnState::Writing { written, total };
                    false
                }
            }
            ConnState::Reading => true,
        }
    }
}

/// Dense table of active connections, bounded by a fixed capacity.
///
/// Insert refuses at capacity; removal is an O(1) swap with the last entry.
/// Because removal moves the last entry into the vacated slot, any scan
/// performing removals must re-examine the removed index before advancing.
pub struct ConnectionTable {
    connections: Vec<Connection>,
    max_clients: usize,
}

impl ConnectionTable {
    /// Create a table with the given maximum capacity.
    pub fn new(max_clients: usize) -> Self {
        Self {
            connections: Vec::with_capacity(max_clients),
            max_clients,
        }
    }

    /// Insert a new connection.
    ///
    /// Returns false (dropping `conn`, which closes its socket) if the
    /// table is full.
    pub fn insert(&mut self, conn: Connection) -> bool {
        if self.connections.len() >= self.max_clients {
            return false;
        }
        self.connections.push(conn);
        true
    }

    /// Remove the connection at `idx`, closing its socket.
    ///
    /// The last entry takes its place; order is not preserved.
    pub fn swap_remove(&mut self, idx: usize) {
        drop(self.connections.swap_remove(idx));
    }

    /// Get a mutable reference to the connection at `idx`.
    pub fn get_mut(&mut self, idx: usize) -> &mut Connection {
        &mut self.connections[idx]
    }

    /// Number of active connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether another connection can be admitted.
    pub fn has_capacity(&self) -> bool {
        self.connections.len() < self.max_clients
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{TcpListener, TcpStream};

    /// A connected socket pair for table tests; peer half is returned so it
    /// stays open for the duration of the test.
    fn stream_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        (server, client)
    }

    #[test]
    fn test_connection_state_transitions() {
        let (stream, _peer) = stream_pair();
        let mut conn = Connection::new(stream, 128);

        assert_eq!(conn.state, ConnState::Reading);

        conn.start_writing(100);
        assert_eq!(
            conn.state,
            ConnState::Writing {
                written: 0,
                total: 100
            }
        );

        // Partial flush keeps the writing state.
        assert!(!conn.advance(60));
        assert_eq!(
            conn.state,
            ConnState::Writing {
                written: 60,
                total: 100
            }
        );

        // Draining the rest collapses back to reading.
        assert!(conn.advance(40));
        assert_eq!(conn.state, ConnState::Reading);
    }

    #[test]
    fn test_zero_length_write_collapses_immediately() {
        let (stream, _peer) = stream_pair();
        let mut conn = Connection::new(stream, 128);

        conn.start_writing(0);
        assert!(conn.advance(0));
        assert_eq!(conn.state, ConnState::Reading);
    }

    #[test]
    fn test_table_capacity() {
        let mut table = ConnectionTable::new(2);
        let mut peers = Vec::new();

        for _ in 0..2 {
            let (stream, peer) = stream_pair();
            peers.push(peer);
            assert!(table.insert(Connection::new(stream, 16)));
        }

        assert_eq!(table.len(), 2);
        assert!(!table.has_capacity());

        // At capacity: insert refuses and the socket is dropped.
        let (stream, peer) = stream_pair();
        peers.push(peer);
        assert!(!table.insert(Connection::new(stream, 16)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_swap_remove_moves_last_entry() {
        let mut table = ConnectionTable::new(4);
        let mut peers = Vec::new();
        let mut addrs = Vec::new();

        for _ in 0..3 {
            let (stream, peer) = stream_pair();
            addrs.push(stream.local_addr().unwrap());
            peers.push(peer);
            assert!(table.insert(Connection::new(stream, 16)));
        }

        table.swap_remove(0);
        assert_eq!(table.len(), 2);
        assert!(table.has_capacity());

        // The former last entry now occupies index 0.
        assert_eq!(table.get_mut(0).stream.local_addr().unwrap(), addrs[2]);
        assert_eq!(table.get_mut(1).stream.local_addr().unwrap(), addrs[1]);
    }
}
