//! Busy-polling event loop.
//!
//! Each cycle makes at most one admission attempt, then gives every live
//! connection exactly one non-blocking read or write. The loop never waits
//! for readiness: would-block simply means the connection is revisited on
//! the next cycle. This spins a core when idle; that is the trade for
//! having no readiness facility at all.

use crate::runtime::{set_nonblocking, ConnState, Connection, ConnectionTable};
use std::io::{self, Read, Write};
use std::net::TcpListener;
use tracing::{debug, warn};

/// Outcome of one state-machine step for one connection.
enum Step {
    /// Connection stays live; revisit next cycle.
    Keep,
    /// Connection is done for, tear it down.
    Close,
}

/// Drive the echo server forever.
///
/// Never returns in normal operation. Nothing that happens to an individual
/// connection propagates out of the loop; only the unreachable clean return
/// carries a value.
pub fn serve(listener: TcpListener, max_clients: usize, buffer_size: usize) -> io::Result<()> {
    let mut table = ConnectionTable::new(max_clients);

    loop {
        cycle(&listener, &mut table, buffer_size);
    }
}

/// One scheduler cycle over the whole table.
fn cycle(listener: &TcpListener, table: &mut ConnectionTable, buffer_size: usize) {
    if table.has_capacity() {
        try_accept(listener, table, buffer_size);
    }

    let mut i = 0;
    while i < table.len() {
        match step(table.get_mut(i)) {
            Step::Keep => i += 1,
            Step::Close => {
                // The last entry moves into slot i; re-examine it before
                // advancing so it is not skipped this cycle.
                table.swap_remove(i);
                debug!(idx = i, live = table.len(), "Connection closed");
            }
        }
    }
}

/// Attempt to admit one connection.
///
/// No pending connection is a normal no-op. A socket that cannot be made
/// non-blocking is dropped before it ever enters the table; admission
/// failures never reach the caller.
fn try_accept(listener: &TcpListener, table: &mut ConnectionTable, buffer_size: usize) {
    match listener.accept() {
        Ok((stream, peer_addr)) => {
            if let Err(e) = set_nonblocking(&stream) {
                warn!(peer = %peer_addr, error = %e, "Dropping connection, set_nonblocking failed");
                return;
            }

            let admitted = table.insert(Connection::new(stream, buffer_size));
            debug_assert!(admitted, "admission attempted without spare capacity");
            debug!(peer = %peer_addr, live = table.len(), "Accepted connection");
        }
        Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {}
        Err(e) => {
            warn!(error = %e, "Accept error");
        }
    }
}

/// Perform exactly one I/O attempt appropriate to the connection's state.
///
/// Reading: a successful read of `n > 0` bytes flips the connection into
/// `Writing` for those `n` bytes; a read of 0 means the peer closed and the
/// connection is torn down. Writing: flushed bytes advance the cursor until
/// the pending range drains and the state collapses back to `Reading`, so a
/// connection never reads ahead of an unfinished echo. In either state,
/// would-block leaves the state untouched and any other error closes the
/// connection.
fn step(conn: &mut Connection) -> Step {
    match conn.state {
        ConnState::Reading => match conn.stream.read(&mut conn.buffer) {
            Ok(0) => Step::Close,
            Ok(n) => {
                conn.start_writing(n);
                Step::Keep
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Step::Keep,
            Err(e) => {
                debug!(error = %e, "Read failed");
                Step::Close
            }
        },
        ConnState::Writing { written, total } => {
            match conn.stream.write(&conn.buffer[written..total]) {
                Ok(n) => {
                    conn.advance(n);
                    Step::Keep
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => Step::Keep,
                Err(e) => {
                    debug!(error = %e, "Write failed");
                    Step::Close
                }
            }
        }
    }
}
