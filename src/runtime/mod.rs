//! Busy-polling runtime for the echo server.
//!
//! One thread, no readiness facility: every socket is non-blocking and the
//! event loop re-attempts I/O on each cycle, treating would-block as a
//! normal return value rather than something to wait on.
//!
//! Components:
//! - `nonblock`: fcntl-based non-blocking mode setter
//! - `connection`: per-connection state machine and the connection table
//! - `event_loop`: admission plus one I/O step per connection per cycle

mod connection;
mod event_loop;
mod nonblock;

pub(crate) use connection::{ConnState, Connection, ConnectionTable};
pub(crate) use nonblock::set_nonblocking;

use crate::config::Config;
use std::io;
use std::net::{SocketAddr, TcpListener};
use tracing::info;

/// Bootstrap the listener and hand control to the event loop.
///
/// Only setup failures surface here; once `serve` takes over, nothing below
/// the loop aborts the process.
pub fn run(config: &Config) -> io::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let listener = create_listener(addr, config.max_clients)?;

    info!(addr = %listener.local_addr()?, "Listening");

    event_loop::serve(listener, config.max_clients, config.buffer_size)
}

/// Create a TCP listener with SO_REUSEADDR, bound and listening.
///
/// The connection capacity doubles as the listen backlog. The listening
/// socket is made non-blocking with the same fcntl setter used for accepted
/// connections, so accept attempts never stall the loop.
fn create_listener(addr: SocketAddr, backlog: usize) -> io::Result<TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog as i32)?;

    let listener: TcpListener = socket.into();
    set_nonblocking(&listener)?;

    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_listener_rebind() {
        // SO_REUSEADDR lets a new listener take the address as soon as the
        // old one is dropped.
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let first = create_listener(addr, 4).unwrap();
        let bound = first.local_addr().unwrap();
        drop(first);

        let second = create_listener(bound, 4).unwrap();
        assert_eq!(second.local_addr().unwrap(), bound);
    }

    #[test]
    fn test_create_listener_is_nonblocking() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let listener = create_listener(addr, 4).unwrap();

        // No pending connection: a non-blocking listener must not stall.
        match listener.accept() {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            other => panic!("expected WouldBlock, got {:?}", other.map(|_| ())),
        }
    }
}
