//! Bringing up the listening socket.
//!
//! On a freshly booted board the network interface often is not ready when
//! the daemon starts, so the first binds can fail. Each candidate address is
//! retried until its deadline passes; when every candidate is exhausted the
//! daemon falls back to loopback rather than exiting, so a local client can
//! still reach it.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::thread;
use std::time::{Duration, Instant};

/// How long one candidate address is retried before moving on.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Port used when no candidate addresses were given at all.
pub const DEFAULT_PORT: u16 = 8000;

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Binds the first workable candidate, falling back to loopback.
///
/// Candidates are tried in order; a candidate that keeps failing is dropped
/// after `attempt_timeout`. Only when none of them bind does the loopback
/// fallback kick in, on the first candidate's port.
pub fn wait_for_network(
    candidates: &[SocketAddr],
    attempt_timeout: Duration,
) -> io::Result<TcpListener> {
    for addr in candidates {
        log::info!("Trying to bind {}", addr);
        let deadline = Instant::now() + attempt_timeout;
        loop {
            match TcpListener::bind(addr) {
                Ok(listener) => {
                    log::info!("Bound {}", listener.local_addr()?);
                    return Ok(listener);
                }
                Err(err) => {
                    if Instant::now() >= deadline {
                        log::warn!("Giving up on {}: {}", addr, err);
                        break;
                    }
                    log::debug!("bind {} failed ({}), retrying", addr, err);
                    thread::sleep(RETRY_DELAY);
                }
            }
        }
    }

    let port = candidates.first().map(|a| a.port()).unwrap_or(DEFAULT_PORT);
    let fallback = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    log::warn!(
        "No listen address came up, falling back to loopback {}",
        fallback
    );
    TcpListener::bind(fallback)
}
