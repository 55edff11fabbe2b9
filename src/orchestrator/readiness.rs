//! Readiness of the listening role.
//!
//! The connecting role may only start once the listening role accepts TCP
//! connections. [`ReadinessProbe::Tcp`] polls with a bounded timeout;
//! [`ReadinessProbe::Delay`] is the legacy fixed sleep and has to be asked
//! for explicitly.

use super::interrupt::InterruptFlag;
use super::process::ManagedChild;
use crate::error::{Error, Result};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for a single connection attempt.
const MAX_CONNECT_ATTEMPT: Duration = Duration::from_millis(500);

/// How to decide that the listening role is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessProbe {
    /// Poll `addr` until a TCP connection succeeds.
    Tcp {
        /// `host:port` to connect to.
        addr: String,
        /// Give up after this long.
        timeout: Duration,
        /// Delay between attempts.
        interval: Duration,
    },
    /// Sleep for a fixed time and assume readiness.
    Delay(Duration),
}

impl ReadinessProbe {
    /// Blocks until the process behind `listener` is ready.
    ///
    /// Fails with [`Error::ReadinessTimeout`] when the bound expires, with
    /// [`Error::Infrastructure`] if `listener` exits first, and with
    /// [`Error::Interrupted`] if `interrupt` is raised. Returns how long
    /// readiness took.
    pub fn wait(&self, listener: &mut ManagedChild, interrupt: &InterruptFlag) -> Result<Duration> {
        let started = Instant::now();
        match self {
            Self::Delay(delay) => {
                tracing::warn!(delay_ms = delay.as_millis() as u64, "using fixed readiness delay");
                let deadline = started + *delay;
                while Instant::now() < deadline {
                    interrupt.check()?;
                    ensure_alive(listener)?;
                    thread::sleep((deadline - Instant::now()).min(super::process::POLL_INTERVAL));
                }
                ensure_alive(listener)?;
                Ok(started.elapsed())
            }
            Self::Tcp {
                addr,
                timeout,
                interval,
            } => {
                let deadline = started + *timeout;
                let mut attempts = 0u32;
                loop {
                    interrupt.check()?;
                    ensure_alive(listener)?;
                    attempts += 1;
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if try_connect(addr, remaining.min(MAX_CONNECT_ATTEMPT))? {
                        let waited = started.elapsed();
                        tracing::info!(
                            %addr,
                            attempts,
                            waited_ms = waited.as_millis() as u64,
                            label = listener.label(),
                            "listening role ready"
                        );
                        return Ok(waited);
                    }
                    if Instant::now() + *interval > deadline {
                        return Err(Error::ReadinessTimeout {
                            addr: addr.clone(),
                            waited: started.elapsed(),
                        });
                    }
                    thread::sleep(*interval);
                }
            }
        }
    }
}

fn ensure_alive(listener: &mut ManagedChild) -> Result<()> {
    if let Some(status) = listener.try_wait()? {
        return Err(Error::infrastructure(format!(
            "{} exited with {status} before accepting connections",
            listener.label()
        )));
    }
    Ok(())
}

fn resolve(addr: &str) -> Result<Vec<SocketAddr>> {
    let addrs: Vec<SocketAddr> = addr
        .to_socket_addrs()
        .map_err(|e| Error::Config(format!("cannot resolve {addr}: {e}")))?
        .collect();
    if addrs.is_empty() {
        return Err(Error::Config(format!("{addr} resolves to no addresses")));
    }
    Ok(addrs)
}

fn try_connect(addr: &str, timeout: Duration) -> Result<bool> {
    let timeout = timeout.max(Duration::from_millis(1));
    for candidate in resolve(addr)? {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(_) => return Ok(true),
            Err(e) => tracing::trace!(%candidate, error = %e, "not ready"),
        }
    }
    Ok(false)
}

/// Fails with [`Error::Infrastructure`] if `addr` cannot be bound.
///
/// A busy port means a previous run leaked a listener or another service
/// owns it; either way the run would talk to the wrong peer.
pub fn ensure_port_free(addr: &str) -> Result<()> {
    for candidate in resolve(addr)? {
        match TcpListener::bind(candidate) {
            Ok(listener) => drop(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                return Err(Error::infrastructure(format!("port {candidate} already in use")));
            }
            Err(e) => {
                return Err(Error::infrastructure(format!("cannot bind {candidate}: {e}")));
            }
        }
    }
    Ok(())
}
