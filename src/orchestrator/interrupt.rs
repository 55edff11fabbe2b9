//! Termination-signal flag.
//!
//! Waiting loops poll the flag and abort with
//! [`Error::Interrupted`](crate::Error::Interrupted); unwinding then drops
//! every [`ManagedChild`](super::ManagedChild), which tears the processes
//! down.

use crate::error::{Error, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "stop now" flag, raised by SIGINT, SIGTERM or SIGHUP once
/// installed.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// Creates a flag that is only raised manually.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a flag raised by termination signals.
    #[cfg(unix)]
    pub fn install() -> Result<Self> {
        let flag = Self::new();
        for signal in [
            signal_hook::consts::SIGINT,
            signal_hook::consts::SIGTERM,
            signal_hook::consts::SIGHUP,
        ] {
            signal_hook::flag::register(signal, Arc::clone(&flag.0))
                .map_err(|e| Error::io(format!("registering handler for signal {signal}"), e))?;
        }
        Ok(flag)
    }

    /// Creates a flag raised by termination signals.
    #[cfg(not(unix))]
    pub fn install() -> Result<Self> {
        Ok(Self::new())
    }

    /// Returns `true` once a signal arrived or [`raise`](Self::raise) was called.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raises the flag.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Fails with [`Error::Interrupted`] if the flag is raised.
    pub fn check(&self) -> Result<()> {
        if self.is_raised() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}
