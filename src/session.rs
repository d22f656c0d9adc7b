//! Single-slot command mailbox and dispatch.
//!
//! A session carries at most one unclaimed command. Submitting replaces
//! (and drops) any prior unclaimed command; consuming takes the command,
//! dispatches it by keyword prefix, and writes the result to the caller's
//! sink. There is no queueing and no cancellation: last writer wins, and
//! every consume either dispatches exactly one command or reports that
//! nothing was pending.

use spin::Mutex as SpinMutex;

use crate::error::{Error, Result};
use crate::sink::ByteSink;
use crate::Kdebug;

/// One command channel endpoint, bound to a facility.
///
/// Dropping a session discards any still-unclaimed command.
pub struct Session<'a> {
    facility: &'a Kdebug,
    /// Pointer-swap critical section only; submit and consume never sleep
    /// while holding this.
    slot: SpinMutex<Option<String>>,
}

impl<'a> Session<'a> {
    pub(crate) fn new(facility: &'a Kdebug) -> Self {
        Self {
            facility,
            slot: SpinMutex::new(None),
        }
    }

    /// Store `command` as the session's pending command, replacing any
    /// prior unclaimed one. Empty commands are invalid.
    pub fn submit(&self, command: &str) -> Result<()> {
        if command.is_empty() {
            return Err(Error::InvalidArgument);
        }
        let mut slot = self.slot.lock();
        *slot = Some(command.to_owned());
        Ok(())
    }

    /// Take and dispatch the pending command, writing any payload to
    /// `dest`. Returns the number of payload bytes, zero for commands with
    /// no payload.
    ///
    /// The taken command is consumed regardless of outcome; a failed
    /// dispatch does not leave it pending.
    pub fn consume<S: ByteSink + ?Sized>(&self, dest: &mut S) -> Result<usize> {
        let command = self.slot.lock().take().ok_or(Error::NotFound)?;
        if dest.capacity() == 0 {
            return Err(Error::InvalidArgument);
        }

        if command == "printf_dump" {
            self.facility.log_ring().drain_into(dest)
        } else if command.starts_with("trace_change") {
            self.facility.traces().apply_command(&command).map(|()| 0)
        } else if command.starts_with("profile_dump") {
            self.facility.profiles().dump_command(&command, dest)
        } else {
            Err(Error::NotImplemented)
        }
    }
}
