//! In-process debug instrumentation facility.
//!
//! Three capabilities behind one service object, for arbitrarily many
//! concurrent callers:
//!
//! - a bounded in-core **log ring** for diagnostic text ([`klog!`],
//!   [`Kdebug::log`]);
//! - a registry of named **trace flags**, toggled at runtime by textual
//!   command and read lock-free on instrumented paths;
//! - a registry of named **profiling counters**, updated on a hot
//!   enter/exit pair and read via atomic snapshot-and-reset.
//!
//! All three are also reachable through a multiplexed textual command
//! channel ([`Session`]): write a command, then read the result.
//!
//! # Design principles
//!
//! 1. **Two lock disciplines**: hot paths (log append, sample recording,
//!    the command slot) take short spin-held critical sections and never
//!    sleep; registry mutation and bulk transfer use ordinary blocking
//!    mutexes and may wait.
//! 2. **Exactly-once statistics**: a profile dump copies live stats to a
//!    shadow array and resets them in one critical section, so every sample
//!    lands in exactly one snapshot.
//! 3. **No hidden globals**: the facility is an explicit object, constructed
//!    at system start and passed by reference to every operation.
//!
//! # Command grammar
//!
//! | command | tokens | result |
//! |---|---|---|
//! | `printf_dump` | 1 | full log ring contents, exactly capacity bytes |
//! | `trace_change <name> <version> <flag> <on\|off>` | 5 | empty |
//! | `profile_dump <name> <version>` | 3 | `flag_count * 32` bytes of stats |
//!
//! ```
//! use kdebug::{Kdebug, klog};
//!
//! let kdbg = Kdebug::new();
//! let flags = kdbg.trace_create("gfs", "1.0", 16)?;
//! let prof = kdbg.profile_create("gfs", "1.0", 4)?;
//!
//! let start = kdbg.profile_enter();
//! if flags.is_set(3) {
//!     klog!(kdbg, "slow path taken\n");
//! }
//! kdbg.profile_exit(&prof, 3, start);
//!
//! let session = kdbg.open_session();
//! session.submit("trace_change gfs 1.0 3 on")?;
//! let mut none = [0u8; 1];
//! session.consume(&mut none[..])?;
//! assert!(flags.is_set(3));
//! # Ok::<(), kdebug::Error>(())
//! ```

mod clock;
mod error;
mod log_ring;
mod macros;
mod profile;
mod session;
mod sink;
mod trace;
mod words;

use core::fmt;
use std::io;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::{Error, Result};
pub use log_ring::{DEFAULT_LOG_CAPACITY, MSG_WIDTH};
pub use profile::{ProfileHandle, ProfileStat, STAT_WIRE_SIZE};
pub use session::Session;
pub use sink::ByteSink;
pub use trace::{TraceFlags, TraceHandle};

use log_ring::LogRing;
use profile::ProfileRegistry;
use trace::TraceRegistry;

/// Construction-time tunables.
pub struct Config {
    /// Log ring capacity in bytes. Clamped up to [`MSG_WIDTH`].
    pub log_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// The instrumentation facility: log ring, trace registry, profile
/// registry, and the clock feeding the profiling hot path.
pub struct Kdebug {
    log_ring: LogRing,
    traces: TraceRegistry,
    profiles: ProfileRegistry,
    clock: Box<dyn Clock>,
}

impl Kdebug {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_clock(config, Box::new(MonotonicClock::new()))
    }

    /// Construct with a caller-supplied timestamp source.
    pub fn with_clock(config: Config, clock: Box<dyn Clock>) -> Self {
        Self {
            log_ring: LogRing::new(config.log_capacity),
            traces: TraceRegistry::new(),
            profiles: ProfileRegistry::new(),
            clock,
        }
    }

    /// The log ring capacity; a `printf_dump` destination needs exactly
    /// this many bytes.
    pub fn log_capacity(&self) -> usize {
        self.log_ring.capacity()
    }

    /// Append formatted text to the log ring. Never blocks; messages longer
    /// than [`MSG_WIDTH`] bytes are truncated. Returns bytes written.
    pub fn log(&self, args: fmt::Arguments<'_>) -> usize {
        self.log_ring.append(args)
    }

    /// Write the log ring contents to `out` chronologically without
    /// consuming them.
    pub fn dump_log_to_console(&self, out: &mut dyn io::Write) -> io::Result<()> {
        self.log_ring.dump_to_console(out)
    }

    /// Register a named array of `flag_count` trace flags, all off.
    pub fn trace_create(&self, name: &str, version: &str, flag_count: usize) -> Result<TraceHandle> {
        self.traces.create(name, version, flag_count)
    }

    /// Unregister a trace flag array by handle identity.
    pub fn trace_destroy(&self, handle: &TraceHandle) {
        self.traces.destroy(handle);
    }

    /// Register a named array of `flag_count` profiling stats.
    pub fn profile_create(
        &self,
        name: &str,
        version: &str,
        flag_count: usize,
    ) -> Result<ProfileHandle> {
        self.profiles.create(name, version, flag_count)
    }

    /// Unregister a profiling stat array by handle identity.
    pub fn profile_destroy(&self, handle: &ProfileHandle) {
        self.profiles.destroy(handle);
    }

    /// Timestamp the start of an instrumented call. No registry effect.
    #[inline]
    pub fn profile_enter(&self) -> u64 {
        self.clock.now_micros()
    }

    /// Credit the elapsed time since `start` to `flag`. Elapsed time is
    /// clamped to zero if the clock moved backward. Never blocks.
    #[inline]
    pub fn profile_exit(&self, handle: &ProfileHandle, flag: usize, start: u64) {
        let elapsed = self.clock.now_micros().saturating_sub(start);
        handle.record(flag, elapsed);
    }

    /// Open a command channel endpoint bound to this facility.
    pub fn open_session(&self) -> Session<'_> {
        Session::new(self)
    }

    pub(crate) fn log_ring(&self) -> &LogRing {
        &self.log_ring
    }

    pub(crate) fn traces(&self) -> &TraceRegistry {
        &self.traces
    }

    pub(crate) fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }
}

impl Default for Kdebug {
    fn default() -> Self {
        Self::new()
    }
}
