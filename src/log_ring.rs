//! Fixed-capacity in-core log ring for diagnostic text.
//!
//! Messages are written at a cursor that wraps before the buffer edge so a
//! single message is never torn across the boundary: when fewer than
//! [`MSG_WIDTH`] bytes remain, the tail is zero-filled and writing resumes
//! at offset zero. Zero bytes are "holes" and never part of a message.
//!
//! Two readers exist with different disciplines:
//! - a non-destructive console dump (chronological, holes skipped), safe to
//!   run while appends continue at the cost of a best-effort snapshot;
//! - a destructive drain that hands the full buffer to a [`ByteSink`] and
//!   clears it, serialized against other drains by a blocking lock.
//!
//! Appends take only a short spin-held critical section and never sleep, so
//! call sites in non-blockable contexts may log freely.

use core::fmt::{self, Write as _};
use std::io;
use std::sync::{Mutex as BlockingMutex, PoisonError};

use spin::Mutex as SpinMutex;

use crate::error::{Error, Result};
use crate::sink::ByteSink;

/// Upper bound on a single formatted message, in bytes. Longer messages are
/// truncated. The ring wraps whenever fewer than this many bytes remain, so
/// no message ever straddles the buffer edge.
pub const MSG_WIDTH: usize = 256;

/// Default ring capacity (1 MiB).
pub const DEFAULT_LOG_CAPACITY: usize = 1 << 20;

struct Inner {
    buf: Box<[u8]>,
    cursor: usize,
}

pub(crate) struct LogRing {
    inner: SpinMutex<Inner>,
    /// Serializes drains against each other. Distinct from the append lock:
    /// the sink transfer may block, appends must not.
    drain_lock: BlockingMutex<()>,
    capacity: usize,
}

/// Fixed staging buffer implementing `fmt::Write` with truncation, so
/// formatting happens outside the append critical section.
struct MsgBuf {
    buf: [u8; MSG_WIDTH],
    len: usize,
}

impl MsgBuf {
    fn new() -> Self {
        Self {
            buf: [0; MSG_WIDTH],
            len: 0,
        }
    }

    fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl fmt::Write for MsgBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let remaining = MSG_WIDTH - self.len;
        let take = s.len().min(remaining);
        self.buf[self.len..self.len + take].copy_from_slice(&s.as_bytes()[..take]);
        self.len += take;
        Ok(())
    }
}

impl LogRing {
    pub(crate) fn new(capacity: usize) -> Self {
        // A ring narrower than one message cannot honor the wraparound
        // margin; clamp up rather than fail construction.
        let capacity = capacity.max(MSG_WIDTH);
        Self {
            inner: SpinMutex::new(Inner {
                buf: vec![0u8; capacity].into_boxed_slice(),
                cursor: 0,
            }),
            drain_lock: BlockingMutex::new(()),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Format `args` into the ring at the cursor, wrapping first if fewer
    /// than `MSG_WIDTH` bytes remain. Returns the number of bytes written.
    pub(crate) fn append(&self, args: fmt::Arguments<'_>) -> usize {
        let mut staging = MsgBuf::new();
        // MsgBuf::write_str never errors; truncation is silent.
        let _ = staging.write_fmt(args);
        let msg = staging.as_bytes();

        let mut inner = self.inner.lock();
        if inner.cursor + MSG_WIDTH > self.capacity {
            let cursor = inner.cursor;
            inner.buf[cursor..].fill(0);
            inner.cursor = 0;
        }
        let cursor = inner.cursor;
        inner.buf[cursor..cursor + msg.len()].copy_from_slice(msg);
        inner.cursor += msg.len();
        msg.len()
    }

    /// Non-destructive chronological dump, skipping holes. Racing appends
    /// may or may not appear; this is a best-effort snapshot.
    pub(crate) fn dump_to_console(&self, out: &mut dyn io::Write) -> io::Result<()> {
        let (snapshot, cursor) = self.snapshot();

        out.write_all(b"\nkdebug log:\n\n")?;
        let mut text = Vec::with_capacity(self.capacity);
        for &byte in snapshot[cursor..].iter().chain(snapshot[..cursor].iter()) {
            if byte != 0 {
                text.push(byte);
            }
        }
        out.write_all(&text)?;
        out.write_all(b"\n")?;
        Ok(())
    }

    /// Copy the full buffer (exactly `capacity` bytes, oldest first, holes
    /// included) into `sink`, then clear the ring and reset the cursor.
    ///
    /// The copy and the clear happen in one critical section, so an append
    /// racing the sink transfer lands in the cleared buffer, never nowhere.
    /// If the transfer fails, the snapshot is written back into the
    /// still-zero regions (racing appends keep their bytes) so a retry can
    /// recover the content.
    pub(crate) fn drain_into<S: ByteSink + ?Sized>(&self, sink: &mut S) -> Result<usize> {
        if sink.capacity() < self.capacity {
            return Err(Error::InsufficientBuffer);
        }

        let _guard = self
            .drain_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let (snapshot, cursor) = {
            let mut inner = self.inner.lock();
            let snapshot = inner.buf.to_vec();
            let cursor = inner.cursor;
            inner.buf.fill(0);
            inner.cursor = 0;
            (snapshot, cursor)
        };

        let transfer = sink.put(0, &snapshot[cursor..]).and_then(|()| {
            if cursor > 0 {
                sink.put(self.capacity - cursor, &snapshot[..cursor])
            } else {
                Ok(())
            }
        });

        if let Err(err) = transfer {
            // Undo the clear for a retry: everything still zero gets its
            // old byte back, appends that landed meanwhile stay put.
            let mut inner = self.inner.lock();
            for (live, &saved) in inner.buf.iter_mut().zip(snapshot.iter()) {
                if *live == 0 {
                    *live = saved;
                }
            }
            inner.cursor = inner.cursor.max(cursor);
            return Err(err);
        }

        Ok(self.capacity)
    }

    fn snapshot(&self) -> (Vec<u8>, usize) {
        let inner = self.inner.lock();
        (inner.buf.to_vec(), inner.cursor)
    }
}
