//! Byte-transfer boundary between the facility and caller-owned memory.
//!
//! Dumps and drains hand their payload to a [`ByteSink`] rather than
//! writing caller memory directly. A sink may fail mid-transfer (the
//! hosted analog of a faulting user-space copy); when it does, the
//! operation reports [`Error::TransferFault`](crate::Error::TransferFault)
//! and leaves its source intact so the caller can retry.

use crate::error::{Error, Result};

/// Destination for a dump or drain payload.
pub trait ByteSink {
    /// Total bytes this sink can accept.
    fn capacity(&self) -> usize;

    /// Copy `bytes` into the sink starting at `offset`.
    fn put(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;
}

impl ByteSink for [u8] {
    fn capacity(&self) -> usize {
        self.len()
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = offset.checked_add(bytes.len()).ok_or(Error::TransferFault)?;
        if end > self.len() {
            return Err(Error::TransferFault);
        }
        self[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_sink_copies_at_offset() {
        let mut buf = [0u8; 8];
        let sink: &mut [u8] = &mut buf;
        sink.put(2, b"abc").unwrap();
        assert_eq!(&buf[..6], b"\0\0abc\0");
    }

    #[test]
    fn slice_sink_rejects_overrun() {
        let mut buf = [0u8; 4];
        let sink: &mut [u8] = &mut buf;
        assert_eq!(sink.put(2, b"abc"), Err(Error::TransferFault));
    }
}
