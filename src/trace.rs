//! Registry of named trace-flag arrays.
//!
//! Each entry owns a bit array sized to its flag count. Embedding code
//! holds a [`TraceHandle`] and reads flags lock-free on its hot paths;
//! mutation (creation, destruction, and the `trace_change` command) goes
//! through the registry's blocking mutex and is expected to be rare.

use core::sync::atomic::{AtomicU8, Ordering};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{Error, Result};
use crate::words::{parse_flag_index, split_words};

/// Number of single-space-separated tokens in a `trace_change` command.
const TRACE_CHANGE_TOKENS: usize = 5;

/// A registered array of runtime-toggleable diagnostic flags.
///
/// Flag reads are single relaxed atomic loads so instrumented call sites
/// can query them at any frequency without contending with the registry.
pub struct TraceFlags {
    bits: Box<[AtomicU8]>,
    flag_count: usize,
}

/// Shared reference to a registered flag array; also the identity used to
/// destroy the entry.
pub type TraceHandle = Arc<TraceFlags>;

impl TraceFlags {
    fn alloc(flag_count: usize) -> Result<Self> {
        let len = flag_count.div_ceil(8);
        let mut bits = Vec::new();
        bits.try_reserve_exact(len).map_err(|_| Error::OutOfMemory)?;
        bits.resize_with(len, || AtomicU8::new(0));
        Ok(Self {
            bits: bits.into_boxed_slice(),
            flag_count,
        })
    }

    pub fn flag_count(&self) -> usize {
        self.flag_count
    }

    /// Whether `flag` is currently on. Out-of-range flags read as off.
    #[inline]
    pub fn is_set(&self, flag: usize) -> bool {
        if flag >= self.flag_count {
            return false;
        }
        let byte = self.bits[flag / 8].load(Ordering::Relaxed);
        byte & (1 << (flag % 8)) != 0
    }

    fn set(&self, flag: usize) {
        self.bits[flag / 8].fetch_or(1 << (flag % 8), Ordering::Release);
    }

    fn clear(&self, flag: usize) {
        self.bits[flag / 8].fetch_and(!(1 << (flag % 8)), Ordering::Release);
    }
}

struct TraceEntry {
    version: String,
    flags: TraceHandle,
}

pub(crate) struct TraceRegistry {
    entries: Mutex<BTreeMap<String, TraceEntry>>,
}

impl TraceRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, TraceEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a zeroed flag array under a unique name.
    pub(crate) fn create(
        &self,
        name: &str,
        version: &str,
        flag_count: usize,
    ) -> Result<TraceHandle> {
        let mut entries = self.lock();
        if entries.contains_key(name) {
            return Err(Error::AlreadyExists);
        }
        let flags = Arc::new(TraceFlags::alloc(flag_count)?);
        entries.insert(
            name.to_owned(),
            TraceEntry {
                version: version.to_owned(),
                flags: Arc::clone(&flags),
            },
        );
        Ok(flags)
    }

    /// Remove the entry whose flag array is `handle`. An unknown handle is
    /// logged and ignored; destruction never fails the caller.
    pub(crate) fn destroy(&self, handle: &TraceHandle) {
        let mut entries = self.lock();
        let name = entries
            .iter()
            .find(|(_, entry)| Arc::ptr_eq(&entry.flags, handle))
            .map(|(name, _)| name.clone());
        match name {
            Some(name) => {
                entries.remove(&name);
            }
            None => log::warn!("trace: destroy of unknown flag array"),
        }
    }

    /// Apply a `trace_change <name> <version> <flag> <on|off>` command.
    pub(crate) fn apply_command(&self, command: &str) -> Result<()> {
        let words = split_words(command);
        if words.len() != TRACE_CHANGE_TOKENS {
            return Err(Error::InvalidArgument);
        }

        let entries = self.lock();
        let entry = entries.get(words[1]).ok_or(Error::NotFound)?;
        if entry.version != words[2] {
            return Err(Error::VersionMismatch);
        }

        let flag = parse_flag_index(words[3])?;
        if flag >= entry.flags.flag_count() {
            return Err(Error::InvalidArgument);
        }

        match words[4] {
            "on" => entry.flags.set(flag),
            "off" => entry.flags.clear(flag),
            _ => return Err(Error::InvalidArgument),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_name_is_rejected() {
        let reg = TraceRegistry::new();
        let _first = reg.create("gfs", "1.0", 8).unwrap();
        assert_eq!(reg.create("gfs", "2.0", 8).err(), Some(Error::AlreadyExists));
    }

    #[test]
    fn name_is_reusable_after_destroy() {
        let reg = TraceRegistry::new();
        let handle = reg.create("gfs", "1.0", 8).unwrap();
        reg.destroy(&handle);
        assert!(reg.create("gfs", "1.0", 8).is_ok());
    }

    #[test]
    fn change_command_sets_and_clears_bits() {
        let reg = TraceRegistry::new();
        let handle = reg.create("p", "1.0", 16).unwrap();

        reg.apply_command("trace_change p 1.0 3 on").unwrap();
        assert!(handle.is_set(3));
        assert!(!handle.is_set(4));

        reg.apply_command("trace_change p 1.0 3 off").unwrap();
        assert!(!handle.is_set(3));
    }

    #[test]
    fn change_command_validation() {
        let reg = TraceRegistry::new();
        let _handle = reg.create("p", "1.0", 16).unwrap();

        assert_eq!(
            reg.apply_command("trace_change p 1.0 3"),
            Err(Error::InvalidArgument),
            "wrong token count"
        );
        assert_eq!(
            reg.apply_command("trace_change q 1.0 3 on"),
            Err(Error::NotFound)
        );
        assert_eq!(
            reg.apply_command("trace_change p 2.0 3 off"),
            Err(Error::VersionMismatch)
        );
        assert_eq!(
            reg.apply_command("trace_change p 1.0 16 on"),
            Err(Error::InvalidArgument),
            "flag index out of range"
        );
        assert_eq!(
            reg.apply_command("trace_change p 1.0 x on"),
            Err(Error::InvalidArgument),
            "non-numeric flag index"
        );
        assert_eq!(
            reg.apply_command("trace_change p 1.0 3 maybe"),
            Err(Error::InvalidArgument),
            "unrecognized on/off token"
        );
    }

    #[test]
    fn flags_above_count_read_as_off() {
        let reg = TraceRegistry::new();
        let handle = reg.create("p", "1.0", 3).unwrap();
        assert!(!handle.is_set(3));
        assert!(!handle.is_set(1000));
    }
}
