//! Registry of named per-flag timing statistics.
//!
//! Each entry keeps two equal-length stat arrays: `active`, mutated on the
//! enter/exit hot path under a per-entry spin lock, and `shadow`, filled by
//! a dump. A dump copies `active` into `shadow` and resets `active` inside
//! one critical section, so every recorded sample appears in exactly one
//! snapshot across successive dumps. Dumps themselves are serialized by the
//! registry mutex, which is why `shadow` needs no lock of its own and can
//! be serialized to the wire after the hot-path lock is released.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use spin::Mutex as SpinMutex;

use crate::error::{Error, Result};
use crate::sink::ByteSink;
use crate::words::split_words;

/// Encoded size of one [`ProfileStat`] on the wire.
pub const STAT_WIRE_SIZE: usize = 32;

/// Number of single-space-separated tokens in a `profile_dump` command.
const PROFILE_DUMP_TOKENS: usize = 3;

/// Timing statistics for one flag.
///
/// `min_micros == u64::MAX` is the literal "no samples yet" sentinel and is
/// preserved on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileStat {
    pub calls: u64,
    pub total_micros: u64,
    pub min_micros: u64,
    pub max_micros: u64,
}

impl ProfileStat {
    /// The reset state: zero samples recorded.
    pub const EMPTY: ProfileStat = ProfileStat {
        calls: 0,
        total_micros: 0,
        min_micros: u64::MAX,
        max_micros: 0,
    };

    fn record(&mut self, elapsed: u64) {
        self.calls += 1;
        self.total_micros += elapsed;
        if self.min_micros > elapsed {
            self.min_micros = elapsed;
        }
        if self.max_micros < elapsed {
            self.max_micros = elapsed;
        }
    }

    fn merge(&mut self, other: &ProfileStat) {
        self.calls += other.calls;
        self.total_micros += other.total_micros;
        self.min_micros = self.min_micros.min(other.min_micros);
        self.max_micros = self.max_micros.max(other.max_micros);
    }

    /// Encode as four little-endian `u64`s: calls, total, min, max.
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.calls.to_le_bytes());
        buf[8..16].copy_from_slice(&self.total_micros.to_le_bytes());
        buf[16..24].copy_from_slice(&self.min_micros.to_le_bytes());
        buf[24..32].copy_from_slice(&self.max_micros.to_le_bytes());
    }

    /// Decode one wire-format stat. `buf` must be `STAT_WIRE_SIZE` bytes.
    pub fn decode(buf: &[u8]) -> ProfileStat {
        let u64_at = |off: usize| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&buf[off..off + 8]);
            u64::from_le_bytes(b)
        };
        ProfileStat {
            calls: u64_at(0),
            total_micros: u64_at(8),
            min_micros: u64_at(16),
            max_micros: u64_at(24),
        }
    }
}

/// The live stat array shared between the registry and handle holders.
///
/// The spin lock covers only a handful of integer updates; the recording
/// path never sleeps and entries never contend with each other.
pub struct ActiveStats {
    stats: SpinMutex<Box<[ProfileStat]>>,
}

/// Shared reference to a registered stat array; also the identity used to
/// destroy the entry.
pub type ProfileHandle = Arc<ActiveStats>;

impl ActiveStats {
    pub(crate) fn record(&self, flag: usize, elapsed: u64) {
        let mut stats = self.stats.lock();
        debug_assert!(flag < stats.len(), "profile flag {flag} out of range");
        if let Some(stat) = stats.get_mut(flag) {
            stat.record(elapsed);
        }
    }
}

struct ProfileEntry {
    version: String,
    flag_count: usize,
    active: ProfileHandle,
    /// Written and read only while holding the registry mutex.
    shadow: Box<[ProfileStat]>,
}

pub(crate) struct ProfileRegistry {
    entries: Mutex<BTreeMap<String, ProfileEntry>>,
}

fn try_alloc_stats(flag_count: usize) -> Result<Box<[ProfileStat]>> {
    let mut stats = Vec::new();
    stats
        .try_reserve_exact(flag_count)
        .map_err(|_| Error::OutOfMemory)?;
    stats.resize(flag_count, ProfileStat::EMPTY);
    Ok(stats.into_boxed_slice())
}

impl ProfileRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, ProfileEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a stat array under a unique name. Both arrays are allocated
    /// before the entry is inserted, so an allocation failure registers
    /// nothing.
    pub(crate) fn create(
        &self,
        name: &str,
        version: &str,
        flag_count: usize,
    ) -> Result<ProfileHandle> {
        let mut entries = self.lock();
        if entries.contains_key(name) {
            return Err(Error::AlreadyExists);
        }
        let active = Arc::new(ActiveStats {
            stats: SpinMutex::new(try_alloc_stats(flag_count)?),
        });
        let shadow = try_alloc_stats(flag_count)?;
        entries.insert(
            name.to_owned(),
            ProfileEntry {
                version: version.to_owned(),
                flag_count,
                active: Arc::clone(&active),
                shadow,
            },
        );
        Ok(active)
    }

    /// Remove the entry whose stat array is `handle`. An unknown handle is
    /// logged and ignored; destruction never fails the caller.
    pub(crate) fn destroy(&self, handle: &ProfileHandle) {
        let mut entries = self.lock();
        let name = entries
            .iter()
            .find(|(_, entry)| Arc::ptr_eq(&entry.active, handle))
            .map(|(name, _)| name.clone());
        match name {
            Some(name) => {
                entries.remove(&name);
            }
            None => log::warn!("profile: destroy of unknown stat array"),
        }
    }

    /// Handle a `profile_dump <name> <version>` command: snapshot-and-reset
    /// the entry's live stats, then transfer `flag_count * STAT_WIRE_SIZE`
    /// bytes to `sink`.
    ///
    /// A `TransferFault` from the sink leaves the entry registered and
    /// folds the snapshot back into the live stats, so a retry still sees
    /// every recorded sample, never double counting.
    pub(crate) fn dump_command<S: ByteSink + ?Sized>(
        &self,
        command: &str,
        sink: &mut S,
    ) -> Result<usize> {
        let words = split_words(command);
        if words.len() != PROFILE_DUMP_TOKENS {
            return Err(Error::InvalidArgument);
        }

        let mut entries = self.lock();
        let entry = entries.get_mut(words[1]).ok_or(Error::NotFound)?;
        if entry.version != words[2] {
            return Err(Error::VersionMismatch);
        }

        let needed = entry.flag_count * STAT_WIRE_SIZE;
        if sink.capacity() < needed {
            return Err(Error::InsufficientBuffer);
        }

        {
            let mut active = entry.active.stats.lock();
            entry.shadow.copy_from_slice(&active);
            active.fill(ProfileStat::EMPTY);
        }

        // Hot-path lock released; serialize the shadow at leisure.
        let mut encoded = vec![0u8; needed];
        for (i, stat) in entry.shadow.iter().enumerate() {
            stat.encode_into(&mut encoded[i * STAT_WIRE_SIZE..(i + 1) * STAT_WIRE_SIZE]);
        }
        if let Err(err) = sink.put(0, &encoded) {
            // Return the stranded snapshot to the live stats; samples
            // recorded since the reset merge cleanly on top.
            let mut active = entry.active.stats.lock();
            for (live, saved) in active.iter_mut().zip(entry.shadow.iter()) {
                live.merge(saved);
            }
            return Err(err);
        }
        Ok(needed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dump(reg: &ProfileRegistry, command: &str, flag_count: usize) -> Vec<ProfileStat> {
        let mut buf = vec![0u8; flag_count * STAT_WIRE_SIZE];
        let n = reg.dump_command(command, &mut buf[..]).unwrap();
        assert_eq!(n, flag_count * STAT_WIRE_SIZE);
        buf.chunks(STAT_WIRE_SIZE).map(ProfileStat::decode).collect()
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let reg = ProfileRegistry::new();
        let _first = reg.create("p", "v", 2).unwrap();
        assert_eq!(reg.create("p", "w", 4).err(), Some(Error::AlreadyExists));
    }

    #[test]
    fn stats_accumulate_and_reset_on_dump() {
        let reg = ProfileRegistry::new();
        let handle = reg.create("p", "v", 2).unwrap();

        handle.record(0, 50);
        handle.record(0, 10);

        let stats = dump(&reg, "profile_dump p v", 2);
        assert_eq!(
            stats[0],
            ProfileStat {
                calls: 2,
                total_micros: 60,
                min_micros: 10,
                max_micros: 50,
            }
        );
        assert_eq!(stats[1], ProfileStat::EMPTY);

        // The dump reset the live stats; a second dump sees no samples.
        let stats = dump(&reg, "profile_dump p v", 2);
        assert_eq!(stats[0], ProfileStat::EMPTY);
        assert_eq!(stats[1], ProfileStat::EMPTY);
    }

    #[test]
    fn dump_command_validation() {
        let reg = ProfileRegistry::new();
        let _handle = reg.create("p", "v", 1).unwrap();
        let mut buf = [0u8; STAT_WIRE_SIZE];

        assert_eq!(
            reg.dump_command("profile_dump p", &mut buf[..]),
            Err(Error::InvalidArgument)
        );
        assert_eq!(
            reg.dump_command("profile_dump q v", &mut buf[..]),
            Err(Error::NotFound)
        );
        assert_eq!(
            reg.dump_command("profile_dump p w", &mut buf[..]),
            Err(Error::VersionMismatch)
        );

        let mut short = [0u8; STAT_WIRE_SIZE - 1];
        assert_eq!(
            reg.dump_command("profile_dump p v", &mut short[..]),
            Err(Error::InsufficientBuffer)
        );
    }

    struct FailingSink;

    impl ByteSink for FailingSink {
        fn capacity(&self) -> usize {
            usize::MAX
        }

        fn put(&mut self, _offset: usize, _bytes: &[u8]) -> Result<()> {
            Err(Error::TransferFault)
        }
    }

    #[test]
    fn faulted_dump_returns_samples_to_the_live_stats() {
        let reg = ProfileRegistry::new();
        let handle = reg.create("p", "v", 2).unwrap();
        handle.record(0, 50);
        handle.record(0, 10);
        handle.record(1, 7);

        let mut faulty = FailingSink;
        assert_eq!(
            reg.dump_command("profile_dump p v", &mut faulty),
            Err(Error::TransferFault)
        );

        // A retry after the fault still sees every sample, exactly once.
        let stats = dump(&reg, "profile_dump p v", 2);
        assert_eq!(
            stats[0],
            ProfileStat {
                calls: 2,
                total_micros: 60,
                min_micros: 10,
                max_micros: 50,
            }
        );
        assert_eq!(
            stats[1],
            ProfileStat {
                calls: 1,
                total_micros: 7,
                min_micros: 7,
                max_micros: 7,
            }
        );
    }

    #[test]
    fn out_of_range_flag_is_ignored_in_release() {
        let reg = ProfileRegistry::new();
        let handle = reg.create("p", "v", 1).unwrap();
        if cfg!(debug_assertions) {
            return; // the debug_assert fires instead
        }
        handle.record(5, 1);
        let stats = dump(&reg, "profile_dump p v", 1);
        assert_eq!(stats[0], ProfileStat::EMPTY);
    }

    #[test]
    fn wire_format_round_trip() {
        let stat = ProfileStat {
            calls: 3,
            total_micros: 123,
            min_micros: 4,
            max_micros: 100,
        };
        let mut buf = [0u8; STAT_WIRE_SIZE];
        stat.encode_into(&mut buf);
        assert_eq!(ProfileStat::decode(&buf), stat);
        // Field order and endianness are part of the wire contract.
        assert_eq!(&buf[0..8], &3u64.to_le_bytes());
        assert_eq!(&buf[16..24], &4u64.to_le_bytes());
    }
}
