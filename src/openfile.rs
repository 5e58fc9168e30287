//! Open-file table: a fixed array of open-file entries plus the
//! "destroy after all closed" barrier.
//!
//! Each handle gets its own entry behind a dedicated mutex, and a
//! separate open-count condvar lets a teardown call block until every
//! handle has been closed without polling.

use std::sync::{Condvar, Mutex};

use log::{debug, trace};

use crate::error::{Error, Result};

/// Per-handle state: which inode it names, its append flag, and its
/// byte cursor. Guarded by a dedicated per-entry mutex so that
/// concurrent I/O on different handles never contends a single
/// table-wide lock.
struct Entry {
    taken: bool,
    inumber: u32,
    pub append: bool,
    pub offset: usize,
}

impl Entry {
    const fn free() -> Self {
        Self {
            taken: false,
            inumber: 0,
            append: false,
            offset: 0,
        }
    }
}

pub struct OpenFileTable {
    entries: Vec<Mutex<Entry>>,
    /// Count of currently-taken entries, paired with `teardown` so a
    /// waiter can block on "reaches zero" without polling.
    open_count: Mutex<usize>,
    teardown: Condvar,
}

/// A snapshot of one open handle's resolved state, used by the
/// read/write path once it has located and locked an entry.
pub(crate) struct Cursor<'e> {
    guard: std::sync::MutexGuard<'e, Entry>,
}

impl Cursor<'_> {
    pub fn inumber(&self) -> u32 {
        self.guard.inumber
    }

    pub fn append(&self) -> bool {
        self.guard.append
    }

    pub fn offset(&self) -> usize {
        self.guard.offset
    }

    pub fn set_offset(&mut self, offset: usize) {
        self.guard.offset = offset;
    }
}

impl OpenFileTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: (0..capacity).map(|_| Mutex::new(Entry::free())).collect(),
            open_count: Mutex::new(0),
            teardown: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Claims the first free slot, recording `inumber` and `append`
    /// with the cursor reset to zero.
    pub fn open_entry(&self, inumber: u32, append: bool) -> Result<u32> {
        for (idx, slot) in self.entries.iter().enumerate() {
            let mut entry = slot.lock().map_err(|_| Error::LockFailure)?;
            if !entry.taken {
                entry.taken = true;
                entry.inumber = inumber;
                entry.append = append;
                entry.offset = 0;
                drop(entry);

                let mut count = self.open_count.lock().map_err(|_| Error::LockFailure)?;
                *count += 1;
                trace!("openfile::open_entry({idx}) inumber={inumber} append={append}");
                return Ok(idx as u32);
            }
        }
        Err(Error::ResourceExhausted)
    }

    /// Frees handle `handle`. Fails if it is out of range or already
    /// free. Signals the teardown barrier once the open count reaches
    /// zero.
    pub fn close_entry(&self, handle: u32) -> Result<()> {
        let slot = self
            .entries
            .get(handle as usize)
            .ok_or(Error::InvalidArgument)?;
        let mut entry = slot.lock().map_err(|_| Error::LockFailure)?;
        if !entry.taken {
            return Err(Error::InvalidArgument);
        }
        entry.taken = false;
        drop(entry);

        let mut count = self.open_count.lock().map_err(|_| Error::LockFailure)?;
        *count -= 1;
        trace!("openfile::close_entry({handle}) open_count={count}");
        if *count == 0 {
            self.teardown.notify_all();
        }
        Ok(())
    }

    /// Locks handle `handle`'s cursor for a read or write, failing if
    /// it is out of range or not currently open.
    pub(crate) fn lock(&self, handle: u32) -> Result<Cursor<'_>> {
        let slot = self
            .entries
            .get(handle as usize)
            .ok_or(Error::InvalidArgument)?;
        let guard = slot.lock().map_err(|_| Error::LockFailure)?;
        if !guard.taken {
            return Err(Error::InvalidArgument);
        }
        Ok(Cursor { guard })
    }

    pub fn open_count(&self) -> Result<usize> {
        Ok(*self.open_count.lock().map_err(|_| Error::LockFailure)?)
    }

    /// Blocks until every open handle has been closed. Re-checks the
    /// predicate after every wakeup, so a spurious wakeup cannot let
    /// teardown proceed early.
    pub fn wait_until_empty(&self) -> Result<()> {
        let mut count = self.open_count.lock().map_err(|_| Error::LockFailure)?;
        while *count != 0 {
            count = self.teardown.wait(count).map_err(|_| Error::LockFailure)?;
        }
        debug!("openfile::wait_until_empty: open_count reached 0");
        Ok(())
    }
}
