//! Block store: a fixed arena of data blocks plus a free/taken bitmap.
//!
//! The arena's backing memory is fixed for the life of the store, so a
//! block index can be turned into a reference without holding the
//! allocator lock, as long as the caller already holds whatever
//! higher-level lock serializes access to that block's owner.

use std::cell::UnsafeCell;
use std::sync::Mutex;

use log::{trace, warn};

use crate::config::{BLOCK_SIZE, DELAY};
use crate::error::{Error, Result};

/// A single fixed-size data block.
pub type Block = [u8; BLOCK_SIZE];

/// Fixed-size arena of data blocks with a first-fit allocator bitmap.
pub struct BlockStore {
    blocks: Box<[UnsafeCell<Block>]>,
    bitmap: Mutex<Vec<bool>>,
}

// SAFETY: `blocks` is only ever accessed through `block`/`block_mut`,
// whose safety contracts require the caller to already hold a lock
// that serializes concurrent access to the referenced block's content
// (an inode's rwlock, or the allocator's own bitmap mutex while the
// block is not yet reachable from any inode).
unsafe impl Sync for BlockStore {}

impl BlockStore {
    pub fn new(capacity: usize) -> Self {
        let blocks = (0..capacity)
            .map(|_| UnsafeCell::new([0u8; BLOCK_SIZE]))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            blocks,
            bitmap: Mutex::new(vec![false; capacity]),
        }
    }

    pub fn capacity(&self) -> usize {
        self.blocks.len()
    }

    /// Allocates the first free block, marking it taken. Block
    /// contents are *not* zeroed here; callers that need zeroed
    /// content (directory creation, a freshly allocated indirect
    /// block) must initialize it explicitly.
    pub fn allocate(&self) -> Result<u32> {
        let mut bitmap = self.bitmap.lock().map_err(|_| Error::LockFailure)?;
        simulate_latency(DELAY);
        match bitmap.iter().position(|&taken| !taken) {
            Some(idx) => {
                bitmap[idx] = true;
                trace!("block::allocate -> {idx}");
                Ok(idx as u32)
            }
            None => {
                warn!("block::allocate: out of blocks");
                Err(Error::ResourceExhausted)
            }
        }
    }

    /// Marks a block free. Out-of-range indices fail; freeing an
    /// already-free block does not fail (callers must not double-free
    /// a block owned by two inodes, but the allocator does not itself
    /// detect that).
    pub fn free(&self, index: u32) -> Result<()> {
        let mut bitmap = self.bitmap.lock().map_err(|_| Error::LockFailure)?;
        let idx = index as usize;
        if idx >= bitmap.len() {
            return Err(Error::InvalidArgument);
        }
        bitmap[idx] = false;
        trace!("block::free({idx})");
        Ok(())
    }

    /// Borrows a block for reading.
    ///
    /// # Safety
    ///
    /// The caller must hold a lock that serializes this access with
    /// any concurrent writer of the same block (in practice: the
    /// owning inode's read or write lock).
    pub unsafe fn block(&self, index: u32) -> &Block {
        &*self.blocks[index as usize].get()
    }

    /// Borrows a block for writing.
    ///
    /// # Safety
    ///
    /// Same contract as [`BlockStore::block`], but for exclusive
    /// access; the caller must hold the owning inode's write lock (or
    /// be the sole owner of a block not yet visible to any inode, as
    /// during allocation).
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn block_mut(&self, index: u32) -> &mut Block {
        &mut *self.blocks[index as usize].get()
    }
}

/// Burns `cycles` iterations to emulate a storage-access delay, widening
/// scheduling windows so races surface during testing; `cycles == 0` is
/// a no-op and has no bearing on correctness.
fn simulate_latency(cycles: usize) {
    let mut sink = 0u64;
    for _ in 0..cycles {
        sink = sink.wrapping_add(1);
    }
    std::hint::black_box(sink);
}
