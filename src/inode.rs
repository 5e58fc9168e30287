//! Inode table: a fixed array of inode slots plus a free/taken bitmap,
//! and the per-inode reader/writer lock discipline built on top of it.
//!
//! Allocation is a `Mutex<Vec<bool>>` bitmap; content is a
//! `RwLock<InodeData>` per slot, so readers of different inodes (or
//! the same inode) never block each other, while a writer gets
//! exclusive access to that inode's content only.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::trace;

use crate::block::BlockStore;
use crate::config::{INODE_DIRECT_REFS, MAX_INDIRECT_REFS};
use crate::error::{Error, Result};

/// The kind of file an inode describes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InodeType {
    File,
    Directory,
}

/// In-memory inode content: type, size, and the block references that
/// back it.
#[derive(Clone, Debug)]
pub struct InodeData {
    pub typ: InodeType,
    pub size: usize,
    pub block_count: usize,
    pub direct: [Option<u32>; INODE_DIRECT_REFS],
    pub indirect_block: Option<u32>,
}

impl InodeData {
    fn empty(typ: InodeType) -> Self {
        Self {
            typ,
            size: 0,
            block_count: 0,
            direct: [None; INODE_DIRECT_REFS],
            indirect_block: None,
        }
    }

    /// Reads the `slot`-th reference (0-indexed over the whole file,
    /// direct references first) out of the indirect block.
    fn indirect_ref(&self, blocks: &BlockStore, slot: usize) -> u32 {
        // SAFETY: the indirect block is exclusively owned by this
        // inode and this method is only reachable while the caller
        // holds this inode's read or write lock, which serializes
        // access to it.
        let raw = unsafe { blocks.block(self.indirect_block.expect("indirect block missing")) };
        read_block_ref(raw, slot)
    }

    fn set_indirect_ref(&mut self, blocks: &BlockStore, slot: usize, value: u32) {
        // SAFETY: see `indirect_ref`; this path additionally requires
        // the write lock, which the write-guard type enforces.
        let raw = unsafe { blocks.block_mut(self.indirect_block.expect("indirect block missing")) };
        write_block_ref(raw, slot, value);
    }
}

/// One inode slot: content plus its own reader/writer lock.
struct InodeSlot {
    data: RwLock<InodeData>,
}

/// Fixed-size table of inode slots with a separate allocator bitmap.
pub struct InodeTable {
    bitmap: Mutex<Vec<bool>>,
    slots: Vec<InodeSlot>,
}

impl InodeTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            bitmap: Mutex::new(vec![false; capacity]),
            slots: (0..capacity)
                .map(|_| InodeSlot {
                    data: RwLock::new(InodeData::empty(InodeType::File)),
                })
                .collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Validates that `inumber` names a slot in range, before touching
    /// the per-inode lock table — an invalid inumber should never
    /// block on or poison a lock it has no business touching.
    fn index_of(&self, inumber: u32) -> Result<usize> {
        let idx = inumber as usize;
        if idx >= self.slots.len() {
            return Err(Error::InvalidArgument);
        }
        Ok(idx)
    }

    /// Allocates a free inode slot and initializes it. Directories get
    /// one zeroed content block immediately; on block allocation
    /// failure the slot is rolled back to FREE.
    ///
    /// The bitmap mutex stays held across the new slot's write-lock
    /// acquisition below. A caller (such as `dir::create_in`) that
    /// calls this while already holding a different inode's write
    /// lock therefore never holds two inode write locks without the
    /// bitmap mutex also held in between.
    pub fn create(&self, blocks: &BlockStore, typ: InodeType) -> Result<u32> {
        let mut bitmap = self.bitmap.lock().map_err(|_| Error::LockFailure)?;
        let idx = bitmap
            .iter()
            .position(|&taken| !taken)
            .ok_or(Error::ResourceExhausted)?;
        bitmap[idx] = true;
        let inum = idx as u32;

        let mut data = self.slots[idx].data.write().map_err(|_| Error::LockFailure)?;
        *data = InodeData::empty(typ);

        if typ == InodeType::Directory {
            if let Err(e) = Self::init_directory_block(blocks, &mut data) {
                bitmap[idx] = false;
                return Err(e);
            }
        }

        trace!("inode::create({inum}) type={typ:?}");
        Ok(inum)
    }

    fn init_directory_block(blocks: &BlockStore, data: &mut InodeData) -> Result<()> {
        let block_idx = blocks.allocate()?;
        // SAFETY: the block was just allocated and is not yet
        // reachable from any other inode, so we have sole access.
        let raw = unsafe { blocks.block_mut(block_idx) };
        crate::dir::init_block(raw);
        data.direct[0] = Some(block_idx);
        data.block_count = 1;
        Ok(())
    }

    /// Frees every block referenced by `inumber` and returns its slot
    /// to FREE. The slot may be reused immediately afterward.
    pub fn delete(&self, blocks: &BlockStore, inumber: u32) -> Result<()> {
        let idx = self.index_of(inumber)?;
        let mut data = self.slots[idx].data.write().map_err(|_| Error::LockFailure)?;
        free_all_blocks(blocks, &mut data)?;
        data.size = 0;
        data.block_count = 0;
        drop(data);

        let mut bitmap = self.bitmap.lock().map_err(|_| Error::LockFailure)?;
        bitmap[idx] = false;
        trace!("inode::delete({inumber})");
        Ok(())
    }

    /// Frees every block referenced by `inumber` but keeps the slot
    /// TAKEN, resetting size and block count to zero. Used for
    /// truncate-on-open.
    pub fn clear(&self, blocks: &BlockStore, inumber: u32) -> Result<()> {
        let idx = self.index_of(inumber)?;
        let mut data = self.slots[idx].data.write().map_err(|_| Error::LockFailure)?;
        free_all_blocks(blocks, &mut data)?;
        data.size = 0;
        data.block_count = 0;
        trace!("inode::clear({inumber})");
        Ok(())
    }

    /// Acquires `inumber`'s content for reading.
    pub fn read_lock<'t>(
        &'t self,
        blocks: &'t BlockStore,
        inumber: u32,
    ) -> Result<InodeReadGuard<'t>> {
        let idx = self.index_of(inumber)?;
        let guard = self.slots[idx].data.read().map_err(|_| Error::LockFailure)?;
        Ok(InodeReadGuard { blocks, guard })
    }

    /// Acquires `inumber`'s content for writing.
    pub fn write_lock<'t>(
        &'t self,
        blocks: &'t BlockStore,
        inumber: u32,
    ) -> Result<InodeWriteGuard<'t>> {
        let idx = self.index_of(inumber)?;
        let guard = self.slots[idx].data.write().map_err(|_| Error::LockFailure)?;
        Ok(InodeWriteGuard { blocks, guard })
    }
}

fn free_all_blocks(blocks: &BlockStore, data: &mut InodeData) -> Result<()> {
    for slot in data.direct.iter_mut() {
        if let Some(b) = slot.take() {
            blocks.free(b)?;
        }
    }
    if let Some(indirect) = data.indirect_block.take() {
        let used = data.block_count.saturating_sub(INODE_DIRECT_REFS);
        for slot in 0..used {
            let b = data.indirect_ref_after_take(blocks, indirect, slot);
            blocks.free(b)?;
        }
        blocks.free(indirect)?;
    }
    Ok(())
}

impl InodeData {
    // Helper used only while tearing down: `indirect_block` has
    // already been taken out of `self`, so the index is passed in
    // explicitly instead of re-reading `self.indirect_block`.
    fn indirect_ref_after_take(&self, blocks: &BlockStore, indirect: u32, slot: usize) -> u32 {
        // SAFETY: caller (`free_all_blocks`) holds this inode's write
        // lock for the duration of teardown.
        let raw = unsafe { blocks.block(indirect) };
        read_block_ref(raw, slot)
    }
}

/// Read-only view of a locked inode, pairing the content guard with
/// the block store needed to resolve block references.
pub struct InodeReadGuard<'t> {
    blocks: &'t BlockStore,
    guard: RwLockReadGuard<'t, InodeData>,
}

impl Deref for InodeReadGuard<'_> {
    type Target = InodeData;
    fn deref(&self) -> &InodeData {
        &self.guard
    }
}

impl InodeReadGuard<'_> {
    /// Resolves the physical block index at logical position `i`
    /// within this file (direct references first, then indirect).
    pub fn block_at(&self, i: usize) -> Result<u32> {
        block_at(&self.guard, self.blocks, i)
    }
}

/// Exclusive view of a locked inode, pairing the content guard with
/// the block store needed to allocate and resolve block references.
pub struct InodeWriteGuard<'t> {
    blocks: &'t BlockStore,
    guard: RwLockWriteGuard<'t, InodeData>,
}

impl Deref for InodeWriteGuard<'_> {
    type Target = InodeData;
    fn deref(&self) -> &InodeData {
        &self.guard
    }
}

impl DerefMut for InodeWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut InodeData {
        &mut self.guard
    }
}

impl InodeWriteGuard<'_> {
    pub fn block_at(&self, i: usize) -> Result<u32> {
        block_at(&self.guard, self.blocks, i)
    }

    /// Allocates exactly one new data block and appends it as the
    /// next reference (direct while room remains, else indirect,
    /// allocating the indirect block itself on the direct→indirect
    /// transition). Fails once direct + indirect capacity is
    /// exhausted.
    pub fn extend(&mut self) -> Result<u32> {
        if self.guard.block_count >= INODE_DIRECT_REFS + MAX_INDIRECT_REFS {
            return Err(Error::ResourceExhausted);
        }

        let new_block = self.blocks.allocate()?;

        if self.guard.block_count < INODE_DIRECT_REFS {
            self.guard.direct[self.guard.block_count] = Some(new_block);
        } else {
            if self.guard.indirect_block.is_none() {
                let indirect = match self.blocks.allocate() {
                    Ok(b) => b,
                    Err(e) => {
                        // Roll back the content block we already took.
                        let _ = self.blocks.free(new_block);
                        return Err(e);
                    }
                };
                // SAFETY: freshly allocated, not yet visible anywhere else.
                let raw = unsafe { self.blocks.block_mut(indirect) };
                raw.fill(0);
                self.guard.indirect_block = Some(indirect);
            }
            let slot = self.guard.block_count - INODE_DIRECT_REFS;
            self.guard.set_indirect_ref(self.blocks, slot, new_block);
        }

        self.guard.block_count += 1;
        Ok(new_block)
    }
}

fn block_at(data: &InodeData, blocks: &BlockStore, i: usize) -> Result<u32> {
    if i >= data.block_count {
        return Err(Error::InvalidArgument);
    }
    if i < INODE_DIRECT_REFS {
        Ok(data.direct[i].expect("direct ref within block_count must be set"))
    } else {
        Ok(data.indirect_ref(blocks, i - INODE_DIRECT_REFS))
    }
}

/// Reads a 4-byte little-endian block index out of `block` at
/// reference slot `slot`.
pub fn read_block_ref(block: &crate::block::Block, slot: usize) -> u32 {
    let start = slot * crate::config::BLOCK_REF_SIZE;
    let bytes: [u8; 4] = block[start..start + 4].try_into().expect("4 bytes");
    u32::from_le_bytes(bytes)
}

/// Writes a 4-byte little-endian block index into `block` at
/// reference slot `slot`.
pub fn write_block_ref(block: &mut crate::block::Block, slot: usize, value: u32) {
    let start = slot * crate::config::BLOCK_REF_SIZE;
    block[start..start + 4].copy_from_slice(&value.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DATA_BLOCKS;

    fn setup(capacity: usize) -> (BlockStore, InodeTable) {
        (BlockStore::new(DATA_BLOCKS), InodeTable::new(capacity))
    }

    #[test]
    fn create_file_has_no_blocks() {
        let (blocks, table) = setup(4);
        let inum = table.create(&blocks, InodeType::File).unwrap();
        let guard = table.read_lock(&blocks, inum).unwrap();
        assert_eq!(guard.block_count, 0);
        assert_eq!(guard.size, 0);
    }

    #[test]
    fn create_directory_gets_one_block() {
        let (blocks, table) = setup(4);
        let inum = table.create(&blocks, InodeType::Directory).unwrap();
        let guard = table.read_lock(&blocks, inum).unwrap();
        assert_eq!(guard.block_count, 1);
        assert!(guard.direct[0].is_some());
    }

    #[test]
    fn extend_fills_direct_then_indirect() {
        let (blocks, table) = setup(4);
        let inum = table.create(&blocks, InodeType::File).unwrap();
        let mut guard = table.write_lock(&blocks, inum).unwrap();
        for _ in 0..INODE_DIRECT_REFS {
            guard.extend().unwrap();
        }
        assert!(guard.indirect_block.is_none());
        guard.extend().unwrap();
        assert!(guard.indirect_block.is_some());
        assert_eq!(guard.block_count, INODE_DIRECT_REFS + 1);
    }

    #[test]
    fn extend_fails_past_capacity() {
        let (blocks, table) = setup(4);
        let inum = table.create(&blocks, InodeType::File).unwrap();
        let mut guard = table.write_lock(&blocks, inum).unwrap();
        for _ in 0..(INODE_DIRECT_REFS + MAX_INDIRECT_REFS) {
            guard.extend().unwrap();
        }
        assert_eq!(guard.extend().unwrap_err(), Error::ResourceExhausted);
    }

    #[test]
    fn block_at_out_of_range() {
        let (blocks, table) = setup(4);
        let inum = table.create(&blocks, InodeType::File).unwrap();
        let guard = table.read_lock(&blocks, inum).unwrap();
        assert_eq!(guard.block_at(0).unwrap_err(), Error::InvalidArgument);
    }

    #[test]
    fn delete_frees_blocks_and_slot() {
        let (blocks, table) = setup(4);
        let inum = table.create(&blocks, InodeType::File).unwrap();
        let assigned = {
            let mut guard = table.write_lock(&blocks, inum).unwrap();
            guard.extend().unwrap()
        };
        table.delete(&blocks, inum).unwrap();
        // First-fit allocation means the freed block comes back first.
        let reused = blocks.allocate().unwrap();
        assert_eq!(reused, assigned);
    }

    #[test]
    fn invalid_inumber_rejected_before_locking() {
        let (blocks, table) = setup(2);
        assert_eq!(
            table.read_lock(&blocks, 999).unwrap_err(),
            Error::InvalidArgument
        );
        assert_eq!(
            table.delete(&blocks, 999).unwrap_err(),
            Error::InvalidArgument
        );
    }
}
