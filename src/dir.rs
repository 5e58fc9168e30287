//! Directory logic over the single root directory's one content block.
//!
//! Entries are fixed-width name-plus-inumber slots read and written
//! through bounds-checked byte-offset accessors rather than a
//! `#[repr(C)]` transmute over the raw block, so a malformed or
//! truncated slot can never be read out-of-bounds.

use crate::block::{Block, BlockStore};
use crate::config::{DIR_ENTRY_SIZE, MAX_DIR_ENTRIES, MAX_FILE_NAME};
use crate::error::{Error, Result};
use crate::inode::{InodeTable, InodeType};

/// Sentinel inumber meaning "this directory entry slot is empty".
const EMPTY: i32 = -1;

/// Zeroes every directory-entry slot in a freshly allocated directory
/// content block, marking them all empty.
pub fn init_block(block: &mut Block) {
    for slot in 0..MAX_DIR_ENTRIES {
        write_entry(block, slot, &[0; MAX_FILE_NAME], EMPTY);
    }
}

fn entry_offset(slot: usize) -> usize {
    slot * DIR_ENTRY_SIZE
}

fn read_entry(block: &Block, slot: usize) -> ([u8; MAX_FILE_NAME], i32) {
    let off = entry_offset(slot);
    let mut name = [0u8; MAX_FILE_NAME];
    name.copy_from_slice(&block[off..off + MAX_FILE_NAME]);
    let inumber_bytes: [u8; 4] = block[off + MAX_FILE_NAME..off + DIR_ENTRY_SIZE]
        .try_into()
        .expect("4 bytes");
    (name, i32::from_le_bytes(inumber_bytes))
}

fn write_entry(block: &mut Block, slot: usize, name: &[u8; MAX_FILE_NAME], inumber: i32) {
    let off = entry_offset(slot);
    block[off..off + MAX_FILE_NAME].copy_from_slice(name);
    block[off + MAX_FILE_NAME..off + DIR_ENTRY_SIZE].copy_from_slice(&inumber.to_le_bytes());
}

/// Truncates `name` to `MAX_FILE_NAME - 1` bytes and NUL-terminates it
/// at position `MAX_FILE_NAME - 1`.
fn encode_name(name: &str) -> [u8; MAX_FILE_NAME] {
    let mut buf = [0u8; MAX_FILE_NAME];
    let bytes = name.as_bytes();
    let len = bytes.len().min(MAX_FILE_NAME - 1);
    buf[..len].copy_from_slice(&bytes[..len]);
    // buf[len..] is already zero (NUL), including position MAX_FILE_NAME - 1.
    buf
}

/// Looks up `name` in the directory named by `parent`. First matching
/// non-empty entry wins.
pub fn find(table: &InodeTable, blocks: &BlockStore, parent: u32, name: &str) -> Result<u32> {
    let guard = table.read_lock(blocks, parent)?;
    if guard.typ != InodeType::Directory {
        return Err(Error::InvalidArgument);
    }
    let block_idx = guard.direct[0].expect("directory always has a content block");
    // SAFETY: the directory's read lock serializes this against any
    // concurrent `create_in` on the same parent.
    let block = unsafe { blocks.block(block_idx) };
    let needle = encode_name(name);

    (0..MAX_DIR_ENTRIES)
        .map(|slot| read_entry(block, slot))
        .find(|(entry_name, inumber)| *inumber != EMPTY && *entry_name == needle)
        .map(|(_, inumber)| inumber as u32)
        .ok_or(Error::NotFound)
}

/// Looks up `name` in `parent`; if absent, creates a new inode of
/// `typ` and links it in. Idempotent on name: a second call with the
/// same name returns the existing inumber without creating anything.
pub fn create_in(
    table: &InodeTable,
    blocks: &BlockStore,
    parent: u32,
    typ: InodeType,
    name: &str,
) -> Result<u32> {
    if name.is_empty() {
        return Err(Error::InvalidArgument);
    }
    let needle = encode_name(name);

    let guard = table.write_lock(blocks, parent)?;
    if guard.typ != InodeType::Directory {
        return Err(Error::InvalidArgument);
    }
    let block_idx = guard.direct[0].expect("directory always has a content block");

    let empty_slot = {
        // SAFETY: this inode's write lock is held for the whole
        // lookup-then-maybe-create sequence below.
        let block = unsafe { blocks.block(block_idx) };
        let mut empty_slot = None;
        for slot in 0..MAX_DIR_ENTRIES {
            let (entry_name, inumber) = read_entry(block, slot);
            if inumber != EMPTY && entry_name == needle {
                return Ok(inumber as u32);
            }
            if inumber == EMPTY && empty_slot.is_none() {
                empty_slot = Some(slot);
            }
        }
        empty_slot.ok_or(Error::ResourceExhausted)?
    };

    // `table.create` takes the inode-table allocator mutex for its
    // whole body, including while it holds the new child's write
    // lock, so this call only ever stacks one other inode lock on top
    // of `parent`'s write lock with the allocator mutex held between
    // them — never two inode write locks with nothing in between.
    let child_inum = table.create(blocks, typ)?;

    // SAFETY: still under `parent`'s write lock (`guard`, held until
    // this function returns).
    let block = unsafe { blocks.block_mut(block_idx) };
    write_entry(block, empty_slot, &needle, child_inum as i32);
    drop(guard);

    Ok(child_inum)
}
