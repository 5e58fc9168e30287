//! Named constants for the TFS state core.
//!
//! Mirrors the flat `pub const` layout of a classic kernel `param.rs`:
//! a handful of values chosen by the embedder, plus values derived from
//! them that the rest of the crate treats as fixed.

use static_assertions::const_assert;

/// Bytes per data block.
pub const BLOCK_SIZE: usize = 1024;

/// Number of data blocks in the block store's arena.
pub const DATA_BLOCKS: usize = 4096;

/// Number of inode slots in the inode table.
pub const INODE_TABLE_SIZE: usize = 128;

/// Direct block references carried inline in an inode.
pub const INODE_DIRECT_REFS: usize = 10;

/// Maximum stored length of a file name, including the terminating NUL.
pub const MAX_FILE_NAME: usize = 32;

/// Number of open-file-table slots.
pub const MAX_OPEN_FILES: usize = 128;

/// Inumber of the (sole) root directory.
pub const ROOT_DIR_INUM: u32 = 0;

/// Latency-emulation loop count. `0` disables the emulation entirely.
///
/// This exists purely to surface scheduling-sensitive races during
/// development and testing; it has no bearing on correctness. See
/// `DESIGN.md` for the rationale behind the default.
pub const DELAY: usize = 0;

/// On-disk encoding of a directory entry: a fixed-width name followed
/// by a 4-byte signed inumber (`-1` denotes an empty slot).
pub const DIR_ENTRY_SIZE: usize = MAX_FILE_NAME + 4;

/// Directory entry slots that fit in one data block.
pub const MAX_DIR_ENTRIES: usize = BLOCK_SIZE / DIR_ENTRY_SIZE;

/// On-disk encoding width of a single indirect block reference.
pub const BLOCK_REF_SIZE: usize = 4;

/// Block references that fit in one indirect block.
pub const MAX_INDIRECT_REFS: usize = BLOCK_SIZE / BLOCK_REF_SIZE;

/// Largest file size representable with `INODE_DIRECT_REFS` direct
/// references plus one single-level indirect block.
pub const MAX_FILE_SIZE: usize = BLOCK_SIZE * (INODE_DIRECT_REFS + MAX_INDIRECT_REFS);

const_assert!(MAX_DIR_ENTRIES > 0);
const_assert!(MAX_INDIRECT_REFS > 0);
const_assert!(DIR_ENTRY_SIZE <= BLOCK_SIZE);
const_assert!(BLOCK_REF_SIZE <= BLOCK_SIZE);
const_assert!(ROOT_DIR_INUM as usize == 0);
const_assert!(MAX_FILE_SIZE / BLOCK_SIZE == INODE_DIRECT_REFS + MAX_INDIRECT_REFS);
