//! tfs: an in-memory, thread-safe, single-directory file system.
//!
//! Five layers, listed leaves-first:
//!   + Blocks: allocator for data blocks ([`block`]).
//!   + Inodes: inode table, indirect-block indexing, per-inode locking
//!     ([`inode`]).
//!   + Directory: name lookup/creation in the one root directory
//!     ([`dir`]).
//!   + Open files: per-handle cursors, append mode, the open-file
//!     table ([`openfile`]).
//!   + Names: the `/name` path grammar ([`path`]).
//!
//! [`Tfs`] is the single owned value that composes all of the above,
//! constructed by [`Tfs::init`] and passed by reference into every
//! operation rather than living behind global statics.

pub mod block;
pub mod config;
pub mod dir;
pub mod error;
pub mod inode;
pub mod openfile;
pub mod path;

use bitflags::bitflags;
use log::{debug, warn};

use block::BlockStore;
use config::{BLOCK_SIZE, MAX_FILE_SIZE, ROOT_DIR_INUM};
use error::{Error, Result};
use inode::{InodeTable, InodeType};
use openfile::OpenFileTable;

bitflags! {
    /// Flags accepted by [`Tfs::open`].
    pub struct OpenFlags: u8 {
        /// Create the named file if it does not already exist.
        const CREATE = 0b001;
        /// Reset the resolved inode's content to empty after locating it.
        const TRUNC  = 0b010;
        /// Every read/write on this handle starts from the file's
        /// current end, ignoring the handle's stored offset.
        const APPEND = 0b100;
    }
}

/// The whole file system state: block arena, inode table, and
/// open-file table, composed into one value so a caller owns (or
/// shares via `Arc`) a single handle instead of juggling three.
pub struct Tfs {
    blocks: BlockStore,
    inodes: InodeTable,
    open_files: OpenFileTable,
}

impl Tfs {
    /// Builds a fresh file system: empty block arena, empty inode
    /// table, empty open-file table, and a freshly created root
    /// directory. Fails (rather than returning a file system with the
    /// wrong root inumber) unless the root lands at
    /// [`config::ROOT_DIR_INUM`].
    pub fn init() -> Result<Self> {
        let blocks = BlockStore::new(config::DATA_BLOCKS);
        let inodes = InodeTable::new(config::INODE_TABLE_SIZE);
        let open_files = OpenFileTable::new(config::MAX_OPEN_FILES);

        let root = inodes.create(&blocks, InodeType::Directory)?;
        if root != ROOT_DIR_INUM {
            return Err(Error::LockFailure);
        }

        debug!("tfs::init: root directory at inumber {root}");
        Ok(Self {
            blocks,
            inodes,
            open_files,
        })
    }

    /// Tears down the file system immediately, without waiting for any
    /// open handles to close. Dropping `self` is sufficient; this
    /// method exists to give the teardown step a name on the public
    /// surface.
    pub fn destroy(self) -> Result<()> {
        debug!("tfs::destroy");
        Ok(())
    }

    /// Blocks until every open handle has been closed, then tears down
    /// the file system.
    pub fn destroy_after_all_closed(self) -> Result<()> {
        self.wait_until_all_closed()?;
        self.destroy()
    }

    /// Blocks until every open handle has been closed, without
    /// consuming `self`. `destroy_after_all_closed` is this followed
    /// by teardown; exposed separately so a caller sharing `self`
    /// behind an `Arc` can run the barrier from its own thread while
    /// other threads still hold clones.
    pub fn wait_until_all_closed(&self) -> Result<()> {
        self.open_files.wait_until_empty()
    }

    /// Resolves `path` (`/name`, `name` non-empty and slash-free) to
    /// an inumber in the root directory.
    pub fn lookup(&self, path: &str) -> Result<u32> {
        let name = path::parse(path)?;
        dir::find(&self.inodes, &self.blocks, ROOT_DIR_INUM, name)
    }

    /// Opens `path` under `flags`, returning a file handle.
    ///
    /// - `CREATE`: creates a regular file named by `path` if absent;
    ///   otherwise uses the existing inode. `open` is always satisfied
    ///   by `CREATE` for a structurally valid path.
    /// - `TRUNC`: resets the resolved inode's content to empty after
    ///   it is located. Other handles already open on the same inode
    ///   become stale for their next read/write.
    /// - `APPEND`: marks the handle so every read/write substitutes
    ///   the inode's current size for the handle's stored offset.
    pub fn open(&self, path: &str, flags: OpenFlags) -> Result<u32> {
        let name = path::parse(path)?;

        let inumber = if flags.contains(OpenFlags::CREATE) {
            dir::create_in(&self.inodes, &self.blocks, ROOT_DIR_INUM, InodeType::File, name)?
        } else {
            dir::find(&self.inodes, &self.blocks, ROOT_DIR_INUM, name)?
        };

        if flags.contains(OpenFlags::TRUNC) {
            self.inodes.clear(&self.blocks, inumber)?;
        }

        let handle = self
            .open_files
            .open_entry(inumber, flags.contains(OpenFlags::APPEND))?;
        debug!("tfs::open({path:?}, {flags:?}) -> handle {handle} (inumber {inumber})");
        Ok(handle)
    }

    /// Closes `handle`.
    pub fn close(&self, handle: u32) -> Result<()> {
        self.open_files.close_entry(handle)
    }

    /// Reads up to `buf.len()` bytes through `handle` into `buf`,
    /// honoring append mode and clamping at EOF.
    pub fn read(&self, handle: u32, buf: &mut [u8]) -> Result<usize> {
        let mut cursor = self.open_files.lock(handle)?;
        let inumber = cursor.inumber();

        let inode = self.inodes.read_lock(&self.blocks, inumber)?;
        let start = if cursor.append() { inode.size } else { cursor.offset() };
        if start > inode.size {
            return Err(Error::StaleCursor);
        }

        let to_read = buf.len().min(inode.size - start);
        let mut offset = start;
        let mut done = 0;
        while done < to_read {
            let block_index = offset / BLOCK_SIZE;
            let within = offset % BLOCK_SIZE;
            let physical = inode.block_at(block_index)?;
            // SAFETY: `inode`'s read lock is held for the whole
            // transfer, serializing this against any concurrent
            // writer of the same inode.
            let block = unsafe { self.blocks.block(physical) };
            let n = (BLOCK_SIZE - within).min(to_read - done);
            buf[done..done + n].copy_from_slice(&block[within..within + n]);
            offset += n;
            done += n;
        }

        cursor.set_offset(offset);
        Ok(done)
        // `inode` drops before `cursor`: declared after it, so Rust
        // drops it first, releasing the inode lock before the handle
        // lock.
    }

    /// Writes up to `buf.len()` bytes through `handle`, extending the
    /// file as needed, clamped at [`config::MAX_FILE_SIZE`] rather than
    /// rejected.
    ///
    /// A failure partway through (e.g. the block arena runs out of
    /// free blocks) does not roll back: every byte already copied
    /// stays committed, `inode.size` and the handle's cursor are
    /// advanced to match, and the error is returned for the remainder.
    /// This is degraded-but-consistent behavior, not a transaction —
    /// already-written blocks and the bytes they hold remain reachable
    /// through `read`.
    pub fn write(&self, handle: u32, buf: &[u8]) -> Result<usize> {
        let mut cursor = self.open_files.lock(handle)?;
        let inumber = cursor.inumber();

        let mut inode = self.inodes.write_lock(&self.blocks, inumber)?;
        let start = if cursor.append() { inode.size } else { cursor.offset() };
        if start > inode.size {
            return Err(Error::StaleCursor);
        }

        let to_write = buf.len().min(MAX_FILE_SIZE.saturating_sub(start));
        let mut offset = start;
        let mut done = 0;
        while done < to_write {
            let block_index = offset / BLOCK_SIZE;
            let within = offset % BLOCK_SIZE;
            if block_index == inode.block_count {
                if let Err(e) = inode.extend() {
                    warn!("tfs::write: stopped after {done} of {to_write} bytes: {e}");
                    return Err(e);
                }
            }
            let physical = inode.block_at(block_index)?;
            // SAFETY: `inode`'s write lock is held for the whole
            // transfer, giving exclusive access to its blocks.
            let block = unsafe { self.blocks.block_mut(physical) };
            let n = (BLOCK_SIZE - within).min(to_write - done);
            block[within..within + n].copy_from_slice(&buf[done..done + n]);
            offset += n;
            done += n;

            // Commit this iteration's progress before looping again,
            // so a failure on the next block leaves the size and
            // cursor reflecting every byte actually written rather
            // than only a successful call in full.
            if offset > inode.size {
                inode.size = offset;
            }
            cursor.set_offset(offset);
        }

        Ok(done)
    }
}

impl std::fmt::Debug for Tfs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tfs")
            .field("open_count", &self.open_files.open_count().ok())
            .finish_non_exhaustive()
    }
}
