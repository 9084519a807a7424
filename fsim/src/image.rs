//! The image store.
//!
//! The image is a single regular host file: the control region occupies
//! `[0, ControlRegion::region_size())`, and data blocks fill the rest. The
//! store only ever performs byte-addressed seek/read/write against that one
//! file, or whole-region load/save of the control region; it never
//! interprets the bytes it moves.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    os::fd::AsRawFd as _,
    path::Path,
};

use dataview::{Pod, PodMethods as _};
use fsim_types::{ControlRegion, BLOCK_SIZE, NUM_BLOCKS};

use crate::error::FsResult;

/// Allocates a zeroed `T` directly on the heap.
///
/// `ControlRegion` is tens of megabytes (a 256-entry directory record per
/// inode, times 256 inodes); building one on the stack via `T::zeroed()`
/// before moving it into a `Box` risks overflowing the default thread
/// stack. Going through `alloc_zeroed` sidesteps the stack entirely. Safe
/// because `Pod` guarantees the all-zero bit pattern is a valid value.
fn boxed_zeroed<T: Pod>() -> Box<T> {
    let layout = std::alloc::Layout::new::<T>();
    unsafe {
        let ptr = std::alloc::alloc_zeroed(layout);
        if ptr.is_null() {
            std::alloc::handle_alloc_error(layout);
        }
        Box::from_raw(ptr.cast::<T>())
    }
}

/// Allocates a heap-boxed, all-zero control region for formatting a fresh
/// image. See [`boxed_zeroed`] for why this avoids a stack allocation.
#[must_use]
pub(crate) fn zeroed_control_region() -> Box<ControlRegion> {
    boxed_zeroed()
}

/// Byte offset of the first data block.
#[must_use]
pub fn data_region_start() -> u64 {
    ControlRegion::region_size() as u64
}

/// Byte offset of the first byte of block `b`.
#[must_use]
pub fn block_offset(block: usize) -> u64 {
    data_region_start() + (block * BLOCK_SIZE) as u64
}

pub struct ImageStore {
    file: File,
}

impl ImageStore {
    /// Opens an existing image, or formats a fresh one if `force_init` is
    /// set or the file does not exist yet.
    ///
    /// Returns the store and whether the image was freshly formatted.
    pub fn open_or_format(path: &Path, force_init: bool) -> FsResult<(Self, bool)> {
        let exists = path.exists();
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut store = Self { file };
        let fresh = force_init || !exists;
        if fresh {
            store.format()?;
        }
        Ok((store, fresh))
    }

    /// Pre-zeroes the data region and truncates the file to its full size.
    /// The control region itself is formatted by the caller (it needs the
    /// root inode and directory, which belong to the higher layers).
    fn format(&mut self) -> FsResult<()> {
        let total_size = data_region_start() + (NUM_BLOCKS * BLOCK_SIZE) as u64;
        self.file.set_len(total_size)?;
        self.file.seek(SeekFrom::Start(0))?;
        let zeros = vec![0_u8; BLOCK_SIZE];
        let mut remaining = total_size;
        while remaining > 0 {
            let chunk = remaining.min(zeros.len() as u64) as usize;
            self.file.write_all(&zeros[..chunk])?;
            remaining -= chunk as u64;
        }
        self.file.sync_all()?;
        Ok(())
    }

    /// Reads a single byte at an absolute image offset.
    pub fn read_byte(&mut self, offset: u64) -> FsResult<u8> {
        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = [0_u8; 1];
        self.file.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// Writes a single byte at an absolute image offset.
    pub fn write_byte(&mut self, offset: u64, byte: u8) -> FsResult<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&[byte])?;
        Ok(())
    }

    /// Loads the whole control region as one contiguous blob.
    pub fn load_control_region(&mut self) -> FsResult<Box<ControlRegion>> {
        let mut region = boxed_zeroed::<ControlRegion>();
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(region.as_bytes_mut())?;
        Ok(region)
    }

    /// Persists the whole control region as one contiguous blob.
    ///
    /// Matches the original's save routine: close for binary update, write
    /// the blob at offset 0, then leave the handle open for read/write.
    pub fn save_control_region(&mut self, region: &ControlRegion) -> FsResult<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(region.as_bytes())?;
        self.file.sync_all()?;
        Ok(())
    }

    /// Acquires an advisory exclusive lock on the whole image file.
    pub fn lock_exclusive(&self) -> FsResult<()> {
        let ret = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_EX) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }

    /// Releases the advisory lock.
    pub fn unlock(&self) -> FsResult<()> {
        let ret = unsafe { libc::flock(self.file.as_raw_fd(), libc::LOCK_UN) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_zeroes_data_region() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.img");
        let (mut store, fresh) = ImageStore::open_or_format(&path, true).unwrap();
        assert!(fresh);
        let byte = store.read_byte(block_offset(0)).unwrap();
        assert_eq!(byte, 0);
    }

    #[test]
    fn byte_write_then_read_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.img");
        let (mut store, _) = ImageStore::open_or_format(&path, true).unwrap();
        let off = block_offset(3) + 10;
        store.write_byte(off, b'Z').unwrap();
        assert_eq!(store.read_byte(off).unwrap(), b'Z');
    }

    #[test]
    fn reopening_without_force_init_preserves_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.img");
        {
            let (mut store, _) = ImageStore::open_or_format(&path, true).unwrap();
            store.write_byte(block_offset(0), b'A').unwrap();
        }
        let (mut store, fresh) = ImageStore::open_or_format(&path, false).unwrap();
        assert!(!fresh);
        assert_eq!(store.read_byte(block_offset(0)).unwrap(), b'A');
    }
}
