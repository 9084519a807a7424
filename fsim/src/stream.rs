//! The stream layer: the open-file table and byte-granularity read, write,
//! and seek across an inode's block list.
//!
//! Every cursor is an absolute offset into the image file, matching the
//! layout fixed by [`fsim_types::ControlRegion`]. Crossing a block boundary
//! means looking up the next entry in the inode's `blocks` list and
//! repositioning there; landing on `-1` means end of the allocated chain.

use fsim_types::{
    BlockNo, DirectoryRecord, InodeNo, InodeRepr, InodeType, OpenFileSlotRepr, Permissions, Whence,
    MAX_FILE_OPEN, NUM_BLOCKS, NUM_INODES,
};

use crate::directory;
use crate::error::{FsError, FsResult};
use crate::image::{self, ImageStore};
use crate::inode;

/// Finds the position of `block` within an inode's block list.
fn list_index_of(blocks: &[i32; NUM_BLOCKS], block: i32) -> Option<usize> {
    blocks.iter().position(|&b| b == block)
}

fn block_value_at(offset: u64) -> i32 {
    ((offset - image::data_region_start()) / fsim_types::BLOCK_SIZE as u64) as i32
}

/// Opens `name` for reading/writing; returns a small file descriptor.
pub fn open(
    inodes: &[InodeRepr; NUM_INODES],
    directories: &[DirectoryRecord; NUM_INODES],
    open_files: &mut [OpenFileSlotRepr; MAX_FILE_OPEN],
    name: &[u8],
    parent: InodeNo,
) -> FsResult<i32> {
    let pidx = parent
        .as_index()
        .filter(|&i| i < NUM_INODES)
        .ok_or_else(|| FsError::InvalidArgument(format!("bad inode {parent}")))?;
    let target = directory::find_inode(name, &directories[pidx])
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).into_owned()))?;
    let tidx = target.as_index().expect("found via directory entry");
    match inodes[tidx].ty() {
        Some(InodeType::File | InodeType::Symlink) => {}
        _ => return Err(FsError::WrongType(format!("{target} is not a file or symlink"))),
    }

    let slot = open_files
        .iter()
        .position(OpenFileSlotRepr::is_free)
        .ok_or_else(|| FsError::InvalidArgument("open-file table is full".to_string()))?;
    let first_block = inodes[tidx].blocks[0];
    open_files[slot] = OpenFileSlotRepr::new(
        target.value(),
        image::block_offset(first_block as usize) as i64,
    );
    Ok(slot as i32)
}

/// Validates a descriptor and returns its slot index.
fn slot_index(open_files: &[OpenFileSlotRepr; MAX_FILE_OPEN], fd: i32) -> FsResult<usize> {
    let idx = usize::try_from(fd).map_err(|_| FsError::InvalidDescriptor(fd))?;
    if idx >= MAX_FILE_OPEN || open_files[idx].is_free() {
        return Err(FsError::InvalidDescriptor(fd));
    }
    Ok(idx)
}

/// Closes `fd`, freeing its slot.
pub fn close(open_files: &mut [OpenFileSlotRepr; MAX_FILE_OPEN], fd: i32) -> FsResult<()> {
    let idx = slot_index(open_files, fd)?;
    open_files[idx] = OpenFileSlotRepr::CLOSED;
    Ok(())
}

/// Core byte-at-a-time write against an inode's block list, starting at
/// `*cursor` and allocating fresh blocks from `bitmap` as the chain runs
/// out. Returns the count of bytes that were newly written (as opposed to
/// overwritten): a byte already on disk at a position is detected by
/// reading it first and checking for zero.
fn write_bytes(
    image: &mut ImageStore,
    inode: &mut InodeRepr,
    bitmap: &mut [i32; NUM_BLOCKS],
    cursor: &mut i64,
    bytes: &[u8],
) -> FsResult<usize> {
    let mut new_bytes = 0_i64;
    let mut list_idx = list_index_of(&inode.blocks, block_value_at(*cursor as u64)).ok_or_else(
        || FsError::InvalidArgument("cursor is not within an allocated block".to_string()),
    )?;

    for &byte in bytes {
        let existing = image.read_byte(*cursor as u64)?;
        if existing == 0 {
            new_bytes += 1;
            inode.size += 1;
        }
        image.write_byte(*cursor as u64, byte)?;
        *cursor += 1;

        let block_end =
            image::block_offset(inode.blocks[list_idx] as usize) + fsim_types::BLOCK_SIZE as u64;
        if *cursor as u64 >= block_end {
            list_idx += 1;
            if list_idx >= NUM_BLOCKS {
                return Err(FsError::OutOfBlocks);
            }
            if inode.blocks[list_idx] == BlockNo::NONE.value() {
                let fresh = crate::alloc::allocate_block(bitmap)?;
                inode.blocks[list_idx] = fresh.value();
            }
            *cursor = image::block_offset(inode.blocks[list_idx] as usize) as i64;
        }
    }

    Ok(new_bytes as usize)
}

/// Core byte-at-a-time read against an inode's block list, stopping early
/// if the chain runs out before `buf` is full.
fn read_bytes(
    image: &mut ImageStore,
    blocks: &[i32; NUM_BLOCKS],
    cursor: &mut i64,
    buf: &mut [u8],
) -> FsResult<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let mut list_idx = list_index_of(blocks, block_value_at(*cursor as u64)).ok_or_else(|| {
        FsError::InvalidArgument("cursor is not within an allocated block".to_string())
    })?;

    let mut read = 0;
    while read < buf.len() {
        buf[read] = image.read_byte(*cursor as u64)?;
        read += 1;
        *cursor += 1;

        let block_end =
            image::block_offset(blocks[list_idx] as usize) + fsim_types::BLOCK_SIZE as u64;
        if *cursor as u64 >= block_end && read < buf.len() {
            list_idx += 1;
            if list_idx >= NUM_BLOCKS || blocks[list_idx] == BlockNo::NONE.value() {
                break;
            }
            *cursor = image::block_offset(blocks[list_idx] as usize) as i64;
        }
    }
    Ok(read)
}

/// Writes through the open-file table, bumping every ancestor directory's
/// size by the newly-written byte count.
pub fn write(
    image: &mut ImageStore,
    inodes: &mut [InodeRepr; NUM_INODES],
    bitmap: &mut [i32; NUM_BLOCKS],
    open_files: &mut [OpenFileSlotRepr; MAX_FILE_OPEN],
    fd: i32,
    bytes: &[u8],
) -> FsResult<usize> {
    let slot = slot_index(open_files, fd)?;
    let target = InodeNo::new(open_files[slot].inode);
    let tidx = target.as_index().expect("descriptor always names a live inode");
    if inodes[tidx].ty() != Some(InodeType::File) {
        return Err(FsError::WrongType(format!("{target} is not a file")));
    }
    if !inodes[tidx].permissions().contains(Permissions::WRITE) {
        return Err(FsError::PermissionDenied(format!(
            "no write permission on {target}"
        )));
    }

    let mut cursor = open_files[slot].cursor;
    let result = write_bytes(image, &mut inodes[tidx], bitmap, &mut cursor, bytes);
    open_files[slot].cursor = cursor;
    let new_bytes = result?;

    let parent = InodeNo::new(inodes[tidx].inode_rep_parent);
    inode::bump_ancestor_sizes(inodes, parent, new_bytes as i64)?;
    Ok(new_bytes)
}

/// Reads up to `buf.len()` bytes through the open-file table, advancing the
/// descriptor's cursor. Requires the underlying inode be a file or symlink
/// with read permission.
pub fn read(
    image: &mut ImageStore,
    inodes: &[InodeRepr; NUM_INODES],
    open_files: &mut [OpenFileSlotRepr; MAX_FILE_OPEN],
    fd: i32,
    buf: &mut [u8],
) -> FsResult<usize> {
    let slot = slot_index(open_files, fd)?;
    let target = InodeNo::new(open_files[slot].inode);
    let tidx = target.as_index().expect("descriptor always names a live inode");
    match inodes[tidx].ty() {
        Some(InodeType::File | InodeType::Symlink) => {}
        _ => return Err(FsError::WrongType(format!("{target} is not a file or symlink"))),
    }
    if !inodes[tidx].permissions().contains(Permissions::READ) {
        return Err(FsError::PermissionDenied(format!(
            "no read permission on {target}"
        )));
    }

    let mut cursor = open_files[slot].cursor;
    let result = read_bytes(image, &inodes[tidx].blocks, &mut cursor, buf);
    open_files[slot].cursor = cursor;
    result
}

/// Advances `start_cursor`, which sits at the first byte of
/// `blocks[start_list_idx]`, by `amount` logical bytes, crossing block
/// boundaries as needed. Fails if the chain runs out before `amount` is
/// exhausted.
fn advance(
    blocks: &[i32; NUM_BLOCKS],
    mut list_idx: usize,
    mut cursor: i64,
    mut amount: i64,
) -> FsResult<i64> {
    while amount > 0 {
        let block_end = image::block_offset(blocks[list_idx] as usize) + fsim_types::BLOCK_SIZE as u64;
        let room = block_end as i64 - cursor;
        let step = amount.min(room);
        cursor += step;
        amount -= step;
        if cursor as u64 == block_end && amount > 0 {
            list_idx += 1;
            if list_idx >= NUM_BLOCKS || blocks[list_idx] == BlockNo::NONE.value() {
                return Err(FsError::InvalidArgument(
                    "seek past the end of the allocated block chain".to_string(),
                ));
            }
            cursor = image::block_offset(blocks[list_idx] as usize) as i64;
        }
    }
    Ok(cursor)
}

/// Repositions `fd`'s cursor. `offset` must be non-negative.
pub fn seek(
    inodes: &[InodeRepr; NUM_INODES],
    open_files: &mut [OpenFileSlotRepr; MAX_FILE_OPEN],
    fd: i32,
    offset: i64,
    whence: Whence,
) -> FsResult<()> {
    if offset < 0 {
        return Err(FsError::InvalidArgument("seek offset must be non-negative".to_string()));
    }
    let slot = slot_index(open_files, fd)?;
    let target = InodeNo::new(open_files[slot].inode);
    let tidx = target.as_index().expect("descriptor always names a live inode");
    let blocks = &inodes[tidx].blocks;
    let start = image::block_offset(blocks[0] as usize) as i64;

    let new_cursor = match whence {
        Whence::Start => advance(blocks, 0, start, offset)?,
        Whence::Current => {
            let idx = list_index_of(blocks, block_value_at(open_files[slot].cursor as u64))
                .ok_or_else(|| {
                    FsError::InvalidArgument("cursor is not within an allocated block".to_string())
                })?;
            advance(blocks, idx, open_files[slot].cursor, offset)?
        }
        Whence::End => {
            let logical = inodes[tidx].size - offset;
            if logical < 0 {
                return Err(FsError::InvalidArgument(
                    "seek offset runs past the start of the file".to_string(),
                ));
            }
            advance(blocks, 0, start, logical)?
        }
    };

    open_files[slot].cursor = new_cursor;
    Ok(())
}

/// Reads `buf.len()` bytes directly from an inode's block list, with no
/// open-file descriptor involved. Used by `copy_file`, which copies whole
/// contents in one step.
pub fn read_via_inode(image: &mut ImageStore, inode: &InodeRepr, buf: &mut [u8]) -> FsResult<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let mut cursor = image::block_offset(inode.blocks[0] as usize) as i64;
    read_bytes(image, &inode.blocks, &mut cursor, buf)
}

/// Writes `bytes` into a freshly created (empty) inode's block list,
/// starting at `blocks[0]`. Used by `copy_file`.
pub fn write_via_inode(
    image: &mut ImageStore,
    inode: &mut InodeRepr,
    bitmap: &mut [i32; NUM_BLOCKS],
    bytes: &[u8],
) -> FsResult<usize> {
    if bytes.is_empty() {
        return Ok(0);
    }
    let mut cursor = image::block_offset(inode.blocks[0] as usize) as i64;
    write_bytes(image, inode, bitmap, &mut cursor, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsim_types::{DirectoryRecord, Permissions, NUM_DIRECTORY_ENTRIES};
    use std::array;

    fn fresh_root_with_file() -> (
        [InodeRepr; NUM_INODES],
        [DirectoryRecord; NUM_INODES],
        [i32; NUM_BLOCKS],
        ImageStore,
        tempfile::TempDir,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let (mut store, _) = ImageStore::open_or_format(&dir.path().join("fs.img"), true).unwrap();

        let mut inodes: [InodeRepr; NUM_INODES] =
            array::from_fn(|i| InodeRepr::free_template(i as i32));
        let mut directories: [DirectoryRecord; NUM_INODES] =
            array::from_fn(|_| DirectoryRecord::EMPTY);
        let mut bitmap = [0; NUM_BLOCKS];

        inodes[0] = InodeRepr::root(0);

        let mut ns = crate::ops::Namespace {
            inodes: &mut inodes,
            directories: &mut directories,
            bitmap: &mut bitmap,
        };
        crate::ops::create_file(&mut ns, b"a", Permissions::all(), InodeNo::ROOT).unwrap();

        (inodes, directories, bitmap, store, dir)
    }

    const _: usize = NUM_DIRECTORY_ENTRIES;

    #[test]
    fn write_then_read_round_trips() {
        let (mut inodes, directories, mut bitmap, mut store, _dir) = fresh_root_with_file();
        let mut open_files = [OpenFileSlotRepr::CLOSED; MAX_FILE_OPEN];

        let fd = open(&inodes, &directories, &mut open_files, b"a", InodeNo::ROOT).unwrap();
        let n = write(&mut store, &mut inodes, &mut bitmap, &mut open_files, fd, b"hello").unwrap();
        assert_eq!(n, 5);

        seek(&inodes, &mut open_files, fd, 0, Whence::Start).unwrap();
        let mut buf = [0_u8; 5];
        let read_n = read(&mut store, &inodes, &mut open_files, fd, &mut buf).unwrap();
        assert_eq!(read_n, 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn overwrite_does_not_double_count_size() {
        let (mut inodes, directories, mut bitmap, mut store, _dir) = fresh_root_with_file();
        let mut open_files = [OpenFileSlotRepr::CLOSED; MAX_FILE_OPEN];
        let fd = open(&inodes, &directories, &mut open_files, b"a", InodeNo::ROOT).unwrap();
        write(&mut store, &mut inodes, &mut bitmap, &mut open_files, fd, b"hello").unwrap();

        seek(&inodes, &mut open_files, fd, 0, Whence::Start).unwrap();
        let n = write(&mut store, &mut inodes, &mut bitmap, &mut open_files, fd, b"H").unwrap();
        assert_eq!(n, 0);
        let idx = InodeNo::new(open_files[slot_index(&open_files, fd).unwrap()].inode)
            .as_index()
            .unwrap();
        assert_eq!(inodes[idx].size, 5);
    }

    #[test]
    fn seek_end_then_append() {
        let (mut inodes, directories, mut bitmap, mut store, _dir) = fresh_root_with_file();
        let mut open_files = [OpenFileSlotRepr::CLOSED; MAX_FILE_OPEN];
        let fd = open(&inodes, &directories, &mut open_files, b"a", InodeNo::ROOT).unwrap();
        write(&mut store, &mut inodes, &mut bitmap, &mut open_files, fd, b"hello").unwrap();

        seek(&inodes, &mut open_files, fd, 0, Whence::End).unwrap();
        let n = write(&mut store, &mut inodes, &mut bitmap, &mut open_files, fd, b" world").unwrap();
        assert_eq!(n, 6);

        seek(&inodes, &mut open_files, fd, 0, Whence::Start).unwrap();
        let mut buf = [0_u8; 11];
        read(&mut store, &inodes, &mut open_files, fd, &mut buf).unwrap();
        assert_eq!(&buf, b"hello world");
    }

    #[test]
    fn close_invalidates_descriptor() {
        let (inodes, directories, _bitmap, _store, _dir) = fresh_root_with_file();
        let mut open_files = [OpenFileSlotRepr::CLOSED; MAX_FILE_OPEN];
        let fd = open(&inodes, &directories, &mut open_files, b"a", InodeNo::ROOT).unwrap();
        close(&mut open_files, fd).unwrap();
        assert!(matches!(close(&mut open_files, fd), Err(FsError::InvalidDescriptor(_))));
    }
}
