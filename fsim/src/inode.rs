//! The inode table.
//!
//! A fixed array of [`NUM_INODES`] inodes. Free inodes are marked by
//! `size == -1`. Allocation scans for the first free slot; freeing resets
//! the slot to the free template. Callers must have already released an
//! inode's blocks and removed its directory entries before freeing it.

use std::time::{SystemTime, UNIX_EPOCH};

use fsim_types::{InodeNo, InodeRepr, InodeType, Permissions, NUM_INODES};

use crate::error::{FsError, FsResult};

#[must_use]
pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Scans for the first free inode and reserves it with the given type and
/// permissions, leaving its block list empty.
pub fn allocate_inode(
    inodes: &mut [InodeRepr; NUM_INODES],
    ty: InodeType,
    parent: InodeNo,
    permissions: Permissions,
) -> FsResult<InodeNo> {
    let Some(index) = inodes.iter().position(InodeRepr::is_free) else {
        return Err(FsError::OutOfInodes);
    };
    let t = now();
    inodes[index] = InodeRepr::allocated(index as i32, ty, parent, permissions, t);
    Ok(InodeNo::new(index as i32))
}

/// Resets an inode back to the free template. The caller must already have
/// freed its data blocks and removed its directory entries.
pub fn free_inode(inodes: &mut [InodeRepr; NUM_INODES], inode: InodeNo) -> FsResult<()> {
    let index = inode
        .as_index()
        .filter(|&i| i < NUM_INODES)
        .ok_or_else(|| FsError::InvalidArgument(format!("bad inode index {inode}")))?;
    inodes[index] = InodeRepr::free_template(index as i32);
    Ok(())
}

pub fn get(inodes: &[InodeRepr; NUM_INODES], inode: InodeNo) -> FsResult<&InodeRepr> {
    let index = inode
        .as_index()
        .filter(|&i| i < NUM_INODES)
        .ok_or_else(|| FsError::InvalidArgument(format!("bad inode index {inode}")))?;
    Ok(&inodes[index])
}

pub fn get_mut(inodes: &mut [InodeRepr; NUM_INODES], inode: InodeNo) -> FsResult<&mut InodeRepr> {
    let index = inode
        .as_index()
        .filter(|&i| i < NUM_INODES)
        .ok_or_else(|| FsError::InvalidArgument(format!("bad inode index {inode}")))?;
    Ok(&mut inodes[index])
}

/// Bumps `size` on every directory from `start` up to and including root,
/// following `inode_rep_parent` links. Used after a stream write to charge
/// newly-written bytes to the whole containing path, matching the way the
/// original accounts directory sizes.
pub fn bump_ancestor_sizes(
    inodes: &mut [InodeRepr; NUM_INODES],
    start: InodeNo,
    delta: i64,
) -> FsResult<()> {
    if delta == 0 {
        return Ok(());
    }
    let mut current = start;
    for _ in 0..NUM_INODES {
        let idx = current
            .as_index()
            .filter(|&i| i < NUM_INODES)
            .ok_or_else(|| FsError::InvalidArgument(format!("bad inode {current}")))?;
        inodes[idx].size += delta;
        if idx == 0 {
            return Ok(());
        }
        current = InodeNo::new(inodes[idx].inode_rep_parent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsim_types::BlockNo;

    #[test]
    fn allocate_then_free_returns_to_free_template() {
        let mut inodes = std::array::from_fn(|i| InodeRepr::free_template(i as i32));
        let ino = allocate_inode(
            &mut inodes,
            InodeType::File,
            InodeNo::ROOT,
            Permissions::READ | Permissions::WRITE,
        )
        .unwrap();
        assert!(!inodes[ino.as_index().unwrap()].is_free());

        free_inode(&mut inodes, ino).unwrap();
        assert!(inodes[ino.as_index().unwrap()].is_free());
        assert_eq!(
            inodes[ino.as_index().unwrap()].blocks[0],
            BlockNo::NONE.value()
        );
    }

    #[test]
    fn exhaustion_is_out_of_inodes() {
        let mut inodes: [InodeRepr; NUM_INODES] =
            std::array::from_fn(|i| InodeRepr::free_template(i as i32));
        for _ in 0..NUM_INODES {
            allocate_inode(&mut inodes, InodeType::File, InodeNo::ROOT, Permissions::READ)
                .unwrap();
        }
        assert!(matches!(
            allocate_inode(&mut inodes, InodeType::File, InodeNo::ROOT, Permissions::READ),
            Err(FsError::OutOfInodes)
        ));
    }
}
