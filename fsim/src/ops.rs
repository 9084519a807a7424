//! Namespace operations: create, delete, move, copy, and link files and
//! directories. Each function takes the pieces of the control region it
//! needs by mutable reference rather than a whole [`crate::fs::FileSystem`],
//! so the orchestration of save/load stays in `fs.rs`.

use fsim_types::{
    BlockNo, DirectoryRecord, InodeNo, InodeRepr, InodeType, Permissions, BLOCK_SIZE, NUM_BLOCKS,
    NUM_INODES,
};

use crate::directory;
use crate::error::{FsError, FsResult};
use crate::image::ImageStore;
use crate::inode::{self, now};
use crate::{alloc, stream};

/// Everything the namespace layer touches on every call.
pub struct Namespace<'a> {
    pub inodes: &'a mut [InodeRepr; NUM_INODES],
    pub directories: &'a mut [DirectoryRecord; NUM_INODES],
    pub bitmap: &'a mut [i32; NUM_BLOCKS],
}

fn require_directory(inodes: &[InodeRepr; NUM_INODES], dir: InodeNo) -> FsResult<usize> {
    let idx = dir
        .as_index()
        .filter(|&i| i < NUM_INODES)
        .ok_or_else(|| FsError::InvalidArgument(format!("bad inode {dir}")))?;
    if inodes[idx].ty() != Some(InodeType::Directory) {
        return Err(FsError::WrongType(format!("inode {dir} is not a directory")));
    }
    Ok(idx)
}

fn require_permission(inode: &InodeRepr, required: Permissions, what: &str) -> FsResult<()> {
    if inode.permissions().contains(required) {
        Ok(())
    } else {
        Err(FsError::PermissionDenied(what.to_string()))
    }
}

pub fn create_file(
    ns: &mut Namespace<'_>,
    name: &[u8],
    perms: Permissions,
    parent_dir: InodeNo,
) -> FsResult<InodeNo> {
    let pidx = require_directory(ns.inodes, parent_dir)?;
    require_permission(&ns.inodes[pidx], Permissions::WRITE, "create file in directory")?;
    if directory::find_inode(name, &ns.directories[pidx]).is_some() {
        return Err(FsError::Exists(String::from_utf8_lossy(name).into_owned()));
    }

    let new_inode = inode::allocate_inode(ns.inodes, InodeType::File, parent_dir, perms)?;

    let block = match alloc::allocate_block(ns.bitmap) {
        Ok(b) => b,
        Err(e) => {
            inode::free_inode(ns.inodes, new_inode)?;
            return Err(e);
        }
    };

    let nidx = new_inode.as_index().expect("just allocated");
    if let Err(e) = directory::insert(&mut ns.directories[pidx], name, new_inode) {
        alloc::free_block(ns.bitmap, block)?;
        inode::free_inode(ns.inodes, new_inode)?;
        return Err(e);
    }

    ns.inodes[nidx].blocks[0] = block.value();
    ns.inodes[nidx].link_count = 1;
    Ok(new_inode)
}

/// Removes `name` from `parent_dir`. Since a file may be hard-linked under
/// other names, the inode (and its blocks) is only released once its last
/// referencing entry is gone.
pub fn delete_file(ns: &mut Namespace<'_>, name: &[u8], parent_dir: InodeNo) -> FsResult<()> {
    let pidx = require_directory(ns.inodes, parent_dir)?;
    let target = directory::find_inode(name, &ns.directories[pidx])
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).into_owned()))?;
    let tidx = target.as_index().expect("found via directory entry");
    match ns.inodes[tidx].ty() {
        Some(InodeType::File | InodeType::Symlink) => {}
        _ => return Err(FsError::WrongType(format!("{target} is not a file or symlink"))),
    }

    directory::remove(&mut ns.directories[pidx], name, target)?;
    ns.inodes[tidx].link_count -= 1;

    if ns.inodes[tidx].link_count <= 0 {
        for slot in ns.inodes[tidx].blocks {
            if BlockNo::new(slot).as_index().is_some() {
                alloc::free_block(ns.bitmap, BlockNo::new(slot))?;
            }
        }
        inode::free_inode(ns.inodes, target)?;
    }
    Ok(())
}

pub fn create_directory(
    ns: &mut Namespace<'_>,
    name: &[u8],
    parent_dir: InodeNo,
) -> FsResult<InodeNo> {
    let pidx = require_directory(ns.inodes, parent_dir)?;
    require_permission(&ns.inodes[pidx], Permissions::WRITE, "create directory in directory")?;
    if directory::find_inode(name, &ns.directories[pidx]).is_some() {
        return Err(FsError::Exists(String::from_utf8_lossy(name).into_owned()));
    }

    let new_inode = inode::allocate_inode(
        ns.inodes,
        InodeType::Directory,
        parent_dir,
        Permissions::all(),
    )?;
    if let Err(e) = directory::insert(&mut ns.directories[pidx], name, new_inode) {
        inode::free_inode(ns.inodes, new_inode)?;
        return Err(e);
    }

    let nidx = new_inode.as_index().expect("just allocated");
    ns.inodes[nidx].link_count = 1;
    ns.directories[nidx] = DirectoryRecord::EMPTY;
    Ok(new_inode)
}

pub fn delete_directory(ns: &mut Namespace<'_>, name: &[u8], parent_dir: InodeNo) -> FsResult<()> {
    let pidx = require_directory(ns.inodes, parent_dir)?;
    let target = directory::find_inode(name, &ns.directories[pidx])
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).into_owned()))?;
    let tidx = target.as_index().expect("found via directory entry");
    if ns.inodes[tidx].ty() != Some(InodeType::Directory) {
        return Err(FsError::WrongType(format!("{target} is not a directory")));
    }
    require_permission(&ns.inodes[tidx], Permissions::WRITE, "delete directory")?;

    let children: Vec<(Vec<u8>, InodeNo)> = directory::entries(&ns.directories[tidx])
        .map(|(n, i)| (n.to_vec(), i))
        .collect();
    for (child_name, child_inode) in children {
        let cidx = child_inode.as_index().expect("directory entry always valid");
        match ns.inodes[cidx].ty() {
            Some(InodeType::Directory) => delete_directory(ns, &child_name, target)?,
            _ => delete_file(ns, &child_name, target)?,
        }
    }

    for slot in ns.inodes[tidx].blocks {
        if BlockNo::new(slot).as_index().is_some() {
            alloc::free_block(ns.bitmap, BlockNo::new(slot))?;
        }
    }

    directory::remove(&mut ns.directories[pidx], name, target)?;
    inode::free_inode(ns.inodes, target)?;
    Ok(())
}

pub fn move_directory(
    ns: &mut Namespace<'_>,
    name: &[u8],
    src_parent: InodeNo,
    dst_parent: InodeNo,
) -> FsResult<()> {
    let spidx = require_directory(ns.inodes, src_parent)?;
    let dpidx = require_directory(ns.inodes, dst_parent)?;
    require_permission(&ns.inodes[spidx], Permissions::WRITE, "move from directory")?;
    require_permission(&ns.inodes[dpidx], Permissions::WRITE, "move into directory")?;

    let target = directory::find_inode(name, &ns.directories[spidx])
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).into_owned()))?;
    let tidx = target.as_index().expect("found via directory entry");
    if ns.inodes[tidx].ty() != Some(InodeType::Directory) {
        return Err(FsError::WrongType(format!("{target} is not a directory")));
    }
    if directory::find_inode(name, &ns.directories[dpidx]).is_some() {
        return Err(FsError::Exists(String::from_utf8_lossy(name).into_owned()));
    }

    directory::insert(&mut ns.directories[dpidx], name, target)?;
    directory::remove(&mut ns.directories[spidx], name, target)?;
    ns.inodes[tidx].inode_rep_parent = dst_parent.value();
    ns.inodes[tidx].modification_time = now();
    Ok(())
}

/// Same shape as [`move_directory`] but for file/symlink inodes.
///
/// `inode_rep_parent` is left untouched: with hard links the back-reference
/// is already ambiguous, so the move does not attempt to repoint it.
pub fn move_file(
    ns: &mut Namespace<'_>,
    name: &[u8],
    src_parent: InodeNo,
    dst_parent: InodeNo,
) -> FsResult<()> {
    let spidx = require_directory(ns.inodes, src_parent)?;
    let dpidx = require_directory(ns.inodes, dst_parent)?;
    require_permission(&ns.inodes[spidx], Permissions::WRITE, "move from directory")?;
    require_permission(&ns.inodes[dpidx], Permissions::WRITE, "move into directory")?;

    let target = directory::find_inode(name, &ns.directories[spidx])
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).into_owned()))?;
    let tidx = target.as_index().expect("found via directory entry");
    match ns.inodes[tidx].ty() {
        Some(InodeType::File | InodeType::Symlink) => {}
        _ => return Err(FsError::WrongType(format!("{target} is not a file or symlink"))),
    }
    if directory::find_inode(name, &ns.directories[dpidx]).is_some() {
        return Err(FsError::Exists(String::from_utf8_lossy(name).into_owned()));
    }

    directory::insert(&mut ns.directories[dpidx], name, target)?;
    directory::remove(&mut ns.directories[spidx], name, target)?;
    ns.inodes[tidx].modification_time = now();
    Ok(())
}

pub fn copy_file(
    ns: &mut Namespace<'_>,
    image: &mut ImageStore,
    src_name: &[u8],
    new_name: &[u8],
    src_parent: InodeNo,
    dst_parent: InodeNo,
) -> FsResult<InodeNo> {
    let spidx = require_directory(ns.inodes, src_parent)?;
    let dpidx = require_directory(ns.inodes, dst_parent)?;

    let src = directory::find_inode(src_name, &ns.directories[spidx])
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(src_name).into_owned()))?;
    let sidx = src.as_index().expect("found via directory entry");
    require_permission(&ns.inodes[sidx], Permissions::READ, "read source file")?;
    if directory::find_inode(new_name, &ns.directories[dpidx]).is_some() {
        return Err(FsError::Exists(String::from_utf8_lossy(new_name).into_owned()));
    }

    let perms = ns.inodes[sidx].permissions();
    let size = ns.inodes[sidx].size.max(0) as usize;
    let dst = create_file(ns, new_name, perms, dst_parent)?;

    // copy_file reads and writes directly through the inode's block list
    // rather than the open-file table: the copy is one atomic step from the
    // namespace layer's point of view, with no descriptor outliving it.
    let mut buf = vec![0_u8; size];
    let n_read = stream::read_via_inode(image, &ns.inodes[sidx], &mut buf)?;
    let dst_idx = dst.as_index().expect("just created");
    let n_written =
        stream::write_via_inode(image, &mut ns.inodes[dst_idx], ns.bitmap, &buf[..n_read])?;
    inode::bump_ancestor_sizes(ns.inodes, dst_parent, n_written as i64)?;

    Ok(dst)
}

pub fn copy_directory(
    ns: &mut Namespace<'_>,
    image: &mut ImageStore,
    src_name: &[u8],
    new_name: &[u8],
    src_parent: InodeNo,
    dst_parent: InodeNo,
) -> FsResult<InodeNo> {
    let spidx = require_directory(ns.inodes, src_parent)?;
    let src = directory::find_inode(src_name, &ns.directories[spidx])
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(src_name).into_owned()))?;
    let sidx = src.as_index().expect("found via directory entry");
    if ns.inodes[sidx].ty() != Some(InodeType::Directory) {
        return Err(FsError::WrongType(format!("{src} is not a directory")));
    }

    let dst = create_directory(ns, new_name, dst_parent)?;

    let children: Vec<(Vec<u8>, InodeNo)> = directory::entries(&ns.directories[sidx])
        .map(|(n, i)| (n.to_vec(), i))
        .collect();
    for (child_name, child_inode) in children {
        let cidx = child_inode.as_index().expect("directory entry always valid");
        match ns.inodes[cidx].ty() {
            Some(InodeType::Directory) => {
                copy_directory(ns, image, &child_name, &child_name, src, dst)?;
            }
            _ => {
                copy_file(ns, image, &child_name, &child_name, src, dst)?;
            }
        }
    }

    Ok(dst)
}

pub fn create_hard_link(
    ns: &mut Namespace<'_>,
    link_name: &[u8],
    target_name: &[u8],
    src_parent: InodeNo,
    dst_parent: InodeNo,
) -> FsResult<()> {
    let spidx = require_directory(ns.inodes, src_parent)?;
    let dpidx = require_directory(ns.inodes, dst_parent)?;

    let target = directory::find_inode(target_name, &ns.directories[spidx])
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(target_name).into_owned()))?;
    if directory::find_inode(link_name, &ns.directories[dpidx]).is_some() {
        return Err(FsError::Exists(String::from_utf8_lossy(link_name).into_owned()));
    }

    directory::insert(&mut ns.directories[dpidx], link_name, target)?;
    let tidx = target.as_index().expect("found via directory entry");
    ns.inodes[tidx].link_count += 1;
    Ok(())
}

pub fn create_symbolic_link(
    ns: &mut Namespace<'_>,
    image: &mut ImageStore,
    link_name: &[u8],
    target_path: &str,
    parent: InodeNo,
) -> FsResult<InodeNo> {
    let pidx = require_directory(ns.inodes, parent)?;
    if directory::find_inode(link_name, &ns.directories[pidx]).is_some() {
        return Err(FsError::Exists(String::from_utf8_lossy(link_name).into_owned()));
    }
    crate::path::resolve(target_path, parent, ns.inodes, ns.directories)?;

    let new_inode = inode::allocate_inode(ns.inodes, InodeType::Symlink, parent, Permissions::all())?;
    let block = match alloc::allocate_block(ns.bitmap) {
        Ok(b) => b,
        Err(e) => {
            inode::free_inode(ns.inodes, new_inode)?;
            return Err(e);
        }
    };
    if let Err(e) = directory::insert(&mut ns.directories[pidx], link_name, new_inode) {
        alloc::free_block(ns.bitmap, block)?;
        inode::free_inode(ns.inodes, new_inode)?;
        return Err(e);
    }

    let bytes = target_path.as_bytes();
    let block_index = block.as_index().expect("just allocated");
    let base = crate::image::block_offset(block_index);
    for (i, &b) in bytes.iter().enumerate() {
        image.write_byte(base + i as u64, b)?;
    }
    image.write_byte(base + bytes.len() as u64, 0)?;

    let nidx = new_inode.as_index().expect("just allocated");
    ns.inodes[nidx].blocks[0] = block.value();
    ns.inodes[nidx].size = bytes.len() as i64 + 1;
    ns.inodes[nidx].link_count = 1;
    Ok(new_inode)
}

pub fn change_permissions(
    ns: &mut Namespace<'_>,
    name: &[u8],
    new_perms: Permissions,
    parent: InodeNo,
) -> FsResult<()> {
    let pidx = require_directory(ns.inodes, parent)?;
    let target = directory::find_inode(name, &ns.directories[pidx])
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).into_owned()))?;
    let tidx = target.as_index().expect("found via directory entry");
    ns.inodes[tidx].set_permissions(new_perms);
    ns.inodes[tidx].modification_time = now();
    Ok(())
}

const _: () = assert!(BLOCK_SIZE > 0);

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_state() -> (
        [InodeRepr; NUM_INODES],
        [DirectoryRecord; NUM_INODES],
        [i32; NUM_BLOCKS],
    ) {
        let mut inodes: [InodeRepr; NUM_INODES] =
            std::array::from_fn(|i| InodeRepr::free_template(i as i32));
        inodes[0] = InodeRepr::root(0);
        let directories: [DirectoryRecord; NUM_INODES] =
            std::array::from_fn(|_| DirectoryRecord::EMPTY);
        let bitmap = [0; NUM_BLOCKS];
        (inodes, directories, bitmap)
    }

    #[test]
    fn create_then_delete_file_returns_resources() {
        let (mut inodes, mut directories, mut bitmap) = fresh_state();
        let mut ns = Namespace {
            inodes: &mut inodes,
            directories: &mut directories,
            bitmap: &mut bitmap,
        };
        let used_before = ns.bitmap.iter().filter(|&&b| b == 1).count();
        create_file(&mut ns, b"a", Permissions::READ | Permissions::WRITE, InodeNo::ROOT).unwrap();
        assert!(directory::find_inode(b"a", &ns.directories[0]).is_some());

        delete_file(&mut ns, b"a", InodeNo::ROOT).unwrap();
        assert!(directory::find_inode(b"a", &ns.directories[0]).is_none());
        let used_after = ns.bitmap.iter().filter(|&&b| b == 1).count();
        assert_eq!(used_before, used_after);
    }

    #[test]
    fn create_file_name_clash_is_exists() {
        let (mut inodes, mut directories, mut bitmap) = fresh_state();
        let mut ns = Namespace {
            inodes: &mut inodes,
            directories: &mut directories,
            bitmap: &mut bitmap,
        };
        create_file(&mut ns, b"a", Permissions::all(), InodeNo::ROOT).unwrap();
        assert!(matches!(
            create_file(&mut ns, b"a", Permissions::all(), InodeNo::ROOT),
            Err(FsError::Exists(_))
        ));
    }

    #[test]
    fn mkdir_then_remdir_round_trips() {
        let (mut inodes, mut directories, mut bitmap) = fresh_state();
        let mut ns = Namespace {
            inodes: &mut inodes,
            directories: &mut directories,
            bitmap: &mut bitmap,
        };
        create_directory(&mut ns, b"d", InodeNo::ROOT).unwrap();
        assert!(directory::find_inode(b"d", &ns.directories[0]).is_some());
        delete_directory(&mut ns, b"d", InodeNo::ROOT).unwrap();
        assert!(directory::find_inode(b"d", &ns.directories[0]).is_none());
    }

    #[test]
    fn hard_link_increments_link_count() {
        let (mut inodes, mut directories, mut bitmap) = fresh_state();
        let mut ns = Namespace {
            inodes: &mut inodes,
            directories: &mut directories,
            bitmap: &mut bitmap,
        };
        let a = create_file(&mut ns, b"a", Permissions::all(), InodeNo::ROOT).unwrap();
        create_hard_link(&mut ns, b"b", b"a", InodeNo::ROOT, InodeNo::ROOT).unwrap();
        let idx = a.as_index().unwrap();
        assert_eq!(ns.inodes[idx].link_count, 2);
        assert_eq!(
            directory::find_inode(b"b", &ns.directories[0]),
            Some(a)
        );
    }

    #[test]
    fn delete_file_keeps_inode_alive_while_a_link_remains() {
        let (mut inodes, mut directories, mut bitmap) = fresh_state();
        let mut ns = Namespace {
            inodes: &mut inodes,
            directories: &mut directories,
            bitmap: &mut bitmap,
        };
        create_file(&mut ns, b"a", Permissions::all(), InodeNo::ROOT).unwrap();
        create_hard_link(&mut ns, b"b", b"a", InodeNo::ROOT, InodeNo::ROOT).unwrap();
        delete_file(&mut ns, b"a", InodeNo::ROOT).unwrap();

        let b_inode = directory::find_inode(b"b", &ns.directories[0]).unwrap();
        assert!(!ns.inodes[b_inode.as_index().unwrap()].is_free());
        assert_eq!(ns.inodes[b_inode.as_index().unwrap()].link_count, 1);
    }

    #[test]
    fn move_file_leaves_parent_back_reference_untouched() {
        let (mut inodes, mut directories, mut bitmap) = fresh_state();
        let mut ns = Namespace {
            inodes: &mut inodes,
            directories: &mut directories,
            bitmap: &mut bitmap,
        };
        create_directory(&mut ns, b"d", InodeNo::ROOT).unwrap();
        let d = directory::find_inode(b"d", &ns.directories[0]).unwrap();
        let a = create_file(&mut ns, b"a", Permissions::all(), InodeNo::ROOT).unwrap();
        move_file(&mut ns, b"a", InodeNo::ROOT, d).unwrap();
        let idx = a.as_index().unwrap();
        assert_eq!(ns.inodes[idx].inode_rep_parent, 0);
        assert!(directory::find_inode(b"a", &ns.directories[d.as_index().unwrap()]).is_some());
    }
}
