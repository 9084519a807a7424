//! Path resolution.
//!
//! A path is tokenized on `/`; empty tokens (leading, trailing, or doubled
//! slashes) are skipped. `.` is a no-op, `..` moves to the current inode's
//! parent, anything else is a directory lookup. Resolution never follows a
//! symlink: the inode of the link itself is returned if that's where
//! resolution lands.

use fsim_types::{DirectoryRecord, InodeNo, InodeRepr, InodeType, NUM_INODES};

use crate::directory;
use crate::error::{FsError, FsResult};

/// Resolves `path` starting from `start`. An absolute path (leading `/`)
/// starts from the root inode instead.
pub fn resolve(
    path: &str,
    start: InodeNo,
    inodes: &[InodeRepr; NUM_INODES],
    directories: &[DirectoryRecord; NUM_INODES],
) -> FsResult<InodeNo> {
    let mut current = if path.starts_with('/') {
        InodeNo::ROOT
    } else {
        start
    };

    for token in path.split('/').filter(|t| !t.is_empty()) {
        current = match token {
            "." => current,
            ".." => {
                let idx = current
                    .as_index()
                    .filter(|&i| i < NUM_INODES)
                    .ok_or_else(|| FsError::InvalidArgument(format!("bad inode {current}")))?;
                InodeNo::new(inodes[idx].inode_rep_parent)
            }
            name => {
                let idx = current
                    .as_index()
                    .filter(|&i| i < NUM_INODES)
                    .ok_or_else(|| FsError::InvalidArgument(format!("bad inode {current}")))?;
                if inodes[idx].ty() != Some(InodeType::Directory) {
                    return Err(FsError::WrongType(format!(
                        "{token} has no parent directory to search"
                    )));
                }
                directory::find_inode(name.as_bytes(), &directories[idx])
                    .ok_or_else(|| FsError::NotFound(token.to_string()))?
            }
        };
    }

    Ok(current)
}

/// Splits `path` into a parent path and the final component name, resolving
/// the parent to an inode. `resolve(".", start, ..)` is used for a bare
/// final component (no `/` in `path`), matching relative-to-`start` lookup.
pub fn resolve_parent(
    path: &str,
    start: InodeNo,
    inodes: &[InodeRepr; NUM_INODES],
    directories: &[DirectoryRecord; NUM_INODES],
) -> FsResult<(InodeNo, String)> {
    let trimmed = path.trim_end_matches('/');
    let (parent_path, name) = match trimmed.rfind('/') {
        Some(pos) => (&trimmed[..=pos], &trimmed[pos + 1..]),
        None => ("", trimmed),
    };
    if name.is_empty() {
        return Err(FsError::InvalidArgument(format!("empty path component in {path}")));
    }
    let parent = if parent_path.is_empty() {
        start
    } else {
        resolve(parent_path, start, inodes, directories)?
    };
    Ok((parent, name.to_string()))
}

/// Builds the absolute path of `dir`, walking `inode_rep_parent` links up
/// to root and looking up each step's name in its parent's directory
/// record. Always begins with `/`; the root itself is `"/"`.
#[must_use]
pub fn full_path(
    dir: InodeNo,
    inodes: &[InodeRepr; NUM_INODES],
    directories: &[DirectoryRecord; NUM_INODES],
) -> String {
    let mut components = Vec::new();
    let mut current = dir;

    for _ in 0..NUM_INODES {
        let Some(idx) = current.as_index().filter(|&i| i < NUM_INODES) else {
            break;
        };
        if idx == 0 {
            break;
        }
        let parent = InodeNo::new(inodes[idx].inode_rep_parent);
        let Some(pidx) = parent.as_index().filter(|&i| i < NUM_INODES) else {
            break;
        };
        let name = directory::entries(&directories[pidx])
            .find(|&(_, i)| i == current)
            .map(|(n, _)| String::from_utf8_lossy(n).into_owned())
            .unwrap_or_else(|| "?".to_string());
        components.push(name);
        current = parent;
    }

    components.reverse();
    format!("/{}", components.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fsim_types::InodeNo;

    fn empty_state() -> ([InodeRepr; NUM_INODES], [DirectoryRecord; NUM_INODES]) {
        let mut inodes: [InodeRepr; NUM_INODES] =
            std::array::from_fn(|i| InodeRepr::free_template(i as i32));
        inodes[0] = InodeRepr::root(0);
        let directories: [DirectoryRecord; NUM_INODES] =
            std::array::from_fn(|_| DirectoryRecord::EMPTY);
        (inodes, directories)
    }

    #[test]
    fn absolute_root_resolves_to_zero() {
        let (inodes, directories) = empty_state();
        assert_eq!(
            resolve("/", InodeNo::new(5), &inodes, &directories).unwrap(),
            InodeNo::ROOT
        );
    }

    #[test]
    fn dot_dot_from_root_stays_at_root() {
        let (inodes, directories) = empty_state();
        assert_eq!(
            resolve("..", InodeNo::ROOT, &inodes, &directories).unwrap(),
            InodeNo::ROOT
        );
    }

    #[test]
    fn missing_component_is_not_found() {
        let (inodes, directories) = empty_state();
        assert!(matches!(
            resolve("/nope", InodeNo::ROOT, &inodes, &directories),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn resolve_parent_splits_trailing_component() {
        let (mut inodes, mut directories) = empty_state();
        inodes[1].ty = InodeType::Directory as i16;
        inodes[1].inode_rep_parent = 0;
        directory::insert(&mut directories[0], b"home", InodeNo::new(1)).unwrap();
        let (parent, name) =
            resolve_parent("/home/file.txt", InodeNo::ROOT, &inodes, &directories).unwrap();
        assert_eq!(parent, InodeNo::new(1));
        assert_eq!(name, "file.txt");
    }

    #[test]
    fn full_path_walks_up_to_root() {
        let (mut inodes, mut directories) = empty_state();
        inodes[1].ty = InodeType::Directory as i16;
        inodes[1].inode_rep_parent = 0;
        directory::insert(&mut directories[0], b"home", InodeNo::new(1)).unwrap();
        assert_eq!(full_path(InodeNo::new(1), &inodes, &directories), "/home");
        assert_eq!(full_path(InodeNo::ROOT, &inodes, &directories), "/");
    }

    #[test]
    fn resolve_parent_bare_name_uses_start() {
        let (inodes, directories) = empty_state();
        let (parent, name) =
            resolve_parent("file.txt", InodeNo::new(7), &inodes, &directories).unwrap();
        assert_eq!(parent, InodeNo::new(7));
        assert_eq!(name, "file.txt");
    }
}
