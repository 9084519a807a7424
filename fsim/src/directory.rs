//! The directory table.
//!
//! Each directory inode owns exactly one [`DirectoryRecord`] at the matching
//! index in the control region's `directories` array. Entries are unordered;
//! lookup and insertion are both linear scans.

use fsim_types::{DirEntryRepr, DirectoryRecord, InodeNo, MAX_FILE_NAME};

use crate::error::{FsError, FsResult};

/// Finds the inode named `name` in `record`, by exact byte-wise equality.
#[must_use]
pub fn find_inode(name: &[u8], record: &DirectoryRecord) -> Option<InodeNo> {
    record
        .entries
        .iter()
        .find(|e| !e.is_empty_slot() && e.name_bytes() == name)
        .map(|e| InodeNo::new(e.inode))
}

/// Finds the first empty slot in `record`.
fn find_free_slot(record: &DirectoryRecord) -> FsResult<usize> {
    record
        .entries
        .iter()
        .position(DirEntryRepr::is_empty_slot)
        .ok_or(FsError::OutOfEntries)
}

/// Inserts `(name, inode)` into the first free slot of `record`.
///
/// `name` longer than [`MAX_FILE_NAME`] - 1 bytes is truncated; the stored
/// name is always NUL-terminated within the field.
pub fn insert(record: &mut DirectoryRecord, name: &[u8], inode: InodeNo) -> FsResult<()> {
    let slot = find_free_slot(record)?;
    let entry = &mut record.entries[slot];
    entry.set_name(name);
    entry.inode = inode.value();
    Ok(())
}

/// Removes the entry matching both `name` and `inode` from `record`.
///
/// Matching on both, rather than name alone, leaves other hard-linked names
/// for the same inode untouched.
pub fn remove(record: &mut DirectoryRecord, name: &[u8], inode: InodeNo) -> FsResult<()> {
    let slot = record
        .entries
        .iter()
        .position(|e| !e.is_empty_slot() && e.inode == inode.value() && e.name_bytes() == name)
        .ok_or_else(|| FsError::NotFound(String::from_utf8_lossy(name).into_owned()))?;
    record.entries[slot] = DirEntryRepr::EMPTY;
    Ok(())
}

/// Whether `record` has no occupied entries.
#[must_use]
pub fn is_empty(record: &DirectoryRecord) -> bool {
    record.entries.iter().all(DirEntryRepr::is_empty_slot)
}

/// Lists `(name, inode)` pairs for every occupied entry, in table order.
pub fn entries(record: &DirectoryRecord) -> impl Iterator<Item = (&[u8], InodeNo)> {
    record
        .entries
        .iter()
        .filter(|e| !e.is_empty_slot())
        .map(|e| (e.name_bytes(), InodeNo::new(e.inode)))
}

const _: () = assert!(MAX_FILE_NAME > 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find_round_trips() {
        let mut record = DirectoryRecord::EMPTY;
        insert(&mut record, b"hello", InodeNo::new(3)).unwrap();
        assert_eq!(find_inode(b"hello", &record), Some(InodeNo::new(3)));
        assert_eq!(find_inode(b"nope", &record), None);
    }

    #[test]
    fn remove_matches_name_and_inode() {
        let mut record = DirectoryRecord::EMPTY;
        insert(&mut record, b"a", InodeNo::new(5)).unwrap();
        insert(&mut record, b"b", InodeNo::new(5)).unwrap();
        remove(&mut record, b"a", InodeNo::new(5)).unwrap();
        assert_eq!(find_inode(b"a", &record), None);
        assert_eq!(find_inode(b"b", &record), Some(InodeNo::new(5)));
    }

    #[test]
    fn remove_wrong_inode_fails() {
        let mut record = DirectoryRecord::EMPTY;
        insert(&mut record, b"a", InodeNo::new(5)).unwrap();
        assert!(remove(&mut record, b"a", InodeNo::new(9)).is_err());
    }

    #[test]
    fn is_empty_reflects_occupancy() {
        let mut record = DirectoryRecord::EMPTY;
        assert!(is_empty(&record));
        insert(&mut record, b"x", InodeNo::new(1)).unwrap();
        assert!(!is_empty(&record));
    }

    #[test]
    fn exhaustion_is_out_of_entries() {
        let mut record = DirectoryRecord::EMPTY;
        for i in 0..fsim_types::NUM_DIRECTORY_ENTRIES {
            insert(&mut record, format!("f{i}").as_bytes(), InodeNo::new(i as i32)).unwrap();
        }
        assert!(matches!(
            insert(&mut record, b"overflow", InodeNo::new(0)),
            Err(FsError::OutOfEntries)
        ));
    }
}
