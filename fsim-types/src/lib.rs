//! On-disk layout for the fsim filesystem image.
//!
//! The data layout, matching the image bit-for-bit:
//!
//! | region                       | count              | type                 |
//! |------------------------------|--------------------|----------------------|
//! | image handle slot (ignored)  | 1                  | `u64`                |
//! | log handle slot (ignored)    | 1                  | `u64`                |
//! | inode table                  | [`NUM_INODES`]     | [`InodeRepr`]        |
//! | root directory record        | 1 (vestigial)      | [`DirectoryRecord`]  |
//! | per-inode directory table    | [`NUM_INODES`]     | [`DirectoryRecord`]  |
//! | block bitmap                 | [`NUM_BLOCKS`]     | `i32`                |
//! | current directory inode      | 1                  | `i32`                |
//! | open-file table              | [`MAX_FILE_OPEN`]  | [`OpenFileSlotRepr`] |
//!
//! Data blocks immediately follow this blob: block `b` occupies
//! `[size_of::<ControlRegion>() + b * BLOCK_SIZE, .. + BLOCK_SIZE)`.

use core::fmt;

use bitflags::bitflags;
use dataview::Pod;
use strum::{Display, EnumString, FromRepr};

/// Number of data blocks in the image.
pub const NUM_BLOCKS: usize = 1024;
/// Size, in bytes, of a single data block.
pub const BLOCK_SIZE: usize = 512;
/// Number of inodes in the inode table.
pub const NUM_INODES: usize = 256;
/// Number of entries in a directory record.
pub const NUM_DIRECTORY_ENTRIES: usize = 256;
/// Number of simultaneously open files.
pub const MAX_FILE_OPEN: usize = 64;
/// Maximum length, in bytes, of a filename (NUL-padded within this width).
pub const MAX_FILE_NAME: usize = 255;

/// Inode number of the root directory.
pub const ROOT_INODE: i32 = 0;

/// A block index, or [`BlockNo::NONE`] for an unused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Pod)]
#[repr(transparent)]
pub struct BlockNo(i32);

impl BlockNo {
    pub const NONE: Self = Self(-1);

    #[must_use]
    pub const fn new(n: i32) -> Self {
        Self(n)
    }

    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    #[must_use]
    pub fn as_index(self) -> Option<usize> {
        if self.0 < 0 {
            None
        } else {
            Some(self.0 as usize)
        }
    }
}

impl fmt::Display for BlockNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for BlockNo {
    fn default() -> Self {
        Self::NONE
    }
}

/// An inode table index, or [`InodeNo::NONE`] for "no inode".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Pod)]
#[repr(transparent)]
pub struct InodeNo(i32);

impl InodeNo {
    pub const NONE: Self = Self(-1);
    pub const ROOT: Self = Self(ROOT_INODE);

    #[must_use]
    pub const fn new(n: i32) -> Self {
        Self(n)
    }

    #[must_use]
    pub const fn value(self) -> i32 {
        self.0
    }

    #[must_use]
    pub fn as_index(self) -> Option<usize> {
        if self.0 < 0 {
            None
        } else {
            Some(self.0 as usize)
        }
    }
}

impl fmt::Display for InodeNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Default for InodeNo {
    fn default() -> Self {
        Self::NONE
    }
}

/// The type of a filesystem object, encoded the way it is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display)]
#[repr(i16)]
#[strum(serialize_all = "snake_case")]
pub enum InodeType {
    Free = -1,
    Directory = 0,
    File = 1,
    Symlink = 2,
}

impl InodeType {
    #[must_use]
    pub fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

bitflags! {
    /// The coarse three-character permission triple carried by every inode.
    ///
    /// The bit representation is an in-memory convenience; the persisted
    /// form is always the three ASCII bytes `rwx`/`-`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    pub struct Permissions: u8 {
        const READ = 0b100;
        const WRITE = 0b010;
        const EXECUTE = 0b001;
    }
}

impl Permissions {
    #[must_use]
    pub fn to_bytes(self) -> [u8; 3] {
        [
            if self.contains(Self::READ) { b'r' } else { b'-' },
            if self.contains(Self::WRITE) { b'w' } else { b'-' },
            if self.contains(Self::EXECUTE) { b'x' } else { b'-' },
        ]
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 3]) -> Self {
        let mut perms = Self::empty();
        if bytes[0] == b'r' {
            perms |= Self::READ;
        }
        if bytes[1] == b'w' {
            perms |= Self::WRITE;
        }
        if bytes[2] == b'x' {
            perms |= Self::EXECUTE;
        }
        perms
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        write!(f, "{}", core::str::from_utf8(&bytes).unwrap())
    }
}

impl core::str::FromStr for Permissions {
    type Err = InvalidPermissions;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 3
            || !bytes
                .iter()
                .all(|&b| matches!(b, b'r' | b'w' | b'x' | b'-'))
        {
            return Err(InvalidPermissions);
        }
        Ok(Self::from_bytes([bytes[0], bytes[1], bytes[2]]))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidPermissions;

impl fmt::Display for InvalidPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "permissions must be exactly three characters from 'rwx-'")
    }
}

/// Origin for a stream seek, matching the shell's `whence` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, Display, EnumString)]
#[repr(u8)]
pub enum Whence {
    Start = 0,
    End = 1,
    Current = 2,
}

/// An inode, as laid out on disk.
#[derive(Clone, Copy, Pod)]
#[repr(C)]
pub struct InodeRepr {
    pub size: i64,
    pub creation_time: i64,
    pub modification_time: i64,
    pub id: i32,
    pub link_count: i32,
    pub inode_rep_parent: i32,
    pub ty: i16,
    pub permissions: [u8; 3],
    _reserved: [u8; 3],
    pub blocks: [i32; NUM_BLOCKS],
    _reserved_tail: [u8; 4],
}

const _: () = assert!(size_of::<InodeRepr>() == 4144);

impl InodeRepr {
    #[must_use]
    pub fn free_template(id: i32) -> Self {
        Self {
            size: -1,
            creation_time: 0,
            modification_time: 0,
            id,
            link_count: 0,
            inode_rep_parent: -1,
            ty: InodeType::Free as i16,
            permissions: [0; 3],
            _reserved: [0; 3],
            blocks: [BlockNo::NONE.value(); NUM_BLOCKS],
            _reserved_tail: [0; 4],
        }
    }

    /// Builds a freshly allocated, non-free inode: empty block list, zero
    /// size, both timestamps set to `now`. Exists so callers outside this
    /// crate never need functional-update syntax over the reserved padding
    /// fields, which are private.
    #[must_use]
    pub fn allocated(id: i32, ty: InodeType, parent: InodeNo, permissions: Permissions, now: i64) -> Self {
        Self {
            size: 0,
            creation_time: now,
            modification_time: now,
            id,
            link_count: 0,
            inode_rep_parent: parent.value(),
            ty: ty as i16,
            permissions: permissions.to_bytes(),
            _reserved: [0; 3],
            blocks: [BlockNo::NONE.value(); NUM_BLOCKS],
            _reserved_tail: [0; 4],
        }
    }

    /// Builds the root directory inode (id 0, parent 0, `link_count = 1`).
    #[must_use]
    pub fn root(now: i64) -> Self {
        let mut inode = Self::allocated(0, InodeType::Directory, InodeNo::ROOT, Permissions::all(), now);
        inode.link_count = 1;
        inode
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.size == -1
    }

    #[must_use]
    pub fn ty(&self) -> Option<InodeType> {
        InodeType::from_repr(self.ty)
    }

    #[must_use]
    pub fn permissions(&self) -> Permissions {
        Permissions::from_bytes(self.permissions)
    }

    pub fn set_permissions(&mut self, perms: Permissions) {
        self.permissions = perms.to_bytes();
    }
}

/// A single directory entry: a filename paired with the inode it names.
#[derive(Clone, Copy, Pod)]
#[repr(C)]
pub struct DirEntryRepr {
    pub name: [u8; MAX_FILE_NAME],
    _pad: u8,
    pub inode: i32,
}

const _: () = assert!(size_of::<DirEntryRepr>() == 260);

impl DirEntryRepr {
    pub const EMPTY: Self = Self {
        name: [0; MAX_FILE_NAME],
        _pad: 0,
        inode: -1,
    };

    #[must_use]
    pub fn is_empty_slot(&self) -> bool {
        self.inode < 0
    }

    #[must_use]
    pub fn name_len(&self) -> usize {
        self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len())
    }

    #[must_use]
    pub fn name_bytes(&self) -> &[u8] {
        &self.name[..self.name_len()]
    }

    pub fn set_name(&mut self, name: &[u8]) {
        let len = usize::min(name.len(), self.name.len() - 1);
        self.name[..len].copy_from_slice(&name[..len]);
        self.name[len..].fill(0);
    }
}

/// A fixed-capacity table of directory entries backing one directory inode.
#[derive(Clone, Copy, Pod)]
#[repr(C)]
pub struct DirectoryRecord {
    pub entries: [DirEntryRepr; NUM_DIRECTORY_ENTRIES],
}

const _: () = assert!(size_of::<DirectoryRecord>() == 260 * NUM_DIRECTORY_ENTRIES);

impl DirectoryRecord {
    pub const EMPTY: Self = Self {
        entries: [DirEntryRepr::EMPTY; NUM_DIRECTORY_ENTRIES],
    };
}

/// An open-file table slot.
#[derive(Clone, Copy, Pod)]
#[repr(C)]
pub struct OpenFileSlotRepr {
    pub cursor: i64,
    pub inode: i32,
    _reserved: [u8; 4],
}

const _: () = assert!(size_of::<OpenFileSlotRepr>() == 16);

impl OpenFileSlotRepr {
    pub const CLOSED: Self = Self {
        cursor: -1,
        inode: -1,
        _reserved: [0; 4],
    };

    /// Builds an occupied slot. Exists so callers outside this crate never
    /// need functional-update syntax over the private reserved padding.
    #[must_use]
    pub fn new(inode: i32, cursor: i64) -> Self {
        Self {
            cursor,
            inode,
            _reserved: [0; 4],
        }
    }

    #[must_use]
    pub fn is_free(&self) -> bool {
        self.inode < 0
    }
}

/// The full control region, persisted as a single contiguous blob at the
/// head of the image.
#[derive(Clone, Copy, Pod)]
#[repr(C)]
pub struct ControlRegion {
    /// Persisted in the original as a raw `FILE *`; ignored on load.
    _image_handle: u64,
    /// Persisted in the original as a raw `FILE *`; ignored on load.
    _log_handle: u64,
    pub inodes: [InodeRepr; NUM_INODES],
    /// Vestigial: the original stores a standalone root directory record
    /// that duplicates `directories[0]`. Kept for byte-exact layout; never
    /// read from.
    _root_dir: DirectoryRecord,
    pub directories: [DirectoryRecord; NUM_INODES],
    pub bitmap: [i32; NUM_BLOCKS],
    pub current_dir: i32,
    _pad_before_open_files: [u8; 4],
    pub open_files: [OpenFileSlotRepr; MAX_FILE_OPEN],
}

const _: () = assert!(size_of::<ControlRegion>() % 8 == 0);

impl ControlRegion {
    #[must_use]
    pub fn region_size() -> usize {
        size_of::<Self>()
    }
}
