//! The top-level filesystem handle: threads the image store, the in-memory
//! control region, and the current-directory cursor through one value that
//! shell commands borrow mutably for the duration of a command.

use std::path::Path;

use fsim_types::{ControlRegion, DirectoryRecord, InodeNo, InodeRepr};

use crate::error::FsResult;
use crate::image::ImageStore;
use crate::inode;
use crate::ops::{self, Namespace};

pub struct FileSystem {
    image: ImageStore,
    region: Box<ControlRegion>,
}

impl FileSystem {
    /// Opens `path`, formatting a fresh image if it's missing or `force_init`
    /// is set. A freshly formatted image is seeded with `/usr`, `/home`, and
    /// `/usr/local`, and the current directory starts at `/home`.
    pub fn open(path: &Path, force_init: bool) -> FsResult<Self> {
        let (mut image, fresh) = ImageStore::open_or_format(path, force_init)?;
        image.lock_exclusive()?;

        let region = if fresh {
            Self::format_region()
        } else {
            image.load_control_region()?
        };

        let mut fs = Self { image, region };
        if fresh {
            fs.seed_initial_layout()?;
            fs.save()?;
        }
        Ok(fs)
    }

    fn format_region() -> Box<ControlRegion> {
        let mut region = crate::image::zeroed_control_region();
        for (i, slot) in region.inodes.iter_mut().enumerate() {
            *slot = InodeRepr::free_template(i as i32);
        }
        for record in &mut region.directories {
            *record = DirectoryRecord::EMPTY;
        }

        let now = inode::now();
        region.inodes[0] = InodeRepr::root(now);
        region.current_dir = 0;
        region
    }

    /// Matches `original_source/filesystem.c`'s `-i` seeding: `/usr`,
    /// `/home`, `/usr/local`, starting the session in `/home`.
    fn seed_initial_layout(&mut self) -> FsResult<()> {
        {
            let mut ns = self.namespace();
            ops::create_directory(&mut ns, b"usr", InodeNo::ROOT)?;
            ops::create_directory(&mut ns, b"home", InodeNo::ROOT)?;
        }
        let usr = {
            let ns = self.namespace();
            crate::directory::find_inode(b"usr", &ns.directories[0])
                .expect("just created")
        };
        {
            let mut ns = self.namespace();
            ops::create_directory(&mut ns, b"local", usr)?;
        }
        let home = {
            let ns = self.namespace();
            crate::directory::find_inode(b"home", &ns.directories[0])
                .expect("just created")
        };
        self.region.current_dir = home.value();
        Ok(())
    }

    /// Borrows the inode table, directory table, and block bitmap together,
    /// as every namespace operation needs them.
    pub fn namespace(&mut self) -> Namespace<'_> {
        Namespace {
            inodes: &mut self.region.inodes,
            directories: &mut self.region.directories,
            bitmap: &mut self.region.bitmap,
        }
    }

    pub fn inodes(&self) -> &[InodeRepr; fsim_types::NUM_INODES] {
        &self.region.inodes
    }

    pub fn directories(&self) -> &[DirectoryRecord; fsim_types::NUM_INODES] {
        &self.region.directories
    }

    pub fn image_mut(&mut self) -> &mut ImageStore {
        &mut self.image
    }

    pub fn open_files_mut(
        &mut self,
    ) -> &mut [fsim_types::OpenFileSlotRepr; fsim_types::MAX_FILE_OPEN] {
        &mut self.region.open_files
    }

    /// Borrows the image store together with every control-region field the
    /// stream layer touches, all at once — `stream::read`/`write`/`seek`
    /// need the image and several region fields simultaneously, which a
    /// chain of single-field accessor calls can't express under the borrow
    /// checker.
    pub fn stream_parts(
        &mut self,
    ) -> (
        &mut ImageStore,
        &mut [InodeRepr; fsim_types::NUM_INODES],
        &mut [fsim_types::OpenFileSlotRepr; fsim_types::MAX_FILE_OPEN],
    ) {
        (&mut self.image, &mut self.region.inodes, &mut self.region.open_files)
    }

    /// Borrows the inode table, directory table (both read-only), and the
    /// open-file table (mutable) — what `stream::open` needs to install a
    /// fresh descriptor.
    pub fn open_parts(
        &mut self,
    ) -> (
        &[InodeRepr; fsim_types::NUM_INODES],
        &[DirectoryRecord; fsim_types::NUM_INODES],
        &mut [fsim_types::OpenFileSlotRepr; fsim_types::MAX_FILE_OPEN],
    ) {
        (&self.region.inodes, &self.region.directories, &mut self.region.open_files)
    }

    /// Borrows the namespace fields and the image store separately, for
    /// operations like `copy_file` that need both at once but don't touch
    /// the open-file table.
    pub fn namespace_and_image(&mut self) -> (Namespace<'_>, &mut ImageStore) {
        (
            Namespace {
                inodes: &mut self.region.inodes,
                directories: &mut self.region.directories,
                bitmap: &mut self.region.bitmap,
            },
            &mut self.image,
        )
    }

    /// As [`Self::stream_parts`], additionally including the block bitmap;
    /// used by `write`, which can allocate fresh blocks.
    pub fn stream_parts_mut(
        &mut self,
    ) -> (
        &mut ImageStore,
        &mut [InodeRepr; fsim_types::NUM_INODES],
        &mut [i32; fsim_types::NUM_BLOCKS],
        &mut [fsim_types::OpenFileSlotRepr; fsim_types::MAX_FILE_OPEN],
    ) {
        (
            &mut self.image,
            &mut self.region.inodes,
            &mut self.region.bitmap,
            &mut self.region.open_files,
        )
    }

    pub fn current_dir(&self) -> InodeNo {
        InodeNo::new(self.region.current_dir)
    }

    pub fn set_current_dir(&mut self, dir: InodeNo) {
        self.region.current_dir = dir.value();
    }

    /// Persists the whole control region as one contiguous blob. Every shell
    /// command that mutates state calls this once it succeeds, making the
    /// system write-through at command granularity.
    pub fn save(&mut self) -> FsResult<()> {
        self.image.save_control_region(&self.region)
    }

    /// Releases the advisory lock. Called once, on shell exit.
    pub fn close(&mut self) -> FsResult<()> {
        self.image.unlock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_image_seeds_usr_home_local() {
        let dir = tempfile::tempdir().unwrap();
        let mut fs = FileSystem::open(&dir.path().join("fs.img"), false).unwrap();

        let root = &fs.directories()[0];
        assert!(crate::directory::find_inode(b"usr", root).is_some());
        assert!(crate::directory::find_inode(b"home", root).is_some());

        let usr = crate::directory::find_inode(b"usr", root).unwrap();
        let usr_idx = usr.as_index().unwrap();
        assert!(crate::directory::find_inode(b"local", &fs.directories()[usr_idx]).is_some());

        let home = crate::directory::find_inode(b"home", root).unwrap();
        assert_eq!(fs.current_dir(), home);
    }

    #[test]
    fn save_then_reopen_preserves_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fs.img");
        {
            let mut fs = FileSystem::open(&path, false).unwrap();
            fs.namespace();
            fs.save().unwrap();
            fs.close().unwrap();
        }
        let fs2 = FileSystem::open(&path, false).unwrap();
        assert!(crate::directory::find_inode(b"usr", &fs2.directories()[0]).is_some());
    }
}
