use memmap2::{MmapMut, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::SgError;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Permission bits for newly created SG files (`rw-rw-r--`).
#[cfg(unix)]
const SG_FILE_MODE: u32 = 0o664;

/// Write-side manager for a single SG file's memory-mapped region.
///
/// The backing file is created at a fixed initial length and mapped shared
/// and writable. [`append`](SgWriter::append) copies into the mapping at the
/// running write offset; when an append would run past the mapped length,
/// the file is grown by a whole number of blocks and remapped, old contents
/// preserved. The mapped length is therefore always a multiple of the block
/// size and never less than the bytes written.
///
/// [`finalize`](SgWriter::finalize) truncates the file to the exact written
/// length; a file that never received a byte is unlinked instead, so
/// abandoned shards leave nothing on disk.
pub struct SgWriter {
    path: PathBuf,
    file: File,
    map: MmapMut,
    block_size: usize,
    growth_blocks: usize,
    written: usize,
}

impl SgWriter {
    /// Creates (or truncates) the file at `path` and maps its initial
    /// region.
    ///
    /// The file is opened read-write with create+truncate, given `rw-rw-r--`
    /// permissions, and sized to `initial_blocks * block_size` bytes before
    /// mapping. Later growth happens in `growth_blocks * block_size` steps.
    pub fn create<P: AsRef<Path>>(
        path: P,
        block_size: usize,
        initial_blocks: usize,
        growth_blocks: usize,
    ) -> Result<Self, SgError> {
        assert!(block_size > 0, "block size must be non-zero");
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        #[cfg(unix)]
        fs::set_permissions(&path, fs::Permissions::from_mode(SG_FILE_MODE))?;

        let len = block_size * initial_blocks.max(1);
        file.set_len(len as u64)?;
        let map = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(Self {
            path,
            file,
            map,
            block_size,
            growth_blocks: growth_blocks.max(1),
            written: 0,
        })
    }

    /// Appends `bytes` at the current write offset, growing the mapped
    /// region first if it would overflow.
    pub fn append(&mut self, bytes: &[u8]) -> Result<(), SgError> {
        let end = self.written + bytes.len();
        if end > self.map.len() {
            self.grow_to(end)?;
        }
        self.map[self.written..end].copy_from_slice(bytes);
        self.written = end;
        Ok(())
    }

    /// Grows the file and remaps it so that at least `needed` bytes fit.
    ///
    /// Growth is by whole `growth_blocks * block_size` increments, keeping
    /// the mapped length a block-size multiple. The fresh mapping covers the
    /// same file, so previously written contents carry over.
    fn grow_to(&mut self, needed: usize) -> Result<(), SgError> {
        let step = self.growth_blocks * self.block_size;
        let mut new_len = self.map.len();
        while new_len < needed {
            new_len += step;
        }
        debug!(path = %self.path.display(), old = self.map.len(), new = new_len, "growing SG file");
        self.file.set_len(new_len as u64)?;
        self.map = unsafe { MmapOptions::new().map_mut(&self.file)? };
        Ok(())
    }

    /// Bytes appended so far (the next write offset).
    #[must_use]
    pub fn written(&self) -> usize {
        self.written
    }

    /// Current mapped region length.
    #[must_use]
    pub fn mapped_len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and truncates the file to the exact written length, or
    /// unlinks it when nothing was ever written.
    pub fn finalize(self) -> Result<(), SgError> {
        let Self {
            path,
            file,
            map,
            written,
            ..
        } = self;
        if written == 0 {
            drop(map);
            drop(file);
            debug!(path = %path.display(), "unlinking empty SG file");
            fs::remove_file(&path)?;
            return Ok(());
        }
        map.flush()?;
        drop(map);
        file.set_len(written as u64)?;
        file.sync_all()?;
        Ok(())
    }
}

impl std::fmt::Debug for SgWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SgWriter")
            .field("path", &self.path)
            .field("written", &self.written)
            .field("mapped_len", &self.map.len())
            .field("block_size", &self.block_size)
            .finish()
    }
}
