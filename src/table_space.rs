//! Table-space and extents (C3, spec.md §4.3): a named arena, backed
//! by a directory of fixed-size extent files, from which the heap
//! bump-allocates version records and maintains a durable
//! row-id → address directory.
//!
//! The real persistent-memory pool allocator is out of scope (spec.md
//! §1); here a `memmap2`-mapped file per extent stands in for it, the
//! way the teacher's `robt.rs` memory-maps read-only btree files.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use fs2::FileExt;
use memmap2::MmapMut;

use crate::config::EXTENT_SIZE;
use crate::error::Error;
use crate::types::RowId;

/// Byte width of one row-id → address slot in the durable version
/// directory file (see `version_path`).
const VERSION_SLOT_LEN: u64 = 8;

/// Non-owning handle into a table-space's arena. Opaque beyond the
/// pool's mount lifetime (spec.md §9 design notes): it cannot be
/// dereferenced without going back through the owning `TableSpace`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PersistentAddr(pub u64);

pub const NULL_ADDR: PersistentAddr = PersistentAddr(0);

struct Extent {
    _file: File,
    mmap: MmapMut,
}

/// A named, directory-backed arena: fixed-size extents for row-version
/// data, plus a durable row-id → version-chain-head address directory.
pub struct TableSpace {
    dir: PathBuf,
    name: String,
    _lock_file: Option<File>,
    extents: Mutex<Vec<Extent>>,
    /// Next free byte offset into the logical (concatenated-extents)
    /// arena; address `0` is reserved so `PersistentAddr(0)` can mean
    /// "unallocated" (mirrors row-id 0 being a reserved sentinel).
    tail: AtomicU64,
    /// In-DRAM mirror of `version_dir` (row-id → arena address),
    /// kept for lock-free-ish reads; the authoritative copy lives in
    /// `version_file` on disk so a mount can reconstruct it (spec.md
    /// §4.3 `version_point`, §3 "On restart the table is mounted from
    /// its persisted segment head"). A plain mutex-guarded vector:
    /// simpler than C4's lock-free segmented growth, a deliberate
    /// scope reduction (see DESIGN.md) since spec.md reserves the
    /// detailed lock-free protocol for the DRAM row-id map (C4), not
    /// this NVM-side companion.
    version_dir: Mutex<Vec<u64>>,
    /// Durable backing store for `version_dir`: one fixed 8-byte
    /// little-endian slot per row-id, at byte offset `row_id *
    /// VERSION_SLOT_LEN`.
    version_file: Mutex<File>,
}

fn extent_path(dir: &Path, name: &str, idx: usize) -> PathBuf {
    dir.join(format!("{}.ext.{}", name, idx))
}

fn version_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.versions", name))
}

/// Read every slot out of an already-open version-directory file, in
/// row-id order, for reconstructing `version_dir` on mount.
fn load_version_dir(file: &mut File) -> Result<Vec<u64>, Error> {
    file.seek(SeekFrom::Start(0))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;
    let mut dir = Vec::with_capacity(buf.len() / VERSION_SLOT_LEN as usize);
    for chunk in buf.chunks_exact(VERSION_SLOT_LEN as usize) {
        dir.push(u64::from_le_bytes(chunk.try_into().unwrap()));
    }
    Ok(dir)
}

impl TableSpace {
    /// Create a fresh table-space at `dir/name`, taking an advisory
    /// exclusive lock on the pool directory (spec.md §6 "create/mount/
    /// unmount pool at a directory path").
    pub fn create(dir: &str, name: &str) -> Result<TableSpace, Error> {
        let dir_path = PathBuf::from(dir);
        fs::create_dir_all(&dir_path)?;
        let lock_file = Self::lock_pool(&dir_path)?;
        let version_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(version_path(&dir_path, name))?;
        Ok(TableSpace {
            dir: dir_path,
            name: name.to_string(),
            _lock_file: Some(lock_file),
            extents: Mutex::new(Vec::new()),
            tail: AtomicU64::new(1), // reserve offset 0 as NULL_ADDR
            version_dir: Mutex::new(Vec::new()),
            version_file: Mutex::new(version_file),
        })
    }

    /// Mount an existing table-space, remapping every extent file
    /// found in `dir` for `name` in creation order.
    pub fn mount(dir: &str, name: &str) -> Result<TableSpace, Error> {
        let dir_path = PathBuf::from(dir);
        let lock_file = Self::lock_pool(&dir_path)?;
        let mut extents = Vec::new();
        let mut idx = 0;
        loop {
            let p = extent_path(&dir_path, name, idx);
            if !p.exists() {
                break;
            }
            extents.push(Self::open_extent(&p)?);
            idx += 1;
        }
        let tail = (extents.len() as u64) * EXTENT_SIZE;
        let mut version_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(version_path(&dir_path, name))?;
        let version_dir = load_version_dir(&mut version_file)?;
        Ok(TableSpace {
            dir: dir_path,
            name: name.to_string(),
            _lock_file: Some(lock_file),
            extents: Mutex::new(extents),
            tail: AtomicU64::new(tail.max(1)),
            version_dir: Mutex::new(version_dir),
            version_file: Mutex::new(version_file),
        })
    }

    pub fn unmount(&self) {
        // fs2 lock is released when `_lock_file` drops; extents'
        // mmaps flush on drop too. Nothing else to do explicitly.
    }

    fn lock_pool(dir: &Path) -> Result<File, Error> {
        let lock_path = dir.join(".pool.lock");
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&lock_path)?;
        file.try_lock_exclusive()
            .map_err(|e| Error::InputError(format!("pool {} already mounted: {}", dir.display(), e)))?;
        Ok(file)
    }

    fn open_extent(path: &Path) -> Result<Extent, Error> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Extent { _file: file, mmap })
    }

    fn new_extent(&self, idx: usize) -> Result<Extent, Error> {
        let path = extent_path(&self.dir, &self.name, idx);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(EXTENT_SIZE)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok(Extent { _file: file, mmap })
    }

    /// Allocate a fresh extent and return its page number (index into
    /// the table's extent chain). Used both to establish a table's
    /// segment head and to grow the arena.
    pub fn allocate_extent(&self) -> Result<u32, Error> {
        let mut extents = self.extents.lock().unwrap();
        let idx = extents.len();
        let extent = self.new_extent(idx)?;
        extents.push(extent);
        Ok(idx as u32)
    }

    /// Bump-allocate `len` bytes from the arena, growing with fresh
    /// extents as needed, and return the address of the new region.
    pub fn alloc_bytes(&self, len: u64) -> Result<PersistentAddr, Error> {
        let start = self.tail.fetch_add(len, Ordering::SeqCst);
        let end = start + len;
        let needed_extents = ((end + EXTENT_SIZE - 1) / EXTENT_SIZE) as usize;
        let mut extents = self.extents.lock().unwrap();
        while extents.len() < needed_extents {
            let idx = extents.len();
            extents.push(self.new_extent(idx)?);
        }
        Ok(PersistentAddr(start))
    }

    pub fn write(&self, addr: PersistentAddr, bytes: &[u8]) -> Result<(), Error> {
        let mut extents = self.extents.lock().unwrap();
        let mut pos = addr.0;
        let mut remaining = bytes;
        while !remaining.is_empty() {
            let ext_idx = (pos / EXTENT_SIZE) as usize;
            let intra = (pos % EXTENT_SIZE) as usize;
            let n = remaining.len().min(EXTENT_SIZE as usize - intra);
            let extent = extents
                .get_mut(ext_idx)
                .ok_or_else(|| Error::InputError(format!("write past arena end at extent {}", ext_idx)))?;
            extent.mmap[intra..intra + n].copy_from_slice(&remaining[0..n]);
            pos += n as u64;
            remaining = &remaining[n..];
        }
        Ok(())
    }

    pub fn read(&self, addr: PersistentAddr, len: usize) -> Result<Vec<u8>, Error> {
        let extents = self.extents.lock().unwrap();
        let mut out = Vec::with_capacity(len);
        let mut pos = addr.0;
        let mut remaining = len;
        while remaining > 0 {
            let ext_idx = (pos / EXTENT_SIZE) as usize;
            let intra = (pos % EXTENT_SIZE) as usize;
            let extent = extents
                .get(ext_idx)
                .ok_or_else(|| Error::InputError(format!("read past arena end at extent {}", ext_idx)))?;
            let n = remaining.min(EXTENT_SIZE as usize - intra);
            out.extend_from_slice(&extent.mmap[intra..intra + n]);
            pos += n as u64;
            remaining -= n;
        }
        Ok(out)
    }

    /// Durable counterpart to the DRAM row-id map: the address of the
    /// version-chain head for `row_id`, or `None` if unallocated
    /// (spec.md §4.3 "version_point").
    pub fn version_point(&self, row_id: RowId) -> Option<PersistentAddr> {
        let dir = self.version_dir.lock().unwrap();
        match dir.get(row_id as usize) {
            Some(&0) | None => None,
            Some(&a) => Some(PersistentAddr(a)),
        }
    }

    pub fn set_version_point(&self, row_id: RowId, addr: PersistentAddr) -> Result<(), Error> {
        let mut dir = self.version_dir.lock().unwrap();
        if dir.len() <= row_id as usize {
            dir.resize(row_id as usize + 1, 0);
        }
        dir[row_id as usize] = addr.0;
        drop(dir);

        let mut file = self.version_file.lock().unwrap();
        file.seek(SeekFrom::Start(row_id as u64 * VERSION_SLOT_LEN))?;
        file.write_all(&addr.0.to_le_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Highest row-id with a populated slot in the durable directory,
    /// or `0` if none — the heap's high-water mark to resume from on
    /// mount (spec.md §3 "On restart the table is mounted from its
    /// persisted segment head").
    pub fn max_row_id(&self) -> RowId {
        let dir = self.version_dir.lock().unwrap();
        dir.len().saturating_sub(1) as RowId
    }
}

#[cfg(test)]
#[path = "table_space_test.rs"]
mod table_space_test;
