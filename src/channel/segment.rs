//! # Shared segment: single writer, many readers, no locks.
//!
//! The segment is a fixed-size file mapped with `mmap` by the supervisor
//! ([`AssignmentChannel`]) and by each worker ([`AssignmentReader`]). By default it lives
//! in `/dev/shm`, i.e. the same storage POSIX `shm_open` uses.
//!
//! ## Write protocol
//! ```text
//! write(table)
//!   ├─► encode → bytes
//!   ├─► bytes.len() >= capacity ?  ─► Err(TooLarge), segment untouched
//!   ├─► fill(0) whole buffer
//!   └─► copy bytes at offset 0         (NUL terminator comes from the zero fill)
//! ```
//!
//! ## Consistency
//! Reads are **not** synchronised with writes. A reader that copies the buffer while the
//! supervisor is mid-write can see a torn image; [`AssignmentTable::decode`] then fails
//! and the reader keeps its previous assignment until the next reload signal.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};

use super::table::{Assignment, AssignmentTable};
use crate::error::ChannelError;

/// Default segment size (64 KiB).
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Deterministic segment name for a supervisor process.
pub fn segment_name(supervisor_pid: u32) -> String {
    format!("dutyvisor-{supervisor_pid}")
}

/// Writer side, owned by the supervisor.
pub struct AssignmentChannel {
    path: PathBuf,
    map: MmapMut,
    _file: File,
}

impl AssignmentChannel {
    /// Creates (or re-creates) the segment `dir/name` with `capacity` zeroed bytes.
    ///
    /// A leftover segment of the same name is removed first.
    pub fn create(dir: &Path, name: &str, capacity: usize) -> Result<Self, ChannelError> {
        let path = dir.join(name);
        let io_err = |source: io::Error| ChannelError::Io {
            path: path.clone(),
            source,
        };
        if capacity == 0 {
            return Err(io_err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "capacity must be > 0",
            )));
        }

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(e)),
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(io_err)?;
        file.set_len(capacity as u64).map_err(io_err)?;

        // SAFETY: the file was created exclusively above and is only ever resized by us.
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(io_err)?;

        Ok(Self {
            path,
            map,
            _file: file,
        })
    }

    /// Location readers attach to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.map.len()
    }

    /// Raw segment image.
    pub fn as_bytes(&self) -> &[u8] {
        &self.map
    }

    /// Replaces the whole segment with `table`; returns the number of bytes written.
    ///
    /// Over-capacity tables are rejected before anything is touched.
    pub fn write(&mut self, table: &AssignmentTable) -> Result<usize, ChannelError> {
        let bytes = table.encode()?;
        let capacity = self.capacity();
        if bytes.len() >= capacity {
            return Err(ChannelError::TooLarge {
                len: bytes.len(),
                capacity,
            });
        }
        self.map.fill(0);
        self.map[..bytes.len()].copy_from_slice(&bytes);
        Ok(bytes.len())
    }

    /// Unmaps and removes the segment.
    pub fn release(self) -> Result<(), ChannelError> {
        let Self { path, map, _file } = self;
        drop(map);
        drop(_file);
        fs::remove_file(&path).map_err(|source| ChannelError::Io { path, source })
    }
}

/// Read-only view, one per worker.
pub struct AssignmentReader {
    path: PathBuf,
    map: Mmap,
}

impl AssignmentReader {
    /// Attaches to an existing segment.
    pub fn attach(path: impl Into<PathBuf>) -> Result<Self, ChannelError> {
        let path = path.into();
        let file = File::open(&path).map_err(|source| ChannelError::Io {
            path: path.clone(),
            source,
        })?;
        // SAFETY: the mapping is read-only; concurrent writes by the supervisor are the
        // documented torn-read case and are handled by decode failing.
        let map = unsafe { Mmap::map(&file) }.map_err(|source| ChannelError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path, map })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copies the segment and decodes the whole table.
    pub fn read_table(&self) -> Result<AssignmentTable, ChannelError> {
        let image = self.map.to_vec();
        AssignmentTable::decode(&image)
    }

    /// Entry for `slot`; `Ok(None)` when the table does not cover it.
    pub fn read_entry(&self, slot: usize) -> Result<Option<Assignment>, ChannelError> {
        Ok(self.read_table()?.get(slot).cloned())
    }
}
