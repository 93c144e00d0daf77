//! Read-only, memory-mapped views of file contents.
//!
//! `map_read_only` opens a file and maps all of it. The returned
//! `MappedContent` owns both the open file and the mapping; dropping it
//! unmaps and closes. A holder that keeps the view alive keeps the file open
//! for as long as it does.

use crate::model::ObjectReference;
use crate::resolver::file_id;
use memmap2::Mmap;
use std::fmt;
use std::fs::{self, File, Metadata};
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A zero-copy, read-only view of a file's bytes.
///
/// The bytes reflect the file as it was when mapped. Nothing is promised if
/// another process modifies the file while the view is held.
pub struct MappedContent {
    // Field order matters: the mapping is dropped before the file is closed.
    map: Mmap,
    _file: File,
    path: PathBuf,
}

impl MappedContent {
    /// The mapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.map
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Path the file was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Deref for MappedContent {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.map
    }
}

impl AsRef<[u8]> for MappedContent {
    fn as_ref(&self) -> &[u8] {
        &self.map
    }
}

impl fmt::Debug for MappedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedContent")
            .field("path", &self.path)
            .field("len", &self.map.len())
            .finish()
    }
}

/// Map the whole file behind `reference` for reading.
///
/// Returns `None` when the file cannot be opened or mapped (a folder, a
/// vanished file, or address-space pressure), or when its path now names a
/// different object. That is not an error: the caller still has the entry
/// and decides what to do without the bytes.
pub fn map_read_only(reference: &ObjectReference) -> Option<MappedContent> {
    let path = reference.resolved_path();
    match map_reference(reference) {
        Ok(content) => Some(content),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "content mapping failed");
            None
        }
    }
}

fn map_reference(reference: &ObjectReference) -> io::Result<MappedContent> {
    let path = reference.resolved_path();

    // A reference to an unfollowed link identifies the link; its bytes are
    // the target's.
    let link_meta = fs::symlink_metadata(path)?;
    let names_link = link_meta.file_type().is_symlink() && !reference.through_link();
    if names_link && file_id(path, &link_meta) != reference.id() {
        return Err(stale_reference());
    }

    let file = File::open(path)?;
    let metadata = file.metadata()?;
    if !names_link && file_id(path, &metadata) != reference.id() {
        return Err(stale_reference());
    }
    map_open_file(file, &metadata, path)
}

fn stale_reference() -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        "path no longer denotes the referenced object",
    )
}

/// Map a file by path. Available for callers that already hold a path and
/// do not need the identity check `map_read_only` performs.
pub fn map_path(path: &Path) -> io::Result<MappedContent> {
    let file = File::open(path)?;
    let metadata = file.metadata()?;
    map_open_file(file, &metadata, path)
}

fn map_open_file(file: File, metadata: &Metadata, path: &Path) -> io::Result<MappedContent> {
    if !metadata.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }
    // SAFETY: the map is read-only and never handed out mutably. Callers are
    // told the bytes are only stable while no one else writes the file.
    let map = unsafe { Mmap::map(&file)? };
    Ok(MappedContent {
        map,
        _file: file,
        path: path.to_path_buf(),
    })
}
