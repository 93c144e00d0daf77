//! Path and object-reference conversions.
//!
//! Everything here is stateless and usable without a sweep running:
//! - resolving a path into an `ObjectReference`
//! - mapping a reference back to a path that still denotes it
//! - classifying a reference (`ItemFlags` plus extension)
//! - fetching a `MetadataRecord` for a reference

use crate::error::ResolveError;
use crate::model::{FileId, ItemFlags, MetadataMask, MetadataRecord, ObjectReference};
use filetime::FileTime;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Longest path `path_of` will hand out.
#[cfg(windows)]
pub const MAX_PATH_LEN: usize = 32_767;
#[cfg(not(windows))]
pub const MAX_PATH_LEN: usize = 4_096;

/// Result of resolving a single path.
#[derive(Debug, Clone)]
pub(crate) struct Resolved {
    pub reference: ObjectReference,
    pub is_folder: bool,
    pub is_link: bool,
    pub metadata: Metadata,
}

/// Resolve a path into an object reference, following symbolic links.
///
/// Returns the reference and whether it denotes a folder. Fails for paths
/// that do not exist, including dangling links.
pub fn resolve<P: AsRef<Path>>(path: P) -> Result<(ObjectReference, bool), ResolveError> {
    let resolved = resolve_entry(path.as_ref(), true)?;
    Ok((resolved.reference, resolved.is_folder))
}

/// Resolve a path, choosing whether a symbolic link stands for its target.
///
/// A link to a folder is always reported as a folder (`is_folder`), but when
/// `follow_links` is false the reference and the metadata describe the link
/// itself: its size is the link's length and it has no valence. A dangling
/// link resolves to the link itself when not following links and fails
/// otherwise.
pub(crate) fn resolve_entry(path: &Path, follow_links: bool) -> Result<Resolved, ResolveError> {
    let link_meta = fs::symlink_metadata(path)
        .map_err(|e| ResolveError::from_io(path.to_path_buf(), e))?;

    if !link_meta.file_type().is_symlink() {
        let id = file_id(path, &link_meta);
        return Ok(Resolved {
            reference: ObjectReference::new(id, Arc::from(path), false),
            is_folder: link_meta.is_dir(),
            is_link: false,
            metadata: link_meta,
        });
    }

    match fs::metadata(path) {
        Ok(target_meta) if follow_links => Ok(Resolved {
            reference: ObjectReference::new(file_id(path, &target_meta), Arc::from(path), true),
            is_folder: target_meta.is_dir(),
            is_link: true,
            metadata: target_meta,
        }),
        Ok(target_meta) => Ok(Resolved {
            reference: ObjectReference::new(file_id(path, &link_meta), Arc::from(path), false),
            is_folder: target_meta.is_dir(),
            is_link: true,
            metadata: link_meta,
        }),
        Err(_) if follow_links => Err(ResolveError::DanglingLink {
            path: path.to_path_buf(),
        }),
        Err(_) => Ok(Resolved {
            reference: ObjectReference::new(file_id(path, &link_meta), Arc::from(path), false),
            is_folder: false,
            is_link: true,
            metadata: link_meta,
        }),
    }
}

/// Return a path that currently denotes `reference`.
///
/// Returns `None` if the path is longer than `MAX_PATH_LEN`, if nothing
/// exists there any more, or if it now names a different object.
pub fn path_of(reference: &ObjectReference) -> Option<PathBuf> {
    let path = reference.resolved_path();
    if path.as_os_str().len() > MAX_PATH_LEN {
        return None;
    }
    stat_reference(reference).ok()?;
    Some(path.to_path_buf())
}

/// Classify a reference and return its extension, if any.
///
/// Returns `(ItemFlags::empty(), None)` for a reference that no longer denotes
/// a live object.
pub fn classify(reference: &ObjectReference) -> (ItemFlags, Option<String>) {
    let metadata = match stat_reference(reference) {
        Ok(metadata) => metadata,
        Err(_) => return (ItemFlags::empty(), None),
    };
    let path = reference.resolved_path();
    let is_link = fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false);
    let is_folder = if reference.through_link() || !is_link {
        metadata.is_dir()
    } else {
        fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
    };

    let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .filter(|e| !e.is_empty());

    let mut flags = ItemFlags::empty();
    if is_folder {
        flags |= ItemFlags::CONTAINER;
        if extension.is_some() {
            flags |= ItemFlags::PACKAGE;
        }
        if extension
            .as_deref()
            .map(|e| e.eq_ignore_ascii_case("app"))
            .unwrap_or(false)
        {
            flags |= ItemFlags::APPLICATION;
        }
    } else if metadata.is_file() {
        flags |= ItemFlags::PLAIN_FILE;
        if is_executable(&metadata) {
            flags |= ItemFlags::EXECUTABLE | ItemFlags::APPLICATION;
        }
    }
    if is_link {
        flags |= ItemFlags::SYMLINK;
    }
    if name.as_deref().map(|n| n.starts_with('.')).unwrap_or(false) {
        flags |= ItemFlags::INVISIBLE;
    }
    if extension.is_some() {
        flags |= ItemFlags::HAS_EXTENSION;
    }
    if is_folder && is_volume_root(path, &metadata) {
        flags |= ItemFlags::VOLUME;
    }

    (flags, extension)
}

/// Fetch the metadata fields selected by `mask` for a reference.
///
/// Returns `None` if the reference no longer denotes a live object. An empty
/// mask yields an empty record without touching the filesystem.
pub fn metadata_of(reference: &ObjectReference, mask: MetadataMask) -> Option<MetadataRecord> {
    if mask.is_empty() {
        return Some(MetadataRecord::default());
    }
    let metadata = stat_reference(reference).ok()?;
    Some(record_from_metadata(
        reference.resolved_path(),
        &metadata,
        mask,
    ))
}

/// Build a record from metadata already in hand.
pub(crate) fn record_from_metadata(
    path: &Path,
    metadata: &Metadata,
    mask: MetadataMask,
) -> MetadataRecord {
    let mut record = MetadataRecord::default();

    if mask.contains(MetadataMask::SIZE) {
        record.size = Some(if metadata.is_dir() { 0 } else { metadata.len() });
    }
    if mask.contains(MetadataMask::ALLOCATED_SIZE) {
        record.allocated_size = Some(allocated_size(metadata));
    }
    if mask.contains(MetadataMask::CREATED) {
        record.created = FileTime::from_creation_time(metadata);
    }
    if mask.contains(MetadataMask::MODIFIED) {
        record.modified = Some(FileTime::from_last_modification_time(metadata));
    }
    if mask.contains(MetadataMask::ACCESSED) {
        record.accessed = Some(FileTime::from_last_access_time(metadata));
    }
    if mask.contains(MetadataMask::CHANGED) {
        record.changed = status_change_time(metadata);
    }
    if mask.contains(MetadataMask::PERMISSIONS) {
        record.permissions = Some(permission_bits(metadata));
        record.read_only = Some(metadata.permissions().readonly());
    }
    if mask.contains(MetadataMask::OWNER) {
        record.owner = owner(metadata);
    }
    if mask.contains(MetadataMask::NODE_ID) {
        record.node_id = Some(file_id(path, metadata));
    }
    if mask.contains(MetadataMask::LINK_COUNT) {
        record.link_count = link_count(metadata);
    }
    if mask.contains(MetadataMask::VALENCE) && metadata.is_dir() {
        record.valence = fs::read_dir(path).ok().map(|entries| entries.count() as u64);
    }

    record
}

/// Stat the object behind a reference, failing if its path now names
/// something else.
fn stat_reference(reference: &ObjectReference) -> io::Result<Metadata> {
    let path = reference.resolved_path();
    let metadata = if reference.through_link() {
        fs::metadata(path)?
    } else {
        fs::symlink_metadata(path)?
    };
    if file_id(path, &metadata) != reference.id() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "path no longer denotes the referenced object",
        ));
    }
    Ok(metadata)
}

#[cfg(unix)]
pub(crate) fn file_id(_path: &Path, metadata: &Metadata) -> FileId {
    use std::os::unix::fs::MetadataExt;
    FileId {
        device: metadata.dev(),
        inode: metadata.ino(),
    }
}

#[cfg(not(unix))]
pub(crate) fn file_id(path: &Path, _metadata: &Metadata) -> FileId {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let canonical = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut hasher = DefaultHasher::new();
    canonical.hash(&mut hasher);
    FileId {
        device: 0,
        inode: hasher.finish(),
    }
}

#[cfg(unix)]
fn allocated_size(metadata: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    metadata.blocks() * 512
}

#[cfg(not(unix))]
fn allocated_size(metadata: &Metadata) -> u64 {
    metadata.len()
}

#[cfg(unix)]
fn status_change_time(metadata: &Metadata) -> Option<FileTime> {
    use std::os::unix::fs::MetadataExt;
    Some(FileTime::from_unix_time(
        metadata.ctime(),
        metadata.ctime_nsec() as u32,
    ))
}

#[cfg(not(unix))]
fn status_change_time(_metadata: &Metadata) -> Option<FileTime> {
    None
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::MetadataExt;
    metadata.mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o666
    }
}

#[cfg(unix)]
fn owner(metadata: &Metadata) -> Option<(u32, u32)> {
    use std::os::unix::fs::MetadataExt;
    Some((metadata.uid(), metadata.gid()))
}

#[cfg(not(unix))]
fn owner(_metadata: &Metadata) -> Option<(u32, u32)> {
    None
}

#[cfg(unix)]
fn link_count(metadata: &Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(metadata.nlink())
}

#[cfg(not(unix))]
fn link_count(_metadata: &Metadata) -> Option<u64> {
    None
}

#[cfg(unix)]
fn is_executable(metadata: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    metadata.mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &Metadata) -> bool {
    false
}

// A folder is a volume root when its parent lives on another device.
#[cfg(unix)]
fn is_volume_root(path: &Path, metadata: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => fs::metadata(parent)
            .map(|parent_meta| parent_meta.dev() != metadata.dev())
            .unwrap_or(false),
        None => true,
    }
}

#[cfg(not(unix))]
fn is_volume_root(path: &Path, _metadata: &Metadata) -> bool {
    path.parent().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_resolve_file_and_folder() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file_path = temp_dir.path().join("notes.txt");
        fs::write(&file_path, b"hello").expect("Failed to write file");

        let (folder_ref, is_folder) = resolve(temp_dir.path()).expect("Failed to resolve folder");
        assert!(is_folder);
        assert_eq!(folder_ref.resolved_path(), temp_dir.path());

        let (file_ref, is_folder) = resolve(&file_path).expect("Failed to resolve file");
        assert!(!is_folder);
        assert_ne!(file_ref, folder_ref);
    }

    #[test]
    fn test_resolve_missing_path() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = resolve(temp_dir.path().join("missing"));
        assert!(matches!(result, Err(ResolveError::NotFound { .. })));
    }

    #[test]
    fn test_path_of_tracks_deletion() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file_path = temp_dir.path().join("a.txt");
        fs::write(&file_path, b"a").expect("Failed to write file");

        let (reference, _) = resolve(&file_path).expect("Failed to resolve file");
        assert_eq!(path_of(&reference), Some(file_path.clone()));

        fs::remove_file(&file_path).expect("Failed to remove file");
        assert_eq!(path_of(&reference), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_path_of_rejects_other_object_at_same_path() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let first = temp_dir.path().join("first.txt");
        let second = temp_dir.path().join("second.txt");
        fs::write(&first, b"1").expect("Failed to write file");
        fs::write(&second, b"2").expect("Failed to write file");

        let (reference, _) = resolve(&first).expect("Failed to resolve file");
        // Both files exist at once, so the replacement cannot reuse the inode.
        fs::rename(&second, &first).expect("Failed to replace file");
        assert_eq!(path_of(&reference), None);
    }

    #[test]
    fn test_classify_file_and_folder() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file_path = temp_dir.path().join(".hidden.cfg");
        fs::write(&file_path, b"x").expect("Failed to write file");
        let bundle = temp_dir.path().join("Tool.app");
        fs::create_dir(&bundle).expect("Failed to create bundle");

        let (file_ref, _) = resolve(&file_path).expect("Failed to resolve file");
        let (flags, ext) = classify(&file_ref);
        assert!(flags.contains(ItemFlags::PLAIN_FILE));
        assert!(flags.contains(ItemFlags::INVISIBLE));
        assert!(flags.contains(ItemFlags::HAS_EXTENSION));
        assert!(!flags.contains(ItemFlags::CONTAINER));
        assert_eq!(ext.as_deref(), Some("cfg"));

        let (bundle_ref, _) = resolve(&bundle).expect("Failed to resolve bundle");
        let (flags, ext) = classify(&bundle_ref);
        assert!(flags.contains(ItemFlags::CONTAINER | ItemFlags::PACKAGE | ItemFlags::APPLICATION));
        assert_eq!(ext.as_deref(), Some("app"));
    }

    #[test]
    fn test_classify_invalid_reference_is_empty() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file_path = temp_dir.path().join("gone.txt");
        fs::write(&file_path, b"x").expect("Failed to write file");
        let (reference, _) = resolve(&file_path).expect("Failed to resolve file");
        fs::remove_file(&file_path).expect("Failed to remove file");

        assert_eq!(classify(&reference), (ItemFlags::empty(), None));
    }

    #[test]
    fn test_metadata_of_respects_mask() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let file_path = temp_dir.path().join("data.bin");
        let mut file = fs::File::create(&file_path).expect("Failed to create file");
        file.write_all(b"0123456789").expect("Failed to write file");
        drop(file);

        let (reference, _) = resolve(&file_path).expect("Failed to resolve file");
        let record = metadata_of(&reference, MetadataMask::SIZE | MetadataMask::MODIFIED)
            .expect("Expected metadata");
        assert_eq!(record.size, Some(10));
        assert!(record.modified.is_some());
        assert!(record.accessed.is_none());
        assert!(record.permissions.is_none());
        assert!(record.valence.is_none());

        let empty = metadata_of(&reference, MetadataMask::empty()).expect("Expected empty record");
        assert_eq!(empty, MetadataRecord::default());
    }

    #[test]
    fn test_metadata_valence_counts_children() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("one"), b"1").expect("Failed to write file");
        fs::write(temp_dir.path().join("two"), b"2").expect("Failed to write file");
        fs::create_dir(temp_dir.path().join("sub")).expect("Failed to create dir");

        let (reference, _) = resolve(temp_dir.path()).expect("Failed to resolve folder");
        let record = metadata_of(&reference, MetadataMask::VALENCE | MetadataMask::NODE_ID)
            .expect("Expected metadata");
        assert_eq!(record.valence, Some(3));
        assert_eq!(record.node_id, Some(reference.id()));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_symlinked_folder() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let target = temp_dir.path().join("target");
        fs::create_dir(&target).expect("Failed to create target");
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).expect("Failed to create symlink");

        let (target_ref, _) = resolve(&target).expect("Failed to resolve target");

        let followed = resolve_entry(&link, true).expect("Failed to resolve link");
        assert!(followed.is_folder);
        assert!(followed.is_link);
        assert_eq!(followed.reference, target_ref);

        let unfollowed = resolve_entry(&link, false).expect("Failed to resolve link");
        assert!(unfollowed.is_folder);
        assert!(unfollowed.is_link);
        assert_ne!(unfollowed.reference, target_ref);

        let (flags, _) = classify(&unfollowed.reference);
        assert!(flags.contains(ItemFlags::SYMLINK | ItemFlags::CONTAINER));
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_dangling_link() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let link = temp_dir.path().join("dangling");
        std::os::unix::fs::symlink(temp_dir.path().join("nowhere"), &link)
            .expect("Failed to create symlink");

        assert!(matches!(
            resolve_entry(&link, true),
            Err(ResolveError::DanglingLink { .. })
        ));
        let resolved = resolve_entry(&link, false).expect("Unfollowed dangling link should resolve");
        assert!(!resolved.is_folder);
        assert!(resolved.is_link);
    }

    #[cfg(unix)]
    #[test]
    fn test_unfollowed_link_metadata_describes_link() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let target = temp_dir.path().join("target");
        fs::create_dir(&target).expect("Failed to create target");
        fs::write(target.join("child"), b"c").expect("Failed to write file");
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).expect("Failed to create symlink");
        let mask = MetadataMask::SIZE | MetadataMask::NODE_ID | MetadataMask::VALENCE;

        let unfollowed = resolve_entry(&link, false).expect("Failed to resolve link");
        let record = record_from_metadata(&link, &unfollowed.metadata, mask);
        assert!(unfollowed.is_folder);
        assert_eq!(record.node_id, Some(unfollowed.reference.id()));
        assert_eq!(record.size, Some(target.as_os_str().len() as u64));
        assert_eq!(record.valence, None);

        let followed = resolve_entry(&link, true).expect("Failed to resolve link");
        let record = record_from_metadata(&link, &followed.metadata, mask);
        assert_eq!(record.node_id, Some(followed.reference.id()));
        assert_eq!(record.valence, Some(1));
    }
}
