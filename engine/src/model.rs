//! Core data model for folder sweeps.
//!
//! This module defines the values that flow between the resolver, the
//! content mapper, the traversal engine and the caller's policy:
//! - ObjectReference / FileId: identity of a filesystem object
//! - EntryDescriptor: one visited entry, as handed to the policy
//! - MetadataMask / MetadataRecord: optional per-entry metadata
//! - ItemFlags: classification of an object
//! - Decision: the policy's answer for an entry

use bitflags::bitflags;
use filetime::FileTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;

/// Identity of a filesystem object, independent of the path used to reach it.
///
/// On Unix this is the (device, inode) pair. On other platforms it is derived
/// from the canonical path, which is the best stable identity std exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId {
    /// Device (volume) the object lives on
    pub device: u64,
    /// Per-device object number
    pub inode: u64,
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.inode)
    }
}

/// Opaque handle identifying a filesystem object.
///
/// Cloning is cheap (the path is shared). Two references are equal when they
/// denote the same object, whatever path was used to obtain them.
#[derive(Debug, Clone)]
pub struct ObjectReference {
    id: FileId,
    path: Arc<Path>,
    through_link: bool,
}

impl ObjectReference {
    pub(crate) fn new(id: FileId, path: Arc<Path>, through_link: bool) -> Self {
        ObjectReference {
            id,
            path,
            through_link,
        }
    }

    /// The object's identity.
    pub fn id(&self) -> FileId {
        self.id
    }

    /// Path the object was resolved from. Use `resolver::path_of` to check
    /// that the path still denotes this object.
    pub fn resolved_path(&self) -> &Path {
        &self.path
    }

    /// True if the path is a symbolic link that was followed to reach the object.
    pub fn through_link(&self) -> bool {
        self.through_link
    }
}

impl PartialEq for ObjectReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectReference {}

impl Hash for ObjectReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A single entry seen during a sweep.
///
/// Created fresh for every visited entry and handed to the policy by
/// reference. Policies that want to keep the object around should clone
/// `reference`.
#[derive(Debug, Clone)]
pub struct EntryDescriptor {
    /// The entry's object reference
    pub reference: ObjectReference,

    /// The entry's file name (lossily converted to UTF-8)
    pub name: String,

    /// Reference to the folder being enumerated when the entry was found
    pub parent: ObjectReference,

    /// True if the entry is a folder (or a link resolving to a folder)
    pub is_folder: bool,

    /// True if the entry itself is a symbolic link
    pub is_link: bool,

    /// Nesting level below the sweep root (1 for direct children)
    pub depth: usize,

    /// Metadata, present only when the sweep's mask was non-zero and the
    /// lookup succeeded. For a link that is not followed this describes the
    /// link, not its target.
    pub metadata: Option<MetadataRecord>,
}

impl EntryDescriptor {
    /// Full path of the entry as enumerated.
    pub fn path(&self) -> &Path {
        self.reference.resolved_path()
    }
}

bitflags! {
    /// Selects which metadata fields a sweep resolves for each entry.
    ///
    /// `empty()` skips metadata resolution entirely. Each additional field may
    /// cost more per entry; `VALENCE` needs an extra directory read.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MetadataMask: u32 {
        /// Logical size in bytes
        const SIZE = 1 << 0;
        /// Bytes allocated on disk
        const ALLOCATED_SIZE = 1 << 1;
        /// Creation (birth) time
        const CREATED = 1 << 2;
        /// Last content modification time
        const MODIFIED = 1 << 3;
        /// Last access time
        const ACCESSED = 1 << 4;
        /// Last attribute (status) change time
        const CHANGED = 1 << 5;
        /// Permission bits and read-only flag
        const PERMISSIONS = 1 << 6;
        /// Owning user and group
        const OWNER = 1 << 7;
        /// Object identity
        const NODE_ID = 1 << 8;
        /// Number of hard links
        const LINK_COUNT = 1 << 9;
        /// Number of direct children of a folder
        const VALENCE = 1 << 10;
    }
}

impl MetadataMask {
    /// Parse a comma-separated list of field names (case-insensitive), e.g.
    /// `"size,modified"`. `"all"` selects every field; an empty string
    /// selects none.
    pub fn parse(list: &str) -> Result<Self, String> {
        let mut mask = Self::empty();
        for field in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let wanted = field.to_ascii_uppercase().replace('-', "_");
            if wanted == "ALL" {
                mask |= Self::all();
                continue;
            }
            match Self::from_name(&wanted) {
                Some(flag) => mask |= flag,
                None => {
                    let known: Vec<String> = Self::all()
                        .iter_names()
                        .map(|(name, _)| name.to_ascii_lowercase())
                        .collect();
                    return Err(format!(
                        "unknown metadata field '{}' (expected {} or all)",
                        field,
                        known.join(", ")
                    ));
                }
            }
        }
        Ok(mask)
    }
}

bitflags! {
    /// Classification flags for a filesystem object.
    ///
    /// All zero means the object could not be classified.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ItemFlags: u32 {
        /// A regular file
        const PLAIN_FILE = 1 << 0;
        /// A folder
        const CONTAINER = 1 << 1;
        /// A folder presented as a single item (has an extension, e.g. `Foo.app`)
        const PACKAGE = 1 << 2;
        /// An application bundle or executable file
        const APPLICATION = 1 << 3;
        /// A symbolic link
        const SYMLINK = 1 << 4;
        /// Hidden by naming convention (leading dot)
        const INVISIBLE = 1 << 5;
        /// The name carries an extension
        const HAS_EXTENSION = 1 << 6;
        /// The root of a mounted volume
        const VOLUME = 1 << 7;
        /// Has an execute permission bit set
        const EXECUTABLE = 1 << 8;
    }
}

/// Metadata fetched for an entry. Only the fields selected by the sweep's
/// mask are populated; everything else is `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataRecord {
    pub size: Option<u64>,
    pub allocated_size: Option<u64>,
    pub created: Option<FileTime>,
    pub modified: Option<FileTime>,
    pub accessed: Option<FileTime>,
    pub changed: Option<FileTime>,
    /// Unix mode bits (or 0o444/0o666 on other platforms)
    pub permissions: Option<u32>,
    pub read_only: Option<bool>,
    /// (uid, gid)
    pub owner: Option<(u32, u32)>,
    pub node_id: Option<FileId>,
    pub link_count: Option<u64>,
    /// Direct children of a folder (always `None` for files)
    pub valence: Option<u64>,
}

/// The policy's answer for a single entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// Do nothing more with this entry
    Skip,
    /// Sweep the folder's contents (folders only)
    Descend,
    /// Map the file and pass its contents to the policy (files only)
    ProcessContent,
}

impl Decision {
    /// `Descend` if `flag` is set, `Skip` otherwise.
    pub fn descend_if(flag: bool) -> Self {
        if flag {
            Decision::Descend
        } else {
            Decision::Skip
        }
    }

    /// `ProcessContent` if `flag` is set, `Skip` otherwise.
    pub fn process_if(flag: bool) -> Self {
        if flag {
            Decision::ProcessContent
        } else {
            Decision::Skip
        }
    }

    /// The natural "yes" answer for an entry of the given kind.
    pub fn accept(is_folder: bool) -> Self {
        if is_folder {
            Decision::Descend
        } else {
            Decision::ProcessContent
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Skip => write!(f, "Skip"),
            Decision::Descend => write!(f, "Descend"),
            Decision::ProcessContent => write!(f, "ProcessContent"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_mask_parse() {
        let mask = MetadataMask::parse("size, Modified,link-count").expect("Failed to parse mask");
        assert!(mask.contains(MetadataMask::SIZE));
        assert!(mask.contains(MetadataMask::MODIFIED));
        assert!(mask.contains(MetadataMask::LINK_COUNT));
        assert!(!mask.contains(MetadataMask::ACCESSED));
        assert_eq!(mask.iter().count(), 3);

        assert_eq!(MetadataMask::parse("all").unwrap(), MetadataMask::all());
        assert!(MetadataMask::parse("").unwrap().is_empty());

        let err = MetadataMask::parse("size,bogus").unwrap_err();
        assert!(err.contains("bogus"));
        assert!(err.contains("allocated_size"));
    }

    #[test]
    fn test_item_flags_truncate_unknown_bits() {
        let flags = ItemFlags::from_bits_truncate(u32::MAX);
        assert_eq!(flags, ItemFlags::all());
        assert!(ItemFlags::from_bits(1 << 20).is_none());
        assert_eq!(
            format!("{:?}", ItemFlags::CONTAINER | ItemFlags::INVISIBLE),
            "ItemFlags(CONTAINER | INVISIBLE)"
        );
    }

    #[test]
    fn test_reference_equality_ignores_path() {
        let id = FileId { device: 1, inode: 42 };
        let a = ObjectReference::new(id, Arc::from(Path::new("/tmp/a")), false);
        let b = ObjectReference::new(id, Arc::from(Path::new("/tmp/renamed")), true);
        let c = ObjectReference::new(FileId { device: 1, inode: 43 }, Arc::from(Path::new("/tmp/a")), false);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_decision_helpers() {
        assert_eq!(Decision::descend_if(true), Decision::Descend);
        assert_eq!(Decision::process_if(false), Decision::Skip);
        assert_eq!(Decision::accept(false), Decision::ProcessContent);
    }
}
