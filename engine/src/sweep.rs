//! Folder sweep orchestration.
//!
//! `Sweeper` walks a folder tree depth-first and pre-order, asking its
//! `DecisionPolicy` about every entry:
//! - accepted folders are swept immediately, before the next sibling
//! - accepted files are memory-mapped and handed to the policy
//! - the stop flag is checked before each entry is resolved
//!
//! Only an unusable root fails a sweep. Entries that cannot be resolved and
//! folders that cannot be read are recorded as warnings and skipped.

use crate::content;
use crate::error::{SweepError, SweepWarning};
use crate::model::{Decision, EntryDescriptor, FileId, ItemFlags, MetadataMask, ObjectReference};
use crate::policy::DecisionPolicy;
use crate::resolver::{self, MAX_PATH_LEN};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

/// Sweep configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepOptions {
    /// Treat symbolic links to folders as descendable (default: true)
    pub follow_links: bool,

    /// Metadata resolved for each entry (default: none)
    pub metadata_mask: MetadataMask,
}

impl Default for SweepOptions {
    fn default() -> Self {
        SweepOptions {
            follow_links: true,
            metadata_mask: MetadataMask::empty(),
        }
    }
}

impl SweepOptions {
    pub fn follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    pub fn metadata_mask(mut self, mask: MetadataMask) -> Self {
        self.metadata_mask = mask;
        self
    }
}

/// Counters for the most recent sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepStats {
    pub folders_seen: u64,
    pub files_seen: u64,
    pub folders_descended: u64,
    pub files_processed: u64,
    pub views_mapped: u64,
    pub map_failures: u64,
    /// Metadata lookups issued; stays 0 for an empty mask
    pub metadata_lookups: u64,
    /// Entries skipped because their object was already visited
    pub duplicates_skipped: u64,
    pub warnings: u64,
}

/// Cloneable handle that stops a running sweep from any thread.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Ask the sweep to stop. It returns `SweepError::Cancelled` before
    /// visiting the next entry.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// State of the sweep in progress, visible to the policy during callbacks.
#[derive(Debug)]
pub struct SweepSession {
    id: Uuid,
    root: ObjectReference,
    metadata_mask: MetadataMask,
    follow_links: bool,
    stop: StopHandle,
    current: Option<ObjectReference>,
}

impl SweepSession {
    /// Unique id of this sweep, also attached to its log span.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &ObjectReference {
        &self.root
    }

    pub fn metadata_mask(&self) -> MetadataMask {
        self.metadata_mask
    }

    pub fn follows_links(&self) -> bool {
        self.follow_links
    }

    /// The entry currently being offered to the policy.
    pub fn current(&self) -> Option<&ObjectReference> {
        self.current.as_ref()
    }

    /// Stop the sweep after the current entry.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Path for `reference`, or for the current entry when `None`.
    ///
    /// The current entry's path is already known and is returned without
    /// touching the filesystem.
    pub fn path_for_ref(&self, reference: Option<&ObjectReference>) -> Option<PathBuf> {
        match reference {
            Some(reference) => resolver::path_of(reference),
            None => self
                .current
                .as_ref()
                .map(|current| current.resolved_path())
                .filter(|path| path.as_os_str().len() <= MAX_PATH_LEN)
                .map(Path::to_path_buf),
        }
    }

    /// Classification for `reference`, or for the current entry when `None`.
    pub fn item_flags_for_ref(
        &self,
        reference: Option<&ObjectReference>,
    ) -> (ItemFlags, Option<String>) {
        match reference.or(self.current.as_ref()) {
            Some(reference) => resolver::classify(reference),
            None => (ItemFlags::empty(), None),
        }
    }
}

/// Recursive folder sweeper.
///
/// Install a policy with `set_policy`, then call `sweep`. The sweep runs on
/// the calling thread; use `stop_handle` to cancel it from elsewhere.
pub struct Sweeper {
    options: SweepOptions,
    policy: Option<Box<dyn DecisionPolicy>>,
    stop: StopHandle,
    stats: SweepStats,
    warnings: Vec<SweepWarning>,
    last_session: Option<Uuid>,
}

impl Default for Sweeper {
    fn default() -> Self {
        Self::new()
    }
}

impl Sweeper {
    /// A sweeper with default options and no policy.
    pub fn new() -> Self {
        Self::with_options(SweepOptions::default())
    }

    pub fn with_options(options: SweepOptions) -> Self {
        Sweeper {
            options,
            policy: None,
            stop: StopHandle {
                flag: Arc::new(AtomicBool::new(false)),
            },
            stats: SweepStats::default(),
            warnings: Vec::new(),
            last_session: None,
        }
    }

    pub fn options(&self) -> SweepOptions {
        self.options
    }

    /// Follow symbolic links to folders (default: true). When disabled, such
    /// links are still reported to the policy but never descended.
    pub fn set_follow_links(&mut self, follow: bool) {
        self.options.follow_links = follow;
    }

    pub fn follows_links(&self) -> bool {
        self.options.follow_links
    }

    pub fn set_policy<P: DecisionPolicy + 'static>(&mut self, policy: P) {
        self.policy = Some(Box::new(policy));
    }

    pub fn policy(&self) -> Option<&dyn DecisionPolicy> {
        self.policy.as_deref()
    }

    pub fn policy_mut(&mut self) -> Option<&mut (dyn DecisionPolicy + 'static)> {
        self.policy.as_deref_mut()
    }

    pub fn take_policy(&mut self) -> Option<Box<dyn DecisionPolicy>> {
        self.policy.take()
    }

    /// Stop the running sweep. The flag is cleared when a sweep starts, so
    /// this has no effect on later sweeps.
    pub fn stop(&self) {
        self.stop.stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Counters from the most recent sweep.
    pub fn stats(&self) -> &SweepStats {
        &self.stats
    }

    /// Entries and folders skipped during the most recent sweep.
    pub fn warnings(&self) -> &[SweepWarning] {
        &self.warnings
    }

    pub fn last_session_id(&self) -> Option<Uuid> {
        self.last_session
    }

    /// Sweep the folder at `root` with the mask from the sweeper's options.
    pub fn sweep_folder<P: AsRef<Path>>(&mut self, root: P) -> Result<(), SweepError> {
        let mask = self.options.metadata_mask;
        self.sweep(root, mask)
    }

    /// Sweep the folder at `root`, resolving `metadata_mask` for every entry.
    ///
    /// `metadata_mask` overrides the mask from the sweeper's options for this
    /// call. Pass `MetadataMask::empty()` to skip metadata lookups entirely.
    ///
    /// Do not modify the tree until this returns, or some entries may be
    /// skipped or seen twice.
    ///
    /// # Errors
    /// - `InvalidRoot` if `root` does not resolve to a folder
    /// - `Cancelled` if the stop flag was raised mid-sweep
    /// - `MissingPolicy` if no policy is installed
    pub fn sweep<P: AsRef<Path>>(
        &mut self,
        root: P,
        metadata_mask: MetadataMask,
    ) -> Result<(), SweepError> {
        let root = root.as_ref();
        let mut policy = self.policy.take().ok_or(SweepError::MissingPolicy)?;

        let result = self.run(root, metadata_mask, policy.as_mut());

        self.policy = Some(policy);
        result
    }

    fn run(
        &mut self,
        root: &Path,
        metadata_mask: MetadataMask,
        policy: &mut dyn DecisionPolicy,
    ) -> Result<(), SweepError> {
        self.stop.flag.store(false, Ordering::Release);
        self.stats = SweepStats::default();
        self.warnings.clear();

        let id = Uuid::new_v4();
        self.last_session = Some(id);
        let span = info_span!("sweep", session = %id, root = %root.display());
        let _enter = span.enter();

        let (root_ref, is_folder) = resolver::resolve(root).map_err(|e| SweepError::InvalidRoot {
            path: root.to_path_buf(),
            reason: e.to_string(),
            source: Some(e),
        })?;
        if !is_folder {
            return Err(SweepError::InvalidRoot {
                path: root.to_path_buf(),
                reason: "not a folder".to_string(),
                source: None,
            });
        }

        info!(
            follow_links = self.options.follow_links,
            metadata = ?metadata_mask,
            "sweep started"
        );
        let started = Instant::now();

        let mut walk = Walk {
            session: SweepSession {
                id,
                root: root_ref.clone(),
                metadata_mask,
                follow_links: self.options.follow_links,
                stop: self.stop.clone(),
                current: None,
            },
            policy,
            stats: &mut self.stats,
            warnings: &mut self.warnings,
            visited: HashSet::from([root_ref.id()]),
        };
        let result = walk.folder(&root_ref, 1);

        let stats = &self.stats;
        match &result {
            Ok(()) => info!(
                folders = stats.folders_seen,
                files = stats.files_seen,
                processed = stats.files_processed,
                warnings = stats.warnings,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "sweep completed"
            ),
            Err(_) => info!(
                folders = stats.folders_seen,
                files = stats.files_seen,
                "sweep cancelled"
            ),
        }
        result
    }
}

/// Traversal state for a single sweep.
struct Walk<'a> {
    session: SweepSession,
    policy: &'a mut dyn DecisionPolicy,
    stats: &'a mut SweepStats,
    warnings: &'a mut Vec<SweepWarning>,
    visited: HashSet<FileId>,
}

impl Walk<'_> {
    fn stopped(&self) -> bool {
        self.session.stop.is_stopped()
    }

    fn warn(&mut self, warning: SweepWarning) {
        warn!("{}", warning);
        self.stats.warnings += 1;
        self.warnings.push(warning);
    }

    /// Sweep the direct children of `folder`; `depth` is the children's depth.
    fn folder(&mut self, folder: &ObjectReference, depth: usize) -> Result<(), SweepError> {
        let folder_path = folder.resolved_path();
        let entries = match fs::read_dir(folder_path) {
            Ok(entries) => entries,
            Err(e) => {
                self.warn(SweepWarning::DirectoryEnumerationFailed {
                    path: folder_path.to_path_buf(),
                    reason: e.to_string(),
                });
                return Ok(());
            }
        };

        for entry in entries {
            if self.stopped() {
                return Err(SweepError::Cancelled);
            }

            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.warn(SweepWarning::DirectoryEnumerationFailed {
                        path: folder_path.to_path_buf(),
                        reason: e.to_string(),
                    });
                    break;
                }
            };

            let name = entry.file_name();
            if name == "." || name == ".." {
                continue;
            }
            self.entry(folder, &entry.path(), name.to_string_lossy().into_owned(), depth)?;
        }

        Ok(())
    }

    fn entry(
        &mut self,
        parent: &ObjectReference,
        path: &Path,
        name: String,
        depth: usize,
    ) -> Result<(), SweepError> {
        let resolved = match resolver::resolve_entry(path, self.session.follow_links) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.warn(SweepWarning::EntryResolveFailed {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
                return Ok(());
            }
        };

        if !self.visited.insert(resolved.reference.id()) {
            debug!(path = %path.display(), "already visited, skipping");
            self.stats.duplicates_skipped += 1;
            return Ok(());
        }

        let metadata = if self.session.metadata_mask.is_empty() {
            None
        } else {
            self.stats.metadata_lookups += 1;
            Some(resolver::record_from_metadata(
                path,
                &resolved.metadata,
                self.session.metadata_mask,
            ))
        };

        let descriptor = EntryDescriptor {
            reference: resolved.reference,
            name,
            parent: parent.clone(),
            is_folder: resolved.is_folder,
            is_link: resolved.is_link,
            depth,
            metadata,
        };

        if descriptor.is_folder {
            self.stats.folders_seen += 1;
        } else {
            self.stats.files_seen += 1;
        }

        self.session.current = Some(descriptor.reference.clone());
        let decision = self.policy.should_process(&self.session, &descriptor);

        match (descriptor.is_folder, decision) {
            (_, Decision::Skip) => {}
            (true, Decision::Descend) => {
                if descriptor.is_link && !self.session.follow_links {
                    debug!(path = %path.display(), "not following link to folder");
                } else {
                    self.stats.folders_descended += 1;
                    self.folder(&descriptor.reference, depth + 1)?;
                }
            }
            (false, Decision::ProcessContent) => {
                let content = content::map_read_only(&descriptor.reference);
                match content {
                    Some(_) => self.stats.views_mapped += 1,
                    None => {
                        self.stats.map_failures += 1;
                        warn!(path = %path.display(), "could not map file contents");
                    }
                }
                self.stats.files_processed += 1;
                self.policy
                    .process_content(&self.session, &descriptor, content);
            }
            (is_folder, decision) => {
                debug!(
                    path = %path.display(),
                    is_folder,
                    %decision,
                    "decision does not apply to entry kind, skipping"
                );
            }
        }

        Ok(())
    }
}
