//! Decision policy trait.
//!
//! A sweep asks its policy what to do with every entry it finds. This keeps
//! the traversal engine independent of what the caller is looking for.

use crate::content::MappedContent;
use crate::model::{Decision, EntryDescriptor};
use crate::sweep::SweepSession;

/// Caller-supplied decisions for a sweep.
///
/// Both methods run synchronously on the sweeping thread, one entry at a
/// time. Return promptly: the stop flag is only checked between entries.
///
/// Implementations must not create, delete or rename anything inside the
/// tree being swept while a callback runs. The engine cannot detect this;
/// entries may be missed or seen twice if it happens.
pub trait DecisionPolicy: Send {
    /// Called for every file and folder seen.
    ///
    /// For a folder, return `Decision::Descend` to sweep its contents. For a
    /// file, return `Decision::ProcessContent` to receive its bytes through
    /// `process_content`. Anything else skips the entry.
    fn should_process(&mut self, session: &SweepSession, entry: &EntryDescriptor) -> Decision;

    /// Called for every file `should_process` accepted.
    ///
    /// `content` is `None` when the file could not be mapped; the entry is
    /// still valid. The view is released when it is dropped: let it fall out
    /// of scope to close the file right away, or keep it to hold the file
    /// open for as long as needed.
    fn process_content(
        &mut self,
        session: &SweepSession,
        entry: &EntryDescriptor,
        content: Option<MappedContent>,
    ) {
        let _ = (session, entry, content);
    }
}

/// A policy assembled from two closures.
pub struct FnPolicy<S, C> {
    should_process: S,
    process_content: C,
}

impl<S> FnPolicy<S, fn(&EntryDescriptor, Option<MappedContent>)> {
    /// A policy that only decides; accepted files are mapped and released.
    pub fn deciding(should_process: S) -> Self
    where
        S: FnMut(&EntryDescriptor) -> Decision + Send,
    {
        FnPolicy {
            should_process,
            process_content: |_, _| {},
        }
    }
}

impl<S, C> FnPolicy<S, C> {
    pub fn new(should_process: S, process_content: C) -> Self
    where
        S: FnMut(&EntryDescriptor) -> Decision + Send,
        C: FnMut(&EntryDescriptor, Option<MappedContent>) + Send,
    {
        FnPolicy {
            should_process,
            process_content,
        }
    }
}

impl<S, C> DecisionPolicy for FnPolicy<S, C>
where
    S: FnMut(&EntryDescriptor) -> Decision + Send,
    C: FnMut(&EntryDescriptor, Option<MappedContent>) + Send,
{
    fn should_process(&mut self, _session: &SweepSession, entry: &EntryDescriptor) -> Decision {
        (self.should_process)(entry)
    }

    fn process_content(
        &mut self,
        _session: &SweepSession,
        entry: &EntryDescriptor,
        content: Option<MappedContent>,
    ) {
        (self.process_content)(entry, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::Sweeper;
    use std::fs;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_deciding_policy_maps_and_releases() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("a.txt"), "aaa").expect("Failed to write file");
        fs::write(temp_dir.path().join("b.bin"), "bbb").expect("Failed to write file");

        let mut sweeper = Sweeper::new();
        sweeper.set_policy(FnPolicy::deciding(|entry: &EntryDescriptor| {
            Decision::process_if(entry.name.ends_with(".txt"))
        }));
        sweeper
            .sweep(temp_dir.path(), crate::model::MetadataMask::empty())
            .expect("Sweep failed");

        assert_eq!(sweeper.stats().files_seen, 2);
        assert_eq!(sweeper.stats().files_processed, 1);
        assert_eq!(sweeper.stats().views_mapped, 1);
    }

    #[test]
    fn test_closure_policy_receives_content() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::create_dir(temp_dir.path().join("sub")).expect("Failed to create dir");
        fs::write(temp_dir.path().join("sub/data.txt"), "payload").expect("Failed to write file");

        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let seen_clone = Arc::clone(&seen);

        let mut sweeper = Sweeper::new();
        sweeper.set_policy(FnPolicy::new(
            |entry: &EntryDescriptor| {
                if entry.is_folder {
                    Decision::Descend
                } else {
                    Decision::ProcessContent
                }
            },
            move |entry: &EntryDescriptor, content: Option<MappedContent>| {
                let text = content
                    .map(|c| String::from_utf8_lossy(&c).into_owned())
                    .unwrap_or_default();
                seen_clone
                    .lock()
                    .unwrap()
                    .push(format!("{}={}", entry.name, text));
            },
        ));
        sweeper
            .sweep(temp_dir.path(), crate::model::MetadataMask::empty())
            .expect("Sweep failed");

        assert_eq!(*seen.lock().unwrap(), vec!["data.txt=payload".to_string()]);
    }

    #[test]
    fn test_default_process_content_is_noop() {
        struct DecideOnly;

        impl DecisionPolicy for DecideOnly {
            fn should_process(&mut self, _: &SweepSession, _: &EntryDescriptor) -> Decision {
                Decision::ProcessContent
            }
        }

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        fs::write(temp_dir.path().join("f"), "x").expect("Failed to write file");

        let mut sweeper = Sweeper::new();
        sweeper.set_policy(DecideOnly);
        sweeper
            .sweep(temp_dir.path(), crate::model::MetadataMask::empty())
            .expect("Sweep failed");
        assert_eq!(sweeper.stats().files_processed, 1);
    }
}
