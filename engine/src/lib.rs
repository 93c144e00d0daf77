//! # Sweeper - Folder Sweep Library
//!
//! A fast way to visit every file and subfolder below a root folder, asking a
//! caller-supplied policy what to do with each one, and handing accepted
//! files over as memory-mapped, read-only views.
//!
//! ## Overview
//!
//! - Depth-first, pre-order traversal in directory enumeration order
//! - Per-entry decisions through the `DecisionPolicy` trait
//! - Optional per-entry metadata, selected by a `MetadataMask`
//! - Zero-copy file contents (`MappedContent`), closed when dropped
//! - Cancellation from any thread through a `StopHandle`
//! - Per-entry error isolation: only an invalid root fails a sweep
//!
//! ## Basic Usage
//!
//! ```no_run
//! use sweeper::{Decision, EntryDescriptor, FnPolicy, MetadataMask, Sweeper};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sweeper = Sweeper::new();
//! sweeper.set_follow_links(false);
//! sweeper.set_policy(FnPolicy::new(
//!     |entry: &EntryDescriptor| {
//!         if entry.is_folder {
//!             Decision::Descend
//!         } else {
//!             Decision::process_if(entry.name.ends_with(".log"))
//!         }
//!     },
//!     |entry: &EntryDescriptor, content| {
//!         let lines = content.map(|c| c.iter().filter(|b| **b == b'\n').count());
//!         println!("{}: {:?} lines", entry.name, lines);
//!     },
//! ));
//!
//! sweeper.sweep("/var/log", MetadataMask::SIZE | MetadataMask::MODIFIED)?;
//! println!("{} files seen", sweeper.stats().files_seen);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (ObjectReference, EntryDescriptor, masks, Decision)
//! - **error**: Sweep errors and recorded warnings
//! - **resolver**: Path/reference conversion, classification, metadata lookup
//! - **content**: Memory-mapped file views
//! - **policy**: The decision policy trait
//! - **sweep**: The traversal engine
//! - **time**: Timestamp conversions
//! - **checksums**: Digests of mapped content

pub mod model;
pub mod error;
pub mod resolver;
pub mod content;
pub mod policy;
pub mod sweep;
pub mod time;
pub mod checksums;

// Re-export main types and functions
pub use model::{
    Decision, EntryDescriptor, FileId, ItemFlags, MetadataMask, MetadataRecord, ObjectReference,
};
pub use error::{ResolveError, SweepError, SweepWarning};
pub use resolver::{classify, metadata_of, path_of, resolve};
pub use content::{map_read_only, MappedContent};
pub use policy::{DecisionPolicy, FnPolicy};
pub use sweep::{StopHandle, SweepOptions, SweepSession, SweepStats, Sweeper};
pub use time::{datetime_from_file_time, file_time_from_interval, interval_from_file_time};
pub use checksums::{checksum_bytes, checksum_content, ChecksumAlgorithm, ChecksumValue};
