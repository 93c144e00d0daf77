//! sweep - Command-line interface for the folder sweeper.
//!
//! Lists the files and folders below a root, optionally with metadata and a
//! content checksum per file. Output goes to stdout (text or JSON lines);
//! logs and the final summary go to stderr.

use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use sweeper::{
    checksum_content, datetime_from_file_time, ChecksumAlgorithm, ChecksumValue, Decision,
    DecisionPolicy, EntryDescriptor, MappedContent, MetadataMask, SweepError, SweepOptions,
    SweepSession, Sweeper,
};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// sweep - Walk a folder tree and report what is in it
#[derive(Parser, Debug)]
#[command(name = "sweep")]
#[command(version = "0.1.0")]
#[command(about = "Recursively list files and folders, with optional metadata and checksums")]
struct Args {
    /// Folder to sweep
    #[arg(value_name = "ROOT")]
    root: PathBuf,

    /// Report symbolic links to folders without descending into them
    #[arg(long)]
    no_follow_links: bool,

    /// Metadata to fetch per entry: comma-separated fields or "all"
    /// (size, allocated_size, created, modified, accessed, changed,
    /// permissions, owner, node_id, link_count, valence)
    #[arg(long, value_name = "FIELDS", default_value = "")]
    metadata: String,

    /// Checksum file contents: crc32, md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM")]
    hash: Option<String>,

    /// Only report files with this extension (repeatable)
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Include entries whose names start with a dot
    #[arg(long)]
    hidden: bool,

    /// Do not report entries nested deeper than this
    #[arg(long, value_name = "N")]
    max_depth: Option<usize>,

    /// Stop after reporting this many files
    #[arg(long, value_name = "N")]
    limit: Option<u64>,

    /// Print one JSON object per entry
    #[arg(long)]
    json: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

/// How a sweep ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    LimitReached,
    Interrupted,
}

/// One output line.
#[derive(Debug, Serialize)]
struct Record<'a> {
    path: String,
    kind: &'a str,
    depth: usize,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    link: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    checksum: Option<&'a ChecksumValue>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    unmapped: bool,
}

/// Counters shared between the policy and the caller.
#[derive(Debug, Default)]
struct Tally {
    files: AtomicU64,
    folders: AtomicU64,
    bytes_hashed: AtomicU64,
    limit_reached: AtomicBool,
}

type Output = Arc<Mutex<dyn Write + Send>>;

/// CLI implementation of DecisionPolicy: filters entries and prints them
struct CliPolicy {
    out: Output,
    tally: Arc<Tally>,
    hash: Option<ChecksumAlgorithm>,
    extensions: Vec<String>,
    hidden: bool,
    max_depth: Option<usize>,
    limit: Option<u64>,
    json: bool,
}

impl CliPolicy {
    fn wants_file(&self, entry: &EntryDescriptor) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        std::path::Path::new(&entry.name)
            .extension()
            .map(|ext| {
                let ext = ext.to_string_lossy();
                self.extensions
                    .iter()
                    .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(&ext))
            })
            .unwrap_or(false)
    }

    fn emit(&self, entry: &EntryDescriptor, checksum: Option<&ChecksumValue>, unmapped: bool) {
        let metadata = entry.metadata.as_ref();
        let record = Record {
            path: entry.path().display().to_string(),
            kind: if entry.is_folder { "folder" } else { "file" },
            depth: entry.depth,
            link: entry.is_link,
            size: metadata.and_then(|m| m.size),
            modified: metadata
                .and_then(|m| m.modified)
                .and_then(datetime_from_file_time)
                .map(|dt| dt.to_rfc3339()),
            checksum,
            unmapped,
        };

        let line = if self.json {
            match serde_json::to_string(&record) {
                Ok(line) => line,
                Err(e) => {
                    error!(path = %record.path, error = %e, "could not encode record");
                    return;
                }
            }
        } else {
            Self::format_text(&record)
        };

        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", line) {
            debug!(error = %e, "output closed");
        }
    }

    fn format_text(record: &Record<'_>) -> String {
        let mut line = String::new();
        if let Some(checksum) = record.checksum {
            line.push_str(checksum.hex());
            line.push_str("  ");
        } else if record.unmapped {
            line.push_str("<unmapped>  ");
        }
        line.push_str(&record.path);
        if record.kind == "folder" {
            line.push('/');
        }
        if record.link {
            line.push_str(" @");
        }
        if let Some(size) = record.size {
            line.push_str(&format!("\t{}", format_bytes(size)));
        }
        if let Some(modified) = &record.modified {
            line.push_str(&format!("\t{}", modified));
        }
        line
    }

    /// Count a reported file, stopping the sweep once the limit is hit.
    fn count_file(&self, session: &SweepSession) {
        let reported = self.tally.files.fetch_add(1, Ordering::Relaxed) + 1;
        if self.limit.map(|limit| reported >= limit).unwrap_or(false) {
            self.tally.limit_reached.store(true, Ordering::Relaxed);
            session.stop();
        }
    }
}

impl DecisionPolicy for CliPolicy {
    fn should_process(&mut self, session: &SweepSession, entry: &EntryDescriptor) -> Decision {
        if !self.hidden && entry.name.starts_with('.') {
            return Decision::Skip;
        }
        if self.max_depth.map(|max| entry.depth > max).unwrap_or(false) {
            return Decision::Skip;
        }

        if entry.is_folder {
            self.tally.folders.fetch_add(1, Ordering::Relaxed);
            self.emit(entry, None, false);
            return Decision::descend_if(self.max_depth.map(|max| entry.depth < max).unwrap_or(true));
        }

        if !self.wants_file(entry) {
            return Decision::Skip;
        }
        if self.hash.is_some() {
            return Decision::ProcessContent;
        }
        self.emit(entry, None, false);
        self.count_file(session);
        Decision::Skip
    }

    fn process_content(
        &mut self,
        session: &SweepSession,
        entry: &EntryDescriptor,
        content: Option<MappedContent>,
    ) {
        let checksum = match (self.hash, content.as_ref()) {
            (Some(algorithm), Some(view)) => {
                self.tally
                    .bytes_hashed
                    .fetch_add(view.len() as u64, Ordering::Relaxed);
                Some(checksum_content(view, algorithm))
            }
            _ => None,
        };
        self.emit(entry, checksum.as_ref(), checksum.is_none());
        self.count_file(session);
    }
}

fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

fn format_duration(elapsed: std::time::Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let mins = (secs % 3600) / 60;
    let secs = secs % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {}s", mins, secs)
    } else {
        format!("{:.2}s", elapsed.as_secs_f64())
    }
}

fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("sweeper=debug,warn")
        } else {
            EnvFilter::new("sweeper=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Validate arguments and build a sweeper with the CLI policy installed.
fn build_sweeper(args: &Args, out: Output) -> Result<(Sweeper, Arc<Tally>), String> {
    let metadata_mask = MetadataMask::parse(&args.metadata)?;

    let hash = match &args.hash {
        Some(name) => Some(name.parse::<ChecksumAlgorithm>()?),
        None => None,
    };

    if args.limit == Some(0) {
        return Err("--limit must be at least 1".to_string());
    }

    let options = SweepOptions::default()
        .follow_links(!args.no_follow_links)
        .metadata_mask(metadata_mask);

    let tally = Arc::new(Tally::default());
    let mut sweeper = Sweeper::with_options(options);
    sweeper.set_policy(CliPolicy {
        out,
        tally: Arc::clone(&tally),
        hash,
        extensions: args.extensions.clone(),
        hidden: args.hidden,
        max_depth: args.max_depth,
        limit: args.limit,
        json: args.json,
    });

    Ok((sweeper, tally))
}

/// Run the sweep and print the summary to stderr.
fn execute(sweeper: &mut Sweeper, tally: &Tally, args: &Args) -> Result<Outcome, String> {
    let started = Instant::now();
    let result = sweeper.sweep_folder(&args.root);

    let outcome = match result {
        Ok(()) => Outcome::Completed,
        Err(SweepError::Cancelled) if tally.limit_reached.load(Ordering::Relaxed) => {
            Outcome::LimitReached
        }
        Err(SweepError::Cancelled) => Outcome::Interrupted,
        Err(e) => return Err(e.to_string()),
    };

    let stats = sweeper.stats();
    eprintln!();
    match outcome {
        Outcome::Completed => eprintln!("Sweep complete!"),
        Outcome::LimitReached => eprintln!(
            "Stopped after {} files (limit).",
            tally.files.load(Ordering::Relaxed)
        ),
        Outcome::Interrupted => eprintln!("Sweep interrupted."),
    }
    eprintln!(
        "Summary: {} folders, {} files reported ({} folders and {} files seen)",
        tally.folders.load(Ordering::Relaxed),
        tally.files.load(Ordering::Relaxed),
        stats.folders_seen,
        stats.files_seen
    );
    if stats.files_processed > 0 {
        eprintln!(
            "Hashed: {} across {} files ({} could not be mapped)",
            format_bytes(tally.bytes_hashed.load(Ordering::Relaxed)),
            stats.views_mapped,
            stats.map_failures
        );
    }
    eprintln!("Elapsed: {}", format_duration(started.elapsed()));

    if !sweeper.warnings().is_empty() {
        eprintln!();
        eprintln!("Skipped:");
        for warning in sweeper.warnings() {
            eprintln!("  {}", warning);
        }
    }

    Ok(outcome)
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args, out: Output) -> Result<Outcome, String> {
    let (mut sweeper, tally) = build_sweeper(args, out)?;
    execute(&mut sweeper, &tally, args)
}

fn main() {
    let args = Args::parse();
    setup_logging(args.verbose);

    let out: Output = Arc::new(Mutex::new(std::io::stdout()));
    let exit_code = match build_sweeper(&args, out) {
        Ok((mut sweeper, tally)) => {
            let handle = sweeper.stop_handle();
            if let Err(e) = ctrlc::set_handler(move || handle.stop()) {
                debug!(error = %e, "could not install interrupt handler");
            }
            match execute(&mut sweeper, &tally, &args) {
                Ok(Outcome::Completed) | Ok(Outcome::LimitReached) => 0,
                Ok(Outcome::Interrupted) => 1,
                Err(msg) => {
                    eprintln!("Error: {}", msg);
                    2
                }
            }
        }
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}
