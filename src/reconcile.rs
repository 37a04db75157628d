//! # Directory Reconciliation
//!
//! Everything that touches the synchronized tree on disk:
//! - enumerating files as wire paths (`/`-separated, relative to the root)
//! - hashing file content
//! - matching exclusions by exact path or glob pattern
//! - deleting files that the peer no longer has, then empty directories
//! - resolving a peer-supplied wire path back into the local tree
//!
//! Walks are iterative (`walkdir`), so tree depth is bounded by the file
//! system rather than by the call stack.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{Result, SyncError};

/// Files removed and directories cleaned up by [`prune_orphans`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub files_removed: Vec<String>,
    pub dirs_removed: usize,
}

/// Paths a peer must leave alone: exact wire paths plus glob patterns.
///
/// A path is excluded when it or any of its ancestor directories matches,
/// so excluding `cache` also covers `cache/a/b.bin`.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    paths: HashSet<String>,
    patterns: GlobSet,
}

impl Default for ExcludeSet {
    fn default() -> Self {
        Self {
            paths: HashSet::new(),
            patterns: GlobSet::empty(),
        }
    }
}

impl ExcludeSet {
    pub fn new<P, G>(
        paths: impl IntoIterator<Item = P>,
        patterns: impl IntoIterator<Item = G>,
    ) -> Result<Self>
    where
        P: AsRef<str>,
        G: AsRef<str>,
    {
        let paths = paths
            .into_iter()
            .map(|p| normalize_exclusion(p.as_ref()).to_string())
            .filter(|p| !p.is_empty())
            .collect();

        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = GlobBuilder::new(pattern.as_ref())
                .literal_separator(true)
                .build()?;
            builder.add(glob);
        }

        Ok(Self {
            paths,
            patterns: builder.build()?,
        })
    }

    pub fn is_excluded(&self, wire_path: &str) -> bool {
        ancestors(wire_path).any(|p| self.paths.contains(p) || self.patterns.is_match(p))
    }
}

fn normalize_exclusion(path: &str) -> &str {
    let path = path.trim_end_matches('/');
    path.strip_prefix("./").unwrap_or(path)
}

/// `a/b/c` yields `a`, `a/b`, `a/b/c`.
fn ancestors(path: &str) -> impl Iterator<Item = &str> {
    path.match_indices('/')
        .map(move |(i, _)| &path[..i])
        .chain(std::iter::once(path))
}

/// Convert a path relative to the root into its wire form.
pub fn to_wire_path(relative: &Path) -> Result<String> {
    let unsafe_path = || SyncError::UnsafePath(relative.display().to_string());

    let mut parts = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(unsafe_path)?),
            _ => return Err(unsafe_path()),
        }
    }

    if parts.is_empty() {
        return Err(unsafe_path());
    }
    Ok(parts.join("/"))
}

/// Resolve a peer-supplied wire path under `root`, refusing anything that
/// could land outside it.
pub fn resolve(root: &Path, wire_path: &str) -> Result<PathBuf> {
    let unsafe_path = || SyncError::UnsafePath(wire_path.to_string());

    if wire_path.is_empty() {
        return Err(unsafe_path());
    }

    let mut resolved = root.to_path_buf();
    for part in wire_path.split('/') {
        let mut components = Path::new(part).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) if name == part => resolved.push(name),
            _ => return Err(unsafe_path()),
        }
    }
    Ok(resolved)
}

/// Every regular file under `root`, as wire paths, sorted by name within
/// each directory.
///
/// Symbolic links are not followed, so linked files are neither listed nor
/// pruned. Paths that are not valid UTF-8 have no wire form; they are
/// skipped with a warning and left untouched on disk.
pub fn list_files(root: &Path) -> Result<Vec<String>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|_| SyncError::UnsafePath(entry.path().display().to_string()))?;
        if relative.to_str().is_none() {
            warn!("Skipping {}: name is not valid UTF-8", relative.display());
            continue;
        }
        files.push(to_wire_path(relative)?);
    }
    Ok(files)
}

/// Hex SHA-256 of a file's full content, streamed.
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Delete files under `root` that are neither kept nor excluded, then remove
/// directories left empty, deepest first. The root itself always stays.
pub fn prune_orphans(
    root: &Path,
    keep: &HashSet<String>,
    exclude: &ExcludeSet,
) -> Result<PruneReport> {
    let mut report = PruneReport::default();

    for path in list_files(root)? {
        if keep.contains(&path) || exclude.is_excluded(&path) {
            continue;
        }
        fs::remove_file(resolve(root, &path)?)?;
        debug!("Removed orphan {}", path);
        report.files_removed.push(path);
    }

    let mut dirs = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }

    for dir in dirs {
        // Directories without a wire form were never listed; leave them be.
        let wire = match dir.strip_prefix(root).ok().and_then(|r| to_wire_path(r).ok()) {
            Some(wire) => wire,
            None => continue,
        };
        if exclude.is_excluded(&wire) {
            continue;
        }
        if fs::read_dir(&dir)?.next().is_none() {
            fs::remove_dir(&dir)?;
            debug!("Removed empty directory {}", wire);
            report.dirs_removed += 1;
        }
    }

    Ok(report)
}
