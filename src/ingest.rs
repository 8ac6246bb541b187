//! Ingestion: decode knowledge files into new spaces.
//!
//! Loads are fail-fast. A failing file aborts its space (nothing is
//! registered for it) and a failing settings entry aborts the remaining
//! entries; spaces loaded before the failure stay registered.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::atom::AtomSpace;
use crate::atom::sexpr::decode_file;
use crate::config::{load_settings, SpaceEntry, SpaceSource};
use crate::error::{HubError, HubResult};
use crate::space::{validate_id, Space, SpaceRegistry};

/// Summary of one completed load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub id: String,
    pub files: usize,
    pub num_nodes: usize,
    pub num_links: usize,
    pub elapsed_ms: u64,
}

fn ensure_new(registry: &SpaceRegistry, id: &str) -> HubResult<()> {
    validate_id(id)?;
    if registry.contains(id) {
        return Err(HubError::DuplicateId { id: id.to_string() });
    }
    Ok(())
}

fn register(
    registry: &SpaceRegistry,
    id: &str,
    store: AtomSpace,
    files: usize,
    start: Instant,
) -> HubResult<(Arc<Space>, LoadReport)> {
    let report = LoadReport {
        id: id.to_string(),
        files,
        num_nodes: store.num_nodes(),
        num_links: store.num_links(),
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    let space = registry.create_space(id, store)?;
    tracing::info!(
        space = %report.id,
        files = report.files,
        nodes = report.num_nodes,
        links = report.num_links,
        elapsed_ms = report.elapsed_ms,
        "atomspace loaded"
    );
    Ok((space, report))
}

/// Decode one knowledge file into a new space named `id`.
pub fn load_space(
    registry: &SpaceRegistry,
    path: &Path,
    id: &str,
) -> HubResult<(Arc<Space>, LoadReport)> {
    ensure_new(registry, id)?;
    let start = Instant::now();

    let store = AtomSpace::new();
    decode_file(path, &store)?;
    register(registry, id, store, 1, start)
}

/// Files of `dir` in `read_dir` enumeration order.
///
/// Subdirectories and dot-files are skipped. The order is whatever the
/// filesystem reports and is not sorted.
pub fn directory_files(dir: &Path) -> HubResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(HubError::DirectoryNotFound {
            path: dir.display().to_string(),
        });
    }
    let io_err = |e| HubError::Io {
        path: dir.display().to_string(),
        source: e,
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if path.is_file() && !hidden {
            files.push(path);
        }
    }
    Ok(files)
}

/// Decode every file of `dir` into one new space named `id`.
///
/// The first file that fails to decode aborts the load.
pub fn load_directory(
    registry: &SpaceRegistry,
    dir: &Path,
    id: &str,
) -> HubResult<(Arc<Space>, LoadReport)> {
    ensure_new(registry, id)?;
    let start = Instant::now();

    let files = directory_files(dir)?;
    if files.is_empty() {
        tracing::warn!(space = %id, dir = %dir.display(), "directory has no files; space is empty");
    }

    let store = AtomSpace::new();
    for (i, file) in files.iter().enumerate() {
        let before = store.size();
        let file_start = Instant::now();
        tracing::info!(space = %id, "Parsing {} ({}/{})", file.display(), i + 1, files.len());
        decode_file(file, &store)?;
        tracing::debug!(
            space = %id,
            file = %file.display(),
            added = store.size() - before,
            elapsed_ms = file_start.elapsed().as_millis() as u64,
            "file decoded"
        );
    }
    register(registry, id, store, files.len(), start)
}

/// Load each entry in order, stopping at the first failure.
pub fn load_from_settings(
    registry: &SpaceRegistry,
    entries: &[SpaceEntry],
) -> HubResult<Vec<LoadReport>> {
    let mut reports = Vec::with_capacity(entries.len());
    for entry in entries {
        tracing::info!(space = %entry.id, "Loading atomspace");
        let (_, report) = match entry.source()? {
            SpaceSource::File(path) => load_space(registry, &path, &entry.id)?,
            SpaceSource::Directory(dir) => {
                tracing::info!(space = %entry.id, dir = %dir.display(), "Loading atomspace from directory");
                load_directory(registry, &dir, &entry.id)?
            }
        };
        reports.push(report);
    }
    Ok(reports)
}

/// Read a settings file and load every space it names.
pub fn load_settings_file(registry: &SpaceRegistry, path: &Path) -> HubResult<Vec<LoadReport>> {
    let entries = load_settings(path)?;
    load_from_settings(registry, &entries)
}
