//! Artifact entry listing
//!
//! An artifact is a zip archive, or an exploded directory with the same
//! layout. Entries named `a/b/TypeName.class` denote the type `a.b.TypeName`.

use crate::error::Result;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;
use tracing::debug;
use walkdir::WalkDir;
use zip::ZipArchive;

/// Extension of entries that denote types
pub const TYPE_ENTRY_EXTENSION: &str = ".class";

/// List the entry names of the artifact at `path`
///
/// Archive entries keep their archive order. Directory entries are the
/// relative paths of every regular file, `/`-separated and sorted. Symbolic
/// links are not followed.
pub fn entry_names(path: &Path) -> Result<Vec<String>> {
    let names = if path.is_dir() {
        let mut names = collect_files(path)?;
        names.sort();
        names
    } else {
        let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
        let mut names = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            names.push(archive.by_index_raw(index)?.name().to_string());
        }
        names
    };

    debug!(artifact = %path.display(), entries = names.len(), "Listed artifact entries");
    Ok(names)
}

fn collect_files(root: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Ok(relative) = entry.path().strip_prefix(root) {
            let parts: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            names.push(parts.join("/"));
        }
    }
    Ok(names)
}

/// Check if `entry` denotes a type
pub fn is_type_entry(entry: &str) -> bool {
    entry.ends_with(TYPE_ENTRY_EXTENSION)
}

/// Qualified type name denoted by `entry` (`a/b/Name.class` → `a.b.Name`)
pub fn extract_type_name(entry: &str) -> String {
    let stripped = entry.rsplit_once('.').map_or(entry, |(stem, _)| stem);
    stripped.replace('/', ".")
}
