//! Utilities (source file discovery, pipe-delimited path lists, etc.).

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

pub mod unicode;

/// Delimiter used for path lists persisted in the config store.
pub const FILE_LIST_DELIMITER: char = '|';

/// Split a pipe-delimited list, dropping empty entries.
pub fn split_path_list(list: &str) -> Vec<String> {
    list.split(FILE_LIST_DELIMITER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join paths into the pipe-delimited form, trailing delimiter included.
pub fn join_path_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for item in items {
        out.push_str(item.as_ref());
        out.push(FILE_LIST_DELIMITER);
    }
    out
}

/// Expand a list of files and folders into source files.
///
/// Folders contribute every `*.cs` file below them (recursively); plain files
/// are taken as given. Paths already present in `existing`, or seen earlier in
/// this call, are skipped. Missing entries are ignored.
pub fn collect_source_files(items: &[String], existing: &[PathBuf]) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = Vec::new();
    for item in items {
        let path = Path::new(item);
        if path.is_dir() {
            let mut files = Vec::new();
            walk_sources(path, &mut files);
            files.sort();
            for f in files {
                push_unique(&mut found, existing, f);
            }
        } else if path.is_file() {
            push_unique(&mut found, existing, absolute(path));
        }
    }
    found
}

fn walk_sources(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let is_source = entry
            .path()
            .extension()
            .and_then(|s| s.to_str())
            .map(|e| e.eq_ignore_ascii_case("cs"))
            .unwrap_or(false);
        if is_source {
            out.push(absolute(entry.path()));
        }
    }
}

fn push_unique(found: &mut Vec<PathBuf>, existing: &[PathBuf], p: PathBuf) {
    if !existing.contains(&p) && !found.contains(&p) {
        found.push(p);
    }
}

fn absolute(p: &Path) -> PathBuf {
    fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf())
}
