pub mod filename;
pub mod metadata;

use crate::SUPPORTED_EXTENSIONS;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One file ready to be indexed, with its resolved identity.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexJob {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub external_ref: String,
    pub duration_secs: Option<f64>,
}

/// Values supplied on the command line; they win over tags and file names.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub external_ref: Option<String>,
}

/// A file that was found but can't be indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ScanResult {
    pub jobs: Vec<IndexJob>,
    pub rejected: Vec<Rejected>,
}

fn is_supported(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Collect supported audio files under `paths` (files or directories),
/// sorted and deduplicated.
pub fn collect_audio_files(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();

    for path in paths {
        for entry in WalkDir::new(path).follow_links(true).into_iter() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::warn!("Skipping unreadable entry under {}: {}", path.display(), e);
                    continue;
                }
            };
            if entry.file_type().is_file() && is_supported(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    files.sort();
    files.dedup();
    files
}

/// Resolve title, artist and external reference for each file.
///
/// Command-line overrides come first, then tags, then the `Title - Artist`
/// file name. Files still missing a title or artist are rejected.
pub fn scan(paths: &[PathBuf], overrides: &Overrides) -> ScanResult {
    let mut result = ScanResult::default();

    for path in collect_audio_files(paths) {
        match resolve(&path, overrides) {
            Ok(job) => result.jobs.push(job),
            Err(reason) => {
                log::warn!("Not indexing {}: {}", path.display(), reason);
                result.rejected.push(Rejected { path, reason });
            }
        }
    }

    log::info!(
        "Scan found {} indexable files ({} rejected)",
        result.jobs.len(),
        result.rejected.len()
    );
    result
}

fn resolve(path: &Path, overrides: &Overrides) -> Result<IndexJob, String> {
    let tags = metadata::read_tags(path);
    let parsed = filename::parse_path(path);

    let title = overrides
        .title
        .clone()
        .or(tags.title)
        .or(parsed.title)
        .ok_or_else(|| "no title found in tags or file name".to_string())?;
    let artist = overrides
        .artist
        .clone()
        .or(tags.artist)
        .or(parsed.artist)
        .ok_or_else(|| "no artist found in tags or file name".to_string())?;
    let external_ref = overrides
        .external_ref
        .clone()
        .or(tags.isrc)
        .unwrap_or_default();

    Ok(IndexJob {
        path: path.to_path_buf(),
        title,
        artist,
        external_ref,
        duration_secs: tags.duration_secs,
    })
}
