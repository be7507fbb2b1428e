use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use std::path::Path;

/// Tags extracted from audio file metadata.
#[derive(Debug, Default)]
pub struct TagInfo {
    pub title: Option<String>,
    pub artist: Option<String>,
    /// ISRC, used as the external reference when present.
    pub isrc: Option<String>,
    pub duration_secs: Option<f64>,
}

/// Read tags from an audio file. Returns empty tags on failure.
pub fn read_tags(path: &Path) -> TagInfo {
    let tagged_file = match lofty::read_from_path(path) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("Could not read tags from {}: {}", path.display(), e);
            return TagInfo::default();
        }
    };

    let duration_secs = {
        let secs = tagged_file.properties().duration().as_secs_f64();
        if secs > 0.0 { Some(secs) } else { None }
    };

    // Try primary tag, then fall back
    let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
        return TagInfo {
            duration_secs,
            ..TagInfo::default()
        };
    };

    let non_empty = |s: &str| {
        let s = s.trim();
        if s.is_empty() { None } else { Some(s.to_string()) }
    };

    TagInfo {
        title: tag.title().and_then(|s| non_empty(&*s)),
        artist: tag.artist().and_then(|s| non_empty(&*s)),
        isrc: tag.get_string(&ItemKey::Isrc).and_then(non_empty),
        duration_secs,
    }
}
