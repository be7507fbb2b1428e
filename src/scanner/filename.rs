use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Title/artist guessed from the file name.
#[derive(Debug, Default, PartialEq)]
pub struct ParsedPath {
    pub title: Option<String>,
    pub artist: Option<String>,
}

// Leading track number, e.g. "03 - ", "03. ", "3_"
static TRACK_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{1,3}\s*[-._)]?\s+").unwrap());

// "Title - Artist"; the last separator wins so titles may contain " - "
static TITLE_ARTIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        ^(?P<title>.+)
        \s+[-–]\s+
        (?P<artist>.+)$",
    )
    .unwrap()
});

static SPACES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

fn clean(s: &str) -> Option<String> {
    let s = SPACES_RE.replace_all(s.trim(), " ").into_owned();
    if s.is_empty() { None } else { Some(s) }
}

/// Parse `Title - Artist` style file stems. Underscores count as spaces and a
/// leading track number is dropped. A stem without a separator yields only a
/// title.
pub fn parse_path(path: &Path) -> ParsedPath {
    let stem = match path.file_stem().and_then(|s| s.to_str()) {
        Some(s) => s.replace('_', " "),
        None => return ParsedPath::default(),
    };
    let stem = TRACK_PREFIX_RE.replace(stem.trim(), "");

    if let Some(caps) = TITLE_ARTIST_RE.captures(&stem) {
        return ParsedPath {
            title: clean(&caps["title"]),
            artist: clean(&caps["artist"]),
        };
    }

    ParsedPath {
        title: clean(&stem),
        artist: None,
    }
}
