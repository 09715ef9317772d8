//! Catalog and link data structures
//!
//! These types describe what the traversal engine scrapes from a listing site
//! (items, seasons, episodes and their unresolved payloads) and what the
//! extractors finally hand to the sinks (playable links and subtitles).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// Whether a title is a single movie or an episodic series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentKind {
    Movie,
    TvSeries,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => write!(f, "movie"),
            Self::TvSeries => write!(f, "tv series"),
        }
    }
}

/// A title built from a detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    /// Display title with the "Download " prefix removed
    pub title: String,
    /// Canonical detail page URL
    pub url: String,
    /// Poster image, when the page has one
    pub poster: Option<String>,
    /// Movie or series, decided once from the raw title
    pub kind: ContentKind,
}

/// One card on a listing or search page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub poster: Option<String>,
}

/// Not-yet-resolved data attached to a movie or an episode.
///
/// The tag is decided while traversing, so the orchestrator never has to
/// re-sniff string content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Payload {
    /// A same-site page whose buttons lead to pages of mirror buttons
    StructuredPage(String),
    /// Raw HTML (or plain text) containing mirror URL literals
    RawFragment(String),
}

impl Payload {
    /// Tags a free-form blob coming from outside the traversal engine.
    ///
    /// A blob consisting of a single absolute URL on `origin_host` (or one of
    /// its subdomains) is a structured page. Everything else is treated as a
    /// raw fragment to be scanned for URL literals.
    pub fn classify(blob: &str, origin_host: &str) -> Self {
        let trimmed = blob.trim();
        let same_site = url::Url::parse(trimmed)
            .ok()
            .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
            .map(|host| {
                let origin = origin_host.to_ascii_lowercase();
                host == origin || host.ends_with(&format!(".{origin}"))
            })
            .unwrap_or(false);

        if same_site {
            Self::StructuredPage(trimmed.to_string())
        } else {
            Self::RawFragment(blob.to_string())
        }
    }
}

/// A season button and the episodes discovered behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonGroup {
    /// 1-based, in document order of the non-archive season buttons
    pub number: usize,
    /// Heading text preceding the season button
    pub label: String,
    /// Resolution mentioned in the label, if any
    pub quality: Option<Quality>,
    /// Episodes in discovery order
    pub episodes: Vec<EpisodeRecord>,
}

/// A single episode and its unresolved mirror payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRecord {
    /// The season number this episode belongs to
    pub season: usize,
    /// 1-based position of the episode marker within its season
    pub episode: usize,
    /// Display name taken from the marker's heading
    pub name: String,
    /// Mirrors to resolve later
    pub payload: Payload,
}

/// What the traversal engine produced for a detail page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TitleContent {
    Movie { payload: Payload },
    Series { seasons: Vec<SeasonGroup> },
}

/// A detail page turned into catalog data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedTitle {
    pub item: ContentItem,
    pub content: TitleContent,
}

impl LoadedTitle {
    /// Looks up an episode by season and episode number.
    pub fn episode(&self, season: usize, episode: usize) -> Option<&EpisodeRecord> {
        match &self.content {
            TitleContent::Movie { .. } => None,
            TitleContent::Series { seasons } => seasons
                .iter()
                .filter(|s| s.number == season)
                .flat_map(|s| s.episodes.iter())
                .find(|e| e.episode == episode),
        }
    }
}

/// A URL pulled out of a payload, not yet matched to an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkCandidate {
    pub url: String,
    /// Best-effort quality from the surrounding text
    pub quality: Option<Quality>,
}

static QUALITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(480|720|1080|2160)p\b|\b(4k|uhd)\b").expect("valid quality regex")
});

/// Video resolution tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "unknown")]
    Unknown,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "2160p")]
    P2160,
}

impl Quality {
    /// Finds the first resolution mentioned in `text`.
    ///
    /// Returns `None` when the text mentions no known resolution.
    pub fn infer(text: &str) -> Option<Self> {
        let captures = QUALITY_REGEX.captures(text)?;
        if captures.get(2).is_some() {
            return Some(Self::P2160);
        }
        match captures.get(1).map(|m| m.as_str()) {
            Some("480") => Some(Self::P480),
            Some("720") => Some(Self::P720),
            Some("1080") => Some(Self::P1080),
            Some("2160") => Some(Self::P2160),
            _ => None,
        }
    }

    /// Like [`Quality::infer`] but never absent.
    pub fn infer_or_unknown(text: &str) -> Self {
        Self::infer(text).unwrap_or(Self::Unknown)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::P480 => write!(f, "480p"),
            Self::P720 => write!(f, "720p"),
            Self::P1080 => write!(f, "1080p"),
            Self::P2160 => write!(f, "2160p"),
        }
    }
}

/// A terminal, directly playable link.
///
/// Only an extractor's final hop produces these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMediaLink {
    /// The playable URL
    pub url: String,
    /// Headers the player has to send (e.g. `Referer`)
    pub headers: BTreeMap<String, String>,
    /// Resolution inferred from the file name or page title
    pub quality: Quality,
    /// Extractor identifier plus server label, e.g. `HubCloud[FSL Server]`
    pub source: String,
    /// File name as shown by the mirror, when known
    pub name: Option<String>,
    /// Human readable size, when known
    pub size: Option<String>,
}

/// A subtitle track located by an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtitleFile {
    pub url: String,
    pub language: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_infer() {
        assert_eq!(Quality::infer("Movie.2023.1080p.WEB-DL.mkv"), Some(Quality::P1080));
        assert_eq!(Quality::infer("Season 1 [720P]"), Some(Quality::P720));
        assert_eq!(Quality::infer("Some Show 4K HDR"), Some(Quality::P2160));
        assert_eq!(Quality::infer("no resolution here"), None);
        assert_eq!(Quality::infer("x10800p"), None);
        assert_eq!(Quality::infer_or_unknown("nothing"), Quality::Unknown);
    }

    #[test]
    fn test_payload_classify() {
        assert_eq!(
            Payload::classify(" https://moviesdrive.online/some-movie/ ", "moviesdrive.online"),
            Payload::StructuredPage("https://moviesdrive.online/some-movie/".to_string())
        );
        assert_eq!(
            Payload::classify("https://www.moviesdrive.online/x", "moviesdrive.online"),
            Payload::StructuredPage("https://www.moviesdrive.online/x".to_string())
        );

        let fragment = r#"<a href="https://hubcloud.ink/drive/abc">HubCloud</a>"#;
        assert_eq!(
            Payload::classify(fragment, "moviesdrive.online"),
            Payload::RawFragment(fragment.to_string())
        );
        assert!(matches!(
            Payload::classify("https://hubcloud.ink/drive/abc", "moviesdrive.online"),
            Payload::RawFragment(_)
        ));
    }

    #[test]
    fn test_loaded_title_episode_lookup() {
        let episode = EpisodeRecord {
            season: 2,
            episode: 3,
            name: "Episode 3".to_string(),
            payload: Payload::RawFragment(String::new()),
        };
        let title = LoadedTitle {
            item: ContentItem {
                title: "Show".to_string(),
                url: "https://example.org/show".to_string(),
                poster: None,
                kind: ContentKind::TvSeries,
            },
            content: TitleContent::Series {
                seasons: vec![SeasonGroup {
                    number: 2,
                    label: "Season 2".to_string(),
                    quality: None,
                    episodes: vec![episode.clone()],
                }],
            },
        };

        assert_eq!(title.episode(2, 3), Some(&episode));
        assert_eq!(title.episode(1, 3), None);
        assert_eq!(title.episode(2, 4), None);
    }
}
