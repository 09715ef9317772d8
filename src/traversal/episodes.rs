//! Episode discovery on a season page
//!
//! Season pages list episodes in one of two layouts. The common one has a
//! heading with an "Ep" marker span followed by one sibling element per
//! mirror; the sparse one only has bare mirror anchors, one per episode.

use crate::html::{contains_ignore_case, next_elements, parent_element, selector, text_of};
use crate::model::{EpisodeRecord, Payload};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

static SPAN_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("span"));
static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bep").expect("valid episode marker regex"));

/// Discovers the episodes listed on a season page.
///
/// # Arguments
///
/// * `html` - The season page body
/// * `season` - Number of the season the episodes belong to
/// * `season_label` - Season heading, used as name for bare anchors
/// * `mirror_label` - Text identifying mirror elements (e.g. "HubCloud")
///
/// # Returns
///
/// Episodes in document order. Episode numbers are the 1-based position of
/// their marker, so a marker without mirrors leaves a gap instead of shifting
/// the following episodes.
pub(crate) fn discover_episodes(
    html: &str,
    season: usize,
    season_label: &str,
    mirror_label: &str,
) -> Vec<EpisodeRecord> {
    let document = Html::parse_document(html);

    // Marker spans take priority over bare anchors
    let markers: Vec<ElementRef<'_>> = document
        .select(&SPAN_SELECTOR)
        .filter(|span| MARKER_REGEX.is_match(&text_of(span)))
        .collect();

    if !markers.is_empty() {
        return markers
            .iter()
            .enumerate()
            .filter_map(|(position, marker)| {
                let heading = parent_element(marker)?;
                let payload = collect_mirror_siblings(&heading, mirror_label);
                if payload.is_empty() {
                    return None;
                }
                Some(EpisodeRecord {
                    season,
                    episode: position + 1,
                    name: text_of(&heading),
                    payload: Payload::RawFragment(payload),
                })
            })
            .collect();
    }

    document
        .select(&ANCHOR_SELECTOR)
        .filter(|anchor| contains_ignore_case(&text_of(anchor), mirror_label))
        .enumerate()
        .map(|(position, anchor)| EpisodeRecord {
            season,
            episode: position + 1,
            name: season_label.to_string(),
            payload: Payload::RawFragment(anchor.html()),
        })
        .collect()
}

/// Concatenates the serialized sibling elements following `heading` for as
/// long as they name the mirror host.
fn collect_mirror_siblings(heading: &ElementRef<'_>, mirror_label: &str) -> String {
    next_elements(heading)
        .take_while(|sibling| contains_ignore_case(&text_of(sibling), mirror_label))
        .map(|sibling| sibling.html())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER_PAGE: &str = r#"
        <html><body><div class="entry">
          <h5><span style="color:red">Ep 01</span> The Beginning</h5>
          <p><a href="https://hubcloud.ink/drive/e1a">HubCloud [1080p]</a></p>
          <p><a href="https://hubcloud.ink/drive/e1b">HubCloud [720p]</a></p>
          <hr>
          <h5><span>Ep 02</span> The Middle</h5>
          <p><a href="https://gdflix.dad/file/e2">GDFlix</a></p>
          <h5><span>EP 03</span> The End</h5>
          <p><a href="https://hubcloud.ink/drive/e3">hubcloud</a></p>
        </div></body></html>
    "#;

    #[test]
    fn test_marker_layout_concatenates_consecutive_mirrors() {
        let episodes = discover_episodes(MARKER_PAGE, 2, "Season 2", "HubCloud");

        assert_eq!(episodes.len(), 2);

        let first = &episodes[0];
        assert_eq!(first.season, 2);
        assert_eq!(first.episode, 1);
        assert_eq!(first.name, "Ep 01 The Beginning");
        let Payload::RawFragment(payload) = &first.payload else {
            panic!("expected raw fragment");
        };
        assert!(payload.contains("https://hubcloud.ink/drive/e1a"));
        assert!(payload.contains("https://hubcloud.ink/drive/e1b"));
        assert!(!payload.contains("<hr"));

        // Episode 2 has no HubCloud mirror and is skipped without renumbering
        assert_eq!(episodes[1].episode, 3);
        assert_eq!(episodes[1].name, "EP 03 The End");
    }

    #[test]
    fn test_anchor_fallback_without_markers() {
        let html = r#"
            <div>
              <p><a href="https://hubcloud.ink/drive/a">HubCloud Episode Link</a></p>
              <p><a href="https://example.org/other">Other</a></p>
              <p><a href="https://hubcloud.ink/drive/b">HUBCLOUD</a></p>
            </div>
        "#;
        let episodes = discover_episodes(html, 1, "Season 1 720p", "HubCloud");

        assert_eq!(episodes.len(), 2);
        assert_eq!(episodes[0].episode, 1);
        assert_eq!(episodes[1].episode, 2);
        assert_eq!(episodes[0].name, "Season 1 720p");
        assert_eq!(
            episodes[1].payload,
            Payload::RawFragment(
                r#"<a href="https://hubcloud.ink/drive/b">HUBCLOUD</a>"#.to_string()
            )
        );
    }

    #[test]
    fn test_episode_numbers_are_unique_and_increasing() {
        let episodes = discover_episodes(MARKER_PAGE, 1, "", "HubCloud");
        let numbers: Vec<usize> = episodes.iter().map(|e| e.episode).collect();
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_page_without_episodes() {
        let html = "<html><body><p>Nothing</p></body></html>";
        assert!(discover_episodes(html, 1, "", "HubCloud").is_empty());
    }
}
