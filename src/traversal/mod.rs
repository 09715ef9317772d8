//! Page traversal engine
//!
//! Turns a listing site's detail pages into catalog data: a [`ContentItem`]
//! plus either a movie payload or the season/episode hierarchy behind the
//! page's season buttons. Traversal never aborts on a missing element; the
//! affected field just stays empty.

mod episodes;
mod listing;

use crate::config::SiteConfig;
use crate::fetch::{FetchError, FetchRequest, Fetcher};
use crate::html::{
    absolute_url, attr_of, contains_ignore_case, parent_element, previous_element, selector,
    text_of,
};
use crate::model::{
    ContentItem, ContentKind, LoadedTitle, Payload, Quality, SeasonGroup, TitleContent,
};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while traversing the listing site
#[derive(Debug, Error)]
pub enum TraversalError {
    /// The page itself could not be fetched
    #[error("Failed to fetch page: {0}")]
    Fetch(#[from] FetchError),

    /// A URL built from configuration or user input is not valid
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

const DOWNLOAD_PREFIX: &str = "Download ";

static SEASON_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)season\s*\d+").expect("valid season regex"));
static TITLE_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"meta[property="og:title"]"#));
static POSTER_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"img[decoding="async"]"#));
pub(crate) static BUTTON_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("h5 > a"));

/// Removes the leading "Download " marketing prefix from a title.
///
/// Repeated prefixes are removed as well, which keeps the operation
/// idempotent.
pub fn strip_download_prefix(title: &str) -> String {
    let mut rest = title.trim();
    while let Some(stripped) = rest.strip_prefix(DOWNLOAD_PREFIX) {
        rest = stripped.trim_start();
    }
    rest.to_string()
}

/// Decides whether a raw page title describes a series or a movie.
///
/// A title is a series when it mentions "episode", "series", or "season"
/// followed by a number (all case-insensitive).
pub fn classify_title(raw_title: &str) -> ContentKind {
    let is_series = contains_ignore_case(raw_title, "episode")
        || SEASON_REGEX.is_match(raw_title)
        || contains_ignore_case(raw_title, "series");

    if is_series {
        ContentKind::TvSeries
    } else {
        ContentKind::Movie
    }
}

/// A season button found on a detail page
#[derive(Debug, Clone, PartialEq)]
struct SeasonButton {
    label: String,
    href: Option<String>,
}

/// Everything read from a detail page in one parse
#[derive(Debug, Clone, PartialEq)]
struct DetailPage {
    raw_title: String,
    poster: Option<String>,
    season_buttons: Vec<SeasonButton>,
}

/// Reads title, poster and the non-archive season buttons of a detail page
fn parse_detail_page(html: &str, page_url: &str) -> DetailPage {
    let document = Html::parse_document(html);

    let raw_title = document
        .select(&TITLE_SELECTOR)
        .next()
        .and_then(|meta| attr_of(&meta, "content"))
        .unwrap_or_default();

    let poster = document
        .select(&POSTER_SELECTOR)
        .next()
        .and_then(|img| attr_of(&img, "src"))
        .and_then(|src| absolute_url(page_url, &src));

    // "Zip" buttons are season archives, not playable seasons
    let season_buttons = document
        .select(&BUTTON_SELECTOR)
        .filter(|button| !contains_ignore_case(&text_of(button), "zip"))
        .map(|button| {
            let label = parent_element(&button)
                .and_then(|parent| previous_element(&parent))
                .map(|heading| text_of(&heading))
                .unwrap_or_default();
            let href = attr_of(&button, "href").and_then(|href| absolute_url(page_url, &href));
            SeasonButton { label, href }
        })
        .collect();

    DetailPage {
        raw_title,
        poster,
        season_buttons,
    }
}

/// Traversal engine bound to one listing site.
pub struct Catalog {
    fetcher: Arc<dyn Fetcher>,
    site: SiteConfig,
}

impl Catalog {
    /// Creates a catalog for `site` fetching through `fetcher`.
    pub fn new(fetcher: Arc<dyn Fetcher>, site: SiteConfig) -> Self {
        Self { fetcher, site }
    }

    /// The site this catalog scrapes
    pub fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// Loads a detail page and builds its catalog entry.
    ///
    /// Movies get their own page URL as a structured payload. For series
    /// every season page is fetched and its episodes discovered; a season
    /// page that fails to load yields a season without episodes.
    ///
    /// # Errors
    ///
    /// Only a failure to fetch the detail page itself is returned.
    pub async fn load(&self, url: &str) -> Result<LoadedTitle, TraversalError> {
        let response = self.fetcher.fetch(&FetchRequest::new(url)).await?;
        let detail = parse_detail_page(&response.body, url);

        let kind = classify_title(&detail.raw_title);
        let item = ContentItem {
            title: strip_download_prefix(&detail.raw_title),
            url: url.to_string(),
            poster: detail.poster,
            kind,
        };
        debug!(title = %item.title, %kind, "loaded detail page");

        let content = match kind {
            ContentKind::Movie => TitleContent::Movie {
                payload: Payload::StructuredPage(url.to_string()),
            },
            ContentKind::TvSeries => TitleContent::Series {
                seasons: self.discover_seasons(detail.season_buttons).await,
            },
        };

        Ok(LoadedTitle { item, content })
    }

    /// Fetches all season pages concurrently and collects their episodes.
    ///
    /// Season numbers are assigned up front in button order, so the result
    /// is numbered `1..=N` regardless of which page answers first.
    async fn discover_seasons(&self, buttons: Vec<SeasonButton>) -> Vec<SeasonGroup> {
        let pending = buttons.into_iter().enumerate().map(|(index, button)| {
            let number = index + 1;
            async move {
                let quality = Quality::infer(&button.label);
                let episodes = match &button.href {
                    Some(href) => match self.fetcher.fetch(&FetchRequest::new(href)).await {
                        Ok(page) => episodes::discover_episodes(
                            &page.body,
                            number,
                            &button.label,
                            &self.site.mirror_label,
                        ),
                        Err(error) => {
                            warn!(season = number, %error, "season page unavailable");
                            Vec::new()
                        }
                    },
                    None => {
                        warn!(season = number, "season button without link");
                        Vec::new()
                    }
                };

                SeasonGroup {
                    number,
                    label: button.label,
                    quality,
                    episodes,
                }
            }
        });

        futures::future::join_all(pending).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticFetcher;

    #[test]
    fn test_classify_title() {
        assert_eq!(
            classify_title("Download Big Buck Bunny Season 1 Complete 720p"),
            ContentKind::TvSeries
        );
        assert_eq!(
            classify_title("Download Big Buck Bunny (2023) 1080p"),
            ContentKind::Movie
        );
        assert_eq!(classify_title("Some Show EPISODE 5 Added"), ContentKind::TvSeries);
        assert_eq!(classify_title("Mini-Series 2024"), ContentKind::TvSeries);
        assert_eq!(classify_title("Show Season5"), ContentKind::TvSeries);
        assert_eq!(classify_title("Seasoned Chef (2021)"), ContentKind::Movie);
        assert_eq!(classify_title(""), ContentKind::Movie);
    }

    #[test]
    fn test_strip_download_prefix() {
        assert_eq!(
            strip_download_prefix("Download Big Buck Bunny (2023) 1080p"),
            "Big Buck Bunny (2023) 1080p"
        );
        assert_eq!(strip_download_prefix("Big Buck Bunny"), "Big Buck Bunny");
        assert_eq!(strip_download_prefix("Download Download Twice"), "Twice");
        assert_eq!(strip_download_prefix("Downloaded Memories"), "Downloaded Memories");
    }

    #[test]
    fn test_strip_download_prefix_is_idempotent() {
        for title in [
            "Download Big Buck Bunny",
            "Download  Download X",
            "Big Buck Bunny",
            "",
            "Download ",
        ] {
            let once = strip_download_prefix(title);
            assert_eq!(strip_download_prefix(&once), once, "title: {title:?}");
        }
    }

    const SERIES_PAGE: &str = r#"
        <html><head>
          <meta property="og:title" content="Download Big Buck Bunny Season 1 Complete 720p">
        </head><body>
          <img decoding="async" src="/wp-content/uploads/bbb.jpg">
          <p>Season 1 480p</p>
          <h5><a href="https://moviesdrive.online/s1-480/">Single Episode Links</a></h5>
          <p>Season 1 720p [Zip]</p>
          <h5><a href="https://moviesdrive.online/s1-zip/">Download Zip</a></h5>
          <p>Season 1 720p</p>
          <h5><a href="https://moviesdrive.online/s1-720/">Single Episode Links</a></h5>
          <p>Season 1 1080p</p>
          <h5><a href="https://moviesdrive.online/s1-1080/">Single Episode Links</a></h5>
        </body></html>
    "#;

    const SEASON_PAGE: &str = r#"
        <div>
          <h5><span>Ep 01</span></h5>
          <p><a href="https://hubcloud.ink/drive/1">HubCloud</a></p>
          <h5><span>Ep 02</span></h5>
          <p><a href="https://hubcloud.ink/drive/2">HubCloud</a></p>
        </div>
    "#;

    #[tokio::test]
    async fn test_load_series_numbers_seasons_without_gaps() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .page("https://moviesdrive.online/bbb/", SERIES_PAGE)
                .page("https://moviesdrive.online/s1-480/", SEASON_PAGE)
                .page("https://moviesdrive.online/s1-720/", SEASON_PAGE)
                .failure("https://moviesdrive.online/s1-1080/", 500),
        );
        let catalog = Catalog::new(fetcher.clone(), SiteConfig::default());

        let title = catalog.load("https://moviesdrive.online/bbb/").await.unwrap();

        assert_eq!(title.item.title, "Big Buck Bunny Season 1 Complete 720p");
        assert_eq!(title.item.kind, ContentKind::TvSeries);
        assert_eq!(
            title.item.poster.as_deref(),
            Some("https://moviesdrive.online/wp-content/uploads/bbb.jpg")
        );

        let TitleContent::Series { seasons } = &title.content else {
            panic!("expected series content");
        };
        let numbers: Vec<usize> = seasons.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(seasons[0].label, "Season 1 480p");
        assert_eq!(seasons[0].quality, Some(Quality::P480));
        assert_eq!(seasons[1].label, "Season 1 720p");
        assert_eq!(seasons[1].episodes.len(), 2);
        assert_eq!(seasons[1].episodes[1].season, 2);
        assert_eq!(seasons[1].episodes[1].episode, 2);

        // A failing season page degrades to an empty season
        assert_eq!(seasons[2].quality, Some(Quality::P1080));
        assert!(seasons[2].episodes.is_empty());

        // The archive page is never visited
        assert!(!fetcher
            .requested()
            .contains(&"https://moviesdrive.online/s1-zip/".to_string()));
    }

    #[tokio::test]
    async fn test_load_movie_defers_to_own_page() {
        let page = r#"<html><head>
            <meta property="og:title" content="Download Big Buck Bunny (2023) 1080p">
            </head><body>
            <h5><a href="https://moviesdrive.online/links/">1080p</a></h5>
            </body></html>"#;
        let fetcher =
            Arc::new(StaticFetcher::new().page("https://moviesdrive.online/bbb-2023/", page));
        let catalog = Catalog::new(fetcher.clone(), SiteConfig::default());

        let title = catalog.load("https://moviesdrive.online/bbb-2023/").await.unwrap();

        assert_eq!(title.item.kind, ContentKind::Movie);
        assert_eq!(title.item.poster, None);
        assert_eq!(
            title.content,
            TitleContent::Movie {
                payload: Payload::StructuredPage("https://moviesdrive.online/bbb-2023/".to_string())
            }
        );
        // Movie buttons are left for the orchestrator
        assert_eq!(fetcher.requested().len(), 1);
    }

    #[tokio::test]
    async fn test_load_degrades_on_missing_title() {
        let fetcher =
            Arc::new(StaticFetcher::new().page("https://moviesdrive.online/x/", "<html></html>"));
        let catalog = Catalog::new(fetcher, SiteConfig::default());

        let title = catalog.load("https://moviesdrive.online/x/").await.unwrap();
        assert_eq!(title.item.title, "");
        assert_eq!(title.item.kind, ContentKind::Movie);
    }

    #[tokio::test]
    async fn test_load_fails_when_detail_page_is_unavailable() {
        let catalog = Catalog::new(Arc::new(StaticFetcher::new()), SiteConfig::default());
        let result = catalog.load("https://moviesdrive.online/missing/").await;
        assert!(matches!(
            result,
            Err(TraversalError::Fetch(FetchError::Status { status: 404, .. }))
        ));
    }
}
