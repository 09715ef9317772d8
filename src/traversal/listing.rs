//! Listing pages: browse categories and paginated search.

use super::{Catalog, TraversalError, strip_download_prefix};
use crate::config::Category;
use crate::fetch::FetchRequest;
use crate::html::{absolute_url, attr_of, selector};
use crate::model::SearchResult;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::{debug, warn};

static CARD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("ul.recent-movies > li"));
static CARD_IMAGE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("figure > img"));
static CARD_LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("figure > a"));

/// Parses the movie cards of a listing page.
///
/// Cards without a link are skipped; a missing title or poster only leaves
/// that field empty.
pub(crate) fn parse_listing(html: &str, base_url: &str) -> Vec<SearchResult> {
    let document = Html::parse_document(html);

    document
        .select(&CARD_SELECTOR)
        .filter_map(|card| {
            let image = card.select(&CARD_IMAGE_SELECTOR).next();
            let url = card
                .select(&CARD_LINK_SELECTOR)
                .next()
                .and_then(|link| attr_of(&link, "href"))
                .and_then(|href| absolute_url(base_url, &href))?;

            let title = image
                .and_then(|img| attr_of(&img, "title"))
                .map(|title| strip_download_prefix(&title))
                .unwrap_or_default();
            let poster = image
                .and_then(|img| attr_of(&img, "src"))
                .and_then(|src| absolute_url(base_url, &src));

            Some(SearchResult { title, url, poster })
        })
        .collect()
}

impl Catalog {
    /// Lists one page of a browse category.
    ///
    /// # Arguments
    ///
    /// * `category` - The category to browse (see [`crate::SiteConfig::categories`])
    /// * `page` - 1-based page number
    pub async fn browse(
        &self,
        category: &Category,
        page: usize,
    ) -> Result<Vec<SearchResult>, TraversalError> {
        let url = format!("{}{}{}", self.site.base_url, category.path, page);
        let response = self.fetcher.fetch(&FetchRequest::new(&url)).await?;
        Ok(parse_listing(&response.body, &self.site.base_url))
    }

    /// Searches the site, walking result pages until one comes back empty.
    ///
    /// At most [`crate::SiteConfig::search_pages`] pages are requested.
    /// Results of all non-empty pages are returned in page order.
    ///
    /// # Errors
    ///
    /// Returns an error only if the first page cannot be fetched; a failure
    /// on a later page ends pagination with what was collected so far.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, TraversalError> {
        let encoded: String =
            url::form_urlencoded::byte_serialize(query.trim().as_bytes()).collect();
        let mut results = Vec::new();

        for page in 1..=self.site.search_pages {
            let url = format!("{}/page/{}/?s={}", self.site.base_url, page, encoded);
            url::Url::parse(&url).map_err(|_| TraversalError::InvalidUrl(url.clone()))?;

            let response = match self.fetcher.fetch(&FetchRequest::new(&url)).await {
                Ok(response) => response,
                Err(error) if page == 1 => return Err(error.into()),
                Err(error) => {
                    warn!(page, %error, "search page unavailable, stopping");
                    break;
                }
            };

            let page_results = parse_listing(&response.body, &self.site.base_url);
            debug!(page, count = page_results.len(), "search page parsed");
            if page_results.is_empty() {
                break;
            }
            results.extend(page_results);
        }

        Ok(results)
    }
}
