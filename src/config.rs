//! Runtime configuration
//!
//! Two small structures: [`SiteConfig`] describes the listing site the
//! traversal engine scrapes, [`ResolverConfig`] tunes the resolution pipeline.
//! Both come with defaults and `with_*` builders; the CLI overrides them from
//! its flags.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default number of hops an extractor may take before giving up
pub const DEFAULT_HOP_BUDGET: usize = 5;

/// Default deadline for resolving a single candidate
pub const DEFAULT_RESOLUTION_TIMEOUT: Duration = Duration::from_secs(60);

/// Default timeout for a single HTTP request
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// User agent sent with every request
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// A browse category: path below the base URL plus its display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Path appended to the base URL, ending right before the page number
    pub path: String,
    /// Name shown to users
    pub name: String,
}

impl Category {
    fn new(path: &str, name: &str) -> Self {
        Self {
            path: path.to_string(),
            name: name.to_string(),
        }
    }
}

/// The content source the traversal engine works against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Name of the site (for logging)
    pub name: String,
    /// Base URL without trailing slash
    pub base_url: String,
    /// Text identifying mirror anchors on season pages
    pub mirror_label: String,
    /// Highest search result page to request
    pub search_pages: usize,
    /// Category path to display name table, used for browsing only
    pub categories: Vec<Category>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "MoviesDrive".to_string(),
            base_url: "https://moviesdrive.online".to_string(),
            mirror_label: "HubCloud".to_string(),
            search_pages: 3,
            categories: vec![
                Category::new("/page/", "Home"),
                Category::new("/category/amzn-prime-video/page/", "Prime Video"),
                Category::new("/category/netflix/page/", "Netflix"),
                Category::new("/category/hotstar/page/", "Hotstar"),
                Category::new("/category/anime/page/", "Anime"),
                Category::new("/category/k-drama/page/", "K Drama"),
            ],
        }
    }
}

impl SiteConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_mirror_label(mut self, label: impl Into<String>) -> Self {
        self.mirror_label = label.into();
        self
    }

    pub fn with_search_pages(mut self, pages: usize) -> Self {
        self.search_pages = pages;
        self
    }

    /// Host part of the base URL, used to recognize same-site payloads
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.base_url)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
    }

    /// Finds a category by display name (case-insensitive) or by path
    pub fn category(&self, name_or_path: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name_or_path) || c.path == name_or_path)
    }
}

/// Tuning knobs for the resolution pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Hops an extractor may take before the chain counts as exhausted
    pub hop_budget: usize,
    /// Deadline for one candidate's whole hop chain
    pub resolution_timeout: Duration,
    /// Timeout of a single HTTP request
    pub request_timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            hop_budget: DEFAULT_HOP_BUDGET,
            resolution_timeout: DEFAULT_RESOLUTION_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl ResolverConfig {
    pub fn with_hop_budget(mut self, hops: usize) -> Self {
        self.hop_budget = hops;
        self
    }

    pub fn with_resolution_timeout(mut self, timeout: Duration) -> Self {
        self.resolution_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
