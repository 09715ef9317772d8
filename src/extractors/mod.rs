//! Site-specific extractors
//!
//! Each mirror family turns an intermediary URL into playable links by
//! following a short chain of pages. The chain mechanics (hop budget,
//! terminal detection, sink delivery) live in [`chain`]; the modules below
//! only describe how to get from one page to the next.

mod card;
pub(crate) mod chain;
mod fastdl;
mod gdflix;
mod hubcloud;
mod sharepoint;
mod vcloud;

pub use fastdl::FastDl;
pub use gdflix::GdFlix;
pub use hubcloud::HubCloud;
pub use sharepoint::Sharepoint;
pub use vcloud::VCloud;

use crate::config::ResolverConfig;
use crate::fetch::{FetchError, FetchRequest, Fetcher, RawResponse};
use crate::model::Quality;
use crate::sink::Sinks;
use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Errors that end an extractor's hop chain without results
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// A hop's request failed
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// A page lacked the element leading to the next hop
    #[error("{extractor}: no {what} on {url}")]
    MissingElement {
        extractor: &'static str,
        what: &'static str,
        url: String,
    },

    /// The hop budget ran out before a media resource was reached
    #[error("{extractor}: no media after {hops} hops")]
    Exhausted { extractor: &'static str, hops: usize },

    /// The resolution deadline passed
    #[error("Resolution timed out after {0:?}")]
    TimedOut(Duration),

    /// The resolution was cancelled from outside
    #[error("Resolution cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// True for errors caused by cancellation rather than by the mirror
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Fetch(FetchError::Cancelled { .. })
        )
    }
}

/// Number of results an extractor handed to the sinks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivered {
    pub links: usize,
    pub subtitles: usize,
}

/// Shared state threaded through every hop of a resolution.
///
/// Cheap to clone; clones share the fetcher and configuration.
#[derive(Clone)]
pub struct ResolveContext {
    fetcher: Arc<dyn Fetcher>,
    config: Arc<ResolverConfig>,
    cancel: CancellationToken,
    quality_hint: Option<Quality>,
}

impl ResolveContext {
    pub fn new(fetcher: Arc<dyn Fetcher>, config: ResolverConfig) -> Self {
        Self {
            fetcher,
            config: Arc::new(config),
            cancel: CancellationToken::new(),
            quality_hint: None,
        }
    }

    /// Replaces the cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Quality announced next to the candidate URL, used for links whose
    /// own name and URL do not reveal one
    pub fn with_quality_hint(mut self, quality: Option<Quality>) -> Self {
        self.quality_hint = quality;
        self
    }

    /// A context whose token is cancelled with this one, but can also be
    /// cancelled on its own
    pub fn child(&self) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            config: Arc::clone(&self.config),
            cancel: self.cancel.child_token(),
            quality_hint: self.quality_hint,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn quality_hint(&self) -> Option<Quality> {
        self.quality_hint
    }

    /// Fetches a page unless the resolution has been cancelled.
    ///
    /// Fetches are the only suspension points of a hop chain, so this is
    /// where cancellation is observed.
    pub async fn fetch(&self, request: &FetchRequest) -> Result<RawResponse, FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled {
                url: request.url.clone(),
            });
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(FetchError::Cancelled {
                url: request.url.clone(),
            }),
            result = self.fetcher.fetch(request) => result,
        }
    }

    /// Fetch for a single button of a terminal page.
    ///
    /// A failed request only costs that button, so it yields `None`;
    /// cancellation still ends the whole chain.
    pub(crate) async fn fetch_optional(
        &self,
        request: &FetchRequest,
    ) -> Result<Option<RawResponse>, ExtractionError> {
        match self.fetch(request).await {
            Ok(response) => Ok(Some(response)),
            Err(FetchError::Cancelled { .. }) => Err(ExtractionError::Cancelled),
            Err(error) => {
                debug!(url = %request.url, %error, "button request failed");
                Ok(None)
            }
        }
    }
}

/// A mirror family able to resolve its URLs into playable links.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Identifier used as the `source` prefix of produced links
    fn name(&self) -> &'static str;

    /// Resolves `url`, delivering every link and subtitle to `sinks`.
    ///
    /// Results are delivered only once the chain reaches its terminal page;
    /// an error means nothing was delivered.
    async fn resolve(
        &self,
        url: &str,
        ctx: &ResolveContext,
        sinks: &Sinks,
    ) -> Result<Delivered, ExtractionError>;
}

static SCRIPT_URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"var\s+url\s*=\s*['"]([^'"]+)['"]"#).expect("valid script url regex")
});
static META_REFRESH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)<meta[^>]+http-equiv\s*=\s*["']?refresh["']?[^>]*content\s*=\s*["'][^"']*url\s*=\s*([^"'>\s]+)"#,
    )
    .expect("valid meta refresh regex")
});
static PIXELDRAIN_ID_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)pixeldrain\.[a-z]+/(?:u|api/file)/([A-Za-z0-9]+)")
        .expect("valid pixeldrain regex")
});

/// The URL assigned to `var url = '...'` in an inline script
pub(crate) fn script_url(body: &str) -> Option<String> {
    SCRIPT_URL_REGEX
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|url| !url.is_empty())
}

/// The target of a `<meta http-equiv="refresh">` redirect
pub(crate) fn meta_refresh_url(body: &str) -> Option<String> {
    META_REFRESH_REGEX
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Turns a pixeldrain share link into its direct download endpoint
pub(crate) fn pixeldrain_download_url(href: &str) -> Option<String> {
    PIXELDRAIN_ID_REGEX
        .captures(href)
        .and_then(|c| c.get(1))
        .map(|id| format!("https://pixeldrain.com/api/file/{}?download", id.as_str()))
}

/// Value of query parameter `key` in `url`
pub(crate) fn query_param(url: &str, key: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Everything after the first `marker` in `text`, e.g. the part after
/// `link=` in a redirect target that does not encode it as a query parameter
pub(crate) fn after_marker(text: &str, marker: &str) -> Option<String> {
    text.split_once(marker)
        .map(|(_, rest)| rest.to_string())
        .filter(|rest| !rest.is_empty())
}

/// All extractors shipped with the crate, in registration order
pub(crate) fn default_extractors() -> Vec<(crate::registry::DomainPattern, Arc<dyn Extractor>)> {
    use crate::registry::DomainPattern;

    vec![
        (DomainPattern::label("hubcloud"), Arc::new(HubCloud) as Arc<dyn Extractor>),
        (DomainPattern::label("vcloud"), Arc::new(VCloud)),
        (DomainPattern::label("gdflix"), Arc::new(GdFlix)),
        (DomainPattern::label("fastdlserver"), Arc::new(FastDl)),
        (DomainPattern::suffix("sharepoint.com"), Arc::new(Sharepoint)),
    ]
}
