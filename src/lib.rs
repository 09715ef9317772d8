//! linkhop - Catalog movie and tv listings and resolve their download mirrors
//!
//! The library is split along the path a title takes:
//!
//! 1. [`Catalog`] scrapes a listing site: search, browse, and detail pages
//!    with their seasons and episodes. Every playable unit carries a
//!    [`Payload`].
//! 2. [`LinkResolver`] turns a payload into candidate mirror URLs and
//!    resolves them concurrently.
//! 3. [`ExtractorRegistry`] picks the extractor for each candidate by host;
//!    extractors follow a bounded chain of pages until they reach playable
//!    media.
//! 4. Results are handed to [`Sinks`] as soon as each chain finishes.
//!
//! # Examples
//!
//! ```no_run
//! use linkhop::{
//!     Catalog, ExtractorRegistry, HttpFetcher, LinkResolver, ResolverConfig, Sinks,
//!     SiteConfig, TitleContent,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), linkhop::LinkhopError> {
//! let config = ResolverConfig::default();
//! let fetcher = Arc::new(HttpFetcher::new(&config)?);
//! let site = SiteConfig::default();
//!
//! let catalog = Catalog::new(fetcher.clone(), site.clone());
//! let results = catalog.search("big buck bunny").await?;
//! let title = catalog.load(&results[0].url).await?;
//!
//! let resolver = LinkResolver::new(
//!     Arc::new(ExtractorRegistry::with_default_extractors()),
//!     fetcher,
//!     config,
//!     site,
//! );
//! if let TitleContent::Movie { payload } = &title.content {
//!     let sinks = Sinks::new(|link| println!("{}", link.url), |_| {});
//!     let report = resolver.resolve(payload, &sinks).await;
//!     println!("{} link(s)", report.links);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod extractors;
pub mod fetch;
mod html;
pub mod model;
pub mod orchestrator;
pub mod registry;
pub mod sink;
pub mod traversal;

#[cfg(test)]
mod testing;

pub use config::{Category, ResolverConfig, SiteConfig};
pub use extractors::{Delivered, ExtractionError, Extractor, ResolveContext};
pub use fetch::{FetchError, FetchRequest, Fetcher, HttpFetcher, RawResponse};
pub use model::{
    ContentItem, ContentKind, EpisodeRecord, LinkCandidate, LoadedTitle, Payload, Quality,
    ResolvedMediaLink, SearchResult, SeasonGroup, SubtitleFile, TitleContent,
};
pub use orchestrator::{LinkResolver, ResolutionReport};
pub use registry::{
    Dispatch, DomainPattern, ExtractorDescriptor, ExtractorRegistry, RegistryBuilder,
};
pub use sink::{SinkEvent, Sinks};
pub use traversal::{Catalog, TraversalError, classify_title, strip_download_prefix};

use thiserror::Error;

/// Top-level error type for linkhop operations
#[derive(Debug, Error)]
pub enum LinkhopError {
    /// Error while scraping the listing site
    #[error("Traversal error: {0}")]
    Traversal(#[from] TraversalError),

    /// Error while fetching a page
    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// Invalid user input, e.g. an unknown category or episode
    #[error("{0}")]
    Input(String),
}
