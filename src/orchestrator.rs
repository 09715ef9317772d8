//! Resolution orchestrator
//!
//! Turns a [`Payload`] into candidate mirror URLs and resolves all of them
//! concurrently. Each candidate runs in its own task under a deadline, so a
//! slow or failing mirror never holds back its siblings. Links reach the
//! sinks as soon as each chain terminates; [`LinkResolver::resolve`] returns
//! once every task has finished.

use crate::config::{ResolverConfig, SiteConfig};
use crate::extractors::{ExtractionError, ResolveContext};
use crate::fetch::{FetchRequest, Fetcher};
use crate::html::{absolute_url, attr_of, text_of};
use crate::model::{LinkCandidate, Payload, Quality};
use crate::registry::{Dispatch, ExtractorRegistry};
use crate::sink::Sinks;
use crate::traversal::BUTTON_SELECTOR;
use futures::future::join_all;
use regex::Regex;
use scraper::Html;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, info, info_span, warn};
use ulid::Ulid;

static URL_LITERAL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>]+"#).expect("valid url literal regex")
});

/// Summary of one [`LinkResolver::resolve`] call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolutionReport {
    /// Identifier tying log lines of one run together
    pub run_id: Ulid,
    /// Candidate URLs found in the payload
    pub candidates: usize,
    /// Candidates handed to an extractor
    pub dispatched: usize,
    /// Candidates no extractor covers
    pub unmatched: usize,
    /// Chains that delivered at least one link or subtitle
    pub resolved: usize,
    /// Chains that terminated without anything to deliver
    pub empty: usize,
    /// Chains that ended in an error, timed out, were cancelled or panicked
    pub failed: usize,
    /// Chains that ran out of hops
    pub exhausted: usize,
    /// Links delivered to the sinks
    pub links: usize,
    /// Subtitles delivered to the sinks
    pub subtitles: usize,
}

impl ResolutionReport {
    fn new(run_id: Ulid, candidates: usize) -> Self {
        Self {
            run_id,
            candidates,
            dispatched: 0,
            unmatched: 0,
            resolved: 0,
            empty: 0,
            failed: 0,
            exhausted: 0,
            links: 0,
            subtitles: 0,
        }
    }

    /// Always true: resolution counts as attempted even when nothing was
    /// found. Look at the counters for what actually happened.
    pub fn dispatch_attempted(&self) -> bool {
        true
    }

    fn record(&mut self, candidate: &str, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Unmatched => self.unmatched += 1,
            Dispatch::Completed {
                extractor,
                delivered,
            } => {
                self.dispatched += 1;
                self.links += delivered.links;
                self.subtitles += delivered.subtitles;
                if delivered.links + delivered.subtitles > 0 {
                    self.resolved += 1;
                } else {
                    debug!(candidate, extractor, "chain terminated without links");
                    self.empty += 1;
                }
            }
            Dispatch::Failed { extractor, error } => {
                self.dispatched += 1;
                match error {
                    ExtractionError::Exhausted { hops, .. } => {
                        debug!(candidate, extractor, hops, "candidate exhausted its hop budget");
                        self.exhausted += 1;
                    }
                    error if error.is_cancelled() => {
                        debug!(candidate, extractor, "candidate cancelled");
                        self.failed += 1;
                    }
                    error => {
                        warn!(candidate, extractor, %error, "candidate failed");
                        self.failed += 1;
                    }
                }
            }
        }
    }
}

/// Resolves payloads into links using an [`ExtractorRegistry`].
pub struct LinkResolver {
    registry: Arc<ExtractorRegistry>,
    context: ResolveContext,
    site: SiteConfig,
}

impl LinkResolver {
    /// Creates a resolver.
    ///
    /// # Arguments
    ///
    /// * `registry` - Extractors to dispatch candidates to
    /// * `fetcher` - Shared HTTP capability used for every hop
    /// * `config` - Hop budget and deadlines
    /// * `site` - The listing site structured payloads belong to
    pub fn new(
        registry: Arc<ExtractorRegistry>,
        fetcher: Arc<dyn Fetcher>,
        config: ResolverConfig,
        site: SiteConfig,
    ) -> Self {
        Self {
            registry,
            context: ResolveContext::new(fetcher, config),
            site,
        }
    }

    /// Ties every resolution to `cancel`; cancelling it stops all in-flight
    /// chains at their next fetch.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.context = self.context.with_cancellation(cancel);
        self
    }

    /// Tags a free-form payload string against this resolver's site
    pub fn payload_for(&self, blob: &str) -> Payload {
        Payload::classify(blob, &self.site.host().unwrap_or_default())
    }

    /// Resolves every candidate of `payload`, delivering results to `sinks`.
    ///
    /// Never fails: unreachable pages, unmatched hosts and broken chains are
    /// only counted in the returned report.
    pub async fn resolve(&self, payload: &Payload, sinks: &Sinks) -> ResolutionReport {
        let run_id = Ulid::new();
        let span = info_span!("resolve", %run_id);

        async {
            let candidates = match payload {
                Payload::StructuredPage(url) => self.structured_candidates(url).await,
                Payload::RawFragment(text) => fragment_candidates(text),
            };
            debug!(count = candidates.len(), "candidates collected");

            let report = self.dispatch_all(run_id, candidates, sinks).await;
            info!(
                candidates = report.candidates,
                dispatched = report.dispatched,
                unmatched = report.unmatched,
                resolved = report.resolved,
                empty = report.empty,
                failed = report.failed,
                exhausted = report.exhausted,
                links = report.links,
                subtitles = report.subtitles,
                "resolution finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Two-level button walk: the page's buttons lead to pages whose own
    /// buttons are the mirror links.
    async fn structured_candidates(&self, url: &str) -> Vec<LinkCandidate> {
        let page = match self.context.fetch(&FetchRequest::new(url)).await {
            Ok(page) => page,
            Err(error) => {
                warn!(url, %error, "payload page unavailable");
                return Vec::new();
            }
        };

        let buttons = page_buttons(&page.body, &page.url);
        let inner_pages = join_all(buttons.into_iter().map(|(label, href)| async move {
            let result = self.context.fetch(&FetchRequest::new(href.as_str())).await;
            (label, href, result)
        }))
        .await;

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for (outer_label, href, result) in inner_pages {
            let inner = match result {
                Ok(inner) => inner,
                Err(error) => {
                    debug!(button = %href, %error, "button page unavailable");
                    continue;
                }
            };

            for (label, url) in page_buttons(&inner.body, &inner.url) {
                if seen.insert(url.clone()) {
                    let quality = Quality::infer(&label).or_else(|| Quality::infer(&outer_label));
                    candidates.push(LinkCandidate { url, quality });
                }
            }
        }

        candidates
    }

    async fn dispatch_all(
        &self,
        run_id: Ulid,
        candidates: Vec<LinkCandidate>,
        sinks: &Sinks,
    ) -> ResolutionReport {
        let mut report = ResolutionReport::new(run_id, candidates.len());
        let deadline = self.context.config().resolution_timeout;
        let mut tasks = JoinSet::new();

        for candidate in candidates {
            let Some(extractor) = self.registry.find(&candidate.url) else {
                debug!(url = %candidate.url, "no extractor for candidate");
                report.record(&candidate.url, Dispatch::Unmatched);
                continue;
            };
            let name = extractor.name();
            let registry = Arc::clone(&self.registry);
            let ctx = self.context.child().with_quality_hint(candidate.quality);
            let sinks = sinks.clone();
            let span = debug_span!("candidate", url = %candidate.url);

            tasks.spawn(
                async move {
                    let dispatch = match tokio::time::timeout(
                        deadline,
                        registry.resolve(&candidate.url, &ctx, &sinks),
                    )
                    .await
                    {
                        Ok(dispatch) => dispatch,
                        Err(_) => {
                            ctx.cancellation().cancel();
                            Dispatch::Failed {
                                extractor: name,
                                error: ExtractionError::TimedOut(deadline),
                            }
                        }
                    };
                    (candidate.url, dispatch)
                }
                .instrument(span),
            );
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((url, dispatch)) => report.record(&url, dispatch),
                Err(error) => {
                    warn!(%error, "resolution task aborted");
                    report.dispatched += 1;
                    report.failed += 1;
                }
            }
        }

        report
    }
}

/// `h5 > a` buttons of a page as (label, absolute href)
fn page_buttons(html: &str, page_url: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    document
        .select(&BUTTON_SELECTOR)
        .filter_map(|a| {
            let href = attr_of(&a, "href").and_then(|href| absolute_url(page_url, &href))?;
            Some((text_of(&a), href))
        })
        .collect()
}

/// Every URL literal in a fragment, in order of first appearance.
///
/// The quality hint comes from the text between the previous literal and
/// this one, which is where the mirror pages print it.
fn fragment_candidates(text: &str) -> Vec<LinkCandidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    let mut previous_end = 0;

    for found in URL_LITERAL_REGEX.find_iter(text) {
        let preceding = &text[previous_end..found.start()];
        previous_end = found.end();

        let url = found.as_str().replace("&amp;", "&");
        if seen.insert(url.clone()) {
            candidates.push(LinkCandidate {
                url,
                quality: Quality::infer(preceding),
            });
        }
    }

    candidates
}
