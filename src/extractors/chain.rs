//! Hop chain state machine shared by all extractors.
//!
//! ```text
//! Start ──> Following ──(media response / terminal page)──> Terminal
//!               │  ^
//!               └──┘ next hop          (budget spent) ──> Exhausted
//! ```
//!
//! The runner is the only code delivering to sinks, so intermediate hops can
//! never emit anything.

use super::{Delivered, ExtractionError, ResolveContext};
use crate::config::ResolverConfig;
use crate::fetch::{FetchRequest, RawResponse};
use crate::model::{Quality, ResolvedMediaLink, SubtitleFile};
use crate::sink::Sinks;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, trace};

/// The next request of a chain and what to do with its response
#[derive(Debug)]
pub(crate) struct Hop<S> {
    pub request: FetchRequest,
    pub stage: S,
}

impl<S> Hop<S> {
    pub fn new(request: FetchRequest, stage: S) -> Self {
        Self { request, stage }
    }
}

/// Results of a terminal page
#[derive(Debug, Default)]
pub(crate) struct Terminal {
    pub links: Vec<ResolvedMediaLink>,
    pub subtitles: Vec<SubtitleFile>,
}

/// Outcome of inspecting one response
#[derive(Debug)]
pub(crate) enum Transition<S> {
    Follow(Hop<S>),
    Terminal(Terminal),
}

/// Host-specific rules driving the state machine.
#[async_trait]
pub(crate) trait HopRules: Send + Sync {
    /// Per-extractor position in the chain
    type Stage: Send + Sync + fmt::Debug;

    fn name(&self) -> &'static str;

    /// Hops this family may take; defaults to the configured budget
    fn hop_budget(&self, config: &ResolverConfig) -> usize {
        config.hop_budget
    }

    /// The first request for `url`
    fn start(&self, url: &str) -> Hop<Self::Stage>;

    /// Inspects a non-media response and decides where to go next.
    ///
    /// A terminal page may issue single extra requests (redirect lookups for
    /// individual buttons) through `ctx`; those do not count as hops.
    async fn step(
        &self,
        stage: Self::Stage,
        response: RawResponse,
        ctx: &ResolveContext,
    ) -> Result<Transition<Self::Stage>, ExtractionError>;
}

/// State of a running chain
enum ChainState<S> {
    Start(Hop<S>),
    Following { hop: Hop<S>, taken: usize },
    Terminal(Terminal),
    Exhausted { taken: usize },
}

/// Drives `rules` from `url` to a terminal page or until the budget is spent.
pub(crate) async fn run_chain<R>(
    rules: &R,
    url: &str,
    ctx: &ResolveContext,
    sinks: &Sinks,
) -> Result<Delivered, ExtractionError>
where
    R: HopRules + ?Sized,
{
    let budget = rules.hop_budget(ctx.config());
    let mut state = ChainState::Start(rules.start(url));

    loop {
        state = match state {
            ChainState::Start(hop) => ChainState::Following { hop, taken: 0 },

            ChainState::Following { taken, .. } if taken >= budget => {
                ChainState::Exhausted { taken }
            }

            ChainState::Following { hop, taken } => {
                trace!(
                    extractor = rules.name(),
                    hop = taken + 1,
                    url = %hop.request.url,
                    ?hop.stage,
                    "following"
                );
                let response = ctx.fetch(&hop.request).await?;
                let taken = taken + 1;

                if response.is_terminal_media() {
                    ChainState::Terminal(media_terminal(rules.name(), &response))
                } else {
                    match rules.step(hop.stage, response, ctx).await? {
                        Transition::Follow(next) => ChainState::Following { hop: next, taken },
                        Transition::Terminal(terminal) => ChainState::Terminal(terminal),
                    }
                }
            }

            ChainState::Terminal(terminal) => return Ok(deliver(terminal, ctx, sinks)),

            ChainState::Exhausted { taken } => {
                debug!(extractor = rules.name(), hops = taken, "hop budget exhausted");
                return Err(ExtractionError::Exhausted {
                    extractor: rules.name(),
                    hops: taken,
                });
            }
        };
    }
}

/// Hands a terminal page's results to the sinks.
///
/// Links without a recognizable quality take the candidate's quality hint.
fn deliver(terminal: Terminal, ctx: &ResolveContext, sinks: &Sinks) -> Delivered {
    let delivered = Delivered {
        links: terminal.links.len(),
        subtitles: terminal.subtitles.len(),
    };
    for mut link in terminal.links {
        if link.quality == Quality::Unknown {
            link.quality = ctx.quality_hint().unwrap_or(Quality::Unknown);
        }
        sinks.on_media_link(link);
    }
    for subtitle in terminal.subtitles {
        sinks.on_subtitle(subtitle);
    }
    delivered
}

/// A response that is the media itself ends the chain with its own URL
fn media_terminal(extractor: &'static str, response: &RawResponse) -> Terminal {
    let name = response
        .header("content-disposition")
        .and_then(disposition_filename)
        .or_else(|| last_path_segment(&response.url));
    let size = response
        .content_length
        .map(|bytes| humansize::format_size(bytes, humansize::DECIMAL));

    Terminal {
        links: vec![media_link(
            extractor,
            "Direct",
            &response.url,
            name.as_deref(),
            size.as_deref(),
        )],
        subtitles: Vec::new(),
    }
}

/// Builds a link record; quality comes from the file name, then the URL
pub(crate) fn media_link(
    extractor: &'static str,
    server: &str,
    url: &str,
    name: Option<&str>,
    size: Option<&str>,
) -> ResolvedMediaLink {
    let quality = name
        .and_then(Quality::infer)
        .or_else(|| Quality::infer(url))
        .unwrap_or(Quality::Unknown);

    ResolvedMediaLink {
        url: url.to_string(),
        headers: BTreeMap::new(),
        quality,
        source: format!("{extractor}[{server}]"),
        name: name.map(str::to_string),
        size: size.map(str::to_string),
    }
}

/// File name from a `Content-Disposition` header
fn disposition_filename(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim_matches('"').to_string())
        .filter(|name| !name.is_empty())
}

/// Last non-empty path segment of a URL
fn last_path_segment(url: &str) -> Option<String> {
    url::Url::parse(url)
        .ok()?
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}
