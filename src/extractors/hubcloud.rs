//! HubCloud mirrors (`hubcloud.ink`, `hubcloud.club`, `hubcloud.lol`, ...).
//!
//! Drive links land on a page pointing to the card page, either through an
//! anchor under `div.vd` or a `var url = '...'` script. Links that already
//! point at `hubcloud.php` are the card page.

use super::card::{parse_card_page, resolve_card};
use super::chain::{Hop, HopRules, Transition, run_chain};
use super::{Delivered, ExtractionError, Extractor, ResolveContext, script_url};
use crate::fetch::{FetchRequest, RawResponse};
use crate::html::{absolute_url, attr_of, selector};
use crate::sink::Sinks;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static LANDING_LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector("div.vd > center > a"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Landing,
    Card,
}

/// Extractor for HubCloud drive links
#[derive(Debug, Clone, Copy, Default)]
pub struct HubCloud;

/// The card page link on a landing page
fn landing_target(html: &str, page_url: &str) -> Option<String> {
    let anchor = {
        let document = Html::parse_document(html);
        document
            .select(&LANDING_LINK_SELECTOR)
            .next()
            .and_then(|a| attr_of(&a, "href"))
    };

    anchor
        .or_else(|| script_url(html))
        .and_then(|href| absolute_url(page_url, &href))
}

#[async_trait]
impl HopRules for HubCloud {
    type Stage = Stage;

    fn name(&self) -> &'static str {
        "HubCloud"
    }

    fn start(&self, url: &str) -> Hop<Stage> {
        let stage = if url.contains("hubcloud.php") {
            Stage::Card
        } else {
            Stage::Landing
        };
        Hop::new(FetchRequest::new(url), stage)
    }

    async fn step(
        &self,
        stage: Stage,
        response: RawResponse,
        ctx: &ResolveContext,
    ) -> Result<Transition<Stage>, ExtractionError> {
        match stage {
            Stage::Landing => {
                let target = landing_target(&response.body, &response.url).ok_or_else(|| {
                    ExtractionError::MissingElement {
                        extractor: "HubCloud",
                        what: "card page link",
                        url: response.url.clone(),
                    }
                })?;
                let request = FetchRequest::new(target).with_referer(&response.url);
                Ok(Transition::Follow(Hop::new(request, Stage::Card)))
            }
            Stage::Card => {
                let page = parse_card_page(&response.body, &response.url).ok_or_else(|| {
                    ExtractionError::MissingElement {
                        extractor: "HubCloud",
                        what: "download buttons",
                        url: response.url.clone(),
                    }
                })?;
                Ok(Transition::Terminal(resolve_card("HubCloud", page, ctx).await?))
            }
        }
    }
}

#[async_trait]
impl Extractor for HubCloud {
    fn name(&self) -> &'static str {
        HopRules::name(self)
    }

    async fn resolve(
        &self,
        url: &str,
        ctx: &ResolveContext,
        sinks: &Sinks,
    ) -> Result<Delivered, ExtractionError> {
        run_chain(self, url, ctx, sinks).await
    }
}
