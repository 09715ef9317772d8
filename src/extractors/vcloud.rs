//! VCloud mirrors.
//!
//! `api/index.php` links show a small page whose `div.main h4 a` points at
//! the real drive link. From there the flow matches HubCloud: a script
//! assigns the card page URL, and the card page lists the servers.

use super::card::{parse_card_page, resolve_card};
use super::chain::{Hop, HopRules, Transition, run_chain};
use super::{Delivered, ExtractionError, Extractor, ResolveContext, script_url};
use crate::fetch::{FetchRequest, RawResponse};
use crate::html::{absolute_url, attr_of, selector};
use crate::sink::Sinks;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static API_LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("div.main h4 a"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Stage {
    Api,
    Landing,
    Card,
}

/// Extractor for VCloud drive links
#[derive(Debug, Clone, Copy, Default)]
pub struct VCloud;

fn api_target(html: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&API_LINK_SELECTOR)
        .next()
        .and_then(|a| attr_of(&a, "href"))
        .and_then(|href| absolute_url(page_url, &href))
}

fn missing(what: &'static str, response: &RawResponse) -> ExtractionError {
    ExtractionError::MissingElement {
        extractor: "VCloud",
        what,
        url: response.url.clone(),
    }
}

#[async_trait]
impl HopRules for VCloud {
    type Stage = Stage;

    fn name(&self) -> &'static str {
        "VCloud"
    }

    fn start(&self, url: &str) -> Hop<Stage> {
        let stage = if url.contains("api/index.php") {
            Stage::Api
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
            Stage::Api => {
                let target = api_target(&response.body, &response.url)
                    .ok_or_else(|| missing("drive link", &response))?;
                Ok(Transition::Follow(Hop::new(
                    FetchRequest::new(target).with_referer(&response.url),
                    Stage::Landing,
                )))
            }
            Stage::Landing => {
                let target = script_url(&response.body)
                    .and_then(|href| absolute_url(&response.url, &href))
                    .ok_or_else(|| missing("card page link", &response))?;
                Ok(Transition::Follow(Hop::new(
                    FetchRequest::new(target).with_referer(&response.url),
                    Stage::Card,
                )))
            }
            Stage::Card => {
                let page = parse_card_page(&response.body, &response.url)
                    .ok_or_else(|| missing("download buttons", &response))?;
                Ok(Transition::Terminal(resolve_card("VCloud", page, ctx).await?))
            }
        }
    }
}

#[async_trait]
impl Extractor for VCloud {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::model::ResolvedMediaLink;
    use crate::testing::StaticFetcher;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_api_link_takes_three_hops() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .page(
                    "https://vcloud.lol/api/index.php?id=5",
                    r#"<div class="main"><h4>
                        <a href="https://vcloud.lol/abc5">Click</a>
                    </h4></div>"#,
                )
                .page(
                    "https://vcloud.lol/abc5",
                    "<script>var url = 'https://vcloud.lol/go/abc5?token=t';</script>",
                )
                .page(
                    "https://vcloud.lol/go/abc5?token=t",
                    r#"<div class="card-header">Movie.2160p.mkv</div>
                    <div class="card-body"><h2>
                      <a class="btn" href="https://r2.example/Movie.mkv">Download [FSL Server]</a>
                    </h2></div>"#,
                ),
        );
        let ctx = ResolveContext::new(fetcher.clone(), ResolverConfig::default());
        let links: Arc<Mutex<Vec<ResolvedMediaLink>>> = Arc::default();
        let sink_links = Arc::clone(&links);
        let sinks = Sinks::new(move |link| sink_links.lock().unwrap().push(link), |_| {});

        let delivered = VCloud
            .resolve("https://vcloud.lol/api/index.php?id=5", &ctx, &sinks)
            .await
            .unwrap();

        assert_eq!(delivered.links, 1);
        let links = links.lock().unwrap();
        assert_eq!(links[0].url, "https://r2.example/Movie.mkv");
        assert_eq!(links[0].source, "VCloud[Download [FSL Server]]");
        assert_eq!(fetcher.requested().len(), 3);
    }

    #[tokio::test]
    async fn test_landing_without_script_is_an_error() {
        let fetcher =
            Arc::new(StaticFetcher::new().page("https://vcloud.lol/abc", "<p>expired</p>"));
        let ctx = ResolveContext::new(fetcher, ResolverConfig::default());

        let result = VCloud
            .resolve("https://vcloud.lol/abc", &ctx, &Sinks::discard())
            .await;

        assert!(matches!(
            result,
            Err(ExtractionError::MissingElement { extractor: "VCloud", what: "card page link", .. })
        ));
    }
}
