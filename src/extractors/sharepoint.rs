//! Sharepoint / OneDrive for Business shares.

use super::chain::{Hop, HopRules, Terminal, Transition, media_link, run_chain};
use super::{Delivered, ExtractionError, Extractor, ResolveContext};
use crate::fetch::{FetchRequest, RawResponse};
use crate::html::{absolute_url, attr_of, selector};
use crate::sink::Sinks;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static DOWNLOAD_LINK_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"a[href*="download.aspx"]"#));

/// Extractor for Sharepoint share links
#[derive(Debug, Clone, Copy, Default)]
pub struct Sharepoint;

fn is_download_url(url: &str) -> bool {
    url.to_ascii_lowercase().contains("download.aspx")
}

fn download_link(html: &str, page_url: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document
        .select(&DOWNLOAD_LINK_SELECTOR)
        .next()
        .and_then(|a| attr_of(&a, "href"))
        .and_then(|href| absolute_url(page_url, &href))
}

#[async_trait]
impl HopRules for Sharepoint {
    type Stage = ();

    fn name(&self) -> &'static str {
        "Sharepoint"
    }

    fn start(&self, url: &str) -> Hop<()> {
        Hop::new(FetchRequest::new(url), ())
    }

    async fn step(
        &self,
        _stage: (),
        response: RawResponse,
        _ctx: &ResolveContext,
    ) -> Result<Transition<()>, ExtractionError> {
        if is_download_url(&response.url) {
            return Ok(Transition::Terminal(Terminal {
                links: vec![media_link("Sharepoint", "Download", &response.url, None, None)],
                subtitles: Vec::new(),
            }));
        }

        let target = download_link(&response.body, &response.url).ok_or_else(|| {
            ExtractionError::MissingElement {
                extractor: "Sharepoint",
                what: "download link",
                url: response.url.clone(),
            }
        })?;
        Ok(Transition::Follow(Hop::new(
            FetchRequest::new(target).with_referer(&response.url),
            (),
        )))
    }
}

#[async_trait]
impl Extractor for Sharepoint {
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
