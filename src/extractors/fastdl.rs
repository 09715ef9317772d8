//! FastDL redirect chains.
//!
//! FastDL servers bounce through several redirects before the file. Each
//! redirect is requested without following it, so every `Location` counts
//! as a hop and stays visible.

use super::chain::{Hop, HopRules, Terminal, Transition, media_link, run_chain};
use super::{Delivered, ExtractionError, Extractor, ResolveContext, meta_refresh_url};
use crate::fetch::{FetchRequest, RawResponse, is_media_url};
use crate::html::absolute_url;
use crate::sink::Sinks;
use async_trait::async_trait;

/// Extractor for FastDL server links
#[derive(Debug, Clone, Copy, Default)]
pub struct FastDl;

/// The next URL of a redirect chain: `Location` first, then meta refresh
fn next_target(response: &RawResponse) -> Option<String> {
    response
        .location()
        .map(str::to_string)
        .or_else(|| meta_refresh_url(&response.body))
        .and_then(|href| absolute_url(&response.url, &href))
}

#[async_trait]
impl HopRules for FastDl {
    type Stage = ();

    fn name(&self) -> &'static str {
        "FastDL"
    }

    fn start(&self, url: &str) -> Hop<()> {
        Hop::new(FetchRequest::new(url).without_redirects(), ())
    }

    async fn step(
        &self,
        _stage: (),
        response: RawResponse,
        _ctx: &ResolveContext,
    ) -> Result<Transition<()>, ExtractionError> {
        let target = next_target(&response).ok_or_else(|| ExtractionError::MissingElement {
            extractor: "FastDL",
            what: "redirect target",
            url: response.url.clone(),
        })?;

        if is_media_url(&target) {
            return Ok(Transition::Terminal(Terminal {
                links: vec![media_link("FastDL", "Direct", &target, None, None)],
                subtitles: Vec::new(),
            }));
        }

        Ok(Transition::Follow(Hop::new(
            FetchRequest::new(target)
                .with_referer(&response.url)
                .without_redirects(),
            (),
        )))
    }
}

#[async_trait]
impl Extractor for FastDl {
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
    use crate::model::Quality;
    use crate::testing::StaticFetcher;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_follows_locations_to_media() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .response(
                    "https://fastdlserver.life/f/1",
                    RawResponse::redirect("https://fastdlserver.life/f/1", "/go/1"),
                )
                .page(
                    "https://fastdlserver.life/go/1",
                    r#"<meta http-equiv="refresh" content="1; url=https://edge.example/t/1">"#,
                )
                .response(
                    "https://edge.example/t/1",
                    RawResponse::redirect(
                        "https://edge.example/t/1",
                        "https://files.example/Beta.2022.1080p.mkv?sig=1",
                    ),
                ),
        );
        let ctx = ResolveContext::new(fetcher.clone(), ResolverConfig::default());
        let urls = Arc::new(Mutex::new(Vec::new()));
        let sink_urls = Arc::clone(&urls);
        let qualities = Arc::new(Mutex::new(Vec::new()));
        let sink_qualities = Arc::clone(&qualities);
        let sinks = Sinks::new(
            move |link| {
                sink_urls.lock().unwrap().push(link.url);
                sink_qualities.lock().unwrap().push(link.quality);
            },
            |_| {},
        );

        FastDl
            .resolve("https://fastdlserver.life/f/1", &ctx, &sinks)
            .await
            .unwrap();

        assert_eq!(
            *urls.lock().unwrap(),
            vec!["https://files.example/Beta.2022.1080p.mkv?sig=1"]
        );
        assert_eq!(*qualities.lock().unwrap(), vec![Quality::P1080]);
        // The media URL itself is never requested
        assert_eq!(fetcher.requested().len(), 3);
        assert!(fetcher.requests().iter().all(|r| !r.follow_redirects));
    }

    #[tokio::test]
    async fn test_page_without_redirect_is_an_error() {
        let fetcher =
            Arc::new(StaticFetcher::new().page("https://fastdlserver.life/f/2", "<p>404</p>"));
        let ctx = ResolveContext::new(fetcher, ResolverConfig::default());

        let result = FastDl
            .resolve("https://fastdlserver.life/f/2", &ctx, &Sinks::discard())
            .await;

        assert!(matches!(
            result,
            Err(ExtractionError::MissingElement { what: "redirect target", .. })
        ));
    }
}
