//! GDFlix file pages.
//!
//! GDFlix rotates its domain often; stale links answer with a meta refresh
//! to the current one, and every refresh counts as a hop. The file page lists
//! name and size in `li.list-group-item` rows and one anchor per server.

use super::chain::{Hop, HopRules, Terminal, Transition, media_link, run_chain};
use super::{
    Delivered, ExtractionError, Extractor, ResolveContext, meta_refresh_url,
    pixeldrain_download_url, query_param,
};
use crate::fetch::{FetchRequest, RawResponse};
use crate::html::{absolute_url, attr_of, contains_ignore_case, selector, text_of};
use crate::sink::Sinks;
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

static INFO_ROW_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("li.list-group-item"));
static BUTTON_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("div.text-center a"));
static INDEX_BUTTON_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("a.btn"));

/// Extractor for GDFlix file links
#[derive(Debug, Clone, Copy, Default)]
pub struct GdFlix;

/// A parsed GDFlix file page
#[derive(Debug, Default, PartialEq, Eq)]
struct FilePage {
    name: Option<String>,
    size: Option<String>,
    /// (label, absolute href)
    buttons: Vec<(String, String)>,
}

fn parse_file_page(html: &str, page_url: &str) -> FilePage {
    let document = Html::parse_document(html);
    let mut page = FilePage::default();

    for row in document.select(&INFO_ROW_SELECTOR) {
        let text = text_of(&row);
        if let Some(name) = text.strip_prefix("Name :") {
            page.name = Some(name.trim().to_string()).filter(|n| !n.is_empty());
        } else if let Some(size) = text.strip_prefix("Size :") {
            page.size = Some(size.trim().to_string()).filter(|s| !s.is_empty());
        }
    }

    page.buttons = document
        .select(&BUTTON_SELECTOR)
        .filter_map(|a| {
            let href = attr_of(&a, "href").and_then(|href| absolute_url(page_url, &href))?;
            Some((text_of(&a), href))
        })
        .collect();

    page
}

fn index_links(html: &str, page_url: &str) -> Vec<(String, String)> {
    let document = Html::parse_document(html);
    document
        .select(&INDEX_BUTTON_SELECTOR)
        .filter_map(|a| {
            let href = attr_of(&a, "href").and_then(|href| absolute_url(page_url, &href))?;
            Some((text_of(&a), href))
        })
        .collect()
}

/// Reads the file URL from the `url=` parameter of the Instant DL redirect
async fn instant_target(
    href: &str,
    ctx: &ResolveContext,
) -> Result<Option<String>, ExtractionError> {
    let request = FetchRequest::new(href).without_redirects();
    let Some(response) = ctx.fetch_optional(&request).await? else {
        return Ok(None);
    };
    Ok(response
        .location()
        .and_then(|location| query_param(location, "url")))
}

async fn resolve_file_page(
    page: FilePage,
    ctx: &ResolveContext,
) -> Result<Terminal, ExtractionError> {
    let mut terminal = Terminal::default();
    let name = page.name.as_deref();
    let size = page.size.as_deref();

    for (label, href) in &page.buttons {
        let direct = ["FSL", "DIRECT DL", "DIRECT SERVER", "CLOUD DOWNLOAD"]
            .iter()
            .any(|known| contains_ignore_case(label, known));

        if direct {
            terminal.links.push(media_link("GDFlix", label, href, name, size));
        } else if contains_ignore_case(label, "PixelDrain") {
            if let Some(url) = pixeldrain_download_url(href) {
                terminal.links.push(media_link("GDFlix", label, &url, name, size));
            }
        } else if contains_ignore_case(label, "Instant DL") {
            match instant_target(href, ctx).await? {
                Some(url) => terminal.links.push(media_link("GDFlix", label, &url, name, size)),
                None => debug!(label = %label, "instant download did not redirect"),
            }
        } else if contains_ignore_case(label, "Index Links") {
            let request = FetchRequest::new(href.as_str());
            if let Some(index) = ctx.fetch_optional(&request).await? {
                for (server, url) in index_links(&index.body, &index.url) {
                    terminal.links.push(media_link("GDFlix", &server, &url, name, size));
                }
            }
        } else {
            debug!(label = %label, "skipping unsupported server");
        }
    }

    Ok(terminal)
}

#[async_trait]
impl HopRules for GdFlix {
    type Stage = ();

    fn name(&self) -> &'static str {
        "GDFlix"
    }

    fn start(&self, url: &str) -> Hop<()> {
        Hop::new(FetchRequest::new(url), ())
    }

    async fn step(
        &self,
        _stage: (),
        response: RawResponse,
        ctx: &ResolveContext,
    ) -> Result<Transition<()>, ExtractionError> {
        if let Some(target) = meta_refresh_url(&response.body)
            .and_then(|href| absolute_url(&response.url, &href))
        {
            debug!(from = %response.url, to = %target, "following domain rotation");
            return Ok(Transition::Follow(Hop::new(FetchRequest::new(target), ())));
        }

        let page = parse_file_page(&response.body, &response.url);
        if page.buttons.is_empty() {
            return Err(ExtractionError::MissingElement {
                extractor: "GDFlix",
                what: "download buttons",
                url: response.url,
            });
        }

        Ok(Transition::Terminal(resolve_file_page(page, ctx).await?))
    }
}

#[async_trait]
impl Extractor for GdFlix {
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
    use crate::model::{Quality, ResolvedMediaLink};
    use crate::testing::StaticFetcher;
    use std::sync::{Arc, Mutex};

    const FILE_PAGE: &str = r#"<ul>
          <li class="list-group-item">Name : Alpha.2021.720p.WEB.mkv</li>
          <li class="list-group-item">Size : 900 MB</li>
        </ul>
        <div class="text-center">
          <a href="https://fsl.gdflix.example/a.mkv">FSL V2 Server</a>
          <a href="https://pixeldrain.com/u/Qx7">PixelDrain DL</a>
          <a href="https://new.gdflix.dad/instant/1">Instant DL [10GBPS]</a>
          <a href="/zfile/index/1">Index Links</a>
          <a href="https://t.me/gdflix">Telegram</a>
        </div>"#;

    fn refresh_to(host: &str) -> String {
        format!(
            r#"<meta http-equiv="refresh" content="0;url=https://{host}.gdflix.example/file/1">"#
        )
    }

    #[test]
    fn test_parse_file_page() {
        let page = parse_file_page(FILE_PAGE, "https://new.gdflix.dad/file/1");
        assert_eq!(page.name.as_deref(), Some("Alpha.2021.720p.WEB.mkv"));
        assert_eq!(page.size.as_deref(), Some("900 MB"));
        assert_eq!(page.buttons.len(), 5);
        assert_eq!(page.buttons[3].1, "https://new.gdflix.dad/zfile/index/1");
    }

    #[tokio::test]
    async fn test_domain_rotation_then_file_page() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .page(
                    "https://old.gdflix.cfd/file/1",
                    r#"<meta http-equiv="refresh" content="0;url=https://new.gdflix.dad/file/1">"#,
                )
                .page("https://new.gdflix.dad/file/1", FILE_PAGE)
                .response(
                    "https://new.gdflix.dad/instant/1",
                    RawResponse::redirect(
                        "https://new.gdflix.dad/instant/1",
                        "https://instant.example/dl?url=https%3A%2F%2Fcdn.example%2Falpha.mkv",
                    ),
                )
                .page(
                    "https://new.gdflix.dad/zfile/index/1",
                    r#"<a class="btn" href="https://idx1.example/alpha.mkv">Server 1</a>
                       <a class="btn" href="https://idx2.example/alpha.mkv">Server 2</a>"#,
                ),
        );
        let ctx = ResolveContext::new(fetcher, ResolverConfig::default());
        let links: Arc<Mutex<Vec<ResolvedMediaLink>>> = Arc::default();
        let sink_links = Arc::clone(&links);
        let sinks = Sinks::new(move |link| sink_links.lock().unwrap().push(link), |_| {});

        let delivered = GdFlix
            .resolve("https://old.gdflix.cfd/file/1", &ctx, &sinks)
            .await
            .unwrap();

        assert_eq!(delivered.links, 5);
        let links = links.lock().unwrap();
        let urls: Vec<&str> = links.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://fsl.gdflix.example/a.mkv",
                "https://pixeldrain.com/api/file/Qx7?download",
                "https://cdn.example/alpha.mkv",
                "https://idx1.example/alpha.mkv",
                "https://idx2.example/alpha.mkv",
            ]
        );
        assert!(links.iter().all(|l| l.quality == Quality::P720));
        assert_eq!(links[3].source, "GDFlix[Server 1]");
    }

    #[tokio::test]
    async fn test_endless_rotation_exhausts_budget() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .page("https://a.gdflix.example/file/1", &refresh_to("b"))
                .page("https://b.gdflix.example/file/1", &refresh_to("a")),
        );
        let config = ResolverConfig::default().with_hop_budget(4);
        let ctx = ResolveContext::new(fetcher, config);

        let result = GdFlix
            .resolve("https://a.gdflix.example/file/1", &ctx, &Sinks::discard())
            .await;

        assert!(matches!(
            result,
            Err(ExtractionError::Exhausted { hops: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_instant_dl_failure_skips_button_only() {
        let fetcher = Arc::new(
            StaticFetcher::new()
                .page("https://new.gdflix.dad/file/1", FILE_PAGE)
                .failure("https://new.gdflix.dad/instant/1", 502)
                .failure("https://new.gdflix.dad/zfile/index/1", 500),
        );
        let ctx = ResolveContext::new(fetcher, ResolverConfig::default());

        let delivered = GdFlix
            .resolve("https://new.gdflix.dad/file/1", &ctx, &Sinks::discard())
            .await
            .unwrap();

        assert_eq!(delivered.links, 2);
    }

    #[tokio::test]
    async fn test_cancelled_button_request_aborts_file_page() {
        let fetcher = Arc::new(StaticFetcher::new());
        let ctx = ResolveContext::new(fetcher.clone(), ResolverConfig::default());
        ctx.cancellation().cancel();
        let page = parse_file_page(FILE_PAGE, "https://new.gdflix.dad/file/1");

        let result = resolve_file_page(page, &ctx).await;

        assert!(matches!(result, Err(ExtractionError::Cancelled)));
        assert!(fetcher.requested().is_empty());
    }
}
