//! The "card" download page shared by HubCloud and VCloud.
//!
//! A card page shows the file name in `div.card-header`, its size in
//! `i#size`, and one `a.btn` per download server. Most servers link the file
//! directly; a few need one extra request to reveal the real target.

use super::chain::{Terminal, media_link};
use super::{ExtractionError, ResolveContext, after_marker, pixeldrain_download_url};
use crate::fetch::FetchRequest;
use crate::html::{absolute_url, attr_of, contains_ignore_case, selector, text_of};
use crate::model::SubtitleFile;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tracing::debug;

static HEADER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("div.card-header"));
static SIZE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("i#size"));
static BUTTON_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| selector("div.card-body h2 a.btn, div.card-body a.btn"));

/// A server button on a card page
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct CardButton {
    pub label: String,
    pub href: String,
}

/// A parsed card page
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct CardPage {
    pub name: Option<String>,
    pub size: Option<String>,
    pub buttons: Vec<CardButton>,
}

/// How a button leads to its file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ButtonKind {
    /// The href is the file
    Direct,
    /// `{href}/download` answers with an `hx-redirect` header
    BuzzServer,
    /// Share page on pixeldrain
    PixelDrain,
    /// Redirect whose `Location` carries the file after `link=`
    TenGbps,
    /// Subtitle track
    Subtitle,
    Unsupported,
}

fn classify_button(button: &CardButton) -> ButtonKind {
    let label = &button.label;
    let href = button.href.to_ascii_lowercase();

    if href.ends_with(".srt") || href.ends_with(".vtt") {
        ButtonKind::Subtitle
    } else if href.contains("pixeldra") {
        ButtonKind::PixelDrain
    } else if contains_ignore_case(label, "BuzzServer") {
        ButtonKind::BuzzServer
    } else if contains_ignore_case(label, "10Gbps") {
        ButtonKind::TenGbps
    } else if ["FSL Server", "Download File", "S3 Server", "Mega Server"]
        .iter()
        .any(|known| contains_ignore_case(label, known))
    {
        ButtonKind::Direct
    } else {
        ButtonKind::Unsupported
    }
}

/// Parses a card page, returning `None` when it has no server buttons.
pub(super) fn parse_card_page(html: &str, page_url: &str) -> Option<CardPage> {
    let document = Html::parse_document(html);

    let buttons: Vec<CardButton> = document
        .select(&BUTTON_SELECTOR)
        .filter_map(|button| {
            let href = attr_of(&button, "href").and_then(|href| absolute_url(page_url, &href))?;
            Some(CardButton {
                label: text_of(&button),
                href,
            })
        })
        .collect();

    if buttons.is_empty() {
        return None;
    }

    let name = document
        .select(&HEADER_SELECTOR)
        .next()
        .map(|header| text_of(&header))
        .filter(|name| !name.is_empty());
    let size = document
        .select(&SIZE_SELECTOR)
        .next()
        .map(|size| text_of(&size))
        .filter(|size| !size.is_empty());

    Some(CardPage { name, size, buttons })
}

/// Turns every usable button of a card page into a link or subtitle.
///
/// Buttons whose extra request fails are skipped; the others are still
/// delivered. Only cancellation aborts the page.
pub(super) async fn resolve_card(
    extractor: &'static str,
    page: CardPage,
    ctx: &ResolveContext,
) -> Result<Terminal, ExtractionError> {
    let mut terminal = Terminal::default();
    let name = page.name.as_deref();
    let size = page.size.as_deref();

    for button in &page.buttons {
        let kind = classify_button(button);
        let url = match kind {
            ButtonKind::Direct => Some(button.href.clone()),
            ButtonKind::PixelDrain => pixeldrain_download_url(&button.href),
            ButtonKind::BuzzServer => buzz_server_target(&button.href, ctx).await?,
            ButtonKind::TenGbps => ten_gbps_target(&button.href, ctx).await?,
            ButtonKind::Subtitle => {
                terminal.subtitles.push(SubtitleFile {
                    url: button.href.clone(),
                    language: subtitle_language(&button.label),
                });
                continue;
            }
            ButtonKind::Unsupported => {
                debug!(extractor, label = %button.label, "skipping unsupported server");
                continue;
            }
        };

        let Some(url) = url else {
            debug!(extractor, label = %button.label, "server did not reveal a file");
            continue;
        };

        let mut link = media_link(extractor, &button.label, &url, name, size);
        if kind == ButtonKind::BuzzServer {
            link.headers.insert("Referer".to_string(), button.href.clone());
        }
        terminal.links.push(link);
    }

    Ok(terminal)
}

/// Asks BuzzServer for the file behind a button.
async fn buzz_server_target(
    href: &str,
    ctx: &ResolveContext,
) -> Result<Option<String>, ExtractionError> {
    let download = format!("{}/download", href.trim_end_matches('/'));
    let request = FetchRequest::new(download)
        .with_referer(href)
        .without_redirects();
    let Some(response) = ctx.fetch_optional(&request).await? else {
        return Ok(None);
    };
    Ok(response
        .header("hx-redirect")
        .and_then(|target| absolute_url(href, target)))
}

/// Reads the file URL out of the 10Gbps server's redirect.
async fn ten_gbps_target(
    href: &str,
    ctx: &ResolveContext,
) -> Result<Option<String>, ExtractionError> {
    let request = FetchRequest::new(href).without_redirects();
    let Some(response) = ctx.fetch_optional(&request).await? else {
        return Ok(None);
    };
    Ok(response
        .location()
        .and_then(|location| after_marker(location, "link=")))
}

fn subtitle_language(label: &str) -> String {
    let language = label.replace("Subtitle", "").replace("subtitle", "");
    let language = language.trim();
    if language.is_empty() {
        "Unknown".to_string()
    } else {
        language.to_string()
    }
}
