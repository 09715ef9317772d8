//! Page fetching
//!
//! The pipeline only ever issues GET requests through the [`Fetcher`] trait.
//! [`HttpFetcher`] implements it on top of reqwest; tests swap in an
//! in-memory implementation.

use crate::config::ResolverConfig;
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use thiserror::Error;

/// Errors that can occur while fetching a page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// Connection, TLS, timeout or body decoding failure
    #[error("Request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// The request was abandoned because its resolution was cancelled
    #[error("Request to {url} was cancelled")]
    Cancelled { url: String },

    /// The URL could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

/// A single GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Sent as `Referer` when present
    pub referer: Option<String>,
    /// When false, 3xx responses are returned as-is so `Location` can be read
    pub follow_redirects: bool,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            referer: None,
            follow_redirects: true,
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn without_redirects(mut self) -> Self {
        self.follow_redirects = false;
        self
    }
}

static MEDIA_PATH_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\.(mkv|mp4|avi|webm|mov|m4v|ts|m3u8)(\?|$))|(pixeldrain\.[a-z]+/api/file/)|(\.r2\.dev/)|(googleusercontent\.com/)",
    )
    .expect("valid media path regex")
});

/// Returns true when the URL itself looks like a direct media file or a
/// known file CDN endpoint.
pub fn is_media_url(url: &str) -> bool {
    MEDIA_PATH_REGEX.is_match(url)
}

/// The parts of an HTTP response the pipeline inspects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RawResponse {
    /// Final URL after any redirects that were followed
    pub url: String,
    pub status: u16,
    /// Header map with lowercased names
    pub headers: HashMap<String, String>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// Decoded body for textual responses, empty for binary ones
    pub body: String,
    /// The response itself is playable media (binary body)
    pub media: bool,
}

impl RawResponse {
    /// Convenience constructor for an HTML page
    pub fn html(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.into(),
            ..Self::default()
        }
    }

    /// Convenience constructor for a redirect that was not followed
    pub fn redirect(url: impl Into<String>, location: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("location".to_string(), location.into());
        Self {
            url: url.into(),
            status: 302,
            headers,
            ..Self::default()
        }
    }

    /// Convenience constructor for a binary media response
    pub fn media(url: impl Into<String>, content_type: &str, length: Option<u64>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            content_type: Some(content_type.to_string()),
            content_length: length,
            media: true,
            ..Self::default()
        }
    }

    /// Adds a header (name is lowercased)
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Looks up a header by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The redirect target of a 3xx response
    pub fn location(&self) -> Option<&str> {
        if (300..400).contains(&self.status) {
            self.header("location")
        } else {
            None
        }
    }

    /// True when this response ends a hop chain by itself
    pub fn is_terminal_media(&self) -> bool {
        self.media || is_media_url(&self.url)
    }
}

/// Capability to GET pages over HTTP(S).
///
/// Implementations must be safe for concurrent use; the orchestrator shares
/// one instance across all resolution tasks.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs a GET request.
    ///
    /// Non-success statuses are errors, except 3xx responses when the request
    /// asked not to follow redirects.
    async fn fetch(&self, request: &FetchRequest) -> Result<RawResponse, FetchError>;
}

/// reqwest-backed [`Fetcher`].
pub struct HttpFetcher {
    /// Client following redirects
    client: reqwest::Client,
    /// Client handing back 3xx responses untouched
    no_redirect: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the timeout and user agent from `config`.
    pub fn new(config: &ResolverConfig) -> Result<Self, FetchError> {
        let build = |policy: reqwest::redirect::Policy| {
            reqwest::Client::builder()
                .user_agent(config.user_agent.clone())
                .timeout(config.request_timeout)
                .redirect(policy)
                .build()
                .map_err(|e| FetchError::Client(e.to_string()))
        };

        Ok(Self {
            client: build(reqwest::redirect::Policy::limited(10))?,
            no_redirect: build(reqwest::redirect::Policy::none())?,
        })
    }
}

/// Whether a content type carries a body we want to read as text
fn is_textual(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    ct.starts_with("text/")
        || ct.contains("json")
        || ct.contains("javascript")
        || ct.contains("xml")
}

/// Whether the first chunk of an untyped body is binary data
fn looks_binary(first_chunk: &[u8]) -> bool {
    match infer::get(first_chunk) {
        Some(kind) => !matches!(kind.matcher_type(), infer::MatcherType::Text),
        None => first_chunk.contains(&0),
    }
}

/// Whether a non-textual response is playable media
fn is_media_body(content_type: Option<&str>, first_chunk: &[u8]) -> bool {
    let declared = content_type
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.starts_with("video/")
                || ct.starts_with("audio/")
                || ct.contains("octet-stream")
                || ct.contains("matroska")
                || ct.contains("mpegurl")
        })
        .unwrap_or(false);

    declared || infer::is_video(first_chunk)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<RawResponse, FetchError> {
        let client = if request.follow_redirects {
            &self.client
        } else {
            &self.no_redirect
        };

        let mut builder = client.get(&request.url);
        if let Some(referer) = &request.referer {
            builder = builder.header(reqwest::header::REFERER, referer);
        }

        let mut response = builder.send().await.map_err(|e| FetchError::Transport {
            url: request.url.clone(),
            message: e.to_string(),
        })?;

        let status = response.status();
        let passthrough_redirect = status.is_redirection() && !request.follow_redirects;
        if !status.is_success() && !passthrough_redirect {
            return Err(FetchError::Status {
                url: request.url.clone(),
                status: status.as_u16(),
            });
        }

        let url = response.url().to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let content_type = headers.get("content-type").cloned();
        let content_length = response.content_length();

        let transport_error = |e: reqwest::Error| FetchError::Transport {
            url: request.url.clone(),
            message: e.to_string(),
        };

        // Media bodies can be gigabytes; only the first chunk is sniffed
        let declared = content_type.as_deref();
        let (body, media) = if passthrough_redirect || declared.is_some_and(is_textual) {
            (response.text().await.map_err(transport_error)?, false)
        } else {
            let first_chunk = response
                .chunk()
                .await
                .map_err(transport_error)?
                .unwrap_or_default();

            if declared.is_none() && !looks_binary(&first_chunk) {
                let mut bytes = first_chunk.to_vec();
                while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
                    bytes.extend_from_slice(&chunk);
                }
                (String::from_utf8_lossy(&bytes).into_owned(), false)
            } else {
                (String::new(), is_media_body(declared, &first_chunk))
            }
        };

        Ok(RawResponse {
            url,
            status: status.as_u16(),
            headers,
            content_type,
            content_length,
            body,
            media,
        })
    }
}
