//! Extractor registry
//!
//! Maps candidate URLs to the extractor responsible for them. The registry
//! is assembled once at startup through [`RegistryBuilder`] and is immutable
//! afterwards, so it can be shared between tasks behind an `Arc`.

use crate::extractors::{self, Delivered, ExtractionError, Extractor, ResolveContext};
use crate::sink::Sinks;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Host pattern deciding which URLs an extractor handles
#[derive(Debug, Clone)]
pub enum DomainPattern {
    /// Any host with a dot-separated label equal to this name, so
    /// `hubcloud` matches `hubcloud.ink`, `www.hubcloud.club`, ...
    Label(String),
    /// The domain itself or any subdomain of it
    Suffix(String),
    /// Regular expression matched against the lowercased host
    Regex(Regex),
}

impl DomainPattern {
    pub fn label(name: impl Into<String>) -> Self {
        Self::Label(name.into().to_ascii_lowercase())
    }

    pub fn suffix(domain: impl Into<String>) -> Self {
        Self::Suffix(domain.into().to_ascii_lowercase())
    }

    /// Compiles a host regex
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self::Regex)
    }

    /// Whether this pattern covers the host of `url`.
    ///
    /// URLs that cannot be parsed or have no host never match.
    pub fn matches(&self, url: &str) -> bool {
        let Some(host) = url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        else {
            return false;
        };

        match self {
            Self::Label(name) => host.split('.').any(|label| label == name),
            Self::Suffix(domain) => {
                host == *domain
                    || host
                        .strip_suffix(domain.as_str())
                        .is_some_and(|rest| rest.ends_with('.'))
            }
            Self::Regex(regex) => regex.is_match(&host),
        }
    }
}

impl fmt::Display for DomainPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Label(name) => write!(f, "*.{name}.*"),
            Self::Suffix(domain) => write!(f, "*.{domain}"),
            Self::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// An extractor together with the hosts it handles
#[derive(Clone)]
pub struct ExtractorDescriptor {
    pub pattern: DomainPattern,
    pub extractor: Arc<dyn Extractor>,
}

impl ExtractorDescriptor {
    pub fn new(pattern: DomainPattern, extractor: Arc<dyn Extractor>) -> Self {
        Self { pattern, extractor }
    }
}

impl fmt::Debug for ExtractorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractorDescriptor")
            .field("pattern", &self.pattern)
            .field("extractor", &self.extractor.name())
            .finish()
    }
}

/// Outcome of handing one candidate to the registry
#[derive(Debug)]
pub enum Dispatch {
    /// No extractor covers the candidate's host
    Unmatched,
    /// The extractor reached a terminal page
    Completed {
        extractor: &'static str,
        delivered: Delivered,
    },
    /// The extractor's chain ended without results
    Failed {
        extractor: &'static str,
        error: ExtractionError,
    },
}

/// Collects descriptors in registration order
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    descriptors: Vec<ExtractorDescriptor>,
}

impl RegistryBuilder {
    /// Appends a descriptor; earlier registrations win ties
    pub fn register(mut self, descriptor: ExtractorDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn with(self, pattern: DomainPattern, extractor: Arc<dyn Extractor>) -> Self {
        self.register(ExtractorDescriptor::new(pattern, extractor))
    }

    pub fn build(self) -> ExtractorRegistry {
        ExtractorRegistry {
            descriptors: self.descriptors,
        }
    }
}

/// Immutable, ordered set of extractors
#[derive(Debug, Clone)]
pub struct ExtractorRegistry {
    descriptors: Vec<ExtractorDescriptor>,
}

impl ExtractorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// HubCloud, VCloud, GDFlix, FastDL and Sharepoint, in that order
    pub fn with_default_extractors() -> Self {
        extractors::default_extractors()
            .into_iter()
            .fold(Self::builder(), |builder, (pattern, extractor)| {
                builder.with(pattern, extractor)
            })
            .build()
    }

    /// The first registered extractor whose pattern matches `url`
    pub fn find(&self, url: &str) -> Option<&Arc<dyn Extractor>> {
        self.descriptors
            .iter()
            .find(|descriptor| descriptor.pattern.matches(url))
            .map(|descriptor| &descriptor.extractor)
    }

    /// Runs the matching extractor for `url`.
    ///
    /// A URL no extractor covers is silently ignored.
    pub async fn resolve(&self, url: &str, ctx: &ResolveContext, sinks: &Sinks) -> Dispatch {
        let Some(extractor) = self.find(url) else {
            debug!(url, "no extractor for candidate");
            return Dispatch::Unmatched;
        };

        let name = extractor.name();
        debug!(url, extractor = name, "dispatching candidate");
        match extractor.resolve(url, ctx, sinks).await {
            Ok(delivered) => Dispatch::Completed {
                extractor: name,
                delivered,
            },
            Err(error) => Dispatch::Failed {
                extractor: name,
                error,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Extractor names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.descriptors
            .iter()
            .map(|descriptor| descriptor.extractor.name())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::testing::StaticFetcher;
    use async_trait::async_trait;

    /// Records nothing, answers with a fixed count
    struct Fixed(&'static str, usize);

    #[async_trait]
    impl Extractor for Fixed {
        fn name(&self) -> &'static str {
            self.0
        }

        async fn resolve(
            &self,
            _url: &str,
            _ctx: &ResolveContext,
            _sinks: &Sinks,
        ) -> Result<Delivered, ExtractionError> {
            Ok(Delivered {
                links: self.1,
                subtitles: 0,
            })
        }
    }

    fn context(fetcher: Arc<StaticFetcher>) -> ResolveContext {
        ResolveContext::new(fetcher, ResolverConfig::default())
    }

    #[test]
    fn test_label_pattern_covers_rotating_domains() {
        let pattern = DomainPattern::label("hubcloud");
        assert!(pattern.matches("https://hubcloud.ink/drive/1"));
        assert!(pattern.matches("https://www.HubCloud.club/drive/1"));
        assert!(pattern.matches("https://hubcloud.lol/x"));
        assert!(!pattern.matches("https://nothubcloud.ink/drive/1"));
        assert!(!pattern.matches("not a url"));
    }

    #[test]
    fn test_suffix_pattern() {
        let pattern = DomainPattern::suffix("sharepoint.com");
        assert!(pattern.matches("https://sharepoint.com/x"));
        assert!(pattern.matches("https://contoso-my.sharepoint.com/x"));
        assert!(!pattern.matches("https://evilsharepoint.com/x"));
    }

    #[test]
    fn test_regex_pattern() {
        let pattern = DomainPattern::regex(r"^gdflix\d*\.").unwrap();
        assert!(pattern.matches("https://gdflix2.dad/file/1"));
        assert!(!pattern.matches("https://new.gdflix.dad/file/1"));
        assert!(DomainPattern::regex("(").is_err());
    }

    #[tokio::test]
    async fn test_first_registration_wins() {
        let registry = ExtractorRegistry::builder()
            .with(DomainPattern::label("hubcloud"), Arc::new(Fixed("First", 1)))
            .with(DomainPattern::suffix("hubcloud.ink"), Arc::new(Fixed("Second", 2)))
            .build();
        let ctx = context(Arc::new(StaticFetcher::new()));

        assert_eq!(registry.find("https://hubcloud.ink/a").map(|e| e.name()), Some("First"));
        let dispatch = registry.resolve("https://hubcloud.ink/a", &ctx, &Sinks::discard()).await;
        assert!(matches!(
            dispatch,
            Dispatch::Completed { extractor: "First", delivered: Delivered { links: 1, .. } }
        ));
    }

    #[tokio::test]
    async fn test_unmatched_url_is_a_noop() {
        let registry = ExtractorRegistry::with_default_extractors();
        let fetcher = Arc::new(StaticFetcher::new());
        let ctx = context(fetcher.clone());

        let dispatch = registry
            .resolve("https://unknown-host.example/file", &ctx, &Sinks::discard())
            .await;

        assert!(matches!(dispatch, Dispatch::Unmatched));
        assert!(fetcher.requested().is_empty());
    }

    #[test]
    fn test_default_registration_order() {
        let registry = ExtractorRegistry::with_default_extractors();
        assert_eq!(
            registry.names(),
            vec!["HubCloud", "VCloud", "GDFlix", "FastDL", "Sharepoint"]
        );
        assert_eq!(registry.find("https://gdflix.dad/file/1").map(|e| e.name()), Some("GDFlix"));
        assert_eq!(
            registry.find("https://fastdlserver.life/f/1").map(|e| e.name()),
            Some("FastDL")
        );
    }

    #[tokio::test]
    async fn test_failed_chain_reports_extractor() {
        let registry = ExtractorRegistry::with_default_extractors();
        let ctx = context(Arc::new(StaticFetcher::new()));

        let dispatch = registry
            .resolve("https://vcloud.lol/gone", &ctx, &Sinks::discard())
            .await;

        assert!(matches!(
            dispatch,
            Dispatch::Failed { extractor: "VCloud", error: ExtractionError::Fetch(_) }
        ));
    }
}
