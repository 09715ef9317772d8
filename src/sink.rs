//! Result sinks
//!
//! Extractors hand every playable link and subtitle to a pair of callbacks as
//! soon as their hop chain terminates. The callbacks are shared by all
//! concurrent resolutions, so they must be `Send + Sync`; delivery order
//! across candidates is unspecified.

use crate::model::{ResolvedMediaLink, SubtitleFile};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

type MediaCallback = Arc<dyn Fn(ResolvedMediaLink) + Send + Sync>;
type SubtitleCallback = Arc<dyn Fn(SubtitleFile) + Send + Sync>;

/// Event produced by a channel-backed sink pair
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    MediaLink(ResolvedMediaLink),
    Subtitle(SubtitleFile),
}

/// The two callbacks results are delivered to.
#[derive(Clone)]
pub struct Sinks {
    media: MediaCallback,
    subtitle: SubtitleCallback,
}

impl Sinks {
    /// Creates sinks from two closures.
    ///
    /// # Examples
    ///
    /// ```
    /// use linkhop::Sinks;
    ///
    /// let sinks = Sinks::new(
    ///     |link| println!("{} ({})", link.url, link.quality),
    ///     |subtitle| println!("subtitle: {}", subtitle.url),
    /// );
    /// # let _ = sinks;
    /// ```
    pub fn new<M, S>(on_media_link: M, on_subtitle: S) -> Self
    where
        M: Fn(ResolvedMediaLink) + Send + Sync + 'static,
        S: Fn(SubtitleFile) + Send + Sync + 'static,
    {
        Self {
            media: Arc::new(on_media_link),
            subtitle: Arc::new(on_subtitle),
        }
    }

    /// Sinks that drop everything
    pub fn discard() -> Self {
        Self::new(|_| {}, |_| {})
    }

    /// Sinks forwarding into an unbounded channel.
    ///
    /// The receiver yields events in delivery order and closes once every
    /// clone of the returned sinks is dropped.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subtitle_tx = tx.clone();

        // A closed receiver only means nobody listens anymore
        let sinks = Self::new(
            move |link| {
                let _ = tx.send(SinkEvent::MediaLink(link));
            },
            move |subtitle| {
                let _ = subtitle_tx.send(SinkEvent::Subtitle(subtitle));
            },
        );

        (sinks, rx)
    }

    pub fn on_media_link(&self, link: ResolvedMediaLink) {
        (self.media)(link)
    }

    pub fn on_subtitle(&self, subtitle: SubtitleFile) {
        (self.subtitle)(subtitle)
    }
}

impl fmt::Debug for Sinks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sinks").finish_non_exhaustive()
    }
}
