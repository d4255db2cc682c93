//! Background artwork: fetching, validation and the "latest request wins" loader.

mod sanitize;

pub use sanitize::sanitize_svg;
pub(crate) use sanitize::escape_into;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors raised by an artwork source.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("Artwork not found: {0}")]
    NotFound(String),
    #[error("Network error: {0}")]
    Network(String),
}

/// Errors raised while loading background artwork.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackgroundError {
    #[error("Failed to fetch artwork: {0}")]
    Fetch(#[from] FetchError),
    #[error("Artwork is empty")]
    Empty,
    #[error("Artwork is not well-formed: {0}")]
    Malformed(String),
    #[error("Artwork root must be <svg>, found <{0}>")]
    NotSvg(String),
}

/// Boxed future for async operations (compatible with WASM).
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// Source of background markup by URL.
pub trait ArtworkFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>>;
}

/// In-memory artwork source for tests and offline use.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    artwork: HashMap<String, String>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, markup: impl Into<String>) {
        self.artwork.insert(url.into(), markup.into());
    }
}

impl ArtworkFetcher for MemoryFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<String, FetchError>> {
        Box::pin(async move {
            self.artwork
                .get(url)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(url.to_string()))
        })
    }
}

/// Identifies one fetch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    generation: u64,
    url: String,
}

impl FetchTicket {
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// What happened to a completed fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// A newer request was issued meanwhile; the result was ignored.
    Stale,
}

/// Background artwork state.
#[derive(Debug, Default)]
pub struct BackgroundLoader {
    generation: u64,
    markup: Option<String>,
    source_url: Option<String>,
    pending_url: Option<String>,
    failed_url: Option<String>,
}

impl BackgroundLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request. Any earlier request still in flight becomes stale.
    pub fn begin(&mut self, url: impl Into<String>) -> FetchTicket {
        self.generation += 1;
        let url = url.into();
        self.pending_url = Some(url.clone());
        FetchTicket {
            generation: self.generation,
            url,
        }
    }

    /// Finish a request.
    ///
    /// Invalid markup is rejected whole and the URL is remembered for
    /// [`retry`](Self::retry); the current artwork is left untouched.
    pub fn complete(
        &mut self,
        ticket: FetchTicket,
        result: Result<String, FetchError>,
    ) -> Result<LoadOutcome, BackgroundError> {
        if ticket.generation != self.generation {
            log::debug!("ignoring stale artwork response for {}", ticket.url);
            return Ok(LoadOutcome::Stale);
        }
        self.pending_url = None;

        let clean = result
            .map_err(BackgroundError::from)
            .and_then(|markup| sanitize_svg(&markup));
        match clean {
            Ok(markup) => {
                log::info!("background artwork loaded from {}", ticket.url);
                self.markup = Some(markup);
                self.source_url = Some(ticket.url);
                self.failed_url = None;
                Ok(LoadOutcome::Applied)
            }
            Err(e) => {
                log::warn!("background artwork from {} rejected: {}", ticket.url, e);
                self.failed_url = Some(ticket.url);
                Err(e)
            }
        }
    }

    /// Re-issue the last failed request.
    pub fn retry(&mut self) -> Option<FetchTicket> {
        let url = self.failed_url.take()?;
        Some(self.begin(url))
    }

    /// Sanitized markup currently shown.
    pub fn markup(&self) -> Option<&str> {
        self.markup.as_deref()
    }

    pub fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref()
    }

    pub fn failed_url(&self) -> Option<&str> {
        self.failed_url.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.pending_url.is_some()
    }

    pub fn clear(&mut self) {
        self.generation += 1;
        self.markup = None;
        self.source_url = None;
        self.pending_url = None;
        self.failed_url = None;
    }
}

/// Run a fetch for `ticket`, handing the ticket back with the result.
pub async fn fetch(
    fetcher: &dyn ArtworkFetcher,
    ticket: FetchTicket,
) -> (FetchTicket, Result<String, FetchError>) {
    let result = fetcher.fetch(&ticket.url).await;
    (ticket, result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ART: &str = r#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="5" height="5"/></svg>"#;

    fn fetcher() -> MemoryFetcher {
        let mut fetcher = MemoryFetcher::new();
        fetcher.insert("a.svg", ART);
        fetcher.insert("b.svg", ART.replace("rect", "circle"));
        fetcher.insert("bad.svg", "<html/>");
        fetcher
    }

    #[test]
    fn test_load_applies_sanitized_markup() {
        let fetcher = fetcher();
        let mut loader = BackgroundLoader::new();
        let ticket = loader.begin("a.svg");
        assert!(loader.is_loading());

        let (ticket, result) = pollster::block_on(fetch(&fetcher, ticket));
        assert_eq!(loader.complete(ticket, result), Ok(LoadOutcome::Applied));
        assert!(!loader.is_loading());
        assert!(loader.markup().unwrap().contains("<rect"));
        assert_eq!(loader.source_url(), Some("a.svg"));
    }

    #[test]
    fn test_latest_request_wins() {
        let fetcher = fetcher();
        let mut loader = BackgroundLoader::new();
        let first = loader.begin("a.svg");
        let second = loader.begin("b.svg");

        let (second, result_b) = pollster::block_on(fetch(&fetcher, second));
        let (first, result_a) = pollster::block_on(fetch(&fetcher, first));

        assert_eq!(loader.complete(second, result_b), Ok(LoadOutcome::Applied));
        assert_eq!(loader.complete(first, result_a), Ok(LoadOutcome::Stale));
        assert!(loader.markup().unwrap().contains("<circle"));
    }

    #[test]
    fn test_invalid_artwork_rejected_and_retryable() {
        let fetcher = fetcher();
        let mut loader = BackgroundLoader::new();
        let ticket = loader.begin("a.svg");
        let (ticket, result) = pollster::block_on(fetch(&fetcher, ticket));
        loader.complete(ticket, result).unwrap();

        let ticket = loader.begin("bad.svg");
        let (ticket, result) = pollster::block_on(fetch(&fetcher, ticket));
        assert!(matches!(
            loader.complete(ticket, result),
            Err(BackgroundError::NotSvg(_))
        ));
        // Previous artwork is kept
        assert_eq!(loader.source_url(), Some("a.svg"));
        assert_eq!(loader.failed_url(), Some("bad.svg"));

        let retry = loader.retry().unwrap();
        assert_eq!(retry.url(), "bad.svg");
        assert!(loader.failed_url().is_none());
    }

    #[test]
    fn test_fetch_error_surfaces() {
        let fetcher = fetcher();
        let mut loader = BackgroundLoader::new();
        let ticket = loader.begin("missing.svg");
        let (ticket, result) = pollster::block_on(fetch(&fetcher, ticket));
        assert_eq!(
            loader.complete(ticket, result),
            Err(BackgroundError::Fetch(FetchError::NotFound("missing.svg".into())))
        );
    }
}
