//! Shared error type for URL resolution, HTTP, and catalog/chapter parsing.

use thiserror::Error;

/// Scraper error: URL resolution, network, and site-markup parsing failures.
///
/// Parse variants are never retried: markup drift cannot be fixed by trying
/// again, so they surface immediately rather than producing an empty sequence.
#[derive(Debug, Error)]
pub enum ScraperError {
    #[error("Invalid URL: {input}: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("Network error: could not reach {url}: {source}")]
    Network { url: String, source: reqwest::Error },

    #[error("HTTP {status} when fetching: {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Optional context (e.g. "listing page", "chapter 5") for messages.
        context: Option<String>,
    },

    #[error("Failed to read response body: {source}")]
    BodyRead { source: reqwest::Error },

    #[error("Could not parse manga listing page: {message}")]
    ParseCatalog { message: String },

    #[error("Manga listing page has no chapter links (markup may have changed, or the manga was removed).")]
    EmptyChapterList,

    #[error("No page images found at {url} (markup may have changed).")]
    NoImagesFound { url: String },
}
