//! Manga URL resolution, shared HTTP helpers, and the manga.in.ua adapter.

mod client;
mod error;

pub mod mangainua;

pub use client::{PoliteClient, PoliteClientBuilder};
pub use error::ScraperError;

use reqwest::Url;

/// Default site root. Overridable with `--base_url`.
pub const DEFAULT_BASE_URL: &str = "https://manga.in.ua";

/// Path segment under which the site hosts manga listing pages.
const MANGAS_SUB_PATH: &str = "mangas";

/// A manga resolved to an absolute listing URL plus the slug used to derive
/// default folder and file names.
#[derive(Debug, Clone)]
pub struct MangaRef {
    pub url: String,
    pub slug: String,
}

/// Resolve `--manga_url` against the base URL.
///
/// An absolute `http(s)` URL is used as-is; anything else is treated as a
/// path relative to `<base_url>/mangas/` (e.g. `boyovik/2252-berserk.html`).
pub fn resolve_manga_url(manga_url: &str, base_url: &str) -> Result<MangaRef, ScraperError> {
    let trimmed = manga_url.trim();
    if trimmed.is_empty() {
        return Err(ScraperError::InvalidUrl {
            input: manga_url.to_string(),
            reason: "empty manga URL".to_string(),
        });
    }

    let absolute = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Url::parse(trimmed).map_err(|e| ScraperError::InvalidUrl {
            input: trimmed.to_string(),
            reason: e.to_string(),
        })?
    } else {
        let base = Url::parse(base_url).map_err(|e| ScraperError::InvalidUrl {
            input: base_url.to_string(),
            reason: format!("invalid base URL: {}", e),
        })?;
        // Trailing slash keeps the mangas segment when joining the relative path.
        let sub = format!("{}/", MANGAS_SUB_PATH);
        base.join(&sub)
            .and_then(|u| u.join(trimmed.trim_start_matches('/')))
            .map_err(|e| ScraperError::InvalidUrl {
                input: trimmed.to_string(),
                reason: e.to_string(),
            })?
    };

    let slug = manga_slug(&absolute);
    Ok(MangaRef {
        url: absolute.to_string(),
        slug,
    })
}

/// Slug from the last path segment, minus a trailing `.html`.
fn manga_slug(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut s| s.next_back())
        .unwrap_or_default();
    let slug = last.strip_suffix(".html").unwrap_or(last);
    if slug.is_empty() {
        "manga".to_string()
    } else {
        slug.to_string()
    }
}

/// Check response status and read the body as UTF-8 text.
pub(crate) fn check_response(
    response: reqwest::blocking::Response,
    url: &str,
    context: Option<&str>,
) -> Result<String, ScraperError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ScraperError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
            context: context.map(String::from),
        });
    }
    response
        .text()
        .map_err(|e| ScraperError::BodyRead { source: e })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_path_joins_under_mangas() -> Result<(), ScraperError> {
        let m = resolve_manga_url("boyovik/2252-berserk-berserk.html", DEFAULT_BASE_URL)?;
        assert_eq!(
            m.url,
            "https://manga.in.ua/mangas/boyovik/2252-berserk-berserk.html"
        );
        assert_eq!(m.slug, "2252-berserk-berserk");
        Ok(())
    }

    #[test]
    fn leading_slash_is_tolerated() -> Result<(), ScraperError> {
        let m = resolve_manga_url("/boyovik/2252-berserk-berserk.html", DEFAULT_BASE_URL)?;
        assert_eq!(
            m.url,
            "https://manga.in.ua/mangas/boyovik/2252-berserk-berserk.html"
        );
        Ok(())
    }

    #[test]
    fn absolute_url_passes_through() -> Result<(), ScraperError> {
        let m = resolve_manga_url(
            "https://manga.in.ua/mangas/boyovik/2252-berserk-berserk.html",
            DEFAULT_BASE_URL,
        )?;
        assert_eq!(
            m.url,
            "https://manga.in.ua/mangas/boyovik/2252-berserk-berserk.html"
        );
        assert_eq!(m.slug, "2252-berserk-berserk");
        Ok(())
    }

    #[test]
    fn custom_base_url() -> Result<(), ScraperError> {
        let m = resolve_manga_url("x/1-title.html", "https://mirror.example")?;
        assert_eq!(m.url, "https://mirror.example/mangas/x/1-title.html");
        Ok(())
    }

    #[test]
    fn slug_without_html_suffix() -> Result<(), ScraperError> {
        let m = resolve_manga_url("x/some-title", DEFAULT_BASE_URL)?;
        assert_eq!(m.slug, "some-title");
        Ok(())
    }

    #[test]
    fn empty_manga_url_errors() {
        let result = resolve_manga_url("  ", DEFAULT_BASE_URL);
        assert!(matches!(result, Err(ScraperError::InvalidUrl { .. })));
    }

    #[test]
    fn invalid_base_url_errors() {
        let result = resolve_manga_url("x/1.html", "not a url");
        assert!(matches!(result, Err(ScraperError::InvalidUrl { .. })));
    }
}
