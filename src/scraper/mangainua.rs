//! manga.in.ua adapter. Fetches the manga listing page (chapter links) and
//! chapter pages (image URLs); produces canonical [Chapter](crate::model::Chapter)s.
//!
//! The selector constants are the contract with the site's markup and are the
//! first thing to check when a scrape starts failing.

use crate::model::{Chapter, Page};
use crate::scraper::error::ScraperError;
use crate::scraper::{check_response, MangaRef, PoliteClient};
use reqwest::Url;
use scraper::{Html, Selector};

/// Chapter links on a manga listing page carry both of these classes.
const CHAPTER_LINK_SELECTOR: &str = "a.forfastnavigation.chapterscalc";
/// Page images are lazy-loaded; the real URL lives in this attribute.
const IMAGE_URL_ATTR: &str = "data-src";

/// Parse a CSS selector or return a parse error (avoids panics from Selector::parse).
fn parse_selector(sel: &str) -> Result<Selector, ScraperError> {
    Selector::parse(sel).map_err(|e| ScraperError::ParseCatalog {
        message: format!("invalid selector {:?}: {}", sel, e),
    })
}

/// manga.in.ua scraper. Holds a reference to the shared polite client.
pub struct MangaInUaScraper<'a> {
    client: &'a mut PoliteClient,
    base: Url,
}

impl<'a> MangaInUaScraper<'a> {
    pub fn new(client: &'a mut PoliteClient, base_url: &str) -> Result<Self, ScraperError> {
        let base = Url::parse(base_url).map_err(|e| ScraperError::InvalidUrl {
            input: base_url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { client, base })
    }

    /// Fetch the listing page and return the chapters in catalog order, with
    /// 1-based indices and empty page lists.
    pub fn fetch_chapters(&mut self, manga: &MangaRef) -> Result<Vec<Chapter>, ScraperError> {
        let response =
            self.client
                .get_with_retry(&manga.url)
                .map_err(|e| ScraperError::Network {
                    url: manga.url.clone(),
                    source: e,
                })?;
        let html = check_response(response, &manga.url, Some("listing page"))?;
        let links = parse_chapter_links(&html, &self.base)?;
        log::debug!("found {} chapter links at {}", links.len(), manga.url);
        Ok(links
            .into_iter()
            .enumerate()
            .map(|(i, url)| Chapter {
                index: i as u32 + 1,
                url,
                pages: Vec::new(),
            })
            .collect())
    }

    /// Fetch a chapter page and return its page images in presentation order.
    pub fn fetch_pages(&mut self, chapter_url: &str) -> Result<Vec<Page>, ScraperError> {
        let response =
            self.client
                .get_with_retry(chapter_url)
                .map_err(|e| ScraperError::Network {
                    url: chapter_url.to_string(),
                    source: e,
                })?;
        let html = check_response(response, chapter_url, Some("chapter page"))?;
        let urls = parse_image_urls(&html, &self.base, chapter_url)?;
        log::debug!("found {} page images at {}", urls.len(), chapter_url);
        Ok(urls
            .into_iter()
            .enumerate()
            .map(|(i, url)| Page {
                ordinal: i as u32 + 1,
                url,
            })
            .collect())
    }
}

/// Extract chapter URLs from listing page HTML, in document order, resolved
/// against the base URL. An empty result is an error, never a silent no-op.
pub fn parse_chapter_links(html: &str, base: &Url) -> Result<Vec<String>, ScraperError> {
    let doc = Html::parse_document(html);
    let sel = parse_selector(CHAPTER_LINK_SELECTOR)?;
    let mut links = Vec::new();
    for el in doc.select(&sel) {
        let href = el
            .value()
            .attr("href")
            .ok_or_else(|| ScraperError::ParseCatalog {
                message: format!("chapter link without href ({})", CHAPTER_LINK_SELECTOR),
            })?;
        let url = base.join(href).map_err(|e| ScraperError::ParseCatalog {
            message: format!("unresolvable chapter link {:?}: {}", href, e),
        })?;
        links.push(url.to_string());
    }
    if links.is_empty() {
        return Err(ScraperError::EmptyChapterList);
    }
    Ok(links)
}

/// Extract page image URLs from chapter page HTML, in document order, resolved
/// against the base URL.
pub fn parse_image_urls(
    html: &str,
    base: &Url,
    chapter_url: &str,
) -> Result<Vec<String>, ScraperError> {
    let doc = Html::parse_document(html);
    let sel = parse_selector(&format!("[{}]", IMAGE_URL_ATTR))?;
    let mut urls = Vec::new();
    for el in doc.select(&sel) {
        // Selector guarantees the attribute is present.
        if let Some(src) = el.value().attr(IMAGE_URL_ATTR) {
            let url = base.join(src).map_err(|e| ScraperError::ParseCatalog {
                message: format!("unresolvable image URL {:?}: {}", src, e),
            })?;
            urls.push(url.to_string());
        }
    }
    if urls.is_empty() {
        return Err(ScraperError::NoImagesFound {
            url: chapter_url.to_string(),
        });
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://manga.in.ua").unwrap()
    }

    const LISTING_HTML: &str = r#"
        <html><body>
          <div class="ltcitems">
            <a class="forfastnavigation chapterscalc" href="/chapters/berserk-1.html">Том 1 Розділ 1</a>
          </div>
          <div class="ltcitems">
            <a class="forfastnavigation chapterscalc" href="https://manga.in.ua/chapters/berserk-2.html">Том 1 Розділ 2</a>
          </div>
          <a class="forfastnavigation" href="/not-a-chapter.html">nav</a>
        </body></html>
    "#;

    #[test]
    fn chapter_links_in_document_order() -> Result<(), ScraperError> {
        let links = parse_chapter_links(LISTING_HTML, &base())?;
        assert_eq!(
            links,
            vec![
                "https://manga.in.ua/chapters/berserk-1.html".to_string(),
                "https://manga.in.ua/chapters/berserk-2.html".to_string(),
            ]
        );
        Ok(())
    }

    #[test]
    fn chapter_links_require_both_classes() -> Result<(), ScraperError> {
        // The single-class nav link must not be picked up.
        let links = parse_chapter_links(LISTING_HTML, &base())?;
        assert_eq!(links.len(), 2);
        assert!(!links.iter().any(|l| l.contains("not-a-chapter")));
        Ok(())
    }

    #[test]
    fn empty_listing_is_an_error() {
        let result = parse_chapter_links("<html><body></body></html>", &base());
        assert!(matches!(result, Err(ScraperError::EmptyChapterList)));
    }

    #[test]
    fn chapter_link_without_href_is_an_error() {
        let html = r#"<a class="forfastnavigation chapterscalc">broken</a>"#;
        let result = parse_chapter_links(html, &base());
        assert!(matches!(result, Err(ScraperError::ParseCatalog { .. })));
    }

    const CHAPTER_HTML: &str = r#"
        <html><body>
          <div class="comics">
            <img data-src="/uploads/berserk/ch1/01.jpg" src="/spacer.gif"/>
            <img data-src="/uploads/berserk/ch1/02.png" src="/spacer.gif"/>
            <img data-src="https://cdn.manga.in.ua/berserk/ch1/03.webp"/>
            <img src="/logo.png"/>
          </div>
        </body></html>
    "#;

    #[test]
    fn image_urls_in_document_order_resolved_against_base() -> Result<(), ScraperError> {
        let urls = parse_image_urls(CHAPTER_HTML, &base(), "https://manga.in.ua/chapters/c1")?;
        assert_eq!(
            urls,
            vec![
                "https://manga.in.ua/uploads/berserk/ch1/01.jpg".to_string(),
                "https://manga.in.ua/uploads/berserk/ch1/02.png".to_string(),
                "https://cdn.manga.in.ua/berserk/ch1/03.webp".to_string(),
            ]
        );
        Ok(())
    }

    #[test]
    fn elements_without_data_src_are_ignored() -> Result<(), ScraperError> {
        let urls = parse_image_urls(CHAPTER_HTML, &base(), "https://manga.in.ua/chapters/c1")?;
        assert!(!urls.iter().any(|u| u.ends_with("logo.png")));
        Ok(())
    }

    #[test]
    fn chapter_page_without_images_is_an_error() {
        let html = "<html><body><p>maintenance</p></body></html>";
        let result = parse_image_urls(html, &base(), "https://manga.in.ua/chapters/c9");
        match result {
            Err(ScraperError::NoImagesFound { url }) => {
                assert_eq!(url, "https://manga.in.ua/chapters/c9");
            }
            other => panic!("expected NoImagesFound, got {:?}", other),
        }
    }
}
