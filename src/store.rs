//! Image store: deterministic on-disk layout for downloaded pages, conflict
//! policy for pre-existing folders, image format detection, and the bounded
//! worker-pool download of a chapter's pages.
//!
//! Layout: `<data_folder>/<chapter, 3-digit>/<page ordinal, 3-digit>.<ext>`.
//! Zero-padded names sort lexicographically in page order, so assembly never
//! depends on download completion order.

use crate::model::{Chapter, SkipRecord};
use crate::scraper::PoliteClientBuilder;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use thiserror::Error;

/// Errors from the image store and download step.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Folder {path} already exists and contains files. Re-run with --force to delete it.")]
    Conflict { path: PathBuf },

    #[error("Filesystem error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Root of the downloaded-images tree, one subfolder per chapter.
#[derive(Debug, Clone)]
pub struct ImageStore {
    root: PathBuf,
}

impl ImageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Apply the conflict policy to the root and create it.
    ///
    /// A pre-existing non-empty root fails fast (before any network activity)
    /// unless `force`, which deletes it first.
    pub fn prepare(&self, force: bool) -> Result<(), StoreError> {
        ensure_absent(&self.root, force)?;
        std::fs::create_dir_all(&self.root).map_err(|e| StoreError::Io {
            path: self.root.clone(),
            source: e,
        })
    }

    pub fn chapter_dir(&self, index: u32) -> PathBuf {
        self.root.join(format!("{:03}", index))
    }

    pub fn page_path(&self, chapter: u32, ordinal: u32, ext: &str) -> PathBuf {
        self.chapter_dir(chapter).join(format!("{:03}.{}", ordinal, ext))
    }

    /// Image files of a chapter, sorted lexicographically (== page order).
    pub fn chapter_images(&self, index: u32) -> Result<Vec<PathBuf>, StoreError> {
        let dir = self.chapter_dir(index);
        let entries = std::fs::read_dir(&dir).map_err(|e| StoreError::Io {
            path: dir.clone(),
            source: e,
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        Ok(files)
    }
}

/// Fail on a pre-existing non-empty directory; with `force`, delete it instead.
pub fn ensure_absent(path: &Path, force: bool) -> Result<(), StoreError> {
    let non_empty = path.is_dir()
        && std::fs::read_dir(path)
            .map(|mut d| d.next().is_some())
            .unwrap_or(false);
    let occupied = non_empty || path.is_file();
    if !occupied {
        return Ok(());
    }
    if !force {
        return Err(StoreError::Conflict {
            path: path.to_path_buf(),
        });
    }
    log::info!("deleting {}", path.display());
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|e| StoreError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Pick the stored extension for an image: magic bytes first (JPEG, PNG, WebP,
/// GIF), then the URL's extension, then `jpg`.
pub fn detect_image_ext(bytes: &[u8], url: &str) -> String {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return "jpg".to_string();
    }
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        return "png".to_string();
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return "webp".to_string();
    }
    if bytes.starts_with(b"GIF8") {
        return "gif".to_string();
    }
    let from_url = url
        .rsplit('/')
        .next()
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match from_url.as_deref() {
        Some("jpeg") | Some("jpg") => "jpg".to_string(),
        Some(ext @ ("png" | "webp" | "gif")) => ext.to_string(),
        _ => "jpg".to_string(),
    }
}

/// Result of downloading one chapter's pages.
#[derive(Debug, Default)]
pub struct DownloadOutcome {
    pub saved: u32,
    pub skipped: Vec<SkipRecord>,
}

/// Download all pages of a chapter into the store on a bounded worker pool.
///
/// Workers pull page indices from a shared cursor; each owns its own
/// [PoliteClient](crate::scraper::PoliteClient) built from `builder`, so the
/// politeness delay applies per worker. A page that still fails after the
/// client's retries (or answers 404) is recorded as skipped; the chapter
/// proceeds with the remaining pages. Filesystem failures abort.
pub fn download_chapter(
    chapter: &Chapter,
    store: &ImageStore,
    builder: &PoliteClientBuilder,
    concurrency: usize,
) -> Result<DownloadOutcome, StoreError> {
    let dir = store.chapter_dir(chapter.index);
    std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io {
        path: dir.clone(),
        source: e,
    })?;

    let workers = concurrency.max(1).min(chapter.pages.len().max(1));
    let cursor = AtomicUsize::new(0);
    let saved = AtomicU32::new(0);
    let skipped: Mutex<Vec<SkipRecord>> = Mutex::new(Vec::new());
    let fatal: Mutex<Option<StoreError>> = Mutex::new(None);

    let mut clients = Vec::with_capacity(workers);
    for _ in 0..workers {
        clients.push(builder.clone().build()?);
    }

    std::thread::scope(|scope| {
        let cursor = &cursor;
        let saved = &saved;
        let skipped = &skipped;
        let fatal = &fatal;
        for mut client in clients {
            scope.spawn(move || {
                loop {
                    let i = cursor.fetch_add(1, Ordering::SeqCst);
                    if i >= chapter.pages.len() {
                        break;
                    }
                    if fatal.lock().unwrap_or_else(|e| e.into_inner()).is_some() {
                        break;
                    }
                    let page = &chapter.pages[i];
                    match fetch_page(&mut client, chapter, page, store) {
                        Ok(PageOutcome::Saved) => {
                            saved.fetch_add(1, Ordering::SeqCst);
                            log::debug!(
                                "chapter {} page {}/{} saved",
                                chapter.index,
                                page.ordinal,
                                chapter.pages.len()
                            );
                        }
                        Ok(PageOutcome::Skipped(reason)) => {
                            log::warn!(
                                "chapter {} page {} skipped: {}",
                                chapter.index,
                                page.ordinal,
                                reason
                            );
                            skipped
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .push(SkipRecord {
                                    chapter: chapter.index,
                                    page: Some(page.ordinal),
                                    reason,
                                });
                        }
                        Err(e) => {
                            let mut slot = fatal.lock().unwrap_or_else(|e| e.into_inner());
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            break;
                        }
                    }
                }
            });
        }
    });

    if let Some(e) = fatal.into_inner().unwrap_or_else(|e| e.into_inner()) {
        return Err(e);
    }
    let mut skipped = skipped.into_inner().unwrap_or_else(|e| e.into_inner());
    skipped.sort_by_key(|s| s.page);
    Ok(DownloadOutcome {
        saved: saved.into_inner(),
        skipped,
    })
}

enum PageOutcome {
    Saved,
    Skipped(String),
}

/// Fetch one page image and persist it. Network failures become skips;
/// filesystem failures are errors.
fn fetch_page(
    client: &mut crate::scraper::PoliteClient,
    chapter: &Chapter,
    page: &crate::model::Page,
    store: &ImageStore,
) -> Result<PageOutcome, StoreError> {
    let response = match client.get_with_retry(&page.url) {
        Ok(r) => r,
        Err(e) => return Ok(PageOutcome::Skipped(format!("network error: {}", e))),
    };
    let status = response.status();
    if status.as_u16() == 404 {
        // Permanent: retrying a missing image cannot help.
        return Ok(PageOutcome::Skipped(format!("HTTP 404: {}", page.url)));
    }
    if !status.is_success() {
        return Ok(PageOutcome::Skipped(format!(
            "HTTP {} after retries: {}",
            status.as_u16(),
            page.url
        )));
    }
    let bytes = match response.bytes() {
        Ok(b) => b,
        Err(e) => return Ok(PageOutcome::Skipped(format!("failed to read body: {}", e))),
    };
    let ext = detect_image_ext(&bytes, &page.url);
    let path = store.page_path(chapter.index, page.ordinal, &ext);
    std::fs::write(&path, &bytes).map_err(|e| StoreError::Io { path, source: e })?;
    Ok(PageOutcome::Saved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("muadl_store_{}", name))
    }

    #[test]
    fn page_paths_are_zero_padded_and_sort_in_page_order() {
        let store = ImageStore::new("data");
        let p1 = store.page_path(1, 2, "jpg");
        let p2 = store.page_path(1, 10, "jpg");
        assert_eq!(p1, PathBuf::from("data/001/002.jpg"));
        assert_eq!(p2, PathBuf::from("data/001/010.jpg"));
        // Lexicographic order matches numeric order thanks to the padding.
        assert!(p1.to_string_lossy() < p2.to_string_lossy());
    }

    #[test]
    fn chapter_dirs_are_zero_padded() {
        let store = ImageStore::new("data");
        assert_eq!(store.chapter_dir(7), PathBuf::from("data/007"));
        assert_eq!(store.chapter_dir(120), PathBuf::from("data/120"));
    }

    #[test]
    fn detect_ext_by_magic_bytes() {
        assert_eq!(detect_image_ext(&[0xFF, 0xD8, 0xFF, 0xE0], "x"), "jpg");
        assert_eq!(detect_image_ext(b"\x89PNG\r\n\x1a\n", "x"), "png");
        assert_eq!(detect_image_ext(b"RIFF\x00\x00\x00\x00WEBPVP8 ", "x"), "webp");
        assert_eq!(detect_image_ext(b"GIF89a", "x"), "gif");
    }

    #[test]
    fn detect_ext_falls_back_to_url_extension() {
        assert_eq!(detect_image_ext(b"??", "https://x/a/01.PNG"), "png");
        assert_eq!(detect_image_ext(b"??", "https://x/a/01.jpeg"), "jpg");
        assert_eq!(detect_image_ext(b"??", "https://x/a/01.webp"), "webp");
    }

    #[test]
    fn detect_ext_unknown_defaults_to_jpg() {
        assert_eq!(detect_image_ext(b"??", "https://x/a/image"), "jpg");
        assert_eq!(detect_image_ext(b"??", "https://x/a/file.bin"), "jpg");
    }

    #[test]
    fn prepare_fails_on_non_empty_dir_without_force() {
        let root = test_root("conflict");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("leftover.jpg"), b"x").unwrap();

        let store = ImageStore::new(&root);
        let result = store.prepare(false);
        assert!(matches!(result, Err(StoreError::Conflict { .. })));

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn prepare_with_force_replaces_existing_dir() {
        let root = test_root("force");
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("leftover.jpg"), b"x").unwrap();

        let store = ImageStore::new(&root);
        store.prepare(true).unwrap();
        assert!(root.is_dir());
        assert!(!root.join("leftover.jpg").exists());

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn prepare_accepts_empty_existing_dir() {
        let root = test_root("empty");
        std::fs::create_dir_all(&root).unwrap();
        let store = ImageStore::new(&root);
        store.prepare(false).unwrap();
        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn ensure_absent_ignores_missing_path() {
        let path = test_root("missing");
        assert!(ensure_absent(&path, false).is_ok());
    }

    #[test]
    fn chapter_images_sorted_lexicographically() {
        let root = test_root("sorted");
        std::fs::remove_dir_all(&root).ok();
        let store = ImageStore::new(&root);
        let dir = store.chapter_dir(1);
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["010.jpg", "002.png", "001.jpg"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }

        let images = store.chapter_images(1).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["001.jpg", "002.png", "010.jpg"]);

        std::fs::remove_dir_all(&root).ok();
    }
}
