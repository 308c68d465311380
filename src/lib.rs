//! muadl: CLI downloader for manga.in.ua, assembling chapters into PDF volumes.

pub mod cli;
pub mod config;
pub mod model;
pub mod pdf;
pub mod scraper;
pub mod store;

// Re-exports for CLI and consumers.
pub use model::{Chapter, OutputPlan, Page, RunSummary, SkipRecord};
pub use pdf::{merge_pdfs, render_pdf, PdfError};
pub use scraper::{
    resolve_manga_url, MangaRef, PoliteClient, PoliteClientBuilder, ScraperError,
};
pub use store::{ImageStore, StoreError};
