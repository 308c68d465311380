//! PDF assembler. Renders an ordered sequence of page images into a PDF (one
//! image per page) and concatenates chapter PDFs structurally, without
//! re-rendering images.
//!
//! Page geometry follows the configured resolution: a W×H-pixel image becomes
//! a page of `px * 72 / dpi` points per axis, so aspect ratio is preserved
//! exactly. JPEG data is embedded as-is under DCTDecode; other formats are
//! decoded and embedded as raw RGB, flate-compressed on save.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from PDF rendering and merging.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("No readable page images; refusing to write an empty PDF.")]
    NoPages,

    #[error("Unreadable image: {path}: {reason}")]
    UnreadableImage { path: PathBuf, reason: String },

    #[error("Failed to create PDF file: {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write PDF: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("Nothing to merge: no input PDFs.")]
    NothingToMerge,

    #[error("Merged inputs contain no pages.")]
    NoPagesInMerge,
}

/// An image left out of a rendered PDF, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedImage {
    pub path: PathBuf,
    pub reason: String,
}

/// Result of rendering one PDF: pages written and images skipped.
#[derive(Debug, Default)]
pub struct RenderOutcome {
    pub pages: u32,
    pub skipped: Vec<SkippedImage>,
}

/// Render `images` into a PDF at `output`, one page per image, in slice order.
///
/// `resolution` is the DPI used to derive page dimensions from pixel
/// dimensions. An unreadable image fails the whole render under `strict`;
/// otherwise it is skipped with a warning and recorded in the outcome. A
/// render where every image failed is an error, never a silent empty PDF.
pub fn render_pdf(
    images: &[PathBuf],
    output: &Path,
    resolution: f64,
    strict: bool,
) -> Result<RenderOutcome, PdfError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut page_ids: Vec<ObjectId> = Vec::with_capacity(images.len());
    let mut skipped = Vec::new();

    for path in images {
        let embedded = match embed_image(path) {
            Ok(e) => e,
            Err(PdfError::UnreadableImage { path, reason }) if !strict => {
                log::warn!("skipping unreadable image {}: {}", path.display(), reason);
                skipped.push(SkippedImage { path, reason });
                continue;
            }
            Err(e) => return Err(e),
        };

        let width_pt = embedded.width as f64 * 72.0 / resolution;
        let height_pt = embedded.height as f64 * 72.0 / resolution;

        let image_id = doc.add_object(Object::Stream(embedded.stream));
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        (width_pt as f32).into(),
                        0.into(),
                        0.into(),
                        (height_pt as f32).into(),
                        0.into(),
                        0.into(),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                (width_pt as f32).into(),
                (height_pt as f32).into(),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im1" => image_id },
            },
        });
        page_ids.push(page_id);
    }

    if page_ids.is_empty() {
        return Err(PdfError::NoPages);
    }

    let kids: Vec<Object> = page_ids.iter().map(|&id| id.into()).collect();
    let count = page_ids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    save_document(&mut doc, output)?;

    Ok(RenderOutcome {
        pages: page_ids.len() as u32,
        skipped,
    })
}

struct EmbeddedImage {
    stream: Stream,
    width: u32,
    height: u32,
}

/// Build the image XObject for one page image.
///
/// JPEG bytes in RGB or grayscale are wrapped as-is under DCTDecode. Anything
/// else (PNG, WebP, GIF, exotic JPEG color spaces) is decoded and embedded as
/// raw RGB; `Document::compress` flate-compresses those streams on save.
fn embed_image(path: &Path) -> Result<EmbeddedImage, PdfError> {
    let bytes = std::fs::read(path).map_err(|e| PdfError::UnreadableImage {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let format = image::guess_format(&bytes).map_err(|e| PdfError::UnreadableImage {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let img = image::load_from_memory_with_format(&bytes, format).map_err(|e| {
        PdfError::UnreadableImage {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    let (width, height) = (img.width(), img.height());

    let passthrough_jpeg = format == image::ImageFormat::Jpeg
        && matches!(
            img.color(),
            image::ColorType::Rgb8 | image::ColorType::L8
        );
    let stream = if passthrough_jpeg {
        let color_space = if img.color() == image::ColorType::L8 {
            "DeviceGray"
        } else {
            "DeviceRGB"
        };
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => color_space,
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            bytes,
        )
    } else {
        let rgb = img.into_rgb8();
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width as i64,
                "Height" => height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
            },
            rgb.into_raw(),
        )
    };

    Ok(EmbeddedImage {
        stream,
        width,
        height,
    })
}

/// Concatenate `inputs` into one PDF at `output`, preserving page order.
///
/// Structural merge: objects are renumbered and carried over, pages are
/// re-parented under a fresh page tree in input order. Images are not
/// re-rendered, so large-volume merges stay tractable.
pub fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> Result<(), PdfError> {
    if inputs.is_empty() {
        return Err(PdfError::NothingToMerge);
    }

    let mut max_id = 1;
    // Pages in final order, then every other object keyed by renumbered id.
    let mut all_pages: Vec<(ObjectId, Object)> = Vec::new();
    let mut all_objects: Vec<(ObjectId, Object)> = Vec::new();

    for path in inputs {
        let mut doc = Document::load(path)?;
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;
        for (_, page_id) in doc.get_pages() {
            let page = doc.get_object(page_id)?.to_owned();
            all_pages.push((page_id, page));
        }
        for (id, object) in std::mem::take(&mut doc.objects) {
            all_objects.push((id, object));
        }
    }
    if all_pages.is_empty() {
        return Err(PdfError::NoPagesInMerge);
    }

    let mut document = Document::with_version("1.5");
    let mut catalog: Option<(ObjectId, Dictionary)> = None;
    let mut pages_root: Option<(ObjectId, Dictionary)> = None;

    for (id, object) in all_objects {
        let kind = dict_type(&object).map(<[u8]>::to_vec);
        match kind.as_deref() {
            Some(b"Catalog") => {
                // Keep the first catalog as the merged document root.
                if catalog.is_none() {
                    if let Ok(dict) = object.as_dict() {
                        catalog = Some((id, dict.clone()));
                    }
                }
            }
            Some(b"Pages") => {
                // Fold page-tree attributes together under one root.
                if let Ok(dict) = object.as_dict() {
                    match pages_root.as_mut() {
                        Some((_, root_dict)) => root_dict.extend(dict),
                        None => pages_root = Some((id, dict.clone())),
                    }
                }
            }
            // Pages are re-inserted below with a fixed Parent.
            Some(b"Page") => {}
            Some(b"Outlines") | Some(b"Outline") => {}
            _ => {
                document.objects.insert(id, object);
            }
        }
    }

    let (pages_id, mut pages_dict) = pages_root.ok_or(PdfError::NoPagesInMerge)?;
    let (catalog_id, mut catalog_dict) = catalog.ok_or(PdfError::NoPagesInMerge)?;

    for (page_id, page) in &all_pages {
        if let Ok(dict) = page.as_dict() {
            let mut dict = dict.clone();
            dict.set("Parent", pages_id);
            document.objects.insert(*page_id, Object::Dictionary(dict));
        }
    }

    pages_dict.set("Count", all_pages.len() as i64);
    pages_dict.set(
        "Kids",
        all_pages
            .iter()
            .map(|&(id, _)| Object::Reference(id))
            .collect::<Vec<_>>(),
    );
    document
        .objects
        .insert(pages_id, Object::Dictionary(pages_dict));

    catalog_dict.set("Pages", pages_id);
    catalog_dict.remove(b"Outlines");
    document
        .objects
        .insert(catalog_id, Object::Dictionary(catalog_dict));
    document.trailer.set("Root", catalog_id);

    document.max_id = document.objects.len() as u32;
    document.renumber_objects();
    document.compress();
    save_document(&mut document, output)
}

fn dict_type(object: &Object) -> Option<&[u8]> {
    object
        .as_dict()
        .ok()?
        .get(b"Type")
        .ok()?
        .as_name()
        .ok()
}

fn save_document(doc: &mut Document, path: &Path) -> Result<(), PdfError> {
    let file = std::fs::File::create(path).map_err(|e| PdfError::CreateFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut writer = std::io::BufWriter::new(file);
    doc.save_to(&mut writer).map_err(|e| PdfError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}
