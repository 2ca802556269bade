//! Content assembly: append two-image pages to the rendered cover.
//!
//! The cover PDF is loaded as the base document and one page per image pair
//! is appended to its root page tree. Every image is embedded as a
//! `DCTDecode` XObject straight from its normalized JPEG bytes, so nothing is
//! re-encoded here.
//!
//! ## Page layout (PDF points, origin bottom-left)
//!
//! ```text
//! ┌──────────────── width ────────────────┐
//! │               margin                  │
//! │   ┌───────── upper slot ──────────┐   │
//! │   │        image 2k (centred)     │   │
//! │   └───────────────────────────────┘   │
//! │                gap                    │
//! │   ┌───────── lower slot ──────────┐   │
//! │   │       image 2k+1 (centred)    │   │
//! │   └───────────────────────────────┘   │
//! │               margin                  │
//! └───────────────────────────────────────┘
//! ```
//!
//! Each image is scaled to fit its slot at no more than 1 pt per pixel, so
//! small images are never blown up. An odd last image sits alone in the
//! upper slot.

use crate::config::PageGeometry;
use crate::error::Img2PdfError;
use crate::pipeline::normalize::NormalizedImage;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

/// A rectangle on the page.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// The `[upper, lower]` image slots of a content page.
pub fn slot_boxes(page: &PageGeometry) -> [Rect; 2] {
    let width = page.usable_width();
    let height = page.slot_height();
    let lower = Rect {
        x: page.margin,
        y: page.margin,
        width,
        height,
    };
    let upper = Rect {
        y: page.margin + height + page.gap,
        ..lower
    };
    [upper, lower]
}

/// Where a `px_width × px_height` image is drawn inside `slot`.
///
/// Aspect ratio is preserved, the scale never exceeds 1 pt per pixel, and
/// the result is centred in both directions.
pub fn fit_within(px_width: u32, px_height: u32, slot: &Rect) -> Rect {
    let (w, h) = (px_width.max(1) as f32, px_height.max(1) as f32);
    let scale = (slot.width / w).min(slot.height / h).min(1.0);
    let (width, height) = (w * scale, h * scale);
    Rect {
        x: slot.x + (slot.width - width) / 2.0,
        y: slot.y + (slot.height - height) / 2.0,
        width,
        height,
    }
}

/// Number of content pages for `n` images.
pub fn content_page_count(n: usize) -> usize {
    n.div_ceil(2)
}

/// Append content pages for `images` (already in final order) to
/// `cover_pdf` and return the serialized document.
pub fn assemble(
    cover_pdf: &[u8],
    images: &[NormalizedImage],
    page: &PageGeometry,
) -> Result<Vec<u8>, Img2PdfError> {
    let mut doc = Document::load_mem(cover_pdf)
        .map_err(|e| Img2PdfError::AssemblyFailed(format!("cover is not a readable PDF: {e}")))?;
    let pages_id = root_pages_id(&doc)?;
    let slots = slot_boxes(page);

    let mut new_pages = Vec::with_capacity(content_page_count(images.len()));
    for pair in images.chunks(2) {
        let mut xobjects = Dictionary::new();
        let mut content = String::new();

        for (slot_idx, img) in pair.iter().enumerate() {
            let name = format!("Im{slot_idx}");
            let image_id = add_image_xobject(&mut doc, img);
            xobjects.set(name.as_bytes().to_vec(), Object::Reference(image_id));

            let r = fit_within(img.width, img.height, &slots[slot_idx]);
            content.push_str(&format!(
                "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /{} Do Q\n",
                r.width, r.height, r.x, r.y, name
            ));
        }

        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(page.width),
                Object::Real(page.height),
            ],
            "Resources" => dictionary! {
                "XObject" => Object::Dictionary(xobjects),
            },
            "Contents" => content_id,
        });
        new_pages.push(page_id);
    }

    append_to_page_tree(&mut doc, pages_id, &new_pages)?;
    debug!(
        "Assembled {} content page(s) for {} image(s)",
        new_pages.len(),
        images.len()
    );

    let mut out = Vec::new();
    doc.save_to(&mut out)
        .map_err(|e| Img2PdfError::AssemblyFailed(format!("failed to serialize PDF: {e}")))?;
    Ok(out)
}

/// [`assemble`] on the blocking pool.
pub async fn assemble_blocking(
    cover_pdf: Vec<u8>,
    images: Vec<NormalizedImage>,
    page: PageGeometry,
) -> Result<Vec<u8>, Img2PdfError> {
    tokio::task::spawn_blocking(move || assemble(&cover_pdf, &images, &page))
        .await
        .map_err(|e| Img2PdfError::Internal(format!("assembly task failed: {e}")))?
}

fn add_image_xobject(doc: &mut Document, img: &NormalizedImage) -> ObjectId {
    let dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => img.width as i64,
        "Height" => img.height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "DCTDecode",
    };
    // Already compressed; lopdf must not deflate it again.
    let stream = Stream::new(dict, img.jpeg.clone()).with_compression(false);
    doc.add_object(Object::Stream(stream))
}

fn malformed(what: &str, e: lopdf::Error) -> Img2PdfError {
    Img2PdfError::AssemblyFailed(format!("cover page tree: {what}: {e}"))
}

fn root_pages_id(doc: &Document) -> Result<ObjectId, Img2PdfError> {
    let root_id = doc
        .trailer
        .get(b"Root")
        .and_then(Object::as_reference)
        .map_err(|e| malformed("no /Root", e))?;
    doc.get_object(root_id)
        .and_then(Object::as_dict)
        .and_then(|catalog| catalog.get(b"Pages"))
        .and_then(Object::as_reference)
        .map_err(|e| malformed("no /Pages", e))
}

fn append_to_page_tree(
    doc: &mut Document,
    pages_id: ObjectId,
    new_pages: &[ObjectId],
) -> Result<(), Img2PdfError> {
    let pages = doc
        .get_object_mut(pages_id)
        .and_then(Object::as_dict_mut)
        .map_err(|e| malformed("root node is not a dictionary", e))?;

    let count = pages
        .get(b"Count")
        .and_then(Object::as_i64)
        .map_err(|e| malformed("no /Count", e))?;
    let kids = pages
        .get_mut(b"Kids")
        .and_then(Object::as_array_mut)
        .map_err(|e| malformed("no inline /Kids array", e))?;
    kids.extend(new_pages.iter().map(|id| Object::Reference(*id)));
    pages.set("Count", count + new_pages.len() as i64);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    /// A one-page PDF standing in for a rendered cover.
    fn blank_cover() -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Integer(595),
                Object::Integer(842),
            ],
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::Reference(page_id)],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    fn image(index: usize, w: u32, h: u32) -> NormalizedImage {
        let mut jpeg = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 10, 10])))
            .write_to(&mut std::io::Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();
        NormalizedImage {
            index,
            width: w,
            height: h,
            jpeg,
        }
    }

    #[test]
    fn slots_stack_with_gap() {
        let g = PageGeometry::default();
        let [upper, lower] = slot_boxes(&g);
        assert_eq!(lower.y, 40.0);
        assert!((upper.y - (lower.y + lower.height + 20.0)).abs() < 1e-3);
        assert!((upper.y + upper.height - (g.height - g.margin)).abs() < 1e-3);
        assert_eq!(upper.x, lower.x);
    }

    #[test]
    fn small_image_is_drawn_at_native_size_and_centred() {
        let slot = slot_boxes(&PageGeometry::default())[0];
        let r = fit_within(10, 10, &slot);
        assert_eq!((r.width, r.height), (10.0, 10.0));
        assert!((r.x + r.width / 2.0 - (slot.x + slot.width / 2.0)).abs() < 1e-3);
        assert!((r.y + r.height / 2.0 - (slot.y + slot.height / 2.0)).abs() < 1e-3);
    }

    #[test]
    fn wide_image_is_limited_by_width() {
        let slot = slot_boxes(&PageGeometry::default())[1];
        let r = fit_within(1024, 256, &slot);
        assert!((r.width - slot.width).abs() < 1e-3);
        assert!((r.height - slot.width / 4.0).abs() < 1e-3);
    }

    #[test]
    fn tall_image_is_limited_by_height() {
        let slot = slot_boxes(&PageGeometry::default())[0];
        let r = fit_within(512, 1024, &slot);
        assert!((r.height - slot.height).abs() < 1e-3);
        assert!(r.width < slot.width);
        assert!(r.y >= slot.y && r.x >= slot.x);
    }

    #[test]
    fn page_count_is_half_rounded_up() {
        assert_eq!(content_page_count(0), 0);
        assert_eq!(content_page_count(1), 1);
        assert_eq!(content_page_count(4), 2);
        assert_eq!(content_page_count(5), 3);
    }

    #[test]
    fn appends_pages_after_cover() {
        let images: Vec<_> = (0..5).map(|i| image(i, 32, 16)).collect();
        let pdf = assemble(&blank_cover(), &images, &PageGeometry::default()).unwrap();

        let doc = Document::load_mem(&pdf).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1 + 3);

        // Pages 2 and 3 carry two images, the last one carries one.
        let image_counts: Vec<usize> = pages
            .values()
            .skip(1)
            .map(|id| {
                let page = doc.get_dictionary(*id).unwrap();
                let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
                resources.get(b"XObject").unwrap().as_dict().unwrap().len()
            })
            .collect();
        assert_eq!(image_counts, vec![2, 2, 1]);
    }

    #[test]
    fn images_keep_jpeg_bytes() {
        let img = image(0, 8, 8);
        let pdf = assemble(&blank_cover(), std::slice::from_ref(&img), &PageGeometry::default())
            .unwrap();
        let doc = Document::load_mem(&pdf).unwrap();
        let found = doc.objects.values().any(|o| match o {
            Object::Stream(s) => {
                s.dict.get(b"Filter").ok().and_then(|f| f.as_name().ok()) == Some(b"DCTDecode".as_slice())
                    && s.content == img.jpeg
            }
            _ => false,
        });
        assert!(found);
    }

    #[test]
    fn rejects_non_pdf_cover() {
        let err = assemble(b"<html>", &[image(0, 4, 4)], &PageGeometry::default()).unwrap_err();
        assert!(matches!(err, Img2PdfError::AssemblyFailed(_)));
    }
}
