//! Image decoding and re-encoding into formats the package stores.

use std::io::Cursor;

use bytes::Bytes;
use image::{ImageFormat, ImageReader};

use crate::Result;
use crate::ir::ImageKind;

/// The resolution SVG sources are rasterized at.
const SVG_DPI: f32 = 300.0;

/// An image ready to be placed into the package.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedImage {
    /// The encoded image.
    pub data: Bytes,
    /// The encoding of `data`.
    pub kind: ImageKind,
    /// The natural size in CSS pixels.
    pub natural: (u32, u32),
}

/// Turns fetched bytes into an image the package can store.
///
/// PNG, JPEG, GIF and BMP are kept verbatim. SVG is rasterized and any other
/// raster format is re-encoded to PNG.
pub fn normalize(data: Bytes) -> Result<FetchedImage> {
    if is_svg(&data) {
        return rasterize_svg(&data);
    }

    let format = image::guess_format(&data)?;
    let kind = match format {
        ImageFormat::Png => Some(ImageKind::Png),
        ImageFormat::Jpeg => Some(ImageKind::Jpeg),
        ImageFormat::Gif => Some(ImageKind::Gif),
        ImageFormat::Bmp => Some(ImageKind::Bmp),
        _ => None,
    };
    match kind {
        Some(kind) => {
            let natural = dimensions(&data)?;
            Ok(FetchedImage {
                data,
                kind,
                natural,
            })
        }
        None => {
            log::debug!("re-encoding {format:?} image to PNG");
            reencode_png(&data)
        }
    }
}

/// Decodes an image of any supported format and re-encodes it to PNG.
pub fn reencode_png(data: &[u8]) -> Result<FetchedImage> {
    if is_svg(data) {
        return rasterize_svg(data);
    }

    let img = image::load_from_memory(data)?;
    let natural = (img.width(), img.height());
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
    Ok(FetchedImage {
        data: buffer.into(),
        kind: ImageKind::Png,
        natural,
    })
}

/// Reads the pixel size from the image header.
fn dimensions(data: &[u8]) -> Result<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(data)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}

fn is_svg(data: &[u8]) -> bool {
    let head = &data[..data.len().min(512)];
    let Ok(head) = std::str::from_utf8(head) else {
        // The cut may split a multi-byte character.
        return String::from_utf8_lossy(head).contains("<svg");
    };
    let head = head.trim_start_matches('\u{feff}').trim_start();
    head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg"))
}

/// Rasterizes an SVG document to PNG.
///
/// The natural size stays the size the SVG declares, the raster is denser.
fn rasterize_svg(data: &[u8]) -> Result<FetchedImage> {
    let svg = std::str::from_utf8(data).map_err(|_| "SVG is not valid UTF-8")?;

    let opt = resvg::usvg::Options {
        dpi: SVG_DPI,
        ..resvg::usvg::Options::default()
    };
    let tree =
        resvg::usvg::Tree::from_str(svg, &opt).map_err(|e| format!("SVG parsing error: {e}"))?;

    let size = tree.size().to_int_size();
    let scale = SVG_DPI / 96.0;
    let width = (size.width() as f32 * scale).ceil() as u32;
    let height = (size.height() as f32 * scale).ceil() as u32;

    let mut pixmap = resvg::tiny_skia::Pixmap::new(width, height)
        .ok_or("unable to create pixel buffer for SVG")?;
    resvg::render(
        &tree,
        resvg::tiny_skia::Transform::from_scale(scale, scale),
        &mut pixmap.as_mut(),
    );
    let png = pixmap
        .encode_png()
        .map_err(|e| format!("PNG encoding error: {e}"))?;

    Ok(FetchedImage {
        data: png.into(),
        kind: ImageKind::Png,
        natural: (size.width(), size.height()),
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    /// Encodes a blank image of the given size.
    pub(crate) fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), format).unwrap();
        buffer
    }

    #[test]
    fn keeps_png_verbatim() {
        let png = encoded(12, 7, ImageFormat::Png);
        let image = normalize(png.clone().into()).unwrap();
        assert_eq!(image.kind, ImageKind::Png);
        assert_eq!(image.natural, (12, 7));
        assert_eq!(&image.data[..], &png[..]);
    }

    #[test]
    fn reencodes_tiff() {
        let tiff = encoded(5, 9, ImageFormat::Tiff);
        let image = normalize(tiff.into()).unwrap();
        assert_eq!(image.kind, ImageKind::Png);
        assert_eq!(image.natural, (5, 9));
        assert_eq!(image::guess_format(&image.data).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn rasterizes_svg_at_declared_size() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="40" height="20"><rect width="40" height="20"/></svg>"#;
        let image = normalize(Bytes::from_static(svg)).unwrap();
        assert_eq!(image.kind, ImageKind::Png);
        assert_eq!(image.natural, (40, 20));
        assert_eq!(dimensions(&image.data).unwrap(), (125, 63));
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(normalize(Bytes::from_static(b"definitely not an image")).is_err());
    }
}
