//! Display size resolution of images.

use std::sync::OnceLock;

use regex::Regex;

use crate::attributes::Attrs;

/// Style strings scanned for pixel declarations, most specific first.
const STYLE_KEYS: &[&str] = &["containerStyle", "wrapperStyle", "style"];

/// Attribute names of each sizing level after the style strings.
const WIDTH_KEYS: &[&[&str]] = &[
    &["width"],
    &["data-width", "dataWidth"],
    &["resizedWidth"],
    &["previewWidth"],
];
const HEIGHT_KEYS: &[&[&str]] = &[
    &["height"],
    &["data-height", "dataHeight"],
    &["resizedHeight"],
];

#[derive(Clone, Copy)]
enum Axis {
    Width,
    Height,
}

/// Resolves the display size of an image in pixels.
///
/// Each axis takes the first positive value among the style strings, the
/// plain size attributes, the data attributes, the resized attributes and the
/// preview width. A missing axis follows the natural aspect ratio, and
/// without any explicit size the natural size is used. A width above
/// `max_width` scales both axes down proportionally.
pub fn resolve_size(attrs: &Attrs, natural: (u32, u32), max_width: u32) -> (u32, u32) {
    let (nw, nh) = (f64::from(natural.0), f64::from(natural.1));

    let width = explicit(attrs, Axis::Width);
    let height = explicit(attrs, Axis::Height);
    let (mut w, mut h) = match (width, height) {
        (Some(w), Some(h)) => (w, h),
        (Some(w), None) if nw > 0.0 => (w, w * nh / nw),
        (None, Some(h)) if nh > 0.0 => (h * nw / nh, h),
        (Some(w), None) => (w, nh),
        (None, Some(h)) => (nw, h),
        (None, None) => (nw, nh),
    };

    let max = f64::from(max_width);
    if max_width > 0 && w > max {
        h = h * max / w;
        w = max;
    }

    (to_px(w), to_px(h))
}

fn explicit(attrs: &Attrs, axis: Axis) -> Option<f64> {
    let from_style = STYLE_KEYS
        .iter()
        .filter_map(|key| attrs.str(key))
        .find_map(|style| style_px(style, axis));
    if from_style.is_some() {
        return from_style;
    }

    let levels = match axis {
        Axis::Width => WIDTH_KEYS,
        Axis::Height => HEIGHT_KEYS,
    };
    levels.iter().find_map(|keys| {
        keys.iter()
            .filter_map(|key| attrs.get::<f64>(key))
            .find(|v| *v > 0.0)
    })
}

/// Reads a `width: Npx` or `height: Npx` declaration from a style string.
fn style_px(style: &str, axis: Axis) -> Option<f64> {
    static WIDTH: OnceLock<Regex> = OnceLock::new();
    static HEIGHT: OnceLock<Regex> = OnceLock::new();

    // A property name must start the declaration, so `max-width` and
    // `line-height` do not match.
    let re = match axis {
        Axis::Width => WIDTH.get_or_init(|| {
            Regex::new(r"(?i)(?:^|[;{\s])width\s*:\s*(\d+(?:\.\d+)?)\s*px").unwrap()
        }),
        Axis::Height => HEIGHT.get_or_init(|| {
            Regex::new(r"(?i)(?:^|[;{\s])height\s*:\s*(\d+(?:\.\d+)?)\s*px").unwrap()
        }),
    };
    let value: f64 = re.captures(style)?[1].parse().ok()?;
    (value > 0.0).then_some(value)
}

fn to_px(value: f64) -> u32 {
    value.round().clamp(1.0, f64::from(u32::MAX)) as u32
}
