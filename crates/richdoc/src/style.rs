//! Resolves formatting marks into run-level formatting properties.

use std::sync::OnceLock;

use ecow::EcoString;
use regex::Regex;

use crate::ir::{Highlight, RunFormat};
use crate::model::{Mark, MarkKind};

/// The named highlight colors of the package format and their RGB values.
const HIGHLIGHT_PALETTE: &[(&str, &str)] = &[
    ("yellow", "FFFF00"),
    ("green", "00FF00"),
    ("cyan", "00FFFF"),
    ("magenta", "FF00FF"),
    ("blue", "0000FF"),
    ("red", "FF0000"),
    ("darkBlue", "000080"),
    ("darkCyan", "008080"),
    ("darkGreen", "008000"),
    ("darkMagenta", "800080"),
    ("darkRed", "800000"),
    ("darkYellow", "808000"),
    ("darkGray", "808080"),
    ("lightGray", "C0C0C0"),
    ("black", "000000"),
    ("white", "FFFFFF"),
];

/// Ratio of a CSS pixel to a typographic point.
const PX_TO_PT: f32 = 0.75;

/// Resolves the marks of a text node into run formatting.
///
/// Marks compose by union: a property set by an earlier mark is never
/// replaced by a later one. Link marks are not formatting and are handled by
/// the inline compiler.
pub fn resolve_marks(marks: &[Mark]) -> RunFormat {
    let mut format = RunFormat::default();
    for mark in marks {
        apply_mark(&mut format, mark);
    }
    format
}

fn apply_mark(format: &mut RunFormat, mark: &Mark) {
    match &mark.kind {
        MarkKind::Bold => format.bold = true,
        MarkKind::Italic => format.italic = true,
        MarkKind::Underline => format.underline = true,
        MarkKind::Strike => format.strike = true,
        MarkKind::Subscript => format.subscript = true,
        MarkKind::Superscript => format.superscript = true,
        MarkKind::Code => format.monospace = true,
        MarkKind::TextStyle => {
            let attrs = &mark.attrs;
            if format.color.is_none() {
                format.color = attrs.str("color").and_then(normalize_color);
            }
            if format.highlight.is_none() {
                format.highlight = attrs.str("backgroundColor").and_then(resolve_highlight);
            }
            if format.font.is_none() {
                format.font = attrs.str("fontFamily").and_then(primary_family);
            }
            if format.size_pt.is_none() {
                format.size_pt = attrs.str("fontSize").and_then(parse_font_size).or_else(|| {
                    attrs
                        .get::<f64>("fontSize")
                        .filter(|size| *size > 0.0)
                        .map(|size| size as f32)
                });
            }
        }
        MarkKind::Highlight => {
            if format.highlight.is_none() {
                format.highlight = match mark.attrs.str("color") {
                    Some(color) => resolve_highlight(color),
                    None => Some(Highlight::Named("yellow")),
                };
            }
        }
        MarkKind::Link => {}
        MarkKind::Other(name) => log::debug!("ignoring unknown mark {name}"),
    }
}

/// Normalizes a CSS color into 6 uppercase hex digits.
///
/// Accepts `#RRGGBB`, `#RGB`, bare hex digits, `rgb(r, g, b)` and
/// `rgba(r, g, b, a)`. Anything else, including empty input, yields no color.
pub fn normalize_color(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    static RGB: OnceLock<Regex> = OnceLock::new();
    let rgb = RGB.get_or_init(|| {
        Regex::new(
            r"^(?i)rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*[\d.]+%?\s*)?\)$",
        )
        .unwrap()
    });
    if let Some(caps) = rgb.captures(input) {
        let mut hex = String::with_capacity(6);
        for idx in 1..=3 {
            let channel: u8 = caps[idx].parse().ok()?;
            hex.push_str(&format!("{channel:02X}"));
        }
        return Some(hex);
    }

    let digits = input.strip_prefix('#').unwrap_or(input);
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    match digits.len() {
        6 => Some(digits.to_ascii_uppercase()),
        3 => Some(
            digits
                .chars()
                .flat_map(|c| [c, c])
                .collect::<String>()
                .to_ascii_uppercase(),
        ),
        _ => None,
    }
}

/// Resolves a highlight color.
///
/// Colors of the fixed palette map to their named highlight; any other valid
/// color becomes a solid background shading instead of being dropped.
pub fn resolve_highlight(input: &str) -> Option<Highlight> {
    let name = input.trim();
    if let Some((named, _)) = HIGHLIGHT_PALETTE
        .iter()
        .find(|(named, _)| named.eq_ignore_ascii_case(name))
    {
        return Some(Highlight::Named(*named));
    }

    let hex = normalize_color(input)?;
    let named = HIGHLIGHT_PALETTE
        .iter()
        .find(|(_, rgb)| *rgb == hex)
        .map(|(named, _)| Highlight::Named(*named));
    Some(named.unwrap_or(Highlight::Shading(hex)))
}

/// Parses a font size of the form `<number>(pt|px)?` into points.
///
/// Pixel sizes convert at 0.75 pt per px; a bare number is already in points.
pub fn parse_font_size(input: &str) -> Option<f32> {
    static SIZE: OnceLock<Regex> = OnceLock::new();
    let re = SIZE.get_or_init(|| Regex::new(r"^(?i)\s*(\d+(?:\.\d+)?)\s*(pt|px)?\s*$").unwrap());

    let caps = re.captures(input)?;
    let value: f32 = caps[1].parse().ok()?;
    let is_px = caps
        .get(2)
        .is_some_and(|unit| unit.as_str().eq_ignore_ascii_case("px"));
    let pt = if is_px { value * PX_TO_PT } else { value };
    (pt > 0.0).then_some(pt)
}

/// Picks the first family of a CSS font-family list.
fn primary_family(input: &str) -> Option<EcoString> {
    let family = input.split(',').next()?.trim().trim_matches(['"', '\'']).trim();
    (!family.is_empty()).then(|| family.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn style(attrs: &[(&str, &str)]) -> Mark {
        attrs
            .iter()
            .fold(Mark::new(MarkKind::TextStyle), |mark, (k, v)| {
                mark.with_attr(k, *v)
            })
    }

    #[test]
    fn normalizes_colors() {
        assert_eq!(normalize_color("rgb(255,0,0)").as_deref(), Some("FF0000"));
        assert_eq!(normalize_color("rgba(0, 128, 255, 0.5)").as_deref(), Some("0080FF"));
        assert_eq!(normalize_color("#a1b2c3").as_deref(), Some("A1B2C3"));
        assert_eq!(normalize_color("#fc0").as_deref(), Some("FFCC00"));
        assert_eq!(normalize_color("00ff00").as_deref(), Some("00FF00"));
        assert_eq!(normalize_color(""), None);
        assert_eq!(normalize_color("rgb(300,0,0)"), None);
        assert_eq!(normalize_color("tomato"), None);
    }

    #[test]
    fn highlight_prefers_palette() {
        assert_eq!(resolve_highlight("#ffff00"), Some(Highlight::Named("yellow")));
        assert_eq!(resolve_highlight("darkblue"), Some(Highlight::Named("darkBlue")));
        assert_eq!(
            resolve_highlight("rgb(250, 240, 200)"),
            Some(Highlight::Shading("FAF0C8".into()))
        );
        assert_eq!(resolve_highlight("nope"), None);
    }

    #[test]
    fn font_sizes() {
        assert_eq!(parse_font_size("16px"), Some(12.0));
        assert_eq!(parse_font_size("14pt"), Some(14.0));
        assert_eq!(parse_font_size("11"), Some(11.0));
        assert_eq!(parse_font_size("large"), None);
        assert_eq!(parse_font_size("12em"), None);
    }

    #[test]
    fn no_marks_no_format() {
        assert_eq!(resolve_marks(&[]), RunFormat::default());
    }

    #[test]
    fn composite_style_contributes_independently() {
        let format = resolve_marks(&[style(&[
            ("color", "rgb(255,0,0)"),
            ("fontFamily", "\"Noto Sans\", sans-serif"),
            ("fontSize", "not a size"),
        ])]);
        assert_eq!(format.color.as_deref(), Some("FF0000"));
        assert_eq!(format.font.as_deref(), Some("Noto Sans"));
        assert_eq!(format.size_pt, None);
        assert_eq!(format.highlight, None);
    }

    #[test]
    fn marks_compose_by_union() {
        let format = resolve_marks(&[
            Mark::new(MarkKind::Bold),
            style(&[("color", "#00ff00")]),
            Mark::new(MarkKind::Highlight).with_attr("color", "#123456"),
            style(&[("color", "#0000ff"), ("fontSize", "20px")]),
            Mark::new(MarkKind::Code),
        ]);
        assert!(format.bold);
        assert!(format.monospace);
        assert_eq!(format.color.as_deref(), Some("00FF00"));
        assert_eq!(format.highlight, Some(Highlight::Shading("123456".into())));
        assert_eq!(format.size_pt, Some(15.0));
    }

    #[test]
    fn bare_highlight_is_yellow() {
        let format = resolve_marks(&[Mark::new(MarkKind::Highlight)]);
        assert_eq!(format.highlight, Some(Highlight::Named("yellow")));
    }
}
