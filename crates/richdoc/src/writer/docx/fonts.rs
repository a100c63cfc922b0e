//! Embedding of font files into the package.
//!
//! Embedded fonts are stored obfuscated: the first 32 bytes of the file are
//! XORed with the reversed bytes of a GUID key, and the font table names the
//! key next to the part holding the font.

use ecow::EcoString;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};
use sha2::{Digest, Sha256};

use super::package::Package;
use super::patch::{Injection, SETTINGS_ORDER, insert_children};
use crate::config::{FontFace, FontSource};
use crate::{Error, Result};

const FONT_TABLE: &str = "word/fontTable.xml";
const FONT_TABLE_RELS: &str = "word/_rels/fontTable.xml.rels";
const CONTENT_TYPES: &str = "[Content_Types].xml";
const SETTINGS: &str = "word/settings.xml";

const FONT_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/font";
const RELS_NS: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const OBFUSCATED_FONT: &str = "application/vnd.openxmlformats-officedocument.obfuscatedFont";

/// A font family read from disk, ready to embed.
#[derive(Debug, Clone)]
pub struct EmbeddedFont {
    /// The family name runs refer to.
    pub family: EcoString,
    /// The font files of the family.
    pub faces: Vec<(FontFace, Vec<u8>)>,
}

/// Reads the font files of the configured families.
pub async fn load_fonts(sources: &[FontSource]) -> Result<Vec<EmbeddedFont>> {
    let mut fonts = Vec::with_capacity(sources.len());
    for source in sources {
        let mut faces = Vec::new();
        for (face, path) in source.faces() {
            let data = tokio::fs::read(path).await.map_err(|err| {
                Error::from(err).context(format!("cannot read font {}", path.display()))
            })?;
            faces.push((face, data));
        }
        if faces.is_empty() {
            log::warn!("font family {} has no font files, skipping", source.family);
            continue;
        }
        fonts.push(EmbeddedFont {
            family: source.family.clone(),
            faces,
        });
    }
    Ok(fonts)
}

/// A font part, obfuscated and keyed.
struct FontPart {
    face: FontFace,
    rel_id: String,
    key: String,
}

/// Stores the fonts in the package and references them from the font table.
pub(crate) fn embed(package: &mut Package, fonts: &[EmbeddedFont]) -> Result<()> {
    if fonts.is_empty() {
        return Ok(());
    }

    let mut relationships = Vec::new();
    let mut families = Vec::with_capacity(fonts.len());
    let mut index = 0;
    for font in fonts {
        let mut parts = Vec::with_capacity(font.faces.len());
        for (face, data) in &font.faces {
            index += 1;
            let guid = font_guid(data);
            let target = format!("fonts/font{index}.odttf");
            let rel_id = format!("rIdFont{index}");

            package.set(&format!("word/{target}"), obfuscate(data, &guid));
            relationships.push(Injection::raw(vec![Event::Empty(
                BytesStart::new("Relationship").with_attributes([
                    ("Id", rel_id.as_str()),
                    ("Type", FONT_REL_TYPE),
                    ("Target", target.as_str()),
                ]),
            )]));
            parts.push(FontPart {
                face: *face,
                rel_id,
                key: format_guid(&guid),
            });
        }
        families.push((font.family.as_str(), parts));
    }

    let rels = match package.xml(FONT_TABLE_RELS)? {
        Some(rels) => insert_children(rels, "Relationships", &[], relationships)?,
        None => {
            let empty = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="{RELS_NS}"></Relationships>"#
            );
            insert_children(&empty, "Relationships", &[], relationships)?
        }
    };
    package.set(FONT_TABLE_RELS, rels);

    let table = package
        .xml(FONT_TABLE)?
        .ok_or("packed DOCX has no font table")?;
    let table = rewrite_font_table(table, &families)
        .map_err(|err| err.context("failed to embed fonts"))?;
    package.set(FONT_TABLE, table);

    let types = package
        .xml(CONTENT_TYPES)?
        .ok_or("packed DOCX has no content types")?;
    if !types.contains(r#"Extension="odttf""#) {
        let default = Injection::empty(
            &[],
            "Default",
            &[("Extension", "odttf"), ("ContentType", OBFUSCATED_FONT)],
        );
        let types = insert_children(types, "Types", &[], vec![default])?;
        package.set(CONTENT_TYPES, types);
    }

    if let Some(settings) = package.xml(SETTINGS)? {
        let embed = Injection::empty(SETTINGS_ORDER, "w:embedTrueTypeFonts", &[]);
        let settings = insert_children(settings, "w:settings", SETTINGS_ORDER, vec![embed])?;
        package.set(SETTINGS, settings);
    }

    log::debug!("embedded {index} font files");
    Ok(())
}

/// Replaces the font table entries of the embedded families.
fn rewrite_font_table(xml: &str, families: &[(&str, Vec<FontPart>)]) -> Result<String> {
    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len() + 512));
    // The depth inside a replaced `w:font`, if skipping one.
    let mut skipping: Option<usize> = None;

    loop {
        let event = reader.read_event()?;
        if let Some(depth) = skipping.as_mut() {
            match event {
                Event::Start(_) => *depth += 1,
                Event::End(_) if *depth == 0 => skipping = None,
                Event::End(_) => *depth -= 1,
                Event::Eof => break,
                _ => {}
            }
            continue;
        }

        match &event {
            Event::Eof => break,
            Event::Start(e) if e.name().as_ref() == b"w:fonts" => {
                let mut start = e.to_owned();
                let has_r = e
                    .attributes()
                    .flatten()
                    .any(|attr| attr.key.as_ref() == b"xmlns:r");
                if !has_r {
                    start.push_attribute(("xmlns:r", R_NS));
                }
                writer.write_event(Event::Start(start))?;
            }
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == b"w:font" => {
                let replaced = e.attributes().flatten().any(|attr| {
                    attr.key.as_ref() == b"w:name"
                        && families
                            .iter()
                            .any(|(family, _)| family.as_bytes() == attr.value.as_ref())
                });
                if !replaced {
                    writer.write_event(event)?;
                } else if matches!(event, Event::Start(_)) {
                    skipping = Some(0);
                }
            }
            Event::End(e) if e.name().as_ref() == b"w:fonts" => {
                for (family, parts) in families {
                    write_font(&mut writer, family, parts)?;
                }
                writer.write_event(event)?;
            }
            _ => writer.write_event(event)?,
        }
    }

    String::from_utf8(writer.into_inner()).map_err(|_| "font table is not UTF-8".into())
}

fn write_font(writer: &mut Writer<Vec<u8>>, family: &str, parts: &[FontPart]) -> Result<()> {
    let value = |name: &'static str, val: &str| {
        Event::Empty(BytesStart::new(name).with_attributes([("w:val", val)]))
    };

    writer.write_event(Event::Start(
        BytesStart::new("w:font").with_attributes([("w:name", family)]),
    ))?;
    writer.write_event(value("w:charset", "00"))?;
    writer.write_event(value("w:family", "auto"))?;
    writer.write_event(value("w:pitch", "variable"))?;
    for part in parts {
        writer.write_event(Event::Empty(BytesStart::new(part.face.element()).with_attributes([
            ("r:id", part.rel_id.as_str()),
            ("w:fontKey", part.key.as_str()),
        ])))?;
    }
    writer.write_event(Event::End(BytesEnd::new("w:font")))?;
    Ok(())
}

/// The obfuscation key of a font, derived from its content.
fn font_guid(data: &[u8]) -> [u8; 16] {
    let digest = Sha256::digest(data);
    let mut guid = [0; 16];
    guid.copy_from_slice(&digest[..16]);
    guid
}

/// Formats a key as `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`.
fn format_guid(guid: &[u8; 16]) -> String {
    let hex: String = guid.iter().map(|byte| format!("{byte:02X}")).collect();
    format!(
        "{{{}-{}-{}-{}-{}}}",
        &hex[..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..]
    )
}

/// XORs the first 32 bytes with the key read from its last byte backwards.
fn obfuscate(data: &[u8], guid: &[u8; 16]) -> Vec<u8> {
    let mut out = data.to_vec();
    for (idx, byte) in out.iter_mut().take(32).enumerate() {
        *byte ^= guid[15 - idx % 16];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const FONT_TABLE_XML: &str = concat!(
        r#"<w:fonts xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">"#,
        r#"<w:font w:name="Calibri"><w:charset w:val="00"/></w:font>"#,
        r#"<w:font w:name="Vazirmatn"><w:charset w:val="00"/></w:font>"#,
        r#"</w:fonts>"#,
    );

    #[test]
    fn guid_is_formatted_in_groups() {
        let guid = [
            0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF, 0x01, 0x23, 0x45, 0x67, 0x89, 0xAB,
            0xCD, 0xEF,
        ];
        assert_eq!(format_guid(&guid), "{01234567-89AB-CDEF-0123-456789ABCDEF}");
    }

    #[test]
    fn obfuscation_touches_the_header_only() {
        let data: Vec<u8> = (0..64).collect();
        let guid = font_guid(&data);
        let obfuscated = obfuscate(&data, &guid);
        assert_eq!(obfuscated[0], data[0] ^ guid[15]);
        assert_eq!(obfuscated[16], data[16] ^ guid[15]);
        assert_eq!(obfuscated[31], data[31] ^ guid[0]);
        assert_eq!(obfuscated[32..], data[32..]);
        assert_eq!(obfuscate(&obfuscated, &guid), data);
    }

    #[test]
    fn font_table_entries_are_replaced() {
        let parts = vec![FontPart {
            face: FontFace::Regular,
            rel_id: "rIdFont1".into(),
            key: "{KEY}".into(),
        }];
        let table = rewrite_font_table(FONT_TABLE_XML, &[("Vazirmatn", parts)]).unwrap();
        assert_eq!(
            table,
            concat!(
                r#"<w:fonts xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
                r#"<w:font w:name="Calibri"><w:charset w:val="00"/></w:font>"#,
                r#"<w:font w:name="Vazirmatn"><w:charset w:val="00"/><w:family w:val="auto"/><w:pitch w:val="variable"/>"#,
                r#"<w:embedRegular r:id="rIdFont1" w:fontKey="{KEY}"/></w:font>"#,
                r#"</w:fonts>"#,
            )
        );
    }

    #[tokio::test]
    async fn loads_faces_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let regular = dir.path().join("regular.ttf");
        tokio::fs::write(&regular, b"font bytes").await.unwrap();

        let sources = [
            FontSource {
                family: "Vazirmatn".into(),
                regular: Some(regular),
                ..Default::default()
            },
            FontSource {
                family: "Empty".into(),
                ..Default::default()
            },
        ];
        let fonts = load_fonts(&sources).await.unwrap();
        assert_eq!(fonts.len(), 1);
        assert_eq!(fonts[0].faces, [(FontFace::Regular, b"font bytes".to_vec())]);

        let missing = [FontSource {
            family: "Gone".into(),
            bold: Some(dir.path().join("missing.ttf")),
            ..Default::default()
        }];
        let err = load_fonts(&missing).await.unwrap_err();
        assert!(err.to_string().starts_with("cannot read font"));
    }
}
