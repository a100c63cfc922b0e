//! The zip container of a packed document, opened for post-processing.

use std::io::{Cursor, Read, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::Result;

/// The parts of a package, in archive order.
pub(crate) struct Package {
    parts: Vec<(String, Vec<u8>)>,
}

impl Package {
    /// Reads every part of a packed document.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        let mut archive = ZipArchive::new(Cursor::new(bytes))?;
        let mut parts = Vec::with_capacity(archive.len());
        for idx in 0..archive.len() {
            let mut file = archive.by_index(idx)?;
            if file.is_dir() {
                continue;
            }
            let mut data = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut data)?;
            parts.push((file.name().to_owned(), data));
        }
        Ok(Self { parts })
    }

    /// The content of a part.
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|(part, _)| part == name)
            .map(|(_, data)| data.as_slice())
    }

    /// The content of an XML part.
    pub fn xml(&self, name: &str) -> Result<Option<&str>> {
        match self.get(name) {
            Some(data) => std::str::from_utf8(data)
                .map(Some)
                .map_err(|_| format!("{name} is not valid UTF-8").into()),
            None => Ok(None),
        }
    }

    /// Replaces a part, or appends it when it does not exist yet.
    pub fn set(&mut self, name: &str, data: impl Into<Vec<u8>>) {
        let data = data.into();
        match self.parts.iter_mut().find(|(part, _)| part == name) {
            Some((_, slot)) => *slot = data,
            None => self.parts.push((name.to_owned(), data)),
        }
    }

    /// Packs the parts into a new archive.
    pub fn write(self) -> Result<Vec<u8>> {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in &self.parts {
            zip.start_file(name.as_str(), options)?;
            zip.write_all(data)?;
        }
        Ok(zip.finish()?.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive(parts: &[(&str, &str)]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in parts {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data.as_bytes()).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn replaces_and_appends_parts_in_order() {
        let bytes = archive(&[("[Content_Types].xml", "<Types/>"), ("word/document.xml", "<a/>")]);
        let mut package = Package::read(&bytes).unwrap();
        package.set("word/document.xml", "<b/>");
        package.set("word/fonts/font1.odttf", vec![1, 2, 3]);

        let package = Package::read(&package.write().unwrap()).unwrap();
        let names: Vec<_> = package.parts.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            ["[Content_Types].xml", "word/document.xml", "word/fonts/font1.odttf"]
        );
        assert_eq!(package.xml("word/document.xml").unwrap(), Some("<b/>"));
        assert_eq!(package.get("word/fonts/font1.odttf"), Some(&[1u8, 2, 3][..]));
        assert_eq!(package.xml("missing.xml").unwrap(), None);
    }
}
