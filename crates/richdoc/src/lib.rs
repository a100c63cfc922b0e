//! # Richdoc
//!
//! Compiles the document tree of a rich-text editor into a DOCX package.
//!
//! An export runs in three stages:
//! 1. the [`ResourceFetcher`] resolves every image the document references,
//! 2. the [`BlockCompiler`] flattens the tree into [`ir::Block`]s,
//! 3. the [`DocxWriter`] assembles the package.
//!
//! Only the last stage can fail. Missing images, malformed attributes and
//! unknown node kinds degrade the output instead.

pub mod attributes;
pub mod compiler;
pub mod config;
mod error;
pub mod ir;
pub mod model;
pub mod resource;
pub mod style;
pub mod writer;


use std::time::Instant;

pub use error::*;

pub use crate::compiler::BlockCompiler;
pub use crate::config::ExportConfig;
pub use crate::model::Node;
pub use crate::resource::{
    BlobStore, DefaultLoader, ResolvedImages, ResourceFetcher, ResourceLoader,
};
pub use crate::writer::DocxWriter;

/// The result type for richdoc.
pub type Result<T, Err = Error> = std::result::Result<T, Err>;

/// Exports documents to DOCX packages.
///
/// The exporter holds no per-document state, so one exporter may run any
/// number of exports concurrently.
#[derive(Clone)]
pub struct DocxExporter {
    config: ExportConfig,
    fetcher: ResourceFetcher,
}

impl DocxExporter {
    /// Creates an exporter fetching images with the default loader.
    pub fn new(config: ExportConfig) -> Result<Self> {
        let loader = DefaultLoader::new()?;
        Ok(Self::with_loader(config, loader))
    }

    /// Creates an exporter fetching images through `loader`.
    pub fn with_loader(config: ExportConfig, loader: impl ResourceLoader + 'static) -> Self {
        let fetcher = ResourceFetcher::new(loader).with_timeout(config.image_timeout());
        Self { config, fetcher }
    }

    /// The configuration of the exporter.
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Exports a document tree to the bytes of a DOCX package.
    pub async fn export(&self, doc: &Node) -> Result<Vec<u8>> {
        let start = Instant::now();
        let images = self.fetcher.collect(doc).await;
        let fonts = writer::load_fonts(&self.config.embedded_fonts).await?;

        let blocks = compile_blocks(doc, &self.config, &images);
        let package = DocxWriter::new(&self.config)
            .write(&blocks, &fonts)
            .context("failed to write DOCX")?;

        log::info!(
            "exported {} blocks ({} bytes) in {:?}",
            blocks.len(),
            package.len(),
            start.elapsed()
        );
        Ok(package)
    }

    /// Exports a document serialized as JSON.
    pub async fn export_json(&self, json: &str) -> Result<Vec<u8>> {
        let doc = Node::from_json(json)?;
        self.export(&doc).await
    }
}

/// Compiles a document tree into a block sequence, which is never empty.
pub fn compile_blocks(
    doc: &Node,
    config: &ExportConfig,
    images: &ResolvedImages,
) -> Vec<ir::Block> {
    BlockCompiler::new(config, images).compile(doc)
}
