//! Resolution of image references into placeable images.
//!
//! All images of a document are fetched before block compilation starts, one
//! at a time in document order, so the compilers themselves stay
//! synchronous.

mod loader;
mod size;
mod transcode;

pub use loader::{BlobStore, DefaultLoader, ImageSource, ResourceLoader, decode_data_uri};
pub use size::resolve_size;
pub use transcode::{FetchedImage, normalize, reencode_png};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use ecow::EcoString;

use crate::Result;
use crate::model::Node;

/// The images of one document, keyed by their reference.
#[derive(Debug, Default, Clone)]
pub struct ResolvedImages {
    images: HashMap<EcoString, Option<FetchedImage>>,
}

impl ResolvedImages {
    /// Creates an empty set, in which every image is missing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the outcome of resolving a reference.
    pub fn insert(&mut self, src: impl Into<EcoString>, image: Option<FetchedImage>) {
        self.images.insert(src.into(), image);
    }

    /// The image behind a reference, if it could be resolved.
    pub fn get(&self, src: &str) -> Option<&FetchedImage> {
        self.images.get(src)?.as_ref()
    }

    fn contains(&self, src: &str) -> bool {
        self.images.contains_key(src)
    }

    /// The number of references that resolved to an image.
    pub fn resolved(&self) -> usize {
        self.images.values().filter(|img| img.is_some()).count()
    }
}

/// Fetches the images a document references.
#[derive(Clone)]
pub struct ResourceFetcher {
    loader: Arc<dyn ResourceLoader>,
    timeout: Option<Duration>,
}

impl ResourceFetcher {
    /// Creates a fetcher retrieving bytes through `loader`.
    pub fn new(loader: impl ResourceLoader + 'static) -> Self {
        Self {
            loader: Arc::new(loader),
            timeout: None,
        }
    }

    /// Limits the time a single retrieval may take.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Fetches every image of the document, each distinct reference once.
    pub async fn collect(&self, doc: &Node) -> ResolvedImages {
        let start = Instant::now();
        let mut images = ResolvedImages::new();
        let mut total = 0;

        for node in doc.descendants().filter(|node| node.is_image()) {
            let Some(src) = node.attrs.str("src") else {
                log::warn!("dropping image without a source");
                continue;
            };
            if images.contains(src) {
                continue;
            }
            total += 1;
            let image = self.fetch(src).await;
            images.insert(src, image);
        }

        if total > 0 {
            log::info!(
                "resolved {} of {total} images in {:?}",
                images.resolved(),
                start.elapsed()
            );
        }
        images
    }

    /// Fetches one image, or `None` when no path could produce it.
    pub async fn fetch(&self, src: &str) -> Option<FetchedImage> {
        let Some(source) = ImageSource::classify(src) else {
            log::warn!("dropping image with unsupported source {}", abbreviate(src));
            return None;
        };

        let primary = match self.retrieve(self.loader.load(&source)).await {
            Ok(data) => normalize(data),
            Err(err) => Err(err),
        };
        let err = match primary {
            Ok(image) => {
                log::debug!(
                    "fetched image {} ({}x{})",
                    abbreviate(src),
                    image.natural.0,
                    image.natural.1
                );
                return Some(image);
            }
            Err(err) => err,
        };

        if !source.is_remote() {
            log::warn!("dropping image {}: {err}", abbreviate(src));
            return None;
        }

        log::debug!("retrying image {} anonymously: {err}", abbreviate(src));
        let fallback = match self.retrieve(self.loader.load_fallback(&source)).await {
            Ok(data) => reencode_png(&data),
            Err(err) => Err(err),
        };
        match fallback {
            Ok(image) => Some(image),
            Err(fallback_err) => {
                log::warn!(
                    "dropping image {}: {err}; fallback failed: {fallback_err}",
                    abbreviate(src)
                );
                None
            }
        }
    }

    async fn retrieve(&self, fut: impl Future<Output = Result<Bytes>>) -> Result<Bytes> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| format!("timed out after {limit:?}"))?,
            None => fut.await,
        }
    }
}

/// Shortens data URIs for logging.
fn abbreviate(src: &str) -> &str {
    match src.char_indices().nth(64) {
        Some((idx, _)) if src.starts_with("data:") => &src[..idx],
        _ => src,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use image::ImageFormat;

    use super::transcode::tests::encoded;
    use super::*;
    use crate::ir::ImageKind;
    use crate::model::NodeKind;

    #[derive(Default)]
    struct MockLoader {
        files: HashMap<&'static str, Vec<u8>>,
        fallback: HashMap<&'static str, Vec<u8>>,
        slow: Option<Duration>,
        loads: AtomicUsize,
    }

    #[async_trait]
    impl ResourceLoader for MockLoader {
        async fn load(&self, source: &ImageSource) -> Result<Bytes> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.slow {
                tokio::time::sleep(delay).await;
            }
            let ImageSource::Remote(url) = source else {
                return Err("unexpected source".into());
            };
            match self.files.get(url.as_str()) {
                Some(data) => Ok(data.clone().into()),
                None => Err("blocked by CORS".into()),
            }
        }

        async fn load_fallback(&self, source: &ImageSource) -> Result<Bytes> {
            let ImageSource::Remote(url) = source else {
                return Err("unexpected source".into());
            };
            match self.fallback.get(url.as_str()) {
                Some(data) => Ok(data.clone().into()),
                None => Err("not found".into()),
            }
        }
    }

    fn image(src: &str) -> Node {
        Node::new(NodeKind::Image).with_attr("src", src)
    }

    #[tokio::test]
    async fn fetches_each_reference_once() {
        let mut loader = MockLoader::default();
        loader
            .files
            .insert("https://a/x.png", encoded(4, 2, ImageFormat::Png));
        let loader = Arc::new(loader);

        let fetcher = ResourceFetcher {
            loader: loader.clone(),
            timeout: None,
        };
        let doc = Node::new(NodeKind::Doc).with_content([
            image("https://a/x.png"),
            Node::new(NodeKind::Paragraph).with_content([image("https://a/x.png")]),
        ]);
        let images = fetcher.collect(&doc).await;

        assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
        assert_eq!(images.get("https://a/x.png").unwrap().natural, (4, 2));
    }

    #[tokio::test]
    async fn fallback_reencodes_to_png() {
        let mut loader = MockLoader::default();
        loader
            .fallback
            .insert("https://a/y.gif", encoded(3, 3, ImageFormat::Gif));
        let fetcher = ResourceFetcher::new(loader);

        let image = fetcher.fetch("https://a/y.gif").await.unwrap();
        assert_eq!(image.kind, ImageKind::Png);
        assert_eq!(image.natural, (3, 3));
    }

    #[tokio::test]
    async fn unavailable_images_are_missing() {
        let fetcher = ResourceFetcher::new(MockLoader::default());
        let doc = Node::new(NodeKind::Doc).with_content([
            image("https://a/gone.png"),
            image("ftp://a/b.png"),
            Node::new(NodeKind::Image),
        ]);
        let images = fetcher.collect(&doc).await;
        assert!(images.get("https://a/gone.png").is_none());
        assert_eq!(images.resolved(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_retrieval_times_out() {
        let mut loader = MockLoader::default();
        loader
            .files
            .insert("https://a/slow.png", encoded(1, 1, ImageFormat::Png));
        loader.slow = Some(Duration::from_secs(30));
        let fetcher = ResourceFetcher::new(loader).with_timeout(Some(Duration::from_secs(5)));

        assert!(fetcher.fetch("https://a/slow.png").await.is_none());
    }

    #[tokio::test]
    async fn decodes_data_uris_in_process() {
        use base64::Engine;

        let png = encoded(6, 3, ImageFormat::Png);
        let src = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&png)
        );
        let fetcher = ResourceFetcher::new(DefaultLoader::new().unwrap());
        let image = fetcher.fetch(&src).await.unwrap();
        assert_eq!(image.natural, (6, 3));
        assert_eq!(image.kind, ImageKind::Png);
    }
}
