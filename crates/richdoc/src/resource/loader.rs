//! Byte retrieval of image sources.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use ecow::EcoString;
use parking_lot::RwLock;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};

use crate::Result;

/// Where the bytes of an image come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// An embedded `data:` URI.
    Data(EcoString),
    /// An ephemeral `blob:` reference, registered in a [`BlobStore`].
    Blob(EcoString),
    /// An `http` or `https` URL.
    Remote(EcoString),
    /// A local file, from a `file://` URL or a bare path.
    File(PathBuf),
}

impl ImageSource {
    /// Classifies an image reference; unsupported schemes yield `None`.
    pub fn classify(src: &str) -> Option<Self> {
        let src = src.trim();
        if src.is_empty() {
            return None;
        }

        let Some(scheme) = scheme_of(src) else {
            return Some(Self::File(PathBuf::from(src)));
        };
        match scheme.to_ascii_lowercase().as_str() {
            "data" => Some(Self::Data(src.into())),
            "blob" => Some(Self::Blob(src.into())),
            "http" | "https" => Some(Self::Remote(src.into())),
            "file" => {
                let path = &src[scheme.len() + 1..];
                let path = path.strip_prefix("//").unwrap_or(path);
                let path = percent_encoding::percent_decode_str(path).decode_utf8_lossy();
                Some(Self::File(PathBuf::from(path.as_ref())))
            }
            _ => None,
        }
    }

    /// Whether the source is fetched over the network.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

/// The URL scheme of a reference, if it has one.
///
/// Single letters are drive prefixes of Windows paths, not schemes.
fn scheme_of(src: &str) -> Option<&str> {
    let (scheme, _) = src.split_once(':')?;
    let valid = scheme.len() > 1
        && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then_some(scheme)
}

/// Decodes the payload of a `data:` URI.
pub fn decode_data_uri(uri: &str) -> Result<Bytes> {
    let rest = uri.get(5..).ok_or("data URI is truncated")?;
    let (meta, payload) = rest.split_once(',').ok_or("data URI has no payload")?;

    if meta.to_ascii_lowercase().ends_with(";base64") {
        let payload: String = percent_encoding::percent_decode_str(payload)
            .decode_utf8_lossy()
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        let engines = [
            &base64::engine::general_purpose::STANDARD,
            &base64::engine::general_purpose::STANDARD_NO_PAD,
            &base64::engine::general_purpose::URL_SAFE,
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
        ];
        let mut decoded = engines[0].decode(&payload);
        for engine in &engines[1..] {
            if decoded.is_ok() {
                break;
            }
            decoded = engine.decode(&payload);
        }
        let data = decoded?;
        Ok(data.into())
    } else {
        Ok(percent_encoding::percent_decode_str(payload)
            .collect::<Vec<u8>>()
            .into())
    }
}

/// An in-memory store of ephemeral `blob:` references.
///
/// The caller registers the bytes behind each reference before exporting;
/// clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct BlobStore(Arc<RwLock<HashMap<EcoString, Bytes>>>);

impl BlobStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the bytes behind a reference.
    pub fn insert(&self, url: impl Into<EcoString>, data: impl Into<Bytes>) {
        self.0.write().insert(url.into(), data.into());
    }

    /// Forgets a reference.
    pub fn remove(&self, url: &str) -> Option<Bytes> {
        self.0.write().remove(url)
    }

    /// Looks up the bytes behind a reference.
    pub fn get(&self, url: &str) -> Option<Bytes> {
        self.0.read().get(url).cloned()
    }
}

/// Retrieves the bytes of image sources.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    /// Retrieves the bytes of a source.
    async fn load(&self, source: &ImageSource) -> Result<Bytes>;

    /// Retrieves a remote source a second way, after [`Self::load`] failed.
    ///
    /// The returned bytes are always re-encoded before use.
    async fn load_fallback(&self, source: &ImageSource) -> Result<Bytes> {
        let _ = source;
        Err("no fallback retrieval".into())
    }
}

/// The loader used by default: data URIs in process, blobs from a store,
/// remote URLs over HTTP and local files from disk.
#[derive(Debug, Clone)]
pub struct DefaultLoader {
    client: reqwest::Client,
    anonymous: reqwest::Client,
    blobs: BlobStore,
}

impl DefaultLoader {
    /// Creates a loader with an empty blob store.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("richdoc/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("image/*,*/*;q=0.8"));
        let anonymous = reqwest::Client::builder()
            .referer(false)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            anonymous,
            blobs: BlobStore::new(),
        })
    }

    /// Resolves `blob:` references from the given store.
    pub fn with_blobs(mut self, blobs: BlobStore) -> Self {
        self.blobs = blobs;
        self
    }

    async fn get(client: &reqwest::Client, url: &str) -> Result<Bytes> {
        let response = client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl ResourceLoader for DefaultLoader {
    async fn load(&self, source: &ImageSource) -> Result<Bytes> {
        match source {
            ImageSource::Data(uri) => decode_data_uri(uri),
            ImageSource::Blob(url) => match self.blobs.get(url) {
                Some(data) => Ok(data),
                None => Err(format!("blob {url} is not registered").into()),
            },
            ImageSource::Remote(url) => Self::get(&self.client, url).await,
            ImageSource::File(path) => Ok(tokio::fs::read(path).await?.into()),
        }
    }

    async fn load_fallback(&self, source: &ImageSource) -> Result<Bytes> {
        match source {
            ImageSource::Remote(url) => Self::get(&self.anonymous, url).await,
            _ => Err("no fallback retrieval".into()),
        }
    }
}
