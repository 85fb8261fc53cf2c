//! Image loading with an injectable cache.
//!
//! [`ImageLoader`] resolves an [`ImageSource`] to a decoded [`ImageAsset`].
//! Bytes come from a [`Fetch`] implementation; decoded assets are kept in an
//! [`AssetCache`] handed to the loader at construction, keyed by the icon's
//! logical name or the URL.
//!
//! Results are never delivered from [`ImageLoader::load`] itself. The caller
//! holds a [`LoadTicket`] and collects [`LoadEvent`]s with
//! [`ImageLoader::poll`], typically once per frame: zero or more
//! `Progress` events followed by exactly one `Loaded` or `Failed`.
//!
//! # Example
//!
//! ```
//! use panowalk::{AssetCache, ImageLoader, ImageSource, Icon, LoadEvent, MemoryFetcher};
//!
//! let mut loader = ImageLoader::new(MemoryFetcher::new(), AssetCache::new());
//! let ticket = loader.load(&ImageSource::Icon(Icon::Arrow));
//!
//! let events = loader.poll(ticket);
//! assert!(matches!(events.last(), Some(LoadEvent::Loaded(_))));
//! assert!(loader.cache().contains("icon:Arrow"));
//! ```

use crate::event::Progress;
use crate::texture::{ImageAsset, ImageSource};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

/// Pixel size at which built-in icons are rasterized.
pub const ICON_SIZE: u32 = 64;

/// Errors that can occur while loading an image.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The fetcher could not read the resource.
    #[error("failed to read '{url}': {source}")]
    Io {
        url: String,
        #[source]
        source: std::io::Error,
    },
    /// The fetcher has no resource under this URL.
    #[error("resource not found: '{0}'")]
    NotFound(String),
    /// The bytes were not a decodable image.
    #[error("failed to decode '{url}': {source}")]
    Decode {
        url: String,
        #[source]
        source: image::ImageError,
    },
    /// A `data:` URL without a base64 payload.
    #[error("malformed data URL: {0}")]
    DataUrl(String),
    /// The payload of a `data:` URL was not valid base64.
    #[error("invalid base64 in data URL: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Decode a `data:[<media type>];base64,<payload>` URL, minus its scheme.
///
/// Returns a short label for error messages along with the payload bytes.
fn decode_data_url(rest: &str) -> Result<(String, Vec<u8>), LoadError> {
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| LoadError::DataUrl("missing ','".to_string()))?;
    if !header.ends_with(";base64") {
        return Err(LoadError::DataUrl(format!(
            "unsupported encoding in 'data:{}'",
            header
        )));
    }
    let bytes = STANDARD.decode(payload.trim())?;
    Ok((format!("data:{}", header), bytes))
}

/// Source of raw image bytes.
pub trait Fetch {
    /// Read the full resource at `url`.
    fn fetch(&mut self, url: &str) -> Result<Vec<u8>, LoadError>;
}

/// Fetches files relative to a root directory.
#[derive(Clone, Debug)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Fetch for FileFetcher {
    fn fetch(&mut self, url: &str) -> Result<Vec<u8>, LoadError> {
        let path = self.root.join(url);
        std::fs::read(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadError::NotFound(url.to_string())
            } else {
                LoadError::Io {
                    url: url.to_string(),
                    source,
                }
            }
        })
    }
}

/// Serves resources from an in-memory table.
#[derive(Clone, Debug, Default)]
pub struct MemoryFetcher {
    files: HashMap<String, Vec<u8>>,
    fetches: usize,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, url: impl Into<String>, bytes: Vec<u8>) -> Self {
        self.insert(url, bytes);
        self
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) {
        self.files.insert(url.into(), bytes);
    }

    /// Number of fetches served or refused so far.
    pub fn fetches(&self) -> usize {
        self.fetches
    }
}

impl Fetch for MemoryFetcher {
    fn fetch(&mut self, url: &str) -> Result<Vec<u8>, LoadError> {
        self.fetches += 1;
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(url.to_string()))
    }
}

/// Decoded assets by cache key.
///
/// Entries live until explicitly evicted.
#[derive(Clone, Debug, Default)]
pub struct AssetCache {
    entries: HashMap<String, Arc<ImageAsset>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<ImageAsset>> {
        self.entries.get(key).cloned()
    }

    pub fn insert(&mut self, key: impl Into<String>, asset: Arc<ImageAsset>) {
        self.entries.insert(key.into(), asset);
    }

    pub fn remove(&mut self, key: &str) -> Option<Arc<ImageAsset>> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Handle to one outstanding load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoadTicket(u64);

/// Outcome notifications for one load.
#[derive(Clone, Debug)]
pub enum LoadEvent {
    Progress(Progress),
    Loaded(Arc<ImageAsset>),
    Failed(Arc<LoadError>),
}

/// Resolves image sources through a fetcher and a cache.
pub struct ImageLoader {
    fetcher: Box<dyn Fetch>,
    cache: AssetCache,
    next_ticket: u64,
    pending: HashMap<LoadTicket, VecDeque<LoadEvent>>,
}

impl ImageLoader {
    pub fn new(fetcher: impl Fetch + 'static, cache: AssetCache) -> Self {
        Self {
            fetcher: Box::new(fetcher),
            cache,
            next_ticket: 0,
            pending: HashMap::new(),
        }
    }

    /// Begin loading `source`. Results are available from the next [`poll`](Self::poll).
    pub fn load(&mut self, source: &ImageSource) -> LoadTicket {
        let ticket = LoadTicket(self.next_ticket);
        self.next_ticket += 1;

        let key = source.cache_key().to_string();
        let mut events = VecDeque::new();

        if let Some(asset) = self.cache.get(&key) {
            log::trace!("Cache hit for '{}'", key);
            events.push_back(LoadEvent::Progress(Progress {
                loaded: 1,
                total: 1,
            }));
            events.push_back(LoadEvent::Loaded(asset));
        } else {
            match self.resolve(source) {
                Ok((asset, bytes)) => {
                    let asset = Arc::new(asset);
                    self.cache.insert(key, Arc::clone(&asset));
                    events.push_back(LoadEvent::Progress(Progress {
                        loaded: bytes,
                        total: bytes,
                    }));
                    events.push_back(LoadEvent::Loaded(asset));
                }
                Err(err) => {
                    log::warn!("{}", err);
                    events.push_back(LoadEvent::Failed(Arc::new(err)));
                }
            }
        }

        self.pending.insert(ticket, events);
        ticket
    }

    fn resolve(&mut self, source: &ImageSource) -> Result<(ImageAsset, u64), LoadError> {
        match source {
            ImageSource::Icon(icon) => {
                let asset = icon.render(ICON_SIZE);
                let bytes = asset.byte_len() as u64;
                Ok((asset, bytes))
            }
            ImageSource::Url(url) => {
                // data: URLs carry their bytes inline
                let (label, bytes) = match url.strip_prefix("data:") {
                    Some(rest) => decode_data_url(rest)?,
                    None => (url.clone(), self.fetcher.fetch(url)?),
                };
                let asset = ImageAsset::from_bytes(&bytes)
                    .map_err(|source| LoadError::Decode { url: label, source })?;
                Ok((asset, bytes.len() as u64))
            }
        }
    }

    /// Collect every event produced for `ticket` so far.
    ///
    /// Once the terminal event has been returned the ticket is forgotten and
    /// further polls return nothing.
    pub fn poll(&mut self, ticket: LoadTicket) -> Vec<LoadEvent> {
        self.pending
            .remove(&ticket)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Drop a load. Returns `false` if the ticket was already finished.
    pub fn cancel(&mut self, ticket: LoadTicket) -> bool {
        self.pending.remove(&ticket).is_some()
    }

    pub fn is_pending(&self, ticket: LoadTicket) -> bool {
        self.pending.contains_key(&ticket)
    }

    pub fn cache(&self) -> &AssetCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut AssetCache {
        &mut self.cache
    }

    /// Remove a cache entry. Returns `true` if it existed.
    pub fn evict(&mut self, key: &str) -> bool {
        self.cache.remove(key).is_some()
    }
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("cache", &self.cache.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::Icon;
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, image::Rgba([200, 100, 50, 255]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn fetches_decodes_and_caches() {
        let bytes = png(8, 4);
        let len = bytes.len() as u64;
        let mut loader = ImageLoader::new(MemoryFetcher::new().with("room.png", bytes), AssetCache::new());

        let ticket = loader.load(&ImageSource::from("room.png"));
        assert!(loader.is_pending(ticket));

        let events = loader.poll(ticket);
        assert_eq!(events.len(), 2);
        match &events[0] {
            LoadEvent::Progress(p) => assert_eq!(*p, Progress { loaded: len, total: len }),
            other => panic!("unexpected {:?}", other),
        }
        match &events[1] {
            LoadEvent::Loaded(asset) => assert_eq!((asset.width, asset.height), (8, 4)),
            other => panic!("unexpected {:?}", other),
        }

        assert!(loader.poll(ticket).is_empty());
        assert!(loader.cache().contains("room.png"));
    }

    #[test]
    fn cached_asset_is_shared_and_not_refetched() {
        let mut loader = ImageLoader::new(MemoryFetcher::new().with("a.png", png(2, 2)), AssetCache::new());

        let first = loader.load(&ImageSource::from("a.png"));
        let second = loader.load(&ImageSource::from("a.png"));

        let a = match loader.poll(first).pop() {
            Some(LoadEvent::Loaded(asset)) => asset,
            other => panic!("unexpected {:?}", other),
        };
        let events = loader.poll(second);
        assert!(matches!(events[0], LoadEvent::Progress(Progress { loaded: 1, total: 1 })));
        match &events[1] {
            LoadEvent::Loaded(b) => assert!(Arc::ptr_eq(&a, b)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_resource_fails_without_caching() {
        let mut loader = ImageLoader::new(MemoryFetcher::new(), AssetCache::new());
        let ticket = loader.load(&ImageSource::from("missing.png"));

        let events = loader.poll(ticket);
        assert_eq!(events.len(), 1);
        match &events[0] {
            LoadEvent::Failed(err) => assert!(matches!(**err, LoadError::NotFound(_))),
            other => panic!("unexpected {:?}", other),
        }
        assert!(loader.cache().is_empty());
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let mut loader = ImageLoader::new(
            MemoryFetcher::new().with("bad.png", b"nope".to_vec()),
            AssetCache::new(),
        );
        let ticket = loader.load(&ImageSource::from("bad.png"));
        match loader.poll(ticket).pop() {
            Some(LoadEvent::Failed(err)) => {
                assert!(matches!(*err, LoadError::Decode { .. }));
                assert!(err.to_string().contains("bad.png"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn injected_cache_is_used_and_evictable() {
        let mut cache = AssetCache::new();
        cache.insert("icon:Arrow", Arc::new(ImageAsset::from_rgba(vec![1, 2, 3, 4], 1, 1)));

        let mut loader = ImageLoader::new(MemoryFetcher::new(), cache);
        let ticket = loader.load(&ImageSource::Icon(Icon::Arrow));
        match loader.poll(ticket).pop() {
            Some(LoadEvent::Loaded(asset)) => assert_eq!(asset.width, 1),
            other => panic!("unexpected {:?}", other),
        }

        assert!(loader.evict("icon:Arrow"));
        assert!(!loader.evict("icon:Arrow"));
    }

    #[test]
    fn cancel_drops_results() {
        let mut loader = ImageLoader::new(MemoryFetcher::new(), AssetCache::new());
        let ticket = loader.load(&ImageSource::Icon(Icon::Info));
        assert!(loader.cancel(ticket));
        assert!(!loader.cancel(ticket));
        assert!(loader.poll(ticket).is_empty());
    }

    #[test]
    fn data_url_is_decoded_without_fetching() {
        let url = format!("data:image/png;base64,{}", STANDARD.encode(png(1, 1)));
        let mut loader = ImageLoader::new(MemoryFetcher::new(), AssetCache::new());

        let ticket = loader.load(&ImageSource::from(url.as_str()));
        match loader.poll(ticket).pop() {
            Some(LoadEvent::Loaded(asset)) => assert_eq!((asset.width, asset.height), (1, 1)),
            other => panic!("unexpected {:?}", other),
        }
        assert!(loader.cache().contains(&url));
    }

    #[test]
    fn bad_data_urls_fail() {
        let mut loader = ImageLoader::new(MemoryFetcher::new(), AssetCache::new());

        let ticket = loader.load(&ImageSource::from("data:image/png;base64,@@not base64@@"));
        match loader.poll(ticket).pop() {
            Some(LoadEvent::Failed(err)) => assert!(matches!(*err, LoadError::Base64(_))),
            other => panic!("unexpected {:?}", other),
        }

        let ticket = loader.load(&ImageSource::from("data:text/plain,hello"));
        match loader.poll(ticket).pop() {
            Some(LoadEvent::Failed(err)) => assert!(matches!(*err, LoadError::DataUrl(_))),
            other => panic!("unexpected {:?}", other),
        }

        let ticket = loader.load(&ImageSource::from(format!(
            "data:image/png;base64,{}",
            STANDARD.encode(b"nope")
        )));
        match loader.poll(ticket).pop() {
            Some(LoadEvent::Failed(err)) => {
                assert!(matches!(*err, LoadError::Decode { .. }));
                assert!(err.to_string().contains("data:image/png;base64"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(loader.cache().is_empty());
    }

    #[test]
    fn file_fetcher_reports_missing_files() {
        let mut fetcher = FileFetcher::new(std::env::temp_dir());
        let err = fetcher.fetch("panowalk-definitely-missing.png").unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
    }
}
