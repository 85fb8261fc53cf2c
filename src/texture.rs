//! Decoded image assets and the built-in infospot icons.

/// A decoded RGBA8 image held in memory.
///
/// Assets are shared behind `Arc` between the loader cache and every
/// material that displays them.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageAsset {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows, top to bottom.
    pub pixels: Vec<u8>,
}

impl ImageAsset {
    /// Create an asset from raw RGBA data.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), (width * height * 4) as usize);
        Self {
            width,
            height,
            pixels: data,
        }
    }

    /// Decode an asset from encoded bytes (PNG, JPEG, ...).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?.to_rgba8();
        let (width, height) = img.dimensions();
        Ok(Self::from_rgba(img.into_raw(), width, height))
    }

    /// Number of bytes held by the pixel buffer.
    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Built-in icons available without any network access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Icon {
    /// Chevron pointing up, used for links between panoramas.
    Arrow,
    /// Circled dot, used for plain information spots.
    Info,
}

impl Icon {
    /// Logical name.
    pub fn name(&self) -> &'static str {
        match self {
            Icon::Arrow => "Arrow",
            Icon::Info => "Info",
        }
    }

    /// Cache key, namespaced so it never collides with a URL.
    pub fn cache_key(&self) -> &'static str {
        match self {
            Icon::Arrow => "icon:Arrow",
            Icon::Info => "icon:Info",
        }
    }

    /// Rasterize the icon at `size`×`size` pixels.
    pub fn render(&self, size: u32) -> ImageAsset {
        let mut data = vec![0u8; (size * size * 4) as usize];
        let half = size as f32 / 2.0;

        for y in 0..size {
            for x in 0..size {
                let idx = ((y * size + x) * 4) as usize;
                // Normalized coordinates in [-1, 1], y up
                let u = (x as f32 + 0.5 - half) / half;
                let v = (half - y as f32 - 0.5) / half;

                let inside = match self {
                    Icon::Arrow => {
                        // Thick chevron: band between two offset V shapes
                        let d = v + u.abs();
                        u.abs() < 0.8 && (0.0..0.45).contains(&(d - 0.1))
                    }
                    Icon::Info => {
                        let r = (u * u + v * v).sqrt();
                        (0.75..0.95).contains(&r) || r < 0.2
                    }
                };

                if inside {
                    data[idx] = 255;
                    data[idx + 1] = 255;
                    data[idx + 2] = 255;
                    data[idx + 3] = 255;
                }
            }
        }

        ImageAsset::from_rgba(data, size, size)
    }
}

/// Where an infospot or panorama image comes from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ImageSource {
    /// A URL or path resolved by the loader's fetcher.
    Url(String),
    /// A built-in icon.
    Icon(Icon),
}

impl ImageSource {
    /// Key under which the decoded asset is cached.
    pub fn cache_key(&self) -> &str {
        match self {
            ImageSource::Url(url) => url,
            ImageSource::Icon(icon) => icon.cache_key(),
        }
    }
}

impl Default for ImageSource {
    fn default() -> Self {
        ImageSource::Icon(Icon::Arrow)
    }
}

impl From<&str> for ImageSource {
    fn from(url: &str) -> Self {
        ImageSource::Url(url.to_string())
    }
}

impl From<String> for ImageSource {
    fn from(url: String) -> Self {
        ImageSource::Url(url)
    }
}

impl From<Icon> for ImageSource {
    fn from(icon: Icon) -> Self {
        ImageSource::Icon(icon)
    }
}
