//! Builder-style configuration for panoramas and the viewer.

use crate::infospot::INFOSPOT_ANIMATION_DURATION;
use crate::texture::ImageSource;
use std::time::Duration;

/// Per-panorama settings.
///
/// ```
/// use panowalk::PanoramaConfig;
/// use std::time::Duration;
///
/// let config = PanoramaConfig::new()
///     .animation_duration(Duration::from_millis(600))
///     .linking_image("door.png", 500.0);
/// assert_eq!(config.linking_image_scale, Some(500.0));
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct PanoramaConfig {
    /// Length of the enter/leave transitions and the default fade.
    pub animation_duration: Duration,
    /// Show/hide fade length of infospots created by `link`.
    pub infospot_animation_duration: Duration,
    /// Image for infospots that link *to* this panorama.
    pub linking_image: Option<ImageSource>,
    /// Scale for infospots that link *to* this panorama.
    pub linking_image_scale: Option<f32>,
    /// Radius of the generated sphere.
    pub radius: f32,
}

impl Default for PanoramaConfig {
    fn default() -> Self {
        Self {
            animation_duration: Duration::from_millis(1000),
            infospot_animation_duration: INFOSPOT_ANIMATION_DURATION,
            linking_image: None,
            linking_image_scale: None,
            radius: 5000.0,
        }
    }
}

impl PanoramaConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn animation_duration(mut self, duration: Duration) -> Self {
        self.animation_duration = duration;
        self
    }

    pub fn infospot_animation_duration(mut self, duration: Duration) -> Self {
        self.infospot_animation_duration = duration;
        self
    }

    pub fn linking_image(mut self, image: impl Into<ImageSource>, scale: f32) -> Self {
        self.linking_image = Some(image.into());
        self.linking_image_scale = Some(scale);
        self
    }

    pub fn radius(mut self, radius: f32) -> Self {
        self.radius = radius;
        self
    }
}

/// Viewer settings.
#[derive(Clone, Debug, PartialEq)]
pub struct ViewerConfig {
    pub width: f32,
    pub height: f32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

impl ViewerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(mut self, width: f32, height: f32) -> Self {
        self.width = width;
        self.height = height;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PanoramaConfig::default();
        assert_eq!(config.animation_duration, Duration::from_millis(1000));
        assert_eq!(config.infospot_animation_duration, Duration::from_millis(500));
        assert_eq!(config.linking_image, None);
        assert_eq!(config.radius, 5000.0);

        let viewer = ViewerConfig::default();
        assert_eq!((viewer.width, viewer.height), (800.0, 600.0));
    }

    #[test]
    fn builder_overrides() {
        let config = PanoramaConfig::new()
            .radius(10.0)
            .infospot_animation_duration(Duration::ZERO)
            .linking_image("x.png", 2.0);
        assert_eq!(config.radius, 10.0);
        assert_eq!(config.infospot_animation_duration, Duration::ZERO);
        assert_eq!(config.linking_image, Some(ImageSource::from("x.png")));

        assert_eq!(ViewerConfig::new().size(1920.0, 1080.0).width, 1920.0);
    }
}
