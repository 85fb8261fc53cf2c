//! Navigation markers placed inside a panorama.
//!
//! An [`Infospot`] is a component on a scene node. Its parent panorama drives
//! its visibility ([`show`](Infospot::show) / [`hide`](Infospot::hide)) and
//! relays the requests it queues ([`click`](Infospot::click),
//! [`focus`](Infospot::focus)) to the viewer.

use crate::event::{Container, InfospotRequest, NodeEvent};
use crate::graph::{Node, SceneGraph};
use crate::mesh::{Material, Transform};
use crate::panorama::PanoramaId;
use crate::texture::{ImageAsset, ImageSource};
use crate::tween::{Easing, Tween};
use glam::Vec3;
use hecs::Entity;
use std::sync::Arc;
use std::time::Duration;

/// Default duration of the show/hide fades.
pub const INFOSPOT_ANIMATION_DURATION: Duration = Duration::from_millis(500);

/// A clickable marker, optionally linking to another panorama.
#[derive(Debug)]
pub struct Infospot {
    scale: f32,
    image: ImageSource,
    material: Material,
    to_panorama: Option<PanoramaId>,
    container: Option<Container>,
    relay: bool,
    panorama_active: bool,
    element_locked: bool,
    shown: bool,
    clock: Duration,
    animation_duration: Duration,
    show_animation: Tween,
    hide_animation: Tween,
    requests: Vec<InfospotRequest>,
    disposed: bool,
}

impl Infospot {
    /// Create a hidden infospot.
    pub fn new(scale: f32, image: ImageSource) -> Self {
        let material = Material {
            opacity: 0.0,
            transparent: true,
            ..Material::basic()
        };

        Self {
            scale,
            image,
            material,
            to_panorama: None,
            container: None,
            relay: false,
            panorama_active: false,
            element_locked: false,
            shown: false,
            clock: Duration::ZERO,
            animation_duration: INFOSPOT_ANIMATION_DURATION,
            show_animation: Tween::new(Easing::QuarticOut),
            hide_animation: Tween::new(Easing::QuarticOut),
            requests: Vec::new(),
            disposed: false,
        }
    }

    /// Override the show/hide fade duration.
    pub fn with_animation_duration(mut self, duration: Duration) -> Self {
        self.animation_duration = duration;
        self
    }

    /// Spawn an infospot node of the given scale.
    ///
    /// The node starts hidden and parentless.
    pub fn spawn(scene: &mut SceneGraph, scale: f32, image: ImageSource) -> Entity {
        Self::spawn_with(scene, Self::new(scale, image))
    }

    /// Spawn a preconfigured infospot.
    pub fn spawn_with(scene: &mut SceneGraph, spot: Infospot) -> Entity {
        let mut node = Node::new(Some("infospot".to_string()));
        node.visible = false;
        let transform = Transform::new().scale(Vec3::new(spot.scale, spot.scale, 1.0));
        scene.world_mut().spawn((node, transform, spot))
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn image(&self) -> &ImageSource {
        &self.image
    }

    pub fn material(&self) -> &Material {
        &self.material
    }

    pub fn opacity(&self) -> f32 {
        self.material.opacity
    }

    pub fn set_texture(&mut self, texture: Arc<ImageAsset>) {
        if !self.disposed {
            self.material.set_map(texture);
        }
    }

    /// Destination panorama, if this spot is a link.
    pub fn to_panorama(&self) -> Option<PanoramaId> {
        self.to_panorama
    }

    pub(crate) fn set_to_panorama(&mut self, target: PanoramaId) {
        self.to_panorama = Some(target);
    }

    pub(crate) fn enable_relay(&mut self) {
        self.relay = true;
    }

    pub fn container(&self) -> Option<Container> {
        self.container
    }

    /// Whether the owning panorama is currently entered.
    pub fn is_panorama_active(&self) -> bool {
        self.panorama_active
    }

    /// Whether the hover element was pinned by a click and not yet dismissed.
    pub fn is_element_locked(&self) -> bool {
        self.element_locked
    }

    /// Target state of the last show/hide call.
    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn is_animating(&self) -> bool {
        self.show_animation.is_playing() || self.hide_animation.is_playing()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Fade in after `delay`. The node becomes visible when the fade starts.
    pub fn show(&mut self, delay: Duration) {
        if self.disposed {
            return;
        }
        self.hide_animation.stop();
        self.show_animation
            .to(1.0, self.animation_duration)
            .delay(delay)
            .start(self.material.opacity, self.clock);
        self.shown = true;
    }

    /// Fade out after `delay`. The node becomes invisible when the fade completes.
    pub fn hide(&mut self, delay: Duration) {
        if self.disposed {
            return;
        }
        self.show_animation.stop();
        self.hide_animation
            .to(0.0, self.animation_duration)
            .delay(delay)
            .start(self.material.opacity, self.clock);
        self.shown = false;
    }

    /// Advance the show/hide fades by `dt`.
    pub fn update(&mut self, dt: Duration, node: &mut Node) {
        self.clock += dt;

        let step = self.show_animation.update(self.clock);
        if step.started {
            node.visible = true;
        }
        if let Some(opacity) = step.value {
            self.material.set_opacity(opacity);
        }

        let step = self.hide_animation.update(self.clock);
        if let Some(opacity) = step.value {
            self.material.set_opacity(opacity);
        }
        if step.completed {
            node.visible = false;
        }
    }

    /// Pin the hover element and, for a relayed link, queue a click.
    ///
    /// Spots without a destination, or not attached through a panorama,
    /// queue nothing.
    pub fn click(&mut self) {
        if self.disposed {
            return;
        }
        self.element_locked = true;
        if self.relay && self.to_panorama.is_some() {
            self.requests.push(InfospotRequest::Click);
        }
    }

    /// Ask the viewer to turn the camera towards this spot.
    ///
    /// Dropped unless the spot was attached through a panorama, which
    /// registers the relay.
    pub fn focus(&mut self, duration: Duration, easing: Easing) {
        if self.disposed || !self.relay {
            return;
        }
        self.requests.push(InfospotRequest::Focus { duration, easing });
    }

    /// Drain queued requests.
    pub fn take_requests(&mut self) -> Vec<InfospotRequest> {
        std::mem::take(&mut self.requests)
    }

    /// React to a notification sent down by the owning panorama.
    pub fn handle(&mut self, event: &NodeEvent) {
        match event {
            NodeEvent::Container(container) => self.container = Some(*container),
            NodeEvent::PanoramaEnter => self.panorama_active = true,
            NodeEvent::PanoramaLeave => {
                self.panorama_active = false;
                self.element_locked = false;
            }
            NodeEvent::Dismiss => self.element_locked = false,
        }
    }

    /// Release the material and drop pending work. Further calls are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.show_animation.stop();
        self.hide_animation.stop();
        self.material.dispose();
        self.container = None;
        self.requests.clear();
        self.disposed = true;
    }
}
