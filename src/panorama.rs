//! The panorama scene node and its transition state machines.
//!
//! A [`Panorama`] owns a node in a [`SceneGraph`], the sphere mesh drawn on it,
//! and the infospots attached below it. Two layers of timed transitions run
//! on it, both advanced by [`Panorama::update`]:
//!
//! - **Enter / leave**: pure timers. Starting one stops the other. Their start
//!   handlers kick off loading, fading and infospot choreography.
//! - **Fade in / fade out**: opacity tweens on the material. Starting one stops
//!   the other; the most recent request always wins.
//!
//! Everything a panorama wants the outside world to know is published on its
//! [`EventBus`] as a [`PanoramaEvent`]. Requests aimed at the controller (switch
//! panorama, focus the camera, clean up on dispose) travel as
//! [`PanoramaEvent::ViewerHandler`].
//!
//! # Example
//!
//! ```
//! use panowalk::*;
//! use std::time::Duration;
//!
//! let mut scene = SceneGraph::new();
//! let mut pano = Panorama::empty(&mut scene, PanoramaConfig::new());
//!
//! pano.on_enter(&mut scene);
//! for _ in 0..100 {
//!     pano.update(&mut scene, Duration::from_millis(16));
//! }
//!
//! assert!(pano.is_loaded());
//! assert!(pano.is_active());
//! assert_eq!(pano.opacity(), 1.0);
//! ```

use crate::config::PanoramaConfig;
use crate::dispose::{Disposal, dispose_subtree};
use crate::event::{
    Container, EventBus, InfospotRequest, ListenerId, NodeEvent, PanoramaEvent, Progress,
    ViewerRequest,
};
use crate::graph::{Node, SceneGraph};
use crate::infospot::Infospot;
use crate::loader::{ImageLoader, LoadError, LoadEvent, LoadTicket};
use crate::mesh::{Geometry, Material, MeshResources, Side, Transform};
use crate::texture::{Icon, ImageAsset, ImageSource};
use crate::tween::{Easing, Tween};
use glam::Vec3;
use hecs::Entity;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

/// Infospot scale used by [`Panorama::link`] when nothing else is configured.
pub const DEFAULT_LINK_SCALE: f32 = 300.0;

/// Identifies a panorama by the scene node it owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PanoramaId(Entity);

impl PanoramaId {
    /// The panorama's scene node.
    pub fn node(&self) -> Entity {
        self.0
    }
}

/// Image resolution tiers picked from the viewport width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ImageQuality {
    Low = 1,
    Fair = 2,
    Medium = 3,
    High = 4,
    SuperHigh = 5,
}

impl ImageQuality {
    /// Breakpoints at 800, 1280 and 1920 pixels. Non-positive widths map to `Low`.
    pub fn for_viewport_width(width: f32) -> Self {
        if width > 0.0 && width <= 800.0 {
            ImageQuality::Fair
        } else if width > 800.0 && width <= 1280.0 {
            ImageQuality::Medium
        } else if width > 1280.0 && width <= 1920.0 {
            ImageQuality::High
        } else if width > 1920.0 {
            ImageQuality::SuperHigh
        } else {
            ImageQuality::Low
        }
    }

    /// Ordinal level, 1 (`Low`) through 5 (`SuperHigh`).
    pub fn level(&self) -> u8 {
        *self as u8
    }
}

/// What [`Panorama::link`] needs to know about the destination.
#[derive(Clone, Debug, PartialEq)]
pub struct LinkTarget {
    pub id: PanoramaId,
    /// Destination's preferred infospot image.
    pub image: Option<ImageSource>,
    /// Destination's preferred infospot scale.
    pub scale: Option<f32>,
}

impl From<&Panorama> for LinkTarget {
    fn from(pano: &Panorama) -> Self {
        Self {
            id: pano.id(),
            image: pano.linking_image().cloned(),
            scale: pano.linking_image_scale(),
        }
    }
}

/// Image content fetched through a shared loader.
#[derive(Debug)]
pub struct ImageBackdrop {
    source: ImageSource,
    loader: Rc<RefCell<ImageLoader>>,
    ticket: Option<LoadTicket>,
}

impl ImageBackdrop {
    fn request(&mut self) {
        if self.ticket.is_none() {
            self.ticket = Some(self.loader.borrow_mut().load(&self.source));
        }
    }

    fn poll(&mut self) -> Vec<LoadEvent> {
        match self.ticket.take() {
            Some(ticket) => self.loader.borrow_mut().poll(ticket),
            None => Vec::new(),
        }
    }

    fn cancel(&mut self) {
        if let Some(ticket) = self.ticket.take() {
            self.loader.borrow_mut().cancel(ticket);
        }
    }
}

/// What a panorama displays and how it gets it.
#[derive(Debug)]
pub enum Backdrop {
    /// Nothing to fetch; `load` completes immediately.
    Empty,
    Image(ImageBackdrop),
}

/// One navigable 360° viewpoint.
#[derive(Debug)]
pub struct Panorama {
    id: PanoramaId,
    mesh: MeshResources,
    config: PanoramaConfig,
    backdrop: Backdrop,
    loaded: bool,
    active: bool,
    infospot_visible: bool,
    linked_spots: Vec<Entity>,
    container: Option<Container>,
    clock: Duration,
    fade_in: Tween,
    fade_out: Tween,
    enter: Tween,
    leave: Tween,
    infospot_animation: Tween,
    infospot_animation_visible: bool,
    events: EventBus<PanoramaEvent>,
    disposed: bool,
}

impl Panorama {
    /// Create a panorama from caller-supplied geometry and material.
    pub fn new(
        scene: &mut SceneGraph,
        geometry: Geometry,
        material: Material,
        config: PanoramaConfig,
    ) -> Self {
        Self::with_backdrop(
            scene,
            MeshResources::new(geometry, material),
            Backdrop::Empty,
            config,
        )
    }

    /// A sphere with nothing to load.
    pub fn empty(scene: &mut SceneGraph, config: PanoramaConfig) -> Self {
        let geometry = Geometry::sphere(config.radius, 60, 40);
        Self::new(scene, geometry, Material::basic(), config)
    }

    /// A sphere textured with an image fetched by `loader`.
    pub fn image(
        scene: &mut SceneGraph,
        source: impl Into<ImageSource>,
        loader: Rc<RefCell<ImageLoader>>,
        config: PanoramaConfig,
    ) -> Self {
        let mesh = MeshResources::new(Geometry::sphere(config.radius, 60, 40), Material::basic());
        let backdrop = Backdrop::Image(ImageBackdrop {
            source: source.into(),
            loader,
            ticket: None,
        });
        Self::with_backdrop(scene, mesh, backdrop, config)
    }

    fn with_backdrop(
        scene: &mut SceneGraph,
        mut mesh: MeshResources,
        backdrop: Backdrop,
        config: PanoramaConfig,
    ) -> Self {
        mesh.material.side = Side::Back;
        mesh.material.transparent = true;
        mesh.material.set_opacity(0.0);

        let mut node = Node::new(Some("panorama".to_string()));
        node.visible = false;
        node.render_order = -1;
        let entity = scene
            .world_mut()
            .spawn((node, Transform::new().scale(Vec3::new(-1.0, 1.0, 1.0))));

        Self {
            id: PanoramaId(entity),
            mesh,
            config,
            backdrop,
            loaded: false,
            active: false,
            infospot_visible: false,
            linked_spots: Vec::new(),
            container: None,
            clock: Duration::ZERO,
            fade_in: Tween::new(Easing::QuarticOut),
            fade_out: Tween::new(Easing::QuarticOut),
            enter: Tween::new(Easing::QuarticOut),
            leave: Tween::new(Easing::QuarticOut),
            infospot_animation: Tween::new(Easing::Linear),
            infospot_animation_visible: false,
            events: EventBus::new(),
            disposed: false,
        }
    }

    pub fn id(&self) -> PanoramaId {
        self.id
    }

    pub fn node(&self) -> Entity {
        self.id.0
    }

    pub fn config(&self) -> &PanoramaConfig {
        &self.config
    }

    pub fn geometry(&self) -> &Geometry {
        &self.mesh.geometry
    }

    pub fn material(&self) -> &Material {
        &self.mesh.material
    }

    pub fn material_mut(&mut self) -> &mut Material {
        &mut self.mesh.material
    }

    pub fn opacity(&self) -> f32 {
        self.mesh.material.opacity
    }

    pub fn is_visible(&self, scene: &SceneGraph) -> bool {
        scene.is_visible(self.node())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn is_infospot_visible(&self) -> bool {
        self.infospot_visible
    }

    pub fn is_fading_in(&self) -> bool {
        self.fade_in.is_playing()
    }

    pub fn is_fading_out(&self) -> bool {
        self.fade_out.is_playing()
    }

    pub fn is_entering(&self) -> bool {
        self.enter.is_playing()
    }

    pub fn is_leaving(&self) -> bool {
        self.leave.is_playing()
    }

    /// Infospots created by [`link`](Self::link), in creation order.
    pub fn linked_spots(&self) -> &[Entity] {
        &self.linked_spots
    }

    pub fn container(&self) -> Option<Container> {
        self.container
    }

    pub fn linking_image(&self) -> Option<&ImageSource> {
        self.config.linking_image.as_ref()
    }

    pub fn linking_image_scale(&self) -> Option<f32> {
        self.config.linking_image_scale
    }

    /// Cache key of the image this panorama loads, if any.
    pub fn cache_key(&self) -> Option<String> {
        match &self.backdrop {
            Backdrop::Image(image) => Some(image.source.cache_key().to_string()),
            Backdrop::Empty => None,
        }
    }

    /// Register a listener for this panorama's events.
    pub fn subscribe<F: FnMut(&PanoramaEvent) + 'static>(&mut self, listener: F) -> ListenerId {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.events.unsubscribe(id)
    }

    fn emit(&mut self, event: PanoramaEvent) {
        log::trace!("{:?} emits {}", self.id, event.name());
        self.events.emit(event);
    }

    /// Attach a node below this panorama.
    ///
    /// Infospots are attached directly: they receive the container handle if
    /// one is known, and their focus requests get relayed to the viewer. Any
    /// other node is first wrapped in an inverted-x [`ScaleAdapter`] so the
    /// panorama's mirroring does not flip it.
    ///
    /// Returns the node actually parented to the panorama.
    ///
    /// [`ScaleAdapter`]: crate::ScaleAdapter
    pub fn add(&mut self, scene: &mut SceneGraph, child: Entity) -> Entity {
        let attached = if scene.is_infospot(child) {
            if let Ok(spot) = scene.world_mut().query_one_mut::<&mut Infospot>(child) {
                spot.enable_relay();
            }
            if let Some(container) = self.container {
                scene.dispatch(child, NodeEvent::Container(container));
            }
            child
        } else {
            scene.wrap_inverted(child)
        };

        scene.add_child(self.node(), attached);
        attached
    }

    /// [`add`](Self::add) several nodes in order.
    pub fn add_all(
        &mut self,
        scene: &mut SceneGraph,
        children: impl IntoIterator<Item = Entity>,
    ) -> Vec<Entity> {
        children
            .into_iter()
            .map(|child| self.add(scene, child))
            .collect()
    }

    /// Start loading the panorama's content.
    ///
    /// Without a backdrop to fetch this completes immediately. Image panoramas
    /// complete once the loader delivers, observed during [`update`](Self::update).
    pub fn load(&mut self) {
        match self.backdrop {
            Backdrop::Empty => self.on_load(),
            Backdrop::Image(ref mut image) => image.request(),
        }
    }

    /// Mark the panorama loaded, publish `Load` and fade in.
    pub fn on_load(&mut self) {
        log::debug!("{:?} loaded", self.id);
        self.loaded = true;
        self.emit(PanoramaEvent::Load);
        self.fade_in(None);
    }

    pub fn on_progress(&mut self, progress: Progress) {
        self.emit(PanoramaEvent::Progress(progress));
    }

    pub fn on_error(&mut self, error: Arc<LoadError>) {
        log::warn!("{:?} failed to load: {}", self.id, error);
        self.emit(PanoramaEvent::Error(error));
    }

    fn poll_backdrop(&mut self) {
        let events = match self.backdrop {
            Backdrop::Image(ref mut image) => image.poll(),
            Backdrop::Empty => return,
        };

        for event in events {
            match event {
                LoadEvent::Progress(progress) => self.on_progress(progress),
                LoadEvent::Loaded(asset) => {
                    self.update_texture(asset);
                    self.on_load();
                }
                LoadEvent::Failed(error) => self.on_error(error),
            }
        }
    }

    /// Resolution tier for the current container width.
    pub fn zoom_level(&self) -> ImageQuality {
        let width = self.container.map(|c| c.width).unwrap_or(0.0);
        ImageQuality::for_viewport_width(width)
    }

    /// Replace the texture shown on the sphere.
    pub fn update_texture(&mut self, texture: Arc<ImageAsset>) {
        self.mesh.material.set_map(texture);
    }

    /// Store the container handle and pass it to every infospot child.
    pub fn set_container(&mut self, scene: &mut SceneGraph, container: Container) {
        for child in scene.children(self.node()) {
            if scene.is_infospot(child) {
                scene.dispatch(child, NodeEvent::Container(container));
            }
        }
        self.container = Some(container);
    }

    /// Handle a click on this panorama.
    ///
    /// A click that hit nothing dismisses every node in the subtree.
    pub fn on_click(&mut self, scene: &mut SceneGraph, intersects: &[Entity]) {
        if !intersects.is_empty() {
            return;
        }
        for entity in scene.descendants(self.node()) {
            scene.dispatch(entity, NodeEvent::Dismiss);
        }
    }

    /// Show or hide every infospot in the subtree.
    ///
    /// `None` inverts the current state. `InfospotAnimationComplete` is
    /// published once `delay` plus half the animation duration has elapsed.
    pub fn toggle_infospot_visibility(
        &mut self,
        scene: &mut SceneGraph,
        visible: Option<bool>,
        delay: Duration,
    ) {
        let visible = visible.unwrap_or(!self.infospot_visible);

        for entity in scene.descendants(self.node()) {
            if let Ok(spot) = scene.world_mut().query_one_mut::<&mut Infospot>(entity) {
                if visible {
                    spot.show(delay);
                } else {
                    spot.hide(delay);
                }
            }
        }

        self.infospot_visible = visible;
        self.infospot_animation_visible = visible;
        self.infospot_animation
            .to(0.0, self.config.animation_duration / 2)
            .delay(delay)
            .start(0.0, self.clock);
    }

    /// Set the image and scale used by infospots that link *to* this panorama.
    pub fn set_linking_image(&mut self, image: Option<ImageSource>, scale: Option<f32>) {
        self.config.linking_image = image;
        self.config.linking_image_scale = scale;
    }

    /// Create an infospot at `position` that switches to `target` when clicked.
    ///
    /// Scale falls back to the target's linking scale, then
    /// [`DEFAULT_LINK_SCALE`]; image falls back to the target's linking image,
    /// then the built-in arrow. Without a position nothing happens and a
    /// warning is logged.
    pub fn link(
        &mut self,
        scene: &mut SceneGraph,
        target: impl Into<LinkTarget>,
        position: Option<Vec3>,
        scale: Option<f32>,
        image: Option<ImageSource>,
    ) -> Option<Entity> {
        let Some(position) = position else {
            log::warn!("Please specify infospot position for linking");
            return None;
        };
        if self.disposed {
            log::warn!("Cannot link from disposed panorama {:?}", self.id);
            return None;
        }

        let target = target.into();
        let scale = scale.or(target.scale).unwrap_or(DEFAULT_LINK_SCALE);
        let image = image
            .or(target.image)
            .unwrap_or(ImageSource::Icon(Icon::Arrow));

        let mut spot = Infospot::new(scale, image)
            .with_animation_duration(self.config.infospot_animation_duration);
        spot.set_to_panorama(target.id);

        let entity = Infospot::spawn_with(scene, spot);
        if let Some(transform) = scene.transform(entity) {
            scene.set_transform(entity, transform.position(position));
        }

        self.linked_spots.push(entity);

        // Attach while visible; restore the flag afterwards.
        let node = self.node();
        let was_visible = scene.is_visible(node);
        scene.set_visible(node, true);
        self.add(scene, entity);
        scene.set_visible(node, was_visible);

        Some(entity)
    }

    /// Detach every child without disposing anything.
    pub fn reset(&mut self, scene: &mut SceneGraph) {
        for child in scene.children(self.node()) {
            scene.detach(child);
        }
        self.linked_spots.clear();
    }

    /// Fade the material in over `duration` (default: the configured animation duration).
    pub fn fade_in(&mut self, duration: Option<Duration>) {
        let duration = duration.unwrap_or(self.config.animation_duration);
        self.fade_out.stop();
        self.fade_in
            .to(1.0, duration)
            .start(self.mesh.material.opacity, self.clock);
    }

    /// Fade the material out over `duration` (default: the configured animation duration).
    pub fn fade_out(&mut self, duration: Option<Duration>) {
        let duration = duration.unwrap_or(self.config.animation_duration);
        self.fade_in.stop();
        self.fade_out
            .to(0.0, duration)
            .start(self.mesh.material.opacity, self.clock);
    }

    /// Make this the entered panorama.
    ///
    /// `Enter` is published and children are notified right away. Loading or
    /// fading in starts on the next [`update`](Self::update).
    pub fn on_enter(&mut self, scene: &mut SceneGraph) {
        if self.disposed {
            log::warn!("Cannot enter disposed panorama {:?}", self.id);
            return;
        }
        log::debug!("Entering {:?}", self.id);

        self.leave.stop();
        self.enter
            .to(0.0, self.config.animation_duration)
            .start(0.0, self.clock);

        self.emit(PanoramaEvent::Enter);
        for child in scene.children(self.node()) {
            scene.dispatch(child, NodeEvent::PanoramaEnter);
        }
        self.active = true;
    }

    /// Leave this panorama.
    ///
    /// `Leave` is published and children are notified right away. The fade out
    /// and infospot hiding start on the next [`update`](Self::update).
    pub fn on_leave(&mut self, scene: &mut SceneGraph) {
        if self.disposed {
            return;
        }
        log::debug!("Leaving {:?}", self.id);

        self.enter.stop();
        self.leave
            .to(0.0, self.config.animation_duration)
            .start(0.0, self.clock);

        self.emit(PanoramaEvent::Leave);
        for child in scene.children(self.node()) {
            scene.dispatch(child, NodeEvent::PanoramaLeave);
        }
        self.active = false;
    }

    /// Advance every animation by `dt` and relay infospot requests.
    pub fn update(&mut self, scene: &mut SceneGraph, dt: Duration) {
        if self.disposed {
            return;
        }
        self.clock += dt;
        let now = self.clock;
        let node = self.node();

        for entity in scene.descendants(node) {
            if let Ok((spot_node, spot)) = scene
                .world_mut()
                .query_one_mut::<(&mut Node, &mut Infospot)>(entity)
            {
                spot.update(dt, spot_node);
            }
        }

        self.poll_backdrop();

        let step = self.enter.update(now);
        if step.started {
            self.emit(PanoramaEvent::EnterAnimationStart);
            if self.loaded {
                self.fade_in(Some(self.enter.duration()));
            } else {
                self.load();
            }
        }
        if step.completed {
            self.emit(PanoramaEvent::EnterAnimationComplete);
        }

        let step = self.leave.update(now);
        if step.started {
            self.emit(PanoramaEvent::LeaveAnimationStart);
            self.fade_out(Some(self.leave.duration()));
            self.toggle_infospot_visibility(scene, Some(false), Duration::ZERO);
        }

        let step = self.fade_in.update(now);
        if step.started {
            scene.set_visible(node, true);
            self.emit(PanoramaEvent::EnterFadeStart);
        }
        if let Some(opacity) = step.value {
            self.mesh.material.set_opacity(opacity);
        }
        if step.completed {
            let delay = self.fade_in.duration() / 2;
            self.toggle_infospot_visibility(scene, Some(true), delay);
            self.emit(PanoramaEvent::EnterFadeComplete);
        }

        let step = self.fade_out.update(now);
        if let Some(opacity) = step.value {
            self.mesh.material.set_opacity(opacity);
        }
        if step.completed {
            scene.set_visible(node, false);
            self.emit(PanoramaEvent::LeaveComplete);
        }

        let step = self.infospot_animation.update(now);
        if step.completed {
            let visible = self.infospot_animation_visible;
            self.emit(PanoramaEvent::InfospotAnimationComplete { visible });
        }

        self.relay_requests(scene);
    }

    /// Turn queued infospot clicks and focus requests into viewer requests.
    ///
    /// Only direct infospot children are relayed. Requests queued by spots
    /// nested deeper are drained and dropped.
    pub fn relay_requests(&mut self, scene: &mut SceneGraph) {
        let node = self.node();
        for child in scene.descendants(node) {
            let direct = scene.parent(child) == Some(node);
            let (requests, destination) =
                match scene.world_mut().query_one_mut::<&mut Infospot>(child) {
                    Ok(spot) => (spot.take_requests(), spot.to_panorama()),
                    Err(_) => continue,
                };
            if !direct {
                if !requests.is_empty() {
                    log::trace!("Dropping {} requests from nested {:?}", requests.len(), child);
                }
                continue;
            }

            for request in requests {
                match request {
                    InfospotRequest::Click => {
                        if let Some(destination) = destination {
                            if self.linked_spots.contains(&child) {
                                self.emit(PanoramaEvent::ViewerHandler(
                                    ViewerRequest::SetPanorama(destination),
                                ));
                            }
                        }
                    }
                    InfospotRequest::Focus { duration, easing } => {
                        let target = scene.world_position(child);
                        self.emit(PanoramaEvent::ViewerHandler(
                            ViewerRequest::TweenControlCenter {
                                target,
                                duration,
                                easing,
                            },
                        ));
                    }
                }
            }
        }
    }

    /// Tear down the panorama and everything below it.
    ///
    /// Publishes an `OnPanoramaDispose` viewer request first, then releases
    /// every descendant and this panorama's own mesh, and detaches the
    /// panorama node from its parent. The panorama must not be used afterwards;
    /// a second call logs a warning and returns `None`.
    pub fn dispose(&mut self, scene: &mut SceneGraph) -> Option<Disposal> {
        if self.disposed {
            log::warn!("{:?} is already disposed", self.id);
            return None;
        }
        log::debug!("Disposing {:?}", self.id);

        self.emit(PanoramaEvent::ViewerHandler(
            ViewerRequest::OnPanoramaDispose(self.id),
        ));

        for tween in [
            &mut self.enter,
            &mut self.leave,
            &mut self.fade_in,
            &mut self.fade_out,
            &mut self.infospot_animation,
        ] {
            tween.stop();
        }
        if let Backdrop::Image(ref mut image) = self.backdrop {
            image.cancel();
        }

        let mut report = dispose_subtree(scene, self.node());
        self.mesh.dispose();
        report.released += 1;
        scene.detach(self.node());

        self.linked_spots.clear();
        self.active = false;
        self.disposed = true;
        Some(report)
    }
}
