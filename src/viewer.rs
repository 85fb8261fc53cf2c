//! The viewer: owns the scene, switches between panoramas and serves their
//! controller requests.

use crate::config::ViewerConfig;
use crate::dispose::Disposal;
use crate::event::{Container, EventBus, ListenerId, PanoramaEvent, ViewerRequest};
use crate::graph::SceneGraph;
use crate::infospot::Infospot;
use crate::loader::{ImageLoader, LoadEvent, LoadTicket};
use crate::mesh::Transform;
use crate::panorama::{ImageQuality, LinkTarget, Panorama, PanoramaId};
use crate::texture::ImageSource;
use crate::tween::{Easing, Tween};
use glam::Vec3;
use hecs::Entity;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

type Inbox = Rc<RefCell<VecDeque<(PanoramaId, PanoramaEvent)>>>;

/// Stores panoramas and handles switching between them.
///
/// The viewer is responsible for:
/// - Owning the [`SceneGraph`] every panorama lives in
/// - Tracking the active panorama
/// - Serving `ViewerHandler` requests (switch, camera focus, dispose cleanup)
/// - Handing loaded icon textures to linked infospots
///
/// Panorama events are collected while panoramas update and re-published,
/// tagged with their source, to viewer subscribers.
pub struct Viewer {
    scene: SceneGraph,
    root: Entity,
    loader: Rc<RefCell<ImageLoader>>,

    panoramas: HashMap<PanoramaId, Panorama>,
    /// Insertion order, so updates are deterministic.
    order: Vec<PanoramaId>,
    active: Option<PanoramaId>,

    container: Container,
    inbox: Inbox,
    listeners: EventBus<(PanoramaId, PanoramaEvent)>,

    /// Infospot textures waiting on the loader.
    pending_icons: Vec<(Entity, LoadTicket)>,
    /// Loader cache entries owned by each panorama.
    cache_keys: HashMap<PanoramaId, String>,

    clock: Duration,
    control_center: Vec3,
    control_from: Vec3,
    control_to: Vec3,
    control_tween: Tween,
}

impl Viewer {
    pub fn new(config: ViewerConfig, loader: ImageLoader) -> Self {
        let mut scene = SceneGraph::new();
        let root = scene.spawn_named("viewer", Transform::new());

        Self {
            scene,
            root,
            loader: Rc::new(RefCell::new(loader)),
            panoramas: HashMap::new(),
            order: Vec::new(),
            active: None,
            container: Container::new(config.width, config.height),
            inbox: Rc::new(RefCell::new(VecDeque::new())),
            listeners: EventBus::new(),
            pending_icons: Vec::new(),
            cache_keys: HashMap::new(),
            clock: Duration::ZERO,
            control_center: Vec3::ZERO,
            control_from: Vec3::ZERO,
            control_to: Vec3::ZERO,
            control_tween: Tween::new(Easing::Linear),
        }
    }

    pub fn scene(&self) -> &SceneGraph {
        &self.scene
    }

    /// Mutable scene access, for building panoramas and their content.
    pub fn scene_mut(&mut self) -> &mut SceneGraph {
        &mut self.scene
    }

    /// Node every added panorama is parented to.
    pub fn root(&self) -> Entity {
        self.root
    }

    /// Shared loader, for constructing image panoramas.
    pub fn loader(&self) -> Rc<RefCell<ImageLoader>> {
        Rc::clone(&self.loader)
    }

    pub fn container(&self) -> Container {
        self.container
    }

    /// Current camera look-at target.
    pub fn control_center(&self) -> Vec3 {
        self.control_center
    }

    pub fn is_focusing(&self) -> bool {
        self.control_tween.is_playing()
    }

    /// Register a panorama and parent it under the viewer root.
    pub fn add(&mut self, mut panorama: Panorama) -> PanoramaId {
        let id = panorama.id();
        self.scene.add_child(self.root, panorama.node());
        panorama.set_container(&mut self.scene, self.container);

        let inbox = Rc::clone(&self.inbox);
        panorama.subscribe(move |event| inbox.borrow_mut().push_back((id, event.clone())));

        if let Some(key) = panorama.cache_key() {
            self.cache_keys.insert(id, key);
        }

        log::debug!("Registered {:?}", id);
        self.panoramas.insert(id, panorama);
        self.order.push(id);
        id
    }

    pub fn panorama(&self, id: PanoramaId) -> Option<&Panorama> {
        self.panoramas.get(&id)
    }

    pub fn panorama_mut(&mut self, id: PanoramaId) -> Option<&mut Panorama> {
        self.panoramas.get_mut(&id)
    }

    pub fn panorama_count(&self) -> usize {
        self.panoramas.len()
    }

    pub fn active(&self) -> Option<PanoramaId> {
        self.active
    }

    pub fn active_panorama(&self) -> Option<&Panorama> {
        self.active.and_then(|id| self.panoramas.get(&id))
    }

    /// Attach content to a registered panorama. See [`Panorama::add`].
    pub fn attach(&mut self, id: PanoramaId, child: Entity) -> Option<Entity> {
        let pano = self.panoramas.get_mut(&id)?;
        Some(pano.add(&mut self.scene, child))
    }

    /// Leave the current panorama and enter `id`.
    pub fn set_panorama(&mut self, id: PanoramaId) {
        if !self.panoramas.contains_key(&id) {
            log::warn!("Panorama {:?} not found", id);
            return;
        }
        if self.active == Some(id) {
            return;
        }

        if let Some(current) = self.active.and_then(|prev| self.panoramas.get_mut(&prev)) {
            current.on_leave(&mut self.scene);
        }
        if let Some(next) = self.panoramas.get_mut(&id) {
            next.on_enter(&mut self.scene);
        }

        log::info!("Switched to {:?}", id);
        self.active = Some(id);
    }

    /// Link `from` to `to` with an infospot at `position`, and queue its texture.
    pub fn link(
        &mut self,
        from: PanoramaId,
        to: PanoramaId,
        position: Option<Vec3>,
        scale: Option<f32>,
        image: Option<ImageSource>,
    ) -> Option<Entity> {
        let Some(target) = self.panoramas.get(&to).map(LinkTarget::from) else {
            log::warn!("Link target {:?} not found", to);
            return None;
        };
        let source = self.panoramas.get_mut(&from)?;
        let spot = source.link(&mut self.scene, target, position, scale, image)?;

        let image = self
            .scene
            .world()
            .get::<&Infospot>(spot)
            .ok()
            .map(|infospot| infospot.image().clone());
        if let Some(image) = image {
            let ticket = self.loader.borrow_mut().load(&image);
            self.pending_icons.push((spot, ticket));
        }
        Some(spot)
    }

    /// Forward a click to the active panorama. `intersects` are the nodes hit.
    pub fn click(&mut self, intersects: &[Entity]) {
        if let Some(pano) = self.active.and_then(|id| self.panoramas.get_mut(&id)) {
            pano.on_click(&mut self.scene, intersects);
        }
    }

    /// Click an infospot. Returns `false` if `entity` is not one.
    pub fn click_infospot(&mut self, entity: Entity) -> bool {
        match self.scene.world_mut().query_one_mut::<&mut Infospot>(entity) {
            Ok(spot) => {
                spot.click();
                true
            }
            Err(_) => false,
        }
    }

    /// Ask an infospot to bring itself into view.
    pub fn focus_infospot(&mut self, entity: Entity, duration: Duration, easing: Easing) -> bool {
        match self.scene.world_mut().query_one_mut::<&mut Infospot>(entity) {
            Ok(spot) => {
                spot.focus(duration, easing);
                true
            }
            Err(_) => false,
        }
    }

    /// Resize the viewport and pass the new container to every panorama.
    pub fn resize(&mut self, width: f32, height: f32) {
        self.container = Container::new(width, height);
        for pano in self.panoramas.values_mut() {
            pano.set_container(&mut self.scene, self.container);
        }
    }

    pub fn zoom_level(&self) -> ImageQuality {
        ImageQuality::for_viewport_width(self.container.width)
    }

    /// Dispose a panorama and despawn its node.
    ///
    /// Cache cleanup for its image happens on the next [`update`](Self::update),
    /// when the dispose request is served.
    pub fn dispose_panorama(&mut self, id: PanoramaId) -> Option<Disposal> {
        let mut pano = self.panoramas.remove(&id)?;
        self.order.retain(|other| *other != id);
        if self.active == Some(id) {
            self.active = None;
        }

        let report = pano.dispose(&mut self.scene);
        self.scene.despawn(pano.node());
        report
    }

    /// Subscribe to events from every registered panorama.
    pub fn subscribe<F>(&mut self, mut listener: F) -> ListenerId
    where
        F: FnMut(PanoramaId, &PanoramaEvent) + 'static,
    {
        self.listeners
            .subscribe(move |(id, event): &(PanoramaId, PanoramaEvent)| listener(*id, event))
    }

    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    /// Advance every panorama by `dt` and serve the requests they raised.
    pub fn update(&mut self, dt: Duration) {
        self.clock += dt;

        for id in &self.order {
            if let Some(pano) = self.panoramas.get_mut(id) {
                pano.update(&mut self.scene, dt);
            }
        }

        self.deliver_icons();

        loop {
            let next = self.inbox.borrow_mut().pop_front();
            let Some((id, event)) = next else {
                break;
            };
            if let PanoramaEvent::ViewerHandler(request) = &event {
                self.handle_request(request.clone());
            }
            self.listeners.emit((id, event));
        }

        let step = self.control_tween.update(self.clock);
        if let Some(t) = step.value {
            self.control_center = self.control_from.lerp(self.control_to, t);
        }
    }

    fn handle_request(&mut self, request: ViewerRequest) {
        match request {
            ViewerRequest::SetPanorama(id) => self.set_panorama(id),
            ViewerRequest::TweenControlCenter {
                target,
                duration,
                easing,
            } => {
                self.control_from = self.control_center;
                self.control_to = target;
                self.control_tween
                    .easing(easing)
                    .to(1.0, duration)
                    .start(0.0, self.clock);
            }
            ViewerRequest::OnPanoramaDispose(id) => {
                if let Some(key) = self.cache_keys.remove(&id) {
                    self.loader.borrow_mut().evict(&key);
                    log::debug!("Evicted '{}' for {:?}", key, id);
                }
            }
        }
    }

    fn deliver_icons(&mut self) {
        let pending = std::mem::take(&mut self.pending_icons);
        for (spot, ticket) in pending {
            let events = self.loader.borrow_mut().poll(ticket);
            if events.is_empty() && self.loader.borrow().is_pending(ticket) {
                self.pending_icons.push((spot, ticket));
                continue;
            }

            for event in events {
                match event {
                    LoadEvent::Loaded(asset) => {
                        if let Ok(infospot) =
                            self.scene.world_mut().query_one_mut::<&mut Infospot>(spot)
                        {
                            infospot.set_texture(asset);
                        }
                    }
                    LoadEvent::Failed(error) => {
                        log::warn!("Infospot texture failed to load: {}", error)
                    }
                    LoadEvent::Progress(_) => {}
                }
            }
        }
    }
}

impl std::fmt::Debug for Viewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Viewer")
            .field("panoramas", &self.order)
            .field("active", &self.active)
            .field("container", &self.container)
            .field("control_center", &self.control_center)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PanoramaConfig;
    use crate::loader::{AssetCache, MemoryFetcher};
    use image::{ImageFormat, RgbaImage};
    use std::io::Cursor;

    const FRAME: Duration = Duration::from_millis(16);

    fn png() -> Vec<u8> {
        let img = RgbaImage::from_pixel(2, 2, image::Rgba([9, 9, 9, 255]));
        let mut bytes = Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    fn viewer() -> Viewer {
        let fetcher = MemoryFetcher::new()
            .with("a.png", png())
            .with("b.png", png());
        Viewer::new(ViewerConfig::new(), ImageLoader::new(fetcher, AssetCache::new()))
    }

    fn image_pano(viewer: &mut Viewer, url: &str) -> PanoramaId {
        let loader = viewer.loader();
        let pano = Panorama::image(viewer.scene_mut(), url, loader, PanoramaConfig::new());
        viewer.add(pano)
    }

    fn run(viewer: &mut Viewer, total: Duration) {
        let mut elapsed = Duration::ZERO;
        while elapsed < total {
            viewer.update(FRAME);
            elapsed += FRAME;
        }
    }

    #[test]
    fn add_parents_and_propagates_container() {
        let mut viewer = viewer();
        let id = image_pano(&mut viewer, "a.png");

        assert_eq!(viewer.scene().parent(id.node()), Some(viewer.root()));
        assert_eq!(
            viewer.panorama(id).unwrap().container(),
            Some(Container::new(800.0, 600.0))
        );
        assert_eq!(viewer.panorama_count(), 1);
    }

    #[test]
    fn set_panorama_leaves_previous() {
        let mut viewer = viewer();
        let a = image_pano(&mut viewer, "a.png");
        let b = image_pano(&mut viewer, "b.png");

        viewer.set_panorama(a);
        run(&mut viewer, Duration::from_millis(2500));
        assert!(viewer.panorama(a).unwrap().is_visible(viewer.scene()));

        viewer.set_panorama(b);
        assert!(!viewer.panorama(a).unwrap().is_active());
        assert!(viewer.panorama(b).unwrap().is_active());

        run(&mut viewer, Duration::from_millis(2500));
        assert!(!viewer.panorama(a).unwrap().is_visible(viewer.scene()));
        assert!(viewer.panorama(b).unwrap().is_visible(viewer.scene()));
        assert_eq!(viewer.active(), Some(b));
    }

    #[test]
    fn clicking_a_link_switches_panorama() {
        let mut viewer = viewer();
        let a = image_pano(&mut viewer, "a.png");
        let b = image_pano(&mut viewer, "b.png");
        let spot = viewer.link(a, b, Some(Vec3::new(0.0, 0.0, -100.0)), None, None).unwrap();

        viewer.set_panorama(a);
        run(&mut viewer, Duration::from_millis(2500));

        let textured = viewer
            .scene()
            .world()
            .get::<&Infospot>(spot)
            .unwrap()
            .material()
            .map
            .is_some();
        assert!(textured);

        assert!(viewer.click_infospot(spot));
        viewer.update(FRAME);
        assert_eq!(viewer.active(), Some(b));
    }

    #[test]
    fn focus_request_moves_control_center() {
        let mut viewer = viewer();
        let a = image_pano(&mut viewer, "a.png");
        let spot = Infospot::spawn(viewer.scene_mut(), 1.0, ImageSource::from("a.png"));
        viewer
            .scene_mut()
            .set_transform(spot, Transform::from_position(Vec3::new(5.0, 0.0, 0.0)));
        assert_eq!(viewer.attach(a, spot), Some(spot));

        assert!(viewer.focus_infospot(spot, Duration::from_millis(100), Easing::Linear));
        viewer.update(FRAME);
        assert!(viewer.is_focusing());

        run(&mut viewer, Duration::from_millis(200));
        assert_eq!(viewer.control_center(), Vec3::new(-5.0, 0.0, 0.0));
    }

    #[test]
    fn resize_changes_zoom_level() {
        let mut viewer = viewer();
        let a = image_pano(&mut viewer, "a.png");
        assert_eq!(viewer.zoom_level(), ImageQuality::Fair);

        viewer.resize(2560.0, 1440.0);
        assert_eq!(viewer.zoom_level(), ImageQuality::SuperHigh);
        assert_eq!(viewer.panorama(a).unwrap().zoom_level(), ImageQuality::SuperHigh);
    }

    #[test]
    fn dispose_evicts_cached_image() {
        let mut viewer = viewer();
        let a = image_pano(&mut viewer, "a.png");
        viewer.set_panorama(a);
        run(&mut viewer, Duration::from_millis(100));
        assert!(viewer.loader().borrow().cache().contains("a.png"));

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        viewer.subscribe(move |id, event| sink.borrow_mut().push((id, event.name())));

        assert!(viewer.dispose_panorama(a).is_some());
        assert_eq!(viewer.active(), None);
        assert!(!viewer.scene().contains(a.node()));

        viewer.update(FRAME);
        assert!(!viewer.loader().borrow().cache().contains("a.png"));
        assert_eq!(seen.borrow().as_slice(), &[(a, "viewer-handler")]);
        assert!(viewer.dispose_panorama(a).is_none());
    }

    #[test]
    fn subscribers_see_tagged_events() {
        let mut viewer = viewer();
        let a = image_pano(&mut viewer, "a.png");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        viewer.subscribe(move |id, event| sink.borrow_mut().push((id, event.name())));

        viewer.set_panorama(a);
        viewer.update(FRAME);

        let seen = seen.borrow();
        assert_eq!(seen[0], (a, "enter"));
        assert!(seen.iter().all(|(id, _)| *id == a));
    }

    #[test]
    fn unknown_panorama_is_ignored() {
        let mut viewer = viewer();
        let a = image_pano(&mut viewer, "a.png");
        viewer.dispose_panorama(a);

        viewer.set_panorama(a);
        assert_eq!(viewer.active(), None);
        assert_eq!(viewer.link(a, a, Some(Vec3::Z), None, None), None);
    }
}
