//! Typed notifications exchanged between panoramas, their children and the viewer.
//!
//! Three directions of travel exist:
//!
//! - **Outward**: [`PanoramaEvent`]s published on a panorama's [`EventBus`],
//!   observed by the viewer or any other subscriber.
//! - **Downward**: [`NodeEvent`]s dispatched by a panorama into its subtree
//!   through [`SceneGraph::dispatch`](crate::SceneGraph::dispatch).
//! - **Upward**: [`InfospotRequest`]s queued by an infospot and relayed by its
//!   panorama as [`PanoramaEvent::ViewerHandler`] requests.

use crate::loader::LoadError;
use crate::panorama::PanoramaId;
use crate::tween::Easing;
use glam::Vec3;
use std::sync::Arc;
use std::time::Duration;

/// Handle to the surface hosting the viewer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Container {
    /// Viewport width in pixels.
    pub width: f32,
    /// Viewport height in pixels.
    pub height: f32,
}

impl Container {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// Loading progress in bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub loaded: u64,
    pub total: u64,
}

impl Progress {
    /// Fraction in `[0, 1]`; `0` when the total is unknown.
    pub fn fraction(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            (self.loaded as f32 / self.total as f32).min(1.0)
        }
    }
}

/// A request for the controller to run one of its operations.
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerRequest {
    /// Animate the camera's look-at target towards a world position.
    TweenControlCenter {
        target: Vec3,
        duration: Duration,
        easing: Easing,
    },
    /// Switch the active panorama.
    SetPanorama(PanoramaId),
    /// Release controller-owned data for a panorama being disposed.
    OnPanoramaDispose(PanoramaId),
}

/// Notifications published by a panorama.
#[derive(Clone, Debug)]
pub enum PanoramaEvent {
    Load,
    Progress(Progress),
    Error(Arc<LoadError>),
    Enter,
    EnterAnimationStart,
    EnterAnimationComplete,
    EnterFadeStart,
    EnterFadeComplete,
    Leave,
    LeaveAnimationStart,
    LeaveComplete,
    InfospotAnimationComplete { visible: bool },
    ViewerHandler(ViewerRequest),
}

impl PanoramaEvent {
    /// Stable name of the event, for logs.
    pub fn name(&self) -> &'static str {
        match self {
            PanoramaEvent::Load => "load",
            PanoramaEvent::Progress(_) => "progress",
            PanoramaEvent::Error(_) => "error",
            PanoramaEvent::Enter => "enter",
            PanoramaEvent::EnterAnimationStart => "enter-animation-start",
            PanoramaEvent::EnterAnimationComplete => "enter-animation-complete",
            PanoramaEvent::EnterFadeStart => "enter-fade-start",
            PanoramaEvent::EnterFadeComplete => "enter-fade-complete",
            PanoramaEvent::Leave => "leave",
            PanoramaEvent::LeaveAnimationStart => "leave-animation-start",
            PanoramaEvent::LeaveComplete => "leave-complete",
            PanoramaEvent::InfospotAnimationComplete { .. } => "infospot-animation-complete",
            PanoramaEvent::ViewerHandler(_) => "viewer-handler",
        }
    }
}

/// Notifications a panorama sends down into its subtree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeEvent {
    Container(Container),
    PanoramaEnter,
    PanoramaLeave,
    /// The user clicked on empty space.
    Dismiss,
}

/// Requests an infospot queues for its owning panorama.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InfospotRequest {
    Click,
    Focus { duration: Duration, easing: Easing },
}

/// Unique identifier for a registered listener.
pub type ListenerId = u32;

type Listener<E> = Box<dyn FnMut(&E)>;

/// Publish/subscribe channel scoped to one entity.
///
/// Listeners run synchronously, in subscription order, every time an event
/// is emitted.
///
/// # Example
///
/// ```
/// use panowalk::EventBus;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let seen = Rc::new(RefCell::new(Vec::new()));
/// let mut bus = EventBus::new();
///
/// let sink = Rc::clone(&seen);
/// let id = bus.subscribe(move |n: &u32| sink.borrow_mut().push(*n));
/// bus.emit(1);
/// bus.unsubscribe(id);
/// bus.emit(2);
///
/// assert_eq!(*seen.borrow(), vec![1]);
/// ```
pub struct EventBus<E> {
    listeners: Vec<(ListenerId, Listener<E>)>,
    next_id: ListenerId,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener and return the id used to remove it.
    pub fn subscribe<F: FnMut(&E) + 'static>(&mut self, listener: F) -> ListenerId {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Remove a listener. Returns `false` if the id is unknown.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    /// Deliver `event` to every listener.
    pub fn emit(&mut self, event: E) {
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn listeners_run_in_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut bus = EventBus::new();

        for tag in ["a", "b", "c"] {
            let log = Rc::clone(&log);
            bus.subscribe(move |event: &&str| log.borrow_mut().push(format!("{}:{}", tag, event)));
        }
        bus.emit("x");

        assert_eq!(*log.borrow(), vec!["a:x", "b:x", "c:x"]);
    }

    #[test]
    fn unsubscribe_unknown_id() {
        let mut bus: EventBus<()> = EventBus::new();
        let id = bus.subscribe(|_| {});
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn progress_fraction() {
        assert_eq!(Progress { loaded: 5, total: 10 }.fraction(), 0.5);
        assert_eq!(Progress { loaded: 5, total: 0 }.fraction(), 0.0);
    }

    #[test]
    fn event_names() {
        assert_eq!(PanoramaEvent::LeaveComplete.name(), "leave-complete");
        assert_eq!(
            PanoramaEvent::InfospotAnimationComplete { visible: true }.name(),
            "infospot-animation-complete"
        );
    }
}
