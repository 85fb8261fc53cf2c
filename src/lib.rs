//! # Panowalk
//!
//! **Walkable 360° panorama scenes with cross-fade transitions and linked infospots.**
//!
//! Build a set of panoramas, link them with clickable infospots, and let the
//! viewer fade between them. Everything is driven by an explicit frame clock,
//! so the whole lifecycle runs (and tests) headless.
//!
//! ## Quick Start
//!
//! ```
//! use panowalk::*;
//! use std::time::Duration;
//!
//! let fetcher = MemoryFetcher::new();
//! let mut viewer = Viewer::new(ViewerConfig::new(), ImageLoader::new(fetcher, AssetCache::new()));
//!
//! let hall = Panorama::empty(viewer.scene_mut(), PanoramaConfig::new());
//! let yard = Panorama::empty(viewer.scene_mut(), PanoramaConfig::new());
//! let hall = viewer.add(hall);
//! let yard = viewer.add(yard);
//!
//! let door = viewer
//!     .link(hall, yard, Some(Vec3::new(0.0, 0.0, -4000.0)), None, None)
//!     .unwrap();
//!
//! viewer.set_panorama(hall);
//! for _ in 0..200 {
//!     viewer.update(Duration::from_millis(16));
//! }
//!
//! viewer.click_infospot(door);
//! viewer.update(Duration::from_millis(16));
//! assert_eq!(viewer.active(), Some(yard));
//! ```
//!
//! ## Pieces
//!
//! - **[`SceneGraph`]**: parent/child hierarchy over a `hecs` world.
//! - **[`Panorama`]**: the enter/leave and fade state machines.
//! - **[`Infospot`]**: markers that fade with their panorama and link elsewhere.
//! - **[`ImageLoader`]**: fetch, decode and cache textures.
//! - **[`Viewer`]**: owns the scene and serves panorama requests.

mod config;
mod dispose;
mod event;
mod graph;
mod infospot;
mod loader;
mod mesh;
mod panorama;
mod texture;
mod tween;
mod viewer;

pub use config::{PanoramaConfig, ViewerConfig};
pub use dispose::{Disposal, dispose_subtree};
pub use event::{
    Container, EventBus, InfospotRequest, ListenerId, NodeEvent, PanoramaEvent, Progress,
    ViewerRequest,
};
pub use graph::{Mailbox, Node, ScaleAdapter, SceneGraph};
pub use infospot::{INFOSPOT_ANIMATION_DURATION, Infospot};
pub use loader::{
    AssetCache, Fetch, FileFetcher, ICON_SIZE, ImageLoader, LoadError, LoadEvent, LoadTicket,
    MemoryFetcher,
};
pub use mesh::{Geometry, Material, MeshResources, Side, Transform, Uniforms, Vertex3d};
pub use panorama::{
    Backdrop, DEFAULT_LINK_SCALE, ImageBackdrop, ImageQuality, LinkTarget, Panorama, PanoramaId,
};
pub use texture::{Icon, ImageAsset, ImageSource};
pub use tween::{Easing, Tween, TweenStep};
pub use viewer::Viewer;

// Re-export glam math types for convenience
pub use glam::{Mat4, Quat, Vec2, Vec3};

// Scene storage
pub use hecs::{Entity, World};
