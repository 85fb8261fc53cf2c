//! Headless walkthrough: two generated rooms linked both ways.
//!
//! Run with `RUST_LOG=debug` to watch the transitions.

use image::{ImageFormat, Rgba, RgbaImage};
use panowalk::{
    AssetCache, ImageLoader, MemoryFetcher, Panorama, PanoramaConfig, PanoramaEvent, Vec3,
    Viewer, ViewerConfig,
};
use std::io::Cursor;
use std::time::Duration;

const FRAME: Duration = Duration::from_millis(16);

fn gradient(width: u32, height: u32, tint: [u8; 3]) -> Result<Vec<u8>, image::ImageError> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        let shade = |c: u8| ((c as u32 * (x + y)) / (width + height)) as u8;
        Rgba([shade(tint[0]), shade(tint[1]), shade(tint[2]), 255])
    });
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png)?;
    Ok(bytes.into_inner())
}

fn run_for(viewer: &mut Viewer, total: Duration) {
    let mut elapsed = Duration::ZERO;
    while elapsed < total {
        viewer.update(FRAME);
        elapsed += FRAME;
    }
}

fn main() -> Result<(), image::ImageError> {
    env_logger::init();

    let fetcher = MemoryFetcher::new()
        .with("lobby.png", gradient(256, 128, [200, 120, 60])?)
        .with("garden.png", gradient(256, 128, [60, 200, 90])?);
    let loader = ImageLoader::new(fetcher, AssetCache::new());
    let mut viewer = Viewer::new(ViewerConfig::new().size(1280.0, 720.0), loader);

    let config = PanoramaConfig::new().animation_duration(Duration::from_millis(800));
    let shared = viewer.loader();
    let lobby = Panorama::image(viewer.scene_mut(), "lobby.png", shared.clone(), config.clone());
    let garden = Panorama::image(viewer.scene_mut(), "garden.png", shared, config);
    let lobby = viewer.add(lobby);
    let garden = viewer.add(garden);

    let to_garden = viewer.link(lobby, garden, Some(Vec3::new(4000.0, -200.0, 0.0)), None, None);
    viewer.link(garden, lobby, Some(Vec3::new(-4000.0, -200.0, 0.0)), None, None);

    viewer.subscribe(|id, event| match event {
        PanoramaEvent::Progress(progress) => {
            log::info!("{:?} progress {:.0}%", id, progress.fraction() * 100.0)
        }
        PanoramaEvent::Error(error) => log::error!("{:?} failed: {}", id, error),
        other => log::info!("{:?} {}", id, other.name()),
    });

    log::info!("Zoom level {:?}", viewer.zoom_level());

    viewer.set_panorama(lobby);
    run_for(&mut viewer, Duration::from_secs(3));

    if let Some(door) = to_garden {
        viewer.click_infospot(door);
    }
    run_for(&mut viewer, Duration::from_secs(3));

    if let Some(report) = viewer.dispose_panorama(lobby) {
        log::info!(
            "Disposed lobby: {} nodes, {} infospots",
            report.nodes.len(),
            report.infospots.len()
        );
    }
    viewer.update(FRAME);

    log::info!("Active: {:?}", viewer.active());
    Ok(())
}
