use anyhow::{Result, ensure};

use graft_engine::backend::{BackendRegistry, InteropConfig};
use graft_engine::headless::{HeadlessHost, HeadlessPayload, HeadlessRenderer};
use graft_engine::host::RenderStage;
use graft_engine::lifecycle::SurfaceItem;
use graft_engine::logging::{LoggingConfig, init_logging};
use graft_engine::renderer::Payload;

const FRAMES: u32 = 120;
const RESIZE_AT: u32 = 60;

fn main() {
    init_logging(LoggingConfig::default());

    run().unwrap_or_else(|e| {
        log::error!("{e:#}");
        eprintln!("graft studio error: {e:#}");
        std::process::exit(1);
    });
}

/// Two surfaces on one device, driven the way a host's render loop would:
/// pending jobs, sync, frame-begin, main pass.
fn run() -> Result<()> {
    let config = InteropConfig::from_env()?;
    log::info!(
        "graft studio: {:?} backend, {:?} interop",
        config.backend,
        config.mode
    );

    let main_window = HeadlessHost::new(config.backend.graphics_api(), (820, 560), 1.0);
    let side_window = main_window.share_device((640, 480), 1.5);
    let hosts = [&main_window, &side_window];

    let (renderer, probe) = HeadlessRenderer::for_host(&main_window);
    let registry = BackendRegistry::select(config, &main_window, Box::new(renderer))?;

    let payloads = [HeadlessPayload::default(), HeadlessPayload::default()];
    let mut items: Vec<SurfaceItem> = hosts
        .iter()
        .zip(&payloads)
        .map(|(host, payload)| {
            let payload = payload.clone();
            let factory = move || Box::new(payload.clone()) as Box<dyn Payload>;
            let mut item = SurfaceItem::new(registry.clone(), factory);
            item.on_surface_changed(Some(*host));
            item
        })
        .collect();

    for frame in 0..FRAMES {
        if frame == RESIZE_AT {
            main_window.set_logical_size(1024, 768);
            let size = main_window.physical_size();
            main_window.bind_fresh_targets(size.width, size.height);
            log::info!("main window resized to {size}");
        }

        for (host, item) in hosts.iter().zip(&mut items) {
            host.run_jobs(RenderStage::BeforeSynchronizing);
            item.on_sync(*host)?;
            host.render_frame();
        }
    }

    for (host, item) in hosts.iter().zip(&mut items) {
        item.release_resources(*host);
        host.run_jobs(RenderStage::BeforeSynchronizing);
    }
    registry.shutdown();

    for (index, payload) in payloads.iter().enumerate() {
        let stats = payload.stats();
        log::info!(
            "surface {index}: {} frames, last viewport {:?}",
            stats.updates,
            stats.last_viewport
        );
    }

    let device = main_window.device();
    log::info!(
        "native references: {} acquired, {} released; {} renderer textures left",
        device.acquired(),
        device.released(),
        probe.live_textures()
    );
    ensure!(
        device.is_balanced(),
        "{} native references leaked",
        device.outstanding()
    );
    ensure!(
        probe.live_textures() == 0,
        "{} renderer textures leaked",
        probe.live_textures()
    );
    Ok(())
}
