use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Result, ensure};
use state::InitCell;

use crate::error::InteropFault;
use crate::host::SceneGraphSelector;
use crate::native::{NativeHandle, ResourceKind};
use crate::renderer::{EmbeddedRenderer, InitParams, PlatformData};

use super::{BackendKind, InteropConfig, InteropMode};

/// Process-scoped backend state shared by every surface session.
///
/// Created once by [`select`](Self::select) before any surface exists and
/// passed to sessions as `Arc<BackendRegistry>`. Owns the embedded renderer;
/// the renderer is initialized lazily, on the render thread, by the first
/// session that reaches its first frame.
pub struct BackendRegistry {
    config: InteropConfig,

    /// Native device (modern) or native rendering context (legacy) the
    /// renderer was initialized against.
    device: InitCell<NativeHandle>,

    shut_down: AtomicBool,

    renderer: Mutex<Box<dyn EmbeddedRenderer>>,
}

impl BackendRegistry {
    /// Records backend and interop mode and declares the backend to the host.
    ///
    /// SynchroFramebuffer has no working legacy-API path and is rejected there.
    pub fn select(
        config: InteropConfig,
        host: &dyn SceneGraphSelector,
        renderer: Box<dyn EmbeddedRenderer>,
    ) -> Result<Arc<Self>> {
        let InteropConfig { backend, mode } = config;
        let supported = !matches!(
            (backend, mode),
            (BackendKind::Legacy, InteropMode::SynchroFramebuffer)
        );
        ensure!(
            supported,
            InteropFault::UnsupportedCombination { backend, mode }
        );

        host.set_scene_graph_backend(backend.graphics_api());
        log::info!("selected {backend:?} backend with {mode:?} interop");

        Ok(Arc::new(Self {
            config,
            device: InitCell::new(),
            shut_down: AtomicBool::new(false),
            renderer: Mutex::new(renderer),
        }))
    }

    #[inline]
    pub fn config(&self) -> InteropConfig {
        self.config
    }

    #[inline]
    pub fn backend(&self) -> BackendKind {
        self.config.backend
    }

    #[inline]
    pub fn mode(&self) -> InteropMode {
        self.config.mode
    }

    /// `true` between the first successful initialization and shutdown.
    pub fn is_initialized(&self) -> bool {
        self.device.try_get().is_some() && !self.shut_down.load(Ordering::Acquire)
    }

    /// Initializes the renderer against `native_device` on first use.
    ///
    /// Later calls only verify that the same device is supplied: the renderer
    /// cannot follow a device change, so a different handle is fatal.
    pub fn ensure_initialized(&self, native_device: NativeHandle) -> Result<()> {
        ensure!(
            !self.shut_down.load(Ordering::Acquire),
            InteropFault::RendererShutDown
        );

        if let Some(&recorded) = self.device.try_get() {
            return self.check_same_device(recorded, native_device);
        }

        let mut renderer = self.renderer();

        // Another session may have won the race while we waited for the lock.
        if let Some(&recorded) = self.device.try_get() {
            return self.check_same_device(recorded, native_device);
        }

        let handoff = renderer.render_frame();
        log::debug!("renderer in render-thread mode ({handoff:?})");

        let params = InitParams {
            backend: self.config.backend,
            platform: PlatformData::external(native_device),
        };
        ensure!(renderer.init(&params), InteropFault::RendererInit);

        self.device.set(native_device);
        log::info!("embedded renderer initialized on {native_device}");
        Ok(())
    }

    /// Shuts the renderer down once. No-op if it was never initialized.
    pub fn shutdown(&self) {
        if self.device.try_get().is_none() {
            log::debug!("shutdown requested before initialization; nothing to do");
            return;
        }
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        self.renderer().shutdown();
        log::info!("embedded renderer shut down");
    }

    /// Locks the embedded renderer for the duration of one callback.
    pub fn renderer(&self) -> MutexGuard<'_, Box<dyn EmbeddedRenderer>> {
        self.renderer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_same_device(&self, recorded: NativeHandle, supplied: NativeHandle) -> Result<()> {
        ensure!(
            recorded == supplied,
            InteropFault::DeviceChanged {
                kind: self.device_kind(),
                expected: recorded,
                found: supplied,
            }
        );
        Ok(())
    }

    fn device_kind(&self) -> ResourceKind {
        match self.config.backend {
            BackendKind::Modern => ResourceKind::Device,
            BackendKind::Legacy => ResourceKind::NativeGlContext,
        }
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("config", &self.config)
            .field("device", &self.device.try_get())
            .field("shut_down", &self.shut_down.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
