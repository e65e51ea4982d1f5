use std::sync::Arc;

use anyhow::{Context, Result, ensure};

use crate::backend::{BackendKind, BackendRegistry, InteropMode};
use crate::coords::ViewportSize;
use crate::error::InteropFault;
use crate::host::{ExternalCommands, HostWindow};
use crate::interop::{InteropStrategy, NativeApi, StrategyCx, select_strategy};
use crate::native::{NativeHandle, ResourceKind};
use crate::renderer::Payload;

/// Native objects a session captured on its first frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Captured {
    Modern {
        device: NativeHandle,
        context: NativeHandle,
    },
    Legacy {
        /// Host framework's context object.
        gl_context: NativeHandle,
        /// Platform rendering context behind `gl_context`.
        native_context: NativeHandle,
    },
}

impl Captured {
    /// Handle the embedded renderer is initialized against.
    fn renderer_device(self) -> NativeHandle {
        match self {
            Captured::Modern { device, .. } => device,
            Captured::Legacy { native_context, .. } => native_context,
        }
    }

    fn pairs(self) -> [(ResourceKind, NativeHandle); 2] {
        match self {
            Captured::Modern { device, context } => [
                (ResourceKind::Device, device),
                (ResourceKind::DeviceContext, context),
            ],
            Captured::Legacy {
                gl_context,
                native_context,
            } => [
                (ResourceKind::OpenGlContext, gl_context),
                (ResourceKind::NativeGlContext, native_context),
            ],
        }
    }
}

/// State of one surface: native handles, viewport size, interop strategy and
/// payload.
///
/// Starts uninitialized; the first frame-begin captures the host's native
/// objects, initializes the shared renderer if needed, sizes the strategy's
/// targets and initializes the payload. From then on every main pass renders
/// through the strategy.
pub struct FrameController {
    registry: Arc<BackendRegistry>,
    strategy: Box<dyn InteropStrategy>,
    payload: Box<dyn Payload>,
    viewport: ViewportSize,
    captured: Option<Captured>,
    initialized: bool,
}

impl FrameController {
    pub fn new(registry: Arc<BackendRegistry>, payload: Box<dyn Payload>) -> Result<Self> {
        let strategy = select_strategy(registry.backend(), registry.mode())?;
        Ok(Self {
            registry,
            strategy,
            payload,
            viewport: ViewportSize::default(),
            captured: None,
            initialized: false,
        })
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    #[inline]
    pub fn viewport(&self) -> ViewportSize {
        self.viewport
    }

    #[inline]
    pub fn mode(&self) -> InteropMode {
        self.strategy.mode()
    }

    /// Records the physical viewport size; resizes the strategy's targets if
    /// the size changed on an initialized session.
    ///
    /// An empty size is recorded but leaves the targets alone until the next
    /// non-empty one.
    pub fn set_viewport_size(&mut self, host: &dyn HostWindow, size: ViewportSize) -> Result<()> {
        if self.viewport == size {
            return Ok(());
        }
        log::debug!("viewport {} -> {size}", self.viewport);
        self.viewport = size;

        if self.initialized && !size.is_empty() {
            self.resize(host)
                .with_context(|| format!("resize to {size}"))?;
        }
        Ok(())
    }

    /// Frame-begin hook.
    pub fn frame_start(&mut self, host: &dyn HostWindow) -> Result<()> {
        let found = self.capture(host)?;
        match self.captured {
            None => self.captured = Some(found),
            Some(expected) => {
                for ((kind, was), (_, now)) in expected.pairs().into_iter().zip(found.pairs()) {
                    ensure!(
                        was == now,
                        InteropFault::DeviceChanged {
                            kind,
                            expected: was,
                            found: now,
                        }
                    );
                }
            }
        }

        if !self.initialized {
            self.initialize(host, found)
                .context("session initialization")?;
        }
        Ok(())
    }

    /// Main-pass-begin hook: renders one frame inside the host's
    /// external-commands bracket, then asks for the next frame.
    pub fn main_pass_recording_start(&mut self, host: &dyn HostWindow) -> Result<()> {
        if !self.initialized {
            log::trace!("main pass before first frame-begin; skipped");
            return Ok(());
        }
        if self.viewport.is_empty() {
            log::trace!("main pass with empty viewport; skipped");
            return Ok(());
        }

        let native = self.native_api(host)?;
        {
            let _commands = ExternalCommands::begin(host);
            let mut renderer = self.registry.renderer();
            let mut cx = StrategyCx {
                renderer: &mut **renderer,
                payload: &mut *self.payload,
                native,
                viewport: self.viewport,
            };
            self.strategy.render(&mut cx)?;

            if self.registry.backend() == BackendKind::Legacy {
                host.reset_legacy_state();
            }
        }
        host.request_update();
        Ok(())
    }

    fn initialize(&mut self, host: &dyn HostWindow, captured: Captured) -> Result<()> {
        self.registry.ensure_initialized(captured.renderer_device())?;
        log::debug!(
            "session on {:?} window {:?} at {}",
            self.strategy.mode(),
            host.window_handle(),
            self.viewport
        );

        if !self.viewport.is_empty() {
            self.resize(host)?;
        }

        let mut renderer = self.registry.renderer();
        self.payload.init(&mut **renderer);
        drop(renderer);

        self.initialized = true;
        log::info!(
            "surface session ready ({:?}, {})",
            self.strategy.mode(),
            self.viewport
        );
        Ok(())
    }

    fn resize(&mut self, host: &dyn HostWindow) -> Result<()> {
        let native = self.native_api(host)?;
        let mut renderer = self.registry.renderer();
        let mut cx = StrategyCx {
            renderer: &mut **renderer,
            payload: &mut *self.payload,
            native,
            viewport: self.viewport,
        };
        self.strategy.resize(&mut cx)
    }

    /// Reads the host's current native objects.
    fn capture(&self, host: &dyn HostWindow) -> Result<Captured> {
        let backend = self.registry.backend();
        let api = host.graphics_api();
        ensure!(
            api == backend.graphics_api(),
            InteropFault::BackendMismatch {
                expected: backend,
                found: api,
            }
        );

        let required = |kind| {
            let handle = host.resource(kind);
            handle.ok_or(InteropFault::MissingResource(kind))
        };
        let captured = match backend {
            BackendKind::Modern => Captured::Modern {
                device: required(ResourceKind::Device)?,
                context: required(ResourceKind::DeviceContext)?,
            },
            BackendKind::Legacy => Captured::Legacy {
                gl_context: required(ResourceKind::OpenGlContext)?,
                native_context: host
                    .resource(ResourceKind::NativeGlContext)
                    .ok_or(InteropFault::ForeignContext)?,
            },
        };
        Ok(captured)
    }

    fn native_api<'h>(&self, host: &'h dyn HostWindow) -> Result<NativeApi<'h>> {
        let early = InteropFault::UnexpectedShape("native objects used before capture");
        let native = match self.captured.ok_or(early)? {
            Captured::Modern { device, .. } => {
                let missing = InteropFault::MissingResource(ResourceKind::DeviceContext);
                NativeApi::Modern {
                    device,
                    context: host.modern_context().ok_or(missing)?,
                }
            }
            Captured::Legacy { native_context, .. } => {
                let missing = InteropFault::MissingResource(ResourceKind::OpenGlContext);
                NativeApi::Legacy {
                    context: native_context,
                    gl: host.legacy_functions().ok_or(missing)?,
                }
            }
        };
        Ok(native)
    }
}

impl Drop for FrameController {
    fn drop(&mut self) {
        if !self.registry.is_initialized() {
            log::debug!("session dropped with no live renderer");
            return;
        }
        let mut renderer = self.registry.renderer();
        self.strategy.release(&mut **renderer);
        log::debug!("session released its {:?} targets", self.strategy.mode());
    }
}

impl std::fmt::Debug for FrameController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameController")
            .field("mode", &self.strategy.mode())
            .field("viewport", &self.viewport)
            .field("captured", &self.captured)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}
