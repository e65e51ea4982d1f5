//! Host UI framework contract.
//!
//! The host owns the window, the swapchain, the render loop and the graphics
//! context. It calls into the interop layer at fixed points of its frame and
//! answers queries about its native state. Everything here is implemented by
//! the host glue; the layer never reaches into the host any other way.

use std::sync::Arc;

use raw_window_handle::RawWindowHandle;

use crate::backend::GraphicsApi;
use crate::frame::SharedSession;
use crate::native::{LegacyFunctions, ModernContext, NativeHandle, ResourceKind};

/// Points of the host's frame at which scheduled jobs may run.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RenderStage {
    BeforeSynchronizing,
    AfterSynchronizing,
    BeforeRendering,
    AfterRendering,
    AfterSwap,
    NoStage,
}

/// One-shot job handed to the host's render thread.
pub struct RenderJob(Box<dyn FnOnce() + Send>);

impl RenderJob {
    pub fn new<F>(job: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self(Box::new(job))
    }

    pub fn run(self) {
        (self.0)()
    }
}

impl std::fmt::Debug for RenderJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RenderJob")
    }
}

/// The host's queue of render-thread jobs.
///
/// Split from [`HostWindow`] so an owner can keep it after its borrow of the
/// window ends, e.g. to defer a session's destruction from its own `Drop`.
pub trait JobScheduler: Send + Sync {
    /// Queues `job` to run once on the render thread at `stage`.
    fn schedule_render_job(&self, job: RenderJob, stage: RenderStage);
}

/// Startup hook declaring which scene-graph backend surfaces must use.
///
/// Must be honoured before the host creates any surface.
pub trait SceneGraphSelector {
    fn set_scene_graph_backend(&self, api: GraphicsApi);
}

/// A host surface (window) and its render loop, as seen from its render thread.
pub trait HostWindow {
    /// Graphics API the host's scene graph currently renders with.
    fn graphics_api(&self) -> GraphicsApi;

    /// Native object of `kind` for this surface, not referenced.
    fn resource(&self, kind: ResourceKind) -> Option<NativeHandle>;

    /// Modern API immediate context; `None` on other APIs.
    fn modern_context(&self) -> Option<&dyn ModernContext>;

    /// Legacy API entry points for the current context; `None` on other APIs.
    fn legacy_functions(&self) -> Option<&dyn LegacyFunctions>;

    fn window_handle(&self) -> Option<RawWindowHandle>;

    /// Size in logical pixels.
    fn logical_size(&self) -> (u32, u32);

    fn device_pixel_ratio(&self) -> f64;

    /// Color the host clears the surface to before its own content.
    fn set_clear_color(&self, rgba: [f32; 4]);

    /// Routes the host's frame-begin and main-pass-begin notifications of this
    /// surface to `session`.
    fn connect_frame_hooks(&self, session: SharedSession);

    /// Tells the host that native commands are about to be recorded outside its
    /// own command stream.
    fn begin_external_commands(&self);

    fn end_external_commands(&self);

    /// Restores the legacy API state the host's renderer assumes.
    fn reset_legacy_state(&self);

    /// Requests another frame.
    fn request_update(&self);

    /// Render-thread job queue of this surface.
    fn job_scheduler(&self) -> Arc<dyn JobScheduler>;
}

/// Brackets native command recording with begin/end-external-commands.
pub(crate) struct ExternalCommands<'h> {
    host: &'h dyn HostWindow,
}

impl<'h> ExternalCommands<'h> {
    pub(crate) fn begin(host: &'h dyn HostWindow) -> Self {
        host.begin_external_commands();
        Self { host }
    }
}

impl Drop for ExternalCommands<'_> {
    fn drop(&mut self) {
        self.host.end_external_commands();
    }
}
