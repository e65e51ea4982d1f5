use std::sync::Arc;

use anyhow::Result;

use crate::backend::BackendRegistry;
use crate::coords::ViewportSize;
use crate::frame::{FrameController, SharedSession, lock_session, share};
use crate::host::{HostWindow, JobScheduler, RenderJob, RenderStage};
use crate::renderer::Payload;

/// Clear color for surfaces hosting an embedded renderer.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

type PayloadFactory = Box<dyn FnMut() -> Box<dyn Payload>>;

/// UI-side owner of one embedded-renderer surface.
///
/// Lives on the UI thread. Creates its [`FrameController`] lazily on the
/// first sync, keeps it in step with the surface size, and hands it back to
/// the render thread for destruction when the item goes away, whether through
/// [`SurfaceItem::release_resources`] or by being dropped.
pub struct SurfaceItem {
    registry: Arc<BackendRegistry>,
    make_payload: PayloadFactory,
    session: Option<SharedSession>,
    /// Job queue of the window the item was last attached to.
    scheduler: Option<Arc<dyn JobScheduler>>,
    attached: bool,
}

impl SurfaceItem {
    pub fn new<F>(registry: Arc<BackendRegistry>, make_payload: F) -> Self
    where
        F: FnMut() -> Box<dyn Payload> + 'static,
    {
        Self {
            registry,
            make_payload: Box::new(make_payload),
            session: None,
            scheduler: None,
            attached: false,
        }
    }

    #[inline]
    pub fn session(&self) -> Option<&SharedSession> {
        self.session.as_ref()
    }

    #[inline]
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// The item moved to `host`, or left its surface when `None`.
    ///
    /// Syncing only happens while attached. A session created for another
    /// window is handed back to that window's render thread.
    pub fn on_surface_changed(&mut self, host: Option<&dyn HostWindow>) {
        match host {
            Some(host) => {
                let scheduler = host.job_scheduler();
                let previous = self.scheduler.replace(scheduler.clone());
                if let Some(previous) = previous.filter(|p| !Arc::ptr_eq(p, &scheduler)) {
                    self.defer_destruction(&*previous);
                }
                host.set_clear_color(CLEAR_COLOR);
                self.attached = true;
                log::debug!("surface item attached");
            }
            None => {
                self.attached = false;
                log::debug!("surface item detached");
            }
        }
    }

    /// Before-synchronizing hook, on the render thread with the UI thread
    /// blocked.
    pub fn on_sync(&mut self, host: &dyn HostWindow) -> Result<()> {
        if !self.attached {
            log::trace!("sync on a detached item; ignored");
            return Ok(());
        }

        let session = match &self.session {
            Some(session) => session.clone(),
            None => {
                let payload = (self.make_payload)();
                let session = share(FrameController::new(self.registry.clone(), payload)?);
                host.connect_frame_hooks(session.clone());
                log::debug!("surface session created");
                self.session = Some(session.clone());
                session
            }
        };

        let (width, height) = host.logical_size();
        let size = ViewportSize::from_logical(width, height, host.device_pixel_ratio());
        lock_session(&session).set_viewport_size(host, size)
    }

    /// The item is going away while the render loop keeps running: the
    /// session is destroyed by a render job before the next sync.
    pub fn release_resources(&mut self, host: &dyn HostWindow) {
        self.defer_destruction(&*host.job_scheduler());
    }

    /// Scene-graph-invalidated hook: the render loop has stopped, so the
    /// session can be dropped right away.
    pub fn cleanup(&mut self) {
        if self.session.take().is_some() {
            log::debug!("surface session dropped on scene-graph invalidation");
        }
    }

    fn defer_destruction(&mut self, scheduler: &dyn JobScheduler) {
        let Some(session) = self.session.take() else {
            return;
        };
        let job = RenderJob::new(move || {
            drop(session);
            log::debug!("surface session destroyed by render job");
        });
        scheduler.schedule_render_job(job, RenderStage::BeforeSynchronizing);
    }
}

impl Drop for SurfaceItem {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            self.defer_destruction(&*scheduler);
        }
    }
}

impl std::fmt::Debug for SurfaceItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceItem")
            .field("attached", &self.attached)
            .field("session", &self.session.is_some())
            .finish_non_exhaustive()
    }
}
