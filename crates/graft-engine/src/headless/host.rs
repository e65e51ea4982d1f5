use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use raw_window_handle::{RawWindowHandle, WebWindowHandle};

use crate::backend::GraphicsApi;
use crate::coords::ViewportSize;
use crate::error::fatal;
use crate::frame::{FrameController, SharedSession, lock_session};
use crate::host::{HostWindow, JobScheduler, RenderJob, RenderStage, SceneGraphSelector};
use crate::native::{
    FramebufferStatus, FramebufferTarget, LegacyFunctions, ModernContext, NativeHandle, PixelRect,
    ResourceKind, ViewDimension,
};
use crate::renderer::TextureFormat;

use super::device::{HeadlessDevice, ObjectKind};

/// `GL_INVALID_OPERATION`.
pub const INVALID_OPERATION: u32 = 0x0502;

/// Everything the interop layer asked of a [`HeadlessHost`], in order.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    SceneGraphBackend(GraphicsApi),
    ClearColor([f32; 4]),
    BeginExternalCommands,
    EndExternalCommands,
    ResetLegacyState,
    UpdateRequested,
    JobScheduled(RenderStage),
    SetRenderTargets {
        color: Option<NativeHandle>,
        depth: Option<NativeHandle>,
    },
    CopyResource {
        dst: NativeHandle,
        src: NativeHandle,
    },
    Flush,
    GenFramebuffer(u32),
    BindFramebuffer(FramebufferTarget, u32),
    AttachColor(u32),
    BlitColor {
        src: PixelRect,
        dst: PixelRect,
    },
    DeleteFramebuffer(u32),
}

#[derive(Debug, Default)]
struct GlState {
    next_framebuffer: u32,
    /// Generated framebuffer names and their color attachment.
    framebuffers: HashMap<u32, Option<u32>>,
    read: u32,
    draw: u32,
    errors: VecDeque<u32>,
}

impl GlState {
    fn fail(&mut self, code: u32) {
        self.errors.push_back(code);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type EventLog = Arc<Mutex<Vec<HostEvent>>>;

/// Render-thread job queue of one [`HeadlessHost`].
///
/// Shared with item owners through [`HostWindow::job_scheduler`], so it
/// outlives any borrow of the host.
#[derive(Debug, Default)]
struct JobQueue {
    events: EventLog,
    pending: Mutex<Vec<(RenderStage, RenderJob)>>,
}

impl JobScheduler for JobQueue {
    fn schedule_render_job(&self, job: RenderJob, stage: RenderStage) {
        lock(&self.events).push(HostEvent::JobScheduled(stage));
        lock(&self.pending).push((stage, job));
    }
}

/// Software host surface with both native APIs.
///
/// Owns a swapchain-like pair of color and depth targets bound to the
/// output merger, answers resource queries from a [`HeadlessDevice`], and
/// drives connected sessions through [`render_frame`](Self::render_frame).
/// Single-threaded: the host's render thread is the caller's thread.
pub struct HeadlessHost {
    api: GraphicsApi,
    device: HeadlessDevice,
    logical: Cell<(u32, u32)>,
    pixel_ratio: Cell<f64>,

    native_device: Cell<NativeHandle>,
    native_context: NativeHandle,
    gl_context: NativeHandle,
    native_gl_context: Cell<Option<NativeHandle>>,

    /// Swapchain color texture, color view, depth texture, depth view.
    swapchain: Cell<Option<[NativeHandle; 4]>>,
    bound: Cell<(Option<NativeHandle>, Option<NativeHandle>)>,

    gl: RefCell<GlState>,
    events: EventLog,
    jobs: Arc<JobQueue>,
    sessions: RefCell<Vec<Weak<Mutex<FrameController>>>>,
}

impl HeadlessHost {
    /// Creates a surface of `logical` size at `pixel_ratio`, with fresh targets
    /// bound at the matching physical size.
    pub fn new(api: GraphicsApi, logical: (u32, u32), pixel_ratio: f64) -> Self {
        let device = HeadlessDevice::new();
        let native_device = device.create(ObjectKind::Device);
        let native_context = device.create(ObjectKind::DeviceContext);
        let gl_context = device.create(ObjectKind::GlContext);
        let native_gl_context = device.create(ObjectKind::NativeGlContext);
        let (events, jobs) = Self::job_queue();

        let host = Self {
            api,
            device,
            logical: Cell::new(logical),
            pixel_ratio: Cell::new(pixel_ratio),
            native_device: Cell::new(native_device),
            native_context,
            gl_context,
            native_gl_context: Cell::new(Some(native_gl_context)),
            swapchain: Cell::new(None),
            bound: Cell::new((None, None)),
            gl: RefCell::default(),
            events,
            jobs,
            sessions: RefCell::default(),
        };
        let size = host.physical_size();
        host.bind_fresh_targets(size.width, size.height);
        host
    }

    /// A second surface on the same device and contexts, as windows sharing
    /// one graphics context do.
    pub fn share_device(&self, logical: (u32, u32), pixel_ratio: f64) -> Self {
        let (events, jobs) = Self::job_queue();
        let host = Self {
            api: self.api,
            device: self.device.clone(),
            logical: Cell::new(logical),
            pixel_ratio: Cell::new(pixel_ratio),
            native_device: self.native_device.clone(),
            native_context: self.native_context,
            gl_context: self.gl_context,
            native_gl_context: self.native_gl_context.clone(),
            swapchain: Cell::new(None),
            bound: Cell::new((None, None)),
            gl: RefCell::default(),
            events,
            jobs,
            sessions: RefCell::default(),
        };
        let size = host.physical_size();
        host.bind_fresh_targets(size.width, size.height);
        host
    }

    fn job_queue() -> (EventLog, Arc<JobQueue>) {
        let events = EventLog::default();
        let jobs = Arc::new(JobQueue {
            events: events.clone(),
            pending: Mutex::default(),
        });
        (events, jobs)
    }

    #[inline]
    pub fn device(&self) -> HeadlessDevice {
        self.device.clone()
    }

    pub fn physical_size(&self) -> ViewportSize {
        let (w, h) = self.logical.get();
        ViewportSize::from_logical(w, h, self.pixel_ratio.get())
    }

    /// Resizes the surface; the swapchain follows on the next
    /// [`bind_fresh_targets`](Self::bind_fresh_targets).
    pub fn set_logical_size(&self, width: u32, height: u32) {
        self.logical.set((width, height));
    }

    pub fn set_pixel_ratio(&self, ratio: f64) {
        self.pixel_ratio.set(ratio);
    }

    /// Replaces the swapchain with new `width`×`height` targets and binds them.
    pub fn bind_fresh_targets(&self, width: u32, height: u32) {
        self.retire_swapchain();
        let size = ViewportSize::new(width, height);
        let color = self.device.create(ObjectKind::Texture {
            size,
            format: TextureFormat::Rgba8,
        });
        let color_view = self.device.create(ObjectKind::ColorView {
            resource: color,
            dimension: ViewDimension::Texture2d,
        });
        let depth = self.device.create(ObjectKind::Texture {
            size,
            format: TextureFormat::D24S8,
        });
        let depth_view = self
            .device
            .create(ObjectKind::DepthView { resource: depth });
        self.swapchain
            .set(Some([color, color_view, depth, depth_view]));
        self.bound.set((Some(color_view), Some(depth_view)));
        log::trace!("swapchain {size} bound as {color_view}/{depth_view}");
    }

    /// Leaves the output merger with nothing bound.
    pub fn unbind_targets(&self) {
        self.bound.set((None, None));
    }

    /// Output-merger binding, without taking references.
    #[inline]
    pub fn bound_targets(&self) -> (Option<NativeHandle>, Option<NativeHandle>) {
        self.bound.get()
    }

    /// Texture behind the swapchain's color view.
    pub fn swapchain_color(&self) -> Option<NativeHandle> {
        self.swapchain.get().map(|[color, ..]| color)
    }

    /// Reinterprets the swapchain color view, e.g. as a multisampled view.
    pub fn set_color_view_dimension(&self, dimension: ViewDimension) {
        let Some([color, old_view, depth, depth_view]) = self.swapchain.get() else {
            return;
        };
        let view = self.device.create(ObjectKind::ColorView {
            resource: color,
            dimension,
        });
        self.device.retire(old_view);
        self.swapchain.set(Some([color, view, depth, depth_view]));
        self.bound.set((Some(view), Some(depth_view)));
    }

    /// Swaps the device (modern) or native GL context (legacy) for a new one,
    /// as a device-loss recovery would.
    pub fn replace_device(&self) {
        match self.api {
            GraphicsApi::OpenGl => {
                let context = self.device.create(ObjectKind::NativeGlContext);
                self.native_gl_context.set(Some(context));
            }
            _ => {
                let device = self.device.create(ObjectKind::Device);
                self.native_device.set(device);
            }
        }
    }

    /// Makes the GL context foreign: it no longer converts to a native handle.
    pub fn detach_native_gl_context(&self) {
        self.native_gl_context.set(None);
    }

    /// Queues a legacy API error for the next `error()` query.
    pub fn inject_gl_error(&self, code: u32) {
        self.gl.borrow_mut().fail(code);
    }

    pub fn events(&self) -> Vec<HostEvent> {
        lock(&self.events).clone()
    }

    pub fn clear_events(&self) {
        lock(&self.events).clear();
    }

    pub fn count_events(&self, pred: impl Fn(&HostEvent) -> bool) -> usize {
        lock(&self.events).iter().filter(|e| pred(e)).count()
    }

    pub fn pending_jobs(&self) -> usize {
        lock(&self.jobs.pending).len()
    }

    /// Runs every job scheduled for `stage`; returns how many ran.
    pub fn run_jobs(&self, stage: RenderStage) -> usize {
        let due: Vec<RenderJob> = {
            let mut jobs = lock(&self.jobs.pending);
            let pending = std::mem::take(&mut *jobs);
            let (due, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|(s, _)| *s == stage);
            *jobs = rest;
            due.into_iter().map(|(_, job)| job).collect()
        };
        let ran = due.len();
        for job in due {
            job.run();
        }
        ran
    }

    /// Live sessions connected through [`HostWindow::connect_frame_hooks`].
    pub fn connected_sessions(&self) -> usize {
        let hooks = self.sessions.borrow();
        hooks.iter().filter(|s| s.strong_count() > 0).count()
    }

    /// One render-thread frame: frame-begin for every connected session, then
    /// main-pass-begin for every connected session.
    ///
    /// Stands in for the host's signal dispatch, so a failing callback is
    /// fatal here.
    pub fn render_frame(&self) {
        let sessions: Vec<SharedSession> = {
            let mut hooks = self.sessions.borrow_mut();
            hooks.retain(|s| s.strong_count() > 0);
            hooks.iter().filter_map(Weak::upgrade).collect()
        };

        for session in &sessions {
            if let Err(err) = lock_session(session).frame_start(self) {
                fatal(err);
            }
        }
        for session in &sessions {
            if let Err(err) = lock_session(session).main_pass_recording_start(self) {
                fatal(err);
            }
        }
    }

    fn record(&self, event: HostEvent) {
        lock(&self.events).push(event);
    }

    fn retire_swapchain(&self) {
        if let Some(objects) = self.swapchain.take() {
            for object in objects.into_iter().rev() {
                self.device.retire(object);
            }
        }
    }
}

impl Drop for HeadlessHost {
    fn drop(&mut self) {
        self.retire_swapchain();
    }
}

impl std::fmt::Debug for HeadlessHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessHost")
            .field("api", &self.api)
            .field("logical", &self.logical.get())
            .field("pixel_ratio", &self.pixel_ratio.get())
            .field("bound", &self.bound.get())
            .finish_non_exhaustive()
    }
}

// ── host contract ─────────────────────────────────────────────────────────

impl SceneGraphSelector for HeadlessHost {
    fn set_scene_graph_backend(&self, api: GraphicsApi) {
        self.record(HostEvent::SceneGraphBackend(api));
    }
}

impl HostWindow for HeadlessHost {
    fn graphics_api(&self) -> GraphicsApi {
        self.api
    }

    fn resource(&self, kind: ResourceKind) -> Option<NativeHandle> {
        match (self.api, kind) {
            (GraphicsApi::Direct3D11, ResourceKind::Device) => Some(self.native_device.get()),
            (GraphicsApi::Direct3D11, ResourceKind::DeviceContext) => Some(self.native_context),
            (GraphicsApi::OpenGl, ResourceKind::OpenGlContext) => Some(self.gl_context),
            (GraphicsApi::OpenGl, ResourceKind::NativeGlContext) => self.native_gl_context.get(),
            _ => None,
        }
    }

    fn modern_context(&self) -> Option<&dyn ModernContext> {
        if self.api == GraphicsApi::Direct3D11 {
            Some(self)
        } else {
            None
        }
    }

    fn legacy_functions(&self) -> Option<&dyn LegacyFunctions> {
        if self.api == GraphicsApi::OpenGl {
            Some(self)
        } else {
            None
        }
    }

    fn window_handle(&self) -> Option<RawWindowHandle> {
        Some(RawWindowHandle::Web(WebWindowHandle::new(1)))
    }

    fn logical_size(&self) -> (u32, u32) {
        self.logical.get()
    }

    fn device_pixel_ratio(&self) -> f64 {
        self.pixel_ratio.get()
    }

    fn set_clear_color(&self, rgba: [f32; 4]) {
        self.record(HostEvent::ClearColor(rgba));
    }

    fn connect_frame_hooks(&self, session: SharedSession) {
        self.sessions.borrow_mut().push(Arc::downgrade(&session));
    }

    fn begin_external_commands(&self) {
        self.record(HostEvent::BeginExternalCommands);
    }

    fn end_external_commands(&self) {
        self.record(HostEvent::EndExternalCommands);
    }

    fn reset_legacy_state(&self) {
        self.record(HostEvent::ResetLegacyState);
    }

    fn request_update(&self) {
        self.record(HostEvent::UpdateRequested);
    }

    fn job_scheduler(&self) -> Arc<dyn JobScheduler> {
        self.jobs.clone()
    }
}

// ── modern API ────────────────────────────────────────────────────────────

impl ModernContext for HeadlessHost {
    fn output_merger_targets(&self) -> (Option<NativeHandle>, Option<NativeHandle>) {
        let (color, depth) = self.bound.get();
        let add_ref = |view| self.device.add_ref(view);
        (color.map(add_ref), depth.map(add_ref))
    }

    fn set_output_merger_targets(&self, color: Option<NativeHandle>, depth: Option<NativeHandle>) {
        self.record(HostEvent::SetRenderTargets { color, depth });
        self.bound.set((color, depth));
    }

    fn view_dimension(&self, view: NativeHandle) -> ViewDimension {
        match self.device.kind(view) {
            Some(ObjectKind::ColorView { dimension, .. }) => dimension,
            Some(ObjectKind::DepthView { .. }) => ViewDimension::Texture2d,
            _ => ViewDimension::Other,
        }
    }

    fn view_resource(&self, view: NativeHandle) -> Option<NativeHandle> {
        match self.device.kind(view)? {
            ObjectKind::ColorView { resource, .. } | ObjectKind::DepthView { resource } => {
                Some(self.device.add_ref(resource))
            }
            _ => None,
        }
    }

    fn query_texture_2d(&self, resource: NativeHandle) -> Option<NativeHandle> {
        match self.device.kind(resource)? {
            ObjectKind::Texture { .. } => Some(self.device.add_ref(resource)),
            _ => None,
        }
    }

    fn query_resource(&self, texture: NativeHandle) -> Option<NativeHandle> {
        self.query_texture_2d(texture)
    }

    fn copy_resource(&self, dst: NativeHandle, src: NativeHandle) {
        self.record(HostEvent::CopyResource { dst, src });
    }

    fn flush(&self) {
        self.record(HostEvent::Flush);
    }

    fn release(&self, object: NativeHandle) -> u32 {
        self.device.release(object)
    }
}

// ── legacy API ────────────────────────────────────────────────────────────

impl LegacyFunctions for HeadlessHost {
    fn error(&self) -> u32 {
        self.gl.borrow_mut().errors.pop_front().unwrap_or(0)
    }

    fn gen_framebuffer(&self) -> u32 {
        let mut gl = self.gl.borrow_mut();
        gl.next_framebuffer += 1;
        let name = gl.next_framebuffer;
        gl.framebuffers.insert(name, None);
        drop(gl);
        self.record(HostEvent::GenFramebuffer(name));
        name
    }

    fn bind_framebuffer(&self, target: FramebufferTarget, framebuffer: u32) {
        self.record(HostEvent::BindFramebuffer(target, framebuffer));
        let mut gl = self.gl.borrow_mut();
        if framebuffer != 0 && !gl.framebuffers.contains_key(&framebuffer) {
            gl.fail(INVALID_OPERATION);
            return;
        }
        match target {
            FramebufferTarget::Both => {
                gl.read = framebuffer;
                gl.draw = framebuffer;
            }
            FramebufferTarget::Read => gl.read = framebuffer,
            FramebufferTarget::Draw => gl.draw = framebuffer,
        }
    }

    fn framebuffer_color_texture(&self, texture: u32) {
        self.record(HostEvent::AttachColor(texture));
        let mut gl = self.gl.borrow_mut();
        let draw = gl.draw;
        match gl.framebuffers.get_mut(&draw) {
            Some(attachment) => *attachment = Some(texture),
            None => gl.fail(INVALID_OPERATION),
        }
    }

    fn check_framebuffer_status(&self) -> FramebufferStatus {
        let gl = self.gl.borrow();
        if gl.draw == 0 {
            return FramebufferStatus::Complete;
        }
        match gl.framebuffers.get(&gl.draw).copied().flatten() {
            None => FramebufferStatus::MissingAttachment,
            Some(name) => {
                let live = NativeHandle::from_raw(name as usize)
                    .and_then(|h| self.device.kind(h))
                    .is_some_and(|kind| matches!(kind, ObjectKind::Texture { .. }));
                if live {
                    FramebufferStatus::Complete
                } else {
                    FramebufferStatus::IncompleteAttachment
                }
            }
        }
    }

    fn blit_color(&self, src: PixelRect, dst: PixelRect) {
        self.record(HostEvent::BlitColor { src, dst });
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        self.record(HostEvent::DeleteFramebuffer(framebuffer));
        let mut gl = self.gl.borrow_mut();
        gl.framebuffers.remove(&framebuffer);
        if gl.read == framebuffer {
            gl.read = 0;
        }
        if gl.draw == framebuffer {
            gl.draw = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::native::{ScratchFramebuffer, legacy};

    #[test]
    fn fresh_host_binds_physical_targets() {
        let host = HeadlessHost::new(GraphicsApi::Direct3D11, (400, 300), 2.0);
        assert_eq!(host.physical_size(), ViewportSize::new(800, 600));
        let (color, depth) = host.bound_targets();
        let color_texture = host.view_resource(color.unwrap()).unwrap();
        assert_eq!(
            host.device().kind(color_texture),
            Some(ObjectKind::Texture {
                size: ViewportSize::new(800, 600),
                format: TextureFormat::Rgba8,
            })
        );
        host.release(color_texture);
        assert!(depth.is_some());
        assert!(host.device().is_balanced());
    }

    #[test]
    fn sibling_surface_shares_device_not_targets() {
        let first = HeadlessHost::new(GraphicsApi::Direct3D11, (800, 600), 1.0);
        let second = first.share_device((320, 200), 1.0);
        assert_eq!(
            first.resource(ResourceKind::Device),
            second.resource(ResourceKind::Device)
        );
        assert_ne!(first.bound_targets(), second.bound_targets());
        assert_eq!(second.physical_size(), ViewportSize::new(320, 200));
    }

    #[test]
    fn api_gates_native_interfaces() {
        let modern = HeadlessHost::new(GraphicsApi::Direct3D11, (8, 8), 1.0);
        assert!(modern.modern_context().is_some());
        assert!(modern.legacy_functions().is_none());
        assert!(modern.resource(ResourceKind::OpenGlContext).is_none());

        let legacy = HeadlessHost::new(GraphicsApi::OpenGl, (8, 8), 1.0);
        assert!(legacy.legacy_functions().is_some());
        assert!(legacy.resource(ResourceKind::NativeGlContext).is_some());
        legacy.detach_native_gl_context();
        assert!(legacy.resource(ResourceKind::NativeGlContext).is_none());
    }

    #[test]
    fn binding_unknown_framebuffer_records_error() {
        let host = HeadlessHost::new(GraphicsApi::OpenGl, (8, 8), 1.0);
        host.bind_framebuffer(FramebufferTarget::Both, 42);
        assert!(legacy::check(&host, "bind_framebuffer").is_err());
        assert!(legacy::check(&host, "bind_framebuffer").is_ok());
    }

    #[test]
    fn scratch_framebuffer_unbinds_and_deletes() {
        let host = HeadlessHost::new(GraphicsApi::OpenGl, (8, 8), 1.0);
        let name = {
            let scratch = ScratchFramebuffer::new(&host).unwrap();
            host.bind_framebuffer(FramebufferTarget::Both, scratch.name());
            assert_eq!(
                host.check_framebuffer_status(),
                FramebufferStatus::MissingAttachment
            );
            scratch.name()
        };
        let events = host.events();
        assert_eq!(
            events[events.len() - 2],
            HostEvent::BindFramebuffer(FramebufferTarget::Both, 0)
        );
        assert_eq!(events[events.len() - 1], HostEvent::DeleteFramebuffer(name));
    }

    #[test]
    fn jobs_run_only_at_their_stage() {
        let host = HeadlessHost::new(GraphicsApi::Direct3D11, (8, 8), 1.0);
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = ran.clone();
        let scheduler = host.job_scheduler();
        scheduler.schedule_render_job(
            RenderJob::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            RenderStage::BeforeSynchronizing,
        );
        assert_eq!(host.run_jobs(RenderStage::AfterSwap), 0);
        assert_eq!(host.pending_jobs(), 1);
        assert_eq!(host.run_jobs(RenderStage::BeforeSynchronizing), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(host.pending_jobs(), 0);
    }

    #[test]
    fn scheduler_handle_outlives_host_borrow() {
        let host = HeadlessHost::new(GraphicsApi::Direct3D11, (8, 8), 1.0);
        let scheduler = host.job_scheduler();
        scheduler.schedule_render_job(RenderJob::new(|| {}), RenderStage::AfterSwap);
        assert_eq!(host.pending_jobs(), 1);
        let scheduled = HostEvent::JobScheduled(RenderStage::AfterSwap);
        assert!(host.events().contains(&scheduled));
    }

    #[test]
    fn pixel_ratio_rescales_physical_size() {
        let host = HeadlessHost::new(GraphicsApi::Direct3D11, (400, 300), 1.0);
        host.set_pixel_ratio(1.5);
        assert_eq!(host.physical_size(), ViewportSize::new(600, 450));
        assert_eq!(host.device_pixel_ratio(), 1.5);
    }
}
