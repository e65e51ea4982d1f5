use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::backend::BackendKind;
use crate::coords::ViewportSize;
use crate::native::NativeHandle;
use crate::renderer::{
    EmbeddedRenderer, FrameBufferHandle, InitParams, PlatformData, RenderFrame, TextureDesc,
    TextureHandle, ViewId,
};

use super::device::{HeadlessDevice, ObjectKind};
use super::host::HeadlessHost;

/// One call made on a [`HeadlessRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RendererCall {
    RenderFrame,
    Init {
        backend: BackendKind,
        context: Option<NativeHandle>,
    },
    Shutdown,
    /// Platform data minus the window handle.
    SetPlatformData {
        context: Option<NativeHandle>,
        back_buffer: Option<NativeHandle>,
        back_buffer_ds: Option<NativeHandle>,
    },
    SetViewFrameBuffer {
        view: ViewId,
        frame_buffer: Option<FrameBufferHandle>,
    },
    SetViewRect {
        view: ViewId,
        size: ViewportSize,
    },
    Touch(ViewId),
    Reset(ViewportSize),
    Frame,
    CreateTexture {
        handle: TextureHandle,
        desc: TextureDesc,
    },
    CreateFrameBuffer {
        handle: FrameBufferHandle,
        attachments: Vec<TextureHandle>,
    },
    DestroyTexture(TextureHandle),
    DestroyFrameBuffer(FrameBufferHandle),
    OverrideInternal {
        texture: TextureHandle,
        native: NativeHandle,
    },
}

#[derive(Debug)]
struct TextureSlot {
    desc: TextureDesc,
    native: Option<NativeHandle>,
    /// `false` once the storage was overridden by a foreign texture.
    owned: bool,
}

#[derive(Debug, Default)]
struct RendererState {
    calls: Vec<RendererCall>,
    fail_next_init: bool,
    initialized: bool,
    frame: u32,
    back_buffer: ViewportSize,
    next_texture: u16,
    next_frame_buffer: u16,
    textures: BTreeMap<TextureHandle, TextureSlot>,
    frame_buffers: BTreeMap<FrameBufferHandle, Vec<TextureHandle>>,
    views: HashMap<ViewId, Option<FrameBufferHandle>>,
}

fn lock(state: &Mutex<RendererState>) -> MutexGuard<'_, RendererState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Software embedded renderer.
///
/// Textures are realized, i.e. get a native object, only when a frame is
/// submitted, the same way a deferred-submission renderer behaves. Native
/// objects live in the host's [`HeadlessDevice`], so resource copies and
/// framebuffer attachments resolve against real entries.
#[derive(Debug)]
pub struct HeadlessRenderer {
    device: HeadlessDevice,
    state: Arc<Mutex<RendererState>>,
}

/// Inspection side of a [`HeadlessRenderer`], kept by the caller after the
/// renderer itself moved into a registry.
#[derive(Debug, Clone)]
pub struct RendererProbe {
    state: Arc<Mutex<RendererState>>,
}

impl HeadlessRenderer {
    pub fn new(device: HeadlessDevice) -> (Self, RendererProbe) {
        let state = Arc::new(Mutex::new(RendererState::default()));
        let probe = RendererProbe {
            state: state.clone(),
        };
        (Self { device, state }, probe)
    }

    /// Renderer drawing into `host`'s device.
    pub fn for_host(host: &HeadlessHost) -> (Self, RendererProbe) {
        Self::new(host.device())
    }

    fn state(&self) -> MutexGuard<'_, RendererState> {
        lock(&self.state)
    }
}

impl EmbeddedRenderer for HeadlessRenderer {
    fn render_frame(&mut self) -> RenderFrame {
        let mut state = self.state();
        state.calls.push(RendererCall::RenderFrame);
        if state.initialized {
            RenderFrame::Render
        } else {
            RenderFrame::NoContext
        }
    }

    fn init(&mut self, params: &InitParams) -> bool {
        let mut state = self.state();
        state.calls.push(RendererCall::Init {
            backend: params.backend,
            context: params.platform.context,
        });
        if std::mem::take(&mut state.fail_next_init) {
            return false;
        }
        state.initialized = params.platform.context.is_some();
        state.initialized
    }

    fn shutdown(&mut self) {
        let mut state = self.state();
        state.calls.push(RendererCall::Shutdown);
        state.initialized = false;
        let owned: Vec<NativeHandle> = state
            .textures
            .values()
            .filter(|slot| slot.owned)
            .filter_map(|slot| slot.native)
            .collect();
        state.textures.clear();
        state.frame_buffers.clear();
        drop(state);
        for native in owned {
            self.device.retire(native);
        }
    }

    fn set_platform_data(&mut self, data: &PlatformData) {
        self.state().calls.push(RendererCall::SetPlatformData {
            context: data.context,
            back_buffer: data.back_buffer,
            back_buffer_ds: data.back_buffer_ds,
        });
    }

    fn set_view_frame_buffer(&mut self, view: ViewId, frame_buffer: Option<FrameBufferHandle>) {
        let mut state = self.state();
        let call = RendererCall::SetViewFrameBuffer { view, frame_buffer };
        state.calls.push(call);
        state.views.insert(view, frame_buffer);
    }

    fn set_view_rect(&mut self, view: ViewId, size: ViewportSize) {
        let call = RendererCall::SetViewRect { view, size };
        self.state().calls.push(call);
    }

    fn touch(&mut self, view: ViewId) {
        self.state().calls.push(RendererCall::Touch(view));
    }

    fn reset(&mut self, size: ViewportSize) {
        let mut state = self.state();
        state.calls.push(RendererCall::Reset(size));
        state.back_buffer = size;
    }

    fn frame(&mut self) -> u32 {
        let mut state = self.state();
        state.calls.push(RendererCall::Frame);
        for slot in state.textures.values_mut() {
            if slot.native.is_none() {
                slot.native = Some(self.device.create(ObjectKind::Texture {
                    size: slot.desc.size,
                    format: slot.desc.format,
                }));
            }
        }
        state.frame += 1;
        state.frame
    }

    fn create_texture_2d(&mut self, desc: &TextureDesc) -> TextureHandle {
        let mut state = self.state();
        let handle = TextureHandle(state.next_texture);
        state.next_texture += 1;
        let slot = TextureSlot {
            desc: *desc,
            native: None,
            owned: true,
        };
        state.textures.insert(handle, slot);
        state.calls.push(RendererCall::CreateTexture {
            handle,
            desc: *desc,
        });
        handle
    }

    fn create_frame_buffer(&mut self, attachments: &[TextureHandle]) -> FrameBufferHandle {
        let mut state = self.state();
        if let Some(missing) = attachments.iter().find(|t| !state.textures.contains_key(t)) {
            log::warn!("frame buffer attachment {missing:?} does not exist");
        }
        let handle = FrameBufferHandle(state.next_frame_buffer);
        state.next_frame_buffer += 1;
        state.frame_buffers.insert(handle, attachments.to_vec());
        state.calls.push(RendererCall::CreateFrameBuffer {
            handle,
            attachments: attachments.to_vec(),
        });
        handle
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        let mut state = self.state();
        state.calls.push(RendererCall::DestroyTexture(texture));
        let Some(slot) = state.textures.remove(&texture) else {
            log::warn!("destroying unknown texture {texture:?}");
            return;
        };
        let attached = state.frame_buffers.values().any(|fb| fb.contains(&texture));
        if attached {
            log::warn!("texture {texture:?} destroyed while still attached");
        }
        drop(state);
        if let (true, Some(native)) = (slot.owned, slot.native) {
            self.device.retire(native);
        }
    }

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle) {
        let mut state = self.state();
        let call = RendererCall::DestroyFrameBuffer(frame_buffer);
        state.calls.push(call);
        if state.frame_buffers.remove(&frame_buffer).is_none() {
            log::warn!("destroying unknown frame buffer {frame_buffer:?}");
        }
    }

    fn override_internal(
        &mut self,
        texture: TextureHandle,
        native: NativeHandle,
    ) -> Option<NativeHandle> {
        let mut state = self.state();
        let call = RendererCall::OverrideInternal { texture, native };
        state.calls.push(call);
        let slot = state.textures.get_mut(&texture)?;
        let previous = slot.native?;
        let retire = slot.owned.then_some(previous);
        slot.native = Some(native);
        slot.owned = false;
        drop(state);
        if let Some(previous) = retire {
            self.device.retire(previous);
        }
        Some(native)
    }

    fn internal(&self, texture: TextureHandle) -> Option<NativeHandle> {
        let state = self.state();
        state.textures.get(&texture).and_then(|slot| slot.native)
    }
}

impl RendererProbe {
    pub fn calls(&self) -> Vec<RendererCall> {
        lock(&self.state).calls.clone()
    }

    pub fn count(&self, pred: impl Fn(&RendererCall) -> bool) -> usize {
        lock(&self.state).calls.iter().filter(|c| pred(c)).count()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Makes the next `init` report failure.
    pub fn fail_next_init(&self) {
        lock(&self.state).fail_next_init = true;
    }

    pub fn is_initialized(&self) -> bool {
        lock(&self.state).initialized
    }

    pub fn live_textures(&self) -> usize {
        lock(&self.state).textures.len()
    }

    pub fn live_frame_buffers(&self) -> usize {
        lock(&self.state).frame_buffers.len()
    }

    pub fn texture_desc(&self, texture: TextureHandle) -> Option<TextureDesc> {
        let state = lock(&self.state);
        state.textures.get(&texture).map(|slot| slot.desc)
    }

    pub fn frame_buffer_attachments(
        &self,
        frame_buffer: FrameBufferHandle,
    ) -> Option<Vec<TextureHandle>> {
        lock(&self.state).frame_buffers.get(&frame_buffer).cloned()
    }

    /// Frame buffer bound to `view`; outer `None` if never set.
    pub fn view_frame_buffer(&self, view: ViewId) -> Option<Option<FrameBufferHandle>> {
        lock(&self.state).views.get(&view).copied()
    }

    /// Back buffer size set by the last `reset`.
    pub fn back_buffer(&self) -> ViewportSize {
        lock(&self.state).back_buffer
    }
}
