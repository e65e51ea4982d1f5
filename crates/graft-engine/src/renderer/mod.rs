//! Embedded renderer contract.
//!
//! The embedded renderer is an external library with its own device, frame
//! and texture model. The interop layer only drives it through
//! [`EmbeddedRenderer`]; the drawing itself belongs to a [`Payload`].
//!
//! Convention:
//! - handles are small indices owned by the renderer; `None` means "invalid"
//! - view [`MAIN_VIEW`] is the one bound to the host surface

mod payload;

pub use payload::Payload;

use raw_window_handle::RawWindowHandle;

use crate::backend::BackendKind;
use crate::coords::ViewportSize;
use crate::native::NativeHandle;

/// Renderer view (pass) index.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(pub u16);

/// View bound to the host surface.
pub const MAIN_VIEW: ViewId = ViewId(0);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(pub u16);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameBufferHandle(pub u16);

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    /// 8-bit RGBA color.
    Rgba8,
    /// 24-bit depth, 8-bit stencil.
    D24S8,
}

/// How a render-target texture may be accessed besides being drawn into.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RenderTargetAccess {
    /// Can also be read back or copied from.
    ReadWrite,
    /// Only ever drawn into; its storage may be replaced by a foreign resource.
    WriteOnly,
}

/// Creation parameters of a 2D render-target texture.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TextureDesc {
    pub size: ViewportSize,
    pub format: TextureFormat,
    pub access: RenderTargetAccess,
}

impl TextureDesc {
    #[inline]
    pub const fn render_target(
        size: ViewportSize,
        format: TextureFormat,
        access: RenderTargetAccess,
    ) -> Self {
        Self {
            size,
            format,
            access,
        }
    }
}

/// Native objects the renderer draws through when it does not own the
/// back buffer.
///
/// A `None` window tells the renderer the context is external: it must not
/// create a swapchain of its own.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct PlatformData {
    pub window: Option<RawWindowHandle>,
    /// Device (modern API) or native rendering context (legacy API).
    pub context: Option<NativeHandle>,
    pub back_buffer: Option<NativeHandle>,
    pub back_buffer_ds: Option<NativeHandle>,
}

impl PlatformData {
    /// Platform data for an externally owned context with no back buffer.
    #[inline]
    pub fn external(context: NativeHandle) -> Self {
        Self {
            context: Some(context),
            ..Self::default()
        }
    }
}

/// One-time initialization parameters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InitParams {
    pub backend: BackendKind,
    pub platform: PlatformData,
}

/// Outcome of handing a frame to the renderer's render side.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RenderFrame {
    /// Nothing was submitted yet; the renderer now runs single-threaded.
    NoContext,
    Render,
    Timeout,
    Exiting,
}

/// The embedded renderer as seen by the interop layer.
///
/// All calls happen on the host's render thread, under the registry's lock.
pub trait EmbeddedRenderer: Send {
    /// Hands one frame to the render side. Called before [`init`](Self::init)
    /// it switches the renderer to single-threaded operation on the caller's
    /// thread.
    fn render_frame(&mut self) -> RenderFrame;

    /// Returns `false` if initialization failed.
    fn init(&mut self, params: &InitParams) -> bool;

    fn shutdown(&mut self);

    fn set_platform_data(&mut self, data: &PlatformData);

    /// Binds `frame_buffer` to `view`; `None` selects the back buffer.
    fn set_view_frame_buffer(&mut self, view: ViewId, frame_buffer: Option<FrameBufferHandle>);

    fn set_view_rect(&mut self, view: ViewId, size: ViewportSize);

    /// Submits an empty draw so `view` is processed this frame.
    fn touch(&mut self, view: ViewId);

    /// Resizes the back buffer.
    fn reset(&mut self, size: ViewportSize);

    /// Submits the current frame; returns the frame number.
    fn frame(&mut self) -> u32;

    fn create_texture_2d(&mut self, desc: &TextureDesc) -> TextureHandle;

    fn create_frame_buffer(&mut self, attachments: &[TextureHandle]) -> FrameBufferHandle;

    fn destroy_texture(&mut self, texture: TextureHandle);

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle);

    /// Points `texture`'s storage at a foreign native texture.
    ///
    /// Returns the native texture now backing `texture`, or `None` while the
    /// texture has not been realized by a [`frame`](Self::frame) yet.
    fn override_internal(
        &mut self,
        texture: TextureHandle,
        native: NativeHandle,
    ) -> Option<NativeHandle>;

    /// Native object backing `texture`; `None` until realized.
    fn internal(&self, texture: TextureHandle) -> Option<NativeHandle>;
}
