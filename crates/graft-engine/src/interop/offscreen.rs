use anyhow::{Result, ensure};

use crate::backend::{BackendKind, InteropMode};
use crate::coords::ViewportSize;
use crate::error::InteropFault;
use crate::native::legacy::check;
use crate::native::{
    FramebufferStatus, FramebufferTarget, LegacyFunctions, ModernContext, NativeHandle, NativeRef,
    PixelRect, ScratchFramebuffer, acquire_current_render_targets,
};
use crate::renderer::{
    EmbeddedRenderer, FrameBufferHandle, MAIN_VIEW, RenderTargetAccess, TextureDesc, TextureFormat,
    TextureHandle,
};

use super::{InteropStrategy, StrategyCx};

/// Color texture, depth texture and the framebuffer joining them, owned by
/// one session and sized to its viewport.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct OffscreenTarget {
    pub color: TextureHandle,
    pub depth: TextureHandle,
    pub frame_buffer: FrameBufferHandle,
    pub size: ViewportSize,
}

impl OffscreenTarget {
    pub fn create(renderer: &mut dyn EmbeddedRenderer, size: ViewportSize) -> Self {
        let color = renderer.create_texture_2d(&TextureDesc::render_target(
            size,
            TextureFormat::Rgba8,
            RenderTargetAccess::ReadWrite,
        ));
        let depth = renderer.create_texture_2d(&TextureDesc::render_target(
            size,
            TextureFormat::D24S8,
            RenderTargetAccess::ReadWrite,
        ));
        let frame_buffer = renderer.create_frame_buffer(&[color, depth]);
        Self {
            color,
            depth,
            frame_buffer,
            size,
        }
    }

    /// Framebuffer first, then the surfaces it references.
    pub fn destroy(self, renderer: &mut dyn EmbeddedRenderer) {
        renderer.destroy_frame_buffer(self.frame_buffer);
        renderer.destroy_texture(self.color);
        renderer.destroy_texture(self.depth);
    }
}

/// Replaces `slot` with a target of `size` and binds it to the main view.
///
/// An empty size leaves no target behind; rendering is skipped until the
/// next non-empty resize.
fn recreate(
    slot: &mut Option<OffscreenTarget>,
    renderer: &mut dyn EmbeddedRenderer,
    size: ViewportSize,
) {
    if let Some(old) = slot.take() {
        old.destroy(renderer);
    }
    if size.is_empty() {
        log::debug!("offscreen target dropped for empty viewport");
        return;
    }

    let target = OffscreenTarget::create(renderer, size);
    renderer.set_view_frame_buffer(MAIN_VIEW, Some(target.frame_buffer));
    log::debug!("offscreen target {size} -> {:?}", target.frame_buffer);
    *slot = Some(target);
}

fn current_target(
    slot: Option<OffscreenTarget>,
    viewport: ViewportSize,
) -> Option<OffscreenTarget> {
    match slot {
        Some(target) if target.size == viewport => Some(target),
        Some(target) => {
            log::warn!(
                "offscreen target is {} but the viewport is {viewport}; frame skipped",
                target.size
            );
            None
        }
        None => {
            log::trace!("no offscreen target at {viewport}; frame skipped");
            None
        }
    }
}

// ── modern API ────────────────────────────────────────────────────────────

/// Renders into a private framebuffer and copies its color texture into the
/// host's color target.
#[derive(Debug, Default)]
pub struct ModernOffscreen {
    target: Option<OffscreenTarget>,
}

impl ModernOffscreen {
    #[inline]
    pub fn target(&self) -> Option<OffscreenTarget> {
        self.target
    }
}

impl InteropStrategy for ModernOffscreen {
    fn mode(&self) -> InteropMode {
        InteropMode::OffscreenFramebuffer
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Modern
    }

    fn resize(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()> {
        recreate(&mut self.target, &mut *cx.renderer, cx.viewport);
        Ok(())
    }

    fn render(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()> {
        let (_, ctx) = cx.native.modern()?;
        let Some(target) = current_target(self.target, cx.viewport) else {
            return Ok(());
        };

        let current = acquire_current_render_targets(ctx);
        cx.renderer
            .set_view_frame_buffer(MAIN_VIEW, Some(target.frame_buffer));
        cx.draw_payload();
        current.restore();

        if let Some(color_view) = current.color() {
            copy_into_view(ctx, &*cx.renderer, target.color, color_view)?;
        }
        Ok(())
    }

    fn release(&mut self, renderer: &mut dyn EmbeddedRenderer) {
        if let Some(target) = self.target.take() {
            target.destroy(renderer);
        }
    }
}

/// Copies the whole of `texture` into the resource behind `view`, then
/// flushes so the host sees the copy before its own commands.
fn copy_into_view(
    ctx: &dyn ModernContext,
    renderer: &dyn EmbeddedRenderer,
    texture: TextureHandle,
    view: NativeHandle,
) -> Result<()> {
    let Some(native) = renderer.internal(texture) else {
        log::trace!("offscreen color {texture:?} not realized yet; copy skipped");
        return Ok(());
    };

    let src = NativeRef::adopt(ctx, ctx.query_resource(native));
    ensure!(
        !src.is_null(),
        InteropFault::UnexpectedShape("offscreen color texture is not a resource")
    );
    let dst = NativeRef::adopt(ctx, ctx.view_resource(view));

    if let (Some(dst), Some(src)) = (dst.get(), src.get()) {
        ctx.copy_resource(dst, src);
        ctx.flush();
        log::trace!("copied {src} -> {dst}");
    }
    Ok(())
}

// ── legacy API ────────────────────────────────────────────────────────────

/// Renders into a private framebuffer and blits its color attachment into
/// the host's default framebuffer.
#[derive(Debug, Default)]
pub struct LegacyOffscreen {
    target: Option<OffscreenTarget>,
}

impl LegacyOffscreen {
    #[inline]
    pub fn target(&self) -> Option<OffscreenTarget> {
        self.target
    }
}

impl InteropStrategy for LegacyOffscreen {
    fn mode(&self) -> InteropMode {
        InteropMode::OffscreenFramebuffer
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Legacy
    }

    fn resize(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()> {
        recreate(&mut self.target, &mut *cx.renderer, cx.viewport);
        Ok(())
    }

    fn render(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()> {
        let (_, gl) = cx.native.legacy()?;
        let Some(target) = current_target(self.target, cx.viewport) else {
            return Ok(());
        };

        cx.renderer
            .set_view_frame_buffer(MAIN_VIEW, Some(target.frame_buffer));
        cx.draw_payload();

        let color = cx
            .renderer
            .internal(target.color)
            .ok_or(InteropFault::UnexpectedShape("offscreen color texture has no native name"))?;
        blit_to_default(gl, color.as_object_name(), cx.viewport)
    }

    fn release(&mut self, renderer: &mut dyn EmbeddedRenderer) {
        if let Some(target) = self.target.take() {
            target.destroy(renderer);
        }
    }
}

/// Blits `color_texture` over the viewport rectangle of framebuffer `0`,
/// color only, nearest filtering.
fn blit_to_default(
    gl: &dyn LegacyFunctions,
    color_texture: u32,
    viewport: ViewportSize,
) -> Result<()> {
    let scratch = ScratchFramebuffer::new(gl)?;

    gl.bind_framebuffer(FramebufferTarget::Both, scratch.name());
    check(gl, "bind_framebuffer")?;
    gl.framebuffer_color_texture(color_texture);
    check(gl, "framebuffer_texture_2d")?;

    let status = gl.check_framebuffer_status();
    check(gl, "check_framebuffer_status")?;
    ensure!(
        status == FramebufferStatus::Complete,
        InteropFault::IncompleteFramebuffer(status)
    );

    gl.bind_framebuffer(FramebufferTarget::Read, scratch.name());
    check(gl, "bind_framebuffer")?;
    gl.bind_framebuffer(FramebufferTarget::Draw, 0);
    check(gl, "bind_framebuffer")?;

    let rect = PixelRect::from_size(viewport.width, viewport.height);
    gl.blit_color(rect, rect);
    check(gl, "blit_framebuffer")?;

    log::trace!("blitted texture {color_texture} over {viewport}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GraphicsApi;
    use crate::error::fault_of;
    use crate::headless::{
        HeadlessHost, HeadlessPayload, HeadlessRenderer, HostEvent, INVALID_OPERATION, RendererCall,
        RendererProbe,
    };
    use crate::host::HostWindow;
    use crate::interop::NativeApi;
    use crate::native::ResourceKind;

    struct Rig {
        host: HeadlessHost,
        renderer: HeadlessRenderer,
        probe: RendererProbe,
        payload: HeadlessPayload,
    }

    impl Rig {
        fn new(api: GraphicsApi) -> Self {
            let host = HeadlessHost::new(api, (800, 600), 1.0);
            let (renderer, probe) = HeadlessRenderer::for_host(&host);
            Self {
                host,
                renderer,
                probe,
                payload: HeadlessPayload::default(),
            }
        }

        fn native(&self) -> NativeApi<'_> {
            match self.host.graphics_api() {
                GraphicsApi::OpenGl => NativeApi::Legacy {
                    context: self.host.resource(ResourceKind::NativeGlContext).unwrap(),
                    gl: self.host.legacy_functions().unwrap(),
                },
                _ => NativeApi::Modern {
                    device: self.host.resource(ResourceKind::Device).unwrap(),
                    context: self.host.modern_context().unwrap(),
                },
            }
        }

        fn run(
            &mut self,
            viewport: ViewportSize,
            f: impl FnOnce(&mut StrategyCx<'_, '_>) -> Result<()>,
        ) -> Result<()> {
            let native = match self.host.graphics_api() {
                GraphicsApi::OpenGl => NativeApi::Legacy {
                    context: self.host.resource(ResourceKind::NativeGlContext).unwrap(),
                    gl: &self.host,
                },
                _ => NativeApi::Modern {
                    device: self.host.resource(ResourceKind::Device).unwrap(),
                    context: &self.host,
                },
            };
            let mut cx = StrategyCx {
                renderer: &mut self.renderer,
                payload: &mut self.payload,
                native,
                viewport,
            };
            f(&mut cx)
        }
    }

    const VGA: ViewportSize = ViewportSize::new(800, 600);
    const XGA: ViewportSize = ViewportSize::new(1024, 768);

    // ── modern ────────────────────────────────────────────────────────────

    #[test]
    fn modern_first_frame_copies_into_host_target() {
        let mut rig = Rig::new(GraphicsApi::Direct3D11);
        let mut strategy = ModernOffscreen::default();
        rig.run(VGA, |cx| strategy.resize(cx)).unwrap();
        let target = strategy.target().unwrap();

        assert_eq!(rig.probe.texture_desc(target.color).unwrap().size, VGA);
        assert_eq!(
            rig.probe.texture_desc(target.color).unwrap().format,
            TextureFormat::Rgba8
        );
        assert_eq!(
            rig.probe.texture_desc(target.depth).unwrap().format,
            TextureFormat::D24S8
        );
        assert_eq!(
            rig.probe.view_frame_buffer(MAIN_VIEW),
            Some(Some(target.frame_buffer))
        );

        let (color_view, depth_view) = rig.host.bound_targets();
        rig.run(VGA, |cx| strategy.render(cx)).unwrap();

        let swapchain = rig.host.swapchain_color().unwrap();
        let events = rig.host.events();
        let copy = events.iter().position(|e| match e {
            HostEvent::CopyResource { dst, .. } => *dst == swapchain,
            _ => false,
        });
        let copy = copy.expect("color copied into the host target");
        assert_eq!(events[copy + 1], HostEvent::Flush);
        assert_eq!(
            events[copy - 1],
            HostEvent::SetRenderTargets {
                color: color_view,
                depth: depth_view,
            }
        );
        assert_eq!(rig.payload.stats().updates, 1);
        assert!(rig.host.device().is_balanced());
    }

    #[test]
    fn modern_resize_recreates_triad_without_reset() {
        let mut rig = Rig::new(GraphicsApi::Direct3D11);
        let mut strategy = ModernOffscreen::default();
        rig.run(VGA, |cx| strategy.resize(cx)).unwrap();
        rig.run(VGA, |cx| strategy.render(cx)).unwrap();
        let old = strategy.target().unwrap();

        rig.probe.clear_calls();
        rig.run(XGA, |cx| strategy.resize(cx)).unwrap();
        let new = strategy.target().unwrap();

        let calls = rig.probe.calls();
        assert_eq!(calls[0], RendererCall::DestroyFrameBuffer(old.frame_buffer));
        assert_eq!(calls[1], RendererCall::DestroyTexture(old.color));
        assert_eq!(calls[2], RendererCall::DestroyTexture(old.depth));
        assert_eq!(rig.probe.texture_desc(new.color).unwrap().size, XGA);
        assert_eq!(rig.probe.texture_desc(new.depth).unwrap().size, XGA);
        assert_eq!(rig.probe.count(|c| matches!(c, RendererCall::Reset(_))), 0);
        assert_eq!(rig.probe.live_textures(), 2);
        assert_eq!(rig.probe.live_frame_buffers(), 1);
    }

    #[test]
    fn modern_without_color_view_skips_copy() {
        let mut rig = Rig::new(GraphicsApi::Direct3D11);
        let mut strategy = ModernOffscreen::default();
        rig.run(VGA, |cx| strategy.resize(cx)).unwrap();
        rig.host.unbind_targets();
        rig.run(VGA, |cx| strategy.render(cx)).unwrap();

        let copies = rig
            .host
            .count_events(|e| matches!(e, HostEvent::CopyResource { .. }));
        assert_eq!(copies, 0);
        assert_eq!(rig.payload.stats().updates, 1);
        assert!(rig.host.device().is_balanced());
    }

    #[test]
    fn empty_viewport_leaves_no_target() {
        let mut rig = Rig::new(GraphicsApi::Direct3D11);
        let mut strategy = ModernOffscreen::default();
        let empty = ViewportSize::new(0, 600);
        rig.run(empty, |cx| strategy.resize(cx)).unwrap();
        assert!(strategy.target().is_none());
        rig.run(empty, |cx| strategy.render(cx)).unwrap();
        assert_eq!(rig.payload.stats().updates, 0);
    }

    #[test]
    fn release_destroys_framebuffer_before_textures() {
        let mut rig = Rig::new(GraphicsApi::Direct3D11);
        let mut strategy = ModernOffscreen::default();
        rig.run(VGA, |cx| strategy.resize(cx)).unwrap();
        let target = strategy.target().unwrap();
        rig.probe.clear_calls();

        strategy.release(&mut rig.renderer);
        assert_eq!(
            rig.probe.calls(),
            vec![
                RendererCall::DestroyFrameBuffer(target.frame_buffer),
                RendererCall::DestroyTexture(target.color),
                RendererCall::DestroyTexture(target.depth),
            ]
        );
        assert!(strategy.target().is_none());
    }

    // ── legacy ────────────────────────────────────────────────────────────

    #[test]
    fn legacy_blits_viewport_into_default_framebuffer() {
        let mut rig = Rig::new(GraphicsApi::OpenGl);
        let mut strategy = LegacyOffscreen::default();
        rig.run(VGA, |cx| strategy.resize(cx)).unwrap();
        rig.run(VGA, |cx| strategy.render(cx)).unwrap();

        let target = strategy.target().unwrap();
        let color = rig.renderer.internal(target.color).unwrap();
        let events = rig.host.events();
        let HostEvent::GenFramebuffer(scratch) = events[0] else {
            panic!("expected a scratch framebuffer first, got {:?}", events[0]);
        };
        let rect = PixelRect::from_size(800, 600);
        assert_eq!(
            events,
            vec![
                HostEvent::GenFramebuffer(scratch),
                HostEvent::BindFramebuffer(FramebufferTarget::Both, scratch),
                HostEvent::AttachColor(color.as_object_name()),
                HostEvent::BindFramebuffer(FramebufferTarget::Read, scratch),
                HostEvent::BindFramebuffer(FramebufferTarget::Draw, 0),
                HostEvent::BlitColor {
                    src: rect,
                    dst: rect,
                },
                HostEvent::BindFramebuffer(FramebufferTarget::Both, 0),
                HostEvent::DeleteFramebuffer(scratch),
            ]
        );
    }

    #[test]
    fn legacy_error_is_fatal() {
        let mut rig = Rig::new(GraphicsApi::OpenGl);
        let mut strategy = LegacyOffscreen::default();
        rig.run(VGA, |cx| strategy.resize(cx)).unwrap();

        rig.host.inject_gl_error(INVALID_OPERATION);
        let err = rig.run(VGA, |cx| strategy.render(cx)).unwrap_err();
        assert_eq!(
            fault_of(&err),
            Some(&InteropFault::LegacyCall {
                call: "gen_framebuffer",
                code: INVALID_OPERATION,
            })
        );
        let blits = rig
            .host
            .count_events(|e| matches!(e, HostEvent::BlitColor { .. }));
        assert_eq!(blits, 0);
    }

    #[test]
    fn legacy_incomplete_framebuffer_is_fatal() {
        let rig = Rig::new(GraphicsApi::OpenGl);
        let NativeApi::Legacy { gl, .. } = rig.native() else {
            unreachable!()
        };
        // Name 0xdead is not a live texture.
        let err = blit_to_default(gl, 0xdead, VGA).unwrap_err();
        let expected = InteropFault::IncompleteFramebuffer(FramebufferStatus::IncompleteAttachment);
        assert_eq!(fault_of(&err), Some(&expected));
    }

    #[test]
    fn strategy_rejects_foreign_api() {
        let mut rig = Rig::new(GraphicsApi::Direct3D11);
        let mut strategy = LegacyOffscreen::default();
        rig.run(VGA, |cx| strategy.resize(cx)).unwrap();
        let err = rig.run(VGA, |cx| strategy.render(cx)).unwrap_err();
        assert!(matches!(fault_of(&err), Some(InteropFault::UnexpectedShape(_))));
    }
}
