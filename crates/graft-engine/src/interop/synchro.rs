use anyhow::{Result, bail};

use crate::backend::{BackendKind, InteropMode};
use crate::coords::ViewportSize;
use crate::error::InteropFault;
use crate::native::{
    ModernContext, NativeHandle, NativeRef, ViewDimension, acquire_current_render_targets,
};
use crate::renderer::{
    EmbeddedRenderer, FrameBufferHandle, MAIN_VIEW, RenderTargetAccess, TextureDesc, TextureFormat,
    TextureHandle,
};

use super::{InteropStrategy, StrategyCx};

/// Write-only renderer textures whose storage is swapped for the host's.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Placeholders {
    color: TextureHandle,
    depth: TextureHandle,
}

/// Native textures last installed into the placeholders.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct BoundNatives {
    color: NativeHandle,
    depth: NativeHandle,
}

/// Makes a renderer framebuffer alias the host's own color and depth
/// textures, so the renderer draws into them with no copy.
///
/// The override happens once per distinct pair of native textures; a stable
/// host target costs nothing per frame.
#[derive(Debug, Default)]
pub struct ModernSynchro {
    placeholders: Option<Placeholders>,
    frame_buffer: Option<FrameBufferHandle>,
    bound: Option<BoundNatives>,
    /// Placeholders and framebuffer must be rebuilt before the next bind.
    reconfigure: bool,
}

impl ModernSynchro {
    #[inline]
    pub fn frame_buffer(&self) -> Option<FrameBufferHandle> {
        self.frame_buffer
    }

    #[inline]
    pub fn is_reconfigure_pending(&self) -> bool {
        self.reconfigure
    }

    fn destroy_frame_buffer(&mut self, renderer: &mut dyn EmbeddedRenderer) {
        if let Some(frame_buffer) = self.frame_buffer.take() {
            renderer.destroy_frame_buffer(frame_buffer);
        }
    }

    fn destroy_placeholders(&mut self, renderer: &mut dyn EmbeddedRenderer) {
        if let Some(old) = self.placeholders.take() {
            renderer.destroy_texture(old.color);
            renderer.destroy_texture(old.depth);
        }
        self.bound = None;
    }

    /// New placeholders at `size`, realized by one submitted frame since only
    /// realized textures can be overridden.
    fn recreate_placeholders(
        &mut self,
        renderer: &mut dyn EmbeddedRenderer,
        size: ViewportSize,
    ) -> Placeholders {
        self.destroy_frame_buffer(renderer);
        self.destroy_placeholders(renderer);

        let desc = |format| TextureDesc::render_target(size, format, RenderTargetAccess::WriteOnly);
        let placeholders = Placeholders {
            color: renderer.create_texture_2d(&desc(TextureFormat::Rgba8)),
            depth: renderer.create_texture_2d(&desc(TextureFormat::D24S8)),
        };
        renderer.frame();
        log::debug!("synchro placeholders {size} -> {placeholders:?}");

        self.placeholders = Some(placeholders);
        placeholders
    }
}

/// Resolves the 2D texture behind a render-target view.
fn view_texture<'c>(
    ctx: &'c dyn ModernContext,
    view: NativeHandle,
    shape: &'static str,
) -> Result<(NativeRef<'c>, NativeHandle)> {
    let resource = NativeRef::adopt(ctx, ctx.view_resource(view));
    let Some(raw) = resource.get() else {
        bail!(InteropFault::UnexpectedShape(shape));
    };
    let texture = NativeRef::adopt(ctx, ctx.query_texture_2d(raw));
    let Some(native) = texture.get() else {
        bail!(InteropFault::UnexpectedShape(shape));
    };
    Ok((texture, native))
}

impl InteropStrategy for ModernSynchro {
    fn mode(&self) -> InteropMode {
        InteropMode::SynchroFramebuffer
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Modern
    }

    fn resize(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()> {
        cx.renderer
            .set_view_frame_buffer(MAIN_VIEW, self.frame_buffer);
        cx.renderer.reset(cx.viewport);
        cx.renderer.frame();
        self.reconfigure = true;
        log::debug!("synchro reset to {}", cx.viewport);
        Ok(())
    }

    fn render(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()> {
        let (_, ctx) = cx.native.modern()?;
        let targets = acquire_current_render_targets(ctx);

        let (Some(color_view), Some(depth_view)) = (targets.color(), targets.depth()) else {
            log::debug!("host has no color and depth target bound; frame skipped");
            return Ok(());
        };
        let dimension = ctx.view_dimension(color_view);
        if dimension != ViewDimension::Texture2d {
            log::debug!("host color view is {dimension:?}, not a plain 2D texture; frame skipped");
            return Ok(());
        }

        let (_color_ref, color) =
            view_texture(ctx, color_view, "color view resource is not a 2D texture")?;
        let (_depth_ref, depth) =
            view_texture(ctx, depth_view, "depth view resource is not a 2D texture")?;
        let natives = BoundNatives { color, depth };

        let reusable = if self.reconfigure {
            None
        } else {
            self.placeholders
        };
        let placeholders = match reusable {
            Some(placeholders) => placeholders,
            None => self.recreate_placeholders(&mut *cx.renderer, cx.viewport),
        };

        if self.bound != Some(natives) {
            let renderer = &mut *cx.renderer;
            let color = renderer.override_internal(placeholders.color, natives.color);
            let depth = renderer.override_internal(placeholders.depth, natives.depth);
            self.bound = color
                .zip(depth)
                .map(|(color, depth)| BoundNatives { color, depth });
            self.reconfigure = true;
            log::debug!("synchro overrode placeholders with {color:?}/{depth:?}");
        }

        let reusable = if self.reconfigure {
            None
        } else {
            self.frame_buffer
        };
        let frame_buffer = match reusable {
            Some(frame_buffer) => frame_buffer,
            None => {
                self.destroy_frame_buffer(&mut *cx.renderer);
                let attachments = [placeholders.color, placeholders.depth];
                let frame_buffer = cx.renderer.create_frame_buffer(&attachments);
                self.frame_buffer = Some(frame_buffer);
                self.reconfigure = false;
                frame_buffer
            }
        };

        cx.renderer
            .set_view_frame_buffer(MAIN_VIEW, Some(frame_buffer));
        cx.draw_payload();
        targets.restore();
        Ok(())
    }

    fn release(&mut self, renderer: &mut dyn EmbeddedRenderer) {
        self.destroy_frame_buffer(renderer);
        self.destroy_placeholders(renderer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GraphicsApi;
    use crate::error::fault_of;
    use crate::headless::{
        HeadlessHost, HeadlessPayload, HeadlessRenderer, HostEvent, RendererCall, RendererProbe,
    };
    use crate::host::HostWindow;
    use crate::interop::NativeApi;
    use crate::native::ResourceKind;

    const VGA: ViewportSize = ViewportSize::new(800, 600);
    const XGA: ViewportSize = ViewportSize::new(1024, 768);

    struct Rig {
        host: HeadlessHost,
        renderer: HeadlessRenderer,
        probe: RendererProbe,
        payload: HeadlessPayload,
        strategy: ModernSynchro,
    }

    impl Rig {
        fn new() -> Self {
            let host = HeadlessHost::new(GraphicsApi::Direct3D11, (800, 600), 1.0);
            let (renderer, probe) = HeadlessRenderer::for_host(&host);
            let mut rig = Self {
                host,
                renderer,
                probe,
                payload: HeadlessPayload::default(),
                strategy: ModernSynchro::default(),
            };
            rig.resize(VGA).unwrap();
            rig
        }

        fn with_cx<R>(
            &mut self,
            viewport: ViewportSize,
            f: impl FnOnce(&mut ModernSynchro, &mut StrategyCx<'_, '_>) -> R,
        ) -> R {
            let device = self.host.resource(ResourceKind::Device).unwrap();
            let mut cx = StrategyCx {
                renderer: &mut self.renderer,
                payload: &mut self.payload,
                native: NativeApi::Modern {
                    device,
                    context: &self.host,
                },
                viewport,
            };
            f(&mut self.strategy, &mut cx)
        }

        fn resize(&mut self, viewport: ViewportSize) -> Result<()> {
            self.with_cx(viewport, |s, cx| s.resize(cx))
        }

        fn render(&mut self, viewport: ViewportSize) -> Result<()> {
            self.with_cx(viewport, |s, cx| s.render(cx))
        }

        fn overrides(&self) -> usize {
            self.probe
                .count(|c| matches!(c, RendererCall::OverrideInternal { .. }))
        }
    }

    #[test]
    fn stable_target_is_overridden_once() {
        let mut rig = Rig::new();
        for _ in 0..5 {
            rig.render(VGA).unwrap();
        }
        assert_eq!(rig.overrides(), 2);
        let frame_buffers = rig
            .probe
            .count(|c| matches!(c, RendererCall::CreateFrameBuffer { .. }));
        assert_eq!(frame_buffers, 1);
        assert_eq!(rig.payload.stats().updates, 5);
        assert!(!rig.strategy.is_reconfigure_pending());
        assert!(rig.host.device().is_balanced());
    }

    #[test]
    fn framebuffer_aliases_host_textures() {
        let mut rig = Rig::new();
        rig.render(VGA).unwrap();

        let frame_buffer = rig.strategy.frame_buffer().unwrap();
        let attachments = rig.probe.frame_buffer_attachments(frame_buffer).unwrap();
        assert_eq!(
            rig.renderer.internal(attachments[0]),
            rig.host.swapchain_color()
        );
        assert_eq!(
            rig.probe.view_frame_buffer(MAIN_VIEW),
            Some(Some(frame_buffer))
        );
        assert_eq!(
            rig.probe.texture_desc(attachments[0]).unwrap().access,
            RenderTargetAccess::WriteOnly
        );
    }

    #[test]
    fn new_host_target_is_overridden_again() {
        let mut rig = Rig::new();
        rig.render(VGA).unwrap();
        rig.host.bind_fresh_targets(800, 600);
        rig.render(VGA).unwrap();
        rig.render(VGA).unwrap();
        assert_eq!(rig.overrides(), 4);
        let frame_buffer = rig.strategy.frame_buffer().unwrap();
        let attachments = rig.probe.frame_buffer_attachments(frame_buffer).unwrap();
        assert_eq!(
            rig.renderer.internal(attachments[0]),
            rig.host.swapchain_color()
        );
    }

    #[test]
    fn resize_resets_and_rebuilds_at_new_size() {
        let mut rig = Rig::new();
        rig.render(VGA).unwrap();

        rig.probe.clear_calls();
        rig.host.bind_fresh_targets(1024, 768);
        rig.resize(XGA).unwrap();
        assert_eq!(rig.probe.calls()[1], RendererCall::Reset(XGA));
        assert!(rig.strategy.is_reconfigure_pending());

        rig.render(XGA).unwrap();
        let frame_buffer = rig.strategy.frame_buffer().unwrap();
        let attachments = rig.probe.frame_buffer_attachments(frame_buffer).unwrap();
        assert_eq!(rig.probe.texture_desc(attachments[0]).unwrap().size, XGA);
        assert_eq!(rig.probe.live_textures(), 2);
        assert_eq!(rig.probe.live_frame_buffers(), 1);
    }

    #[test]
    fn placeholders_recreated_after_resize_even_for_same_natives() {
        let mut rig = Rig::new();
        rig.render(VGA).unwrap();
        let before = rig.overrides();

        rig.resize(VGA).unwrap();
        rig.render(VGA).unwrap();
        assert_eq!(rig.overrides(), before + 2);
    }

    #[test]
    fn missing_depth_view_skips_frame() {
        let mut rig = Rig::new();
        let (color, _) = rig.host.bound_targets();
        rig.host.set_output_merger_targets(color, None);
        rig.host.clear_events();
        rig.probe.clear_calls();

        rig.render(VGA).unwrap();
        assert!(rig.probe.calls().is_empty());
        assert!(rig.host.events().is_empty());
        assert!(rig.host.device().is_balanced());
    }

    #[test]
    fn multisampled_color_view_skips_frame() {
        let mut rig = Rig::new();
        rig.host
            .set_color_view_dimension(ViewDimension::Texture2dMultisampled);
        rig.probe.clear_calls();

        rig.render(VGA).unwrap();
        assert!(rig.probe.calls().is_empty());
        assert_eq!(rig.payload.stats().updates, 0);
        assert!(rig.host.device().is_balanced());
    }

    #[test]
    fn non_texture_resource_is_fatal() {
        let mut rig = Rig::new();
        // A depth view whose resource is a device, not a texture.
        let device = rig.host.device();
        let bogus = device.create(crate::headless::ObjectKind::DepthView {
            resource: rig.host.resource(ResourceKind::DeviceContext).unwrap(),
        });
        let (color, _) = rig.host.bound_targets();
        rig.host.set_output_merger_targets(color, Some(bogus));

        let err = rig.render(VGA).unwrap_err();
        let expected = InteropFault::UnexpectedShape("depth view resource is not a 2D texture");
        assert_eq!(fault_of(&err), Some(&expected));
        assert!(device.is_balanced());
        let copies = rig
            .host
            .count_events(|e| matches!(e, HostEvent::CopyResource { .. }));
        assert_eq!(copies, 0);
    }

    #[test]
    fn release_destroys_framebuffer_before_placeholders() {
        let mut rig = Rig::new();
        rig.render(VGA).unwrap();
        let frame_buffer = rig.strategy.frame_buffer().unwrap();
        rig.probe.clear_calls();

        rig.strategy.release(&mut rig.renderer);
        let calls = rig.probe.calls();
        assert_eq!(calls[0], RendererCall::DestroyFrameBuffer(frame_buffer));
        assert!(matches!(calls[1], RendererCall::DestroyTexture(_)));
        assert!(matches!(calls[2], RendererCall::DestroyTexture(_)));
        assert_eq!(rig.probe.live_textures(), 0);
        let swapchain = rig.host.swapchain_color().unwrap();
        assert!(rig.host.device().is_live(swapchain));
    }
}
