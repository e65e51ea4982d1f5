use anyhow::Result;

use crate::backend::{BackendKind, InteropMode};
use crate::native::{CurrentTargets, NativeHandle, acquire_current_render_targets};
use crate::renderer::{EmbeddedRenderer, MAIN_VIEW, PlatformData};

use super::{InteropStrategy, StrategyCx};

/// Points the renderer's back buffer at the host's current targets and
/// clears the main view's framebuffer binding.
fn hand_off_modern(
    renderer: &mut dyn EmbeddedRenderer,
    device: NativeHandle,
    targets: &CurrentTargets<'_>,
) {
    renderer.set_platform_data(&PlatformData {
        window: None,
        context: Some(device),
        back_buffer: targets.color(),
        back_buffer_ds: targets.depth(),
    });
    renderer.set_view_frame_buffer(MAIN_VIEW, None);
}

fn hand_off_legacy(renderer: &mut dyn EmbeddedRenderer, context: NativeHandle) {
    renderer.set_platform_data(&PlatformData::external(context));
    renderer.set_view_frame_buffer(MAIN_VIEW, None);
}

/// Draws straight into the host's bound color and depth views.
#[derive(Debug, Default)]
pub struct ModernExternPlatform;

impl InteropStrategy for ModernExternPlatform {
    fn mode(&self) -> InteropMode {
        InteropMode::ExternPlatform
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Modern
    }

    fn resize(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()> {
        let (device, ctx) = cx.native.modern()?;
        let targets = acquire_current_render_targets(ctx);
        hand_off_modern(&mut *cx.renderer, device, &targets);
        log::debug!("extern platform rebound at {}", cx.viewport);
        Ok(())
    }

    fn render(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()> {
        let (device, ctx) = cx.native.modern()?;
        let targets = acquire_current_render_targets(ctx);
        hand_off_modern(&mut *cx.renderer, device, &targets);
        cx.draw_payload();
        targets.restore();
        Ok(())
    }

    fn release(&mut self, _renderer: &mut dyn EmbeddedRenderer) {}
}

/// Draws into whatever framebuffer the host's GL context has bound.
#[derive(Debug, Default)]
pub struct LegacyExternPlatform;

impl InteropStrategy for LegacyExternPlatform {
    fn mode(&self) -> InteropMode {
        InteropMode::ExternPlatform
    }

    fn backend(&self) -> BackendKind {
        BackendKind::Legacy
    }

    /// The renderer only learns the new back-buffer size through a reset.
    fn resize(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()> {
        let (context, _) = cx.native.legacy()?;
        hand_off_legacy(&mut *cx.renderer, context);
        cx.renderer.reset(cx.viewport);
        cx.renderer.frame();
        log::debug!("extern platform reset to {}", cx.viewport);
        Ok(())
    }

    fn render(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()> {
        let (context, _) = cx.native.legacy()?;
        hand_off_legacy(&mut *cx.renderer, context);
        cx.draw_payload();
        Ok(())
    }

    fn release(&mut self, _renderer: &mut dyn EmbeddedRenderer) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::GraphicsApi;
    use crate::coords::ViewportSize;
    use crate::headless::{HeadlessHost, HeadlessPayload, HeadlessRenderer, HostEvent, RendererCall};
    use crate::host::HostWindow;
    use crate::interop::NativeApi;
    use crate::native::ResourceKind;

    const VGA: ViewportSize = ViewportSize::new(800, 600);

    fn unbind_main_view() -> RendererCall {
        RendererCall::SetViewFrameBuffer {
            view: MAIN_VIEW,
            frame_buffer: None,
        }
    }

    #[test]
    fn modern_render_hands_host_views_and_restores() {
        let host = HeadlessHost::new(GraphicsApi::Direct3D11, (800, 600), 1.0);
        let (mut renderer, probe) = HeadlessRenderer::for_host(&host);
        let mut payload = HeadlessPayload::default();
        let device = host.resource(ResourceKind::Device).unwrap();
        let (color, depth) = host.bound_targets();

        let mut strategy = ModernExternPlatform;
        let mut cx = StrategyCx {
            renderer: &mut renderer,
            payload: &mut payload,
            native: NativeApi::Modern {
                device,
                context: &host,
            },
            viewport: VGA,
        };
        strategy.render(&mut cx).unwrap();

        let calls = probe.calls();
        assert_eq!(
            calls[0],
            RendererCall::SetPlatformData {
                context: Some(device),
                back_buffer: color,
                back_buffer_ds: depth,
            }
        );
        assert_eq!(calls[1], unbind_main_view());
        assert_eq!(
            host.events(),
            vec![HostEvent::SetRenderTargets { color, depth }]
        );
        assert_eq!(payload.stats().updates, 1);
        assert!(host.device().is_balanced());
    }

    #[test]
    fn modern_resize_never_resets() {
        let host = HeadlessHost::new(GraphicsApi::Direct3D11, (800, 600), 1.0);
        let (mut renderer, probe) = HeadlessRenderer::for_host(&host);
        let mut payload = HeadlessPayload::default();
        let device = host.resource(ResourceKind::Device).unwrap();

        let mut strategy = ModernExternPlatform;
        let mut cx = StrategyCx {
            renderer: &mut renderer,
            payload: &mut payload,
            native: NativeApi::Modern {
                device,
                context: &host,
            },
            viewport: ViewportSize::new(1024, 768),
        };
        strategy.resize(&mut cx).unwrap();

        let rebuilt = |c: &RendererCall| matches!(c, RendererCall::Reset(_) | RendererCall::Frame);
        assert_eq!(probe.count(rebuilt), 0);
        let hand_offs = probe.count(|c| matches!(c, RendererCall::SetPlatformData { .. }));
        assert_eq!(hand_offs, 1);
        assert!(host.device().is_balanced());
    }

    #[test]
    fn legacy_hands_off_once_per_frame_and_never_builds_framebuffers() {
        let host = HeadlessHost::new(GraphicsApi::OpenGl, (800, 600), 1.0);
        let (mut renderer, probe) = HeadlessRenderer::for_host(&host);
        let mut payload = HeadlessPayload::default();
        let context = host.resource(ResourceKind::NativeGlContext).unwrap();

        let mut strategy = LegacyExternPlatform;
        let mut cx = StrategyCx {
            renderer: &mut renderer,
            payload: &mut payload,
            native: NativeApi::Legacy { context, gl: &host },
            viewport: VGA,
        };
        strategy.resize(&mut cx).unwrap();
        for _ in 0..3 {
            strategy.render(&mut cx).unwrap();
        }

        let hand_off = RendererCall::SetPlatformData {
            context: Some(context),
            back_buffer: None,
            back_buffer_ds: None,
        };
        assert_eq!(probe.count(|c| *c == hand_off), 4);
        assert_eq!(probe.count(|c| *c == RendererCall::Reset(VGA)), 1);
        let built = probe.count(|c| matches!(c, RendererCall::CreateFrameBuffer { .. }));
        assert_eq!(built, 0);
        assert_eq!(probe.back_buffer(), VGA);
        assert!(host.events().is_empty());
    }

    #[test]
    fn legacy_resize_resets_then_submits() {
        let host = HeadlessHost::new(GraphicsApi::OpenGl, (800, 600), 1.0);
        let (mut renderer, probe) = HeadlessRenderer::for_host(&host);
        let mut payload = HeadlessPayload::default();
        let context = host.resource(ResourceKind::NativeGlContext).unwrap();

        let mut cx = StrategyCx {
            renderer: &mut renderer,
            payload: &mut payload,
            native: NativeApi::Legacy { context, gl: &host },
            viewport: VGA,
        };
        LegacyExternPlatform.resize(&mut cx).unwrap();

        let calls = probe.calls();
        let expected = [
            unbind_main_view(),
            RendererCall::Reset(VGA),
            RendererCall::Frame,
        ];
        assert_eq!(&calls[1..], &expected);
    }
}
