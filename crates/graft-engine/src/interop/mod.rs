//! Render-target interop strategies.
//!
//! A strategy decides where the embedded renderer's main view draws and how
//! those pixels end up in the host's render target. There is one strategy per
//! (backend, mode) pair, picked once per session by [`select_strategy`]; each
//! implements the same two operations:
//!
//! - `resize`: (re)create or re-bind targets for a new viewport size
//! - `render`: bind, run the payload, and hand the result to the host
//!
//! A resize always completes before the first render at the new size.

mod extern_platform;
mod offscreen;
mod synchro;

pub use extern_platform::{LegacyExternPlatform, ModernExternPlatform};
pub use offscreen::{LegacyOffscreen, ModernOffscreen, OffscreenTarget};
pub use synchro::ModernSynchro;

use anyhow::{Result, bail};

use crate::backend::{BackendKind, InteropMode};
use crate::coords::ViewportSize;
use crate::error::InteropFault;
use crate::native::{LegacyFunctions, ModernContext, NativeHandle};
use crate::renderer::{EmbeddedRenderer, Payload};

/// Native API objects of the current frame.
#[derive(Clone, Copy)]
pub enum NativeApi<'h> {
    Modern {
        device: NativeHandle,
        context: &'h dyn ModernContext,
    },
    Legacy {
        /// Native platform rendering context.
        context: NativeHandle,
        gl: &'h dyn LegacyFunctions,
    },
}

impl<'h> NativeApi<'h> {
    #[inline]
    pub fn backend(&self) -> BackendKind {
        match self {
            NativeApi::Modern { .. } => BackendKind::Modern,
            NativeApi::Legacy { .. } => BackendKind::Legacy,
        }
    }

    fn modern(&self) -> Result<(NativeHandle, &'h dyn ModernContext)> {
        match *self {
            NativeApi::Modern { device, context } => Ok((device, context)),
            NativeApi::Legacy { .. } => {
                let shape = "legacy API handed to a modern-API strategy";
                bail!(InteropFault::UnexpectedShape(shape))
            }
        }
    }

    fn legacy(&self) -> Result<(NativeHandle, &'h dyn LegacyFunctions)> {
        match *self {
            NativeApi::Legacy { context, gl } => Ok((context, gl)),
            NativeApi::Modern { .. } => {
                let shape = "modern API handed to a legacy-API strategy";
                bail!(InteropFault::UnexpectedShape(shape))
            }
        }
    }
}

/// Everything a strategy may touch during one resize or render call.
pub struct StrategyCx<'a, 'h> {
    pub renderer: &'a mut dyn EmbeddedRenderer,
    pub payload: &'a mut dyn Payload,
    pub native: NativeApi<'h>,
    pub viewport: ViewportSize,
}

impl StrategyCx<'_, '_> {
    /// Runs the payload against whatever the strategy bound to the main view.
    pub fn draw_payload(&mut self) {
        self.payload.update(&mut *self.renderer, self.viewport);
    }
}

/// One way of getting the embedded renderer's main view onto the host target.
pub trait InteropStrategy: Send {
    fn mode(&self) -> InteropMode;

    fn backend(&self) -> BackendKind;

    /// Adapts targets to `cx.viewport`. Runs once at initialization and on
    /// every viewport change after that.
    fn resize(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()>;

    /// Renders one frame inside the host's main pass.
    fn render(&mut self, cx: &mut StrategyCx<'_, '_>) -> Result<()>;

    /// Destroys every renderer resource the strategy owns.
    fn release(&mut self, renderer: &mut dyn EmbeddedRenderer);
}

/// Builds the strategy for a (backend, mode) pair.
pub fn select_strategy(
    backend: BackendKind,
    mode: InteropMode,
) -> Result<Box<dyn InteropStrategy>> {
    use BackendKind::{Legacy, Modern};
    use InteropMode::{ExternPlatform, OffscreenFramebuffer, SynchroFramebuffer};

    let strategy: Box<dyn InteropStrategy> = match (backend, mode) {
        (Modern, ExternPlatform) => Box::new(ModernExternPlatform::default()),
        (Modern, SynchroFramebuffer) => Box::new(ModernSynchro::default()),
        (Modern, OffscreenFramebuffer) => Box::new(ModernOffscreen::default()),
        (Legacy, ExternPlatform) => Box::new(LegacyExternPlatform::default()),
        (Legacy, OffscreenFramebuffer) => Box::new(LegacyOffscreen::default()),
        (Legacy, SynchroFramebuffer) => {
            bail!(InteropFault::UnsupportedCombination { backend, mode })
        }
    };
    Ok(strategy)
}
