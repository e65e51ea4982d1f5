//! Native graphics API surface the host exposes to the interop layer.
//!
//! - opaque handles and resource kinds
//! - the modern API's immediate context (`ModernContext`)
//! - the legacy API's framebuffer entry points (`LegacyFunctions`)
//! - scoped reference guards for handles returned with a reference

mod handle;
pub mod legacy;
mod modern;
mod tracker;

pub use handle::{NativeHandle, ResourceKind, ViewDimension};
pub use legacy::{
    FramebufferStatus, FramebufferTarget, LegacyFunctions, PixelRect, ScratchFramebuffer,
};
pub use modern::ModernContext;
pub use tracker::{CurrentTargets, NativeRef, acquire_current_render_targets};
