//! Failure taxonomy for the interop layer.
//!
//! Every failure the layer can report is a programming error: the host or the
//! native API broke an assumption the state machine relies on. Such errors
//! travel as `anyhow::Error` with an [`InteropFault`] root cause and end in
//! [`fatal`]. Frames that merely cannot be bound are skipped by the strategies
//! themselves and never surface here.

use crate::backend::{BackendKind, GraphicsApi, InteropMode};
use crate::native::{FramebufferStatus, NativeHandle, ResourceKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InteropFault {
    #[error("native {kind:?} changed after initialization ({expected} -> {found})")]
    DeviceChanged {
        kind: ResourceKind,
        expected: NativeHandle,
        found: NativeHandle,
    },

    #[error("host did not provide a native {0:?}")]
    MissingResource(ResourceKind),

    #[error("host GL context has no native platform handle")]
    ForeignContext,

    #[error("host runs {found:?} but the {expected:?} backend was selected")]
    BackendMismatch {
        expected: BackendKind,
        found: GraphicsApi,
    },

    #[error("{mode:?} is not supported on the {backend:?} backend")]
    UnsupportedCombination {
        backend: BackendKind,
        mode: InteropMode,
    },

    #[error("embedded renderer failed to initialize")]
    RendererInit,

    #[error("embedded renderer was already shut down")]
    RendererShutDown,

    #[error("native query returned an unexpected shape: {0}")]
    UnexpectedShape(&'static str),

    #[error("legacy call {call} failed with error 0x{code:04x}")]
    LegacyCall { call: &'static str, code: u32 },

    #[error("framebuffer incomplete: {0:?}")]
    IncompleteFramebuffer(FramebufferStatus),
}

/// Terminates after logging `err`.
///
/// Host callbacks have no caller to hand an error to, and the layer has no
/// graceful degradation path, so every error reaching a callback boundary ends
/// here.
#[track_caller]
pub fn fatal(err: anyhow::Error) -> ! {
    log::error!("fatal interop failure: {err:#}");
    panic!("fatal interop failure: {err:#}");
}

/// Returns the [`InteropFault`] at the root of `err`, if any.
pub fn fault_of(err: &anyhow::Error) -> Option<&InteropFault> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<InteropFault>())
}
