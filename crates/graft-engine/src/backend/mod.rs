//! Backend selection and the process-scoped renderer registry.

mod config;
mod kind;
mod registry;

pub use config::{BACKEND_ENV, INTEROP_MODE_ENV, InteropConfig};
pub use kind::{BackendKind, GraphicsApi, InteropMode};
pub use registry::BackendRegistry;
