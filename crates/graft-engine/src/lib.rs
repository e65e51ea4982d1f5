//! Graft engine crate.
//!
//! Lets an embedded renderer draw into a surface owned by a host UI scene
//! graph. The host keeps its swapchain and graphics context; this crate decides
//! how the embedded renderer's output reaches the host's render target.

pub mod backend;
pub mod coords;
pub mod error;
pub mod frame;
pub mod headless;
pub mod host;
pub mod interop;
pub mod lifecycle;
pub mod logging;
pub mod native;
pub mod renderer;
