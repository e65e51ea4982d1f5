//! Size types shared by the interop strategies and the host glue.
//!
//! The host reports logical sizes plus a pixel ratio; render targets are always
//! allocated in physical pixels.

mod viewport;

pub use viewport::ViewportSize;
