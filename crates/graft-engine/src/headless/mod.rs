//! Software implementation of every external interface.
//!
//! A [`HeadlessHost`] plays the host UI framework and both native graphics
//! APIs, a [`HeadlessRenderer`] plays the embedded renderer, and a
//! [`HeadlessPayload`] plays the drawing code. Native objects are reference
//! counted in a shared [`HeadlessDevice`], so reference balance and resource
//! lifetimes can be checked without a GPU.

mod device;
mod host;
mod payload;
mod renderer;

pub use device::{HeadlessDevice, ObjectKind};
pub use host::{HeadlessHost, HostEvent, INVALID_OPERATION};
pub use payload::{HeadlessPayload, PayloadStats};
pub use renderer::{HeadlessRenderer, RendererCall, RendererProbe};
