//! UI-side ownership of surface sessions.

mod item;

pub use item::{CLEAR_COLOR, SurfaceItem};
