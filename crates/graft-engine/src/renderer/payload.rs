use crate::coords::ViewportSize;

use super::EmbeddedRenderer;

/// Drawing code run inside the host's main pass.
///
/// The payload never sees native handles or render targets: by the time
/// [`update`](Self::update) runs, the interop strategy has already bound
/// whatever target this frame renders into.
pub trait Payload: Send {
    /// Creates payload resources. Called once, after the first resize.
    fn init(&mut self, renderer: &mut dyn EmbeddedRenderer);

    /// Records and submits one frame at `viewport`. Must not block on the GPU.
    fn update(&mut self, renderer: &mut dyn EmbeddedRenderer, viewport: ViewportSize);
}
