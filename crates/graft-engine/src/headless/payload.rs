use std::sync::{Arc, Mutex, PoisonError};

use crate::coords::ViewportSize;
use crate::renderer::{EmbeddedRenderer, MAIN_VIEW, Payload};

/// What a [`HeadlessPayload`] has been asked to do so far.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PayloadStats {
    pub inits: u32,
    pub updates: u32,
    pub last_viewport: Option<ViewportSize>,
}

/// Minimal payload: one touched main view per frame.
///
/// Clones share their statistics, so a test can keep one clone while the
/// session owns the other.
#[derive(Debug, Default, Clone)]
pub struct HeadlessPayload {
    stats: Arc<Mutex<PayloadStats>>,
}

impl HeadlessPayload {
    pub fn stats(&self) -> PayloadStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_stats(&self, f: impl FnOnce(&mut PayloadStats)) {
        f(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl Payload for HeadlessPayload {
    fn init(&mut self, _renderer: &mut dyn EmbeddedRenderer) {
        self.with_stats(|s| s.inits += 1);
    }

    fn update(&mut self, renderer: &mut dyn EmbeddedRenderer, viewport: ViewportSize) {
        renderer.set_view_rect(MAIN_VIEW, viewport);
        renderer.touch(MAIN_VIEW);
        renderer.frame();
        self.with_stats(|s| {
            s.updates += 1;
            s.last_viewport = Some(viewport);
        });
    }
}
