use super::{ModernContext, NativeHandle};

/// One owned reference to a native object, released when dropped.
///
/// Holding the reference in a guard makes every exit path, early returns and
/// `?` included, give it back exactly once.
pub struct NativeRef<'c> {
    ctx: &'c dyn ModernContext,
    handle: Option<NativeHandle>,
}

impl<'c> NativeRef<'c> {
    /// Takes ownership of a reference the caller already holds on `handle`.
    #[inline]
    pub fn adopt(ctx: &'c dyn ModernContext, handle: Option<NativeHandle>) -> Self {
        Self { ctx, handle }
    }

    #[inline]
    pub fn get(&self) -> Option<NativeHandle> {
        self.handle
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.handle.is_none()
    }

    /// Drops the reference now. Releasing a null reference is a no-op.
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.ctx.release(handle);
        }
    }
}

impl Drop for NativeRef<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for NativeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("NativeRef").field(&self.handle).finish()
    }
}

/// The host's output-merger binding captured for one frame.
///
/// Frame-local: never keep it past the callback that acquired it.
pub struct CurrentTargets<'c> {
    ctx: &'c dyn ModernContext,
    color: NativeRef<'c>,
    depth: NativeRef<'c>,
}

impl<'c> CurrentTargets<'c> {
    #[inline]
    pub fn color(&self) -> Option<NativeHandle> {
        self.color.get()
    }

    #[inline]
    pub fn depth(&self) -> Option<NativeHandle> {
        self.depth.get()
    }

    /// Rebinds the captured views.
    ///
    /// The embedded renderer rebinds output-merger targets while it draws, and
    /// multi-pass frames can leave a different binding behind than the one the
    /// host had when the callback was entered.
    // TODO: confirm with the host whether restoring unconditionally is always
    // safe when it changed its own binding inside the external-commands bracket.
    pub fn restore(&self) {
        self.ctx
            .set_output_merger_targets(self.color.get(), self.depth.get());
    }

    /// Releases both views. Idempotent.
    pub fn release(&mut self) {
        self.color.release();
        self.depth.release();
    }
}

impl std::fmt::Debug for CurrentTargets<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentTargets")
            .field("color", &self.color.get())
            .field("depth", &self.depth.get())
            .finish()
    }
}

/// Captures the host's active color and depth/stencil views.
///
/// Both views come back referenced; the returned guard releases them when
/// dropped or on an explicit [`CurrentTargets::release`].
pub fn acquire_current_render_targets(ctx: &dyn ModernContext) -> CurrentTargets<'_> {
    let (color, depth) = ctx.output_merger_targets();
    log::trace!("acquired render targets color={color:?} depth={depth:?}");
    CurrentTargets {
        ctx,
        color: NativeRef::adopt(ctx, color),
        depth: NativeRef::adopt(ctx, depth),
    }
}
