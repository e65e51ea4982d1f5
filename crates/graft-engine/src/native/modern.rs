use super::{NativeHandle, ViewDimension};

/// Immediate device context of the modern API, as exposed by the host.
///
/// Methods documented as returning a *referenced* handle increment the
/// object's reference count; the caller owns that reference and must give it
/// back through [`release`](Self::release). Wrap such handles in
/// [`NativeRef`](super::NativeRef) instead of releasing by hand.
pub trait ModernContext {
    /// Currently bound color and depth/stencil views. Both are referenced.
    fn output_merger_targets(&self) -> (Option<NativeHandle>, Option<NativeHandle>);

    /// Binds `color` and `depth` as the output-merger targets.
    fn set_output_merger_targets(&self, color: Option<NativeHandle>, depth: Option<NativeHandle>);

    /// Resource dimension of a render-target view.
    fn view_dimension(&self, view: NativeHandle) -> ViewDimension;

    /// Resource behind a color or depth view. Referenced.
    fn view_resource(&self, view: NativeHandle) -> Option<NativeHandle>;

    /// Resource reinterpreted as a 2D texture. Referenced.
    fn query_texture_2d(&self, resource: NativeHandle) -> Option<NativeHandle>;

    /// 2D texture reinterpreted as a generic resource. Referenced.
    fn query_resource(&self, texture: NativeHandle) -> Option<NativeHandle>;

    /// Copies the whole of `src` into `dst`.
    fn copy_resource(&self, dst: NativeHandle, src: NativeHandle);

    /// Submits queued commands to the GPU.
    fn flush(&self);

    /// Drops one reference; returns the remaining count.
    fn release(&self, object: NativeHandle) -> u32;
}
