use std::num::NonZeroUsize;

/// Opaque, non-null native API object pointer.
///
/// The layer never dereferences these; it only compares them, passes them
/// back to the API that produced them, and hands them to the embedded
/// renderer. Ownership (if any) is tracked by [`NativeRef`](super::NativeRef).
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeHandle(NonZeroUsize);

impl NativeHandle {
    /// Wraps a raw pointer value; null yields `None`.
    #[inline]
    pub fn from_raw(raw: usize) -> Option<Self> {
        NonZeroUsize::new(raw).map(Self)
    }

    /// Interprets the handle as a legacy-API object name.
    #[inline]
    pub fn as_object_name(self) -> u32 {
        self.0.get() as u32
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeHandle({:#x})", self.0)
    }
}

impl std::fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Kinds of native objects the host hands out on request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Modern API device.
    Device,
    /// Modern API immediate device context.
    DeviceContext,
    /// Host framework's legacy rendering context object.
    OpenGlContext,
    /// Platform rendering context behind [`ResourceKind::OpenGlContext`].
    NativeGlContext,
}

/// Resource dimension of a render-target view.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ViewDimension {
    Texture2d,
    Texture2dMultisampled,
    Texture2dArray,
    Other,
}
