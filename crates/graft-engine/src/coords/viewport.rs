/// Viewport size in physical pixels.
///
/// Every render target the embedded renderer binds for a surface is sized from
/// this value.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct ViewportSize {
    pub width: u32,
    pub height: u32,
}

impl ViewportSize {
    #[inline]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Converts a logical surface size to physical pixels.
    ///
    /// Each axis is rounded to the nearest pixel. Non-finite or non-positive
    /// pixel ratios produce an empty viewport.
    pub fn from_logical(width: u32, height: u32, pixel_ratio: f64) -> Self {
        if !pixel_ratio.is_finite() || pixel_ratio <= 0.0 {
            return Self::default();
        }

        let scale = |v: u32| (f64::from(v) * pixel_ratio).round() as u32;
        Self::new(scale(width), scale(height))
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for ViewportSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
