use anyhow::Result;

use crate::error::InteropFault;

/// Framebuffer binding points of the legacy API.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FramebufferTarget {
    Both,
    Read,
    Draw,
}

/// Result of a framebuffer completeness check.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FramebufferStatus {
    Complete,
    IncompleteAttachment,
    MissingAttachment,
    Unsupported,
    Undefined,
}

/// Integer pixel rectangle, `x0,y0` inclusive and `x1,y1` exclusive.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PixelRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl PixelRect {
    #[inline]
    pub const fn from_size(width: u32, height: u32) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: width as i32,
            y1: height as i32,
        }
    }
}

/// Legacy API entry points the interop layer needs, resolved by the host for
/// its current rendering context.
///
/// Framebuffer name `0` is the host's default framebuffer.
pub trait LegacyFunctions {
    /// Pops the oldest recorded error; `0` means no error.
    fn error(&self) -> u32;

    fn gen_framebuffer(&self) -> u32;

    fn bind_framebuffer(&self, target: FramebufferTarget, framebuffer: u32);

    /// Attaches a 2D texture as color attachment 0 of the bound framebuffer.
    fn framebuffer_color_texture(&self, texture: u32);

    fn check_framebuffer_status(&self) -> FramebufferStatus;

    /// Blits the color buffer from the read to the draw framebuffer with
    /// nearest filtering.
    fn blit_color(&self, src: PixelRect, dst: PixelRect);

    fn delete_framebuffer(&self, framebuffer: u32);
}

/// Fails with [`InteropFault::LegacyCall`] if `call` left an error behind.
pub fn check(gl: &dyn LegacyFunctions, call: &'static str) -> Result<()> {
    match gl.error() {
        0 => Ok(()),
        code => Err(InteropFault::LegacyCall { call, code }.into()),
    }
}

/// Scratch framebuffer deleted when dropped.
pub struct ScratchFramebuffer<'g> {
    gl: &'g dyn LegacyFunctions,
    name: u32,
}

impl<'g> ScratchFramebuffer<'g> {
    pub fn new(gl: &'g dyn LegacyFunctions) -> Result<Self> {
        let name = gl.gen_framebuffer();
        check(gl, "gen_framebuffer")?;
        Ok(Self { gl, name })
    }

    #[inline]
    pub fn name(&self) -> u32 {
        self.name
    }
}

impl Drop for ScratchFramebuffer<'_> {
    fn drop(&mut self) {
        self.gl.bind_framebuffer(FramebufferTarget::Both, 0);
        self.gl.delete_framebuffer(self.name);
        if let Err(err) = check(self.gl, "delete_framebuffer") {
            log::error!("{err:#}");
        }
    }
}
