use std::str::FromStr;

use anyhow::bail;

/// Graphics API family the embedded renderer submits through.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Modern explicit API (device + immediate device context).
    Modern,
    /// Legacy immediate-mode API (a current rendering context).
    Legacy,
}

impl BackendKind {
    /// Scene-graph API the host must run for this backend.
    pub fn graphics_api(self) -> GraphicsApi {
        match self {
            BackendKind::Modern => GraphicsApi::Direct3D11,
            BackendKind::Legacy => GraphicsApi::OpenGl,
        }
    }
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "modern" | "d3d11" | "direct3d11" => Ok(BackendKind::Modern),
            "legacy" | "gl" | "opengl" => Ok(BackendKind::Legacy),
            other => bail!("unknown backend `{other}` (expected modern or legacy)"),
        }
    }
}

/// Host scene-graph graphics API as reported by the host.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum GraphicsApi {
    Direct3D11,
    OpenGl,
    /// Anything the interop layer cannot talk to (software, other RHIs).
    Other,
}

/// How the embedded renderer's output reaches the host's render target.
///
/// Selected once at startup; never changes for the lifetime of the process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum InteropMode {
    /// The host owns the back buffer; the renderer draws into it directly.
    ExternPlatform,
    /// Renderer textures alias the host's native target resources.
    SynchroFramebuffer,
    /// The renderer draws into its own target, then copies into the host's.
    OffscreenFramebuffer,
}

impl FromStr for InteropMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "extern-platform" | "extern" => Ok(InteropMode::ExternPlatform),
            "synchro-framebuffer" | "synchro" => Ok(InteropMode::SynchroFramebuffer),
            "offscreen-framebuffer" | "offscreen" => Ok(InteropMode::OffscreenFramebuffer),
            other => bail!(
                "unknown interop mode `{other}` \
                 (expected extern-platform, synchro-framebuffer or offscreen-framebuffer)"
            ),
        }
    }
}
