use anyhow::{Context, Result};

use super::{BackendKind, InteropMode};

/// Environment variable selecting the backend family.
pub const BACKEND_ENV: &str = "GRAFT_BACKEND";

/// Environment variable selecting the interop mode.
pub const INTEROP_MODE_ENV: &str = "GRAFT_INTEROP_MODE";

/// The two process-wide choices made once at startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct InteropConfig {
    pub backend: BackendKind,
    pub mode: InteropMode,
}

impl Default for InteropConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Modern,
            mode: InteropMode::OffscreenFramebuffer,
        }
    }
}

impl InteropConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Unset variables keep their default; set but unparsable ones are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(BACKEND_ENV) {
            config.backend = raw
                .parse()
                .with_context(|| format!("invalid {BACKEND_ENV}"))?;
        }
        if let Some(raw) = lookup(INTEROP_MODE_ENV) {
            config.mode = raw
                .parse()
                .with_context(|| format!("invalid {INTEROP_MODE_ENV}"))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_lookup_gives_default() {
        let config = InteropConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, InteropConfig::default());
    }

    #[test]
    fn lookup_overrides_both_choices() {
        let config = InteropConfig::from_lookup(|key| match key {
            BACKEND_ENV => Some("legacy".into()),
            INTEROP_MODE_ENV => Some("extern-platform".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.backend, BackendKind::Legacy);
        assert_eq!(config.mode, InteropMode::ExternPlatform);
    }

    #[test]
    fn bad_value_names_the_variable() {
        let err = InteropConfig::from_lookup(|key| (key == BACKEND_ENV).then(|| "metal".into()))
            .unwrap_err();
        assert!(format!("{err:#}").contains(BACKEND_ENV));
    }
}
