//! Renderer settings.

use serde::{Deserialize, Serialize};

/// How frames are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// One deterministic sample per pixel, shown as-is.
    #[default]
    RealTime,
    /// Jittered samples blended into a running average while nothing moves.
    Progressive,
}

impl RenderMode {
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::RealTime => Self::Progressive,
            Self::Progressive => Self::RealTime,
        }
    }

    pub const fn is_real_time(self) -> bool {
        matches!(self, Self::RealTime)
    }
}

/// User-facing renderer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub mode: RenderMode,
    /// Stop dispatching once a still episode has this many samples (0 = never).
    pub max_samples: u32,
    /// Equirectangular sky image; a procedural gradient is used when absent.
    pub sky_path: Option<String>,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            mode: RenderMode::RealTime,
            max_samples: 0,
            sky_path: None,
        }
    }
}

impl RenderSettings {
    pub fn with_mode(mut self, mode: RenderMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_samples(mut self, max_samples: u32) -> Self {
        self.max_samples = max_samples;
        self
    }

    pub fn with_sky(mut self, path: impl Into<String>) -> Self {
        self.sky_path = Some(path.into());
        self
    }

    /// Sample cap, if any.
    pub fn sample_limit(&self) -> Option<u32> {
        (self.max_samples > 0).then_some(self.max_samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggle_round_trips() {
        assert_eq!(RenderMode::RealTime.toggled(), RenderMode::Progressive);
        assert_eq!(RenderMode::Progressive.toggled().toggled(), RenderMode::Progressive);
    }

    #[test]
    fn zero_means_unbounded() {
        assert_eq!(RenderSettings::default().sample_limit(), None);
        assert_eq!(
            RenderSettings::default().with_max_samples(64).sample_limit(),
            Some(64)
        );
    }
}
