// PixelPose
// copyright zipxing@hotmail.com 2022～2025

//! Public configuration surface: asset root path and smoothing coefficient.
//! Both are settable at any time; the instance applies root changes by
//! restarting its load cycle in place.

use crate::util::normalize_root;
use serde::Deserialize;

/// Default smoothing coefficient of the motion driver.
pub const DEFAULT_SMOOTHING: f32 = 0.12;

/// Smoothing must stay inside (0, 1]; 1.0 snaps to the target immediately.
const MIN_SMOOTHING: f32 = 1e-4;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Root path the four quadrant assets are fetched from.
    pub asset_root: String,
    /// Per-tick interpolation factor of the motion driver.
    pub smoothing: f32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            asset_root: "/".to_string(),
            smoothing: DEFAULT_SMOOTHING,
        }
    }
}

impl PoseConfig {
    pub fn new(asset_root: &str, smoothing: f32) -> Self {
        Self {
            asset_root: asset_root.to_string(),
            smoothing,
        }
        .normalized()
    }

    /// Parse from a TOML snippet, missing keys fall back to defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        let cfg: PoseConfig = toml::from_str(s)?;
        Ok(cfg.normalized())
    }

    /// Normalize the root to a trailing slash and clamp smoothing into (0, 1].
    pub fn normalized(mut self) -> Self {
        self.asset_root = normalize_root(&self.asset_root);
        self.smoothing = clamp_smoothing(self.smoothing);
        self
    }
}

pub fn clamp_smoothing(s: f32) -> f32 {
    s.clamp(MIN_SMOOTHING, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = PoseConfig::default();
        assert_eq!(cfg.asset_root, "/");
        assert_eq!(cfg.smoothing, DEFAULT_SMOOTHING);
    }

    #[test]
    fn test_from_toml() {
        let cfg = PoseConfig::from_toml_str("asset_root = \"cdn/char\"\nsmoothing = 0.3\n").unwrap();
        assert_eq!(cfg.asset_root, "cdn/char/");
        assert_eq!(cfg.smoothing, 0.3);

        // missing keys use defaults
        let cfg = PoseConfig::from_toml_str("").unwrap();
        assert_eq!(cfg.asset_root, "/");
        assert_eq!(cfg.smoothing, DEFAULT_SMOOTHING);
    }

    #[test]
    fn test_smoothing_clamped() {
        let cfg = PoseConfig::new("/", 7.0);
        assert_eq!(cfg.smoothing, 1.0);
        let cfg = PoseConfig::new("/", -1.0);
        assert!(cfg.smoothing > 0.0);
    }
}
