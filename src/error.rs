// PixelPose
// copyright zipxing@hotmail.com 2022～2025

//! Error taxonomy for asset loading and shared-context management.
//!
//! AssetMissing triggers the mobile→desktop variant fallback once and is
//! fatal afterwards. AssetDimensionMismatch is always fatal: it indicates a
//! corrupt asset set. ContextLost is recoverable, the owning instance pauses
//! and reloads when the context comes back.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    /// A quadrant URL 404s or the payload fails to decode.
    #[error("asset missing or undecodable: {url}")]
    AssetMissing { url: String },

    /// Quadrant images differ in pixel size.
    #[error("quadrant dimension mismatch at {url}: expected {expected:?}, found {found:?}")]
    AssetDimensionMismatch {
        url: String,
        expected: (u32, u32),
        found: (u32, u32),
    },

    /// The shared rendering context could not be created. Every queued
    /// instance is rejected with this.
    #[error("shared render context creation failed: {reason}")]
    ContextCreationFailure { reason: String },

    /// Platform-level interruption of the shared context.
    #[error("render context lost")]
    ContextLost,

    /// The instance was torn down before its queued init ran.
    #[error("instance torn down before init")]
    InstanceGone,
}
