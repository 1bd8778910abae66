//! Error Types
//!
//! This module defines the error type shared by every Prism crate.
//!
//! # Overview
//!
//! [`PrismError`] covers the failure modes of the render host:
//! - device-class failures (lost, removed, reset, hung, 2D target recreation)
//! - resource creation and texture loading failures
//! - per-node render core faults
//! - configuration and lifecycle misuse
//!
//! The render host splits errors into two policies with
//! [`PrismError::is_device_error`]: device-class errors drive the device-loss
//! recovery transition, everything else reaching the top of a frame is fatal
//! for the host.
//!
//! # Usage
//!
//! ```rust,ignore
//! use prism_core::errors::{PrismError, Result};
//!
//! fn present() -> Result<()> {
//!     Err(PrismError::DeviceRemoved("driver update".into()))
//! }
//! ```

use thiserror::Error;

/// The main error type for the Prism render host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrismError {
    // ========================================================================
    // Device Errors (recoverable through the device-loss transition)
    // ========================================================================
    /// The graphics device was lost.
    #[error("Graphics device lost: {0}")]
    DeviceLost(String),

    /// The graphics device was removed (driver update, adapter unplugged, ...).
    #[error("Graphics device removed: {0}")]
    DeviceRemoved(String),

    /// The graphics device was reset by the driver.
    #[error("Graphics device reset: {0}")]
    DeviceReset(String),

    /// The graphics device stopped responding.
    #[error("Graphics device hung: {0}")]
    DeviceHung(String),

    /// The 2D render target must be recreated before drawing can continue.
    #[error("2D render target must be recreated")]
    Recreate2DTarget,

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// A GPU resource (buffer, texture, bitmap) could not be created.
    #[error("Failed to create {kind}: {reason}")]
    ResourceCreation {
        /// What was being created
        kind: &'static str,
        /// Backend supplied reason
        reason: String,
    },

    /// A texture could not be loaded by its loader.
    #[error("Texture load failed: {0}")]
    TextureLoad(String),

    /// A named technique was not registered with the effects manager.
    #[error("Technique not found: {0}")]
    TechniqueNotFound(String),

    // ========================================================================
    // Scene & Render Core Errors
    // ========================================================================
    /// A node handle no longer refers to a live node.
    #[error("Scene node not found")]
    NodeNotFound,

    /// A render core failed during update or draw.
    #[error("Render core fault in '{node}': {reason}")]
    CoreFault {
        /// Name of the node owning the core
        node: String,
        /// Description of the fault
        reason: String,
    },

    // ========================================================================
    // Host & Configuration Errors
    // ========================================================================
    /// The render host has been disposed and cannot be used again.
    #[error("Render host has been disposed")]
    HostDisposed,

    /// Settings could not be parsed or are inconsistent.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// Backend specific failure that does not fit another variant.
    #[error("Backend error: {0}")]
    Backend(String),
}

impl PrismError {
    /// Returns `true` for errors the host recovers from by recreating the device.
    #[must_use]
    pub fn is_device_error(&self) -> bool {
        matches!(
            self,
            Self::DeviceLost(_)
                | Self::DeviceRemoved(_)
                | Self::DeviceReset(_)
                | Self::DeviceHung(_)
                | Self::Recreate2DTarget
        )
    }

    /// Convenience constructor for [`PrismError::CoreFault`].
    pub fn core_fault(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CoreFault {
            node: node.into(),
            reason: reason.into(),
        }
    }

    /// Convenience constructor for [`PrismError::ResourceCreation`].
    pub fn resource(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::ResourceCreation {
            kind,
            reason: reason.into(),
        }
    }
}

/// Alias for `Result<T, PrismError>`.
pub type Result<T> = std::result::Result<T, PrismError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_are_classified() {
        assert!(PrismError::DeviceRemoved("x".into()).is_device_error());
        assert!(PrismError::Recreate2DTarget.is_device_error());
        assert!(!PrismError::Backend("x".into()).is_device_error());
        assert!(!PrismError::core_fault("cube", "boom").is_device_error());
    }
}
