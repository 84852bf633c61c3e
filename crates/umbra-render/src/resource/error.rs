//! Resource table error types.

use super::ResourceKind;

/// Errors produced while creating, looking up or writing table resources.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    /// A resource was requested before a device was attached to the table.
    #[error("cannot create '{name}': no GPU device has been initialized")]
    DeviceNotInitialized { name: String },

    /// The descriptor carries parameters the device would reject.
    #[error("invalid descriptor for '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    /// A descriptor references a resource that does not exist.
    #[error("'{name}' depends on '{dependency}', which does not exist")]
    MissingDependency { name: String, dependency: String },

    /// A named resource exists but has the wrong kind for this use.
    #[error("'{name}' is a {found}, expected a {expected}")]
    KindMismatch {
        name: String,
        expected: ResourceKind,
        found: ResourceKind,
    },

    /// No resource with this name is registered.
    #[error("resource '{name}' not found")]
    NotFound { name: String },

    /// A buffer write falls outside the buffer or violates copy alignment.
    #[error("write of {len} bytes at offset {offset} is invalid for '{name}' ({size} bytes)")]
    InvalidWrite {
        name: String,
        offset: u64,
        len: u64,
        size: u64,
    },
}

impl ResourceError {
    /// Configuration errors abort setup instead of being retried per frame.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ResourceError::DeviceNotInitialized { .. } | ResourceError::InvalidDescriptor { .. }
        )
    }
}
