//! Error taxonomy for every server operation
//!
//! Four categories, all reported to the caller and logged where they are raised:
//!
//! - **Invalid handle**: unknown, freed, empty-where-required, or wrong-kind handle
//! - **Invalid state**: the operation is not legal for the record's current state
//! - **Out of range**: surface, bone, layer, cursor-index style bounds violations
//! - **Capacity**: fixed-size server tables are full or addressed past their end
//!
//! A failed setter never mutates its record. Nothing in the server retries.

use thiserror::Error;

use crate::resources::handle::{ResourceKind, Rid};

/// Result type for server operations
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors reported by server operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// The handle is not a live handle of the expected kind
    #[error("invalid {} handle {rid}", .kind.map_or("resource", ResourceKind::name))]
    InvalidHandle {
        /// Kind the operation expected, `None` when any live kind would do
        kind: Option<ResourceKind>,
        /// Offending handle
        rid: Rid,
    },

    /// The operation is not legal for the record's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// An index exceeded the bounds of the addressed collection
    #[error("{what} index {index} out of range (len {len})")]
    OutOfRange {
        /// Name of the indexed collection
        what: &'static str,
        /// Requested index
        index: usize,
        /// Collection length at the time of the call
        len: usize,
    },

    /// A fixed-capacity table cannot satisfy the request
    #[error("capacity exceeded: {0}")]
    Capacity(String),
}

impl ServerError {
    /// Build and log an invalid-handle error
    pub fn invalid_handle(kind: ResourceKind, rid: Rid) -> Self {
        Self::InvalidHandle { kind: Some(kind), rid }.logged()
    }

    /// Build and log an invalid-handle error for a handle of no particular kind
    pub fn unknown_handle(rid: Rid) -> Self {
        Self::InvalidHandle { kind: None, rid }.logged()
    }

    /// Build and log an invalid-state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into()).logged()
    }

    /// Build and log an out-of-range error
    pub fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Self::OutOfRange { what, index, len }.logged()
    }

    /// Build and log a capacity error
    pub fn capacity(message: impl Into<String>) -> Self {
        Self::Capacity(message.into()).logged()
    }

    fn logged(self) -> Self {
        log::warn!("{self}");
        self
    }
}

/// Fail with [`ServerError::OutOfRange`] unless `index < len`
pub fn check_index(what: &'static str, index: usize, len: usize) -> ServerResult<()> {
    if index < len {
        Ok(())
    } else {
        Err(ServerError::out_of_range(what, index, len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_index_bounds() {
        assert!(check_index("surface", 0, 1).is_ok());
        assert_eq!(
            check_index("surface", 1, 1),
            Err(ServerError::OutOfRange { what: "surface", index: 1, len: 1 })
        );
    }

    #[test]
    fn test_error_messages() {
        let err = ServerError::invalid_state("mesh has no surfaces");
        assert_eq!(err.to_string(), "invalid state: mesh has no surfaces");

        let err = ServerError::invalid_handle(ResourceKind::Texture, Rid::empty());
        assert_eq!(err.to_string(), "invalid texture handle <empty>");

        let err = ServerError::unknown_handle(Rid::empty());
        assert_eq!(err.to_string(), "invalid resource handle <empty>");
    }
}
