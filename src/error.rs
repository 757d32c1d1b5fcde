use thiserror::Error;

use crate::rig::codec::HEADER_LEN;

/// Failures surfaced to the caller.
///
/// Everything else in the pipeline degrades gracefully: a malformed
/// container falls back to append-only embedding and an unavailable
/// classifier falls back to the geometric analysis, neither of which is an
/// error.
#[derive(Error, Debug)]
pub enum RigError {
    /// The subscription plan has no registered tier budget. No default
    /// budget is invented.
    #[error("unknown subscription plan '{0}'")]
    BudgetNotFound(String),

    /// The input buffer cannot hold even a container header, so there is
    /// nothing to rig or append to.
    #[error("container is {actual} bytes, below the {HEADER_LEN}-byte header minimum")]
    ContainerTooSmall { actual: usize },

    /// The serializer produced a buffer whose header disagrees with its
    /// actual length. Aborting is mandatory here; emitting the buffer
    /// would hand the caller a corrupt container.
    #[error("serialization invariant violated: {0}")]
    SerializationInvariant(String),
}
