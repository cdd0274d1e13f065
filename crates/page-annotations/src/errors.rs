use thiserror::Error;

use crate::dom::{DomError, NodeId};

/// Failures inside a single decoration step. They never leave the public
/// host operations: callers log them and fold them into failure counts.
#[derive(Debug, Error)]
pub enum AnnotationError {
    #[error("dom operation failed: {0}")]
    Dom(#[from] DomError),
    #[error("node {0} has no parent")]
    Detached(NodeId),
}
