//! Merge-conflict error for copy-on-write child contexts.

use thiserror::Error;

/// A child-context merge collided with a parent write.
///
/// Raised by `ExecutionContext::merge` when the parent rewrote a key after
/// the fork and the child's value for that key differs. Fatal to the branch;
/// whether it fails the run depends on the caller's policy.
#[derive(Debug, Clone, Error)]
#[error("context merge conflict on key: {key}")]
pub struct ContextMergeConflict {
    pub key: String,
}
