use std::fmt;

use thiserror::Error;

/// Errors raised by misuse of the instrumentation or by divergent per-thread traces.
///
/// All of these indicate a bug in the instrumented program rather than a transient condition.
/// A silently wrong profile is worse than a failed one, so none of them are swallowed.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// More region levels were left than are currently open.
    #[error("cannot leave {requested} region level(s) when only {depth} are open")]
    StackUnderflow {
        /// How many levels the caller attempted to leave.
        requested: usize,

        /// How many non-root levels were open at the time.
        depth: usize,
    },

    /// A region timer was stopped while the region was not open.
    #[error("region '{region}' is not open")]
    NotOpen {
        /// Name of the region.
        region: String,
    },

    /// A region timer was started while the region was already open.
    #[error("region '{region}' is already open")]
    AlreadyOpen {
        /// Name of the region.
        region: String,
    },

    /// The profiler was used before being started.
    #[error("profiler '{profiler}' has not been started")]
    NotActivated {
        /// Name of the profiler (its root region).
        profiler: String,
    },

    /// The profiler was started while it was already running.
    #[error("profiler '{profiler}' has already been started")]
    AlreadyActivated {
        /// Name of the profiler (its root region).
        profiler: String,
    },

    /// A measured closure returned without leaving every region it entered, or left the
    /// region it was measured in.
    #[error("closure measured in region '{region}' did not return to that region")]
    UnbalancedRegion {
        /// Name of the region the closure was measured in.
        region: String,
    },

    /// A region was given a name that is reserved for untracked time.
    #[error("region name '{name}' is reserved for time not covered by any sub-region")]
    ReservedName {
        /// The rejected name.
        name: String,
    },

    /// Two report trees did not have the same structure and cannot be fused.
    #[error("cannot fuse report trees: '{path}' is present only in the {present_in} tree")]
    FuseMismatch {
        /// Slash-separated path of the first node present in only one of the trees.
        path: String,

        /// Which of the two trees contains the node.
        present_in: TreeSide,
    },
}

/// Identifies one of the two operands of a fuse operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum TreeSide {
    /// The tree `fuse()` was called on.
    Left,

    /// The tree passed as the argument to `fuse()`.
    Right,
}

impl fmt::Display for TreeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Left => write!(f, "left"),
            Self::Right => write!(f, "right"),
        }
    }
}

/// A specialized `Result` type for profiler operations, returning the crate's
/// [`Error`] type as the error value.
pub type Result<T> = std::result::Result<T, Error>;
