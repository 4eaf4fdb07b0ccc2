//! Core types shared across the crate.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The lifecycle status of a model, without any attached data.
///
/// This is the fieldless mirror of [`ModelState`](crate::model::ModelState)
/// used for views and error reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum ModelStatus {
    /// Created but not yet handed to the batch system.
    Created,
    /// Written out and ready to submit.
    Instantiated,
    /// Queued with the batch system.
    Submitted,
    /// Executing.
    Running,
    /// Finished executing, output not yet processed.
    Succeeded,
    /// Execution failed.
    Failed,
    /// Output processed; simulated observations are available.
    Processed,
}

impl ModelStatus {
    /// The upper-case label used in status tables.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Instantiated => "INSTANTIATED",
            Self::Submitted => "SUBMITTED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Processed => "PROCESSED",
        }
    }
}

impl core::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which pass of the two-phase runner the provisional sampler is serving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Explore and register keys, answering with synthetic draws.
    Speculative,
    /// Turn registered keys into real pending models.
    Creation,
}
