use crate::key::Key;
use crate::types::ModelStatus;

/// Faults raised while evaluating models or validating configuration.
///
/// Control-flow conditions ("submit pending models", "enough speculative
/// cases") are not faults and live in [`Interrupt`] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Returned when a processed model lacks observations the study asks for.
    #[error("model '{model}' is missing observations: {}", .missing.join(" "))]
    MissingObservations {
        /// The name of the model.
        model: String,
        /// The observation names that are absent.
        missing: Vec<String>,
    },

    /// Returned when a processed model has NaN for a requested observation.
    #[error("model '{model}' has null observations: {}", .names.join(" "))]
    NullObservations {
        /// The name of the model.
        model: String,
        /// The observation names holding NaN.
        names: Vec<String>,
    },

    /// Returned when labelled data does not line up with the current observation set.
    #[error("dimension mismatch in {context}: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        /// What was being combined when the mismatch was found.
        context: &'static str,
        /// The labels that were expected.
        expected: Vec<String>,
        /// The labels that were supplied.
        got: Vec<String>,
    },

    /// Returned when a parameter row has the wrong number of values.
    #[error("got {got} parameter values but the study varies {expected} parameters")]
    ParameterCount {
        /// The number of varying parameters in the configuration.
        expected: usize,
        /// The number of values supplied.
        got: usize,
    },

    /// Returned when there are no observations to evaluate.
    #[error("no observations configured")]
    NoObservations,

    /// Returned when a mean/covariance pairing is malformed.
    #[error("invalid evaluation distribution: {0}")]
    InvalidDistribution(String),

    /// Returned when a covariance matrix is not positive semi-definite.
    #[error("covariance is not positive semi-definite (smallest eigenvalue {min_eigenvalue})")]
    InvalidCovariance {
        /// The most negative eigenvalue found.
        min_eigenvalue: f64,
    },

    /// Returned when a model is found in a state the evaluator cannot use.
    #[error("model '{model}' in unexpected state {status}")]
    UnexpectedState {
        /// The name of the model.
        model: String,
        /// The status it was found in.
        status: ModelStatus,
    },

    /// Returned by a rejecting cache when a key is already taken.
    #[error("duplicate key {key}: held by '{existing}', offered '{offered}'")]
    DuplicateKey {
        /// The colliding key.
        key: Key,
        /// The name of the model already indexed.
        existing: String,
        /// The name of the model being inserted.
        offered: String,
    },

    /// Returned when the configuration is incomplete or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Returned when a model store operation fails.
    #[error("storage error: {0}")]
    Storage(String),

    /// Returned by optimization algorithms wrapped by the runner.
    #[error("algorithm error: {0}")]
    Algorithm(String),
}

pub type Result<T> = core::result::Result<T, Error>;

/// Control signals that drive the submit-and-retry loop.
///
/// These are expected outcomes of evaluation rather than failures: an
/// optimizer function propagates them with `?` and
/// [`Study::run`](crate::Study::run) is the only place that consumes them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// The speculative pass reached `max_provisional_cases` distinct keys.
    BudgetExhausted,
    /// Models must be submitted for external execution before continuing.
    NeedsSubmission {
        /// Keys of the models currently waiting to run.
        pending: Vec<Key>,
    },
}

impl core::fmt::Display for Interrupt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BudgetExhausted => write!(f, "enough provisional cases gathered"),
            Self::NeedsSubmission { pending } => {
                write!(f, "submission required ({} pending models)", pending.len())
            }
        }
    }
}

/// Why an evaluation stopped without a value.
///
/// Every evaluation entry point returns `Result<_, Halt>` so both
/// interrupts and faults travel through `?` inside optimizer closures
/// while remaining distinguishable.
#[derive(Debug, thiserror::Error)]
pub enum Halt {
    /// An expected control signal.
    #[error("{0}")]
    Interrupt(Interrupt),
    /// A genuine failure.
    #[error(transparent)]
    Fault(#[from] Error),
}

impl Halt {
    /// Returns the interrupt if this halt is a control signal.
    #[must_use]
    pub fn interrupt(&self) -> Option<&Interrupt> {
        match self {
            Self::Interrupt(i) => Some(i),
            Self::Fault(_) => None,
        }
    }

    /// Returns `true` for [`Interrupt::BudgetExhausted`].
    #[must_use]
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, Self::Interrupt(Interrupt::BudgetExhausted))
    }
}

impl From<Interrupt> for Halt {
    fn from(interrupt: Interrupt) -> Self {
        Self::Interrupt(interrupt)
    }
}

/// Result of [`Study::run`](crate::Study::run).
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    /// The optimizer completed with every evaluation available.
    Value(T),
    /// Pending models must be submitted and `run` called again.
    NeedsSubmission(Vec<Key>),
}

impl<T> Outcome<T> {
    /// Returns the final value, if any.
    pub fn value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            Self::NeedsSubmission(_) => None,
        }
    }

    /// Returns `true` if the caller has to submit models before retrying.
    pub fn needs_submission(&self) -> bool {
        matches!(self, Self::NeedsSubmission(_))
    }
}
