use thiserror::Error;

/// Every way a sweep can fail to become peaks, or a pair of peak sets can fail to become a drift
/// estimate. Nothing in the analysis retries on its own; these go straight back to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("no sample in the sweep exceeded the threshold")]
    EmptySweep,
    #[error("not enough resolvable peaks to continue")]
    DegeneratePeakSet,
    #[error("drift search found no local minimum in the cost curve")]
    NoConvergence,
    #[error("drift search was cancelled")]
    Cancelled,
    #[error("waveform source has no further sweeps")]
    SourceExhausted,
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;

macro_rules! invalid {
    ($($arg:tt)*) => {
        $crate::error::AnalysisError::InvalidInput(format!($($arg)*))
    };
}

/// # Errors
/// Returns `InvalidInput` naming `what` if any value is NaN or infinite.
pub(crate) fn ensure_finite(values: &[f64], what: &str) -> AnalysisResult<()> {
    match values.iter().position(|x| !x.is_finite()) {
        Some(i) => Err(invalid!("{what}[{i}] = {} is not finite", values[i])),
        None => Ok(()),
    }
}

pub(crate) use invalid;
