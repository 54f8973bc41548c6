#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The caller tripped the [`CancelToken`](crate::CancelToken). Not a failure: no result was
    /// produced and the run may be retried.
    #[error("computation was canceled")]
    Canceled,
    #[error("invalid {algorithm} option `{option}`: {reason}")]
    InvalidOption {
        algorithm: &'static str,
        option: &'static str,
        reason: String,
    },
    #[error("graph contains an edge with a missing endpoint: {edge}")]
    MissingEndpoint { edge: String },
    /// `vertex` is the vertex's enumeration ordinal (`#3`); vertex types carry no `Debug` bound.
    #[error("no position supplied for vertex {vertex}")]
    MissingPosition { vertex: String },
    #[error("edge is not part of the graph")]
    UnknownEdge,
    #[error("{algorithm} produced a non-finite coordinate")]
    NonFinite { algorithm: &'static str },
}

impl Error {
    pub fn is_canceled(&self) -> bool {
        matches!(self, Error::Canceled)
    }

    pub(crate) fn invalid(
        algorithm: &'static str,
        option: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidOption {
            algorithm,
            option,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Rejects values that are non-finite or not strictly positive.
pub(crate) fn require_positive(
    algorithm: &'static str,
    option: &'static str,
    v: f64,
) -> Result<f64> {
    if v.is_finite() && v > 0.0 {
        Ok(v)
    } else {
        Err(Error::invalid(
            algorithm,
            option,
            format!("expected a finite value > 0, got {v}"),
        ))
    }
}

/// Rejects values that are non-finite or negative.
pub(crate) fn require_non_negative(
    algorithm: &'static str,
    option: &'static str,
    v: f64,
) -> Result<f64> {
    if v.is_finite() && v >= 0.0 {
        Ok(v)
    } else {
        Err(Error::invalid(
            algorithm,
            option,
            format!("expected a finite value >= 0, got {v}"),
        ))
    }
}

pub(crate) fn require_nonzero(
    algorithm: &'static str,
    option: &'static str,
    v: usize,
) -> Result<usize> {
    if v == 0 {
        Err(Error::invalid(algorithm, option, "expected a value >= 1"))
    } else {
        Ok(v)
    }
}
