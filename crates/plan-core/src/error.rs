use thiserror::Error;

/// Validation errors raised while constructing the economy or the
/// configuration. All of them are fatal and happen before period one.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// Technical coefficients violate the productivity condition.
    #[error("technical coefficient matrix is not productive (spectral radius {spectral_radius:.6} >= 1)")]
    NonProductiveMatrix { spectral_radius: f64 },
    /// Sector counts or matrix/vector dimensions disagree.
    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),
    /// Input coefficients must be non-negative.
    #[error("negative coefficient {value} at ({row}, {col}) in {matrix}")]
    NegativeCoefficient {
        matrix: &'static str,
        row: usize,
        col: usize,
        value: f64,
    },
    /// A bounded quantity fell outside its admissible range.
    #[error("{field} = {value} is outside {range}")]
    OutOfRange {
        field: String,
        value: f64,
        range: &'static str,
    },
    /// Numeric field must be finite.
    #[error("non-finite value in {0}")]
    NonFinite(String),
    /// Capital coefficients must be invertible to derive capacity.
    #[error("capital coefficient matrix is singular")]
    SingularCapitalMatrix,
    /// Shock covariance must be symmetric positive definite.
    #[error("shock covariance is not symmetric positive definite")]
    InvalidCovariance,
}

/// Check that `value` lies in `[lo, hi]`.
pub(crate) fn check_range(
    field: impl Into<String>,
    value: f64,
    lo: f64,
    hi: f64,
    range: &'static str,
) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFinite(field.into()));
    }
    if value < lo || value > hi {
        return Err(ValidationError::OutOfRange {
            field: field.into(),
            value,
            range,
        });
    }
    Ok(())
}
