//! Error types for the aggregation pipeline.
//!
//! Per-record problems are [`RecordError`]s: the offending row is dropped and
//! counted, and the run continues. Run-fatal problems are [`PipelineError`]s:
//! the run aborts and no output is produced.

use rust_decimal::Decimal;
use thiserror::Error;

/// A single raw row that could not be coerced into a trade.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// A required field was absent or blank.
    #[error("missing {field}")]
    Missing {
        /// Name of the missing field.
        field: &'static str,
    },

    /// A field was present but could not be parsed.
    #[error("invalid {field}: {value:?}")]
    Invalid {
        /// Name of the field.
        field: &'static str,
        /// The raw value as read.
        value: String,
    },

    /// A numeric field that must be non-negative was negative.
    #[error("negative {field}: {value}")]
    Negative {
        /// Name of the field.
        field: &'static str,
        /// The parsed value.
        value: Decimal,
    },

    /// A value derived from the row does not fit in a decimal.
    #[error("{field} overflows the decimal range")]
    Overflow {
        /// Name of the derived value.
        field: &'static str,
    },
}

impl RecordError {
    /// Creates an invalid-value error.
    pub fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            value: value.into(),
        }
    }

    /// Returns the name of the field that caused the rejection.
    #[must_use]
    pub fn field(&self) -> &'static str {
        match self {
            Self::Missing { field }
            | Self::Invalid { field, .. }
            | Self::Negative { field, .. }
            | Self::Overflow { field } => field,
        }
    }
}

/// Errors that abort a whole pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// The null-timestamp policy rejected the batch.
    #[error(
        "validation failed: null_timestamp_policy={policy} but found {count} null timestamp(s) at rows {rows:?}"
    )]
    Validation {
        /// The policy that was violated.
        policy: &'static str,
        /// Number of offending rows in the batch.
        count: usize,
        /// First offending row numbers (1-based, at most five).
        rows: Vec<usize>,
    },

    /// The configuration is invalid or inconsistent.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A running total left the decimal range.
    #[error("arithmetic overflow while summing {context}")]
    Overflow {
        /// What was being summed, and for which key.
        context: String,
    },
}

impl PipelineError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates an overflow error.
    pub fn overflow(context: impl Into<String>) -> Self {
        Self::Overflow {
            context: context.into(),
        }
    }
}

/// Adds `value` to `sum`, failing instead of panicking on overflow.
pub(crate) fn checked_accumulate(
    sum: &mut Decimal,
    value: Decimal,
    context: impl FnOnce() -> String,
) -> Result<(), PipelineError> {
    *sum = sum
        .checked_add(value)
        .ok_or_else(|| PipelineError::overflow(context()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_error_field() {
        assert_eq!(RecordError::Missing { field: "price" }.field(), "price");
        assert_eq!(RecordError::invalid("side", "hold").field(), "side");
    }

    #[test]
    fn test_validation_error_names_policy_and_rows() {
        let err = PipelineError::Validation {
            policy: "error",
            count: 7,
            rows: vec![2, 4],
        };
        let message = err.to_string();
        assert!(message.contains("null_timestamp_policy=error"));
        assert!(message.contains("7 null timestamp"));
        assert!(message.contains("[2, 4]"));
    }

    #[test]
    fn test_checked_accumulate_reports_overflow() {
        let mut sum = Decimal::MAX;
        let err = checked_accumulate(&mut sum, Decimal::ONE, || "volume".to_string()).unwrap_err();
        assert_eq!(err, PipelineError::overflow("volume"));
        assert_eq!(sum, Decimal::MAX);

        let mut sum = Decimal::ONE;
        checked_accumulate(&mut sum, Decimal::ONE, String::new).unwrap();
        assert_eq!(sum, Decimal::TWO);
    }
}
