// ============================================================================
// Numeric Errors
// Error types for exact decimal arithmetic, parsing, and decoding
// ============================================================================

use std::fmt;

/// Errors produced by decimal arithmetic, parsing, conversion, and decoding.
///
/// Every variant carries the fully formatted message text, including the
/// operands involved, so the host engine can surface it verbatim on its
/// evaluation-error channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    /// A string could not be parsed as a decimal value,
    /// e.g. `"Invalid NUMERIC value: 1..2"`.
    InvalidValue(String),
    /// An arithmetic result exceeded the representable range,
    /// e.g. `"numeric overflow: 1e19 * 1e19"`.
    Overflow(String),
    /// Division (or AVG) with a zero divisor,
    /// e.g. `"division by zero: 1 / 0"`.
    DivisionByZero(String),
    /// A finite double outside the representable range,
    /// e.g. `"numeric out of range: 1e40"`.
    OutOfRange(String),
    /// NaN or infinity handed to a decimal conversion.
    NonFiniteConversion(String),
    /// A negative base raised to a fractional exponent.
    NegativeToFractionalPower(String),
    /// Serialized bytes that do not decode to a value,
    /// e.g. `"Invalid numeric encoding"`.
    InvalidEncoding(String),
}

impl NumericError {
    /// Returns the full message text of this error.
    pub fn message(&self) -> &str {
        match self {
            NumericError::InvalidValue(msg)
            | NumericError::Overflow(msg)
            | NumericError::DivisionByZero(msg)
            | NumericError::OutOfRange(msg)
            | NumericError::NonFiniteConversion(msg)
            | NumericError::NegativeToFractionalPower(msg)
            | NumericError::InvalidEncoding(msg) => msg,
        }
    }

    /// Appends `": <context>"` to the message, keeping the error kind.
    ///
    /// Used by composite operations (DIV, POW, AVG) that attach the operation
    /// and its operands to an error raised by an inner step.
    pub(crate) fn with_context(self, context: &str) -> Self {
        let append = |mut msg: String| {
            msg.push_str(": ");
            msg.push_str(context);
            msg
        };
        match self {
            NumericError::InvalidValue(m) => NumericError::InvalidValue(append(m)),
            NumericError::Overflow(m) => NumericError::Overflow(append(m)),
            NumericError::DivisionByZero(m) => NumericError::DivisionByZero(append(m)),
            NumericError::OutOfRange(m) => NumericError::OutOfRange(append(m)),
            NumericError::NonFiniteConversion(m) => NumericError::NonFiniteConversion(append(m)),
            NumericError::NegativeToFractionalPower(m) => {
                NumericError::NegativeToFractionalPower(append(m))
            }
            NumericError::InvalidEncoding(m) => NumericError::InvalidEncoding(append(m)),
        }
    }
}

impl fmt::Display for NumericError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for NumericError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NumericError::Overflow("numeric overflow: SUM".to_string());
        assert_eq!(err.to_string(), "numeric overflow: SUM");

        let err = NumericError::DivisionByZero("division by zero: AVG".to_string());
        assert_eq!(err.to_string(), "division by zero: AVG");
    }

    #[test]
    fn test_with_context() {
        let err = NumericError::Overflow("numeric overflow".to_string());
        let err = err.with_context("POW(2, 200)");
        assert_eq!(err.to_string(), "numeric overflow: POW(2, 200)");
        assert!(matches!(err, NumericError::Overflow(_)));
    }
}
