//! Fixed-point decimal arithmetic core for exact SQL decimal types.
//!
//! This library provides two exact decimal value types backed by scaled
//! integers:
//! - [`Numeric`]: 128-bit with 9 decimal places (±10^29 range)
//! - [`BigNumeric`]: 256-bit with 38 decimal places (±5.8×10^38 range)
//!
//! plus the multi-precision integers they are built on ([`FixedUint`],
//! [`FixedInt`]) and streaming aggregators for SUM/AVG/VAR/STDDEV/COVAR/CORR
//! that cannot overflow across unbounded input streams.

mod aggregate;
mod bignumeric;
mod error;
mod fixed_int;
mod fixed_uint;
mod numeric;
mod parse;

pub use aggregate::{
    CorrelationAggregator, CovarianceAggregator, LegacySumAggregator, SumAggregator,
    VarianceAggregator,
};
pub use bignumeric::BigNumeric;
pub use error::NumericError;
pub use fixed_int::FixedInt;
pub use fixed_uint::FixedUint;
pub use numeric::Numeric;

/// Result type alias used across the crate.
pub type Result<T> = std::result::Result<T, NumericError>;
