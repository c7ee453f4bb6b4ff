//! Incremental aggregators for NUMERIC streams.
//!
//! Each aggregator keeps its running sums in integers wide enough that adding
//! 2^63 maximum-magnitude inputs cannot overflow; nothing is scaled down
//! until a terminal query, which keeps the `N·Σx² − (Σx)²` numerators exact.

use crate::fixed_int::{extend_and_multiply, FixedInt};
use crate::fixed_uint::FixedUint;
use crate::{Numeric, NumericError};

// ============================================================================
// Wire Format Helpers
// ============================================================================

/// Appends one component of a multi-part aggregator encoding: a single
/// length byte (0-127) followed by the component's serialized bytes. The
/// last component of an encoding is written without a prefix and consumes
/// the remainder.
fn serialize_with_length_prefix<const N: usize>(num: &FixedInt<N>, output: &mut Vec<u8>) {
    let start = output.len();
    output.push(0);
    num.serialize_to_bytes(output);
    let len = output.len() - start - 1;
    debug_assert!(len < 128);
    output[start] = len as u8;
}

/// Splits off one length-prefixed component, leaving the remainder in
/// `bytes`. Fails unless at least one byte follows the component.
fn split_length_prefixed<'a>(bytes: &mut &'a [u8]) -> Option<&'a [u8]> {
    let (&len, rest) = bytes.split_first()?;
    let len = len as usize;
    if len >= rest.len() {
        return None;
    }
    let (head, tail) = rest.split_at(len);
    *bytes = tail;
    Some(head)
}

/// Shared numerator of the covariance and variance terminals:
/// `count * sum_product - sum_x * sum_y`, exact in 384 bits.
fn scaled_covariance_numerator(
    sum_x: &FixedInt<3>,
    sum_y: &FixedInt<3>,
    sum_product: &FixedInt<5>,
    count: u64,
) -> FixedInt<6> {
    let numerator: FixedInt<6> = sum_product.extend();
    let numerator = numerator.mul_u64(count);
    numerator.wrapping_sub(&extend_and_multiply(sum_x, sum_y))
}

fn covariance(
    sum_x: &FixedInt<3>,
    sum_y: &FixedInt<3>,
    sum_product: &FixedInt<5>,
    count: u64,
    count_offset: u64,
) -> f64 {
    let numerator = scaled_covariance_numerator(sum_x, sum_y, sum_product, count);
    // count * (count - offset) * (10^9)^2 never leaves 192 bits.
    let denominator = FixedUint::<3>::from_u64(count)
        .overflowing_mul_u64(count - count_offset)
        .0
        .overflowing_mul_u64(1_000_000_000_000_000_000)
        .0;
    numerator.to_f64() / denominator.to_f64()
}

/// Widens a NUMERIC into the 192-bit accumulator domain.
#[inline(always)]
fn to_accumulator(value: Numeric) -> FixedInt<3> {
    FixedInt::from_i128(value.as_packed_int())
}

/// The 320-bit square (or cross) term of one input pair.
#[inline(always)]
fn product_term(x: Numeric, y: Numeric) -> FixedInt<5> {
    let x = FixedInt::<2>::from_i128(x.as_packed_int());
    let y = FixedInt::<2>::from_i128(y.as_packed_int());
    extend_and_multiply::<2, 2, 4>(&x, &y).extend()
}

// ============================================================================
// SumAggregator
// ============================================================================

/// Running SUM/AVG accumulator: a 192-bit signed sum of scaled values.
///
/// 2^63 inputs of magnitude < 2^127 stay below 2^190, so `add` can never
/// overflow internally; only the terminal narrowing can.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SumAggregator {
    sum: FixedInt<3>,
}

impl SumAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value to the running sum.
    pub fn add(&mut self, value: Numeric) {
        self.sum = self.sum.wrapping_add(&to_accumulator(value));
    }

    /// Removes a value from the running sum (sliding-window frames).
    pub fn subtract(&mut self, value: Numeric) {
        self.sum = self.sum.wrapping_sub(&to_accumulator(value));
    }

    /// Merges another partial aggregate into this one.
    pub fn merge(&mut self, other: &Self) {
        self.sum = self.sum.wrapping_add(&other.sum);
    }

    /// The total, narrowed back to a NUMERIC.
    pub fn sum(&self) -> crate::Result<Numeric> {
        Numeric::from_fixed_int(&self.sum)
            .map_err(|_| NumericError::Overflow("numeric overflow: SUM".to_string()))
    }

    /// The average of `count` inputs, rounded half away from zero.
    pub fn average(&self, count: u64) -> crate::Result<Numeric> {
        if count == 0 {
            return Err(NumericError::DivisionByZero(
                "division by zero: AVG".to_string(),
            ));
        }
        let dividend = self.sum.div_and_round_away_from_zero_u64(count);
        Numeric::from_fixed_int(&dividend)
            .map_err(|_| NumericError::Overflow("numeric overflow: AVG".to_string()))
    }

    /// Serializes the sum as minimum-length signed bytes.
    pub fn serialize_to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(24);
        self.sum.serialize_to_bytes(&mut bytes);
        bytes
    }

    /// Parses the encoding produced by [`Self::serialize_to_bytes`].
    pub fn deserialize_from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        FixedInt::deserialize_from_bytes(bytes)
            .map(|sum| Self { sum })
            .ok_or_else(|| {
                NumericError::InvalidEncoding("Invalid SumAggregator encoding".to_string())
            })
    }
}

// ============================================================================
// LegacySumAggregator
// ============================================================================

/// The legacy SUM/AVG accumulator, kept for its persisted wire format: a
/// 192-bit sum split into a 128-bit lower part and a 64-bit overflow count.
///
/// The total is `sum_upper * 2^128 + sum_lower` with both parts signed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LegacySumAggregator {
    sum_lower: i128,
    sum_upper: i64,
}

impl LegacySumAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value to the running sum.
    pub fn add(&mut self, value: Numeric) {
        let packed = value.as_packed_int();
        let (sum, overflow) = self.sum_lower.overflowing_add(packed);
        self.sum_lower = sum;
        if overflow {
            self.sum_upper += if packed < 0 { -1 } else { 1 };
        }
    }

    /// Removes a value from the running sum.
    pub fn subtract(&mut self, value: Numeric) {
        let packed = value.as_packed_int();
        let (diff, overflow) = self.sum_lower.overflowing_sub(packed);
        self.sum_lower = diff;
        if overflow {
            self.sum_upper += if packed < 0 { 1 } else { -1 };
        }
    }

    /// Merges another partial aggregate into this one.
    pub fn merge(&mut self, other: &Self) {
        let (sum, overflow) = self.sum_lower.overflowing_add(other.sum_lower);
        self.sum_lower = sum;
        if overflow {
            self.sum_upper += if other.sum_lower < 0 { -1 } else { 1 };
        }
        self.sum_upper += other.sum_upper;
    }

    /// The total, narrowed back to a NUMERIC.
    pub fn sum(&self) -> crate::Result<Numeric> {
        let overflow = || NumericError::Overflow("numeric overflow: SUM".to_string());
        if self.sum_upper != 0 {
            return Err(overflow());
        }
        Numeric::from_packed_int(self.sum_lower).map_err(|_| overflow())
    }

    /// The average of `count` inputs, rounded half away from zero.
    pub fn average(&self, count: u64) -> crate::Result<Numeric> {
        if count == 0 {
            return Err(NumericError::DivisionByZero(
                "division by zero: AVG".to_string(),
            ));
        }
        // Rebuild the unsigned 192-bit magnitude from the two signed parts.
        // When sum_upper is zero the sign comes from sum_lower alone. When it
        // is not, the sign comes from sum_upper, sum_lower is negated into
        // that sign, and a negative lower part borrows one from the upper
        // magnitude. i128::MIN is its own negation in both cases.
        let negate;
        let lower;
        let mut upper_abs = self.sum_upper.unsigned_abs();
        if upper_abs == 0 {
            negate = self.sum_lower < 0;
            lower = self.sum_lower.unsigned_abs();
        } else {
            negate = self.sum_upper < 0;
            let adjusted = if negate {
                self.sum_lower.wrapping_neg()
            } else {
                self.sum_lower
            };
            if adjusted < 0 {
                upper_abs -= 1;
            }
            lower = adjusted as u128;
        }
        let dividend = FixedUint::<3>::from_hi_lo(upper_abs, lower);
        let average = dividend.div_and_round_away_from_zero_u64(count);
        Numeric::from_fixed_uint(&average, negate)
            .map_err(|_| NumericError::Overflow("numeric overflow: AVG".to_string()))
    }

    /// Serializes as the fixed 24-byte legacy layout:
    /// `sum_lower_lo | sum_lower_hi | sum_upper`, each 8 bytes little-endian.
    pub fn serialize_to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(24);
        bytes.extend_from_slice(&(self.sum_lower as u64).to_le_bytes());
        bytes.extend_from_slice(&((self.sum_lower as u128 >> 64) as u64).to_le_bytes());
        bytes.extend_from_slice(&self.sum_upper.to_le_bytes());
        bytes
    }

    /// Parses the fixed 24-byte legacy layout.
    pub fn deserialize_from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        if bytes.len() != 24 {
            return Err(NumericError::InvalidEncoding(
                "Invalid LegacySumAggregator encoding".to_string(),
            ));
        }
        let word = |i: usize| u64::from_le_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap());
        let sum_lower = (word(0) as u128 | (word(1) as u128) << 64) as i128;
        let sum_upper = word(2) as i64;
        Ok(Self {
            sum_lower,
            sum_upper,
        })
    }
}

// ============================================================================
// VarianceAggregator
// ============================================================================

/// Running VAR/STDDEV accumulator: Σx in 192 bits, Σx² in 320 bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VarianceAggregator {
    sum: FixedInt<3>,
    sum_square: FixedInt<5>,
}

impl VarianceAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value.
    pub fn add(&mut self, value: Numeric) {
        self.sum = self.sum.wrapping_add(&to_accumulator(value));
        self.sum_square = self.sum_square.wrapping_add(&product_term(value, value));
    }

    /// Removes a value (sliding-window frames).
    pub fn subtract(&mut self, value: Numeric) {
        self.sum = self.sum.wrapping_sub(&to_accumulator(value));
        self.sum_square = self.sum_square.wrapping_sub(&product_term(value, value));
    }

    /// Merges another partial aggregate into this one.
    pub fn merge(&mut self, other: &Self) {
        self.sum = self.sum.wrapping_add(&other.sum);
        self.sum_square = self.sum_square.wrapping_add(&other.sum_square);
    }

    /// Population variance; `None` when no inputs.
    pub fn variance_pop(&self, count: u64) -> Option<f64> {
        (count > 0).then(|| covariance(&self.sum, &self.sum, &self.sum_square, count, 0))
    }

    /// Sampling variance; `None` unless at least two inputs.
    pub fn variance_samp(&self, count: u64) -> Option<f64> {
        (count > 1).then(|| covariance(&self.sum, &self.sum, &self.sum_square, count, 1))
    }

    /// Population standard deviation; `None` when no inputs.
    pub fn stddev_pop(&self, count: u64) -> Option<f64> {
        self.variance_pop(count).map(f64::sqrt)
    }

    /// Sampling standard deviation; `None` unless at least two inputs.
    pub fn stddev_samp(&self, count: u64) -> Option<f64> {
        self.variance_samp(count).map(f64::sqrt)
    }

    /// Serializes as `(sum, sum_square)` with a length prefix on `sum`.
    pub fn serialize_to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(72);
        serialize_with_length_prefix(&self.sum, &mut bytes);
        self.sum_square.serialize_to_bytes(&mut bytes);
        bytes
    }

    /// Parses the encoding produced by [`Self::serialize_to_bytes`].
    pub fn deserialize_from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let invalid = || {
            NumericError::InvalidEncoding("Invalid VarianceAggregator encoding".to_string())
        };
        let mut rest = bytes;
        let sum_bytes = split_length_prefixed(&mut rest).ok_or_else(invalid)?;
        let sum = FixedInt::deserialize_from_bytes(sum_bytes).ok_or_else(invalid)?;
        let sum_square = FixedInt::deserialize_from_bytes(rest).ok_or_else(invalid)?;
        Ok(Self { sum, sum_square })
    }
}

// ============================================================================
// CovarianceAggregator
// ============================================================================

/// Running COVAR accumulator: Σxy in 320 bits, Σx and Σy in 192 bits.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CovarianceAggregator {
    sum_product: FixedInt<5>,
    sum_x: FixedInt<3>,
    sum_y: FixedInt<3>,
}

impl CovarianceAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pair.
    pub fn add(&mut self, x: Numeric, y: Numeric) {
        self.sum_x = self.sum_x.wrapping_add(&to_accumulator(x));
        self.sum_y = self.sum_y.wrapping_add(&to_accumulator(y));
        self.sum_product = self.sum_product.wrapping_add(&product_term(x, y));
    }

    /// Removes a pair (sliding-window frames).
    pub fn subtract(&mut self, x: Numeric, y: Numeric) {
        self.sum_x = self.sum_x.wrapping_sub(&to_accumulator(x));
        self.sum_y = self.sum_y.wrapping_sub(&to_accumulator(y));
        self.sum_product = self.sum_product.wrapping_sub(&product_term(x, y));
    }

    /// Merges another partial aggregate into this one.
    pub fn merge(&mut self, other: &Self) {
        self.sum_product = self.sum_product.wrapping_add(&other.sum_product);
        self.sum_x = self.sum_x.wrapping_add(&other.sum_x);
        self.sum_y = self.sum_y.wrapping_add(&other.sum_y);
    }

    /// Population covariance; `None` when no inputs.
    pub fn covariance_pop(&self, count: u64) -> Option<f64> {
        (count > 0).then(|| covariance(&self.sum_x, &self.sum_y, &self.sum_product, count, 0))
    }

    /// Sampling covariance; `None` unless at least two inputs.
    pub fn covariance_samp(&self, count: u64) -> Option<f64> {
        (count > 1).then(|| covariance(&self.sum_x, &self.sum_y, &self.sum_product, count, 1))
    }

    /// Serializes as `(sum_product, sum_x, sum_y)`; the first two carry
    /// length prefixes. The order is part of the wire format.
    pub fn serialize_to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(96);
        serialize_with_length_prefix(&self.sum_product, &mut bytes);
        serialize_with_length_prefix(&self.sum_x, &mut bytes);
        self.sum_y.serialize_to_bytes(&mut bytes);
        bytes
    }

    /// Parses the encoding produced by [`Self::serialize_to_bytes`].
    pub fn deserialize_from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let invalid = || {
            NumericError::InvalidEncoding("Invalid CovarianceAggregator encoding".to_string())
        };
        let mut rest = bytes;
        let product_bytes = split_length_prefixed(&mut rest).ok_or_else(invalid)?;
        let sum_product = FixedInt::deserialize_from_bytes(product_bytes).ok_or_else(invalid)?;
        let x_bytes = split_length_prefixed(&mut rest).ok_or_else(invalid)?;
        let sum_x = FixedInt::deserialize_from_bytes(x_bytes).ok_or_else(invalid)?;
        let sum_y = FixedInt::deserialize_from_bytes(rest).ok_or_else(invalid)?;
        Ok(Self {
            sum_product,
            sum_x,
            sum_y,
        })
    }
}

// ============================================================================
// CorrelationAggregator
// ============================================================================

/// Running CORR accumulator: a covariance aggregator plus Σx² and Σy².
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CorrelationAggregator {
    cov: CovarianceAggregator,
    sum_square_x: FixedInt<5>,
    sum_square_y: FixedInt<5>,
}

impl CorrelationAggregator {
    /// Creates an empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a pair.
    pub fn add(&mut self, x: Numeric, y: Numeric) {
        self.cov.add(x, y);
        self.sum_square_x = self.sum_square_x.wrapping_add(&product_term(x, x));
        self.sum_square_y = self.sum_square_y.wrapping_add(&product_term(y, y));
    }

    /// Removes a pair (sliding-window frames).
    pub fn subtract(&mut self, x: Numeric, y: Numeric) {
        self.cov.subtract(x, y);
        self.sum_square_x = self.sum_square_x.wrapping_sub(&product_term(x, x));
        self.sum_square_y = self.sum_square_y.wrapping_sub(&product_term(y, y));
    }

    /// Merges another partial aggregate into this one.
    pub fn merge(&mut self, other: &Self) {
        self.cov.merge(&other.cov);
        self.sum_square_x = self.sum_square_x.wrapping_add(&other.sum_square_x);
        self.sum_square_y = self.sum_square_y.wrapping_add(&other.sum_square_y);
    }

    /// Pearson correlation coefficient; `None` unless at least two inputs.
    pub fn correlation(&self, count: u64) -> Option<f64> {
        if count <= 1 {
            return None;
        }
        let numerator = scaled_covariance_numerator(
            &self.cov.sum_x,
            &self.cov.sum_y,
            &self.cov.sum_product,
            count,
        );
        let variance_numerator_x = scaled_covariance_numerator(
            &self.cov.sum_x,
            &self.cov.sum_x,
            &self.sum_square_x,
            count,
        );
        let variance_numerator_y = scaled_covariance_numerator(
            &self.cov.sum_y,
            &self.cov.sum_y,
            &self.sum_square_y,
            count,
        );
        let denominator_square: FixedInt<12> =
            extend_and_multiply(&variance_numerator_x, &variance_numerator_y);
        Some(numerator.to_f64() / denominator_square.to_f64().sqrt())
    }

    /// Serializes as `(sum_product, sum_x, sum_y, sum_square_x,
    /// sum_square_y)`; all but the last carry length prefixes.
    pub fn serialize_to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(160);
        serialize_with_length_prefix(&self.cov.sum_product, &mut bytes);
        serialize_with_length_prefix(&self.cov.sum_x, &mut bytes);
        serialize_with_length_prefix(&self.cov.sum_y, &mut bytes);
        serialize_with_length_prefix(&self.sum_square_x, &mut bytes);
        self.sum_square_y.serialize_to_bytes(&mut bytes);
        bytes
    }

    /// Parses the encoding produced by [`Self::serialize_to_bytes`].
    pub fn deserialize_from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let invalid = || {
            NumericError::InvalidEncoding("Invalid CorrelationAggregator encoding".to_string())
        };
        let mut rest = bytes;
        let product_bytes = split_length_prefixed(&mut rest).ok_or_else(invalid)?;
        let sum_product = FixedInt::deserialize_from_bytes(product_bytes).ok_or_else(invalid)?;
        let x_bytes = split_length_prefixed(&mut rest).ok_or_else(invalid)?;
        let sum_x = FixedInt::deserialize_from_bytes(x_bytes).ok_or_else(invalid)?;
        let y_bytes = split_length_prefixed(&mut rest).ok_or_else(invalid)?;
        let sum_y = FixedInt::deserialize_from_bytes(y_bytes).ok_or_else(invalid)?;
        let square_x_bytes = split_length_prefixed(&mut rest).ok_or_else(invalid)?;
        let sum_square_x =
            FixedInt::deserialize_from_bytes(square_x_bytes).ok_or_else(invalid)?;
        let sum_square_y = FixedInt::deserialize_from_bytes(rest).ok_or_else(invalid)?;
        Ok(Self {
            cov: CovarianceAggregator {
                sum_product,
                sum_x,
                sum_y,
            },
            sum_square_x,
            sum_square_y,
        })
    }
}
