use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::fixed_int::FixedInt;
use crate::fixed_uint::{extend_and_multiply, FixedUint};
use crate::parse::{
    add_decimal_point_and_adjust_zeros, parse_exponent, parse_number, split_e_notation_parts,
};
use crate::NumericError;

/// Exact decimal with up to 29 integer digits and exactly 9 fractional
/// digits, stored as an `i128` scaled by 10^9.
///
/// Range: ±99999999999999999999999999999.999999999
/// Precision: 0.000000001
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Numeric {
    value: i128,
}

// ============================================================================
// Constants
// ============================================================================

/// 10^9, the number of scaled units per 1.
const SCALE: u32 = 1_000_000_000;

const SCALE_I128: i128 = SCALE as i128;

/// 10^18, the scale of "double-scaled" power intermediates.
const SCALE_SQUARE: u64 = 1_000_000_000_000_000_000;

/// 10^27, the scale of "triple-scaled" power intermediates.
const SCALE_CUBE: u128 = 1_000_000_000_000_000_000_000_000_000;

/// Largest allowed absolute scaled value: 10^38 - 1.
const MAX_PACKED: i128 = 99_999_999_999_999_999_999_999_999_999_999_999_999;

impl Numeric {
    /// The number of fractional decimal digits.
    pub const FRACTIONAL_DIGITS: i64 = 9;

    /// The number of integer decimal digits.
    pub const INTEGER_DIGITS: i64 = 29;

    /// The scaling factor: one equals this many scaled units.
    pub const SCALING_FACTOR: u32 = SCALE;

    /// Zero.
    pub const ZERO: Self = Self { value: 0 };

    /// One (1.0).
    pub const ONE: Self = Self { value: SCALE_I128 };

    /// Maximum value: 10^29 - 10^-9.
    pub const MAX: Self = Self { value: MAX_PACKED };

    /// Minimum value, the negation of [`Self::MAX`].
    pub const MIN: Self = Self { value: -MAX_PACKED };
}

// ============================================================================
// Constructors and Packed Access
// ============================================================================

impl Numeric {
    /// Creates a value from its scaled integer representation, rejecting
    /// anything outside the valid range.
    #[inline]
    pub fn from_packed_int(value: i128) -> crate::Result<Self> {
        if value < -MAX_PACKED || value > MAX_PACKED {
            return Err(NumericError::Overflow("numeric overflow".to_string()));
        }
        Ok(Self { value })
    }

    /// Returns the scaled integer representation.
    #[inline(always)]
    pub const fn as_packed_int(self) -> i128 {
        self.value
    }

    /// Narrows an unsigned magnitude into the valid range, applying a sign.
    pub(crate) fn from_fixed_uint<const W: usize>(
        magnitude: &FixedUint<W>,
        negate: bool,
    ) -> crate::Result<Self> {
        if magnitude.non_zero_length() <= 2 {
            let v = magnitude.low_u128();
            if v <= MAX_PACKED as u128 {
                let packed = v as i128;
                return Ok(Self {
                    value: if negate { -packed } else { packed },
                });
            }
        }
        Err(NumericError::Overflow("numeric overflow".to_string()))
    }

    /// Narrows a signed accumulator into the valid range.
    pub(crate) fn from_fixed_int<const W: usize>(value: &FixedInt<W>) -> crate::Result<Self> {
        Self::from_fixed_uint(&value.abs(), value.is_negative())
    }

    /// Returns `true` if `self` is negative.
    #[inline(always)]
    pub const fn is_negative(self) -> bool {
        self.value < 0
    }

    /// Returns `true` if `self` is zero.
    #[inline(always)]
    pub const fn is_zero(self) -> bool {
        self.value == 0
    }

    /// Returns the sign of `self` as -1, 0, or 1.
    #[inline(always)]
    pub const fn signum(self) -> i32 {
        (self.value > 0) as i32 - (self.value < 0) as i32
    }
}

// ============================================================================
// String Parsing
// ============================================================================

impl Numeric {
    /// Parses a decimal string, rounding inputs with more than 9 fractional
    /// digits half away from zero.
    ///
    /// Accepts optional surrounding whitespace, an optional sign, integer
    /// and/or fractional digits, and an optional `[eE][+-]?digits` exponent.
    pub fn from_string(input: &str) -> crate::Result<Self> {
        Self::from_string_internal(input, false)
    }

    /// Parses a decimal string, rejecting inputs that do not represent a
    /// whole number of 10^-9 units.
    pub fn from_string_strict(input: &str) -> crate::Result<Self> {
        Self::from_string_internal(input, true)
    }

    fn from_string_internal(input: &str, strict: bool) -> crate::Result<Self> {
        let bytes = input.as_bytes();
        let invalid =
            || NumericError::InvalidValue(format!("Invalid NUMERIC value: {}", input));
        let parts = split_e_notation_parts(bytes).ok_or_else(invalid)?;
        let exp = parse_exponent(parts.exp_part, Self::FRACTIONAL_DIGITS as u32)
            .ok_or_else(invalid)?;
        let magnitude: FixedUint<2> =
            parse_number(parts.int_part, parts.fract_part, exp, strict).ok_or_else(invalid)?;
        Self::from_fixed_uint(&magnitude, parts.negative).map_err(|_| invalid())
    }
}

// ============================================================================
// String Formatting
// ============================================================================

impl Numeric {
    /// Appends the decimal representation: shortest form, no trailing
    /// fractional zeros, plain `0` for zero.
    pub fn append_to_string(self, output: &mut String) {
        if self.value == 0 {
            output.push('0');
            return;
        }
        let old_size = output.len();
        let value = FixedInt::<2>::from_i128(self.value);
        value.append_to_string(output);
        let first_digit_index = old_size + value.is_negative() as usize;
        add_decimal_point_and_adjust_zeros(
            first_digit_index,
            Self::FRACTIONAL_DIGITS as usize,
            output,
        );
    }
}

// ============================================================================
// Addition and Subtraction
// ============================================================================

impl Numeric {
    /// Checked addition. Returns `None` if the result is out of range.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        let sum = self.value.checked_add(rhs.value)?;
        Self::from_packed_int(sum).ok()
    }

    /// Checked addition. Returns an error naming the operands on overflow.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_add(self, rhs: Self) -> crate::Result<Self> {
        self.checked_add(rhs).ok_or_else(|| {
            NumericError::Overflow(format!("numeric overflow: {} + {}", self, rhs))
        })
    }

    /// Checked subtraction. Returns `None` if the result is out of range.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        let diff = self.value.checked_sub(rhs.value)?;
        Self::from_packed_int(diff).ok()
    }

    /// Checked subtraction. Returns an error naming the operands on overflow.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_sub(self, rhs: Self) -> crate::Result<Self> {
        self.checked_sub(rhs).ok_or_else(|| {
            NumericError::Overflow(format!("numeric overflow: {} - {}", self, rhs))
        })
    }
}

// ============================================================================
// Multiplication
// ============================================================================

impl Numeric {
    /// Checked multiplication with half-away-from-zero rounding of the 10th
    /// fractional digit.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        let negative = self.value < 0;
        let rhs_negative = rhs.value < 0;
        let product: FixedUint<4> = extend_and_multiply(
            &FixedUint::<2>::from_u128(self.value.unsigned_abs()),
            &FixedUint::<2>::from_u128(rhs.value.unsigned_abs()),
        );

        // MAX_PACKED * SCALE + SCALE / 2; at this value the rounded quotient
        // would be MAX_PACKED + 1.
        const OVERFLOW_THRESHOLD: FixedUint<4> = FixedUint::from_words([
            6450984253243169536,
            13015503840481697412,
            293873587,
            0,
        ]);
        if product >= OVERFLOW_THRESHOLD {
            return None;
        }
        let (with_half, _) = product.overflowing_add_u64(SCALE as u64 / 2);
        let (quotient, _) = with_half.div_mod_u32(SCALE);
        // The threshold check bounds the quotient, so no further range test.
        let v = quotient.low_u128() as i128;
        Some(Self {
            value: if negative == rhs_negative { v } else { -v },
        })
    }

    /// Checked multiplication. Returns an error naming the operands.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_mul(self, rhs: Self) -> crate::Result<Self> {
        self.checked_mul(rhs).ok_or_else(|| {
            NumericError::Overflow(format!("numeric overflow: {} * {}", self, rhs))
        })
    }
}

// ============================================================================
// Division
// ============================================================================

impl Numeric {
    /// Checked division with half-away-from-zero rounding. Returns `None` on
    /// a zero divisor or an out-of-range quotient.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs.value == 0 {
            return None;
        }
        let divisor = rhs.value.unsigned_abs();
        let mut dividend = FixedUint::<3>::from_u128(self.value.unsigned_abs());
        // |self| < 2^127, so scaling up cannot leave 192 bits.
        let (scaled, overflow) = dividend.overflowing_mul_u64(SCALE as u64);
        debug_assert!(!overflow);
        dividend = scaled;
        // The halfway addition cannot carry either, for the same reason.
        let (with_half, _) = dividend.overflowing_add(&FixedUint::from_u128(divisor >> 1));
        let (quotient, _) = with_half.div_mod(&FixedUint::from_u128(divisor))?;
        Self::from_fixed_uint(&quotient, (self.value < 0) != (rhs.value < 0)).ok()
    }

    /// Checked division. Distinguishes division by zero from overflow in the
    /// error message.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_div(self, rhs: Self) -> crate::Result<Self> {
        if rhs.value == 0 {
            return Err(NumericError::DivisionByZero(format!(
                "division by zero: {} / {}",
                self, rhs
            )));
        }
        self.checked_div(rhs).ok_or_else(|| {
            NumericError::Overflow(format!("numeric overflow: {} / {}", self, rhs))
        })
    }

    /// Truncating integer division: the quotient with the fractional part
    /// discarded.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_integer_div(self, rhs: Self) -> crate::Result<Self> {
        if rhs.value == 0 {
            return Err(NumericError::DivisionByZero(format!(
                "division by zero: {} / {}",
                self, rhs
            )));
        }
        let quotient = self.value / rhs.value;
        if quotient <= MAX_PACKED / SCALE_I128 && quotient >= -MAX_PACKED / SCALE_I128 {
            return Ok(Self {
                value: quotient * SCALE_I128,
            });
        }
        Err(NumericError::Overflow(format!(
            "numeric overflow: {} / {}",
            self, rhs
        )))
    }

    /// Remainder of the scaled integers; keeps the dividend's sign.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_mod(self, rhs: Self) -> crate::Result<Self> {
        if rhs.value == 0 {
            return Err(NumericError::DivisionByZero(format!(
                "division by zero: {} / {}",
                self, rhs
            )));
        }
        Ok(Self {
            value: self.value % rhs.value,
        })
    }
}

// ============================================================================
// Sign Operations
// ============================================================================

impl Numeric {
    /// Absolute value. Always in range because the range is symmetric.
    #[inline(always)]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub const fn abs(self) -> Self {
        Self {
            value: if self.value < 0 { -self.value } else { self.value },
        }
    }

    /// The sign as a decimal value: -1, 0, or 1.
    #[inline(always)]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub const fn sign(self) -> Self {
        Self {
            value: self.signum() as i128 * SCALE_I128,
        }
    }
}

// ============================================================================
// Rounding
// ============================================================================

impl Numeric {
    fn round_internal(self, digits: i64, round_away_from_zero: bool) -> i128 {
        if digits >= Self::FRACTIONAL_DIGITS {
            // Rounding past the stored precision has no effect.
            return self.value;
        }
        if digits < -Self::INTEGER_DIGITS {
            // Rounding 30 or more digits away always yields zero; 29 digits
            // away can still overflow instead.
            return 0;
        }
        let mut value = self.value;
        match digits {
            // Fast paths for common digit counts; the constant divisors
            // compile down to multiplications.
            0 => round_trailing_digits(&mut value, SCALE_I128, round_away_from_zero),
            1 => round_trailing_digits(&mut value, 100_000_000, round_away_from_zero),
            2 => round_trailing_digits(&mut value, 10_000_000, round_away_from_zero),
            3 => round_trailing_digits(&mut value, 1_000_000, round_away_from_zero),
            _ => {
                let trunc_factor = 10i128.pow((Self::FRACTIONAL_DIGITS - digits) as u32);
                round_trailing_digits(&mut value, trunc_factor, round_away_from_zero);
            }
        }
        value
    }

    /// Rounds to `digits` fractional digits, halfway cases away from zero.
    /// Negative digit counts round integer positions.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_round(self, digits: i64) -> crate::Result<Self> {
        Self::from_packed_int(self.round_internal(digits, true)).map_err(|_| {
            NumericError::Overflow(format!("numeric overflow: ROUND({}, {})", self, digits))
        })
    }

    /// Truncates toward zero at `digits` fractional digits. Never overflows.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn trunc(self, digits: i64) -> Self {
        Self {
            value: self.round_internal(digits, false),
        }
    }

    /// Rounds up to the nearest integer.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_ceil(self) -> crate::Result<Self> {
        let fract = self.fractional_part() as i128;
        let value = self.value - if fract > 0 { fract - SCALE_I128 } else { fract };
        Self::from_packed_int(value)
            .map_err(|_| NumericError::Overflow(format!("numeric overflow: CEIL({})", self)))
    }

    /// Rounds down to the nearest integer.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_floor(self) -> crate::Result<Self> {
        let fract = self.fractional_part() as i128;
        let value = self.value - if fract < 0 { fract + SCALE_I128 } else { fract };
        Self::from_packed_int(value)
            .map_err(|_| NumericError::Overflow(format!("numeric overflow: FLOOR({})", self)))
    }

    /// Signed scaled fractional part, in (-10^9, 10^9).
    #[inline(always)]
    fn fractional_part(self) -> i64 {
        (self.value % SCALE_I128) as i64
    }
}

/// Clears the trailing digits below `divisor`, optionally biasing by half a
/// unit first for half-away-from-zero rounding.
#[inline(always)]
fn round_trailing_digits(value: &mut i128, divisor: i128, round_away_from_zero: bool) {
    if round_away_from_zero {
        let offset = divisor >> 1;
        // |value| < 1e38 and offset <= 5e37, so this cannot overflow i128.
        *value += if *value < 0 { -offset } else { offset };
    }
    *value -= *value % divisor;
}

// ============================================================================
// Power
// ============================================================================

/// Divides a double-scaled square (scaled by 10^36) by 10^18 with rounding,
/// narrowing by one word. Returns `None` if the result does not fit.
fn remove_double_scale<const N: usize, const M: usize>(
    input: FixedUint<N>,
) -> Option<FixedUint<M>> {
    debug_assert!(M + 1 == N);
    let (with_half, carry) = input.overflowing_add_u64(SCALE_SQUARE / 2);
    if carry || with_half.words()[N - 1] >= SCALE_SQUARE {
        return None;
    }
    let (q, _) = with_half.div_mod_u32(SCALE);
    let (q, _) = q.div_mod_u32(SCALE);
    Some(q.truncate::<M>())
}

/// Raises a double-scaled value (scaled by 10^18) to `exp` by binary
/// exponentiation, keeping every intermediate double-scaled. Returns `false`
/// if any intermediate overflows, which the caller decides is an error or a
/// rounded-to-zero result.
fn double_scaled_power(double_scaled_value: &mut FixedUint<3>, exp: u128) -> bool {
    let mut result = FixedUint::<3>::from_u64(SCALE_SQUARE);
    let mut power = *double_scaled_value;
    let mut exp = exp;
    loop {
        if exp & 1 != 0 {
            let tmp: FixedUint<6> = extend_and_multiply(&result, &power);
            if tmp.words()[4] != 0 || tmp.words()[5] != 0 {
                return false;
            }
            match remove_double_scale::<4, 3>(tmp.truncate::<4>()) {
                Some(r) => result = r,
                None => return false,
            }
        }
        if exp <= 1 {
            *double_scaled_value = result;
            return true;
        }
        // The square only fits if the power still fits in two words.
        if power.words()[2] != 0 {
            return false;
        }
        let truncated = power.truncate::<2>();
        let squared: FixedUint<4> = extend_and_multiply(&truncated, &truncated);
        match remove_double_scale::<4, 3>(squared) {
            Some(p) => power = p,
            None => return false,
        }
        exp >>= 1;
    }
}

impl Numeric {
    /// Multiplies `dest` by `pow(abs_value / 10^9, fract_exp / 10^9) * 10^9`,
    /// going through `f64::powf`. The fractional-exponent path is only as
    /// precise as the double round trip.
    fn multiply_by_fractional_power(
        abs_value: u128,
        fract_exp: i64,
        dest: &mut FixedUint<3>,
    ) -> crate::Result<()> {
        let fract_pow = remove_scale_and_convert_to_double(abs_value as i128)
            .powf(remove_scale_and_convert_to_double(fract_exp as i128));
        let fract_term = Self::from_double(fract_pow)?;
        let product: FixedUint<5> = extend_and_multiply(
            dest,
            &FixedUint::<2>::from_u128(fract_term.as_packed_int() as u128),
        );
        if product.words()[3] == 0 && product.words()[4] == 0 {
            *dest = product.truncate::<3>();
            return Ok(());
        }
        Err(NumericError::Overflow("numeric overflow".to_string()))
    }

    fn power_internal(self, exp: Self) -> crate::Result<Self> {
        // Any value raised to the zero power is one, including zero.
        if exp.value == 0 {
            return Ok(Self::ONE);
        }
        let exp_is_negative = exp.value < 0;
        if self.value == 0 {
            if exp_is_negative {
                return Err(NumericError::DivisionByZero("division by zero".to_string()));
            }
            return Ok(Self::ZERO);
        }

        let (abs_integer_exp, abs_fract_exp) =
            FixedUint::<2>::from_u128(exp.value.unsigned_abs()).div_mod_u32(SCALE);
        let abs_integer_exp = abs_integer_exp.low_u128();
        let mut fract_exp = abs_fract_exp as i64;
        if exp.value < 0 {
            fract_exp = -fract_exp;
        }

        let mut result_is_negative = false;
        let abs_value = self.value.unsigned_abs();
        if self.value < 0 {
            if fract_exp != 0 {
                return Err(NumericError::NegativeToFractionalPower(
                    "Negative NUMERIC value cannot be raised to a fractional power".to_string(),
                ));
            }
            result_is_negative = abs_integer_exp & 1 != 0;
        }

        let overflow = || NumericError::Overflow("numeric overflow".to_string());
        let mut double_scaled_value: FixedUint<3>;
        if !exp_is_negative {
            let (scaled, _) =
                FixedUint::<3>::from_u128(abs_value).overflowing_mul_u64(SCALE as u64);
            double_scaled_value = scaled;
        } else if abs_value > SCALE as u128 {
            // Negative exponent with |base| > 1: raise first, then invert
            // with a triple-scaled numerator so the division keeps its
            // precision.
            let (scaled, _) =
                FixedUint::<3>::from_u128(abs_value).overflowing_mul_u64(SCALE as u64);
            double_scaled_value = scaled;
            if !double_scaled_power(&mut double_scaled_value, abs_integer_exp)
                || double_scaled_value > FixedUint::<3>::from_u128(SCALE_CUBE * 2)
            {
                // 1 / huge rounds to zero.
                return Ok(Self::ZERO);
            }
            if fract_exp == 0 {
                let numerator = FixedUint::<3>::from_u128(SCALE_CUBE)
                    .div_and_round_away_from_zero(&double_scaled_value)
                    .ok_or_else(overflow)?;
                return Self::from_fixed_uint(&numerator, result_is_negative);
            }
            let mut numerator = FixedUint::<3>::from_u64(SCALE_SQUARE);
            // fract_exp < 0 here, so pow(base, fract_exp) <= 1e9 and this
            // multiplication cannot overflow.
            Self::multiply_by_fractional_power(abs_value, fract_exp, &mut numerator)?;
            let numerator = numerator
                .div_and_round_away_from_zero(&double_scaled_value)
                .ok_or_else(overflow)?;
            return Self::from_fixed_uint(&numerator, result_is_negative);
        } else {
            // Negative exponent with |base| <= 1: invert the base first.
            double_scaled_value = FixedUint::<3>::from_u128(SCALE_CUBE)
                .div_and_round_away_from_zero(&FixedUint::from_u128(abs_value))
                .ok_or_else(overflow)?;
        }

        if !double_scaled_power(&mut double_scaled_value, abs_integer_exp) {
            return Err(overflow());
        }

        if fract_exp == 0 {
            let single_scaled = double_scaled_value.div_and_round_away_from_zero_u64(SCALE as u64);
            return Self::from_fixed_uint(&single_scaled, result_is_negative);
        }

        Self::multiply_by_fractional_power(abs_value, fract_exp, &mut double_scaled_value)?;
        // Now triple-scaled; remove two scale factors.
        let narrowed = remove_double_scale::<3, 2>(double_scaled_value).ok_or_else(overflow)?;
        Self::from_fixed_uint(&narrowed, result_is_negative)
    }

    /// Raises `self` to `exp`.
    ///
    /// `x^0 == 1` for every `x`; `0^e` errors for negative `e`; a negative
    /// base with a fractional exponent errors. The fractional part of the
    /// exponent goes through `f64::powf` and carries its precision.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_power(self, exp: Self) -> crate::Result<Self> {
        self.power_internal(exp)
            .map_err(|e| e.with_context(&format!("POW({}, {})", self, exp)))
    }
}

// ============================================================================
// Double Conversion
// ============================================================================

/// Computes `value / 10^9` as an `f64` with minimal precision loss.
///
/// The value is pre-shifted to at least 96 significant bits so the quotient
/// keeps at least 64, and a nonzero division remainder is OR-ed into the low
/// bit so round-to-even cannot mistake it for an exact tie.
fn remove_scale_and_convert_to_double(value: i128) -> f64 {
    if value == 0 {
        return 0.0;
    }
    let abs_value = value.unsigned_abs();
    // The binary scaling factor is a power of two, so dividing by it at the
    // end costs no precision.
    let mut binary_scaling_factor = 1.0f64;
    let mut shifted = abs_value;
    if abs_value < 1u128 << 96 {
        if abs_value >= 1u128 << 64 {
            shifted <<= 32;
            binary_scaling_factor = (1u128 << 32) as f64;
        } else if abs_value >= 1u128 << 32 {
            shifted <<= 64;
            binary_scaling_factor = (1u128 << 64) as f64;
        } else {
            shifted <<= 96;
            binary_scaling_factor = (1u128 << 96) as f64;
        }
    }
    let (quotient, remainder) = FixedUint::<2>::from_u128(shifted).div_mod_u32(SCALE);
    let mut words = *quotient.words();
    words[0] |= (remainder != 0) as u64;
    let result = FixedUint::<2>::from_words(words).to_f64() / binary_scaling_factor;
    if value >= 0 {
        result
    } else {
        -result
    }
}

/// Splits a finite nonzero double into `(mantissa, exponent)` with
/// `value == mantissa * 2^exponent`.
pub(crate) fn decompose_double(value: f64) -> (i64, i32) {
    let bits = value.to_bits();
    let negative = bits >> 63 != 0;
    let biased_exp = (bits >> 52 & 0x7FF) as i32;
    let fraction = bits & ((1u64 << 52) - 1);
    let (magnitude, exponent) = if biased_exp == 0 {
        (fraction, -1074)
    } else {
        (fraction | 1 << 52, biased_exp - 1075)
    };
    let mantissa = if negative {
        -(magnitude as i64)
    } else {
        magnitude as i64
    };
    (mantissa, exponent)
}

/// Multiplies a double by 10^9 and rounds away from zero into an `i128`.
/// Returns `None` when the scaled magnitude cannot fit in 127 bits.
fn scale_and_round_away_from_zero(value: f64) -> Option<i128> {
    if value == 0.0 {
        return Some(0);
    }
    let (mantissa, exponent) = decompose_double(value);
    if exponent <= -128 {
        return Some(0);
    }
    if exponent >= 127 {
        return None;
    }
    let negative = mantissa < 0;
    let mut abs_result = mantissa.unsigned_abs() as u128 * SCALE as u128;
    if exponent < 0 {
        // Shift right by one bit less, add one into the bit about to go, and
        // finish the shift: round away from zero.
        abs_result >>= (-1 - exponent) as u32;
        abs_result += 1;
        abs_result >>= 1;
    } else if exponent > 0 {
        let msb_idx = 127 - abs_result.leading_zeros();
        if msb_idx >= 127 - exponent as u32 {
            return None;
        }
        abs_result <<= exponent as u32;
    }
    // The mantissa and scale together stay far below 127 bits when the
    // exponent is zero, so the sign bit is never set here.
    let packed = abs_result as i128;
    Some(if negative { -packed } else { packed })
}

/// Renders a double for an error message; NaN is always `nan`, never `-nan`.
pub(crate) fn format_double(value: f64) -> String {
    if value.is_nan() {
        "nan".to_string()
    } else {
        format!("{}", value)
    }
}

impl Numeric {
    /// Converts to the nearest `f64`.
    pub fn to_double(self) -> f64 {
        remove_scale_and_convert_to_double(self.value)
    }

    /// Converts from an `f64`, rounding the 10th fractional digit away from
    /// zero. NaN and infinities are rejected.
    pub fn from_double(value: f64) -> crate::Result<Self> {
        if !value.is_finite() {
            return Err(NumericError::NonFiniteConversion(format!(
                "Illegal conversion of non-finite floating point number to numeric: {}",
                format_double(value)
            )));
        }
        if let Some(packed) = scale_and_round_away_from_zero(value) {
            if let Ok(result) = Self::from_packed_int(packed) {
                return Ok(result);
            }
        }
        Err(NumericError::OutOfRange(format!(
            "numeric out of range: {}",
            format_double(value)
        )))
    }
}

// ============================================================================
// Byte Serialization
// ============================================================================

impl Numeric {
    /// Appends the minimum-length little-endian two's-complement encoding of
    /// the scaled integer. Zero is a single `0x00` byte.
    pub fn serialize_and_append_to_bytes(self, output: &mut Vec<u8>) {
        FixedInt::<2>::from_i128(self.value).serialize_to_bytes(output);
    }

    /// Returns the serialized byte encoding.
    pub fn serialize_to_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(16);
        self.serialize_and_append_to_bytes(&mut bytes);
        bytes
    }

    /// Parses the byte encoding produced by [`Self::serialize_to_bytes`].
    /// The empty byte string is invalid.
    pub fn deserialize_from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        let value = FixedInt::<2>::deserialize_from_bytes(bytes)
            .ok_or_else(|| NumericError::InvalidEncoding("Invalid numeric encoding".to_string()))?;
        Self::from_packed_int(value.to_i128().unwrap_or_default())
    }
}

// ============================================================================
// Operator Overloading
// ============================================================================

impl Add for Numeric {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs).expect("attempt to add with overflow")
    }
}

impl Sub for Numeric {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self::Output {
        self.checked_sub(rhs)
            .expect("attempt to subtract with overflow")
    }
}

impl Mul for Numeric {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self::Output {
        self.checked_mul(rhs)
            .expect("attempt to multiply with overflow")
    }
}

impl Div for Numeric {
    type Output = Self;

    #[inline(always)]
    fn div(self, rhs: Self) -> Self::Output {
        self.checked_div(rhs)
            .expect("attempt to divide by zero or overflow")
    }
}

impl Neg for Numeric {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self::Output {
        // The range is symmetric, so negation is total.
        Self { value: -self.value }
    }
}

impl AddAssign for Numeric {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for Numeric {
    #[inline(always)]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for Numeric {
    #[inline(always)]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for Numeric {
    #[inline(always)]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl Sum for Numeric {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc + x)
    }
}

// ============================================================================
// Standard Library Trait Implementations
// ============================================================================

macro_rules! impl_from_integer {
    ($($t:ty),*) => {$(
        impl From<$t> for Numeric {
            #[inline(always)]
            fn from(value: $t) -> Self {
                // Every 64-bit integer times 10^9 stays far below 10^38.
                Self {
                    value: value as i128 * SCALE_I128,
                }
            }
        }
    )*};
}

impl_from_integer!(i8, i16, i32, i64, u8, u16, u32, u64);

impl TryFrom<f64> for Numeric {
    type Error = NumericError;

    #[inline(always)]
    fn try_from(value: f64) -> crate::Result<Self> {
        Self::from_double(value)
    }
}

impl FromStr for Numeric {
    type Err = NumericError;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_string(s)
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::with_capacity(41);
        self.append_to_string(&mut out);
        f.write_str(&out)
    }
}

impl fmt::Debug for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.debug_struct("Numeric").field("value", &self.value).finish()
        } else {
            write!(f, "Numeric({})", self)
        }
    }
}

// ============================================================================
// Serde Support
// ============================================================================

#[cfg(feature = "serde")]
impl Serialize for Numeric {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.value.serialize(serializer)
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Numeric {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_string(&s).map_err(de::Error::custom)
        } else {
            let value = i128::deserialize(deserializer)?;
            Self::from_packed_int(value).map_err(de::Error::custom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(s: &str) -> Numeric {
        Numeric::from_string(s).unwrap()
    }

    #[test]
    fn test_constants() {
        assert_eq!(Numeric::ZERO.as_packed_int(), 0);
        assert_eq!(Numeric::ONE.as_packed_int(), 1_000_000_000);
        assert_eq!(Numeric::MAX.as_packed_int(), MAX_PACKED);
        assert_eq!(Numeric::MIN.as_packed_int(), -MAX_PACKED);
    }

    #[test]
    fn test_multiply_overflow_threshold_constant() {
        // The hard-coded threshold must equal MAX_PACKED * SCALE + SCALE / 2.
        let derived: FixedUint<4> = extend_and_multiply(
            &FixedUint::<2>::from_u128(MAX_PACKED as u128),
            &FixedUint::<2>::from_u128(SCALE as u128),
        );
        let derived = derived.overflowing_add_u64(SCALE as u64 / 2).0;
        let threshold = FixedUint::<4>::from_words([
            6450984253243169536,
            13015503840481697412,
            293873587,
            0,
        ]);
        assert_eq!(derived, threshold);
    }

    #[test]
    fn test_from_string_basic() {
        assert_eq!(numeric("0").as_packed_int(), 0);
        assert_eq!(numeric("1").as_packed_int(), 1_000_000_000);
        assert_eq!(numeric("-1.5").as_packed_int(), -1_500_000_000);
        assert_eq!(numeric("0.000000001").as_packed_int(), 1);
        assert_eq!(numeric(".5").as_packed_int(), 500_000_000);
        assert_eq!(numeric("5.").as_packed_int(), 5_000_000_000);
        assert_eq!(numeric("+12.345").as_packed_int(), 12_345_000_000);
    }

    #[test]
    fn test_from_string_e_notation() {
        // whitespace, sign, and E-notation together
        let v = numeric("  -1.2345e2 ");
        assert_eq!(v.to_string(), "-123.45");
        assert_eq!(numeric("1e9").as_packed_int(), 10i128.pow(18));
        assert_eq!(numeric("1E-9").as_packed_int(), 1);
        assert_eq!(numeric("1.5e+3").as_packed_int(), 1_500_000_000_000);
        // an absurdly negative exponent saturates and rounds to zero
        assert_eq!(
            numeric("1e-99999999999999999999999999").as_packed_int(),
            0
        );
    }

    #[test]
    fn test_from_string_rounding_vs_strict() {
        // half a nano rounds up when lenient and errors when strict
        assert_eq!(numeric("0.0000000005").as_packed_int(), 1);
        let err = Numeric::from_string_strict("0.0000000005").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid NUMERIC value: 0.0000000005"
        );
        assert_eq!(numeric("0.0000000004").as_packed_int(), 0);
        assert_eq!(numeric("-0.0000000005").as_packed_int(), -1);
        // strict accepts discarded zeros
        assert_eq!(
            Numeric::from_string_strict("0.1000000000")
                .unwrap()
                .as_packed_int(),
            100_000_000
        );
    }

    #[test]
    fn test_from_string_invalid() {
        for input in [
            "", " ", "abc", "1..2", "1.2.3", "e5", ".e5", "1e", "1e1.5", "--1", "+-1", "1 2",
            "1e99999999999999999999",
        ] {
            let err = Numeric::from_string(input).unwrap_err();
            assert_eq!(
                err.to_string(),
                format!("Invalid NUMERIC value: {}", input),
                "input {:?}",
                input
            );
        }
        // out of range also reports the input string
        let err = Numeric::from_string("1e38").unwrap_err();
        assert_eq!(err.to_string(), "Invalid NUMERIC value: 1e38");
    }

    #[test]
    fn test_from_string_extremes() {
        let max_str = "99999999999999999999999999999.999999999";
        assert_eq!(numeric(max_str), Numeric::MAX);
        assert_eq!(numeric(&format!("-{}", max_str)), Numeric::MIN);
        // rounding past MAX overflows
        assert!(Numeric::from_string("99999999999999999999999999999.9999999995").is_err());
    }

    #[test]
    fn test_to_string() {
        let cases = [
            ("0", "0"),
            ("1", "1"),
            ("-1", "-1"),
            ("1.5", "1.5"),
            ("-123.45", "-123.45"),
            ("0.000000001", "0.000000001"),
            ("-0.000000001", "-0.000000001"),
            ("10.010", "10.01"),
            ("1000000000", "1000000000"),
            ("99999999999999999999999999999.999999999", "99999999999999999999999999999.999999999"),
        ];
        for (input, expected) in cases {
            assert_eq!(numeric(input).to_string(), expected, "input {}", input);
        }
        // no negative zero
        assert_eq!(numeric("-0").to_string(), "0");
        assert_eq!(numeric("-0.0").to_string(), "0");
    }

    #[test]
    fn test_add_sub() {
        assert_eq!(numeric("1.1").try_add(numeric("2.2")).unwrap(), numeric("3.3"));
        assert_eq!(numeric("1.1").try_sub(numeric("2.2")).unwrap(), numeric("-1.1"));
        let err = Numeric::MAX.try_add(numeric("0.000000001")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "numeric overflow: 99999999999999999999999999999.999999999 + 0.000000001"
        );
        let err = Numeric::MIN.try_sub(numeric("1")).unwrap_err();
        assert!(err.to_string().starts_with("numeric overflow: "));
    }

    #[test]
    fn test_multiply() {
        assert_eq!(numeric("2").try_mul(numeric("3")).unwrap(), numeric("6"));
        assert_eq!(numeric("-1.5").try_mul(numeric("2")).unwrap(), numeric("-3"));
        // rounding of the 10th fractional digit, half away from zero
        assert_eq!(
            numeric("0.00001").try_mul(numeric("0.00005")).unwrap(),
            numeric("0.000000001")
        );
        assert_eq!(
            numeric("0.00001").try_mul(numeric("0.00004")).unwrap(),
            Numeric::ZERO
        );
        assert_eq!(
            numeric("-0.00001").try_mul(numeric("0.00005")).unwrap(),
            numeric("-0.000000001")
        );
        // 1e19 * 1e19 = 1e38 is one unit past MAX
        let big = numeric("10000000000000000000");
        let err = big.try_mul(big).unwrap_err();
        assert_eq!(
            err.to_string(),
            "numeric overflow: 10000000000000000000 * 10000000000000000000"
        );
        // max * 1 is fine
        assert_eq!(Numeric::MAX.try_mul(numeric("1")).unwrap(), Numeric::MAX);
    }

    #[test]
    fn test_divide() {
        assert_eq!(numeric("6").try_div(numeric("2")).unwrap(), numeric("3"));
        assert_eq!(numeric("1").try_div(numeric("3")).unwrap(), numeric("0.333333333"));
        assert_eq!(numeric("2").try_div(numeric("3")).unwrap(), numeric("0.666666667"));
        assert_eq!(numeric("-1").try_div(numeric("3")).unwrap(), numeric("-0.333333333"));
        let err = numeric("1").try_div(Numeric::ZERO).unwrap_err();
        assert_eq!(err.to_string(), "division by zero: 1 / 0");
        let err = Numeric::MAX.try_div(numeric("0.1")).unwrap_err();
        assert!(err.to_string().starts_with("numeric overflow: "));
    }

    #[test]
    fn test_integer_divide() {
        assert_eq!(
            numeric("7.5").try_integer_div(numeric("2")).unwrap(),
            numeric("3")
        );
        assert_eq!(
            numeric("-7.5").try_integer_div(numeric("2")).unwrap(),
            numeric("-3")
        );
        let err = Numeric::MAX.try_integer_div(numeric("0.000000001")).unwrap_err();
        assert!(err.to_string().starts_with("numeric overflow: "));
        let err = numeric("1").try_integer_div(Numeric::ZERO).unwrap_err();
        assert_eq!(err.to_string(), "division by zero: 1 / 0");
    }

    #[test]
    fn test_mod() {
        assert_eq!(numeric("5").try_mod(numeric("2")).unwrap(), numeric("1"));
        assert_eq!(numeric("-5").try_mod(numeric("2")).unwrap(), numeric("-1"));
        assert_eq!(numeric("5").try_mod(numeric("-2")).unwrap(), numeric("1"));
        assert_eq!(numeric("5.2").try_mod(numeric("2")).unwrap(), numeric("1.2"));
        let err = numeric("5").try_mod(Numeric::ZERO).unwrap_err();
        assert_eq!(err.to_string(), "division by zero: 5 / 0");
    }

    #[test]
    fn test_abs_sign() {
        assert_eq!(numeric("-3").abs(), numeric("3"));
        assert_eq!(numeric("3").abs(), numeric("3"));
        assert_eq!(Numeric::MIN.abs(), Numeric::MAX);
        assert_eq!(numeric("-3").sign(), numeric("-1"));
        assert_eq!(numeric("3").sign(), numeric("1"));
        assert_eq!(Numeric::ZERO.sign(), Numeric::ZERO);
        assert_eq!(numeric("-3").signum(), -1);
    }

    #[test]
    fn test_round() {
        // half away from zero on both sides of zero
        assert_eq!(numeric("1.2345").try_round(2).unwrap(), numeric("1.23"));
        assert_eq!(numeric("1.235").try_round(2).unwrap(), numeric("1.24"));
        assert_eq!(numeric("-1.235").try_round(2).unwrap(), numeric("-1.24"));
        assert_eq!(numeric("1.5").try_round(0).unwrap(), numeric("2"));
        assert_eq!(numeric("-1.5").try_round(0).unwrap(), numeric("-2"));
        assert_eq!(numeric("15").try_round(-1).unwrap(), numeric("20"));
        // digits at or past the precision are a no-op
        assert_eq!(numeric("1.2345").try_round(9).unwrap(), numeric("1.2345"));
        assert_eq!(numeric("1.2345").try_round(100).unwrap(), numeric("1.2345"));
        // far-negative digits give zero
        assert_eq!(numeric("123").try_round(-30).unwrap(), Numeric::ZERO);
        // rounding the top digit can overflow
        let err = Numeric::MAX.try_round(-29).unwrap_err();
        assert_eq!(
            err.to_string(),
            "numeric overflow: ROUND(99999999999999999999999999999.999999999, -29)"
        );
    }

    #[test]
    fn test_trunc() {
        assert_eq!(numeric("1.999").trunc(0), numeric("1"));
        assert_eq!(numeric("-1.999").trunc(0), numeric("-1"));
        assert_eq!(numeric("1.2345").trunc(2), numeric("1.23"));
        assert_eq!(numeric("1999").trunc(-3), numeric("1000"));
        assert_eq!(Numeric::MAX.trunc(-29), Numeric::ZERO);
        assert_eq!(numeric("123").trunc(-30), Numeric::ZERO);
    }

    #[test]
    fn test_ceil_floor() {
        assert_eq!(numeric("1.1").try_ceil().unwrap(), numeric("2"));
        assert_eq!(numeric("-1.1").try_ceil().unwrap(), numeric("-1"));
        assert_eq!(numeric("2").try_ceil().unwrap(), numeric("2"));
        assert_eq!(numeric("1.9").try_floor().unwrap(), numeric("1"));
        assert_eq!(numeric("-1.1").try_floor().unwrap(), numeric("-2"));
        let err = Numeric::MAX.try_floor();
        assert!(err.is_ok());
        let err = Numeric::MAX.try_ceil().unwrap_err();
        assert!(err.to_string().starts_with("numeric overflow: CEIL("));
        let err = Numeric::MIN.try_floor().unwrap_err();
        assert!(err.to_string().starts_with("numeric overflow: FLOOR("));
    }

    #[test]
    fn test_power_integer() {
        // negative exponents invert exactly
        assert_eq!(
            numeric("2").try_power(numeric("-3")).unwrap(),
            numeric("0.125")
        );
        assert_eq!(numeric("2").try_power(numeric("10")).unwrap(), numeric("1024"));
        assert_eq!(numeric("-2").try_power(numeric("3")).unwrap(), numeric("-8"));
        assert_eq!(numeric("-2").try_power(numeric("2")).unwrap(), numeric("4"));
        assert_eq!(numeric("1.5").try_power(numeric("2")).unwrap(), numeric("2.25"));
        assert_eq!(numeric("0.1").try_power(numeric("-1")).unwrap(), numeric("10"));
        assert_eq!(numeric("0.5").try_power(numeric("-2")).unwrap(), numeric("4"));
        assert_eq!(numeric("10").try_power(numeric("28")).unwrap(), numeric("1e28"));
    }

    #[test]
    fn test_power_special_cases() {
        assert_eq!(numeric("0").try_power(numeric("0")).unwrap(), Numeric::ONE);
        assert_eq!(Numeric::MAX.try_power(numeric("0")).unwrap(), Numeric::ONE);
        assert_eq!(numeric("0").try_power(numeric("2")).unwrap(), Numeric::ZERO);
        let err = numeric("0").try_power(numeric("-1")).unwrap_err();
        assert_eq!(err.to_string(), "division by zero: POW(0, -1)");
        let err = numeric("-2").try_power(numeric("0.5")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Negative NUMERIC value cannot be raised to a fractional power: POW(-2, 0.5)"
        );
        let err = numeric("10").try_power(numeric("29")).unwrap_err();
        assert_eq!(err.to_string(), "numeric overflow: POW(10, 29)");
        // 2 to a huge negative power rounds to zero
        assert_eq!(
            numeric("2").try_power(numeric("-200")).unwrap(),
            Numeric::ZERO
        );
    }

    #[test]
    fn test_power_fractional() {
        let sqrt2 = numeric("2").try_power(numeric("0.5")).unwrap();
        let diff = (sqrt2.to_double() - 2f64.sqrt()).abs();
        assert!(diff < 1e-9, "sqrt(2) came out as {}", sqrt2);
        let v = numeric("4").try_power(numeric("1.5")).unwrap();
        let diff = (v.to_double() - 8.0).abs();
        assert!(diff < 1e-8, "4^1.5 came out as {}", v);
    }

    #[test]
    fn test_to_double() {
        assert_eq!(Numeric::ZERO.to_double(), 0.0);
        assert_eq!(numeric("1").to_double(), 1.0);
        assert_eq!(numeric("-1.5").to_double(), -1.5);
        assert_eq!(numeric("0.000000001").to_double(), 1e-9);
        assert_eq!(numeric("100").to_double(), 100.0);
        // representable powers of two survive exactly
        assert_eq!(numeric("4503599627370496").to_double(), 4503599627370496.0);
        let max_double = Numeric::MAX.to_double();
        assert_eq!(max_double, 1e29);
    }

    #[test]
    fn test_from_double() {
        assert_eq!(Numeric::from_double(0.0).unwrap(), Numeric::ZERO);
        assert_eq!(Numeric::from_double(1.5).unwrap(), numeric("1.5"));
        assert_eq!(Numeric::from_double(-2.25).unwrap(), numeric("-2.25"));
        assert_eq!(Numeric::from_double(0.3).unwrap(), numeric("0.3"));
        assert_eq!(Numeric::from_double(1e-10).unwrap(), Numeric::ZERO);
        // half a nano rounds away from zero
        assert_eq!(Numeric::from_double(5e-10).unwrap().as_packed_int(), 1);

        // NaN reports as "nan", never "-nan"
        let err = Numeric::from_double(f64::NAN).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Illegal conversion of non-finite floating point number to numeric: nan"
        );
        let err = Numeric::from_double(-f64::NAN).unwrap_err();
        assert!(err.to_string().contains("nan"));
        assert!(!err.to_string().contains("-nan"));
        let err = Numeric::from_double(f64::INFINITY).unwrap_err();
        assert!(err.to_string().contains("inf"));

        let err = Numeric::from_double(1e38).unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("numeric out of range: {}", format_double(1e38))
        );
    }

    #[test]
    fn test_serialization() {
        // zero is a single 0x00 byte
        assert_eq!(Numeric::ZERO.serialize_to_bytes(), [0x00]);
        // packed 1 is one byte; a magnitude with the top bit set grows a byte
        assert_eq!(
            Numeric::from_packed_int(1).unwrap().serialize_to_bytes(),
            [0x01]
        );
        assert_eq!(
            Numeric::from_packed_int(128).unwrap().serialize_to_bytes(),
            [0x80, 0x00]
        );
        for value in ["0", "1", "-1", "123.456", "-0.000000001", "99999999999999999999999999999.999999999"] {
            let v = numeric(value);
            let bytes = v.serialize_to_bytes();
            assert_eq!(Numeric::deserialize_from_bytes(&bytes).unwrap(), v);
        }
        let err = Numeric::deserialize_from_bytes(&[]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid numeric encoding");
        // 17 significant bytes cannot fit
        let err = Numeric::deserialize_from_bytes(&[1u8; 17]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid numeric encoding");
        // in-width but out-of-range packed value
        let bytes = FixedInt::<2>::from_i128(MAX_PACKED + 1)
            .to_bits()
            .words()
            .iter()
            .flat_map(|w| w.to_le_bytes())
            .collect::<Vec<_>>();
        assert!(Numeric::deserialize_from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_operators() {
        let a = numeric("1.5");
        let b = numeric("0.5");
        assert_eq!(a + b, numeric("2"));
        assert_eq!(a - b, numeric("1"));
        assert_eq!(a * b, numeric("0.75"));
        assert_eq!(a / b, numeric("3"));
        assert_eq!(-a, numeric("-1.5"));
        let mut c = a;
        c += b;
        assert_eq!(c, numeric("2"));
        let total: Numeric = [a, b, b].into_iter().sum();
        assert_eq!(total, numeric("2.5"));
    }

    #[test]
    #[should_panic(expected = "attempt to add with overflow")]
    fn test_add_operator_panics() {
        let _ = Numeric::MAX + Numeric::MAX;
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(Numeric::from(1i64), Numeric::ONE);
        assert_eq!(Numeric::from(-5i32), numeric("-5"));
        assert_eq!(Numeric::from(u64::MAX).to_string(), u64::MAX.to_string());
        assert_eq!(Numeric::from(i64::MIN).to_string(), i64::MIN.to_string());
    }

    #[test]
    fn test_comparison_and_hash_semantics() {
        assert!(numeric("1.5") < numeric("2"));
        assert!(numeric("-2") < numeric("-1.5"));
        assert!(Numeric::MIN < Numeric::MAX);
        assert_eq!(numeric("1.50"), numeric("1.5"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_packed() -> impl Strategy<Value = i128> {
        -MAX_PACKED..=MAX_PACKED
    }

    proptest! {
        #[test]
        fn prop_parse_format_round_trip(packed in arb_packed()) {
            let value = Numeric::from_packed_int(packed).unwrap();
            let text = value.to_string();
            prop_assert_eq!(Numeric::from_string(&text).unwrap(), value);
            // canonical output shape
            prop_assert!(!text.starts_with('+'));
            if packed == 0 {
                prop_assert_eq!(text.as_str(), "0");
            }
            prop_assert!(!text.ends_with('.'));
            if text.contains('.') {
                prop_assert!(!text.ends_with('0'));
            }
        }

        #[test]
        fn prop_serialize_round_trip(packed in arb_packed()) {
            let value = Numeric::from_packed_int(packed).unwrap();
            let bytes = value.serialize_to_bytes();
            let back = Numeric::deserialize_from_bytes(&bytes).unwrap();
            prop_assert_eq!(back, value);
            // the canonical form re-serializes byte-identically
            prop_assert_eq!(back.serialize_to_bytes(), bytes);
        }

        #[test]
        fn prop_add_sub_identity(a in arb_packed(), b in arb_packed()) {
            let a = Numeric::from_packed_int(a).unwrap();
            let b = Numeric::from_packed_int(b).unwrap();
            if let Some(sum) = a.checked_add(b) {
                prop_assert_eq!(sum.checked_sub(b), Some(a));
            }
        }

        #[test]
        fn prop_mul_div_reciprocity(a in -1_000_000_000i64..1_000_000_000i64, b in 1i64..1_000_000i64) {
            // exact products: integers well inside the range
            let a = Numeric::from(a);
            let b = Numeric::from(b);
            let product = a.checked_mul(b).unwrap();
            prop_assert_eq!(product.checked_div(b), Some(a));
        }

        #[test]
        fn prop_to_double_from_double(v in -1.0e28f64..1.0e28f64) {
            let value = Numeric::from_double(v).unwrap();
            let diff = (value.to_double() - v).abs();
            // one scaled unit plus double rounding slack
            prop_assert!(diff <= v.abs() * 1e-15 + 1e-9);
        }
    }
}
