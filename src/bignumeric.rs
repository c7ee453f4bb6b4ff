use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::fixed_int::FixedInt;
use crate::fixed_uint::{extend_and_multiply, FixedUint, POW_10_19};
use crate::numeric::{decompose_double, format_double};
use crate::parse::{
    add_decimal_point_and_adjust_zeros, parse_exponent, parse_number, split_e_notation_parts,
};
use crate::NumericError;

/// Exact decimal with up to 38 integer digits and exactly 38 fractional
/// digits, stored as a signed 256-bit integer scaled by 10^38.
///
/// Range: the full signed 256-bit range of the scaled value, roughly
/// ±5.78960446186580977e38.
/// Precision: 10^-38
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct BigNumeric {
    value: FixedInt<4>,
}

// ============================================================================
// Constants
// ============================================================================

/// 10^38, the number of scaled units per 1.
const SCALE: u128 = 100_000_000_000_000_000_000_000_000_000_000_000_000;

/// 10^76, the scale of "double-scaled" power intermediates.
#[inline(always)]
fn scale_square() -> FixedUint<4> {
    FixedUint::power_of_ten(76)
}

/// 10^114, the scale of "triple-scaled" power intermediates.
#[inline(always)]
fn scale_cube() -> FixedUint<6> {
    FixedUint::power_of_ten(114)
}

impl BigNumeric {
    /// The number of fractional decimal digits.
    pub const FRACTIONAL_DIGITS: i64 = 38;

    /// The number of integer decimal digits.
    pub const INTEGER_DIGITS: i64 = 38;

    /// The scaling factor: one equals this many scaled units.
    pub const SCALING_FACTOR: u128 = SCALE;

    /// Zero.
    pub const ZERO: Self = Self {
        value: FixedInt::ZERO,
    };

    /// One (1.0).
    pub const ONE: Self = Self {
        value: FixedInt::from_i128(SCALE as i128),
    };

    /// Maximum value: (2^255 - 1) / 10^38.
    pub const MAX: Self = Self {
        value: FixedInt::MAX,
    };

    /// Minimum value: -2^255 / 10^38.
    pub const MIN: Self = Self {
        value: FixedInt::MIN,
    };
}

// ============================================================================
// Constructors and Packed Access
// ============================================================================

impl BigNumeric {
    /// Creates a value from its scaled integer representation. Every 256-bit
    /// pattern is a valid value.
    #[inline(always)]
    pub const fn from_packed_int(value: FixedInt<4>) -> Self {
        Self { value }
    }

    /// Returns the scaled integer representation.
    #[inline(always)]
    pub const fn as_packed_int(self) -> FixedInt<4> {
        self.value
    }

    /// Narrows an unsigned magnitude and applies a sign, rejecting
    /// out-of-range magnitudes.
    fn from_fixed_uint<const W: usize>(
        magnitude: &FixedUint<W>,
        negate: bool,
    ) -> crate::Result<Self> {
        if magnitude.non_zero_length() <= 4 {
            if let Some(value) = FixedInt::set_sign_and_abs(negate, magnitude.truncate::<4>()) {
                return Ok(Self { value });
            }
        }
        Err(NumericError::Overflow("BigNumeric overflow".to_string()))
    }

    /// Returns `true` if `self` is negative.
    #[inline(always)]
    pub const fn is_negative(self) -> bool {
        self.value.is_negative()
    }

    /// Returns `true` if `self` is zero.
    #[inline(always)]
    pub fn is_zero(self) -> bool {
        self.value.is_zero()
    }

    /// Returns the sign of `self` as -1, 0, or 1.
    #[inline(always)]
    pub fn signum(self) -> i32 {
        if self.value.is_negative() {
            -1
        } else if self.value.is_zero() {
            0
        } else {
            1
        }
    }
}

// ============================================================================
// String Parsing
// ============================================================================

impl BigNumeric {
    /// Parses a decimal string, rounding inputs with more than 38 fractional
    /// digits half away from zero.
    pub fn from_string(input: &str) -> crate::Result<Self> {
        Self::from_string_internal(input, false)
    }

    /// Parses a decimal string, rejecting inputs that do not represent a
    /// whole number of 10^-38 units.
    pub fn from_string_strict(input: &str) -> crate::Result<Self> {
        Self::from_string_internal(input, true)
    }

    fn from_string_internal(input: &str, strict: bool) -> crate::Result<Self> {
        let invalid =
            || NumericError::InvalidValue(format!("Invalid BIGNUMERIC value: {}", input));
        let parts = split_e_notation_parts(input.as_bytes()).ok_or_else(invalid)?;
        let exp = parse_exponent(parts.exp_part, Self::FRACTIONAL_DIGITS as u32)
            .ok_or_else(invalid)?;
        let magnitude: FixedUint<4> =
            parse_number(parts.int_part, parts.fract_part, exp, strict).ok_or_else(invalid)?;
        let value =
            FixedInt::set_sign_and_abs(parts.negative, magnitude).ok_or_else(invalid)?;
        Ok(Self { value })
    }
}

// ============================================================================
// String Formatting
// ============================================================================

impl BigNumeric {
    /// Appends the decimal representation: shortest form, no trailing
    /// fractional zeros, plain `0` for zero.
    pub fn append_to_string(self, output: &mut String) {
        if self.value.is_zero() {
            output.push('0');
            return;
        }
        let old_size = output.len();
        self.value.append_to_string(output);
        let first_digit_index = old_size + self.value.is_negative() as usize;
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

impl BigNumeric {
    /// Checked addition. Returns `None` on signed 256-bit overflow.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.value.checked_add(&rhs.value).map(|value| Self { value })
    }

    /// Checked addition. Returns an error naming the operands on overflow.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_add(self, rhs: Self) -> crate::Result<Self> {
        self.checked_add(rhs).ok_or_else(|| {
            NumericError::Overflow(format!("BigNumeric overflow: {} + {}", self, rhs))
        })
    }

    /// Checked subtraction. Returns `None` on signed 256-bit overflow.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        self.value.checked_sub(&rhs.value).map(|value| Self { value })
    }

    /// Checked subtraction. Returns an error naming the operands on overflow.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_sub(self, rhs: Self) -> crate::Result<Self> {
        self.checked_sub(rhs).ok_or_else(|| {
            NumericError::Overflow(format!("BigNumeric overflow: {} - {}", self, rhs))
        })
    }
}

// ============================================================================
// Multiplication
// ============================================================================

/// Divides a 384-bit product by 10^38 with half-away-from-zero rounding,
/// narrowing to five words. Returns `None` if the halfway bias carries out.
fn remove_scaling_factor(value: FixedUint<6>) -> Option<FixedUint<5>> {
    let (with_half, carry) = value.overflowing_add(&FixedUint::from_u128(SCALE / 2));
    if carry {
        return None;
    }
    let (q, _) = with_half.div_mod_u64(POW_10_19);
    let (q, _) = q.div_mod_u64(POW_10_19);
    // dividing 384 bits by 10^38 leaves at most 258 bits
    debug_assert!(q.words()[5] == 0);
    Some(q.truncate::<5>())
}

impl BigNumeric {
    /// Checked multiplication with half-away-from-zero rounding of the 39th
    /// fractional digit.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        let negative = self.value.is_negative() != rhs.value.is_negative();
        let product: FixedUint<8> = extend_and_multiply(&self.value.abs(), &rhs.value.abs());
        if product.words()[6] != 0 || product.words()[7] != 0 {
            return None;
        }
        let scaled = remove_scaling_factor(product.truncate::<6>())?;
        if scaled.words()[4] != 0 {
            return None;
        }
        FixedInt::set_sign_and_abs(negative, scaled.truncate::<4>()).map(|value| Self { value })
    }

    /// Checked multiplication. Returns an error naming the operands.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_mul(self, rhs: Self) -> crate::Result<Self> {
        self.checked_mul(rhs).ok_or_else(|| {
            NumericError::Overflow(format!("BigNumeric overflow: {} * {}", self, rhs))
        })
    }
}

// ============================================================================
// Division
// ============================================================================

impl BigNumeric {
    /// Checked division with half-away-from-zero rounding. Returns `None` on
    /// a zero divisor or an out-of-range quotient.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        if rhs.value.is_zero() {
            return None;
        }
        let negative = self.value.is_negative() != rhs.value.is_negative();
        let scaled: FixedUint<6> =
            extend_and_multiply(&self.value.abs(), &FixedUint::<2>::from_u128(SCALE));
        let divisor: FixedUint<6> = rhs.value.abs().extend();
        let quotient = scaled.div_and_round_away_from_zero(&divisor)?;
        if quotient.words()[4] != 0 || quotient.words()[5] != 0 {
            return None;
        }
        FixedInt::set_sign_and_abs(negative, quotient.truncate::<4>()).map(|value| Self { value })
    }

    /// Checked division. Distinguishes division by zero from overflow in the
    /// error message.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_div(self, rhs: Self) -> crate::Result<Self> {
        if rhs.value.is_zero() {
            return Err(NumericError::DivisionByZero(format!(
                "division by zero: {} / {}",
                self, rhs
            )));
        }
        self.checked_div(rhs).ok_or_else(|| {
            NumericError::Overflow(format!("BigNumeric overflow: {} / {}", self, rhs))
        })
    }

    /// Truncating integer division: the quotient with the fractional part
    /// discarded.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_integer_div(self, rhs: Self) -> crate::Result<Self> {
        if rhs.value.is_zero() {
            return Err(NumericError::DivisionByZero(format!(
                "division by zero: {} / {}",
                self, rhs
            )));
        }
        let negative = self.value.is_negative() != rhs.value.is_negative();
        let (quotient, _) = self
            .value
            .abs()
            .div_mod(&rhs.value.abs())
            .unwrap_or((FixedUint::ZERO, FixedUint::ZERO));
        let scaled: FixedUint<6> = extend_and_multiply(&quotient, &FixedUint::<2>::from_u128(SCALE));
        if scaled.words()[4] == 0 && scaled.words()[5] == 0 {
            if let Some(value) = FixedInt::set_sign_and_abs(negative, scaled.truncate::<4>()) {
                return Ok(Self { value });
            }
        }
        Err(NumericError::Overflow(format!(
            "BigNumeric overflow: {} / {}",
            self, rhs
        )))
    }

    /// Remainder of the scaled integers; keeps the dividend's sign.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_mod(self, rhs: Self) -> crate::Result<Self> {
        if rhs.value.is_zero() {
            return Err(NumericError::DivisionByZero(format!(
                "division by zero: {} / {}",
                self, rhs
            )));
        }
        let (_, remainder) = self
            .value
            .abs()
            .div_mod(&rhs.value.abs())
            .unwrap_or((FixedUint::ZERO, FixedUint::ZERO));
        // |remainder| < |rhs| <= 2^255, so the sign always fits.
        let value = FixedInt::set_sign_and_abs(self.value.is_negative(), remainder)
            .unwrap_or(FixedInt::ZERO);
        Ok(Self { value })
    }
}

// ============================================================================
// Sign Operations
// ============================================================================

impl BigNumeric {
    /// Checked absolute value. Returns `None` for `MIN`, whose magnitude has
    /// no positive representation.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_abs(self) -> Option<Self> {
        if self.value.is_negative() {
            self.checked_neg()
        } else {
            Some(self)
        }
    }

    /// Checked absolute value with an error naming the operand.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_abs(self) -> crate::Result<Self> {
        self.checked_abs()
            .ok_or_else(|| NumericError::Overflow(format!("BigNumeric overflow: ABS({})", self)))
    }

    /// Checked negation. Returns `None` for `MIN`.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_neg(self) -> Option<Self> {
        self.value.checked_neg().map(|value| Self { value })
    }

    /// Checked negation with an error naming the operand.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_neg(self) -> crate::Result<Self> {
        self.checked_neg()
            .ok_or_else(|| NumericError::Overflow(format!("BigNumeric overflow: -({})", self)))
    }

    /// The sign as a decimal value: -1, 0, or 1.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn sign(self) -> Self {
        Self::from(self.signum() as i64)
    }
}

// ============================================================================
// Rounding
// ============================================================================

impl BigNumeric {
    fn round_internal(self, digits: i64, round_away_from_zero: bool) -> Option<FixedInt<4>> {
        if digits >= Self::FRACTIONAL_DIGITS {
            return Some(self.value);
        }
        if digits < -Self::INTEGER_DIGITS {
            return Some(FixedInt::ZERO);
        }
        let factor: FixedUint<5> =
            FixedUint::power_of_ten((Self::FRACTIONAL_DIGITS - digits) as u32);
        // Work one word wider so the halfway bias cannot wrap.
        let mut value: FixedInt<5> = self.value.extend();
        if round_away_from_zero {
            let offset = FixedInt::from_bits(factor.shr(1));
            value = if value.is_negative() {
                value.wrapping_sub(&offset)
            } else {
                value.wrapping_add(&offset)
            };
        }
        let negative = value.is_negative();
        let (_, remainder) = value.abs().div_mod(&factor)?;
        let signed_remainder = FixedInt::set_sign_and_abs(negative, remainder)?;
        value.wrapping_sub(&signed_remainder).checked_narrow::<4>()
    }

    /// Rounds to `digits` fractional digits, halfway cases away from zero.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_round(self, digits: i64) -> crate::Result<Self> {
        self.round_internal(digits, true)
            .map(|value| Self { value })
            .ok_or_else(|| {
                NumericError::Overflow(format!(
                    "BigNumeric overflow: ROUND({}, {})",
                    self, digits
                ))
            })
    }

    /// Truncates toward zero at `digits` fractional digits. Never overflows.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn trunc(self, digits: i64) -> Self {
        let value = self.round_internal(digits, false).unwrap_or(FixedInt::ZERO);
        Self { value }
    }

    /// Rounds up to the nearest integer.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_ceil(self) -> crate::Result<Self> {
        self.ceiling_or_floor(true)
            .map(|value| Self { value })
            .ok_or_else(|| {
                NumericError::Overflow(format!("BigNumeric overflow: CEIL({})", self))
            })
    }

    /// Rounds down to the nearest integer.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_floor(self) -> crate::Result<Self> {
        self.ceiling_or_floor(false)
            .map(|value| Self { value })
            .ok_or_else(|| {
                NumericError::Overflow(format!("BigNumeric overflow: FLOOR({})", self))
            })
    }

    fn ceiling_or_floor(self, ceiling: bool) -> Option<FixedInt<4>> {
        let negative = self.value.is_negative();
        let (q1, r1) = self.value.abs().div_mod_u64(POW_10_19);
        let (_, r2) = q1.div_mod_u64(POW_10_19);
        let fract_magnitude = r1 as u128 + r2 as u128 * POW_10_19 as u128;
        let fract = if negative {
            -(fract_magnitude as i128)
        } else {
            fract_magnitude as i128
        };
        let adjustment = if ceiling {
            if fract > 0 {
                fract - SCALE as i128
            } else {
                fract
            }
        } else if fract < 0 {
            fract + SCALE as i128
        } else {
            fract
        };
        let value: FixedInt<5> = self.value.extend();
        value
            .wrapping_sub(&FixedInt::from_i128(adjustment))
            .checked_narrow::<4>()
    }
}

// ============================================================================
// Power
// ============================================================================

/// Divides a double-scaled square (scaled by 10^152) by 10^76 with rounding,
/// narrowing back to six words. Returns `None` if the quotient does not fit
/// six words; that is the power loop's overflow detection.
fn remove_double_scale<const N: usize>(input: FixedUint<N>) -> Option<FixedUint<6>> {
    let half: FixedUint<N> = scale_square().shr(1).extend();
    let (with_half, carry) = input.overflowing_add(&half);
    if carry {
        return None;
    }
    let (q, _) = with_half.div_mod_u64(POW_10_19);
    let (q, _) = q.div_mod_u64(POW_10_19);
    let (q, _) = q.div_mod_u64(POW_10_19);
    let (q, _) = q.div_mod_u64(POW_10_19);
    if q.words()[6..].iter().any(|&w| w != 0) {
        return None;
    }
    Some(q.truncate::<6>())
}

/// Raises a double-scaled value (scaled by 10^76) to `exp` by binary
/// exponentiation. Returns `false` if an intermediate overflows.
fn double_scaled_power(double_scaled_value: &mut FixedUint<6>, exp: FixedUint<4>) -> bool {
    let mut result: FixedUint<6> = scale_square().extend();
    let mut power = *double_scaled_value;
    let mut exp = exp;
    loop {
        if exp.low_u64() & 1 != 0 {
            let product: FixedUint<12> = extend_and_multiply(&result, &power);
            match remove_double_scale(product) {
                Some(r) => result = r,
                None => return false,
            }
        }
        if exp.non_zero_length() <= 1 && exp.low_u64() <= 1 {
            *double_scaled_value = result;
            return true;
        }
        // A power worth squaring again stays below sqrt of the value range,
        // which fits five words double-scaled.
        if power.words()[5] != 0 {
            return false;
        }
        let truncated = power.truncate::<5>();
        let squared: FixedUint<10> = extend_and_multiply(&truncated, &truncated);
        match remove_double_scale(squared) {
            Some(p) => power = p,
            None => return false,
        }
        exp = exp.shr(1);
    }
}

impl BigNumeric {
    /// Multiplies a double-scaled value by `pow(base, fract_exp / 10^38) *
    /// 10^38`, yielding a triple-scaled result. The fractional exponent goes
    /// through `f64::powf` with its precision.
    fn multiply_by_fractional_power(
        abs_value: &FixedUint<4>,
        fract_exp: i128,
        double_scaled: &FixedUint<6>,
    ) -> crate::Result<FixedUint<8>> {
        let base = Self::remove_scale_and_convert_to_double(false, *abs_value);
        let exponent = Self::remove_scale_and_convert_to_double(
            fract_exp < 0,
            FixedUint::from_u128(fract_exp.unsigned_abs()),
        );
        let fract_term = Self::from_double(base.powf(exponent))?;
        let product: FixedUint<10> = extend_and_multiply(double_scaled, &fract_term.value.abs());
        if product.words()[8] != 0 || product.words()[9] != 0 {
            return Err(NumericError::Overflow("BigNumeric overflow".to_string()));
        }
        Ok(product.truncate::<8>())
    }

    fn power_internal(self, exp: Self) -> crate::Result<Self> {
        // Any value raised to the zero power is one, including zero.
        if exp.value.is_zero() {
            return Ok(Self::ONE);
        }
        let exp_is_negative = exp.value.is_negative();
        if self.value.is_zero() {
            if exp_is_negative {
                return Err(NumericError::DivisionByZero("division by zero".to_string()));
            }
            return Ok(Self::ZERO);
        }

        let (q1, r1) = exp.value.abs().div_mod_u64(POW_10_19);
        let (abs_integer_exp, r2) = q1.div_mod_u64(POW_10_19);
        let abs_fract_exp = r1 as u128 + r2 as u128 * POW_10_19 as u128;
        let mut fract_exp = abs_fract_exp as i128;
        if exp_is_negative {
            fract_exp = -fract_exp;
        }

        let mut result_is_negative = false;
        let abs_value = self.value.abs();
        if self.value.is_negative() {
            if fract_exp != 0 {
                return Err(NumericError::NegativeToFractionalPower(
                    "Negative BIGNUMERIC value cannot be raised to a fractional power"
                        .to_string(),
                ));
            }
            result_is_negative = abs_integer_exp.low_u64() & 1 != 0;
        }

        let overflow = || NumericError::Overflow("BigNumeric overflow".to_string());
        let scale_words = FixedUint::<2>::from_u128(SCALE);
        let mut double_scaled_value: FixedUint<6>;
        if !exp_is_negative {
            double_scaled_value = extend_and_multiply(&abs_value, &scale_words);
        } else if abs_value > FixedUint::from_u128(SCALE) {
            // Negative exponent with |base| > 1: raise first, then invert
            // with a triple-scaled numerator to keep the division's
            // precision.
            double_scaled_value = extend_and_multiply(&abs_value, &scale_words);
            let limit = scale_cube().overflowing_mul_u64(2).0;
            if !double_scaled_power(&mut double_scaled_value, abs_integer_exp)
                || double_scaled_value > limit
            {
                // 1 / huge rounds to zero.
                return Ok(Self::ZERO);
            }
            if fract_exp == 0 {
                let numerator = scale_cube()
                    .div_and_round_away_from_zero(&double_scaled_value)
                    .ok_or_else(overflow)?;
                return Self::from_fixed_uint(&numerator, result_is_negative);
            }
            // fract_exp < 0 here, so pow(base, fract_exp) <= 1 and the
            // triple-scaled numerator cannot overflow.
            let numerator = Self::multiply_by_fractional_power(
                &abs_value,
                fract_exp,
                &scale_square().extend(),
            )?;
            let numerator = numerator
                .div_and_round_away_from_zero(&double_scaled_value.extend::<8>())
                .ok_or_else(overflow)?;
            return Self::from_fixed_uint(&numerator, result_is_negative);
        } else {
            // Negative exponent with |base| <= 1: invert the base first.
            double_scaled_value = scale_cube()
                .div_and_round_away_from_zero(&abs_value.extend())
                .ok_or_else(overflow)?;
        }

        if !double_scaled_power(&mut double_scaled_value, abs_integer_exp) {
            return Err(overflow());
        }

        if fract_exp == 0 {
            let single_scaled = double_scaled_value
                .div_and_round_away_from_zero(&scale_words.extend())
                .ok_or_else(overflow)?;
            return Self::from_fixed_uint(&single_scaled, result_is_negative);
        }

        let triple_scaled =
            Self::multiply_by_fractional_power(&abs_value, fract_exp, &double_scaled_value)?;
        // Remove two scale factors with rounding to get back to one.
        let half: FixedUint<8> = scale_square().shr(1).extend();
        let (with_half, carry) = triple_scaled.overflowing_add(&half);
        if carry {
            return Err(overflow());
        }
        let (q, _) = with_half.div_mod_u64(POW_10_19);
        let (q, _) = q.div_mod_u64(POW_10_19);
        let (q, _) = q.div_mod_u64(POW_10_19);
        let (q, _) = q.div_mod_u64(POW_10_19);
        Self::from_fixed_uint(&q, result_is_negative)
    }

    /// Raises `self` to `exp`, with the same contract as the NUMERIC power:
    /// `x^0 == 1`, `0^negative` errors, negative base with fractional
    /// exponent errors, and the fractional part goes through `f64::powf`.
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn try_power(self, exp: Self) -> crate::Result<Self> {
        self.power_internal(exp)
            .map_err(|e| e.with_context(&format!("POW({}, {})", self, exp)))
    }
}

// ============================================================================
// Double Conversion
// ============================================================================

impl BigNumeric {
    /// Computes `sign * abs / 10^38` as an `f64` with minimal precision loss.
    ///
    /// The scale's 5^38 factor is removed in three divisions interleaved with
    /// a left shift chosen from the value's width; every remainder is OR-ed
    /// into the low bit so the final conversion cannot misround a near-tie.
    /// The 2^38 factor folds into the power-of-two scaling, which is exact.
    fn remove_scale_and_convert_to_double(negative: bool, abs: FixedUint<4>) -> f64 {
        if abs.is_zero() {
            return 0.0;
        }
        const POW_5_13: u32 = 1_220_703_125;
        const POW_5_12: u32 = 244_140_625;
        let num_32bit_words = (abs.bit_length() + 31) / 32;
        let mut shifted = abs;
        let binary_scaling_factor: f64 = match num_32bit_words {
            1 => {
                shifted = shifted.shl(144);
                (1u128 << 100) as f64 * (1u128 << 82) as f64
            }
            2 => {
                shifted = shifted.shl(112);
                (1u128 << 100) as f64 * (1u128 << 50) as f64
            }
            3 => {
                shifted = shifted.shl(80);
                (1u128 << 118) as f64
            }
            4 => {
                shifted = shifted.shl(48);
                (1u128 << 86) as f64
            }
            5 => {
                shifted = shifted.shl(16);
                (1u128 << 54) as f64
            }
            _ => (1u128 << 38) as f64,
        };
        let (q, r1) = shifted.div_mod_u32(POW_5_13);
        let (q, r2) = q.div_mod_u32(POW_5_13);
        let (q, r3) = q.div_mod_u32(POW_5_12);
        let mut words = *q.words();
        words[0] |= ((r1 | r2 | r3) != 0) as u64;
        let result = FixedUint::<4>::from_words(words).to_f64() / binary_scaling_factor;
        if negative {
            -result
        } else {
            result
        }
    }

    /// Converts to the nearest `f64`.
    pub fn to_double(self) -> f64 {
        Self::remove_scale_and_convert_to_double(self.value.is_negative(), self.value.abs())
    }

    /// Converts from an `f64`, rounding the 39th fractional digit away from
    /// zero. NaN and infinities are rejected.
    pub fn from_double(value: f64) -> crate::Result<Self> {
        if !value.is_finite() {
            return Err(NumericError::NonFiniteConversion(format!(
                "Illegal conversion of non-finite floating point number to BigNumeric: {}",
                format_double(value)
            )));
        }
        scale_and_round_away_from_zero(value)
            .map(|value| Self { value })
            .ok_or_else(|| {
                NumericError::OutOfRange(format!(
                    "BigNumeric out of range: {}",
                    format_double(value)
                ))
            })
    }
}

/// Multiplies a double by 10^38 and rounds away from zero into a signed
/// 256-bit integer. Returns `None` when the scaled magnitude does not fit.
fn scale_and_round_away_from_zero(value: f64) -> Option<FixedInt<4>> {
    if value == 0.0 {
        return Some(FixedInt::ZERO);
    }
    let (mantissa, exponent) = decompose_double(value);
    if exponent <= -256 {
        return Some(FixedInt::ZERO);
    }
    if exponent >= 255 {
        return None;
    }
    let negative = mantissa < 0;
    let mantissa_words = FixedUint::<2>::from_u128(mantissa.unsigned_abs() as u128);
    let mut abs_result: FixedUint<4> =
        extend_and_multiply(&mantissa_words, &FixedUint::<2>::from_u128(SCALE));
    if exponent < 0 {
        // Stop the right shift one bit early, add one into the bit about to
        // go, and finish: round away from zero.
        abs_result = abs_result.shr((-1 - exponent) as u32);
        abs_result = abs_result.overflowing_add_u64(1).0;
        abs_result = abs_result.shr(1);
    } else if exponent > 0 {
        let msb_idx = abs_result.find_msb_set_nonzero();
        if msb_idx >= 255 - exponent as u32 {
            return None;
        }
        abs_result = abs_result.shl(exponent as u32);
    }
    // mantissa (53 bits) times scale (127 bits) stays under 191 bits at
    // exponent zero, so the magnitude is always in range here.
    FixedInt::set_sign_and_abs(negative, abs_result)
}

// ============================================================================
// Byte Serialization
// ============================================================================

impl BigNumeric {
    /// Appends the minimum-length little-endian two's-complement encoding of
    /// the scaled integer. Zero is a single `0x00` byte.
    pub fn serialize_and_append_to_bytes(self, output: &mut Vec<u8>) {
        self.value.serialize_to_bytes(output);
    }

    /// Returns the serialized byte encoding.
    pub fn serialize_to_bytes(self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32);
        self.serialize_and_append_to_bytes(&mut bytes);
        bytes
    }

    /// Parses the byte encoding produced by [`Self::serialize_to_bytes`].
    /// The empty byte string is invalid.
    pub fn deserialize_from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        FixedInt::deserialize_from_bytes(bytes)
            .map(|value| Self { value })
            .ok_or_else(|| {
                NumericError::InvalidEncoding("Invalid BigNumeric encoding".to_string())
            })
    }
}

// ============================================================================
// Operator Overloading
// ============================================================================

impl Add for BigNumeric {
    type Output = Self;

    #[inline(always)]
    fn add(self, rhs: Self) -> Self::Output {
        self.checked_add(rhs).expect("attempt to add with overflow")
    }
}

impl Sub for BigNumeric {
    type Output = Self;

    #[inline(always)]
    fn sub(self, rhs: Self) -> Self::Output {
        self.checked_sub(rhs)
            .expect("attempt to subtract with overflow")
    }
}

impl Mul for BigNumeric {
    type Output = Self;

    #[inline(always)]
    fn mul(self, rhs: Self) -> Self::Output {
        self.checked_mul(rhs)
            .expect("attempt to multiply with overflow")
    }
}

impl Div for BigNumeric {
    type Output = Self;

    #[inline(always)]
    fn div(self, rhs: Self) -> Self::Output {
        self.checked_div(rhs)
            .expect("attempt to divide by zero or overflow")
    }
}

impl Neg for BigNumeric {
    type Output = Self;

    #[inline(always)]
    fn neg(self) -> Self::Output {
        self.checked_neg().expect("attempt to negate with overflow")
    }
}

impl AddAssign for BigNumeric {
    #[inline(always)]
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl SubAssign for BigNumeric {
    #[inline(always)]
    fn sub_assign(&mut self, rhs: Self) {
        *self = *self - rhs;
    }
}

impl MulAssign for BigNumeric {
    #[inline(always)]
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl DivAssign for BigNumeric {
    #[inline(always)]
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl Sum for BigNumeric {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, |acc, x| acc + x)
    }
}

// ============================================================================
// Standard Library Trait Implementations
// ============================================================================

macro_rules! impl_from_integer {
    ($($t:ty),*) => {$(
        impl From<$t> for BigNumeric {
            #[inline]
            fn from(value: $t) -> Self {
                // |i128| * 10^38 < 1.8e76 < 2^255: always in range.
                let value = FixedInt::<4>::from_i128(value as i128)
                    .mul_u64(POW_10_19)
                    .mul_u64(POW_10_19);
                Self { value }
            }
        }
    )*};
}

impl_from_integer!(i8, i16, i32, i64, i128, u8, u16, u32, u64);

impl TryFrom<f64> for BigNumeric {
    type Error = NumericError;

    #[inline(always)]
    fn try_from(value: f64) -> crate::Result<Self> {
        Self::from_double(value)
    }
}

impl FromStr for BigNumeric {
    type Err = NumericError;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::from_string(s)
    }
}

impl fmt::Display for BigNumeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::with_capacity(80);
        self.append_to_string(&mut out);
        f.write_str(&out)
    }
}

impl fmt::Debug for BigNumeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            f.debug_struct("BigNumeric").field("value", &self.value).finish()
        } else {
            write!(f, "BigNumeric({})", self)
        }
    }
}

// ============================================================================
// Serde Support
// ============================================================================

#[cfg(feature = "serde")]
impl Serialize for BigNumeric {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            serializer.collect_str(self)
        } else {
            self.value.words().serialize(serializer)
        }
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for BigNumeric {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            Self::from_string(&s).map_err(de::Error::custom)
        } else {
            let words = <[u64; 4]>::deserialize(deserializer)?;
            Ok(Self {
                value: FixedInt::from_words(words),
            })
        }
    }
}
