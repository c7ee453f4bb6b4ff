//! Decimal text handling shared by both value types: E-notation splitting,
//! exponent parsing, the significand pipeline, and decimal-point insertion
//! for the formatter.

use crate::fixed_uint::{FixedUint, POWERS_OF_TEN, POW_10_19};

/// A decimal literal split into its syntactic pieces. The slices borrow from
/// the input and still need digit validation.
#[derive(Default)]
pub(crate) struct ENotationParts<'a> {
    pub negative: bool,
    pub int_part: &'a [u8],
    pub fract_part: &'a [u8],
    pub exp_part: &'a [u8],
}

/// Splits `[ws] [+-]? int ( '.' fract )? ( [eE] exp )? [ws]` into parts.
/// Returns `None` for empty input or an empty exponent after `e`.
pub(crate) fn split_e_notation_parts(input: &[u8]) -> Option<ENotationParts<'_>> {
    let mut start = 0;
    let mut end = input.len();
    while start < end && input[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && input[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    if start == end {
        return None;
    }

    let negative = input[start] == b'-';
    if negative || input[start] == b'+' {
        start += 1;
    }

    let mut exp_part: &[u8] = &[];
    for i in (start..end).rev() {
        if input[i] == b'e' || input[i] == b'E' {
            exp_part = &input[i + 1..end];
            if exp_part.is_empty() {
                return None;
            }
            end = i;
            break;
        }
    }

    let significand = &input[start..end];
    let (int_part, fract_part) = match significand.iter().position(|&c| c == b'.') {
        Some(dot) => (&significand[..dot], &significand[dot + 1..]),
        None => (significand, &[][..]),
    };
    Some(ENotationParts {
        negative,
        int_part,
        fract_part,
        exp_part,
    })
}

/// Parses the exponent and adds `extra_scale` (the type's fractional-digit
/// count), yielding the power of ten the significand is multiplied by.
///
/// A syntactically valid negative exponent below `i64::MIN` saturates to
/// `i64::MIN`; the value will round to zero downstream.
pub(crate) fn parse_exponent(exp_part: &[u8], extra_scale: u32) -> Option<i64> {
    let mut exp = extra_scale as i64;
    if !exp_part.is_empty() {
        match parse_i64(exp_part) {
            Some(literal) => exp = literal.checked_add(exp)?,
            None => {
                if exp_part.len() > 1
                    && exp_part[0] == b'-'
                    && exp_part[1..].iter().all(u8::is_ascii_digit)
                {
                    exp = i64::MIN;
                } else {
                    return None;
                }
            }
        }
    }
    Some(exp)
}

/// Strict signed 64-bit parse: `[+-]? digits`, no other bytes, overflow is an
/// error. Accumulates negated so `i64::MIN` itself parses.
fn parse_i64(input: &[u8]) -> Option<i64> {
    let (negative, digits) = match input.first()? {
        b'-' => (true, &input[1..]),
        b'+' => (false, &input[1..]),
        _ => (false, input),
    };
    if digits.is_empty() {
        return None;
    }
    let mut value: i64 = 0;
    for &c in digits {
        if !c.is_ascii_digit() {
            return None;
        }
        value = value
            .checked_mul(10)?
            .checked_sub((c - b'0') as i64)?;
    }
    if negative {
        Some(value)
    } else {
        value.checked_neg()
    }
}

/// Builds the unsigned scaled significand of `int_part.fract_part * 10^exp`.
///
/// With `exp >= 0`, up to `exp` fractional digits are promoted into the
/// integer part and the rest of the scaling is a multiply. With `exp < 0`,
/// only the first `len(int_part) + exp` digits survive. The first discarded
/// digit sets the round-up flag. In strict mode every other discarded digit
/// must be `'0'`; otherwise it only has to be a digit.
pub(crate) fn parse_number<const N: usize>(
    int_part: &[u8],
    fract_part: &[u8],
    exp: i64,
    strict: bool,
) -> Option<FixedUint<N>> {
    let mut int_part = int_part;
    let mut fract_part = fract_part;
    let mut output = FixedUint::<N>::ZERO;
    let mut round_up = false;

    if exp >= 0 {
        let mut num_promoted = fract_part.len();
        if (exp as u64) < fract_part.len() as u64 {
            round_up = fract_part[exp as usize] >= b'5';
            num_promoted = exp as usize;
        }
        let promoted = &fract_part[..num_promoted];
        fract_part = &fract_part[num_promoted..];
        if int_part.is_empty() {
            output = FixedUint::parse_from_string_strict(promoted)?;
        } else {
            output = FixedUint::parse_from_string_segments(int_part, &[promoted])?;
            int_part = &[];
        }

        // Zero stays zero no matter the exponent; skipping the scaling loop
        // keeps absurd exponents like 0e1000000000000 from spinning.
        if !output.is_zero() {
            let mut extra_exp = exp as u64 - num_promoted as u64;
            while extra_exp >= 19 {
                output = output.checked_mul_u64(POW_10_19)?;
                extra_exp -= 19;
            }
            if extra_exp != 0 {
                output = output.checked_mul_u64(POWERS_OF_TEN[extra_exp as usize])?;
            }
        }
    } else {
        if int_part.len() + fract_part.len() == 0 {
            return None;
        }
        if exp >= -(int_part.len() as i64) {
            let int_digits = (int_part.len() as i64 + exp) as usize;
            round_up = int_part[int_digits] >= b'5';
            if int_digits != 0 {
                output = FixedUint::parse_from_string_strict(&int_part[..int_digits])?;
            }
            int_part = &int_part[int_digits..];
        }
    }

    // Whatever remains in int_part and fract_part is being discarded.
    if strict {
        if int_part.iter().chain(fract_part).any(|&c| c != b'0') {
            return None;
        }
    } else if int_part
        .iter()
        .chain(fract_part)
        .any(|c| !c.is_ascii_digit())
    {
        return None;
    }

    if round_up {
        output = output.checked_add_u64(1)?;
    }
    Some(output)
}

/// Inserts the decimal point `scale` digits from the right of the digits that
/// start at `first_digit_index`, padding with leading zeros for values below
/// one and truncating trailing fractional zeros. The digits (and any sign)
/// must already be in `output`, and the value must be nonzero.
pub(crate) fn add_decimal_point_and_adjust_zeros(
    first_digit_index: usize,
    scale: usize,
    output: &mut String,
) {
    let string_length = output.len();
    let digits = &output.as_bytes()[first_digit_index..];
    let num_digits = digits.len();
    let last_non_zero = digits
        .iter()
        .rposition(|&c| c != b'0')
        .unwrap_or(num_digits - 1);
    let zeros_to_truncate = (num_digits - last_non_zero - 1).min(scale);
    output.truncate(string_length - zeros_to_truncate);
    if num_digits < scale + 1 {
        // Value is below one: prefix "0." and the missing zeros.
        let mut prefix = String::with_capacity(scale + 2 - num_digits);
        prefix.push_str("0.");
        for _ in 0..scale - num_digits {
            prefix.push('0');
        }
        output.insert_str(first_digit_index, &prefix);
    } else if zeros_to_truncate < scale {
        output.insert(string_length - scale, '.');
    }
}
