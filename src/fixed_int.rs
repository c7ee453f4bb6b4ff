use std::cmp::Ordering;

use crate::fixed_uint::{mul_words_into, FixedUint};

/// Signed fixed-width integer of `N` little-endian 64-bit words, stored in
/// two's complement. Layers sign handling over [`FixedUint`].
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FixedInt<const N: usize> {
    words: [u64; N],
}

// ============================================================================
// Constants, Constructors and Raw Access
// ============================================================================

impl<const N: usize> FixedInt<N> {
    /// Zero.
    pub const ZERO: Self = Self { words: [0; N] };

    /// The largest representable value, 2^(64N - 1) - 1.
    pub const MAX: Self = {
        let mut words = [u64::MAX; N];
        words[N - 1] = u64::MAX >> 1;
        Self { words }
    };

    /// The smallest representable value, -2^(64N - 1).
    pub const MIN: Self = {
        let mut words = [0; N];
        words[N - 1] = 1 << 63;
        Self { words }
    };

    /// Creates a value directly from its little-endian two's-complement words.
    #[inline(always)]
    pub const fn from_words(words: [u64; N]) -> Self {
        Self { words }
    }

    /// Creates a value by sign-extending an `i128`.
    ///
    /// For `N == 1` the value must fit in 64 bits.
    #[inline(always)]
    pub const fn from_i128(value: i128) -> Self {
        let fill = if value < 0 { u64::MAX } else { 0 };
        let mut words = [fill; N];
        words[0] = value as u64;
        if N > 1 {
            words[1] = (value >> 64) as u64;
        } else {
            debug_assert!(value >> 63 == 0 || value >> 63 == -1);
        }
        Self { words }
    }

    /// Narrows to an `i128`. Returns `None` if the value does not fit.
    #[inline]
    pub fn to_i128(&self) -> Option<i128> {
        let value = self.words[0] as u128 | (self.words[1] as u128) << 64;
        let value = value as i128;
        let fill = if value < 0 { u64::MAX } else { 0 };
        if self.words[2..].iter().any(|&w| w != fill) {
            return None;
        }
        Some(value)
    }

    /// Returns the little-endian two's-complement words.
    #[inline(always)]
    pub const fn words(&self) -> &[u64; N] {
        &self.words
    }

    /// Reinterprets the bits as unsigned.
    #[inline(always)]
    pub const fn to_bits(&self) -> FixedUint<N> {
        FixedUint::from_words(self.words)
    }

    /// Reinterprets unsigned bits as a two's-complement value.
    #[inline(always)]
    pub const fn from_bits(bits: FixedUint<N>) -> Self {
        Self {
            words: *bits.words(),
        }
    }

    /// Returns `true` if the sign bit is set.
    #[inline(always)]
    pub const fn is_negative(&self) -> bool {
        self.words[N - 1] >> 63 != 0
    }

    /// Returns `true` if the value is zero.
    #[inline(always)]
    pub fn is_zero(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Sign-extends into a wider value. `M` must be at least `N`.
    #[inline(always)]
    pub fn extend<const M: usize>(&self) -> FixedInt<M> {
        debug_assert!(M >= N);
        let fill = if self.is_negative() { u64::MAX } else { 0 };
        let mut words = [fill; M];
        words[..N].copy_from_slice(&self.words);
        FixedInt { words }
    }

    /// Narrows to `M` words. Returns `None` if the value does not survive
    /// sign extension back to `N` words.
    #[inline]
    pub fn checked_narrow<const M: usize>(&self) -> Option<FixedInt<M>> {
        debug_assert!(M <= N);
        let mut words = [0; M];
        words.copy_from_slice(&self.words[..M]);
        let out = FixedInt { words };
        let fill = if out.is_negative() { u64::MAX } else { 0 };
        if self.words[M..].iter().any(|&w| w != fill) {
            return None;
        }
        Some(out)
    }
}

// ============================================================================
// Sign Operations
// ============================================================================

impl<const N: usize> FixedInt<N> {
    /// Absolute value as an unsigned integer of the same width.
    /// `abs(MIN)` is exactly `|MIN|`, which fits in the unsigned type.
    #[inline]
    pub fn abs(&self) -> FixedUint<N> {
        if self.is_negative() {
            negate_words(self.words)
        } else {
            FixedUint::from_words(self.words)
        }
    }

    /// Two's-complement negation; `MIN` maps to itself.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn wrapping_neg(self) -> Self {
        Self {
            words: *negate_words(self.words).words(),
        }
    }

    /// Checked negation. Returns `None` for `MIN`.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_neg(self) -> Option<Self> {
        if self == Self::MIN {
            None
        } else {
            Some(self.wrapping_neg())
        }
    }

    /// Builds a value from a sign and a magnitude. Fails if the magnitude
    /// exceeds the signed range; the single exception is
    /// `negative && magnitude == 2^(64N - 1)`, which is `MIN`.
    pub fn set_sign_and_abs(negative: bool, magnitude: FixedUint<N>) -> Option<Self> {
        let words = *magnitude.words();
        let high_bit_set = words[N - 1] >> 63 != 0;
        if !negative {
            if high_bit_set {
                return None;
            }
            return Some(Self { words });
        }
        if high_bit_set {
            // Only |MIN| survives negation.
            let is_min_magnitude = words[N - 1] == 1 << 63 && words[..N - 1].iter().all(|&w| w == 0);
            if !is_min_magnitude {
                return None;
            }
            return Some(Self { words });
        }
        Some(Self {
            words: *negate_words(words).words(),
        })
    }
}

/// Two's-complement negation of a word array.
fn negate_words<const N: usize>(words: [u64; N]) -> FixedUint<N> {
    let mut out = [0; N];
    let mut carry = true;
    for i in 0..N {
        let (w, c) = (!words[i]).overflowing_add(carry as u64);
        out[i] = w;
        carry = c;
    }
    FixedUint::from_words(out)
}

// ============================================================================
// Arithmetic
// ============================================================================

impl<const N: usize> FixedInt<N> {
    /// Word-wise addition. The flag is true iff the mathematical sum does not
    /// fit: the inputs share a sign and the result's sign differs.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn overflowing_add(self, rhs: &Self) -> (Self, bool) {
        let negative = self.is_negative();
        let rhs_negative = rhs.is_negative();
        let (bits, _) = self.to_bits().overflowing_add(&rhs.to_bits());
        let sum = Self::from_bits(bits);
        let overflow = negative == rhs_negative && sum.is_negative() != negative;
        (sum, overflow)
    }

    /// Checked addition.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_add(self, rhs: &Self) -> Option<Self> {
        match self.overflowing_add(rhs) {
            (sum, false) => Some(sum),
            (_, true) => None,
        }
    }

    /// Wrapping addition, for accumulators whose width rules out overflow.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn wrapping_add(self, rhs: &Self) -> Self {
        self.overflowing_add(rhs).0
    }

    /// Word-wise subtraction with signed overflow detection.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn overflowing_sub(self, rhs: &Self) -> (Self, bool) {
        let negative = self.is_negative();
        let rhs_negative = rhs.is_negative();
        let (bits, _) = self.to_bits().overflowing_sub(&rhs.to_bits());
        let diff = Self::from_bits(bits);
        let overflow = negative != rhs_negative && diff.is_negative() != negative;
        (diff, overflow)
    }

    /// Checked subtraction.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn checked_sub(self, rhs: &Self) -> Option<Self> {
        match self.overflowing_sub(rhs) {
            (diff, false) => Some(diff),
            (_, true) => None,
        }
    }

    /// Wrapping subtraction, for accumulators whose width rules out overflow.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn wrapping_sub(self, rhs: &Self) -> Self {
        self.overflowing_sub(rhs).0
    }

    /// Multiplies by an unsigned word. The caller must pick a width the
    /// product fits; this is asserted in debug builds.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn mul_u64(self, rhs: u64) -> Self {
        let negative = self.is_negative();
        let (magnitude, overflow) = self.abs().overflowing_mul_u64(rhs);
        let out = Self::set_sign_and_abs(negative, magnitude);
        debug_assert!(!overflow && out.is_some());
        out.unwrap_or(Self::ZERO)
    }

    /// Computes `self / divisor` rounding halfway cases away from zero.
    #[inline]
    #[must_use = "this returns the result of the operation, without modifying the original"]
    pub fn div_and_round_away_from_zero_u64(self, divisor: u64) -> Self {
        let negative = self.is_negative();
        let magnitude = self.abs().div_and_round_away_from_zero_u64(divisor);
        // |q| <= |self|, so the sign always fits.
        Self::set_sign_and_abs(negative, magnitude).unwrap_or(Self::ZERO)
    }
}

/// Widens the product of two signed values into `SUM = N1 + N2` words. The
/// magnitude product is at most 2^(64·SUM - 2), so the result always fits.
#[inline]
pub fn extend_and_multiply<const N1: usize, const N2: usize, const SUM: usize>(
    lhs: &FixedInt<N1>,
    rhs: &FixedInt<N2>,
) -> FixedInt<SUM> {
    debug_assert!(N1 + N2 == SUM);
    let negative = lhs.is_negative() != rhs.is_negative();
    let mut words = [0u64; SUM];
    mul_words_into(lhs.abs().words(), rhs.abs().words(), &mut words);
    if negative {
        FixedInt::from_bits(negate_words(words))
    } else {
        FixedInt::from_words(words)
    }
}

// ============================================================================
// Decimal Conversion
// ============================================================================

impl<const N: usize> FixedInt<N> {
    /// Appends the shortest decimal representation, with a leading `-` for
    /// negative values.
    pub fn append_to_string(&self, output: &mut String) {
        if self.is_negative() {
            output.push('-');
        }
        self.abs().append_to_string(output);
    }
}

// ============================================================================
// Byte Serialization
// ============================================================================

impl<const N: usize> FixedInt<N> {
    /// Appends the minimum-length little-endian two's-complement encoding:
    /// the shortest byte prefix whose top byte's high bit still encodes the
    /// sign, so that sign extension recovers the value. Zero is one `0x00`
    /// byte; `+128` is `[0x80, 0x00]`; `-1` is `[0xFF]`.
    pub fn serialize_to_bytes(&self, output: &mut Vec<u8>) {
        let bytes = self.to_bits().to_le_byte_array();
        let extension = if self.is_negative() { 0xFF } else { 0x00 };
        let mut len = 8 * N;
        while len > 1 && bytes[len - 1] == extension && bytes[len - 2] & 0x80 == extension & 0x80 {
            len -= 1;
        }
        output.extend_from_slice(&bytes[..len]);
    }

    /// Parses a little-endian two's-complement encoding, sign-extending to
    /// `N` words. Fails on empty input and on values that do not fit.
    pub fn deserialize_from_bytes(bytes: &[u8]) -> Option<Self> {
        let &last = bytes.last()?;
        let negative = last & 0x80 != 0;
        let extension = if negative { 0xFF } else { 0x00 };
        let capacity = 8 * N;
        if bytes.len() > capacity {
            // Bytes past the width must be pure sign extension of a value
            // whose own top bit already matches.
            if bytes[capacity..].iter().any(|&b| b != extension)
                || (bytes[capacity - 1] & 0x80 != 0) != negative
            {
                return None;
            }
        }
        let fill = if negative { u64::MAX } else { 0 };
        let mut words = [fill; N];
        for (i, &b) in bytes.iter().take(capacity).enumerate() {
            let word = &mut words[i / 8];
            *word &= !(0xFFu64 << (i % 8 * 8));
            *word |= (b as u64) << (i % 8 * 8);
        }
        Some(Self { words })
    }
}

// ============================================================================
// Float Conversion
// ============================================================================

impl<const N: usize> FixedInt<N> {
    /// Converts to `f64` via the unsigned magnitude.
    pub fn to_f64(&self) -> f64 {
        let magnitude = self.abs().to_f64();
        if self.is_negative() {
            -magnitude
        } else {
            magnitude
        }
    }
}

// ============================================================================
// Comparison
// ============================================================================

impl<const N: usize> Ord for FixedInt<N> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Flip the sign bit of the top word, then compare as unsigned.
        let lhs_top = self.words[N - 1] ^ 1 << 63;
        let rhs_top = other.words[N - 1] ^ 1 << 63;
        match lhs_top.cmp(&rhs_top) {
            Ordering::Equal => {}
            ord => return ord,
        }
        for i in (0..N - 1).rev() {
            match self.words[i].cmp(&other.words[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl<const N: usize> PartialOrd for FixedInt<N> {
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<const N: usize> Default for FixedInt<N> {
    #[inline(always)]
    fn default() -> Self {
        Self::ZERO
    }
}

impl<const N: usize> std::fmt::Debug for FixedInt<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut repr = String::new();
        self.append_to_string(&mut repr);
        write!(f, "FixedInt<{}>({})", N, repr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_queries() {
        assert!(!FixedInt::<3>::ZERO.is_negative());
        assert!(FixedInt::<3>::MIN.is_negative());
        assert!(!FixedInt::<3>::MAX.is_negative());
        assert!(FixedInt::<3>::from_i128(-1).is_negative());
        assert!(FixedInt::<3>::ZERO.is_zero());
    }

    #[test]
    fn test_from_to_i128() {
        for v in [0i128, 1, -1, i128::MAX, i128::MIN, 42, -42] {
            assert_eq!(FixedInt::<3>::from_i128(v).to_i128(), Some(v));
        }
        // 2^130 does not fit in i128
        let wide = FixedInt::<3>::from_words([0, 0, 4]);
        assert_eq!(wide.to_i128(), None);
    }

    #[test]
    fn test_abs() {
        assert_eq!(FixedInt::<2>::from_i128(-5).abs().low_u128(), 5);
        assert_eq!(FixedInt::<2>::from_i128(5).abs().low_u128(), 5);
        // abs(MIN) == 2^127 as unsigned
        assert_eq!(
            FixedInt::<2>::MIN.abs(),
            FixedUint::<2>::from_u64(1).shl(127)
        );
    }

    #[test]
    fn test_set_sign_and_abs() {
        let five = FixedUint::<2>::from_u64(5);
        assert_eq!(
            FixedInt::set_sign_and_abs(false, five).unwrap(),
            FixedInt::<2>::from_i128(5)
        );
        assert_eq!(
            FixedInt::set_sign_and_abs(true, five).unwrap(),
            FixedInt::<2>::from_i128(-5)
        );

        // 2^127 only fits with the negative sign
        let min_magnitude = FixedUint::<2>::from_u64(1).shl(127);
        assert_eq!(FixedInt::<2>::set_sign_and_abs(false, min_magnitude), None);
        assert_eq!(
            FixedInt::set_sign_and_abs(true, min_magnitude).unwrap(),
            FixedInt::<2>::MIN
        );

        // 2^127 + 1 fits neither way
        let over = min_magnitude.overflowing_add_u64(1).0;
        assert_eq!(FixedInt::<2>::set_sign_and_abs(true, over), None);
    }

    #[test]
    fn test_add_overflow_detection() {
        let (sum, overflow) = FixedInt::<2>::MAX.overflowing_add(&FixedInt::from_i128(1));
        assert!(overflow);
        assert_eq!(sum, FixedInt::MIN);

        let (_, overflow) = FixedInt::<2>::MIN.overflowing_add(&FixedInt::from_i128(-1));
        assert!(overflow);

        let (sum, overflow) = FixedInt::<2>::MAX.overflowing_add(&FixedInt::from_i128(-1));
        assert!(!overflow);
        assert_eq!(sum.to_i128(), Some(i128::MAX - 1));
    }

    #[test]
    fn test_sub_overflow_detection() {
        let (_, overflow) = FixedInt::<2>::MIN.overflowing_sub(&FixedInt::from_i128(1));
        assert!(overflow);
        let (diff, overflow) = FixedInt::<2>::from_i128(-2).overflowing_sub(&FixedInt::from_i128(-3));
        assert!(!overflow);
        assert_eq!(diff.to_i128(), Some(1));
    }

    #[test]
    fn test_extend_and_narrow() {
        let v = FixedInt::<2>::from_i128(-123);
        let wide: FixedInt<5> = v.extend();
        assert_eq!(wide.to_i128(), Some(-123));
        assert_eq!(wide.checked_narrow::<2>().unwrap(), v);

        let big = FixedInt::<5>::from_words([0, 0, 1, 0, 0]);
        assert_eq!(big.checked_narrow::<2>(), None);
    }

    #[test]
    fn test_mul_u64() {
        let v = FixedInt::<3>::from_i128(-1_000_000_007);
        assert_eq!(v.mul_u64(3).to_i128(), Some(-3_000_000_021));
        assert_eq!(FixedInt::<3>::ZERO.mul_u64(u64::MAX), FixedInt::ZERO);
    }

    #[test]
    fn test_div_and_round_away_from_zero_u64() {
        assert_eq!(
            FixedInt::<2>::from_i128(7).div_and_round_away_from_zero_u64(2).to_i128(),
            Some(4)
        );
        assert_eq!(
            FixedInt::<2>::from_i128(-7).div_and_round_away_from_zero_u64(2).to_i128(),
            Some(-4)
        );
        assert_eq!(
            FixedInt::<2>::from_i128(-7).div_and_round_away_from_zero_u64(3).to_i128(),
            Some(-2)
        );
    }

    #[test]
    fn test_extend_and_multiply_signed() {
        let a = FixedInt::<2>::from_i128(-3);
        let b = FixedInt::<2>::from_i128(5);
        let product: FixedInt<4> = extend_and_multiply(&a, &b);
        assert_eq!(product.to_i128(), Some(-15));

        let product: FixedInt<4> = extend_and_multiply(&a, &a);
        assert_eq!(product.to_i128(), Some(9));

        // MIN * MIN = 2^254, fits comfortably in 256 bits
        let min = FixedInt::<2>::MIN;
        let product: FixedInt<4> = extend_and_multiply(&min, &min);
        assert_eq!(product.to_bits(), FixedUint::<4>::from_u64(1).shl(254));
    }

    #[test]
    fn test_append_to_string() {
        let mut s = String::new();
        FixedInt::<2>::from_i128(-123).append_to_string(&mut s);
        assert_eq!(s, "-123");

        let mut s = String::new();
        FixedInt::<2>::ZERO.append_to_string(&mut s);
        assert_eq!(s, "0");
    }

    #[test]
    fn test_serialize_minimal_forms() {
        let cases: [(i128, &[u8]); 7] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (-1, &[0xFF]),
            (128, &[0x80, 0x00]),
            (-128, &[0x80]),
            (-129, &[0x7F, 0xFF]),
            (0x0102, &[0x02, 0x01]),
        ];
        for (value, expected) in cases {
            let mut bytes = Vec::new();
            FixedInt::<2>::from_i128(value).serialize_to_bytes(&mut bytes);
            assert_eq!(bytes, expected, "value {}", value);
            assert_eq!(
                FixedInt::<2>::deserialize_from_bytes(&bytes).unwrap(),
                FixedInt::from_i128(value)
            );
        }
    }

    #[test]
    fn test_deserialize_sign_extension() {
        // 16 bytes of 0xFF is -1 for FixedInt<2> and still -1 with redundant
        // extension bytes beyond the width
        let bytes = [0xFFu8; 20];
        assert_eq!(
            FixedInt::<2>::deserialize_from_bytes(&bytes).unwrap(),
            FixedInt::from_i128(-1)
        );
        // a positive value with 0xFF padding does not fit
        let mut bytes = [0xFFu8; 20];
        bytes[15] = 0x7F;
        assert_eq!(FixedInt::<2>::deserialize_from_bytes(&bytes), None);
        assert_eq!(FixedInt::<2>::deserialize_from_bytes(&[]), None);
    }

    #[test]
    fn test_ordering() {
        let mut values = [
            FixedInt::<2>::from_i128(5),
            FixedInt::<2>::MIN,
            FixedInt::<2>::from_i128(-1),
            FixedInt::<2>::ZERO,
            FixedInt::<2>::MAX,
        ];
        values.sort();
        assert_eq!(
            values,
            [
                FixedInt::<2>::MIN,
                FixedInt::<2>::from_i128(-1),
                FixedInt::<2>::ZERO,
                FixedInt::<2>::from_i128(5),
                FixedInt::<2>::MAX,
            ]
        );
    }

    #[test]
    fn test_to_f64() {
        assert_eq!(FixedInt::<3>::from_i128(-12345).to_f64(), -12345.0);
        assert_eq!(FixedInt::<3>::ZERO.to_f64(), 0.0);
    }
}
