use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits. Used for ratios
/// (utilization, mean flow time) so that statistics stay bit-identical
/// across platforms.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulated time.
pub type Ticks = u64;

/// Capacity sentinel for entities that never refuse an item.
pub const UNBOUNDED: usize = usize::MAX;

/// Convert an f64 to Fixed64. Use only for initialization and test fixtures.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Fixed64 {
    Fixed64::from_num(v)
}

/// Convert Fixed64 to f64. Use only for display.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// `numerator / denominator` as a fixed-point ratio. A zero denominator
/// yields zero rather than panicking.
#[inline]
pub fn ratio(numerator: u64, denominator: u64) -> Fixed64 {
    ratio_wide(u128::from(numerator), u128::from(denominator))
}

/// [`ratio`] over 128-bit operands, for sums and products of tick counts.
/// The quotient is computed before narrowing, so only a result outside
/// `Fixed64`'s range saturates.
pub fn ratio_wide(numerator: u128, denominator: u128) -> Fixed64 {
    if denominator == 0 {
        return Fixed64::ZERO;
    }
    let Some(scaled) = numerator.checked_mul(1 << Fixed64::FRAC_NBITS) else {
        return Fixed64::MAX;
    };
    i64::try_from(scaled / denominator).map_or(Fixed64::MAX, Fixed64::from_bits)
}
