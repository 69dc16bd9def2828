use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
pub type Fixed64 = I32F32;

/// Ticks are the atomic unit of simulation time.
pub type Ticks = u64;

/// A ratio `num / den` computed entirely in fixed point.
#[inline]
pub fn ratio(num: i32, den: i32) -> Fixed64 {
    Fixed64::from_num(num) / Fixed64::from_num(den)
}
