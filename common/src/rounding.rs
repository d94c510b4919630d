//! Rounding policies for derived rates and converted amounts.
//!
//! Fiat cross-rates and crypto amounts are rounded independently: cross-rates
//! always use [`RoundingPolicy::CROSS_RATE`], crypto amounts use the precision
//! of the target token.

/// Round `value` to `precision` decimal places, half away from zero.
///
/// A negative precision returns the value unchanged.
pub fn round_to_precision(value: f64, precision: i32) -> f64 {
    if precision < 0 {
        return value;
    }
    let p = 10f64.powi(precision);
    (value * p).round() / p
}

/// A fixed number of decimal places to round to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundingPolicy {
    /// Decimal places kept after rounding.
    pub decimals: u32,
}

impl RoundingPolicy {
    /// Policy used for fiat cross-rates.
    pub const CROSS_RATE: RoundingPolicy = RoundingPolicy { decimals: 2 };

    pub const fn new(decimals: u32) -> Self {
        Self { decimals }
    }

    /// Apply this policy to a value.
    pub fn apply(&self, value: f64) -> f64 {
        round_to_precision(value, self.decimals as i32)
    }
}

impl Default for RoundingPolicy {
    fn default() -> Self {
        Self::CROSS_RATE
    }
}
