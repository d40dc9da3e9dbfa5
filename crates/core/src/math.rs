//! Fixed-point helpers for micro-unit amounts.
//!
//! Chain amounts are u128 integers in per-asset micro-units; derived
//! values (health ratios, fees, revenue) are f64. These helpers convert
//! between the two and apply basis-point adjustments without string
//! round-trips.

/// Basis points denominator (10000 = 100%).
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Pre-computed powers of 10 for fast decimal conversion.
const POW10: [u128; 39] = [
    1,
    10,
    100,
    1_000,
    10_000,
    100_000,
    1_000_000,
    10_000_000,
    100_000_000,
    1_000_000_000,
    10_000_000_000,
    100_000_000_000,
    1_000_000_000_000,
    10_000_000_000_000,
    100_000_000_000_000,
    1_000_000_000_000_000,
    10_000_000_000_000_000,
    100_000_000_000_000_000,
    1_000_000_000_000_000_000,
    10_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000,
    1_000_000_000_000_000_000_000_000_000_000_000_000,
    10_000_000_000_000_000_000_000_000_000_000_000_000,
    100_000_000_000_000_000_000_000_000_000_000_000_000,
];

/// Fast power of 10 lookup (up to 10^38).
#[inline(always)]
pub fn pow10(exp: u8) -> u128 {
    if (exp as usize) < POW10.len() {
        POW10[exp as usize]
    } else {
        u128::MAX
    }
}

/// Convert a raw micro-unit amount to a decimal value.
#[inline]
pub fn to_decimal(amount: u128, decimals: u8) -> f64 {
    amount as f64 / pow10(decimals) as f64
}

/// Convert a decimal value back to micro-units, rounding to nearest.
/// Negative inputs clamp to zero.
#[inline]
pub fn to_micro(value: f64, decimals: u8) -> u128 {
    if value <= 0.0 {
        return 0;
    }
    (value * pow10(decimals) as f64).round() as u128
}

/// Apply a basis-points reduction (e.g. for slippage).
/// Returns `value * (10000 - basis_points) / 10000`.
#[inline(always)]
pub fn apply_basis_points(value: u128, basis_points: u16) -> u128 {
    let factor = BPS_DENOMINATOR.saturating_sub(basis_points as u128);
    value.saturating_mul(factor) / BPS_DENOMINATOR
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pow10_table() {
        assert_eq!(pow10(0), 1);
        assert_eq!(pow10(6), 1_000_000);
        assert_eq!(pow10(18), 1_000_000_000_000_000_000);
    }

    #[test]
    fn test_decimal_roundtrip() {
        // 100 CDT in micro-units
        assert!((to_decimal(100_000_000, 6) - 100.0).abs() < 1e-9);
        assert_eq!(to_micro(100.0, 6), 100_000_000);
        assert_eq!(to_micro(-5.0, 6), 0);
        assert_eq!(to_micro(2.455, 6), 2_455_000);
    }

    #[test]
    fn test_apply_basis_points() {
        assert_eq!(apply_basis_points(1000, 100), 990); // 1%
        assert_eq!(apply_basis_points(1000, 1000), 900); // 10%
        assert_eq!(apply_basis_points(1000, 10_000), 0); // 100%
    }
}
