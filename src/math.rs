//! Fixed-point helpers
//!
//! Amounts are raw `U256` integers. Ratios, oracle prices and exchange rates
//! use 18 decimals (`PRECISION`), fee ratios use 9 decimals
//! (`FEE_PRECISION`), slippage is expressed in basis points. All divisions
//! floor unless the helper name says otherwise.

use crate::error::{Result, SdkError};
use alloy_primitives::U256;

// ============================================
// CONSTANTS
// ============================================

/// 1e18
pub const PRECISION: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);

/// 1e9, denominator of pool fee ratios
pub const FEE_PRECISION: U256 = U256::from_limbs([1_000_000_000, 0, 0, 0]);

pub const BPS_DENOMINATOR: u64 = 10_000;

/// Shift applied to the upper bound when packing debt-ratio bounds
pub const MISC_BOUND_SHIFT: usize = 60;

// ============================================
// CHECKED ARITHMETIC
// ============================================

/// `a * b / denominator`, floored. Fails on overflow or a zero denominator.
pub fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(SdkError::Overflow("division by zero"));
    }
    a.checked_mul(b)
        .map(|product| product / denominator)
        .ok_or(SdkError::Overflow("mul_div"))
}

/// `a * b / denominator`, rounded half up.
pub fn mul_div_round(a: U256, b: U256, denominator: U256) -> Result<U256> {
    if denominator.is_zero() {
        return Err(SdkError::Overflow("division by zero"));
    }
    a.checked_mul(b)
        .and_then(|product| product.checked_add(denominator >> 1))
        .map(|product| product / denominator)
        .ok_or(SdkError::Overflow("mul_div_round"))
}

pub fn checked_add(a: U256, b: U256) -> Result<U256> {
    a.checked_add(b).ok_or(SdkError::Overflow("add"))
}

pub fn pow10(exponent: u8) -> U256 {
    U256::from(10u64).pow(U256::from(exponent))
}

// ============================================
// SLIPPAGE
// ============================================

/// Convert a user-facing percent (0.5 means 0.5%) to basis points.
pub fn slippage_to_bps(percent: f64) -> u64 {
    (percent * 100.0).round().max(0.0) as u64
}

/// `amount * (10000 - bps) / 10000`
pub fn haircut(amount: U256, bps: u64) -> Result<U256> {
    mul_div(
        amount,
        U256::from(BPS_DENOMINATOR.saturating_sub(bps)),
        U256::from(BPS_DENOMINATOR),
    )
}

/// `amount * (10000 + bps) / 10000`
pub fn inflate(amount: U256, bps: u64) -> Result<U256> {
    mul_div(
        amount,
        U256::from(BPS_DENOMINATOR + bps),
        U256::from(BPS_DENOMINATOR),
    )
}

/// `(target - bps, target + bps)`
pub fn range_with_slippage(target: U256, bps: u64) -> Result<(U256, U256)> {
    Ok((haircut(target, bps)?, inflate(target, bps)?))
}

// ============================================
// FEES
// ============================================

/// `amount * (1 - fee)`
pub fn after_fee(amount: U256, fee_ratio: U256) -> Result<U256> {
    mul_div(amount, FEE_PRECISION.saturating_sub(fee_ratio), FEE_PRECISION)
}

/// `amount * (1 + fee)`, rounded half up
pub fn with_fee(amount: U256, fee_ratio: U256) -> Result<U256> {
    mul_div_round(amount, FEE_PRECISION.saturating_add(fee_ratio), FEE_PRECISION)
}

/// `amount / (1 - fee)`
pub fn gross_of_fee(amount: U256, fee_ratio: U256) -> Result<U256> {
    mul_div(amount, FEE_PRECISION, FEE_PRECISION.saturating_sub(fee_ratio))
}

// ============================================
// DEBT RATIO
// ============================================

/// Pack debt-ratio bounds into the router's misc word: `max << 60 | min`.
pub fn encode_misc_data(min_debt_ratio: U256, max_debt_ratio: U256) -> U256 {
    (max_debt_ratio << MISC_BOUND_SHIFT) + min_debt_ratio
}

/// Pack `target ± bps` as debt-ratio bounds.
pub fn encode_misc_data_with_slippage(target: U256, bps: u64) -> Result<U256> {
    let (min, max) = range_with_slippage(target, bps)?;
    Ok(encode_misc_data(min, max))
}

/// `debts * 1e36 / (colls * price)`, all inputs 18-decimal.
///
/// A zero denominator yields `U256::MAX` so the result fails any upper bound.
pub fn debt_ratio(debts: U256, colls: U256, price: U256) -> Result<U256> {
    let denominator = colls
        .checked_mul(price)
        .ok_or(SdkError::Overflow("debt_ratio"))?;
    if denominator.is_zero() {
        return Ok(U256::MAX);
    }
    let numerator = debts
        .checked_mul(PRECISION)
        .ok_or(SdkError::Overflow("debt_ratio"))?;
    mul_div(numerator, PRECISION, denominator)
}

/// Target debt ratio `(L - 1) / L` for a leverage in 18 decimals.
/// Zero leverage means a full close and maps to 1.0.
pub fn target_debt_ratio(leverage_wad: U256) -> Result<U256> {
    if leverage_wad.is_zero() {
        return Ok(PRECISION);
    }
    mul_div(leverage_wad.saturating_sub(PRECISION), PRECISION, leverage_wad)
}

// ============================================
// FLOAT CONVERSIONS
// ============================================

/// Lossy conversion for display values (leverage, price impact).
pub fn u256_to_f64(value: U256) -> f64 {
    value
        .as_limbs()
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18_446_744_073_709_551_616.0 + *limb as f64)
}

pub fn wad_to_f64(value: U256) -> f64 {
    u256_to_f64(value) / 1e18
}

/// Leverage or other user float to 18 decimals. Negative and non-finite map to zero.
pub fn f64_to_wad(value: f64) -> U256 {
    if !value.is_finite() || value <= 0.0 {
        return U256::ZERO;
    }
    U256::from((value * 1e18).round() as u128)
}

/// `size / (size - debt)`, zero when there is no debt.
pub fn leverage(size: U256, debt: U256) -> f64 {
    if debt.is_zero() {
        return 0.0;
    }
    let size = u256_to_f64(size);
    size / (size - u256_to_f64(debt))
}

/// `(value - base) / base * 100`
pub fn relative_change_pct(value: U256, base: U256) -> f64 {
    if base.is_zero() {
        return 0.0;
    }
    let base = u256_to_f64(base);
    (u256_to_f64(value) - base) / base * 100.0
}

/// 18-decimal value rounded half up to whole units.
pub fn round_wad(value: U256) -> U256 {
    (value.saturating_add(PRECISION >> 1)) / PRECISION
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wad(units: u64) -> U256 {
        U256::from(units) * PRECISION
    }

    #[test]
    fn test_slippage_helpers() {
        assert_eq!(slippage_to_bps(0.5), 50);
        assert_eq!(slippage_to_bps(1.0), 100);
        assert_eq!(haircut(U256::from(10_000u64), 50).unwrap(), U256::from(9_950u64));
        assert_eq!(inflate(U256::from(10_000u64), 50).unwrap(), U256::from(10_050u64));
        // floors
        assert_eq!(haircut(U256::from(3u64), 50).unwrap(), U256::from(2u64));
    }

    #[test]
    fn test_encode_misc_data() {
        let min = U256::from(500u64);
        let max = U256::from(800u64);
        let packed = encode_misc_data(min, max);
        assert_eq!(packed >> MISC_BOUND_SHIFT, max);
        assert_eq!(packed & ((U256::from(1u64) << MISC_BOUND_SHIFT) - U256::from(1u64)), min);
    }

    #[test]
    fn test_mul_div_errors() {
        assert!(mul_div(U256::MAX, U256::from(2u64), U256::from(1u64)).is_err());
        assert!(mul_div(U256::from(1u64), U256::from(1u64), U256::ZERO).is_err());
        assert_eq!(mul_div_round(U256::from(5u64), U256::from(1u64), U256::from(2u64)).unwrap(), U256::from(3u64));
    }

    #[test]
    fn test_debt_ratio() {
        // 4 debt / (3 coll * 2 price) = 0.666..
        let ratio = debt_ratio(wad(4), wad(3), wad(2)).unwrap();
        assert_eq!(ratio, U256::from(666_666_666_666_666_666u64));
        assert_eq!(debt_ratio(wad(1), U256::ZERO, wad(2)).unwrap(), U256::MAX);
    }

    #[test]
    fn test_target_debt_ratio() {
        assert_eq!(target_debt_ratio(U256::ZERO).unwrap(), PRECISION);
        assert_eq!(target_debt_ratio(wad(2)).unwrap(), PRECISION / U256::from(2u64));
    }

    #[test]
    fn test_fees() {
        let fee = U256::from(1_000_000u64); // 0.1%
        assert_eq!(after_fee(wad(1000), fee).unwrap(), wad(999));
        assert_eq!(with_fee(wad(1000), fee).unwrap(), wad(1001));
        assert!(gross_of_fee(wad(999), fee).unwrap() >= wad(1000) - U256::from(1u64));
    }

    #[test]
    fn test_float_conversions() {
        assert_eq!(f64_to_wad(3.0), wad(3));
        assert_eq!(f64_to_wad(-1.0), U256::ZERO);
        assert_eq!(f64_to_wad(f64::NAN), U256::ZERO);
        assert!((wad_to_f64(wad(3)) - 3.0).abs() < 1e-12);
        let big = U256::from(1u64) << 200;
        assert!((u256_to_f64(big) - 2f64.powi(200)).abs() / 2f64.powi(200) < 1e-12);
    }

    #[test]
    fn test_leverage() {
        assert_eq!(leverage(wad(3), U256::ZERO), 0.0);
        assert!((leverage(wad(3), wad(2)) - 3.0).abs() < 1e-12);
        assert!((relative_change_pct(wad(101), wad(100)) - 1.0).abs() < 1e-9);
        assert_eq!(round_wad(wad(2) + PRECISION / U256::from(2u64)), U256::from(3u64));
    }
}
