//! Single-beacon ranging from signal strength
//!
//! Empirical log-distance approximation: ratio = rssi / txPower, then
//! ratio^10 below 1.0, otherwise 0.89976 * ratio^7.7095 + 0.111.

/// Sentinel for "distance not measurable"
pub const UNKNOWN_DISTANCE: f64 = -1.0;

const NEAR_EXPONENT: i32 = 10;
const FAR_COEFFICIENT: f64 = 0.89976;
const FAR_EXPONENT: f64 = 7.7095;
const FAR_OFFSET: f64 = 0.111;

/// Estimate distance in meters from measured RSSI and calibrated 1 m power.
///
/// Returns [`UNKNOWN_DISTANCE`] when `rssi == 0` or when the beacon reports
/// no calibration (`tx_power == 0`).
pub fn estimate_distance(rssi: i32, tx_power: i32) -> f64 {
    if rssi == 0 || tx_power == 0 {
        return UNKNOWN_DISTANCE;
    }

    let ratio = rssi as f64 / tx_power as f64;
    if ratio < 1.0 {
        ratio.powi(NEAR_EXPONENT)
    } else {
        FAR_COEFFICIENT * ratio.powf(FAR_EXPONENT) + FAR_OFFSET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_rssi_is_unknown() {
        assert_eq!(estimate_distance(0, -59), -1.0);
    }

    #[test]
    fn test_zero_tx_power_is_unknown() {
        assert_eq!(estimate_distance(-70, 0), -1.0);
    }

    #[test]
    fn test_ratio_one_uses_far_branch() {
        let d = estimate_distance(-59, -59);
        assert!((d - (0.89976 + 0.111)).abs() < 1e-12);
        assert!((d - 1.011).abs() < 1e-3);
    }

    #[test]
    fn test_near_branch() {
        // ratio = 0.5
        let d = estimate_distance(-30, -60);
        assert!((d - 0.5f64.powi(10)).abs() < 1e-15);
        assert!(d < 1.0);
    }

    #[test]
    fn test_far_branch() {
        // ratio = 1.5
        let d = estimate_distance(-90, -60);
        let expected = 0.89976 * 1.5f64.powf(7.7095) + 0.111;
        assert!((d - expected).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic_with_weaker_signal() {
        let near = estimate_distance(-60, -59);
        let mid = estimate_distance(-75, -59);
        let far = estimate_distance(-90, -59);
        assert!(near < mid && mid < far);
    }
}
