//! Cancellation-free special functions.

/// `sqrt(1 + x) - 1` without catastrophic cancellation for small `x`.
///
/// Arguments below -1 are clamped to -1 (the result is then -1).
pub fn sqrt1pm1(x: f64) -> f64 {
    let x = x.max(-1.0);
    if x.abs() < 0.75 {
        x / ((1.0 + x).sqrt() + 1.0)
    } else {
        (1.0 + x).sqrt() - 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqrt1pm1_small_argument_is_accurate() {
        let x = 1e-18;
        // Naive evaluation collapses to zero.
        assert_eq!((1.0f64 + x).sqrt() - 1.0, 0.0);
        let v = sqrt1pm1(x);
        assert!((v - 0.5e-18).abs() < 1e-33, "v = {v}");
    }

    #[test]
    fn test_sqrt1pm1_matches_naive_for_large_argument() {
        for &x in &[-0.9, -0.5, 0.0, 0.5, 3.0, 99.0] {
            let naive = (1.0f64 + x).sqrt() - 1.0;
            assert!((sqrt1pm1(x) - naive).abs() < 1e-14, "x = {x}");
        }
        assert_eq!(sqrt1pm1(-2.0), -1.0);
    }
}
