/// Round half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

pub fn round1(value: f64) -> f64 {
    round_to(value, 1)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert!((round_to(1.23456789, 6) - 1.234568).abs() < 1e-12);
        assert!((round_to(2.25, 1) - 2.3).abs() < 1e-12);
        assert!((round1(-0.25) - -0.3).abs() < 1e-12);
        assert!(round_to(f64::NAN, 2).abs() < 1e-12);
    }

    #[test]
    fn test_mean_empty_is_zero() {
        assert!(mean(&[]).abs() < 1e-12);
        assert!((mean(&[1.0, 2.0, 6.0]) - 3.0).abs() < 1e-12);
    }
}
